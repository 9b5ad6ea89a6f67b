//! CLI surface for keyholder-proxy: a single flat option set, no subcommands.

use clap::Parser;
use std::path::PathBuf;

/// Default bind socket for the filtering proxy.
pub const DEFAULT_BIND: &str = "/run/keyholder/proxy.sock";
/// Default upstream SSH agent socket.
pub const DEFAULT_CONNECT: &str = "/run/keyholder/agent.sock";
/// Default policy directory (`*.yml`/`*.yaml`).
pub const DEFAULT_AUTH_DIR: &str = "/etc/keyholder-auth.d";
/// Fixed companion directory of agent-held public keys.
/// Not a CLI flag; overridable only via `KEYHOLDER_PUBKEY_DIR` for testing.
pub const DEFAULT_PUBKEY_DIR: &str = "/etc/keyholder.d";

/// A filtering SSH agent proxy
#[derive(Parser, Debug)]
#[command(name = "keyholder-proxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the UNIX-domain socket the proxy listens on
    #[arg(long, default_value = DEFAULT_BIND, env = "KEYHOLDER_BIND")]
    pub bind: PathBuf,

    /// Path to the upstream SSH agent's UNIX-domain socket
    #[arg(long, default_value = DEFAULT_CONNECT, env = "KEYHOLDER_CONNECT")]
    pub connect: PathBuf,

    /// Directory containing policy files (*.yml, *.yaml)
    #[arg(long, default_value = DEFAULT_AUTH_DIR, env = "KEYHOLDER_AUTH_DIR")]
    pub auth_dir: PathBuf,

    /// Optional path to a JSONL structured diagnostic log
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output (warnings and errors only)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Directory of agent-held public keys: fixed by the reference layout,
    /// overridable only via environment for test isolation.
    pub fn pubkey_dir(&self) -> PathBuf {
        std::env::var("KEYHOLDER_PUBKEY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PUBKEY_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cli = Cli::parse_from(["keyholder-proxy"]);
        assert_eq!(cli.bind, PathBuf::from(DEFAULT_BIND));
        assert_eq!(cli.connect, PathBuf::from(DEFAULT_CONNECT));
        assert_eq!(cli.auth_dir, PathBuf::from(DEFAULT_AUTH_DIR));
        assert!(cli.log.is_none());
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        let result = Cli::try_parse_from(["keyholder-proxy", "--verbose", "--quiet"]);
        assert!(result.is_err());
    }

    #[test]
    fn explicit_flags_override_defaults() {
        let cli = Cli::parse_from([
            "keyholder-proxy",
            "--bind",
            "/tmp/a.sock",
            "--connect",
            "/tmp/b.sock",
            "--auth-dir",
            "/tmp/auth",
        ]);
        assert_eq!(cli.bind, PathBuf::from("/tmp/a.sock"));
        assert_eq!(cli.connect, PathBuf::from("/tmp/b.sock"));
        assert_eq!(cli.auth_dir, PathBuf::from("/tmp/auth"));
    }
}
