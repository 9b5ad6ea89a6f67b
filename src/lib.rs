//! keyholder-proxy - a filtering SSH agent proxy
//!
//! Binds a Unix socket that proxies SSH agent protocol traffic to an
//! upstream agent, filtering sign requests against a group-based policy
//! keyed by the connecting peer's identity.

pub mod agent;
pub mod cli;
pub mod error;
pub mod filter;
pub mod logging;
pub mod peer;
pub mod policy;
pub mod protocol;
pub mod utils;

pub use error::{Error, Result};

/// Package version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const NAME: &str = env!("CARGO_PKG_NAME");
