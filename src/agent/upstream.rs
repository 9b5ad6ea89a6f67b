//! Upstream SSH agent connection: one connection per session, opened at
//! session start.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::trace;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The upstream agent socket's address. Cheap to clone/share; each session
/// calls `connect()` once at session start to get its own dedicated stream.
#[derive(Clone)]
pub struct Upstream {
    socket_path: PathBuf,
}

impl Upstream {
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Connect to the upstream agent, bounded by a connect timeout. Failure
    /// here closes the client with no data written beyond what was already
    /// accepted; it is a per-session error, not a fatal startup error.
    pub async fn connect(&self) -> Result<UnixStream> {
        let stream = tokio::time::timeout(
            DEFAULT_CONNECT_TIMEOUT,
            UnixStream::connect(&self.socket_path),
        )
        .await
        .map_err(|_| {
            Error::UpstreamNotAvailable(format!(
                "connection to upstream agent at {} timed out after {:?}",
                self.socket_path.display(),
                DEFAULT_CONNECT_TIMEOUT
            ))
        })?
        .map_err(|e| {
            Error::UpstreamNotAvailable(format!(
                "failed to connect to upstream agent at {}: {e}",
                self.socket_path.display()
            ))
        })?;

        trace!(socket_path = %self.socket_path.display(), "connected to upstream agent");
        Ok(stream)
    }
}
