//! Components of the filtering proxy:
//! - `Upstream`: connects to the upstream SSH agent, one connection per session
//! - `Server`: Unix socket listener that accepts client connections
//! - `Proxy`: per-client session that filters and relays agent protocol traffic

mod proxy;
mod server;
mod upstream;

pub use proxy::Proxy;
pub use server::Server;
pub use upstream::Upstream;
