//! tcp-fileshare: a minimal TCP file server and download client.
//!
//! - `server`: serves regular files from a root directory, one task per
//!   connection, with a cap on concurrent transfers
//! - `client`: requests one file and writes it to an output folder
//!
//! The wire format is a single length-prefixed filename followed by the
//! raw file bytes; see [`protocol`].

pub mod client;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod resolve;
pub mod server;

use tracing_subscriber::EnvFilter;

/// Initialize logging to stderr. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
