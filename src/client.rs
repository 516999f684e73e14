//! Download client.
//!
//! Sends one framed filename and drains the response into the output
//! folder. The output file is only created once the first byte arrives,
//! so a file the server cannot serve leaves nothing behind.

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::protocol;
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Receive buffer size
const RECV_BUFFER_SIZE: usize = 16 * 1024;

/// How a completed exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// File written to the output folder.
    Received { bytes: u64 },
    /// The server closed without sending anything.
    NotFound,
}

/// Request `config.filename` from `config.server` and write it to
/// `config.output_path()`.
pub async fn fetch(config: &ClientConfig) -> Result<Outcome, ClientError> {
    let mut stream = TcpStream::connect(config.server)
        .await
        .map_err(|e| ClientError::Connect(config.server, e))?;
    let peer = stream
        .peer_addr()
        .unwrap_or(SocketAddr::V4(config.server));
    debug!(server = %peer, "Connected");

    let request = protocol::encode_request(config.filename.as_bytes());
    stream.write_all(&request).await.map_err(ClientError::Send)?;
    debug!(file = %config.filename, "Request sent");

    receive(&mut stream, peer, &config.output_path()).await
}

/// Drain `reader` into `output` until the peer closes.
///
/// On a read error, bytes already received stay on disk.
pub async fn receive<R>(
    reader: &mut R,
    peer: SocketAddr,
    output: &Path,
) -> Result<Outcome, ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut conn = Connection::new(peer);
    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    let mut file: Option<File> = None;

    loop {
        let n = match reader.read(&mut buffer).await {
            Ok(n) => n,
            Err(e) => {
                conn.fail();
                if let Some(out) = file.as_mut() {
                    if let Err(flush_err) = out.flush().await {
                        warn!(
                            path = %output.display(),
                            error = %flush_err,
                            "Failed to flush partial file"
                        );
                    }
                }
                warn!(
                    peer = %conn.peer,
                    received = conn.transferred(),
                    error = %e,
                    "Transfer interrupted"
                );
                return Err(ClientError::Receive {
                    received: conn.transferred(),
                    source: e,
                });
            }
        };
        if n == 0 {
            break;
        }

        if file.is_none() {
            let created = File::create(output)
                .await
                .map_err(|e| ClientError::CreateOutput(output.to_path_buf(), e))?;
            debug!(path = %output.display(), "Output file created");
            file = Some(created);
        }
        if let Some(out) = file.as_mut() {
            out.write_all(&buffer[..n])
                .await
                .map_err(|e| ClientError::WriteOutput(output.to_path_buf(), e))?;
        }
        conn.record(n);
    }

    conn.close();
    match file {
        Some(mut out) => {
            out.flush()
                .await
                .map_err(|e| ClientError::WriteOutput(output.to_path_buf(), e))?;
            info!(bytes = conn.transferred(), path = %output.display(), "File received");
            Ok(Outcome::Received {
                bytes: conn.transferred(),
            })
        }
        None => {
            info!("Server closed without data");
            Ok(Outcome::NotFound)
        }
    }
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Error connecting to server {0}: {1}")]
    Connect(SocketAddrV4, #[source] io::Error),
    #[error("Error sending filename: {0}")]
    Send(#[source] io::Error),
    #[error("Error receiving file after {received} bytes: {source}")]
    Receive {
        received: u64,
        #[source]
        source: io::Error,
    },
    #[error("Error opening file {}: {}", .0.display(), .1)]
    CreateOutput(PathBuf, #[source] io::Error),
    #[error("Error writing file {}: {}", .0.display(), .1)]
    WriteOutput(PathBuf, #[source] io::Error),
}
