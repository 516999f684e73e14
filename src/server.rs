//! TCP file server.
//!
//! Accepts connections, reads one framed filename from each, and streams
//! the matching file from the root directory back before closing. Files
//! that cannot be served are answered by closing without sending anything.

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::protocol::{self, ParseResult};
use crate::resolve;
use bytes::BytesMut;
use std::future::Future;
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// File read / socket write chunk size
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Initial request buffer size
const REQUEST_BUFFER_SIZE: usize = 1024;

/// Read-only state shared by every worker.
#[derive(Debug)]
pub struct ServerContext {
    root: PathBuf,
}

impl ServerContext {
    /// Check that `root` is a directory and canonicalize it.
    pub fn new(root: &Path) -> Result<Self, ServerError> {
        let metadata =
            std::fs::metadata(root).map_err(|e| ServerError::Root(root.to_path_buf(), e))?;
        if !metadata.is_dir() {
            return Err(ServerError::RootNotDirectory(root.to_path_buf()));
        }

        let root = root
            .canonicalize()
            .map_err(|e| ServerError::Root(root.to_path_buf(), e))?;
        Ok(Self { root })
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Validate the root directory, then bind the listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        if config.max_clients == 0 || config.max_clients > Semaphore::MAX_PERMITS {
            return Err(ServerError::MaxClients(config.max_clients));
        }
        let context = ServerContext::new(&config.root)?;

        let listener = create_listener(config.listen, config.max_clients)
            .and_then(TcpListener::from_std)
            .map_err(|e| ServerError::Bind(config.listen, e))?;

        Ok(Server {
            listener,
            context: Arc::new(context),
            connection_limit: Arc::new(Semaphore::new(config.max_clients)),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until Ctrl-C.
    pub async fn run(self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accept connections until `shutdown` resolves, then abort in-flight
    /// transfers.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut workers = JoinSet::new();

        info!(
            address = %self.listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            root = %self.context.root().display(),
            max_clients = self.connection_limit.available_permits(),
            "Server listening"
        );

        'serve: loop {
            // Wait for a connection slot
            let permit = loop {
                tokio::select! {
                    _ = &mut shutdown => break 'serve,
                    Some(finished) = workers.join_next(), if !workers.is_empty() => {
                        reap(finished);
                    }
                    permit = Arc::clone(&self.connection_limit).acquire_owned() => match permit {
                        Ok(permit) => break permit,
                        Err(_) => {
                            error!("Connection limiter closed");
                            break 'serve;
                        }
                    },
                }
            };

            let (stream, peer) = loop {
                tokio::select! {
                    _ = &mut shutdown => break 'serve,
                    Some(finished) = workers.join_next(), if !workers.is_empty() => {
                        reap(finished);
                    }
                    accepted = self.listener.accept() => match accepted {
                        Ok(pair) => break pair,
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    },
                }
            };

            info!(peer = %peer, "Connection accepted");

            let context = Arc::clone(&self.context);
            workers.spawn(
                async move {
                    handle_connection(stream, peer, &context).await;
                    drop(permit);
                }
                .instrument(info_span!("conn", peer = %peer)),
            );
        }

        info!(in_flight = workers.len(), "Shutting down");
        workers.shutdown().await;
    }
}

/// Log how a finished worker ended.
fn reap(finished: Result<(), JoinError>) {
    match finished {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!(error = %e, "Worker panicked"),
        Err(e) => debug!(error = %e, "Worker cancelled"),
    }
}

/// Handle a single client connection.
///
/// Always shuts the stream down before returning, whatever the outcome.
pub async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    ctx: &ServerContext,
) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = Connection::new(peer);

    match serve(&mut stream, &mut conn, ctx).await {
        Ok(()) => conn.close(),
        Err(e) => {
            debug!(error = %e, "Transfer aborted");
            conn.fail();
        }
    }

    if let Err(e) = stream.shutdown().await {
        trace!(error = %e, "Shutdown failed");
    }

    info!(
        peer = %conn.peer,
        state = %conn.state,
        bytes = conn.transferred(),
        "Connection closed"
    );
    conn
}

async fn serve<S>(stream: &mut S, conn: &mut Connection, ctx: &ServerContext) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let name = match read_request(stream).await? {
        Some(name) => name,
        None => return Ok(()),
    };
    let file_name = String::from_utf8_lossy(&name);

    let path = match resolve::resolve(ctx.root(), &name).await {
        Ok(path) => path,
        Err(reason) => {
            warn!(file = %file_name, %reason, "File not found or not a regular file");
            return Ok(());
        }
    };

    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            warn!(file = %file_name, error = %e, "Failed to open file");
            return Ok(());
        }
    };

    debug!(file = %file_name, "Sending file");
    send_file(file, stream, conn).await
}

/// Read until a full request frame has arrived.
///
/// Returns `None` when the peer closes early or sends a malformed frame.
async fn read_request<S>(stream: &mut S) -> io::Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(REQUEST_BUFFER_SIZE);

    loop {
        match protocol::parse_request(&buffer) {
            ParseResult::Complete { name, .. } => return Ok(Some(name)),
            ParseResult::Incomplete => {}
            malformed => {
                warn!(?malformed, "Malformed request");
                return Ok(None);
            }
        }

        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            if buffer.is_empty() {
                trace!("Connection closed before request");
            } else {
                debug!(received = buffer.len(), "Connection closed mid-request");
            }
            return Ok(None);
        }
    }
}

async fn send_file<S>(mut file: File, stream: &mut S, conn: &mut Connection) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        stream.write_all(&chunk[..n]).await?;
        conn.record(n);
    }
}

/// Create a TCP listener with the given backlog.
fn create_listener(addr: SocketAddrV4, backlog: usize) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::V4(addr).into())?;
    socket.listen(backlog.min(i32::MAX as usize) as i32)?;

    Ok(socket.into())
}

/// Server startup errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Directory not found: {}: {}", .0.display(), .1)]
    Root(PathBuf, #[source] io::Error),
    #[error("Not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),
    #[error("Failed to bind {0}: {1}")]
    Bind(SocketAddrV4, #[source] io::Error),
    #[error("max_clients must be between 1 and {}, got {0}", Semaphore::MAX_PERMITS)]
    MaxClients(usize),
}
