//! Connection state machine for a single transfer.
//!
//! Both endpoints walk the same states: waiting for the request (server)
//! or the first response byte (client), streaming file bytes, then closed.
//! Any I/O error moves the connection to `Failed`.

use std::fmt;
use std::net::SocketAddr;

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for the request (server) or the first response byte (client).
    Awaiting,
    /// File bytes are flowing.
    Streaming {
        /// Bytes moved so far.
        transferred: u64,
    },
    /// Exchange finished and the connection was released.
    Closed {
        /// Total bytes moved.
        transferred: u64,
    },
    /// An I/O error ended the exchange.
    Failed {
        /// Bytes moved before the failure.
        transferred: u64,
    },
}

/// One request/response exchange with a peer.
#[derive(Debug)]
pub struct Connection {
    /// Address of the other endpoint.
    pub peer: SocketAddr,
    /// Current connection state.
    pub state: ConnState,
}

impl Connection {
    /// Create a new connection waiting for its first bytes.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            state: ConnState::Awaiting,
        }
    }

    /// Record `n` more bytes moved, entering `Streaming` if needed.
    pub fn record(&mut self, n: usize) {
        let n = n as u64;
        self.state = match self.state {
            ConnState::Awaiting => ConnState::Streaming { transferred: n },
            ConnState::Streaming { transferred } => ConnState::Streaming {
                transferred: transferred + n,
            },
            done => done,
        };
    }

    /// Mark the exchange as finished.
    pub fn close(&mut self) {
        if !self.is_done() {
            self.state = ConnState::Closed {
                transferred: self.transferred(),
            };
        }
    }

    /// Mark the exchange as failed.
    pub fn fail(&mut self) {
        if !self.is_done() {
            self.state = ConnState::Failed {
                transferred: self.transferred(),
            };
        }
    }

    /// Bytes moved so far.
    pub fn transferred(&self) -> u64 {
        match self.state {
            ConnState::Awaiting => 0,
            ConnState::Streaming { transferred }
            | ConnState::Closed { transferred }
            | ConnState::Failed { transferred } => transferred,
        }
    }

    /// Whether any byte was moved.
    pub fn has_data(&self) -> bool {
        self.transferred() > 0
    }

    fn is_done(&self) -> bool {
        matches!(self.state, ConnState::Closed { .. } | ConnState::Failed { .. })
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnState::Awaiting => write!(f, "awaiting"),
            ConnState::Streaming { .. } => write!(f, "streaming"),
            ConnState::Closed { .. } => write!(f, "closed"),
            ConnState::Failed { .. } => write!(f, "failed"),
        }
    }
}
