//! Error taxonomy for the transport core.
//!
//! Plain hand-rolled error type: no `thiserror`/`anyhow`, matching how the
//! core crates in this codebase model internal errors (see
//! `security::SecurityError`). The parser and send buffer never panic; every
//! failure path returns one of these variants instead.

use std::fmt;

/// Errors surfaced by the transport core.
///
/// `WouldBlock` is carried here because handlers report it through the same
/// channel as a true error (`{OK, WOULD_BLOCK, err}`), but callers must not
/// treat it as a failure: it means "stay subscribed", not "something broke".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No free slot in the `BufferPool`.
    PoolExhausted,

    /// `SendBuffer::queue` could not fit the requested bytes; transient,
    /// retry after draining.
    NoSpace,

    /// A file descriptor argument was invalid (`fd < 0`).
    InvalidFd,

    /// A caller passed an argument that violates the operation's contract
    /// (e.g. `queue` with `len == 0`).
    InvalidArg,

    /// Malformed request line/headers, or a configured limit was exceeded.
    /// The string names the specific violation for logging.
    Protocol(&'static str),

    /// I/O failure surfaced by the socket/file collaborator.
    Io(std::io::ErrorKind),

    /// A continuation handler asked to stay subscribed; not a true error.
    WouldBlock,

    /// The connection owner (idle-timeout sweep) closed the connection.
    Timeout,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolExhausted => write!(f, "buffer pool exhausted"),
            Self::NoSpace => write!(f, "send buffer has no space"),
            Self::InvalidFd => write!(f, "invalid file descriptor"),
            Self::InvalidArg => write!(f, "invalid argument"),
            Self::Protocol(reason) => write!(f, "protocol error: {}", reason),
            Self::Io(kind) => write!(f, "I/O error: {:?}", kind),
            Self::WouldBlock => write!(f, "would block"),
            Self::Timeout => write!(f, "timed out"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.kind())
    }
}

/// Result of feeding bytes into the [`crate::parser::RequestParser`].
///
/// Mirrors spec language one-to-one instead of collapsing into `Result`:
/// `NEED_MORE`/`OK`/`COMPLETE` are all successful outcomes a caller switches
/// on, not an error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// No terminal state reached; call again with more bytes.
    NeedMore,

    /// Headers complete, a body is expected (or a WebSocket upgrade was
    /// detected); the caller switches the connection state accordingly.
    Ok,

    /// Full request ready to dispatch.
    Complete,
}

/// Result of a continuation handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    /// Handler is done; terminal.
    Ok,

    /// Handler wants to stay subscribed for the next chunk.
    WouldBlock,
}
