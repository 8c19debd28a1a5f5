//! Per-connection state: parser context, send buffer, and the small set of
//! classification-derived fields and lifecycle flags the dispatcher needs
//! to drive one connection through a request.
//!
//! Grounded on `transport::tcp::connection::Connection`'s shape (one struct
//! per peer, owning its read/write buffers plus a small state tag), trimmed
//! to the fields this core actually needs and extended with
//! continuation/deferred dispatch-mode exclusivity.

use crate::config::WS_KEY_SLOT_LEN;
use crate::continuation::ContinuationState;
use crate::error::CoreError;
use crate::parser::{Method, ParserContext};
use crate::send_buffer::SendBuffer;

/// Where a connection sits in its request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Slot not bound to a peer.
    Free,
    /// Reading the request line and headers.
    ReadingHeaders,
    /// Headers complete, reading a request body (continuation/deferred
    /// dispatch in progress).
    HttpBody,
    /// Upgraded to WebSocket framing.
    WebSocket,
    /// Draining the send buffer to the socket.
    Writing,
    /// Shutting down; no further reads or writes are issued.
    Closing,
}

/// Why a connection was closed, recorded for logging/metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed its end, or a graceful `Connection: close` drain finished.
    PeerClosed,
    /// A `CoreError::Protocol` violation; best-effort 400 already attempted
    /// if headers had not yet been sent.
    ProtocolError,
    /// Idle timeout swept the connection.
    Timeout,
    /// The configured per-connection request cap was reached.
    RequestLimitReached,
    /// Owner is shutting down.
    Shutdown,
}

/// Counters the dispatcher/owner update as a connection is served, useful
/// for admin/metrics surfaces without adding a dependency on one here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnStats {
    pub requests_served: u32,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

const FLAG_KEEP_ALIVE: u16 = 1 << 0;
const FLAG_IS_WEBSOCKET: u16 = 1 << 1;
const FLAG_UPGRADE_WS: u16 = 1 << 2;
const FLAG_DEFERRED: u16 = 1 << 3;
const FLAG_CONTINUATION: u16 = 1 << 4;

/// One connection's transport-level state.
///
/// `deferred` and `continuation` are mutually exclusive dispatch modes;
/// use [`ConnectionState::begin_deferred`] and
/// [`ConnectionState::begin_continuation`] rather than touching the flag
/// bits directly, since they enforce that exclusivity.
pub struct ConnectionState {
    pub parser: ParserContext,
    pub send: SendBuffer,
    pub lifecycle: Lifecycle,
    pub stats: ConnStats,
    pub close_reason: Option<CloseReason>,
    pub continuation: Option<ContinuationState>,

    method: Method,
    url_len: usize,
    content_length: u32,
    ws_key: [u8; WS_KEY_SLOT_LEN],
    requests_on_connection: u32,
    flags: u16,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            parser: ParserContext::new(),
            send: SendBuffer::new(),
            lifecycle: Lifecycle::Free,
            stats: ConnStats::default(),
            close_reason: None,
            continuation: None,
            method: Method::Any,
            url_len: 0,
            content_length: 0,
            ws_key: [0u8; WS_KEY_SLOT_LEN],
            requests_on_connection: 0,
            flags: FLAG_KEEP_ALIVE,
        }
    }

    /// Re-arms the connection for a new peer. Does not touch the send
    /// buffer's pool slot; the owner frees/reallocates that separately so a
    /// slot can be reused across accepts without a pool round-trip.
    pub fn reset_for_new_peer(&mut self) {
        self.parser.reset();
        self.lifecycle = Lifecycle::ReadingHeaders;
        self.stats = ConnStats::default();
        self.close_reason = None;
        self.continuation = None;
        self.method = Method::Any;
        self.url_len = 0;
        self.content_length = 0;
        self.ws_key = [0u8; WS_KEY_SLOT_LEN];
        self.requests_on_connection = 0;
        self.flags = FLAG_KEEP_ALIVE;
    }

    /// Copies the parser's classification outcome onto the connection and
    /// resets the parser for the next request on this connection. Called by
    /// the dispatcher once `RequestParser::parse` returns `Ok` or
    /// `Complete`.
    pub fn adopt_parse_outcome(&mut self) {
        let o = &self.parser.outcome;
        self.method = o.method;
        self.url_len = o.url_len;
        self.content_length = o.content_length;
        self.ws_key = o.ws_key;
        self.set_flag(FLAG_KEEP_ALIVE, o.keep_alive);
        self.set_flag(FLAG_IS_WEBSOCKET, o.is_websocket);
        self.set_flag(FLAG_UPGRADE_WS, o.upgrade_ws);
        self.requests_on_connection += 1;
        self.parser.reset();
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url_len(&self) -> usize {
        self.url_len
    }

    pub fn content_length(&self) -> u32 {
        self.content_length
    }

    pub fn ws_key(&self) -> &[u8; WS_KEY_SLOT_LEN] {
        &self.ws_key
    }

    pub fn keep_alive(&self) -> bool {
        self.flag(FLAG_KEEP_ALIVE)
    }

    pub fn is_websocket(&self) -> bool {
        self.flag(FLAG_IS_WEBSOCKET)
    }

    pub fn wants_websocket_upgrade(&self) -> bool {
        self.flag(FLAG_IS_WEBSOCKET) && self.flag(FLAG_UPGRADE_WS)
    }

    pub fn requests_on_connection(&self) -> u32 {
        self.requests_on_connection
    }

    pub fn is_deferred(&self) -> bool {
        self.flag(FLAG_DEFERRED)
    }

    pub fn is_continuation(&self) -> bool {
        self.flag(FLAG_CONTINUATION)
    }

    /// Registers this connection for deferred dispatch. Rejects the request
    /// if continuation mode is already active on this connection, since the
    /// two are mutually exclusive.
    pub fn begin_deferred(&mut self) -> Result<(), CoreError> {
        if self.flag(FLAG_CONTINUATION) {
            return Err(CoreError::InvalidArg);
        }
        self.flags |= FLAG_DEFERRED;
        Ok(())
    }

    /// Registers this connection for continuation dispatch with the given
    /// initial state. Rejects the request if deferred mode is already
    /// active.
    pub fn begin_continuation(&mut self, state: ContinuationState) -> Result<(), CoreError> {
        if self.flag(FLAG_DEFERRED) {
            return Err(CoreError::InvalidArg);
        }
        self.flags |= FLAG_CONTINUATION;
        self.continuation = Some(state);
        Ok(())
    }

    /// Clears whichever dispatch mode is active. Called once a
    /// deferred/continuation handler reports `HandlerStatus::Ok`.
    pub fn end_dispatch_mode(&mut self) {
        self.flags &= !(FLAG_DEFERRED | FLAG_CONTINUATION);
        self.continuation = None;
    }

    fn flag(&self, mask: u16) -> bool {
        (self.flags & mask) != 0
    }

    fn set_flag(&mut self, mask: u16, value: bool) {
        if value {
            self.flags |= mask;
        } else {
            self.flags &= !mask;
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_connection_defaults_keep_alive_true() {
        let conn = ConnectionState::new();
        assert!(conn.keep_alive());
        assert_eq!(conn.lifecycle, Lifecycle::Free);
    }

    #[test]
    fn deferred_and_continuation_are_mutually_exclusive() {
        let mut conn = ConnectionState::new();
        conn.begin_deferred().unwrap();
        assert!(conn.is_deferred());

        let err = conn
            .begin_continuation(ContinuationState::new(10))
            .unwrap_err();
        assert_eq!(err, CoreError::InvalidArg);
        assert!(!conn.is_continuation());
    }

    #[test]
    fn continuation_blocks_deferred() {
        let mut conn = ConnectionState::new();
        conn.begin_continuation(ContinuationState::new(10)).unwrap();
        assert!(conn.begin_deferred().is_err());
    }

    #[test]
    fn end_dispatch_mode_clears_either_flag() {
        let mut conn = ConnectionState::new();
        conn.begin_deferred().unwrap();
        conn.end_dispatch_mode();
        assert!(!conn.is_deferred());
        conn.begin_continuation(ContinuationState::new(5)).unwrap();
        assert!(conn.is_continuation());
        conn.end_dispatch_mode();
        assert!(!conn.is_continuation());
        assert!(conn.continuation.is_none());
    }

    #[test]
    fn reset_for_new_peer_clears_request_count() {
        let mut conn = ConnectionState::new();
        conn.requests_on_connection = 3;
        conn.reset_for_new_peer();
        assert_eq!(conn.requests_on_connection(), 0);
        assert_eq!(conn.lifecycle, Lifecycle::ReadingHeaders);
    }
}
