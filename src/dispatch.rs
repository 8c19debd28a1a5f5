//! Dispatcher glue: turns parser progress into handler invocations and
//! applies the error-propagation policy, a `PROTOCOL_ERROR` becomes a
//! synthetic `400 Bad Request` if no response bytes have gone out yet,
//! otherwise the connection is simply closed, since a client mid-response
//! cannot be trusted to parse a correct error body appended after whatever
//! was already sent.
//!
//! This is the thinnest module in the crate; it owns no state of its own,
//! only the translation between [`crate::parser::RequestParser`] and
//! [`crate::connection::ConnectionState`]. Grounded on
//! `transport::tcp::mod`'s read-event handling, which performs the same
//! "decode, then either hand off or tear down" translation for its framed
//! protocol.

use crate::connection::{CloseReason, ConnectionState, Lifecycle};
use crate::error::{CoreError, HandlerStatus, ParseStatus};
use crate::parser::{HeaderSink, RequestParser};
use crate::pool::BufferPool;

/// Minimal well-formed error response. No body: a client that gets this
/// far only needs to know the connection is done.
const BAD_REQUEST_RESPONSE: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

/// What the owner should do after feeding a chunk of socket bytes to the
/// parser.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No terminal parser state yet; keep reading.
    NeedMore,
    /// Headers (and, for WebSocket, the upgrade) are ready; the owner
    /// should invoke the route handler now. `ConnectionState`'s
    /// classification fields are already populated.
    Dispatch,
    /// The connection must be torn down; no further reads/writes.
    Close(CloseReason),
}

/// Feeds `bytes` to `conn`'s parser and translates the result.
///
/// `pool` is used only on the error path, to best-effort queue a
/// synthetic 400 response; a pool-exhaustion failure there is swallowed
/// (the connection is being closed either way, and there is nothing
/// useful to do if no slot is free).
pub fn feed_request_bytes(
    conn: &mut ConnectionState,
    sink: &mut dyn HeaderSink,
    bytes: &[u8],
    pool: &mut BufferPool,
) -> DispatchOutcome {
    match RequestParser::parse(&mut conn.parser, sink, bytes) {
        Ok(ParseStatus::NeedMore) => DispatchOutcome::NeedMore,
        Ok(ParseStatus::Ok | ParseStatus::Complete) => {
            conn.adopt_parse_outcome();
            conn.lifecycle = if conn.wants_websocket_upgrade() {
                Lifecycle::WebSocket
            } else if conn.content_length() > 0 {
                Lifecycle::HttpBody
            } else {
                Lifecycle::Writing
            };
            DispatchOutcome::Dispatch
        }
        Err(err) => DispatchOutcome::Close(respond_to_error(conn, pool, &err)),
    }
}

/// Applies the error propagation policy for a parser/handler-reported error.
fn respond_to_error(conn: &mut ConnectionState, pool: &mut BufferPool, err: &CoreError) -> CloseReason {
    log::warn!("closing connection after error: {err}");
    if !conn.send.headers_done() {
        let _ = conn.send.alloc(pool);
        let _ = conn.send.queue(pool, BAD_REQUEST_RESPONSE);
        conn.send.set_headers_done(true);
    }
    conn.lifecycle = Lifecycle::Closing;
    conn.close_reason = Some(CloseReason::ProtocolError);
    CloseReason::ProtocolError
}

/// A completed route handler invocation's outcome, once the body (if any)
/// has been fully delivered via continuation/deferred dispatch or was
/// small enough to have already arrived with the headers.
pub trait RequestHandler {
    /// Called once per request once `DispatchOutcome::Dispatch` fires.
    /// A `HandlerStatus::WouldBlock` return with no prior call to
    /// `ConnectionState::begin_deferred`/`begin_continuation` is treated as
    /// a programming error by the caller (the owner has no way to know
    /// when to re-poll) and logged as such.
    fn dispatch(&mut self, conn: &mut ConnectionState) -> Result<HandlerStatus, CoreError>;
}

/// Invokes `handler` for `conn`, propagating a handler error the same way
/// a parser error is propagated, and warning if the handler requested
/// `WouldBlock` without registering a dispatch mode to be resumed under.
pub fn run_handler(
    conn: &mut ConnectionState,
    pool: &mut BufferPool,
    handler: &mut dyn RequestHandler,
) -> Result<HandlerStatus, CloseReason> {
    match handler.dispatch(conn) {
        Ok(HandlerStatus::WouldBlock) if !conn.is_deferred() && !conn.is_continuation() => {
            log::warn!("handler returned would_block without registering a dispatch mode");
            Ok(HandlerStatus::WouldBlock)
        }
        Ok(status) => Ok(status),
        Err(err) => Err(respond_to_error(conn, pool, &err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::NullHeaderSink;

    #[test]
    fn needs_more_on_partial_request() {
        let mut conn = ConnectionState::new();
        let mut pool = BufferPool::new();
        let mut sink = NullHeaderSink;
        let outcome = feed_request_bytes(&mut conn, &mut sink, b"GET / HTTP/1.1\r\n", &mut pool);
        assert_eq!(outcome, DispatchOutcome::NeedMore);
    }

    #[test]
    fn dispatch_on_headers_complete() {
        let mut conn = ConnectionState::new();
        let mut pool = BufferPool::new();
        let mut sink = NullHeaderSink;
        let outcome = feed_request_bytes(
            &mut conn,
            &mut sink,
            b"GET / HTTP/1.1\r\nHost: x\r\n\r\n",
            &mut pool,
        );
        assert_eq!(outcome, DispatchOutcome::Dispatch);
        assert_eq!(conn.lifecycle, Lifecycle::Writing);
    }

    #[test]
    fn body_request_moves_to_http_body_state() {
        let mut conn = ConnectionState::new();
        let mut pool = BufferPool::new();
        let mut sink = NullHeaderSink;
        let outcome = feed_request_bytes(
            &mut conn,
            &mut sink,
            b"POST / HTTP/1.1\r\nContent-Length: 3\r\n\r\n",
            &mut pool,
        );
        assert_eq!(outcome, DispatchOutcome::Dispatch);
        assert_eq!(conn.lifecycle, Lifecycle::HttpBody);
    }

    #[test]
    fn protocol_error_queues_400_when_headers_not_sent() {
        let mut conn = ConnectionState::new();
        let mut pool = BufferPool::new();
        let mut sink = NullHeaderSink;
        let mut bad = vec![b'X'; 100];
        bad.extend_from_slice(b": v\r\n\r\n");
        let mut input = b"GET / HTTP/1.1\r\n".to_vec();
        input.extend(bad);

        let outcome = feed_request_bytes(&mut conn, &mut sink, &input, &mut pool);
        assert_eq!(outcome, DispatchOutcome::Close(CloseReason::ProtocolError));
        assert!(conn.send.pending() > 0);
        assert_eq!(conn.lifecycle, Lifecycle::Closing);
    }

    #[test]
    fn protocol_error_skips_response_when_headers_already_sent() {
        let mut conn = ConnectionState::new();
        let mut pool = BufferPool::new();
        conn.send.alloc(&mut pool).unwrap();
        conn.send.set_headers_done(true);
        let mut sink = NullHeaderSink;

        let mut bad = vec![b'X'; 100];
        bad.extend_from_slice(b": v\r\n\r\n");
        let mut input = b"GET / HTTP/1.1\r\n".to_vec();
        input.extend(bad);

        let outcome = feed_request_bytes(&mut conn, &mut sink, &input, &mut pool);
        assert_eq!(outcome, DispatchOutcome::Close(CloseReason::ProtocolError));
        assert_eq!(conn.send.pending(), 0);
    }
}
