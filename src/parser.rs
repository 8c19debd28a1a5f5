//! Streaming HTTP/1.1 request-line + header parser.
//!
//! Consumes incoming bytes in arbitrary-size chunks and drives a connection
//! through `METHOD -> URL -> VERSION -> (HEADER_KEY <-> HEADER_VALUE)* ->
//! HEADERS_COMPLETE -> (BODY | COMPLETE)`. There is no directly analogous
//! textual-header state machine elsewhere in this codebase (its other wire
//! formats are binary/length-prefixed), so the *shape* of this type, a
//! small enum tracking exactly where a resumable scan left off, fed one
//! external chunk at a time, never retaining slices past the call that
//! produced them, follows `transport::tcp::frame_codec::FrameCodec`'s
//! `ReadState`/`decode` pair.

use crate::config::{
    MAX_HEADER_BYTES, MAX_HEADER_KEY_LEN, MAX_HEADER_VALUE_LEN, MAX_METHOD_LEN, MAX_URL_LEN,
    WS_KEY_SLOT_LEN,
};
use crate::error::{CoreError, ParseStatus};
use crate::header_classifier::{self, HeaderKind};

/// Recognized HTTP methods. Anything not in this table maps to `Any`, which
/// is not an error; routes may still match it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Head,
    Delete,
    Options,
    #[default]
    Any,
}

impl Method {
    fn from_bytes(bytes: &[u8]) -> Self {
        match bytes {
            b"GET" => Method::Get,
            b"POST" => Method::Post,
            b"PUT" => Method::Put,
            b"PATCH" => Method::Patch,
            b"HEAD" => Method::Head,
            b"DELETE" => Method::Delete,
            b"OPTIONS" => Method::Options,
            _ => Method::Any,
        }
    }

    /// Methods whose requests carry a body when `Content-Length > 0`.
    fn expects_body_with_content_length(self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

/// Receives raw header key/value slices as they are parsed.
///
/// Implementations must copy the bytes if they need them beyond the call:
/// the slices are only valid for the duration of the `store_header`
/// invocation.
pub trait HeaderSink {
    fn store_header(&mut self, key: &[u8], value: &[u8]);
}

/// A `HeaderSink` that discards everything; useful for tests and for
/// callers that only care about the classified side effects.
pub struct NullHeaderSink;

impl HeaderSink for NullHeaderSink {
    fn store_header(&mut self, _key: &[u8], _value: &[u8]) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Method,
    Url,
    Version,
    HeaderKey,
    HeaderValue,
}

/// Classification-derived fields the parser accumulates as it scans one
/// request's headers, read out by the owning `ConnectionState` once
/// scanning completes.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub method: Method,
    pub url_len: usize,
    pub content_length: u32,
    pub keep_alive: bool,
    pub is_websocket: bool,
    pub upgrade_ws: bool,
    pub header_bytes: usize,
    pub ws_key: [u8; WS_KEY_SLOT_LEN],
}

impl ParseOutcome {
    fn reset(&mut self) {
        *self = ParseOutcome {
            keep_alive: true,
            ..Default::default()
        };
    }
}

/// The parser's resumable state: current scan position, provisional
/// buffers for the method, URL, and current header key/value, and running
/// counters.
///
/// `outcome` is only valid for the request currently being scanned, and
/// stays populated with that request's classification after
/// `RequestParser::parse` returns `ParseStatus::Ok`/`Complete` so the
/// caller can read it. A caller that reuses this context for a second
/// request must read `outcome` and then call `reset` before feeding it any
/// more bytes, or the new request's scan will start against stale
/// `outcome` fields that weren't overwritten by the new headers (no
/// `Content-Length` header on request two, for instance, would leave
/// request one's value in place). `ConnectionState::adopt_parse_outcome`
/// does exactly this and is the expected way to drive this type; it is
/// documented here for callers that use `ParserContext` directly instead.
pub struct ParserContext {
    scan: Scan,
    method_buf: [u8; MAX_METHOD_LEN],
    method_len: usize,
    url_buf: [u8; MAX_URL_LEN],
    url_len: usize,
    key_buf: [u8; MAX_HEADER_KEY_LEN],
    key_len: usize,
    value_buf: [u8; MAX_HEADER_VALUE_LEN],
    value_len: usize,
    header_count: u32,
    total_consumed: usize,
    pub outcome: ParseOutcome,
}

impl ParserContext {
    pub fn new() -> Self {
        Self {
            scan: Scan::Method,
            method_buf: [0; MAX_METHOD_LEN],
            method_len: 0,
            url_buf: [0; MAX_URL_LEN],
            url_len: 0,
            key_buf: [0; MAX_HEADER_KEY_LEN],
            key_len: 0,
            value_buf: [0; MAX_HEADER_VALUE_LEN],
            value_len: 0,
            header_count: 0,
            total_consumed: 0,
            outcome: ParseOutcome {
                keep_alive: true,
                ..Default::default()
            },
        }
    }

    /// Resets scan position and `outcome` to scan a brand new request.
    /// Callers driving this type directly (not through
    /// `ConnectionState::adopt_parse_outcome`) must call this after reading
    /// `outcome` from a completed parse and before feeding bytes for the
    /// next request on the same context.
    pub fn reset(&mut self) {
        self.scan = Scan::Method;
        self.method_len = 0;
        self.url_len = 0;
        self.key_len = 0;
        self.value_len = 0;
        self.header_count = 0;
        self.total_consumed = 0;
        self.outcome.reset();
    }

    pub fn header_count(&self) -> u32 {
        self.header_count
    }
}

impl Default for ParserContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateless driver for `ParserContext`. All state lives in the context so
/// a connection pool can share one `RequestParser` across every connection.
pub struct RequestParser;

impl RequestParser {
    /// Feed the next chunk of bytes for the request `ctx` is scanning.
    ///
    /// `sink` receives one `store_header` call per completed header, in
    /// wire order. On `ParseStatus::Ok`/`Complete`, `ctx.outcome` holds the
    /// classification for the request that just finished; see the
    /// `ParserContext` and `ParserContext::reset` docs for the contract
    /// around reusing `ctx` for a second request.
    pub fn parse(
        ctx: &mut ParserContext,
        sink: &mut dyn HeaderSink,
        bytes: &[u8],
    ) -> Result<ParseStatus, CoreError> {
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            i += 1;
            ctx.total_consumed += 1;
            if ctx.total_consumed > MAX_HEADER_BYTES {
                log::warn!("request parser: headers too large");
                return Err(CoreError::Protocol("headers too large"));
            }

            match ctx.scan {
                Scan::Method => {
                    if b == b' ' {
                        ctx.outcome.method = Method::from_bytes(&ctx.method_buf[..ctx.method_len]);
                        ctx.scan = Scan::Url;
                    } else {
                        if ctx.method_len >= MAX_METHOD_LEN {
                            return Err(CoreError::Protocol("method too long"));
                        }
                        ctx.method_buf[ctx.method_len] = b;
                        ctx.method_len += 1;
                    }
                }
                Scan::Url => {
                    if b == b' ' {
                        ctx.outcome.url_len = ctx.url_len;
                        ctx.scan = Scan::Version;
                    } else {
                        if ctx.url_len >= MAX_URL_LEN {
                            return Err(CoreError::Protocol("url too long"));
                        }
                        ctx.url_buf[ctx.url_len] = b;
                        ctx.url_len += 1;
                    }
                }
                Scan::Version => {
                    if b == b'\n' {
                        ctx.scan = Scan::HeaderKey;
                    }
                    // Any other byte (including '\r') is part of the
                    // version token or its line ending; the core does not
                    // validate the HTTP version string itself.
                }
                Scan::HeaderKey => {
                    if b == b'\r' {
                        continue;
                    }
                    if b == b'\n' {
                        if ctx.key_len == 0 {
                            ctx.outcome.header_bytes = ctx.total_consumed;
                            let status = Self::headers_complete(ctx);
                            ctx.reset_keep_outcome();
                            return Ok(status);
                        }
                        return Err(CoreError::Protocol("header line missing colon"));
                    }
                    if ctx.key_len == 0 && (b == b' ' || b == b'\t') {
                        continue;
                    }
                    if b == b':' {
                        ctx.scan = Scan::HeaderValue;
                        ctx.value_len = 0;
                        continue;
                    }
                    if ctx.key_len >= MAX_HEADER_KEY_LEN {
                        return Err(CoreError::Protocol("header key too long"));
                    }
                    ctx.key_buf[ctx.key_len] = b;
                    ctx.key_len += 1;
                }
                Scan::HeaderValue => {
                    if b == b'\r' {
                        continue;
                    }
                    if b == b'\n' {
                        Self::process_header(ctx, sink);
                        ctx.key_len = 0;
                        ctx.value_len = 0;
                        ctx.scan = Scan::HeaderKey;
                        continue;
                    }
                    if ctx.value_len == 0 && (b == b' ' || b == b'\t') {
                        continue;
                    }
                    if ctx.value_len >= MAX_HEADER_VALUE_LEN {
                        return Err(CoreError::Protocol("header value too long"));
                    }
                    ctx.value_buf[ctx.value_len] = b;
                    ctx.value_len += 1;
                }
            }
        }
        Ok(ParseStatus::NeedMore)
    }

    /// Applies one completed header: forwards it to the user sink, then
    /// classifies the key and applies the targeted side effects
    /// (`Content-Length`, `Connection`, `Upgrade`, `Sec-WebSocket-Key`).
    fn process_header(ctx: &mut ParserContext, sink: &mut dyn HeaderSink) {
        let key = &ctx.key_buf[..ctx.key_len];
        let value = &ctx.value_buf[..ctx.value_len];
        sink.store_header(key, value);
        ctx.header_count += 1;

        match header_classifier::classify(key) {
            HeaderKind::ContentLength => {
                ctx.outcome.content_length = header_classifier::parse_content_length(value);
            }
            HeaderKind::Connection => {
                ctx.outcome.keep_alive = header_classifier::parse_keep_alive(value);
            }
            HeaderKind::Upgrade => {
                if header_classifier::is_websocket_upgrade(value) {
                    ctx.outcome.upgrade_ws = true;
                }
            }
            HeaderKind::SecWebSocketKey => {
                let n = value.len().min(WS_KEY_SLOT_LEN - 1);
                ctx.outcome.ws_key = [0u8; WS_KEY_SLOT_LEN];
                ctx.outcome.ws_key[..n].copy_from_slice(&value[..n]);
                ctx.outcome.is_websocket = true;
            }
            _ => {}
        }
    }

    /// Decides the terminal status once the blank line ending the header
    /// block is reached: a body-bearing method with a positive
    /// `Content-Length` needs a body read next, everything else is ready
    /// to dispatch immediately.
    fn headers_complete(ctx: &ParserContext) -> ParseStatus {
        let o = &ctx.outcome;
        if o.method.expects_body_with_content_length() && o.content_length > 0 {
            ParseStatus::Ok
        } else if o.is_websocket && o.upgrade_ws {
            ParseStatus::Complete
        } else {
            ParseStatus::Complete
        }
    }
}

impl ParserContext {
    /// Prepares the context to scan the next request while leaving
    /// `outcome` intact for the caller to read the just-completed result.
    /// The very next `parse` call after this will begin overwriting
    /// `outcome` byte by byte as new headers arrive, so callers must copy
    /// anything they need out of `outcome` before feeding more bytes.
    fn reset_keep_outcome(&mut self) {
        self.scan = Scan::Method;
        self.method_len = 0;
        self.url_len = 0;
        self.key_len = 0;
        self.value_len = 0;
        self.header_count = 0;
        self.total_consumed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        headers: Vec<(Vec<u8>, Vec<u8>)>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { headers: Vec::new() }
        }
    }

    impl HeaderSink for RecordingSink {
        fn store_header(&mut self, key: &[u8], value: &[u8]) {
            self.headers.push((key.to_vec(), value.to_vec()));
        }
    }

    #[test]
    fn happy_path_with_content_length() {
        let mut ctx = ParserContext::new();
        let mut sink = RecordingSink::new();
        let input = b"GET /index.html HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello";

        let status = RequestParser::parse(&mut ctx, &mut sink, input).unwrap();
        assert_eq!(status, ParseStatus::Ok);
        assert_eq!(ctx.outcome.method, Method::Get);
        assert_eq!(ctx.outcome.content_length, 5);

        let body_start = ctx.outcome.header_bytes;
        assert_eq!(&input[body_start..], b"hello");
        assert_eq!(
            sink.headers,
            vec![
                (b"Host".to_vec(), b"x".to_vec()),
                (b"Content-Length".to_vec(), b"5".to_vec()),
            ]
        );
    }

    #[test]
    fn get_without_body_completes() {
        let mut ctx = ParserContext::new();
        let mut sink = RecordingSink::new();
        let input = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let status = RequestParser::parse(&mut ctx, &mut sink, input).unwrap();
        assert_eq!(status, ParseStatus::Complete);
    }

    #[test]
    fn websocket_upgrade_detected() {
        let mut ctx = ParserContext::new();
        let mut sink = RecordingSink::new();
        let input = b"GET /ws HTTP/1.1\r\n\
Host: x\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        let status = RequestParser::parse(&mut ctx, &mut sink, input).unwrap();
        assert_eq!(status, ParseStatus::Complete);
        assert!(ctx.outcome.is_websocket);
        assert!(ctx.outcome.upgrade_ws);
        assert_eq!(&ctx.outcome.ws_key[..24], b"dGhlIHNhbXBsZSBub25jZQ==");
    }

    #[test]
    fn content_length_overflow_clamped() {
        let mut ctx = ParserContext::new();
        let mut sink = RecordingSink::new();
        let input = b"POST / HTTP/1.1\r\nContent-Length: 99999999999\r\n\r\n";
        let status = RequestParser::parse(&mut ctx, &mut sink, input).unwrap();
        assert_eq!(status, ParseStatus::Ok);
        assert_eq!(ctx.outcome.content_length, u32::MAX);
    }

    #[test]
    fn streaming_idempotence_arbitrary_split() {
        let input: &[u8] =
            b"GET /index.html HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello";
        let split_at_headers_end = input.len() - 5;

        for split in [1, 3, 10, 17, 24, 25, 26, 40, split_at_headers_end] {
            let mut ctx = ParserContext::new();
            let mut sink = RecordingSink::new();
            let (first, second) = input.split_at(split.min(split_at_headers_end));

            let status1 = RequestParser::parse(&mut ctx, &mut sink, first).unwrap();
            let status = if status1 == ParseStatus::NeedMore {
                RequestParser::parse(&mut ctx, &mut sink, second).unwrap()
            } else {
                status1
            };
            assert_eq!(status, ParseStatus::Ok, "split at {split} failed");
            assert_eq!(ctx.outcome.content_length, 5);
        }
    }

    #[test]
    fn method_too_long_errors() {
        let mut ctx = ParserContext::new();
        let mut sink = RecordingSink::new();
        let input = b"SUPERLONGMETHOD / HTTP/1.1\r\n\r\n";
        let err = RequestParser::parse(&mut ctx, &mut sink, input).unwrap_err();
        assert_eq!(err, CoreError::Protocol("method too long"));
    }

    #[test]
    fn url_too_long_errors() {
        let mut ctx = ParserContext::new();
        let mut sink = RecordingSink::new();
        let mut input = b"GET /".to_vec();
        input.extend(std::iter::repeat(b'a').take(300));
        input.extend_from_slice(b" HTTP/1.1\r\n\r\n");
        let err = RequestParser::parse(&mut ctx, &mut sink, &input).unwrap_err();
        assert_eq!(err, CoreError::Protocol("url too long"));
    }

    #[test]
    fn header_key_too_long_errors() {
        let mut ctx = ParserContext::new();
        let mut sink = RecordingSink::new();
        let mut input = b"GET / HTTP/1.1\r\n".to_vec();
        input.extend(std::iter::repeat(b'x').take(100));
        input.extend_from_slice(b": v\r\n\r\n");
        let err = RequestParser::parse(&mut ctx, &mut sink, &input).unwrap_err();
        assert_eq!(err, CoreError::Protocol("header key too long"));
    }

    #[test]
    fn header_value_too_long_errors() {
        let mut ctx = ParserContext::new();
        let mut sink = RecordingSink::new();
        let mut input = b"GET / HTTP/1.1\r\nX: ".to_vec();
        input.extend(std::iter::repeat(b'v').take(300));
        input.extend_from_slice(b"\r\n\r\n");
        let err = RequestParser::parse(&mut ctx, &mut sink, &input).unwrap_err();
        assert_eq!(err, CoreError::Protocol("header value too long"));
    }

    #[test]
    fn headers_too_large_errors() {
        let mut ctx = ParserContext::new();
        let mut sink = RecordingSink::new();
        let mut input = b"GET / HTTP/1.1\r\n".to_vec();
        for n in 0..100 {
            input.extend_from_slice(format!("X-Header-{n}: value-{n}\r\n").as_bytes());
        }
        input.extend_from_slice(b"\r\n");
        let err = RequestParser::parse(&mut ctx, &mut sink, &input).unwrap_err();
        assert_eq!(err, CoreError::Protocol("headers too large"));
    }

    #[test]
    fn bare_lf_tolerated() {
        let mut ctx = ParserContext::new();
        let mut sink = RecordingSink::new();
        let input = b"GET / HTTP/1.1\nHost: x\n\n";
        let status = RequestParser::parse(&mut ctx, &mut sink, input).unwrap();
        assert_eq!(status, ParseStatus::Complete);
        assert_eq!(sink.headers, vec![(b"Host".to_vec(), b"x".to_vec())]);
    }

    #[test]
    fn unrecognized_method_maps_to_any() {
        let mut ctx = ParserContext::new();
        let mut sink = RecordingSink::new();
        let input = b"LINK / HTTP/1.1\r\n\r\n";
        RequestParser::parse(&mut ctx, &mut sink, input).unwrap();
        assert_eq!(ctx.outcome.method, Method::Any);
    }

    #[test]
    fn keep_alive_defaults_true_on_fresh_context() {
        let ctx = ParserContext::new();
        assert!(ctx.outcome.keep_alive);
    }
}
