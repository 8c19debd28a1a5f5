//! Case-insensitive recognition of the handful of headers the transport
//! core needs to act on directly.
//!
//! Lookup is dispatched by the lowercased first character of the key to
//! avoid a linear scan over the ~dozen candidates.

/// Semantic header types the core cares about. Anything else classifies as
/// `Unknown` and is left to the user header sink / route handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Host,
    ContentLength,
    ContentType,
    Connection,
    Cookie,
    Upgrade,
    UserAgent,
    SecWebSocketKey,
    SecWebSocketVersion,
    Authorization,
    Accept,
    Origin,
    Unknown,
}

fn eq_ignore_case(key: &[u8], name: &str) -> bool {
    key.len() == name.len()
        && key
            .iter()
            .zip(name.as_bytes())
            .all(|(a, b)| a.to_ascii_lowercase() == *b)
}

/// Classify a raw header key (case-insensitive).
pub fn classify(key: &[u8]) -> HeaderKind {
    let Some(&first) = key.first() else {
        return HeaderKind::Unknown;
    };
    match first.to_ascii_lowercase() {
        b'h' if eq_ignore_case(key, "host") => HeaderKind::Host,
        b'c' => {
            if eq_ignore_case(key, "content-length") {
                HeaderKind::ContentLength
            } else if eq_ignore_case(key, "content-type") {
                HeaderKind::ContentType
            } else if eq_ignore_case(key, "connection") {
                HeaderKind::Connection
            } else if eq_ignore_case(key, "cookie") {
                HeaderKind::Cookie
            } else {
                HeaderKind::Unknown
            }
        }
        b'u' => {
            if eq_ignore_case(key, "upgrade") {
                HeaderKind::Upgrade
            } else if eq_ignore_case(key, "user-agent") {
                HeaderKind::UserAgent
            } else {
                HeaderKind::Unknown
            }
        }
        b's' => {
            if eq_ignore_case(key, "sec-websocket-key") {
                HeaderKind::SecWebSocketKey
            } else if eq_ignore_case(key, "sec-websocket-version") {
                HeaderKind::SecWebSocketVersion
            } else {
                HeaderKind::Unknown
            }
        }
        b'a' => {
            if eq_ignore_case(key, "authorization") {
                HeaderKind::Authorization
            } else if eq_ignore_case(key, "accept") {
                HeaderKind::Accept
            } else {
                HeaderKind::Unknown
            }
        }
        b'o' if eq_ignore_case(key, "origin") => HeaderKind::Origin,
        _ => HeaderKind::Unknown,
    }
}

/// Decides keep-alive from a raw `Connection:` header value.
///
/// Permissive by design: scans for `"keep-alive"` or `"close"` anywhere in
/// the value, not just as an exact token. `close` wins if both substrings
/// appear; `keep-alive` wins if it appears alone; HTTP/1.1's default
/// (`true`) applies when neither appears. Exact-string fast paths are
/// checked first since they're by far the common case.
pub fn parse_keep_alive(value: &[u8]) -> bool {
    let mut lower = [0u8; crate::config::MAX_HEADER_VALUE_LEN];
    let n = value.len().min(lower.len());
    for (dst, src) in lower[..n].iter_mut().zip(&value[..n]) {
        *dst = src.to_ascii_lowercase();
    }
    let lower = &lower[..n];

    if lower == b"close" {
        return false;
    }
    if lower == b"keep-alive" {
        return true;
    }

    let has_close = contains(lower, b"close");
    let has_keep_alive = contains(lower, b"keep-alive");

    if has_close {
        false
    } else if has_keep_alive {
        true
    } else {
        true
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return needle.is_empty();
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Decimal-parses a `Content-Length` value, clamped to `u32::MAX`. Values
/// longer than 10 digits (which can never fit in `u32` anyway) short-circuit
/// straight to the clamp rather than overflowing through the loop.
pub fn parse_content_length(value: &[u8]) -> u32 {
    if value.len() > 10 {
        return u32::MAX;
    }
    let mut acc: u64 = 0;
    for &b in value {
        if !b.is_ascii_digit() {
            return u32::MAX;
        }
        acc = acc * 10 + u64::from(b - b'0');
        if acc > u64::from(u32::MAX) {
            return u32::MAX;
        }
    }
    acc as u32
}

/// `true` iff `value` case-insensitively starts with `"websocket"` and is
/// at least 9 bytes long.
pub fn is_websocket_upgrade(value: &[u8]) -> bool {
    value.len() >= 9 && eq_ignore_case(&value[..9], "websocket")
}
