//! Compile-time sizing constants and runtime-tunable connection parameters.
//!
//! Slot geometry (`SLOT_SIZE`, `N_SLOTS`) and the parser's limit constants
//! are fixed at compile time: they determine memory layout, and this crate
//! does not grow buffers dynamically beyond the configured slot size.
//! Everything else an embedder might reasonably want to tune per-deployment
//! (idle timeout, accept batching) lives in [`CoreConfig`], following the
//! plain-struct-with-`Default` shape used for `TcpConfig` in this codebase.

use std::time::Duration;

/// Size in bytes of one `BufferPool` slot.
pub const SLOT_SIZE: usize = 8192;

/// Number of slots in the `BufferPool`.
pub const N_SLOTS: usize = 8;

/// Maximum method length (`OPTIONS` is the longest supported method).
pub const MAX_METHOD_LEN: usize = 7;

/// Maximum URL length.
pub const MAX_URL_LEN: usize = 255;

/// Maximum header key length.
pub const MAX_HEADER_KEY_LEN: usize = 64;

/// Maximum header value length.
///
/// A `u8`-width length counter makes 255 itself ambiguous as a threshold
/// (is it the 255th byte, or the first byte that overflows?), so this
/// implementation picks 254 as the enforceable maximum and rejects
/// anything longer.
pub const MAX_HEADER_VALUE_LEN: usize = 254;

/// Maximum total bytes consumed across one request before
/// `HEADERS_COMPLETE`.
pub const MAX_HEADER_BYTES: usize = 4096;

/// Maximum stored length of a `Sec-WebSocket-Key` value, including a
/// trailing NUL.
pub const WS_KEY_SLOT_LEN: usize = 32;

/// Runtime-tunable parameters that do not affect slot memory layout.
///
/// Constructed in-process by the embedder; this crate has no CLI, env, or
/// persisted configuration of its own.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    // === Connection lifecycle ===
    /// Idle timeout after which a connection with no activity is closed.
    pub idle_timeout: Duration,

    /// Maximum requests served on one keep-alive connection before it is
    /// forced to close (0 = unlimited).
    pub max_requests_per_connection: u32,

    // === Event loop ===
    /// Maximum number of connections the owner processes per readiness
    /// sweep before yielding back to the poll call.
    pub max_events_per_tick: u32,

    // === Chunked encoding ===
    /// Whether the dispatcher is permitted to use chunked transfer encoding
    /// for responses without a known `Content-Length`.
    pub chunked_encoding_enabled: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            max_requests_per_connection: 100,
            max_events_per_tick: 64,
            chunked_encoding_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let cfg = CoreConfig::default();
        assert!(cfg.idle_timeout > Duration::ZERO);
        assert!(cfg.max_events_per_tick > 0);
    }

    #[test]
    fn slot_geometry_matches_spec_example() {
        assert_eq!(SLOT_SIZE, 8192);
        assert_eq!(N_SLOTS, 8);
    }
}
