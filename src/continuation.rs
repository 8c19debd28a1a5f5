//! Continuation and deferred dispatch: the two cooperative modes a handler
//! uses to process a body too large (or too slow) to buffer in one go
//! without blocking the single event-loop thread.
//!
//! Continuation mode feeds the handler one chunk at a time as bytes arrive
//! off the socket. Deferred mode re-polls a handler that is waiting on
//! something other than more request bytes (e.g. a downstream resource)
//! once the owner's event loop comes back around. Both report the same
//! `{OK, WOULD_BLOCK, err}` contract as the rest of this crate, and
//! `ConnectionState` enforces that only one is active per connection at a
//! time.

use crate::error::{CoreError, HandlerStatus};

/// Opaque progress record a continuation handler carries between chunks.
/// The dispatcher owns the struct; only the handler interprets `phase`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuationState {
    /// Handler-defined stage; meaningless to the transport core.
    pub phase: u8,
    pub expected_bytes: u32,
    pub received_bytes: u32,
}

impl ContinuationState {
    pub fn new(expected_bytes: u32) -> Self {
        Self {
            phase: 0,
            expected_bytes,
            received_bytes: 0,
        }
    }

    /// `true` once every expected byte has been handed to the handler.
    pub fn is_complete(&self) -> bool {
        self.received_bytes >= self.expected_bytes
    }
}

/// Invoked once per available chunk of request body while a connection is
/// in continuation mode. `data` is `None` on the final call once
/// `expected_bytes` have already been delivered, giving the handler a
/// chance to finalize without new bytes.
pub trait ContinuationHandler {
    fn on_chunk(
        &mut self,
        data: Option<&[u8]>,
        state: &mut ContinuationState,
    ) -> Result<HandlerStatus, CoreError>;
}

/// Feeds one chunk to `handler`, updating `state.received_bytes` first so
/// the handler can inspect its own progress mid-call.
///
/// Returns the handler's status. A handler that returns
/// `HandlerStatus::WouldBlock` after `state.is_complete()` is a protocol
/// violation on the handler's part (it has already seen every byte the
/// request promised) and is reported as `CoreError::Protocol`.
pub fn feed_chunk(
    handler: &mut dyn ContinuationHandler,
    state: &mut ContinuationState,
    data: &[u8],
) -> Result<HandlerStatus, CoreError> {
    state.received_bytes = state.received_bytes.saturating_add(data.len() as u32);
    let chunk = if data.is_empty() { None } else { Some(data) };
    let status = handler.on_chunk(chunk, state)?;
    if status == HandlerStatus::WouldBlock && state.is_complete() {
        log::warn!("continuation handler requested more data past expected_bytes");
        return Err(CoreError::Protocol(
            "continuation handler would_block past expected body size",
        ));
    }
    Ok(status)
}

/// Re-polled by the owner's event loop while a connection is in deferred
/// mode. Unlike continuation mode there is no new request data to hand
/// over: the handler is waiting on something external to the connection.
pub trait DeferredHandler {
    fn poll(&mut self) -> Result<HandlerStatus, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler {
        chunks_seen: u32,
        chunks_needed: u32,
    }

    impl ContinuationHandler for CountingHandler {
        fn on_chunk(
            &mut self,
            data: Option<&[u8]>,
            _state: &mut ContinuationState,
        ) -> Result<HandlerStatus, CoreError> {
            if data.is_some() {
                self.chunks_seen += 1;
            }
            if self.chunks_seen >= self.chunks_needed {
                Ok(HandlerStatus::Ok)
            } else {
                Ok(HandlerStatus::WouldBlock)
            }
        }
    }

    #[test]
    fn continuation_completes_after_n_chunks() {
        let mut handler = CountingHandler {
            chunks_seen: 0,
            chunks_needed: 3,
        };
        let mut state = ContinuationState::new(30);

        let mut last = HandlerStatus::WouldBlock;
        for chunk in [b"aaaaaaaaaa".as_slice(), b"bbbbbbbbbb", b"cccccccccc"] {
            last = feed_chunk(&mut handler, &mut state, chunk).unwrap();
        }

        assert_eq!(last, HandlerStatus::Ok);
        assert!(state.is_complete());
        assert_eq!(state.received_bytes, 30);
    }

    #[test]
    fn would_block_past_expected_bytes_is_protocol_error() {
        struct AlwaysBlocks;
        impl ContinuationHandler for AlwaysBlocks {
            fn on_chunk(
                &mut self,
                _data: Option<&[u8]>,
                _state: &mut ContinuationState,
            ) -> Result<HandlerStatus, CoreError> {
                Ok(HandlerStatus::WouldBlock)
            }
        }

        let mut handler = AlwaysBlocks;
        let mut state = ContinuationState::new(5);
        let err = feed_chunk(&mut handler, &mut state, b"12345").unwrap_err();
        assert!(matches!(err, CoreError::Protocol(_)));
    }

    #[test]
    fn final_call_with_no_new_bytes_passes_none() {
        struct SeenNone(bool);
        impl ContinuationHandler for SeenNone {
            fn on_chunk(
                &mut self,
                data: Option<&[u8]>,
                _state: &mut ContinuationState,
            ) -> Result<HandlerStatus, CoreError> {
                self.0 = data.is_none();
                Ok(HandlerStatus::Ok)
            }
        }

        let mut handler = SeenNone(false);
        let mut state = ContinuationState::new(0);
        feed_chunk(&mut handler, &mut state, b"").unwrap();
        assert!(handler.0);
    }
}
