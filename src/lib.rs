//! Transport core for an embedded HTTP/1.1 server.
//!
//! Single-threaded, pool-backed, and built around two state machines that
//! never allocate after startup:
//!
//! ```text
//!            accept
//!              |
//!              v
//!   +---------------------+        parser::RequestParser
//!   |   ConnectionState    | <----  feeds bytes, classifies headers
//!   |  - ParserContext     |
//!   |  - SendBuffer        |  ---->  dispatch::feed_request_bytes
//!   |  - Lifecycle         |         translates COMPLETE/OK into
//!   +----------+-----------+         RequestHandler::dispatch
//!              |
//!              v
//!     continuation::{ContinuationHandler, DeferredHandler}
//!       cooperative handling of bodies too large to buffer whole
//! ```
//!
//! `pool::BufferPool` is the single allocation underneath all of it: a
//! fixed bank of slots, handed out by index and recycled between
//! connections, never returned to the global allocator.
//!
//! There is no event loop, socket, or listener in this crate. It is the
//! core state machines an embedder wires into its own I/O loop (epoll,
//! kqueue, or whatever the target platform offers). No HTTP/2, no dynamic
//! buffer growth past the configured slot size, no raw header retention
//! beyond what a caller's [`parser::HeaderSink`] chooses to copy out.

pub mod config;
pub mod connection;
pub mod continuation;
pub mod dispatch;
pub mod error;
pub mod header_classifier;
pub mod parser;
pub mod pool;
pub mod send_buffer;

pub use config::CoreConfig;
pub use connection::{CloseReason, ConnectionState, Lifecycle};
pub use continuation::{ContinuationHandler, ContinuationState, DeferredHandler};
pub use dispatch::{DispatchOutcome, RequestHandler};
pub use error::{CoreError, HandlerStatus, ParseStatus};
pub use header_classifier::HeaderKind;
pub use parser::{HeaderSink, Method, ParserContext, RequestParser};
pub use pool::{BufferPool, SlotId};
pub use send_buffer::SendBuffer;
