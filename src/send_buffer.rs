//! Per-connection ring buffer + file-streaming state, with a zero-copy
//! write API.
//!
//! This is the hard part of the transport core: it interleaves three
//! producers (inline bytes via `queue`, chunk framing built on top of
//! `queue`/`write_ptr`, and sendfile-style streaming via `start_file`) over
//! one fixed-capacity ring, while keeping contiguous space available for
//! chunk-encoding headers and tolerating partial socket writes.
//!
//! There is no direct byte-ring-with-cursors precedent in this codebase
//! (its SPSC rings, `core::rt::indexring::IndexRing` and
//! `transport::shm::ring`, are slot/sequence based, not byte based), so the
//! cursor arithmetic here is original to this crate. The *shape* of the
//! type, a resumable state machine with explicit flag bits and a slot
//! borrowed from a pool by index rather than by pointer, follows
//! `transport::tcp::frame_codec::FrameCodec` and
//! `core::rt::slabpool::SlabHandle`.

use std::os::unix::io::RawFd;

use crate::config::SLOT_SIZE;
use crate::error::CoreError;
use crate::pool::{BufferPool, SlotId};

const STREAMING: u8 = 1 << 0;
const CHUNKED: u8 = 1 << 1;
const HEADERS_DONE: u8 = 1 << 2;

/// Open file descriptor plus remaining byte budget for sendfile-style
/// streaming. The fd is borrowed, not owned by the process in the `close`
/// sense used elsewhere, but `SendBuffer` is still responsible for closing
/// it exactly once.
struct FileStream {
    fd: RawFd,
    remaining: u64,
}

impl FileStream {
    fn close(&self) {
        // SAFETY: `fd` was validated non-negative by `start_file` and is
        // exclusively owned by this `FileStream` until it is dropped or
        // replaced; closing it here (and only here) is the one place that
        // happens.
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Ring over one pool slot plus file-streaming state.
///
/// Created uninitialized (no slot); lazily acquires a slot on first use via
/// `alloc`. `head`/`tail` are always in `[0, size)`; the ring holds up to
/// `size - 1` bytes (one slot is sacrificed to disambiguate full vs empty,
/// per the empty-snap rule below).
pub struct SendBuffer {
    slot: Option<SlotId>,
    size: usize,
    head: usize,
    tail: usize,
    file: Option<FileStream>,
    flags: u8,
}

impl SendBuffer {
    /// Zero cursors, no slot, no streaming file, all flags cleared.
    pub fn new() -> Self {
        Self {
            slot: None,
            size: 0,
            head: 0,
            tail: 0,
            file: None,
            flags: 0,
        }
    }

    /// Whether this buffer currently owns a pool slot.
    pub fn is_allocated(&self) -> bool {
        self.slot.is_some()
    }

    /// Acquire a slot on first call; idempotent on repeat calls.
    pub fn alloc(&mut self, pool: &mut BufferPool) -> Result<(), CoreError> {
        if self.slot.is_some() {
            return Ok(());
        }
        let slot = pool.acquire().ok_or(CoreError::PoolExhausted)?;
        self.slot = Some(slot);
        self.size = SLOT_SIZE;
        self.head = 0;
        self.tail = 0;
        Ok(())
    }

    /// Returns the slot (if any), closes any streaming file, and resets to
    /// `new()` state. Idempotent.
    pub fn free(&mut self, pool: &mut BufferPool) {
        if let Some(file) = self.file.take() {
            file.close();
        }
        if let Some(slot) = self.slot.take() {
            pool.release(slot);
        }
        self.size = 0;
        self.head = 0;
        self.tail = 0;
        self.flags = 0;
    }

    /// Retains the slot but clears cursors, closes the streaming file, and
    /// zeros the streaming/chunked/headers-done flags. Allocation state
    /// (whether a slot is held) is derived from the slot itself, not from
    /// the flag bitfield, so it survives a reset; see DESIGN.md for the
    /// reasoning behind keeping slot ownership out of the flag bits.
    pub fn reset(&mut self) {
        if let Some(file) = self.file.take() {
            file.close();
        }
        self.head = 0;
        self.tail = 0;
        self.flags = 0;
    }

    /// Bytes currently queued, unread.
    pub fn pending(&self) -> usize {
        if self.size == 0 {
            return 0;
        }
        (self.head + self.size - self.tail) % self.size
    }

    /// Bytes available to queue before the ring is full.
    pub fn space(&self) -> usize {
        if self.size == 0 {
            return 0;
        }
        self.size - 1 - self.pending()
    }

    /// Appends `data` to the ring. Fails with `NoSpace` if the buffer is
    /// unallocated, `data` is empty, or `data.len() > space()`. Writes
    /// exactly `data.len()` bytes via at most two contiguous copies.
    pub fn queue(&mut self, pool: &BufferPool, data: &[u8]) -> Result<usize, CoreError> {
        let Some(slot) = self.slot else {
            return Err(CoreError::NoSpace);
        };
        let len = data.len();
        if len == 0 || len > self.space() {
            log::debug!(
                "send buffer queue rejected: len={} space={}",
                len,
                self.space()
            );
            return Err(CoreError::NoSpace);
        }

        let buf = pool.slot_mut(slot);
        let to_end = self.size - self.head;
        if len <= to_end {
            buf[self.head..self.head + len].copy_from_slice(data);
            self.head += len;
            if self.head == self.size {
                self.head = 0;
            }
        } else {
            buf[self.head..self.size].copy_from_slice(&data[..to_end]);
            let rest = len - to_end;
            buf[..rest].copy_from_slice(&data[to_end..]);
            self.head = rest;
        }
        Ok(len)
    }

    /// Returns a slice over the maximal contiguous run starting at `tail`,
    /// ending at either `head` or the end of the slot, whichever comes
    /// first. `None` when empty or unallocated.
    pub fn peek<'a>(&self, pool: &'a BufferPool) -> Option<&'a [u8]> {
        let slot = self.slot?;
        if self.pending() == 0 {
            return None;
        }
        let run = if self.head > self.tail {
            self.head - self.tail
        } else {
            self.size - self.tail
        };
        let buf = pool.slot(slot);
        Some(&buf[self.tail..self.tail + run])
    }

    /// Advances `tail` by `min(len, pending())`. When the ring becomes
    /// empty as a result, both cursors snap to 0, the empty-snap rule that
    /// guarantees a fully contiguous slot is available the instant the
    /// socket drain catches up with the producer (critical for chunk
    /// framing).
    pub fn consume(&mut self, len: usize) {
        let advance = len.min(self.pending());
        if self.size > 0 {
            self.tail = (self.tail + advance) % self.size;
        }
        if self.head == self.tail {
            self.head = 0;
            self.tail = 0;
        }
    }

    /// Zero-copy write window at `head`: the lesser of (bytes to end of
    /// slot, total `space()`). `None` when unallocated or full.
    pub fn write_ptr<'a>(&self, pool: &'a BufferPool) -> Option<&'a mut [u8]> {
        let slot = self.slot?;
        let space = self.space();
        if space == 0 {
            return None;
        }
        let to_end = self.size - self.head;
        let len = space.min(to_end);
        let buf = pool.slot_mut(slot);
        Some(&mut buf[self.head..self.head + len])
    }

    /// Advances `head` by `len`, wrapping at `size`. Caller must not exceed
    /// the length returned by the preceding `write_ptr` call.
    pub fn commit(&mut self, len: usize) {
        if self.size > 0 {
            self.head = (self.head + len) % self.size;
        }
    }

    /// Records a borrowed file descriptor and remaining byte count, closing
    /// any previously-recorded fd first. Does not read from the file.
    pub fn start_file(&mut self, fd: RawFd, size: u64) -> Result<(), CoreError> {
        if fd < 0 {
            log::debug!("start_file rejected invalid fd {}", fd);
            return Err(CoreError::InvalidFd);
        }
        if let Some(old) = self.file.take() {
            old.close();
        }
        self.file = Some(FileStream {
            fd,
            remaining: size,
        });
        self.flags |= STREAMING;
        Ok(())
    }

    /// Closes the borrowed fd (if any) and clears streaming state.
    pub fn stop_file(&mut self) {
        if let Some(file) = self.file.take() {
            file.close();
        }
        self.flags &= !STREAMING;
    }

    /// `true` iff the streaming flag is set and an fd is actually open.
    pub fn is_streaming(&self) -> bool {
        (self.flags & STREAMING) != 0 && self.file.is_some()
    }

    /// Remaining bytes to stream from the open file, if any.
    pub fn file_remaining(&self) -> u64 {
        self.file.as_ref().map_or(0, |f| f.remaining)
    }

    /// Reads from the streaming fd into the ring via `write_ptr` + `commit`,
    /// decrementing `file_remaining`. Never blocks: a non-blocking fd that
    /// would block returns `Ok(0)`, same as "no space right now". Callers
    /// should call `stop_file` once `file_remaining()` reaches 0.
    pub fn refill(&mut self, pool: &BufferPool) -> Result<usize, CoreError> {
        if !self.is_streaming() {
            return Ok(0);
        }
        let remaining = self.file_remaining();
        if remaining == 0 {
            return Ok(0);
        }
        let Some(window) = self.write_ptr(pool) else {
            return Ok(0);
        };
        let want = (window.len() as u64).min(remaining) as usize;
        let slice = &mut window[..want];

        let fd = self.file.as_ref().unwrap().fd;
        // SAFETY: `fd` is a valid, open descriptor owned by this `SendBuffer`
        // (established in `start_file`); `slice` is a valid mutable byte
        // range within the pool slot we exclusively hold.
        let n = unsafe { libc::read(fd, slice.as_mut_ptr() as *mut libc::c_void, slice.len()) };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(CoreError::from(err));
        }
        let n = n as usize;
        self.commit(n);
        if let Some(file) = self.file.as_mut() {
            file.remaining = file.remaining.saturating_sub(n as u64);
        }
        Ok(n)
    }

    /// Set/clear the chunked-transfer-encoding flag.
    pub fn set_chunked(&mut self, chunked: bool) {
        if chunked {
            self.flags |= CHUNKED;
        } else {
            self.flags &= !CHUNKED;
        }
    }

    pub fn is_chunked(&self) -> bool {
        (self.flags & CHUNKED) != 0
    }

    /// Set/clear the headers-already-sent flag.
    pub fn set_headers_done(&mut self, done: bool) {
        if done {
            self.flags |= HEADERS_DONE;
        } else {
            self.flags &= !HEADERS_DONE;
        }
    }

    pub fn headers_done(&self) -> bool {
        (self.flags & HEADERS_DONE) != 0
    }
}

impl Default for SendBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a chunked-transfer-encoding prologue: hex length + CRLF.
///
/// Returns a stack buffer and the number of leading bytes that are valid.
/// Sized for the worst case at the default `SLOT_SIZE` (8192 = `0x2000`, 6
/// bytes); callers with a larger compile-time `SLOT_SIZE` should size their
/// own scratch accordingly, but 10 bytes covers any `u32`-range length.
pub fn format_chunk_header(len: usize) -> ([u8; 10], usize) {
    let mut out = [0u8; 10];
    let mut digits = [0u8; 8];
    let mut pos = digits.len();
    let mut n = len;
    loop {
        pos -= 1;
        let d = (n & 0xF) as u8;
        digits[pos] = if d < 10 { b'0' + d } else { b'a' + (d - 10) };
        n >>= 4;
        if n == 0 {
            break;
        }
    }
    let hex = &digits[pos..];
    out[..hex.len()].copy_from_slice(hex);
    let mut end = hex.len();
    out[end] = b'\r';
    out[end + 1] = b'\n';
    end += 2;
    (out, end)
}
