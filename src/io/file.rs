//! File Objects
//!
//! The byte sources a descriptor can name. Reads have partial-transfer
//! semantics: an object hands back whatever it has, up to the requested
//! count, and says so explicitly when it has nothing yet.
//!
//! # Objects
//! - `MemFile`: in-memory file with a shared read offset; never blocks
//! - `StreamBuffer`: producer-fed byte queue (console input, pipes); blocks
//!   while empty and open, ends once the producer closes it

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;

/// Result of asking a file object for bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes (at least one) were copied into the buffer.
    Data(usize),
    /// No more data will ever be available.
    EndOfFile,
    /// No data yet; more may arrive later.
    WouldBlock,
}

/// A readable kernel object shared between descriptors.
pub trait FileObject: Send + Sync {
    /// Copy up to `buf.len()` bytes into `buf`. `buf` is never empty.
    fn read(&self, buf: &mut [u8]) -> ReadOutcome;

    /// Whether a read would complete without blocking.
    fn poll_readable(&self) -> bool;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Shared handle to a file object.
pub type FileRef = Arc<dyn FileObject>;

struct MemFileInner {
    data: Vec<u8>,
    offset: usize,
}

/// An in-memory file.
///
/// Descriptors that share one `MemFile` (after `fork`) share its offset.
pub struct MemFile {
    inner: Mutex<MemFileInner>,
}

impl MemFile {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: Mutex::new(MemFileInner { data, offset: 0 }),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }

    /// Current read offset.
    pub fn offset(&self) -> usize {
        self.inner.lock().offset
    }
}

impl FileObject for MemFile {
    fn read(&self, buf: &mut [u8]) -> ReadOutcome {
        let mut inner = self.inner.lock();
        let remaining = inner.data.len().saturating_sub(inner.offset);
        if remaining == 0 {
            return ReadOutcome::EndOfFile;
        }
        let n = remaining.min(buf.len());
        let start = inner.offset;
        buf[..n].copy_from_slice(&inner.data[start..start + n]);
        inner.offset += n;
        ReadOutcome::Data(n)
    }

    fn poll_readable(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "memfile"
    }
}

impl fmt::Debug for MemFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        write!(f, "MemFile(len={}, offset={})", inner.data.len(), inner.offset)
    }
}

struct StreamInner {
    queue: VecDeque<u8>,
    closed: bool,
}

/// A byte queue written by a producer outside the reading process.
pub struct StreamBuffer {
    inner: Mutex<StreamInner>,
    capacity: usize,
}

impl StreamBuffer {
    /// Default queue capacity in bytes.
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StreamInner {
                queue: VecDeque::new(),
                closed: false,
            }),
            capacity,
        }
    }

    /// Append bytes from the producer.
    ///
    /// Returns how many bytes fit; nothing is accepted after `close`.
    pub fn push(&self, bytes: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        if inner.closed {
            return 0;
        }
        let room = self.capacity.saturating_sub(inner.queue.len());
        let n = room.min(bytes.len());
        inner.queue.extend(&bytes[..n]);
        n
    }

    /// Mark the producer side finished. Readers see end of file once the
    /// queue drains.
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    /// Bytes waiting to be read.
    pub fn available(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FileObject for StreamBuffer {
    fn read(&self, buf: &mut [u8]) -> ReadOutcome {
        let mut inner = self.inner.lock();
        if inner.queue.is_empty() {
            return if inner.closed {
                ReadOutcome::EndOfFile
            } else {
                ReadOutcome::WouldBlock
            };
        }
        let n = inner.queue.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(inner.queue.drain(..n)) {
            *slot = byte;
        }
        ReadOutcome::Data(n)
    }

    fn poll_readable(&self) -> bool {
        let inner = self.inner.lock();
        inner.closed || !inner.queue.is_empty()
    }

    fn name(&self) -> &str {
        "stream"
    }
}

impl fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        write!(
            f,
            "StreamBuffer(queued={}, closed={})",
            inner.queue.len(),
            inner.closed
        )
    }
}
