use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::core::lock::{lock_mutex, wait_timeout};
use crate::core::logging::{ComponentLogger, LogContext};

/// Producer side of the buffer drained by the decoder/player.
///
/// Implementations must be safe to share between the producing reader and
/// a concurrently draining consumer.
pub trait ConsumerBuffer: Send + Sync {
    /// Bytes that can currently be written without overwriting unread data.
    fn free(&self) -> usize;

    /// Writes as much of `data` as fits, waiting at most `timeout` for the
    /// consumer to make room. Never overwrites unread data.
    ///
    /// Returns the number of bytes actually written.
    fn write_without_replacement(&self, data: &[u8], timeout: Duration) -> usize;
}

struct Inner {
    storage: Box<[u8]>,
    head: usize,
    len: usize,
    bytes_written: u64,
    bytes_read: u64,
}

impl Inner {
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn free(&self) -> usize {
        self.capacity() - self.len
    }

    fn push(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.free());
        let cap = self.capacity();
        let tail = (self.head + self.len) % cap;
        let first = n.min(cap - tail);
        self.storage[tail..tail + first].copy_from_slice(&data[..first]);
        self.storage[..n - first].copy_from_slice(&data[first..n]);
        self.len += n;
        self.bytes_written += n as u64;
        n
    }

    fn pop(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        let cap = self.capacity();
        let first = n.min(cap - self.head);
        out[..first].copy_from_slice(&self.storage[self.head..self.head + first]);
        out[first..n].copy_from_slice(&self.storage[..n - first]);
        self.head = (self.head + n) % cap;
        self.len -= n;
        self.bytes_read += n as u64;
        n
    }
}

/// Fixed-capacity single-producer/single-consumer byte ring with
/// bounded-wait reads and writes.
pub struct ByteRingBuffer {
    inner: Mutex<Inner>,
    space: Condvar,
    data: Condvar,
}

impl ByteRingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be > 0");
        Self {
            inner: Mutex::new(Inner {
                storage: vec![0u8; capacity].into_boxed_slice(),
                head: 0,
                len: 0,
                bytes_written: 0,
                bytes_read: 0,
            }),
            space: Condvar::new(),
            data: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        lock_mutex(&self.inner, "ByteRingBuffer::capacity").capacity()
    }

    pub fn available(&self) -> usize {
        lock_mutex(&self.inner, "ByteRingBuffer::available").len
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Writes bytes as space becomes available until `data` is consumed or
    /// `timeout` elapses.
    pub fn write(&self, data: &[u8], timeout: Duration) -> usize {
        if data.is_empty() {
            return 0;
        }

        let deadline = Instant::now() + timeout;
        let mut written = 0;
        let mut inner = lock_mutex(&self.inner, "ByteRingBuffer::write");

        loop {
            let n = inner.push(&data[written..]);
            if n > 0 {
                written += n;
                self.data.notify_one();
            }
            if written == data.len() {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = wait_timeout(&self.space, inner, "ByteRingBuffer::write", deadline - now);
            inner = guard;
        }

        written
    }

    /// Reads up to `out.len()` bytes, waiting at most `timeout` for the first
    /// byte to arrive. Returns 0 on timeout.
    pub fn read(&self, out: &mut [u8], timeout: Duration) -> usize {
        if out.is_empty() {
            return 0;
        }

        let deadline = Instant::now() + timeout;
        let mut inner = lock_mutex(&self.inner, "ByteRingBuffer::read");

        while inner.len == 0 {
            let now = Instant::now();
            if now >= deadline {
                return 0;
            }
            let (guard, _) = wait_timeout(&self.data, inner, "ByteRingBuffer::read", deadline - now);
            inner = guard;
        }

        let n = inner.pop(out);
        self.space.notify_one();
        n
    }

    /// Drops all unread bytes. Counters are kept.
    pub fn reset(&self) {
        let mut inner = lock_mutex(&self.inner, "ByteRingBuffer::reset");
        let dropped = inner.len;
        inner.head = 0;
        inner.len = 0;
        drop(inner);
        self.space.notify_all();

        if dropped > 0 {
            self.debug(&format!("reset, dropped {} unread bytes", dropped));
        }
    }

    pub fn stats(&self) -> RingBufferStats {
        let inner = lock_mutex(&self.inner, "ByteRingBuffer::stats");
        RingBufferStats {
            capacity: inner.capacity(),
            available: inner.len,
            bytes_written: inner.bytes_written,
            bytes_read: inner.bytes_read,
        }
    }
}

impl ConsumerBuffer for ByteRingBuffer {
    fn free(&self) -> usize {
        lock_mutex(&self.inner, "ByteRingBuffer::free").free()
    }

    fn write_without_replacement(&self, data: &[u8], timeout: Duration) -> usize {
        self.write(data, timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBufferStats {
    pub capacity: usize,
    pub available: usize,
    pub bytes_written: u64,
    pub bytes_read: u64,
}

impl ComponentLogger for ByteRingBuffer {
    fn log_context(&self) -> LogContext {
        LogContext::new("RingBuffer", &format!("{:p}", self as *const _))
    }
}
