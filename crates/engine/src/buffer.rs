//! Trajectory buffer
//!
//! Holds produced samples for consumption by visualization/export
//! collaborators, decoupling production rate from consumption rate.
//! Readers hold cursors (absolute sample indices), so several independent
//! consumers can drain at their own pace.
//!
//! Unbounded by default. With a capacity set, the buffer is a ring: the
//! oldest samples are evicted and an eviction counter is incremented, which
//! is the only place data loss is permitted and it is always observable.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracing::trace;

use crate::types::Sample;

/// Absolute index of the next sample a reader has not yet seen.
pub type Cursor = u64;

/// Bounded or growable store of produced samples.
#[derive(Debug, Default)]
pub struct TrajectoryBuffer {
    samples: VecDeque<Sample>,
    /// Absolute index of `samples[0]`
    start: u64,
    /// Samples evicted by the ring policy
    evicted: u64,
    max_len: Option<usize>,
}

impl TrajectoryBuffer {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Ring buffer retaining at most `max_len` samples.
    pub fn bounded(max_len: usize) -> Self {
        Self { max_len: Some(max_len), ..Self::default() }
    }

    pub fn push(&mut self, sample: Sample) {
        if let Some(max) = self.max_len
            && self.samples.len() >= max
        {
            self.samples.pop_front();
            self.start += 1;
            self.evicted += 1;
            trace!(evicted = self.evicted, "buffer evicted oldest sample");
        }
        self.samples.push_back(sample);
    }

    /// Samples at or after `cursor`, plus the cursor to resume from.
    ///
    /// A cursor older than the retained window is clamped forward; the
    /// reader can compare against [`evicted`](Self::evicted) to detect that
    /// it missed data.
    pub fn drain_since(&self, cursor: Cursor) -> (Vec<Sample>, Cursor) {
        let end = self.start + self.samples.len() as u64;
        let from = cursor.clamp(self.start, end);
        let out = self
            .samples
            .iter()
            .skip((from - self.start) as usize)
            .cloned()
            .collect();
        (out, end)
    }

    /// Full retained sequence so far.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }

    /// Retained sample count.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total samples evicted by the ring policy.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Absolute index of the oldest retained sample.
    pub fn first_index(&self) -> u64 {
        self.start
    }

    /// Absolute index one past the newest retained sample.
    pub fn end_index(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

#[derive(Debug)]
struct Shared {
    buffer: Mutex<BufferState>,
    produced: Condvar,
}

#[derive(Debug)]
struct BufferState {
    inner: TrajectoryBuffer,
    /// Set when the producing run has finalized; wakes blocked readers
    closed: bool,
}

/// Thread-safe buffer handle: single writer, multiple readers.
///
/// `push` is serialized against concurrent `drain_since`/`snapshot` by the
/// interior mutex; clones share the same buffer.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    shared: Arc<Shared>,
}

impl SharedBuffer {
    pub fn new(max_len: Option<usize>) -> Self {
        let inner = match max_len {
            Some(max) => TrajectoryBuffer::bounded(max),
            None => TrajectoryBuffer::unbounded(),
        };
        Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(BufferState { inner, closed: false }),
                produced: Condvar::new(),
            }),
        }
    }

    pub fn push(&self, sample: Sample) {
        let mut state = self.shared.buffer.lock().expect("buffer lock poisoned");
        state.inner.push(sample);
        drop(state);
        self.shared.produced.notify_all();
    }

    /// Mark the producing run finalized and wake blocked readers.
    pub fn close(&self) {
        let mut state = self.shared.buffer.lock().expect("buffer lock poisoned");
        state.closed = true;
        drop(state);
        self.shared.produced.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.buffer.lock().expect("buffer lock poisoned").closed
    }

    /// Non-blocking drain; returns immediately, possibly empty.
    pub fn drain_since(&self, cursor: Cursor) -> (Vec<Sample>, Cursor) {
        let state = self.shared.buffer.lock().expect("buffer lock poisoned");
        state.inner.drain_since(cursor)
    }

    /// Blocking drain convenience: waits until samples past `cursor` exist,
    /// the buffer is closed, or `timeout` elapses.
    pub fn wait_drain(&self, cursor: Cursor, timeout: Duration) -> (Vec<Sample>, Cursor) {
        let mut state = self.shared.buffer.lock().expect("buffer lock poisoned");
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if state.inner.end_index() > cursor || state.closed {
                return state.inner.drain_since(cursor);
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return state.inner.drain_since(cursor);
            }
            let (next, result) = self
                .shared
                .produced
                .wait_timeout(state, deadline - now)
                .expect("buffer lock poisoned");
            state = next;
            if result.timed_out() {
                return state.inner.drain_since(cursor);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.shared.buffer.lock().expect("buffer lock poisoned").inner.snapshot()
    }

    pub fn len(&self) -> usize {
        self.shared.buffer.lock().expect("buffer lock poisoned").inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evicted(&self) -> u64 {
        self.shared.buffer.lock().expect("buffer lock poisoned").inner.evicted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: usize) -> Sample {
        Sample::new(i as f64 * 0.01, vec![i as f64; 3])
    }

    #[test]
    fn test_unbounded_retains_everything() {
        let mut buf = TrajectoryBuffer::unbounded();
        for i in 0..100 {
            buf.push(sample(i));
        }
        assert_eq!(buf.len(), 100);
        assert_eq!(buf.evicted(), 0);
    }

    #[test]
    fn test_bounded_evicts_oldest_and_counts() {
        let mut buf = TrajectoryBuffer::bounded(10);
        for i in 0..13 {
            buf.push(sample(i));
        }
        // N + k pushes into capacity N: last N retained, k evictions
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.evicted(), 3);
        let snap = buf.snapshot();
        assert_eq!(snap.first().unwrap().state[0], 3.0);
        assert_eq!(snap.last().unwrap().state[0], 12.0);
    }

    #[test]
    fn test_drain_since_cursor_progression() {
        let mut buf = TrajectoryBuffer::unbounded();
        for i in 0..5 {
            buf.push(sample(i));
        }

        let (batch, cursor) = buf.drain_since(0);
        assert_eq!(batch.len(), 5);
        assert_eq!(cursor, 5);

        let (batch, cursor) = buf.drain_since(cursor);
        assert!(batch.is_empty());
        assert_eq!(cursor, 5);

        buf.push(sample(5));
        let (batch, cursor) = buf.drain_since(cursor);
        assert_eq!(batch.len(), 1);
        assert_eq!(cursor, 6);
    }

    #[test]
    fn test_independent_readers() {
        let mut buf = TrajectoryBuffer::unbounded();
        for i in 0..8 {
            buf.push(sample(i));
        }

        let (a, _) = buf.drain_since(0);
        let (b, _) = buf.drain_since(6);
        assert_eq!(a.len(), 8);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_stale_cursor_clamps_after_eviction() {
        let mut buf = TrajectoryBuffer::bounded(4);
        for i in 0..10 {
            buf.push(sample(i));
        }
        // Reader at cursor 0 missed samples 0..6; drain yields the window
        let (batch, cursor) = buf.drain_since(0);
        assert_eq!(batch.len(), 4);
        assert_eq!(cursor, 10);
        assert_eq!(buf.evicted(), 6);
    }

    #[test]
    fn test_shared_buffer_wait_drain_wakes_on_push() {
        let buf = SharedBuffer::new(None);
        let writer = buf.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer.push(sample(0));
        });

        let (batch, cursor) = buf.wait_drain(0, Duration::from_secs(5));
        assert_eq!(batch.len(), 1);
        assert_eq!(cursor, 1);
        handle.join().unwrap();
    }

    #[test]
    fn test_shared_buffer_wait_drain_returns_on_close() {
        let buf = SharedBuffer::new(None);
        let producer = buf.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            producer.close();
        });

        let (batch, _) = buf.wait_drain(0, Duration::from_secs(5));
        assert!(batch.is_empty());
        assert!(buf.is_closed());
        handle.join().unwrap();
    }
}
