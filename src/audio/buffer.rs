//! Fixed-capacity circular buffers with a drop-oldest overflow policy.
//!
//! When the buffer is full, a push **evicts** the oldest entry so that the
//! most-recent `capacity` entries are always available. The producer never
//! blocks: recency wins over completeness.
//!
//! # Example
//!
//! ```rust
//! use lyrebird_analyzer::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(2);
//! buf.push("A");
//! buf.push("B");
//! assert_eq!(buf.push("C"), Some("A")); // oldest evicted
//! assert_eq!(buf.drain(), vec!["B", "C"]);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use super::AudioFrame;

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity FIFO that overwrites its oldest entry when full.
///
/// Generic over any `T`; the capture path stores whole [`AudioFrame`]s.
///
/// ## Overflow behaviour
///
/// [`push`](Self::push) on a full buffer returns the evicted entry. The
/// buffer never allocates beyond its initial capacity.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    capacity: usize,
    /// Index of the oldest stored entry.
    head: usize,
    /// Number of valid entries currently stored (≤ `capacity`).
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with the given `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            capacity,
            head: 0,
            len: 0,
        }
    }

    /// Append `item`, evicting and returning the oldest entry when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.len == self.capacity {
            let evicted = self.slots[self.head].replace(item);
            self.head = (self.head + 1) % self.capacity;
            evicted
        } else {
            let tail = (self.head + self.len) % self.capacity;
            self.slots[tail] = Some(item);
            self.len += 1;
            None
        }
    }

    /// Remove and return the oldest entry.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity;
        self.len -= 1;
        item
    }

    /// Drain all stored entries in insertion order and reset the buffer.
    ///
    /// After this call `len() == 0`.
    pub fn drain(&mut self) -> Vec<T> {
        let mut result = Vec::with_capacity(self.len);
        while let Some(item) = self.pop_front() {
            result.push(item);
        }
        self.head = 0;
        result
    }

    /// Discard all entries.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.head = 0;
        self.len = 0;
    }

    /// Number of valid entries currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the buffer contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of entries the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` when the next push would evict.
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }
}

// ---------------------------------------------------------------------------
// StreamBuffer
// ---------------------------------------------------------------------------

/// Bounded single-producer/single-consumer frame queue for one stream.
///
/// The capture worker pushes, the coordinator pops. Every push signals the
/// `ready` notifier, which is shared by all streams of a run so the
/// coordinator can wait for "any stream has data" without polling.
#[derive(Debug)]
pub struct StreamBuffer {
    inner: Mutex<RingBuffer<AudioFrame>>,
    ready: Arc<Notify>,
    overflows: AtomicU64,
}

impl StreamBuffer {
    pub fn new(capacity: usize, ready: Arc<Notify>) -> Self {
        Self {
            inner: Mutex::new(RingBuffer::new(capacity)),
            ready,
            overflows: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingBuffer<AudioFrame>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `frame` without blocking. Returns `true` if an older frame was
    /// evicted to make room.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let evicted = self.lock().push(frame).is_some();
        if evicted {
            self.overflows.fetch_add(1, Ordering::Relaxed);
        }
        self.ready.notify_one();
        evicted
    }

    /// Dequeue the oldest frame, if any.
    pub fn try_pop(&self) -> Option<AudioFrame> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Number of frames evicted unseen so far.
    pub fn overflow_count(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: f64) -> AudioFrame {
        AudioFrame::new("s", tag, vec![tag as f32; 4])
    }

    // ---- RingBuffer ---------------------------------------------------------

    #[test]
    fn push_and_drain_within_capacity() {
        let mut buf = RingBuffer::new(8);
        assert_eq!(buf.push(1), None);
        assert_eq!(buf.push(2), None);
        assert_eq!(buf.push(3), None);
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_full());

        assert_eq!(buf.drain(), vec![1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn never_exceeds_capacity_and_keeps_most_recent() {
        for k in 1..=8usize {
            let mut buf = RingBuffer::new(k);
            for i in 0..=k {
                buf.push(i);
                assert!(buf.len() <= k);
            }
            // K+1 pushes → exactly the last K survive, in order.
            let expected: Vec<usize> = (1..=k).collect();
            assert_eq!(buf.drain(), expected, "capacity {k}");
        }
    }

    #[test]
    fn capacity_two_evicts_first_of_three() {
        let mut buf = RingBuffer::new(2);
        buf.push("A");
        buf.push("B");
        assert_eq!(buf.push("C"), Some("A"));

        assert_eq!(buf.pop_front(), Some("B"));
        assert_eq!(buf.pop_front(), Some("C"));
        assert_eq!(buf.pop_front(), None);
    }

    #[test]
    fn interleaved_push_pop_wraps_around() {
        let mut buf = RingBuffer::new(3);
        buf.push(1);
        buf.push(2);
        assert_eq!(buf.pop_front(), Some(1));
        buf.push(3);
        buf.push(4);
        assert!(buf.is_full());
        assert_eq!(buf.push(5), Some(2));
        assert_eq!(buf.drain(), vec![3, 4, 5]);
    }

    #[test]
    fn clear_resets_state() {
        let mut buf = RingBuffer::new(2);
        buf.push(String::from("a"));
        buf.push(String::from("b"));
        buf.push(String::from("c"));
        buf.clear();

        assert!(buf.is_empty());
        buf.push(String::from("d"));
        assert_eq!(buf.drain(), vec![String::from("d")]);
    }

    #[test]
    #[should_panic(expected = "RingBuffer capacity must be > 0")]
    fn zero_capacity_panics() {
        let _buf: RingBuffer<u8> = RingBuffer::new(0);
    }

    // ---- StreamBuffer -------------------------------------------------------

    #[test]
    fn stream_buffer_counts_overflows() {
        let buf = StreamBuffer::new(2, Arc::new(Notify::new()));
        assert!(!buf.push(frame(1.0)));
        assert!(!buf.push(frame(2.0)));
        assert!(buf.push(frame(3.0)));
        assert_eq!(buf.overflow_count(), 1);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.capacity(), 2);

        assert_eq!(buf.try_pop().map(|f| f.timestamp), Some(2.0));
        assert_eq!(buf.try_pop().map(|f| f.timestamp), Some(3.0));
        assert!(buf.try_pop().is_none());
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn push_wakes_waiting_consumer() {
        let ready = Arc::new(Notify::new());
        let buf = Arc::new(StreamBuffer::new(4, Arc::clone(&ready)));

        let producer = Arc::clone(&buf);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            producer.push(frame(7.0));
        });

        tokio::time::timeout(std::time::Duration::from_secs(2), ready.notified())
            .await
            .expect("push should notify");
        assert_eq!(buf.try_pop().map(|f| f.timestamp), Some(7.0));
    }

    #[test]
    fn stream_buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StreamBuffer>();
    }
}
