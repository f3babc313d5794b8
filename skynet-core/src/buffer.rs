use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A bounded mailbox that drops its oldest item when full.
///
/// This is the hand-off point between application threads and service
/// workers. Exactly one side writes and the other reads, but the structure is
/// safe for any number of threads on either side.
///
/// # Drop policy
///
/// `push` never blocks. When `capacity` items are already pending, the oldest
/// one is evicted before the new one is stored, so the buffer always holds the
/// `capacity` most recent pushes. A capacity of one means "latest value wins".
///
/// # Shutdown
///
/// [`close`](Self::close) wakes every blocked reader. Pops keep draining what is
/// left and return `None` once the buffer is closed and empty.
///
/// # Examples
///
/// ```
/// use skynet_core::buffer::OverwriteBuffer;
///
/// let buffer = OverwriteBuffer::new(1);
/// buffer.push("a");
/// buffer.push("b");
/// assert_eq!(buffer.try_pop(), Some("b"));
/// assert_eq!(buffer.evicted(), 1);
/// ```
#[derive(Debug)]
pub struct OverwriteBuffer<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    capacity: usize,
}

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    evicted: u64,
    closed: bool,
}

impl<T> OverwriteBuffer<T> {
    /// Create a buffer holding at most `capacity` items.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                evicted: 0,
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Number of items dropped by the overwrite policy so far.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.state.lock().evicted
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Store `item`, evicting the oldest pending item if the buffer is full.
    ///
    /// Pushing into a closed buffer is a no-op.
    pub fn push(&self, item: T) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if state.items.len() >= self.capacity {
            state.items.pop_front();
            state.evicted += 1;
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
    }

    /// Block until an item is available.
    ///
    /// Returns `None` only after [`close`](Self::close).
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Block for at most `timeout` waiting for an item.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return state.items.pop_front();
            }
        }
    }

    /// Take an item if one is pending, without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Pop with the `(block, timeout)` pair used throughout the service API.
    ///
    /// - `block == false`: same as [`try_pop`](Self::try_pop)
    /// - `timeout == None`: same as [`pop`](Self::pop)
    /// - otherwise: same as [`pop_timeout`](Self::pop_timeout)
    pub fn pop_with(&self, block: bool, timeout: Option<Duration>) -> Option<T> {
        match (block, timeout) {
            (false, _) => self.try_pop(),
            (true, None) => self.pop(),
            (true, Some(d)) => self.pop_timeout(d),
        }
    }

    /// Take every pending item, oldest first, without waiting.
    pub fn drain(&self) -> Vec<T> {
        self.state.lock().items.drain(..).collect()
    }

    /// Close the buffer and wake every blocked reader.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn latest_value_wins() {
        let buffer = OverwriteBuffer::new(1);
        buffer.push("a");
        buffer.push("b");

        assert_eq!(buffer.pop(), Some("b"));
        assert_eq!(buffer.try_pop(), None);
        assert_eq!(buffer.evicted(), 1);
    }

    #[test]
    fn keeps_most_recent_n() {
        let buffer = OverwriteBuffer::new(3);
        for i in 0..4 {
            buffer.push(i);
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.try_pop(), Some(1));
        assert_eq!(buffer.try_pop(), Some(2));
        assert_eq!(buffer.try_pop(), Some(3));
        assert!(buffer.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let buffer = OverwriteBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push(7);
        assert_eq!(buffer.try_pop(), Some(7));
    }

    #[test]
    fn timed_pop_on_empty_returns_none() {
        let buffer: OverwriteBuffer<u8> = OverwriteBuffer::new(1);
        let start = Instant::now();

        assert_eq!(buffer.pop_timeout(Duration::from_millis(50)), None);

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2), "waited {elapsed:?}");
    }

    #[test]
    fn non_blocking_pop_with() {
        let buffer: OverwriteBuffer<u8> = OverwriteBuffer::new(1);
        assert_eq!(buffer.pop_with(false, None), None);
        buffer.push(1);
        assert_eq!(buffer.pop_with(true, Some(Duration::from_millis(10))), Some(1));
    }

    #[test]
    fn drain_takes_pending_in_order() {
        let buffer = OverwriteBuffer::new(2);
        buffer.push(1);
        buffer.push(2);
        buffer.push(3);

        assert_eq!(buffer.drain(), vec![2, 3]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.evicted(), 1);
    }

    #[test]
    fn blocked_pop_wakes_on_push() {
        let buffer = Arc::new(OverwriteBuffer::new(1));
        let reader = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.pop())
        };

        thread::sleep(Duration::from_millis(20));
        buffer.push(42);
        assert_eq!(reader.join().unwrap(), Some(42));
    }

    #[test]
    fn close_unblocks_reader_and_drains() {
        let buffer = Arc::new(OverwriteBuffer::new(2));
        buffer.push(1);
        buffer.close();
        buffer.push(2);

        assert_eq!(buffer.pop(), Some(1));
        assert_eq!(buffer.pop(), None);

        let empty: Arc<OverwriteBuffer<u8>> = Arc::new(OverwriteBuffer::new(1));
        let reader = {
            let empty = Arc::clone(&empty);
            thread::spawn(move || empty.pop())
        };
        thread::sleep(Duration::from_millis(20));
        empty.close();
        assert_eq!(reader.join().unwrap(), None);
    }

    #[test]
    fn producer_consumer_never_loses_the_last_item() {
        let buffer = Arc::new(OverwriteBuffer::new(1));
        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..10_000u32 {
                    buffer.push(i);
                }
            })
        };

        let mut last = None;
        let mut previous = None;
        while last != Some(9_999) {
            if let Some(v) = buffer.pop_timeout(Duration::from_millis(100)) {
                if let Some(p) = previous {
                    assert!(v > p, "items must come out in push order");
                }
                previous = Some(v);
                last = Some(v);
            } else if producer.is_finished() && buffer.is_empty() {
                break;
            }
        }
        producer.join().unwrap();
        assert_eq!(last, Some(9_999));
    }
}
