//! Blocking FIFO used to hand messages from I/O threads to dispatch threads.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Outcome of a bounded wait on a [`ConcurrentQueue`].
#[derive(Debug, PartialEq, Eq)]
pub enum Popped<T> {
    Item(T),
    TimedOut,
    /// Woken by [`ConcurrentQueue::notify_all`] without an item.
    Notified,
    /// The queue is closed and drained.
    Closed,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
    /// Bumped by every `notify_all` so waiters can tell an explicit wake-up
    /// apart from a spurious one.
    epoch: u64,
}

/// Thread-safe FIFO queue with blocking pop and explicit wake-up.
///
/// Items pushed by one thread come out in the order they were pushed. Nothing
/// is ever dropped: after [`close`](Self::close) consumers keep receiving the
/// remaining items and only then observe the closed state.
pub struct ConcurrentQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConcurrentQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
                epoch: 0,
            }),
            ready: Condvar::new(),
        }
    }

    /// Append an item and wake one blocked consumer
    pub fn push(&self, item: T) {
        let mut state = self.state.lock();
        state.items.push_back(item);
        drop(state);
        self.ready.notify_one();
    }

    /// Remove the oldest item, blocking until one is available.
    ///
    /// Returns `None` when woken by [`notify_all`](Self::notify_all) or once
    /// the queue is closed and empty.
    pub fn pop_blocking(&self) -> Option<T> {
        let mut state = self.state.lock();
        let epoch = state.epoch;
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed || state.epoch != epoch {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    /// Like [`pop_blocking`](Self::pop_blocking) but gives up after `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Popped<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let epoch = state.epoch;
        loop {
            if let Some(item) = state.items.pop_front() {
                return Popped::Item(item);
            }
            if state.closed {
                return Popped::Closed;
            }
            if state.epoch != epoch {
                return Popped::Notified;
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return match state.items.pop_front() {
                    Some(item) => Popped::Item(item),
                    None if state.closed => Popped::Closed,
                    None => Popped::TimedOut,
                };
            }
        }
    }

    /// Remove the oldest item without blocking
    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Wake every blocked consumer without pushing an item
    pub fn notify_all(&self) {
        let mut state = self.state.lock();
        state.epoch = state.epoch.wrapping_add(1);
        drop(state);
        self.ready.notify_all();
    }

    /// Mark the queue closed and wake every consumer.
    ///
    /// Items still queued remain poppable.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}
