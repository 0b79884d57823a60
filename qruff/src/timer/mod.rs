/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cooperative, single-threaded timer subsystem.
//!
//! The generator talks to timers only through [`TimerService`], which is
//! injected at construction.  [`TimerQueue`] is the implementation shipped
//! with the crate:
//!
//! * a logical millisecond clock that only moves when the owner calls
//!   [`TimerQueue::advance_to`] (tests) or a [`driver`] maps it onto
//!   `tokio::time` (binary);
//! * callbacks fire one at a time in `(deadline, rank, insertion)` order;
//! * the queue is never borrowed while a callback runs, so callbacks may
//!   schedule and cancel timers themselves.
//!
//! # Example
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use qruff::timer::{TimerQueue, TimerService};
//!
//! let queue = TimerQueue::new();
//! let hits = Rc::new(Cell::new(0));
//! let h = Rc::clone(&hits);
//! queue.schedule(100, Box::new(move || h.set(h.get() + 1))).unwrap();
//!
//! queue.advance_to(99);
//! assert_eq!(hits.get(), 0);
//! queue.advance_to(100);
//! assert_eq!(hits.get(), 1);
//! ```

pub mod driver;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default bound on simultaneously pending timers.
pub const DEFAULT_MAX_PENDING_TIMERS: usize = 4096;

// ── Public types ──────────────────────────────────────────────────────────────

/// Work scheduled on the cooperative loop.  Runs at most once.
pub type TimerCallback = Box<dyn FnOnce()>;

/// Cancellable reference to one scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Why a callback could not be scheduled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The queue already holds its maximum number of pending timers.
    #[error("timer queue exhausted: {capacity} timers already pending")]
    Exhausted { capacity: usize },

    /// [`TimerQueue::shutdown`] has been called.
    #[error("timer subsystem is shut down")]
    ShutDown,

    /// `now + delay` does not fit the millisecond clock.
    #[error("deadline overflows the timer clock: now {now_ms}ms + delay {delay_ms}ms")]
    DeadlineOverflow { now_ms: u64, delay_ms: u64 },
}

/// Timer capability consumed by the command generator.
///
/// Contract: single-threaded, at-most-once firing per successful schedule
/// call, `delay_ms` is a lower bound.
pub trait TimerService {
    /// Current logical time in milliseconds.
    fn now_ms(&self) -> u64;

    /// Schedule `callback` to run once, `delay_ms` from now.
    ///
    /// Among callbacks due in the same millisecond, lower `rank` fires first;
    /// equal ranks fire in scheduling order.
    fn schedule_ranked(
        &self,
        delay_ms: u64,
        rank: usize,
        callback: TimerCallback,
    ) -> Result<TimerHandle, TimerError>;

    fn schedule(&self, delay_ms: u64, callback: TimerCallback) -> Result<TimerHandle, TimerError> {
        self.schedule_ranked(delay_ms, 0, callback)
    }

    /// Cancel a pending callback.  Returns `false` if it already fired, was
    /// already cancelled, or never existed.
    fn cancel(&self, handle: TimerHandle) -> bool;
}

// ── TimerQueue ────────────────────────────────────────────────────────────────

/// Ordering key: deadline first, then rank, then handle id (insertion order).
type Key = (u64, usize, u64);

struct Pending {
    handle: TimerHandle,
    callback: TimerCallback,
}

struct QueueState {
    now_ms: u64,
    next_id: u64,
    pending: BTreeMap<Key, Pending>,
    index: HashMap<TimerHandle, Key>,
    capacity: usize,
    shut_down: bool,
    fired: u64,
}

/// Deterministic cooperative timer queue driven by a logical clock.
pub struct TimerQueue {
    state: RefCell<QueueState>,
    changed: Notify,
}

impl TimerQueue {
    /// Create a queue bounded by [`DEFAULT_MAX_PENDING_TIMERS`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_PENDING_TIMERS)
    }

    /// Create a queue that refuses to hold more than `capacity` pending timers.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: RefCell::new(QueueState {
                now_ms: 0,
                next_id: 0,
                pending: BTreeMap::new(),
                index: HashMap::new(),
                capacity,
                shut_down: false,
                fired: 0,
            }),
            changed: Notify::new(),
        }
    }

    /// Host-facing alias for [`TimerService::schedule`].
    pub fn set_timeout(
        &self,
        delay_ms: u64,
        callback: impl FnOnce() + 'static,
    ) -> Result<TimerHandle, TimerError> {
        self.schedule(delay_ms, Box::new(callback))
    }

    /// Host-facing alias for [`TimerService::cancel`].
    pub fn clear_timeout(&self, handle: TimerHandle) -> bool {
        self.cancel(handle)
    }

    /// Fire every callback due at or before `target_ms`, in order, then set the
    /// clock to `target_ms`.  Returns the number of callbacks fired.
    ///
    /// While a callback runs, [`now_ms`](TimerService::now_ms) reports that
    /// callback's deadline.  Callbacks scheduled with zero delay from inside
    /// a firing run within the same call.  Moving the clock backwards is a
    /// no-op.
    pub fn advance_to(&self, target_ms: u64) -> usize {
        let mut fired = 0usize;
        loop {
            let pending = {
                let mut st = self.state.borrow_mut();
                match st.pending.first_key_value() {
                    Some((key, _)) if key.0 <= target_ms => {}
                    _ => break,
                }
                let Some((key, pending)) = st.pending.pop_first() else {
                    break;
                };
                st.index.remove(&pending.handle);
                st.now_ms = st.now_ms.max(key.0);
                st.fired += 1;
                trace!(handle = %pending.handle, deadline_ms = key.0, rank = key.1, "firing");
                pending
            };
            // borrow released: the callback may re-enter the queue
            (pending.callback)();
            fired += 1;
        }

        let mut st = self.state.borrow_mut();
        st.now_ms = st.now_ms.max(target_ms);
        fired
    }

    /// Advance the clock by `delta_ms`.
    pub fn advance_by(&self, delta_ms: u64) -> usize {
        let target = self.now_ms().saturating_add(delta_ms);
        self.advance_to(target)
    }

    /// Deadline of the earliest pending callback.
    pub fn next_deadline(&self) -> Option<u64> {
        self.state
            .borrow()
            .pending
            .first_key_value()
            .map(|(key, _)| key.0)
    }

    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.state.borrow().pending.is_empty()
    }

    /// Total callbacks fired over the queue's lifetime.
    pub fn fired_count(&self) -> u64 {
        self.state.borrow().fired
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.borrow().shut_down
    }

    /// Drop every pending callback and refuse new ones.
    pub fn shutdown(&self) {
        let dropped: Vec<Pending> = {
            let mut st = self.state.borrow_mut();
            st.shut_down = true;
            st.index.clear();
            std::mem::take(&mut st.pending).into_values().collect()
        };
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "timer queue shut down with pending timers");
        }
        // callbacks are dropped outside the borrow; their captures may hold
        // handles back into this queue
        drop(dropped);
        self.changed.notify_one();
    }

    /// Resolves after the set of pending timers has changed.  Used by the
    /// real-time driver to re-plan its sleep.
    pub(crate) async fn changed(&self) {
        self.changed.notified().await
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("TimerQueue")
            .field("now_ms", &st.now_ms)
            .field("pending", &st.pending.len())
            .field("capacity", &st.capacity)
            .field("shut_down", &st.shut_down)
            .finish()
    }
}

impl TimerService for TimerQueue {
    fn now_ms(&self) -> u64 {
        self.state.borrow().now_ms
    }

    fn schedule_ranked(
        &self,
        delay_ms: u64,
        rank: usize,
        callback: TimerCallback,
    ) -> Result<TimerHandle, TimerError> {
        let handle = {
            let mut st = self.state.borrow_mut();
            if st.shut_down {
                return Err(TimerError::ShutDown);
            }
            if st.pending.len() >= st.capacity {
                warn!(capacity = st.capacity, "timer queue exhausted");
                return Err(TimerError::Exhausted {
                    capacity: st.capacity,
                });
            }

            let Some(deadline_ms) = st.now_ms.checked_add(delay_ms) else {
                return Err(TimerError::DeadlineOverflow {
                    now_ms: st.now_ms,
                    delay_ms,
                });
            };

            let id = st.next_id;
            st.next_id += 1;
            let handle = TimerHandle(id);
            let key = (deadline_ms, rank, id);

            st.pending.insert(key, Pending { handle, callback });
            st.index.insert(handle, key);
            trace!(%handle, deadline_ms = key.0, rank, "scheduled");
            handle
        };
        self.changed.notify_one();
        Ok(handle)
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        let removed = {
            let mut st = self.state.borrow_mut();
            match st.index.remove(&handle) {
                Some(key) => st.pending.remove(&key),
                None => None,
            }
        };
        match removed {
            Some(pending) => {
                trace!(%handle, "cancelled");
                drop(pending);
                self.changed.notify_one();
                true
            }
            None => false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
