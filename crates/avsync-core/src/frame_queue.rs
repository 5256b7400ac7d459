//! Fixed-capacity ring buffer of decoded frames.
//!
//! The ring owns its frame slots. A producer (decode thread) reserves the
//! write slot with [`FrameQueue::peek_writable`], fills it and publishes it;
//! the consumer (refresh step or audio callback) peeks at the read slot and
//! releases it with [`FrameQueue::move_to_next`], which drops the previous
//! occupant.
//!
//! With `keep_last` enabled the most recently shown frame stays in the ring
//! after it has been consumed, so the refresh step can compare the frame on
//! screen with the next one. The first `move_to_next` after start only marks
//! the read slot as shown; later calls release it.
//!
//! Do not hold a [`FrameRef`] across a call to `move_to_next`: the read slot
//! is locked while it is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};

use crate::error::QueueAborted;
use crate::frame::{FrameTiming, QueuedFrame};

/// Ring capacity for decoded pictures.
pub const VIDEO_PICTURE_QUEUE_SIZE: usize = 3;
/// Ring capacity for decoded audio blocks.
pub const SAMPLE_QUEUE_SIZE: usize = 9;

/// Borrow of a queued frame.
pub type FrameRef<'a, T> = MappedMutexGuard<'a, T>;

#[derive(Debug, Default)]
struct RingState {
    rindex: usize,
    windex: usize,
    /// Frames in the ring, including the shown one.
    size: usize,
    /// 1 once the frame at `rindex` has been shown.
    rindex_shown: usize,
}

/// A bounded ring of decoded frames.
pub struct FrameQueue<T> {
    slots: Box<[Mutex<Option<T>>]>,
    state: Mutex<RingState>,
    cond: Condvar,
    keep_last: bool,
    stopped: AtomicBool,
}

/// Reserved write slot. Publishing it makes the frame visible to readers.
pub struct WritableSlot<'a, T> {
    queue: &'a FrameQueue<T>,
    index: usize,
}

impl<'a, T: QueuedFrame> WritableSlot<'a, T> {
    /// Stores `frame` in the slot and publishes it.
    pub fn push(self, frame: T) {
        // Previous occupant is released here.
        let previous = self.queue.slots[self.index].lock().replace(frame);
        drop(previous);

        let mut state = self.queue.state.lock();
        state.windex = (state.windex + 1) % self.queue.slots.len();
        state.size += 1;
        self.queue.cond.notify_all();
    }
}

impl<T: QueuedFrame> FrameQueue<T> {
    /// Creates a ring with `capacity` slots.
    pub fn new(capacity: usize, keep_last: bool) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity)
            .map(|_| Mutex::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            state: Mutex::new(RingState::default()),
            cond: Condvar::new(),
            keep_last,
            stopped: AtomicBool::new(false),
        }
    }

    /// Waits for a free slot.
    ///
    /// Blocks while the ring is full; returns `QueueAborted` once stopped.
    pub fn peek_writable(&self) -> Result<WritableSlot<'_, T>, QueueAborted> {
        let mut state = self.state.lock();
        while state.size >= self.slots.len() && !self.is_stopped() {
            self.cond.wait(&mut state);
        }
        if self.is_stopped() {
            return Err(QueueAborted);
        }
        Ok(WritableSlot {
            queue: self,
            index: state.windex,
        })
    }

    fn slot_ref(&self, index: usize) -> Option<FrameRef<'_, T>> {
        MutexGuard::try_map(self.slots[index].lock(), |slot| slot.as_mut()).ok()
    }

    /// Returns the next unshown frame without blocking.
    pub fn peek_readable(&self) -> Option<FrameRef<'_, T>> {
        let index = {
            let state = self.state.lock();
            if state.size <= state.rindex_shown {
                return None;
            }
            (state.rindex + state.rindex_shown) % self.slots.len()
        };
        self.slot_ref(index)
    }

    /// Waits for the next unshown frame.
    pub fn wait_readable(&self) -> Result<FrameRef<'_, T>, QueueAborted> {
        let index = {
            let mut state = self.state.lock();
            while state.size <= state.rindex_shown && !self.is_stopped() {
                self.cond.wait(&mut state);
            }
            if self.is_stopped() {
                return Err(QueueAborted);
            }
            (state.rindex + state.rindex_shown) % self.slots.len()
        };
        self.slot_ref(index).ok_or(QueueAborted)
    }

    /// Waits at most `timeout` for the next unshown frame.
    pub fn wait_readable_for(&self, timeout: Duration) -> Option<FrameRef<'_, T>> {
        let deadline = Instant::now() + timeout;
        let index = {
            let mut state = self.state.lock();
            while state.size <= state.rindex_shown && !self.is_stopped() {
                if self.cond.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
            if state.size <= state.rindex_shown || self.is_stopped() {
                return None;
            }
            (state.rindex + state.rindex_shown) % self.slots.len()
        };
        self.slot_ref(index)
    }

    /// Returns the frame at the read index: the one on screen once shown.
    pub fn peek_last(&self) -> Option<FrameRef<'_, T>> {
        let index = {
            let state = self.state.lock();
            if state.size == 0 {
                return None;
            }
            state.rindex
        };
        self.slot_ref(index)
    }

    /// Returns the frame after the next unshown one.
    pub fn peek_next(&self) -> Option<FrameRef<'_, T>> {
        let index = {
            let state = self.state.lock();
            if state.size < state.rindex_shown + 2 {
                return None;
            }
            (state.rindex + state.rindex_shown + 1) % self.slots.len()
        };
        self.slot_ref(index)
    }

    /// Timing of [`FrameQueue::peek_readable`].
    pub fn peek_timing(&self) -> Option<FrameTiming> {
        self.peek_readable().map(|frame| frame.timing())
    }

    /// Timing of [`FrameQueue::peek_last`].
    pub fn peek_last_timing(&self) -> Option<FrameTiming> {
        self.peek_last().map(|frame| frame.timing())
    }

    /// Timing of [`FrameQueue::peek_next`].
    pub fn peek_next_timing(&self) -> Option<FrameTiming> {
        self.peek_next().map(|frame| frame.timing())
    }

    /// Consumes the next frame.
    pub fn move_to_next(&self) {
        let released = {
            let mut state = self.state.lock();
            if state.size <= state.rindex_shown {
                return;
            }
            if self.keep_last && state.rindex_shown == 0 {
                state.rindex_shown = 1;
                return;
            }
            let released = self.slots[state.rindex].lock().take();
            state.rindex = (state.rindex + 1) % self.slots.len();
            state.size -= 1;
            self.cond.notify_all();
            released
        };
        drop(released);
    }

    /// Stops the ring: every current and future blocking call returns
    /// `QueueAborted`.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let _state = self.state.lock();
        self.cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Frames not yet shown.
    pub fn nb_remaining(&self) -> usize {
        let state = self.state.lock();
        state.size - state.rindex_shown
    }

    /// True once the frame at the read index has been shown.
    pub fn rindex_shown(&self) -> bool {
        self.state.lock().rindex_shown == 1
    }

    /// Byte position of the shown frame, if it belongs to epoch `serial`.
    pub fn last_shown_pos(&self, serial: u64) -> Option<i64> {
        if !self.rindex_shown() {
            return None;
        }
        let timing = self.peek_last_timing()?;
        if timing.serial == serial {
            timing.pos
        } else {
            None
        }
    }
}
