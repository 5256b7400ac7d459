//! Presentation clocks.
//!
//! A [`Clock`] tracks the presentation time of one elementary stream. It stores
//! the last known pts together with the instant it was set and derives the
//! current value from elapsed time and a speed multiplier:
//!
//! ```text
//! current = pts + (now - last_updated) * speed
//! ```
//!
//! Clocks bound to a packet queue report `None` (invalid) as soon as the
//! queue's serial moves past the serial the clock was last set under, so a
//! seek immediately invalidates sync decisions based on pre-seek timestamps.
//!
//! Time is read from a [`TimeSource`]. Production code uses [`SystemTime`];
//! simulations and tests drive a [`ManualTime`] explicitly.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Maximum speed deviation applied by [`Clock::sync_to`] when nudging.
pub const MAX_SPEED_ADJUST: f64 = 0.1;

/// Monotonic time in seconds.
pub trait TimeSource: Send + Sync + fmt::Debug {
    /// Returns the current time in seconds from an arbitrary origin.
    fn now(&self) -> f64;
}

/// Shared handle to a time source.
pub type SharedTimeSource = Arc<dyn TimeSource>;

/// Wall-clock monotonic time source.
#[derive(Debug)]
pub struct SystemTime {
    origin: Instant,
}

impl SystemTime {
    /// Creates a time source whose origin is "now".
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Creates a shared system time source.
    pub fn shared() -> SharedTimeSource {
        Arc::new(Self::new())
    }
}

impl Default for SystemTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTime {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually advanced time source for simulation.
///
/// Stored as microseconds so reads and writes are single atomic operations.
#[derive(Debug, Default)]
pub struct ManualTime {
    now_us: AtomicU64,
}

impl ManualTime {
    /// Creates a manual time source starting at `start` seconds.
    pub fn new(start: f64) -> Self {
        Self {
            now_us: AtomicU64::new((start.max(0.0) * 1_000_000.0) as u64),
        }
    }

    /// Creates a shared manual time source.
    pub fn shared(start: f64) -> Arc<Self> {
        Arc::new(Self::new(start))
    }

    /// Moves time forward.
    pub fn advance(&self, by: Duration) {
        self.now_us
            .fetch_add(by.as_micros() as u64, Ordering::AcqRel);
    }

    /// Jumps to an absolute time in seconds.
    pub fn set(&self, seconds: f64) {
        self.now_us
            .store((seconds.max(0.0) * 1_000_000.0) as u64, Ordering::Release);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> f64 {
        self.now_us.load(Ordering::Acquire) as f64 / 1_000_000.0
    }
}

#[derive(Debug, Clone, Copy)]
struct ClockState {
    /// Clock base; `None` until the first `set`.
    pts: Option<f64>,
    /// `pts - last_updated`
    pts_drift: f64,
    last_updated: f64,
    speed: f64,
    serial: u64,
    paused: bool,
}

/// A presentation-time tracker for one stream.
pub struct Clock {
    state: Mutex<ClockState>,
    /// Serial of the packet queue feeding this clock. Unbound clocks are
    /// always considered current.
    queue_serial: Option<Arc<AtomicU64>>,
    time: SharedTimeSource,
}

impl Clock {
    /// Creates a free-running clock not bound to any queue.
    pub fn new(time: SharedTimeSource) -> Self {
        Self::build(time, None)
    }

    /// Creates a clock that is invalid whenever `queue_serial` differs from the
    /// serial it was last set under.
    pub fn with_queue_serial(time: SharedTimeSource, queue_serial: Arc<AtomicU64>) -> Self {
        Self::build(time, Some(queue_serial))
    }

    fn build(time: SharedTimeSource, queue_serial: Option<Arc<AtomicU64>>) -> Self {
        let now = time.now();
        Self {
            state: Mutex::new(ClockState {
                pts: None,
                pts_drift: 0.0,
                last_updated: now,
                speed: 1.0,
                serial: 0,
                paused: false,
            }),
            queue_serial,
            time,
        }
    }

    fn is_current(&self, state: &ClockState) -> bool {
        match &self.queue_serial {
            Some(serial) => serial.load(Ordering::Acquire) == state.serial,
            None => true,
        }
    }

    fn value_at(state: &ClockState, now: f64) -> Option<f64> {
        let pts = state.pts?;
        if state.paused {
            return Some(pts);
        }
        Some(state.pts_drift + now - (now - state.last_updated) * (1.0 - state.speed))
    }

    /// Returns the current presentation time, or `None` if the clock was never
    /// set or belongs to a stale epoch.
    pub fn get(&self) -> Option<f64> {
        let state = self.state.lock();
        if !self.is_current(&state) {
            return None;
        }
        Self::value_at(&state, self.time.now())
    }

    /// Sets the clock to `pts` as of now.
    pub fn set(&self, pts: f64, serial: u64) {
        let now = self.time.now();
        self.set_at(pts, serial, now);
    }

    /// Sets the clock to `pts` as of `time` (seconds on this clock's time source).
    ///
    /// A non-finite `pts` makes the clock invalid.
    pub fn set_at(&self, pts: f64, serial: u64, time: f64) {
        let mut state = self.state.lock();
        Self::store(&mut state, pts, serial, time);
    }

    fn store(state: &mut ClockState, pts: f64, serial: u64, time: f64) {
        state.pts = pts.is_finite().then_some(pts);
        state.last_updated = time;
        state.pts_drift = pts - time;
        state.serial = serial;
    }

    /// Changes the speed multiplier without a discontinuity.
    pub fn set_speed(&self, speed: f64) {
        let now = self.time.now();
        let mut state = self.state.lock();
        if let Some(current) = Self::value_at(&state, now) {
            let serial = state.serial;
            Self::store(&mut state, current, serial, now);
        }
        state.speed = speed;
    }

    /// Returns the speed multiplier.
    pub fn speed(&self) -> f64 {
        self.state.lock().speed
    }

    /// Freezes or resumes the clock.
    ///
    /// Pausing re-anchors at the derived current time, so `get()` is constant
    /// while paused and continuous across resume.
    pub fn set_paused(&self, paused: bool) {
        let now = self.time.now();
        let mut state = self.state.lock();
        if state.paused == paused {
            return;
        }
        if paused {
            if let Some(current) = Self::value_at(&state, now) {
                let serial = state.serial;
                Self::store(&mut state, current, serial, now);
            } else {
                state.last_updated = now;
            }
        } else {
            state.last_updated = now;
            if let Some(pts) = state.pts {
                state.pts_drift = pts - now;
            }
        }
        state.paused = paused;
    }

    /// Returns true if the clock is paused.
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Time (on the clock's time source) of the last update.
    pub fn last_updated(&self) -> f64 {
        self.state.lock().last_updated
    }

    /// Serial of the epoch the clock was last set under.
    pub fn serial(&self) -> u64 {
        self.state.lock().serial
    }

    /// Slaves this clock to `other`.
    ///
    /// Snaps to `other` when this clock is invalid or the gap reaches
    /// `threshold` seconds. Smaller gaps are absorbed by adjusting this
    /// clock's speed around `other`'s speed (by at most [`MAX_SPEED_ADJUST`]).
    pub fn sync_to(&self, other: &Clock, threshold: f64) {
        let Some(target) = other.get() else {
            return;
        };
        let (other_serial, other_speed) = {
            let state = other.state.lock();
            (state.serial, state.speed)
        };

        let now = self.time.now();
        let mut state = self.state.lock();
        let current = if self.is_current(&state) {
            Self::value_at(&state, now)
        } else {
            None
        };

        match current {
            Some(value) if (value - target).abs() < threshold => {
                let diff = value - target;
                let correction = (-diff / threshold).clamp(-1.0, 1.0) * MAX_SPEED_ADJUST;
                let serial = state.serial;
                Self::store(&mut state, value, serial, now);
                state.speed = other_speed + correction;
            }
            _ => {
                Self::store(&mut state, target, other_serial, now);
                state.speed = other_speed;
            }
        }
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = *self.state.lock();
        f.debug_struct("Clock")
            .field("pts", &state.pts)
            .field("serial", &state.serial)
            .field("speed", &state.speed)
            .field("paused", &state.paused)
            .finish()
    }
}
