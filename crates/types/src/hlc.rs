//! Hybrid logical clock.
//!
//! Timestamps pack wall-clock seconds and a logical counter into one `u64`:
//!
//! ```text
//! | 48 bits: physical (seconds since Unix epoch) | 16 bits: logical |
//! ```
//!
//! Ordering the raw `u64` orders by physical time first, then by the counter.
//! A clock issues strictly increasing stamps. When more than 65,536 stamps
//! are requested within one second, [`HybridClock::now`] blocks until the
//! wall clock moves past the stored physical second.

use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use tracing::warn;

const LOGICAL_BITS: u32 = 16;
const LOGICAL_MASK: u64 = (1 << LOGICAL_BITS) - 1;

/// Largest physical second representable in 48 bits.
pub const MAX_PHYSICAL: u64 = (1 << 48) - 1;

/// How often an exhausted clock re-reads wall time.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(500);

/// Errors from reading the clock.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum ClockError {
    /// System clock is before the Unix epoch.
    #[snafu(display("system clock is before Unix epoch"))]
    SystemClock,

    /// Wall time no longer fits in 48 bits.
    #[snafu(display("physical time {seconds}s exceeds 48 bits"))]
    PhysicalOverflow {
        /// The offending wall-clock reading.
        seconds: u64,
    },
}

/// A packed hybrid logical clock timestamp.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct HlcTimestamp(u64);

impl HlcTimestamp {
    /// Packs a physical second and logical counter.
    ///
    /// Physical values above [`MAX_PHYSICAL`] are truncated to 48 bits.
    pub const fn new(physical: u64, logical: u16) -> Self {
        Self(((physical & MAX_PHYSICAL) << LOGICAL_BITS) | logical as u64)
    }

    /// Wall-clock seconds component.
    pub const fn physical(self) -> u64 {
        self.0 >> LOGICAL_BITS
    }

    /// Logical counter component.
    pub const fn logical(self) -> u16 {
        (self.0 & LOGICAL_MASK) as u16
    }

    /// The packed representation.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Reinterprets a packed value, e.g. one read back from storage.
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for HlcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:05}", self.physical(), self.logical())
    }
}

impl From<HlcTimestamp> for u64 {
    fn from(ts: HlcTimestamp) -> Self {
        ts.0
    }
}

/// Source of wall-clock seconds.
pub trait TimeSource: Send + Sync {
    /// Current wall time in whole seconds since the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::SystemClock`] if the time cannot be read.
    fn now_secs(&self) -> Result<u64, ClockError>;
}

/// Reads [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_secs(&self) -> Result<u64, ClockError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .map_err(|_| ClockError::SystemClock)
    }
}

struct ClockState {
    last: HlcTimestamp,
    /// Set while wall time reads behind `last`, so regression is logged once.
    behind: bool,
}

/// Issues strictly increasing [`HlcTimestamp`]s.
///
/// Safe to share across threads; callers serialize on an internal mutex.
pub struct HybridClock<S: TimeSource = SystemTimeSource> {
    source: S,
    poll_interval: Duration,
    state: Mutex<ClockState>,
}

impl HybridClock<SystemTimeSource> {
    /// A clock over system time.
    pub fn new() -> Self {
        Self::with_source(SystemTimeSource)
    }
}

impl Default for HybridClock<SystemTimeSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TimeSource> HybridClock<S> {
    /// A clock over a custom time source.
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: Mutex::new(ClockState { last: HlcTimestamp::default(), behind: false }),
        }
    }

    /// Overrides the overflow poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Raises the clock to at least `last_seen`.
    ///
    /// Call with the largest persisted stamp on startup; every later
    /// [`now`](Self::now) is greater than it.
    pub fn seed(&self, last_seen: HlcTimestamp) {
        let mut state = self.state.lock();
        if last_seen > state.last {
            state.last = last_seen;
        }
    }

    /// The most recently issued (or seeded) stamp.
    pub fn last(&self) -> HlcTimestamp {
        self.state.lock().last
    }

    /// Issues the next timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError`] if the time source fails or wall time no
    /// longer fits in 48 bits.
    pub fn now(&self) -> Result<HlcTimestamp, ClockError> {
        let mut state = self.state.lock();
        let mut waited = false;
        loop {
            let wall = self.source.now_secs()?;
            if wall > MAX_PHYSICAL {
                return Err(ClockError::PhysicalOverflow { seconds: wall });
            }

            let physical = state.last.physical();
            if wall > physical {
                state.behind = false;
                state.last = HlcTimestamp::new(wall, 0);
                return Ok(state.last);
            }

            if wall < physical && !state.behind {
                state.behind = true;
                warn!(wall, physical, "Wall clock behind last issued timestamp");
            }

            let logical = state.last.logical();
            if u64::from(logical) < LOGICAL_MASK {
                state.last = HlcTimestamp::new(physical, logical + 1);
                return Ok(state.last);
            }

            if !waited {
                waited = true;
                warn!(physical, "Logical counter exhausted, waiting for next second");
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

impl<S: TimeSource> fmt::Debug for HybridClock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridClock")
            .field("last", &self.last())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
