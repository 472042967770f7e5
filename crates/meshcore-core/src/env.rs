//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness, the
//! RTC). Production uses [`SystemEnv`]; the simulation harness supplies a
//! virtual clock and a seeded RNG so every mesh interaction replays
//! byte-for-byte.

use std::{
    ops::{Add, Sub},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Bounds every engine clock type must satisfy.
///
/// `std::time::Instant` qualifies, as does the harness's virtual
/// [`TickInstant`]. The arithmetic bounds let the router schedule
/// rebroadcast deadlines (`now + delay`) and age node entries
/// (`now - last_seen`) without knowing the concrete clock.
pub trait MeshInstant:
    Copy
    + Ord
    + Send
    + Sync
    + std::fmt::Debug
    + Add<Duration, Output = Self>
    + Sub<Self, Output = Duration>
    + 'static
{
}

impl<T> MeshInstant for T where
    T: Copy
        + Ord
        + Send
        + Sync
        + std::fmt::Debug
        + Add<Duration, Output = Self>
        + Sub<Self, Output = Duration>
        + 'static
{
}

/// Abstract environment providing time and randomness.
///
/// # Invariants
///
/// - `now()` never goes backwards within one execution context.
/// - `random_bytes()` uses cryptographically secure entropy in production;
///   simulation environments may substitute a seeded generator.
/// - `unix_time_secs()` reflects the RTC and may jump (the user can set
///   the clock); protocol logic only stamps it into ADVERTs and messages,
///   never schedules with it.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The monotonic clock type used by this environment.
    type Instant: MeshInstant;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time as unix seconds, truncated to 32 bits.
    fn unix_time_secs(&self) -> u32;

    /// Fill the buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generate a random `u32`.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    /// Draw a uniform delay from `[min, max]`.
    ///
    /// Used for rebroadcast jitter. When `min >= max` the lower bound
    /// wins, so a misconfigured window degrades to a fixed delay rather
    /// than a panic.
    fn random_delay(&self, min: Duration, max: Duration) -> Duration {
        let span_ms = max.saturating_sub(min).as_millis() as u64;
        if span_ms == 0 {
            return min;
        }
        min + Duration::from_millis(u64::from(self.random_u32()) % (span_ms + 1))
    }
}

/// Production environment: OS clock and OS entropy.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create the production environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn unix_time_secs(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs() as u32)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let Ok(()) = getrandom::fill(buffer) else {
            unreachable!("OS entropy source unavailable");
        };
    }
}

/// Virtual millisecond clock for simulation and tests.
///
/// Plain counter semantics: `TickInstant(0)` is "boot", and the harness
/// advances it explicitly between engine ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TickInstant(u64);

impl TickInstant {
    /// Instant at `millis` since boot.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Milliseconds since boot.
    #[must_use]
    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl Add<Duration> for TickInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs.as_millis() as u64))
    }
}

impl Sub for TickInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}
