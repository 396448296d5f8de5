use crate::builder::Builder;
use crate::clock::{SystemClock, TimeSource};
use crate::error::*;
use chrono::{DateTime, Utc};
use crossbeam::epoch::{self, Atomic, Owned};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};
use tracing::{debug, warn};

// The top bit of the u64 is reserved so ids stay positive as i64.
// time(41) | worker_id(13) | sequence(9)

/// bit length of time
pub const BIT_LEN_TIME: u64 = 41;
/// bit length of sequence number
pub const BIT_LEN_SEQUENCE: u64 = 9;
/// bit length of worker id
pub const BIT_LEN_WORKER_ID: u64 = 63 - BIT_LEN_TIME - BIT_LEN_SEQUENCE;
/// max sequence number, i.e. at most `MAX_SEQUENCE + 1` ids per millisecond
pub const MAX_SEQUENCE: u16 = (1 << BIT_LEN_SEQUENCE) - 1;
/// max worker id
pub const MAX_WORKER_ID: u16 = (1 << BIT_LEN_WORKER_ID) - 1;
/// shift of the worker id section
pub const SHIFT_WORKER_ID: u64 = BIT_LEN_SEQUENCE;
/// shift of the time section
pub const SHIFT_TIME: u64 = BIT_LEN_SEQUENCE + BIT_LEN_WORKER_ID;
/// The zero point of the time section, in milliseconds since the Unix epoch
/// (2020-12-31T16:00:00Z).
pub const EPOCH_MILLIS: i64 = 1_609_430_400_000;
/// Backward clock jumps up to this many milliseconds are waited out.
/// Larger jumps are tolerated without waiting, and ids generated
/// while they persist may collide.
pub const CLOCK_REGRESSION_TOLERANCE_MS: i64 = 1_000;

/// Backoff when the sequence of the current window is used up.
const SEQUENCE_BACKOFF: Duration = Duration::from_millis(1);

/// One generation window: a millisecond and the sequence issued within it.
///
/// `time` never changes after construction. Moving to another millisecond
/// replaces the whole cycle, so a sequence can never be paired with a time
/// it was not issued under.
#[derive(Debug)]
pub(crate) struct TimeCycle {
    pub(crate) time: i64,
    pub(crate) sequence: AtomicU32,
}

impl TimeCycle {
    pub(crate) fn new(time: i64) -> Self {
        Self {
            time,
            sequence: AtomicU32::new(0),
        }
    }

    /// Claims the next sequence number of this window, or `None` once the
    /// window is saturated.
    #[inline]
    fn next_sequence(&self) -> Option<u16> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        if sequence > u32::from(MAX_SEQUENCE) {
            None
        } else {
            Some(sequence as u16)
        }
    }
}

/// Outcome of a single pass over the generation loop.
enum Attempt {
    Ready(u64),
    Backoff(Duration),
}

/// SharedSnowflake is shared between Snowflake instances.
/// This struct is not exposed to the public.
pub(crate) struct SharedSnowflake<T> {
    pub(crate) worker_id: u16,
    pub(crate) cycle: Atomic<TimeCycle>,
    pub(crate) time: T,
    pub(crate) clock_regressions: AtomicU64,
}

impl<T: TimeSource> SharedSnowflake<T> {
    pub(crate) fn new(worker_id: u16, time: T, now: i64) -> Self {
        Self {
            worker_id,
            cycle: Atomic::new(TimeCycle::new(now)),
            time,
            clock_regressions: AtomicU64::new(0),
        }
    }

    fn try_next_id(&self) -> Attempt {
        let guard = &epoch::pin();
        let current = self.cycle.load(Ordering::Acquire, guard);
        // SAFETY: the cycle pointer is never null, and a replaced cycle is
        // only destroyed once no pinned thread can still observe it.
        let cycle = unsafe { current.deref() };
        let now = self.time.current_millis();

        if now == cycle.time {
            return self.issue_from(cycle);
        }

        if now < cycle.time {
            let behind = cycle.time - now;
            if behind <= CLOCK_REGRESSION_TOLERANCE_MS {
                debug!(now, last = cycle.time, behind_ms = behind, "clock moved backwards, waiting");
                return Attempt::Backoff(Duration::from_millis(behind as u64));
            }
            self.clock_regressions.fetch_add(1, Ordering::Relaxed);
            warn!(
                now,
                last = cycle.time,
                behind_ms = behind,
                worker_id = self.worker_id,
                "clock moved backwards beyond tolerance, ids are no longer guaranteed unique"
            );
        }

        match self.cycle.compare_exchange(
            current,
            Owned::new(TimeCycle::new(now)),
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(_) => {
                // SAFETY: `current` is unlinked now and is reclaimed only
                // after every guard pinned before the swap is released.
                unsafe { guard.defer_destroy(current) };
                Attempt::Ready(compose(now, self.worker_id, 0))
            }
            // Another caller advanced the window first. Drain what is left of
            // the window this caller observed.
            Err(_) => self.issue_from(cycle),
        }
    }

    #[inline]
    fn issue_from(&self, cycle: &TimeCycle) -> Attempt {
        match cycle.next_sequence() {
            Some(sequence) => Attempt::Ready(compose(cycle.time, self.worker_id, sequence)),
            None => Attempt::Backoff(SEQUENCE_BACKOFF),
        }
    }
}

impl<T> Drop for SharedSnowflake<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` proves no other thread can reach the cycle.
        unsafe {
            let cycle = self.cycle.load(Ordering::Relaxed, epoch::unprotected());
            if !cycle.is_null() {
                drop(cycle.into_owned());
            }
        }
    }
}

/// Snowflake is a lock-free distributed unique ID generator.
/// It is thread-safe and can be cloned to be used in multiple threads.
///
/// Clones share one generator. Every [`Snowflake::new`] or
/// [`Builder::finalize`] call creates an independent one.
///
/// # Clock regressions
///
/// If the time source moves backwards by up to
/// [`CLOCK_REGRESSION_TOLERANCE_MS`], `next_id` sleeps until time catches up.
/// A larger jump is logged at `WARN`, counted in
/// [`clock_regressions`](Snowflake::clock_regressions), and generation goes
/// on with the earlier time. **Ids generated while such a jump persists are
/// not guaranteed to be unique.**
pub struct Snowflake<T = SystemClock>(pub(crate) Arc<SharedSnowflake<T>>);

impl Snowflake {
    /// Create a new Snowflake for `worker_id`, reading the system clock.
    ///
    /// Returns [`Error::WorkerIdOutOfRange`] if `worker_id` is greater than
    /// [`MAX_WORKER_ID`]. For other configuration see [`builder`].
    ///
    /// [`builder`]: struct.Snowflake.html#method.builder
    pub fn new(worker_id: u16) -> Result<Self, Error> {
        Builder::new().worker_id(&move || Ok(worker_id)).finalize()
    }

    /// Create a new [`Builder`] to construct a Snowflake.
    ///
    /// [`Builder`]: struct.Builder.html
    pub fn builder<'a>() -> Builder<'a> {
        Builder::new()
    }
}

impl<T: TimeSource> Snowflake<T> {
    pub(crate) fn new_inner(shared: Arc<SharedSnowflake<T>>) -> Self {
        Self(shared)
    }

    /// Generate the next unique id.
    ///
    /// Never fails. It may sleep for about a millisecond when the current
    /// window is saturated, or for up to
    /// [`CLOCK_REGRESSION_TOLERANCE_MS`] after a small clock regression.
    pub fn next_id(&self) -> u64 {
        loop {
            match self.0.try_next_id() {
                Attempt::Ready(id) => return id,
                Attempt::Backoff(wait) => thread::sleep(wait),
            }
        }
    }

    /// The worker id encoded into every id of this generator.
    pub fn worker_id(&self) -> u16 {
        self.0.worker_id
    }

    /// How many times a clock regression beyond
    /// [`CLOCK_REGRESSION_TOLERANCE_MS`] has been observed.
    pub fn clock_regressions(&self) -> u64 {
        self.0.clock_regressions.load(Ordering::Relaxed)
    }
}

/// Returns a new `Snowflake` referencing the same state as `self`.
/// This is used for concurrent use.
impl<T> Clone for Snowflake<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// Pack a millisecond timestamp, worker id and sequence into an id.
///
/// `worker_id` and `sequence` are truncated to their bit lengths.
#[inline]
pub fn compose(timestamp: i64, worker_id: u16, sequence: u16) -> u64 {
    (((timestamp - EPOCH_MILLIS) as u64) << SHIFT_TIME)
        | (u64::from(worker_id & MAX_WORKER_ID) << SHIFT_WORKER_ID)
        | u64::from(sequence & MAX_SEQUENCE)
}

/// Returns the generation time of `id` in milliseconds since the Unix epoch.
#[inline]
pub fn timestamp_of(id: u64) -> i64 {
    (id >> SHIFT_TIME) as i64 + EPOCH_MILLIS
}

/// Returns the worker id encoded in `id`.
#[inline]
pub fn worker_of(id: u64) -> u16 {
    ((id >> SHIFT_WORKER_ID) & u64::from(MAX_WORKER_ID)) as u16
}

/// Returns the sequence number encoded in `id`.
#[inline]
pub fn sequence_of(id: u64) -> u16 {
    (id & u64::from(MAX_SEQUENCE)) as u16
}

/// DecomposedSnowflake is the parts of a Snowflake ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecomposedSnowflake {
    pub id: u64,
    pub msb: u64,
    pub timestamp: i64,
    pub worker_id: u16,
    pub sequence: u16,
}

impl DecomposedSnowflake {
    /// Returns the generation time as a UTC datetime.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Packs the parts back into the id.
    pub fn compose(&self) -> u64 {
        compose(self.timestamp, self.worker_id, self.sequence)
    }
}

/// Break a Snowflake ID up into its parts.
pub fn decompose(id: u64) -> DecomposedSnowflake {
    DecomposedSnowflake {
        id,
        msb: id >> 63,
        timestamp: timestamp_of(id),
        worker_id: worker_of(id),
        sequence: sequence_of(id),
    }
}
