//! # Time source and sync task
//! This module contains the synchronized wall clock the scheduler reads and
//! the task that keeps it synchronized through an external collaborator.
//!
//! The collaborator (WiFi + NTP in the firmware, a script in tests) is only
//! asked for unix time; everything else, the offset into local time and the
//! civil calendar conversion, happens here. Until the first successful sync
//! the source reports itself unsynchronized and the scheduler performs no
//! matching at all.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant, Timer};

use crate::datetime::DateTime;
use crate::drivers::strip::PixelStrip;
use crate::task::light_effects::SharedLightEngine;
use crate::task::settings::Settings;

/// How long to wait between successful refreshes (6 hours).
const REFRESH_PERIOD: Duration = Duration::from_secs(21_600);

/// How long to wait before starting a new round after a failed one.
const FAILED_ROUND_PERIOD: Duration = Duration::from_secs(30);

/// A wall-clock reading handed to the scheduler.
///
/// The `datetime` is only meaningful while `synchronized` is true; an
/// unsynchronized reading reports the epoch and must never be matched
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockReading {
    /// Local civil date and time
    pub datetime: DateTime,
    /// Whether the clock has been synchronized
    pub synchronized: bool,
}

/// Errors the time-sync collaborator can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncError {
    /// The time server could not be reached.
    Unreachable,
    /// The server answered with something that is not a time.
    InvalidResponse,
}

impl core::fmt::Display for SyncError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unreachable => write!(f, "time server unreachable"),
            Self::InvalidResponse => write!(f, "invalid time server response"),
        }
    }
}

/// External time-sync collaborator.
///
/// The transport (WiFi association, the NTP exchange, its timeouts) lives
/// behind this trait; one call is one attempt.
#[allow(async_fn_in_trait)]
pub trait TimeSync {
    /// Fetch the current unix time in seconds (UTC).
    async fn fetch_unix_time(&mut self) -> Result<u64, SyncError>;
}

/// Retry policy for one synchronization round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncPolicy {
    /// Attempts per round, at least 1
    pub retries: u8,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
}

impl From<&Settings> for SyncPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            retries: settings.sync_retries.max(1),
            retry_delay: Duration::from_secs(u64::from(settings.sync_retry_secs)),
        }
    }
}

/// A synchronization reference: unix time paired with the monotonic instant
/// it was obtained at.
#[derive(Debug, Clone, Copy)]
struct SyncReference {
    /// Unix time in seconds (UTC) at the moment of sync
    unix_secs: u64,
    /// Monotonic instant the sync happened at
    at: Instant,
}

/// Interior state of the time source.
struct ClockState {
    /// The last successful sync, `None` until the first one
    reference: Option<SyncReference>,
    /// Local offset east of UTC in whole hours
    utc_offset_hours: i8,
}

/// The wall clock of the system: a monotonic clock anchored to unix time by
/// the sync task, shifted into local time by the configured offset.
pub struct TimeSource {
    /// Shared clock state
    state: Mutex<CriticalSectionRawMutex, RefCell<ClockState>>,
}

impl TimeSource {
    /// Create an unsynchronized source with a zero UTC offset.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(ClockState {
                reference: None,
                utc_offset_hours: 0,
            })),
        }
    }

    /// Set the local offset east of UTC in whole hours.
    pub fn set_utc_offset(&self, hours: i8) {
        self.state.lock(|state| {
            state.borrow_mut().utc_offset_hours = hours;
        });
    }

    /// Anchor the clock: `unix_secs` was the UTC time at instant `at`.
    pub fn apply_sync(&self, unix_secs: u64, at: Instant) {
        self.state.lock(|state| {
            state.borrow_mut().reference = Some(SyncReference { unix_secs, at });
        });
    }

    /// Drop the sync anchor, silencing the scheduler until the next sync.
    pub fn mark_unsynchronized(&self) {
        self.state.lock(|state| {
            state.borrow_mut().reference = None;
        });
    }

    /// Whether the clock has been synchronized.
    pub fn is_synchronized(&self) -> bool {
        self.state.lock(|state| state.borrow().reference.is_some())
    }

    /// Read the local wall clock as of the monotonic instant `now`.
    pub fn read(&self, now: Instant) -> ClockReading {
        self.state.lock(|state| {
            let state = state.borrow();
            match state.reference {
                None => ClockReading {
                    datetime: DateTime::from_local_secs(0),
                    synchronized: false,
                },
                Some(reference) => {
                    let elapsed = now
                        .checked_duration_since(reference.at)
                        .unwrap_or(Duration::from_ticks(0));
                    #[allow(clippy::cast_possible_wrap)]
                    let unix = reference.unix_secs as i64 + elapsed.as_secs() as i64;
                    let local = unix + i64::from(state.utc_offset_hours) * 3600;
                    ClockReading {
                        datetime: DateTime::from_local_secs(local),
                        synchronized: true,
                    }
                }
            }
        })
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one bounded-retry synchronization round. Returns true when the
/// source was anchored.
async fn sync_round<T: TimeSync>(
    source: &TimeSource,
    collaborator: &mut T,
    policy: &SyncPolicy,
) -> bool {
    let retries = policy.retries.max(1);
    for attempt in 1..=retries {
        match collaborator.fetch_unix_time().await {
            Ok(unix_secs) => {
                source.apply_sync(unix_secs, Instant::now());
                info!("clock synchronized on attempt {}/{}", attempt, retries);
                return true;
            }
            Err(e) => {
                warn!("time sync attempt {}/{} failed: {}", attempt, retries, e);
                if attempt < retries {
                    Timer::after(policy.retry_delay).await;
                }
            }
        }
    }
    false
}

/// This task keeps the time source synchronized: a bounded-retry round at
/// startup and after every refresh period, a shorter pause after a failed
/// round. If a round fails while the clock has never been synchronized, the
/// light engine flashes the error blink so the fault is visible; the
/// scheduler is already silenced by the unsynchronized flag.
pub async fn time_sync_task<T: TimeSync, S: PixelStrip>(
    source: &TimeSource,
    collaborator: &mut T,
    policy: SyncPolicy,
    engine: &SharedLightEngine<S>,
) -> ! {
    info!("time sync task started");
    loop {
        let synced = sync_round(source, collaborator, &policy).await;
        if synced {
            Timer::after(REFRESH_PERIOD).await;
        } else {
            warn!("time sync round failed");
            if !source.is_synchronized() {
                engine.lock().await.start_error_blink(Instant::now());
            }
            Timer::after(FAILED_ROUND_PERIOD).await;
        }
    }
}
