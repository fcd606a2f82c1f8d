//! # Alarm scheduler
//! This module contains the outer polling loop of the system: once per
//! minute it reads the wall clock, asks the store for due alarms and starts
//! the sunrise ramp for each of them in ascending id order, persisting the
//! trigger bookkeeping immediately.
//!
//! The full alarm set is re-read from the store every tick, so edits made
//! through the gateway take effect on the next tick without a restart. An
//! unsynchronized clock silences the tick entirely; triggering against an
//! un-synced clock is never allowed. When several alarms are due in the
//! same tick each one is marked triggered, but the strip is a single shared
//! resource, so only the last ramp started stays visible.

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Ticker};

use crate::drivers::strip::PixelStrip;
use crate::task::alarm_store::AlarmStore;
use crate::task::light_effects::{LightEngine, SharedLightEngine};
use crate::task::time_updater::{ClockReading, TimeSource};
use crate::utility::persist::StorageBackend;

/// Period of the outer scheduling tick. Matching is minute-granular and
/// guarded by the per-day trigger bookkeeping, so an extra check within the
/// same minute is a no-op.
pub const TICK_PERIOD: Duration = Duration::from_secs(60);

/// The alarm store protected by a mutex, shared between the scheduler and
/// the request gateway.
pub type SharedAlarmStore<B> = Mutex<CriticalSectionRawMutex, AlarmStore<B>>;

/// Signal for running a scheduler tick before the ticker fires
static SCHEDULER_WAKE_SIGNAL: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Signals the scheduler to run a tick early, e.g. after an alarm edit.
pub fn signal_scheduler_wake() {
    SCHEDULER_WAKE_SIGNAL.signal(());
}

/// Run one scheduler tick against an already-taken reading.
///
/// For every due alarm, in ascending id order: start the sunrise ramp and
/// persist the trigger bookkeeping before anything else happens. Returns
/// the number of alarms fired.
pub fn run_tick<B: StorageBackend, S: PixelStrip>(
    store: &mut AlarmStore<B>,
    engine: &mut LightEngine<S>,
    reading: &ClockReading,
    now: Instant,
) -> usize {
    if !reading.synchronized {
        debug!("clock unsynchronized, skipping alarm check");
        return 0;
    }

    let due = store.find_due(reading);
    let mut fired = 0;
    for &id in &due {
        let Ok(alarm) = store.get(id) else {
            continue;
        };
        let max_brightness = alarm.max_brightness;
        let ramp_duration = alarm.ramp_duration;
        let color_temp = alarm.color_temp;
        info!(
            "alarm {} due at {:02}:{:02}",
            id, reading.datetime.hour, reading.datetime.minute
        );

        engine.start_ramp(now, max_brightness, ramp_duration, color_temp);
        match store.mark_triggered(id, reading.datetime.date()) {
            Ok(()) => fired += 1,
            Err(e) => warn!("failed to mark alarm {} triggered: {}", id, e),
        }
    }
    fired
}

/// This task polls the clock and the alarm store on the outer tick and
/// drives the light engine when alarms come due.
///
/// Each tick completes its reads, ramp starts and persisted bookkeeping
/// before the task yields again, so no other task can observe a
/// half-applied trigger. Between ticks the task sleeps on the ticker or on
/// the early-wake signal, whichever fires first.
pub async fn alarm_scheduler_task<B: StorageBackend, S: PixelStrip>(
    store: &SharedAlarmStore<B>,
    engine: &SharedLightEngine<S>,
    time_source: &TimeSource,
) -> ! {
    info!("alarm scheduler task started");
    let mut ticker = Ticker::every(TICK_PERIOD);
    loop {
        {
            let reading = time_source.read(Instant::now());
            let mut store = store.lock().await;
            let mut engine = engine.lock().await;
            run_tick(&mut store, &mut engine, &reading, Instant::now());
        }
        select(ticker.next(), SCHEDULER_WAKE_SIGNAL.wait()).await;
    }
}
