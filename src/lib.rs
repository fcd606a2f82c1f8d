//! # wakelight
//! Core of a wake-up-light alarm clock: recurring and one-time alarms, a
//! gradual sunrise brightness/color-temperature ramp on an addressable LED
//! strip, persisted alarm and settings state, and the cooperative task
//! loops binding them to synchronized wall-clock time.
//!
//! The crate is `no_std` and hardware-independent. Everything the firmware
//! must provide arrives through capability seams:
//!
//! - [`PixelStrip`](drivers::strip::PixelStrip) for the LED output; with no
//!   strip attached, [`NullStrip`](drivers::strip::NullStrip) runs the
//!   identical state machine against a diagnostic sink.
//! - [`StorageBackend`](utility::persist::StorageBackend) for the two
//!   persisted JSON documents (alarms and settings).
//! - [`TimeSync`](task::time_updater::TimeSync) for the WiFi/NTP
//!   collaborator that anchors the wall clock.
//!
//! Three cooperative task loops share the state objects through mutexes and
//! must run on one executor:
//! [`alarm_scheduler_task`](task::scheduler::alarm_scheduler_task) polls the
//! clock and store once per minute,
//! [`light_effects_task`](task::light_effects::light_effects_task) advances
//! the active effect every frame, and
//! [`time_sync_task`](task::time_updater::time_sync_task) keeps the clock
//! anchored with bounded retries. A request gateway mutates the stores and
//! the engine under the same mutexes; each mutation is applied and
//! persisted in one non-preemptible step.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod datetime;
pub mod drivers;
pub mod task;
pub mod utility;

pub use datetime::{Date, DateTime, TimeOfDay, Weekday};
pub use drivers::strip::{NullStrip, PixelStrip, StripError};
pub use task::alarm_store::{
    Alarm, AlarmDraft, AlarmKind, AlarmPatch, AlarmStore, DaySet, InvalidAlarm, MAX_ALARMS,
    StoreError,
};
pub use task::light_effects::{
    COLD_WHITE, EffectKind, LightEngine, LightStatus, SharedLightEngine, WARM_WHITE,
    light_effects_task,
};
pub use task::scheduler::{
    SharedAlarmStore, TICK_PERIOD, alarm_scheduler_task, run_tick, signal_scheduler_wake,
};
pub use task::settings::{
    Settings, SettingsError, SettingsPatch, SettingsStore, SharedSettingsStore,
};
pub use task::time_updater::{
    ClockReading, SyncError, SyncPolicy, TimeSource, TimeSync, time_sync_task,
};
pub use utility::persist::{MemoryStore, Region, StorageBackend, StorageError};
