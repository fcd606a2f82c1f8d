//! # Alarm store
//! This module contains the alarm data model and the store that owns the
//! alarm list: validated create/update/delete, the due-alarm query the
//! scheduler polls, and the trigger bookkeeping that keeps an alarm from
//! firing twice.
//!
//! Every mutation is applied and persisted before the call returns, so a
//! restart can never lose a trigger decision that was already made.
//! Malformed input is rejected up front and never reaches the list; the
//! scheduler only ever reads validated records.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::datetime::{Date, TimeOfDay};
use crate::task::time_updater::ClockReading;
use crate::utility::persist::{ALARMS_DOC_CAPACITY, Region, StorageBackend, StorageError};

/// Maximum number of alarms the store holds.
pub const MAX_ALARMS: usize = 16;

/// Capacity of a weekday set, one slot per weekday.
pub const MAX_DAYS: usize = 7;

/// A set of weekday indices, 0 = Monday through 6 = Sunday.
pub type DaySet = Vec<u8, MAX_DAYS>;

/// Whether an alarm repeats on a weekday set or fires once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "kebab-case")]
pub enum AlarmKind {
    /// Fires on every configured weekday, at most once per day.
    Recurring,
    /// Fires once, then disables itself.
    OneTime,
}

/// A stored alarm record.
///
/// Only ever constructed by the store from a validated draft, so a record
/// in the list is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// Store-unique id
    pub id: u32,
    /// Wall-clock firing time
    pub time: TimeOfDay,
    /// Recurring or one-time
    #[serde(rename = "type")]
    pub kind: AlarmKind,
    /// Weekdays the alarm fires on; populated only for recurring alarms
    #[serde(default)]
    pub days: DaySet,
    /// Brightness reached at the end of the ramp (0-100)
    pub max_brightness: u8,
    /// Ramp duration in minutes, at least 1
    pub ramp_duration: u16,
    /// Color temperature of the ramp (0-100)
    pub color_temp: u8,
    /// Whether the alarm participates in matching
    pub enabled: bool,
    /// The day the alarm last fired; keeps a recurring alarm from firing
    /// twice on one day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<Date>,
}

/// A new alarm as submitted through the control surface, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlarmDraft {
    /// Wall-clock firing time
    pub time: TimeOfDay,
    /// Recurring or one-time
    #[serde(rename = "type")]
    pub kind: AlarmKind,
    /// Weekdays the alarm fires on
    #[serde(default)]
    pub days: DaySet,
    /// Brightness reached at the end of the ramp (0-100)
    #[serde(default = "default_max_brightness")]
    pub max_brightness: u8,
    /// Ramp duration in minutes
    #[serde(default = "default_ramp_duration")]
    pub ramp_duration: u16,
    /// Color temperature of the ramp (0-100)
    #[serde(default = "default_color_temp")]
    pub color_temp: u8,
    /// Whether the alarm starts enabled
    pub enabled: bool,
}

/// Default ramp target brightness for drafts that omit it.
const fn default_max_brightness() -> u8 {
    80
}

/// Default ramp duration in minutes for drafts that omit it.
const fn default_ramp_duration() -> u16 {
    30
}

/// Default color temperature for drafts that omit it.
const fn default_color_temp() -> u8 {
    50
}

/// A partial alarm update. Absent fields keep their current value; changed
/// fields are re-validated against the merged record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AlarmPatch {
    /// New firing time
    #[serde(default)]
    pub time: Option<TimeOfDay>,
    /// New kind
    #[serde(default, rename = "type")]
    pub kind: Option<AlarmKind>,
    /// New weekday set
    #[serde(default)]
    pub days: Option<DaySet>,
    /// New ramp target brightness
    #[serde(default)]
    pub max_brightness: Option<u8>,
    /// New ramp duration in minutes
    #[serde(default)]
    pub ramp_duration: Option<u16>,
    /// New color temperature
    #[serde(default)]
    pub color_temp: Option<u8>,
    /// New enabled state
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// The reason a draft or patch was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InvalidAlarm {
    /// A recurring alarm with no weekdays.
    EmptyDays,
    /// A weekday index above 6.
    BadDay,
    /// Brightness above 100.
    BadBrightness,
    /// Color temperature above 100.
    BadColorTemp,
    /// Ramp duration of zero minutes.
    BadRampDuration,
}

impl core::fmt::Display for InvalidAlarm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::EmptyDays => write!(f, "recurring alarm needs at least one weekday"),
            Self::BadDay => write!(f, "weekday index out of range"),
            Self::BadBrightness => write!(f, "brightness out of range"),
            Self::BadColorTemp => write!(f, "color temperature out of range"),
            Self::BadRampDuration => write!(f, "ramp duration must be at least 1 minute"),
        }
    }
}

/// Errors returned by store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// The submitted alarm data is out of range.
    Invalid(InvalidAlarm),
    /// No alarm with the given id.
    NotFound,
    /// The store already holds the maximum number of alarms.
    Full,
}

impl From<InvalidAlarm> for StoreError {
    fn from(reason: InvalidAlarm) -> Self {
        Self::Invalid(reason)
    }
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Invalid(reason) => write!(f, "invalid alarm: {reason}"),
            Self::NotFound => write!(f, "alarm not found"),
            Self::Full => write!(f, "alarm store is full"),
        }
    }
}

/// Owns the alarm list, persisted through the storage backend on every
/// mutation.
pub struct AlarmStore<B: StorageBackend> {
    /// The storage capability
    backend: B,
    /// The alarm list, kept in ascending id order
    alarms: Vec<Alarm, MAX_ALARMS>,
    /// The next id to hand out
    next_id: u32,
}

impl<B: StorageBackend> AlarmStore<B> {
    /// Load the alarm list from storage.
    ///
    /// A never-written region starts the store empty; unreadable or corrupt
    /// data falls back to an empty store with a warning. Neither case is
    /// fatal to the scheduler.
    pub fn load(mut backend: B) -> Self {
        let mut buf = [0u8; ALARMS_DOC_CAPACITY];
        let mut alarms: Vec<Alarm, MAX_ALARMS> = match read_document(&mut backend, &mut buf) {
            Ok(Some(alarms)) => alarms,
            Ok(None) => {
                info!("no persisted alarms, starting empty");
                Vec::new()
            }
            Err(e) => {
                warn!("alarm storage unreadable, starting empty: {}", e);
                Vec::new()
            }
        };
        alarms.sort_unstable_by_key(|alarm| alarm.id);
        let next_id = alarms.iter().map(|alarm| alarm.id).max().map_or(0, |id| id + 1);
        info!("loaded {} alarms", alarms.len());
        Self {
            backend,
            alarms,
            next_id,
        }
    }

    /// All alarms in ascending id order.
    pub fn list(&self) -> &[Alarm] {
        &self.alarms
    }

    /// Look up one alarm by id.
    pub fn get(&self, id: u32) -> Result<&Alarm, StoreError> {
        self.alarms
            .iter()
            .find(|alarm| alarm.id == id)
            .ok_or(StoreError::NotFound)
    }

    /// Validate a draft, assign it an id, persist and return the id.
    pub fn create(&mut self, draft: AlarmDraft) -> Result<u32, StoreError> {
        validate(draft.kind, &draft.days, draft.max_brightness, draft.ramp_duration, draft.color_temp)?;
        if self.alarms.is_full() {
            return Err(StoreError::Full);
        }

        let id = self.next_id;
        self.next_id += 1;
        let alarm = Alarm {
            id,
            time: draft.time,
            kind: draft.kind,
            days: normalize_days(draft.kind, draft.days),
            max_brightness: draft.max_brightness,
            ramp_duration: draft.ramp_duration,
            color_temp: draft.color_temp,
            enabled: draft.enabled,
            last_triggered: None,
        };
        // Capacity was checked above.
        let _ = self.alarms.push(alarm);
        info!("alarm {} created", id);
        self.persist();
        Ok(id)
    }

    /// Merge a patch into an existing alarm, re-validate and persist.
    pub fn update(&mut self, id: u32, patch: &AlarmPatch) -> Result<(), StoreError> {
        let index = self
            .alarms
            .iter()
            .position(|alarm| alarm.id == id)
            .ok_or(StoreError::NotFound)?;

        let current = &self.alarms[index];
        let kind = patch.kind.unwrap_or(current.kind);
        let days = patch.days.clone().unwrap_or_else(|| current.days.clone());
        let max_brightness = patch.max_brightness.unwrap_or(current.max_brightness);
        let ramp_duration = patch.ramp_duration.unwrap_or(current.ramp_duration);
        let color_temp = patch.color_temp.unwrap_or(current.color_temp);
        validate(kind, &days, max_brightness, ramp_duration, color_temp)?;

        let alarm = &mut self.alarms[index];
        alarm.time = patch.time.unwrap_or(alarm.time);
        alarm.kind = kind;
        alarm.days = normalize_days(kind, days);
        alarm.max_brightness = max_brightness;
        alarm.ramp_duration = ramp_duration;
        alarm.color_temp = color_temp;
        alarm.enabled = patch.enabled.unwrap_or(alarm.enabled);
        info!("alarm {} updated", id);
        self.persist();
        Ok(())
    }

    /// Remove an alarm by id and persist.
    pub fn delete(&mut self, id: u32) -> Result<(), StoreError> {
        let index = self
            .alarms
            .iter()
            .position(|alarm| alarm.id == id)
            .ok_or(StoreError::NotFound)?;
        self.alarms.remove(index);
        info!("alarm {} deleted", id);
        self.persist();
        Ok(())
    }

    /// Ids of the alarms due at `reading`, in ascending id order.
    ///
    /// Returns empty for an unsynchronized reading: matching against an
    /// un-synced clock is never allowed.
    pub fn find_due(&self, reading: &ClockReading) -> Vec<u32, MAX_ALARMS> {
        let mut due = Vec::new();
        if !reading.synchronized {
            return due;
        }
        for alarm in &self.alarms {
            if alarm_matches(alarm, reading) {
                // The id list has the same capacity as the alarm list.
                let _ = due.push(alarm.id);
            }
        }
        due
    }

    /// Record that an alarm fired on `today` and persist before returning.
    ///
    /// A recurring alarm is blocked for the rest of the day; a one-time
    /// alarm is disabled for good.
    pub fn mark_triggered(&mut self, id: u32, today: Date) -> Result<(), StoreError> {
        let alarm = self
            .alarms
            .iter_mut()
            .find(|alarm| alarm.id == id)
            .ok_or(StoreError::NotFound)?;
        alarm.last_triggered = Some(today);
        if alarm.kind == AlarmKind::OneTime {
            alarm.enabled = false;
        }
        info!("alarm {} marked triggered", id);
        self.persist();
        Ok(())
    }

    /// Write the alarm list to storage. A failed write is logged and the
    /// in-memory list stays authoritative.
    fn persist(&mut self) {
        let mut buf = [0u8; ALARMS_DOC_CAPACITY];
        match serde_json_core::to_slice(&self.alarms, &mut buf) {
            Ok(len) => {
                if let Err(e) = self.backend.write(Region::Alarms, &buf[..len]) {
                    warn!("failed to persist alarms: {}", e);
                }
            }
            Err(_) => warn!("alarm document too large to encode"),
        }
    }
}

/// Whether one alarm matches a synchronized reading, minute-granular.
fn alarm_matches(alarm: &Alarm, reading: &ClockReading) -> bool {
    if !alarm.enabled {
        return false;
    }
    if alarm.time != reading.datetime.time_of_day() {
        return false;
    }
    match alarm.kind {
        AlarmKind::Recurring => {
            alarm.days.contains(&reading.datetime.weekday.index())
                && alarm.last_triggered != Some(reading.datetime.date())
        }
        // A one-time alarm matches on the clock time alone; firing disables it.
        AlarmKind::OneTime => true,
    }
}

/// Validate the range-checked alarm fields.
fn validate(
    kind: AlarmKind,
    days: &DaySet,
    max_brightness: u8,
    ramp_duration: u16,
    color_temp: u8,
) -> Result<(), InvalidAlarm> {
    if days.iter().any(|&day| day > 6) {
        return Err(InvalidAlarm::BadDay);
    }
    if kind == AlarmKind::Recurring && days.is_empty() {
        return Err(InvalidAlarm::EmptyDays);
    }
    if max_brightness > 100 {
        return Err(InvalidAlarm::BadBrightness);
    }
    if ramp_duration == 0 {
        return Err(InvalidAlarm::BadRampDuration);
    }
    if color_temp > 100 {
        return Err(InvalidAlarm::BadColorTemp);
    }
    Ok(())
}

/// A one-time alarm carries no weekday set.
fn normalize_days(kind: AlarmKind, days: DaySet) -> DaySet {
    match kind {
        AlarmKind::Recurring => days,
        AlarmKind::OneTime => Vec::new(),
    }
}

/// Read and decode the alarms document. `Ok(None)` means the region has
/// never been written.
fn read_document<B: StorageBackend>(
    backend: &mut B,
    buf: &mut [u8],
) -> Result<Option<Vec<Alarm, MAX_ALARMS>>, StorageError> {
    match backend.read(Region::Alarms, buf)? {
        None => Ok(None),
        Some(len) => {
            let (alarms, _) =
                serde_json_core::from_slice(&buf[..len]).map_err(|_| StorageError::Corrupt)?;
            Ok(Some(alarms))
        }
    }
}
