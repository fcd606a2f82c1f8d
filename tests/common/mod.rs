//! Shared fixtures for the integration tests.
#![allow(dead_code)]

// Provides the critical-section implementation the shared-state primitives
// need on the host; the firmware provides it on the device.
use critical_section as _;

use embassy_time::Instant;
use wakelight::{AlarmDraft, AlarmKind, ClockReading, DateTime, DaySet, TimeOfDay, Weekday};

/// Monotonic instant at `ms` milliseconds.
pub fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

/// A synchronized reading in the week of 2025-08-04 (a Monday).
pub fn reading(weekday: Weekday, hour: u8, minute: u8) -> ClockReading {
    ClockReading {
        datetime: DateTime {
            year: 2025,
            month: 8,
            day: 4 + weekday.index(),
            weekday,
            hour,
            minute,
            second: 0,
        },
        synchronized: true,
    }
}

/// An enabled draft with the standard ramp parameters.
pub fn draft(hour: u8, minute: u8, kind: AlarmKind, days: &[u8]) -> AlarmDraft {
    AlarmDraft {
        time: TimeOfDay { hour, minute },
        kind,
        days: DaySet::from_slice(days).unwrap(),
        max_brightness: 80,
        ramp_duration: 30,
        color_temp: 50,
        enabled: true,
    }
}
