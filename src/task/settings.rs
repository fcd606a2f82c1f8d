//! # Settings store
//! This module contains the persisted global settings: the UTC offset, the
//! default light brightness and the time-sync retry parameters.
//!
//! The settings document is read once at startup; a missing region is
//! seeded with defaults so the first boot already persists a valid
//! document, and a corrupt region falls back to defaults with a warning.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use heapless::String;
use serde::{Deserialize, Serialize};

use crate::utility::persist::{Region, SETTINGS_DOC_CAPACITY, StorageBackend, StorageError};

/// Capacity of the NTP server host name.
pub const NTP_SERVER_CAPACITY: usize = 64;

/// The settings store protected by a mutex, shared between the request
/// gateway and the sync task.
pub type SharedSettingsStore<B> = Mutex<CriticalSectionRawMutex, SettingsStore<B>>;

/// Validation errors for a settings update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsError {
    /// Timezone offset outside -12..=14 hours.
    BadTimezone,
    /// Brightness above 100.
    BadBrightness,
    /// Empty NTP server name.
    EmptyNtpServer,
    /// Zero sync retries.
    BadRetries,
    /// Zero seconds between sync retries.
    BadRetryInterval,
}

impl core::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadTimezone => write!(f, "timezone offset out of range"),
            Self::BadBrightness => write!(f, "brightness out of range"),
            Self::EmptyNtpServer => write!(f, "NTP server name is empty"),
            Self::BadRetries => write!(f, "sync retry count must be at least 1"),
            Self::BadRetryInterval => write!(f, "sync retry interval must be at least 1 second"),
        }
    }
}

/// The persisted global settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Local offset east of UTC in whole hours
    pub timezone: i8,
    /// Default light brightness (0-100)
    pub brightness: u8,
    /// NTP server host name
    #[serde(default = "default_ntp_server")]
    pub ntp_server: String<NTP_SERVER_CAPACITY>,
    /// Attempts per synchronization round
    #[serde(default = "default_sync_retries")]
    pub sync_retries: u8,
    /// Seconds between attempts within a round
    #[serde(default = "default_sync_retry_secs")]
    pub sync_retry_secs: u16,
}

/// Default NTP server host name.
fn default_ntp_server() -> String<NTP_SERVER_CAPACITY> {
    String::try_from("pool.ntp.org").unwrap_or_default()
}

/// Default attempts per synchronization round.
const fn default_sync_retries() -> u8 {
    3
}

/// Default seconds between sync attempts.
const fn default_sync_retry_secs() -> u16 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timezone: 1,
            brightness: 80,
            ntp_server: default_ntp_server(),
            sync_retries: default_sync_retries(),
            sync_retry_secs: default_sync_retry_secs(),
        }
    }
}

impl Settings {
    /// Validate every field against its documented range.
    fn validate(&self) -> Result<(), SettingsError> {
        if !(-12..=14).contains(&self.timezone) {
            return Err(SettingsError::BadTimezone);
        }
        if self.brightness > 100 {
            return Err(SettingsError::BadBrightness);
        }
        if self.ntp_server.is_empty() {
            return Err(SettingsError::EmptyNtpServer);
        }
        if self.sync_retries == 0 {
            return Err(SettingsError::BadRetries);
        }
        if self.sync_retry_secs == 0 {
            return Err(SettingsError::BadRetryInterval);
        }
        Ok(())
    }
}

/// A partial settings update from the control surface. Absent fields keep
/// their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SettingsPatch {
    /// New timezone offset
    #[serde(default)]
    pub timezone: Option<i8>,
    /// New default brightness
    #[serde(default)]
    pub brightness: Option<u8>,
    /// New NTP server host name
    #[serde(default)]
    pub ntp_server: Option<String<NTP_SERVER_CAPACITY>>,
    /// New retry count
    #[serde(default)]
    pub sync_retries: Option<u8>,
    /// New retry interval in seconds
    #[serde(default)]
    pub sync_retry_secs: Option<u16>,
}

/// Owns the validated settings record, persisted through the storage
/// backend on every change.
pub struct SettingsStore<B: StorageBackend> {
    /// The storage capability
    backend: B,
    /// The current settings
    settings: Settings,
}

impl<B: StorageBackend> SettingsStore<B> {
    /// Load settings from storage.
    ///
    /// A never-written region is seeded with defaults; a corrupt one falls
    /// back to defaults with a warning. Neither case is fatal.
    pub fn load(mut backend: B) -> Self {
        let mut buf = [0u8; SETTINGS_DOC_CAPACITY];
        let settings = match read_document(&mut backend, &mut buf) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                info!("no persisted settings, seeding defaults");
                Settings::default()
            }
            Err(e) => {
                warn!("settings storage unreadable, using defaults: {}", e);
                Settings::default()
            }
        };
        let mut store = Self { backend, settings };
        if store.settings.validate().is_err() {
            warn!("persisted settings out of range, using defaults");
            store.settings = Settings::default();
        }
        store.persist();
        store
    }

    /// The current settings.
    pub const fn get(&self) -> &Settings {
        &self.settings
    }

    /// Apply a partial update, re-validating the merged record, and persist
    /// it before returning.
    pub fn update(&mut self, patch: &SettingsPatch) -> Result<(), SettingsError> {
        let mut merged = self.settings.clone();
        if let Some(timezone) = patch.timezone {
            merged.timezone = timezone;
        }
        if let Some(brightness) = patch.brightness {
            merged.brightness = brightness;
        }
        if let Some(ref ntp_server) = patch.ntp_server {
            merged.ntp_server = ntp_server.clone();
        }
        if let Some(sync_retries) = patch.sync_retries {
            merged.sync_retries = sync_retries;
        }
        if let Some(sync_retry_secs) = patch.sync_retry_secs {
            merged.sync_retry_secs = sync_retry_secs;
        }
        merged.validate()?;

        self.settings = merged;
        info!("settings updated");
        self.persist();
        Ok(())
    }

    /// Write the current settings to storage. A failed write is logged and
    /// the in-memory record stays authoritative.
    fn persist(&mut self) {
        let mut buf = [0u8; SETTINGS_DOC_CAPACITY];
        match serde_json_core::to_slice(&self.settings, &mut buf) {
            Ok(len) => {
                if let Err(e) = self.backend.write(Region::Settings, &buf[..len]) {
                    warn!("failed to persist settings: {}", e);
                }
            }
            Err(_) => warn!("settings document too large to encode"),
        }
    }
}

/// Read and decode the settings document. `Ok(None)` means the region has
/// never been written.
fn read_document<B: StorageBackend>(
    backend: &mut B,
    buf: &mut [u8],
) -> Result<Option<Settings>, StorageError> {
    match backend.read(Region::Settings, buf)? {
        None => Ok(None),
        Some(len) => {
            let (settings, _) =
                serde_json_core::from_slice(&buf[..len]).map_err(|_| StorageError::Corrupt)?;
            Ok(Some(settings))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::persist::MemoryStore;

    #[test]
    fn first_boot_seeds_defaults() {
        let store = SettingsStore::load(MemoryStore::new());
        let settings = store.get();
        assert_eq!(settings.timezone, 1);
        assert_eq!(settings.brightness, 80);
        assert_eq!(settings.ntp_server.as_str(), "pool.ntp.org");
        assert_eq!(settings.sync_retries, 3);
        assert_eq!(settings.sync_retry_secs, 5);
    }

    #[test]
    fn corrupt_document_falls_back_to_defaults() {
        let mut backend = MemoryStore::new();
        backend.preload(Region::Settings, b"{\"timezone\": ").unwrap();

        let store = SettingsStore::load(backend);
        assert_eq!(*store.get(), Settings::default());
    }

    #[test]
    fn update_merges_and_persists() {
        let mut store = SettingsStore::load(MemoryStore::new());
        let patch = SettingsPatch {
            timezone: Some(-5),
            brightness: Some(25),
            ..SettingsPatch::default()
        };
        store.update(&patch).unwrap();
        assert_eq!(store.get().timezone, -5);
        assert_eq!(store.get().brightness, 25);
        // Untouched fields keep their values.
        assert_eq!(store.get().sync_retries, 3);

        // Reload from the same backend: the update survived.
        let SettingsStore { backend, .. } = store;
        let reloaded = SettingsStore::load(backend);
        assert_eq!(reloaded.get().timezone, -5);
        assert_eq!(reloaded.get().brightness, 25);
    }

    #[test]
    fn invalid_patch_is_rejected_unapplied() {
        let mut store = SettingsStore::load(MemoryStore::new());

        let patch = SettingsPatch {
            timezone: Some(20),
            ..SettingsPatch::default()
        };
        assert_eq!(store.update(&patch), Err(SettingsError::BadTimezone));
        assert_eq!(store.get().timezone, 1);

        let patch = SettingsPatch {
            brightness: Some(150),
            ..SettingsPatch::default()
        };
        assert_eq!(store.update(&patch), Err(SettingsError::BadBrightness));

        let patch = SettingsPatch {
            sync_retries: Some(0),
            ..SettingsPatch::default()
        };
        assert_eq!(store.update(&patch), Err(SettingsError::BadRetries));
    }

    #[test]
    fn settings_json_uses_contract_field_names() {
        let mut buf = [0u8; SETTINGS_DOC_CAPACITY];
        let len = serde_json_core::to_slice(&Settings::default(), &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(json.contains("\"timezone\":1"));
        assert!(json.contains("\"brightness\":80"));
        assert!(json.contains("\"ntp_server\":\"pool.ntp.org\""));
    }
}
