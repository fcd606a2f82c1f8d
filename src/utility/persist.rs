//! # Persistence capability
//! This module contains the storage seam the alarm and settings stores
//! persist through. Storage is modelled as two fixed regions of opaque
//! bytes, one JSON document per region; what transport backs them (a flash
//! range, a filesystem, plain memory) is the backend's concern.
//!
//! Reads and writes are synchronous: a store mutation is applied and
//! persisted in one non-preemptible step, before its cooperative task
//! yields again.

use heapless::Vec;

/// Size of the persisted alarms document buffer in bytes.
pub const ALARMS_DOC_CAPACITY: usize = 4096;

/// Size of the persisted settings document buffer in bytes.
pub const SETTINGS_DOC_CAPACITY: usize = 256;

/// The storage regions used by the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Region {
    /// The persisted alarm list.
    Alarms,
    /// The persisted global settings.
    Settings,
}

/// Errors surfaced by a storage backend or by document decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// The backend could not read the region.
    ReadFailed,
    /// The backend could not write the region.
    WriteFailed,
    /// The document does not fit the region buffer.
    TooLarge,
    /// The region holds bytes that do not decode as the expected document.
    Corrupt,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "storage read failed"),
            Self::WriteFailed => write!(f, "storage write failed"),
            Self::TooLarge => write!(f, "document too large for storage region"),
            Self::Corrupt => write!(f, "persisted document is corrupt"),
        }
    }
}

/// Byte-region storage used by [`AlarmStore`](crate::task::alarm_store::AlarmStore)
/// and [`SettingsStore`](crate::task::settings::SettingsStore).
pub trait StorageBackend {
    /// Read a region into `buf`.
    ///
    /// Returns the number of bytes read, or `None` when the region has
    /// never been written.
    fn read(&mut self, region: Region, buf: &mut [u8]) -> Result<Option<usize>, StorageError>;

    /// Replace a region with `data`.
    fn write(&mut self, region: Region, data: &[u8]) -> Result<(), StorageError>;
}

impl<T: StorageBackend + ?Sized> StorageBackend for &mut T {
    fn read(&mut self, region: Region, buf: &mut [u8]) -> Result<Option<usize>, StorageError> {
        (**self).read(region, buf)
    }

    fn write(&mut self, region: Region, data: &[u8]) -> Result<(), StorageError> {
        (**self).write(region, data)
    }
}

/// An in-memory backend.
///
/// Used by host tests and by hardware-absent operation; state lives for the
/// process lifetime and is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// The alarms region, `None` until first written.
    alarms: Option<Vec<u8, ALARMS_DOC_CAPACITY>>,
    /// The settings region, `None` until first written.
    settings: Option<Vec<u8, SETTINGS_DOC_CAPACITY>>,
}

impl MemoryStore {
    /// Create an empty store with both regions unwritten.
    pub const fn new() -> Self {
        Self {
            alarms: None,
            settings: None,
        }
    }

    /// Pre-load a region, as if a previous run had persisted `data`.
    pub fn preload(&mut self, region: Region, data: &[u8]) -> Result<(), StorageError> {
        self.write(region, data)
    }
}

impl StorageBackend for MemoryStore {
    fn read(&mut self, region: Region, buf: &mut [u8]) -> Result<Option<usize>, StorageError> {
        let stored: Option<&[u8]> = match region {
            Region::Alarms => self.alarms.as_deref(),
            Region::Settings => self.settings.as_deref(),
        };
        match stored {
            None => Ok(None),
            Some(data) => {
                if data.len() > buf.len() {
                    return Err(StorageError::TooLarge);
                }
                buf[..data.len()].copy_from_slice(data);
                Ok(Some(data.len()))
            }
        }
    }

    fn write(&mut self, region: Region, data: &[u8]) -> Result<(), StorageError> {
        match region {
            Region::Alarms => {
                self.alarms = Some(Vec::from_slice(data).map_err(|_| StorageError::TooLarge)?);
            }
            Region::Settings => {
                self.settings = Some(Vec::from_slice(data).map_err(|_| StorageError::TooLarge)?);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_region_reads_as_none() {
        let mut store = MemoryStore::new();
        let mut buf = [0u8; 16];
        assert_eq!(store.read(Region::Alarms, &mut buf), Ok(None));
        assert_eq!(store.read(Region::Settings, &mut buf), Ok(None));
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut store = MemoryStore::new();
        store.write(Region::Alarms, b"[1,2,3]").unwrap();

        let mut buf = [0u8; 16];
        let len = store.read(Region::Alarms, &mut buf).unwrap().unwrap();
        assert_eq!(&buf[..len], b"[1,2,3]");

        // The other region is untouched.
        assert_eq!(store.read(Region::Settings, &mut buf), Ok(None));
    }

    #[test]
    fn oversized_read_buffer_is_rejected() {
        let mut store = MemoryStore::new();
        store.write(Region::Settings, b"0123456789").unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(
            store.read(Region::Settings, &mut buf),
            Err(StorageError::TooLarge)
        );
    }
}
