//! Boundary error type. Internal analysis paths never throw — they return
//! neutral/zeroed values and saturating fallbacks per spec §7 — so this
//! enum only covers operations that have a genuine binary success/failure
//! shape at the API edge (device-table mutation, persisted-format decode).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("device table is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("no device with id {0}")]
    UnknownDevice(u16),

    #[error("persisted fingerprint buffer too short: need {need}, got {got}")]
    TruncatedRecord { need: usize, got: usize },

    #[error("device name exceeds {max} bytes")]
    NameTooLong { max: usize },
}

pub type CoreResult<T> = Result<T, CoreError>;
