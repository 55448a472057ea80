//! Error types for LaborSync.

use thiserror::Error;

/// Errors that can occur when parsing or decoding LaborSync data.
#[derive(Debug, Error)]
pub enum SyncError {
    /// JSON (de)serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Session code is not six base-36 characters
    #[error("invalid session code: {0:?}")]
    InvalidSessionCode(String),

    /// Device id does not follow the `device_<ms>_<suffix>` shape
    #[error("invalid device id: {0:?}")]
    InvalidDeviceId(String),

    /// Event id is empty or cannot be used as a store key
    #[error("invalid event id: {0:?}")]
    InvalidEventId(String),

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SyncError::InvalidSessionCode("ab".into());
        assert_eq!(err.to_string(), "invalid session code: \"ab\"");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncError>();
    }
}
