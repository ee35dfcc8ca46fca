//! Storage-layer error type and its mapping into the domain taxonomy.

use rusqlite::ErrorCode as SqliteCode;

use crate::error::ClinicError;

/// Failure reported by a [`super::store::Store`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Another writer holds the database lock past the busy timeout.
    #[error("database is locked by another writer: {detail}")]
    Busy { detail: String },

    /// The store could not complete the statement (I/O, corruption, closed
    /// connection, constraint raised by a trigger, ...).
    #[error("sqlite failure: {detail}")]
    Unavailable { detail: String },

    /// A stored value could not be mapped back into a domain type.
    #[error("unrecognized value in {column}: '{value}'")]
    Corrupt { column: &'static str, value: String },
}

impl StoreError {
    pub(crate) fn corrupt(column: &'static str, value: impl Into<String>) -> Self {
        Self::Corrupt {
            column,
            value: value.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(SqliteCode::DatabaseBusy | SqliteCode::DatabaseLocked) => Self::Busy {
                detail: err.to_string(),
            },
            _ => Self::Unavailable {
                detail: err.to_string(),
            },
        }
    }
}

impl From<StoreError> for ClinicError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Busy { detail } => Self::ConcurrentModification {
                entity: "store".to_string(),
                detail,
            },
            other => Self::StorageUnavailable {
                detail: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StoreError;
    use crate::error::{ClinicError, ErrorCode};
    use rusqlite::ffi;

    #[test]
    fn busy_maps_to_concurrent_modification() {
        let busy = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_BUSY), None);
        let store: StoreError = busy.into();
        assert!(matches!(store, StoreError::Busy { .. }));

        let clinic: ClinicError = store.into();
        assert_eq!(clinic.code(), ErrorCode::ConcurrentModification);
    }

    #[test]
    fn io_failure_maps_to_storage_unavailable() {
        let io = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_IOERR), None);
        let clinic: ClinicError = StoreError::from(io).into();
        assert_eq!(clinic.code(), ErrorCode::StorageUnavailable);

        let corrupt: ClinicError = StoreError::corrupt("cases.state", "archivado").into();
        assert_eq!(corrupt.code(), ErrorCode::StorageUnavailable);
    }
}
