//! Single-retry wrapper for transient storage failures.

use crate::error::{ClinicError, ClinicResult};

/// Run `attempt`, and run it once more if it fails with
/// [`ClinicError::StorageUnavailable`].
///
/// Every attempt opens its own transaction, so a failed first attempt has
/// already rolled back when the second one starts. Events are emitted by the
/// caller after commit, which keeps a retried operation from emitting twice.
/// Lock contention ([`ClinicError::ConcurrentModification`]) is not retried;
/// the busy timeout has already waited for the other writer.
///
/// # Errors
///
/// Returns the first non-storage error, or the second storage error.
pub fn with_storage_retry<T>(
    op: &str,
    mut attempt: impl FnMut() -> ClinicResult<T>,
) -> ClinicResult<T> {
    match attempt() {
        Err(ClinicError::StorageUnavailable { detail }) => {
            tracing::warn!(op, %detail, "storage unavailable, retrying once");
            attempt()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::with_storage_retry;
    use crate::error::{ClinicError, ErrorCode};

    fn unavailable() -> ClinicError {
        ClinicError::StorageUnavailable {
            detail: "disk I/O error".into(),
        }
    }

    #[test]
    fn transient_failure_is_retried_once() {
        let mut calls = 0;
        let result = with_storage_retry("test", || {
            calls += 1;
            if calls == 1 { Err(unavailable()) } else { Ok(7) }
        });
        assert_eq!(result, Ok(7));
        assert_eq!(calls, 2);
    }

    #[test]
    fn second_failure_is_surfaced() {
        let mut calls = 0;
        let result: Result<(), _> = with_storage_retry("test", || {
            calls += 1;
            Err(unavailable())
        });
        assert_eq!(result.unwrap_err().code(), ErrorCode::StorageUnavailable);
        assert_eq!(calls, 2);
    }

    #[test]
    fn domain_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = with_storage_retry("test", || {
            calls += 1;
            Err(ClinicError::ConcurrentModification {
                entity: "store".into(),
                detail: "locked".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
