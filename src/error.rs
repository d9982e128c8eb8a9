use thiserror::Error;

/// Errors raised by a single call against the LMS.
#[derive(Debug, Error)]
pub enum LmsError {
    #[error("LMS session expired, re-authentication required")]
    AuthExpired,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("LMS API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl LmsError {
    /// Fatal errors cancel a whole batch instead of dropping one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LmsError::AuthExpired)
    }

    pub(crate) fn is_retryable_status(status: u16) -> bool {
        matches!(status, 500 | 502 | 503 | 504)
    }
}

/// Errors surfaced by batch fetches and department loads.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("LMS session expired, re-authentication required")]
    AuthExpired,

    #[error("batch cancelled before completion")]
    Cancelled,

    #[error("department {department_id} could not be loaded: {source}")]
    DepartmentUnavailable {
        department_id: String,
        #[source]
        source: LmsError,
    },
}

impl SyncError {
    pub fn department(department_id: &str, source: LmsError) -> Self {
        if source.is_fatal() {
            SyncError::AuthExpired
        } else {
            SyncError::DepartmentUnavailable {
                department_id: department_id.to_string(),
                source,
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_expiry_is_fatal() {
        assert!(LmsError::AuthExpired.is_fatal());
        assert!(!LmsError::NotFound("u1".to_string()).is_fatal());
        assert!(!LmsError::Network("reset".to_string()).is_fatal());
        assert!(!LmsError::Api { status: 503, body: String::new() }.is_fatal());
    }

    #[test]
    fn retries_only_server_errors() {
        for status in [500, 502, 503, 504] {
            assert!(LmsError::is_retryable_status(status));
        }
        for status in [400, 401, 403, 404, 429, 501] {
            assert!(!LmsError::is_retryable_status(status));
        }
    }

    #[test]
    fn department_error_keeps_auth_expiry_distinct() {
        let err = SyncError::department("d1", LmsError::AuthExpired);
        assert!(matches!(err, SyncError::AuthExpired));

        let err = SyncError::department("d1", LmsError::Network("timeout".to_string()));
        match err {
            SyncError::DepartmentUnavailable { department_id, .. } => {
                assert_eq!(department_id, "d1")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
