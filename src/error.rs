use thiserror::Error;

#[derive(Error, Debug)]
pub enum FreightError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Unknown month: {0}")]
    UnknownMonth(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl FreightError {
    /// Map SQLite's read-only and authorization failures onto `PermissionDenied`
    /// so callers can tell them apart from connectivity problems.
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match err.sqlite_error_code() {
            Some(ErrorCode::ReadOnly)
            | Some(ErrorCode::PermissionDenied)
            | Some(ErrorCode::AuthorizationForStatementDenied) => {
                FreightError::PermissionDenied(err.to_string())
            }
            _ => FreightError::Db(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, FreightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readonly_maps_to_permission_denied() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY),
            None,
        );
        assert!(matches!(FreightError::from_sqlite(err), FreightError::PermissionDenied(_)));
    }

    #[test]
    fn test_other_sqlite_errors_stay_db() {
        let err = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(FreightError::from_sqlite(err), FreightError::Db(_)));
    }
}
