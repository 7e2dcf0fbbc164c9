//! Classification of raw SQLite errors
//!
//! [`classify`] is the only place that inspects SQLite result codes;
//! everything above the repository layer matches on [`RepoError`].

use rusqlite::ErrorCode;
use thiserror::Error;

pub type RepoResult<T> = std::result::Result<T, RepoError>;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("foreign key violation: {0}")]
    ForeignKey(String),

    #[error("statement interrupted")]
    Cancelled,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database error: {0}")]
    Unclassified(rusqlite::Error),
}

impl RepoError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        RepoError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::NotFound { .. })
    }

    /// Whether this is a unique violation mentioning `column`
    pub fn is_duplicate_of(&self, column: &str) -> bool {
        matches!(self, RepoError::DuplicateKey(detail) if detail.contains(column))
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(err: rusqlite::Error) -> Self {
        classify(err)
    }
}

/// Maps a raw SQLite error onto the repository taxonomy
pub fn classify(err: rusqlite::Error) -> RepoError {
    match &err {
        rusqlite::Error::QueryReturnedNoRows => RepoError::not_found("row", "query returned no rows"),
        rusqlite::Error::SqliteFailure(code, message) => {
            let detail = message.clone().unwrap_or_else(|| code.to_string());
            match code.code {
                ErrorCode::ConstraintViolation => match code.extended_code {
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => RepoError::DuplicateKey(detail),
                    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => RepoError::ForeignKey(detail),
                    _ => RepoError::Unclassified(err),
                },
                ErrorCode::OperationInterrupted => RepoError::Cancelled,
                _ => RepoError::Unclassified(err),
            }
        }
        _ => RepoError::Unclassified(err),
    }
}
