//! Ledger error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid version {version} for {canonical_id}: versions start at 1")]
    InvalidVersion { canonical_id: String, version: u32 },

    #[error("Ledger file is corrupt: {0}")]
    Corrupt(String),
}

impl From<DbError> for biodigest_common::DigestError {
    fn from(err: DbError) -> Self {
        biodigest_common::DigestError::Ledger(err.to_string())
    }
}
