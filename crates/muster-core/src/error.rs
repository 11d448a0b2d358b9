//! Error types for Muster

use thiserror::Error;

/// Main error type for Muster operations
#[derive(Error, Debug)]
pub enum MusterError {
    /// Force was not found among the loaded forces
    #[error("Force not found: {0}")]
    ForceNotFound(String),

    /// Group was not found in the specified force
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    /// Unit was not found in the specified force
    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    /// Catalog lookup failed while converting a unit across game systems
    #[error("Could not convert \"{0}\": unit not found in catalog")]
    ConversionFailed(String),

    /// Error during storage operations (redb)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Remote persistence call failed
    #[error("Remote error: {0}")]
    Remote(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shareable link string could not be parsed
    #[error("Invalid link: {0}")]
    InvalidLink(String),

    /// Invalid operation for current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type alias using MusterError
pub type MusterResult<T> = Result<T, MusterError>;
