use thiserror::Error;

/// Errors that can occur when interacting with the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The unique email constraint rejected a customer write.
    ///
    /// The advisory pre-check in the validation layer can race with a
    /// concurrent insert; the store constraint is the authoritative guard
    /// and surfaces here.
    #[error("Email already exists: {email}")]
    DuplicateEmail { email: String },

    /// A write referenced a row that does not exist.
    #[error("Missing {entity} row: {id}")]
    MissingRow { entity: &'static str, id: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for entity store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
