//! Error types for the relational store

use thiserror::Error;

/// Errors that can occur when using the store
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// PostgreSQL connection or query error
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// A JSONB column did not decode into its typed shape
    #[error("json column error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored enum string did not match any known variant
    #[error(transparent)]
    UnknownVariant(#[from] trapline_core::model::UnknownVariant),

    /// The requested row does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. `"image"`
        entity: &'static str,
        /// Identifier used in the lookup
        id: String,
    },

    /// Password hashing or verification failed
    #[error("password hash error: {0}")]
    PasswordHash(String),

    /// An invitation token was invalid, expired, or already used
    #[error("invitation token rejected: {0}")]
    InvalidInvitation(&'static str),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a typed not-found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
