use tellr_core::errors::CollaboratorError;
use thiserror::Error;

pub mod session;

pub use session::SqlSessionStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for CollaboratorError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => {
                Self::Unavailable { collaborator: "session_store", message: error.to_string() }
            }
            RepositoryError::Decode(message) => {
                Self::InvalidResponse { collaborator: "session_store", message }
            }
        }
    }
}
