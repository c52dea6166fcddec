//! Facade error type: every fallible call here either bubbles up an
//! underlying engine error unchanged, or reports a decode failure specific
//! to the typed layer (a row whose stored payload no longer matches what
//! [`crate::entity::Entity::from_payload`] expects).

use graphdb_datastore::EngineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FacadeError>;

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("object {0} does not exist or is not visible to this transaction")]
    NotFound(graphdb_primitives::ObjectId),

    #[error("failed to decode a typed row: {0}")]
    Decode(String),
}
