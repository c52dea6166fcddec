//! Error taxonomy for the engine, per the behavioral categories in spec §7.
//!
//! Each variant here is a behavioral category, not a 1:1 mirror of some
//! internal Rust type; callers match on these to decide whether to retry
//! the transaction, abort it, or treat the error as a programmer mistake.

use graphdb_primitives::{ColPos, IndexId, ObjectId, RelationshipId, TableId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    // --- Session / transaction lifecycle -----------------------------
    #[error("a session is already open on this thread")]
    SessionExists,
    #[error("no session is active on this thread")]
    NoSessionActive,
    #[error("a transaction is already in progress on this session")]
    TxInProgress,
    #[error("no transaction is open on this session")]
    TxNotOpen,
    #[error("transaction conflicts with a concurrent commit and must be retried")]
    TxUpdateConflict,

    // --- Identity ------------------------------------------------------
    #[error("object id {0} does not name a live object")]
    InvalidObjectId(ObjectId),
    #[error("object id {0} is already in use")]
    DuplicateId(ObjectId),
    #[error("table id {0} is not a registered object type")]
    InvalidObjectType(TableId),

    // --- Schema ----------------------------------------------------------
    #[error("field position {1} is not valid for table {0}")]
    InvalidFieldPosition(TableId, ColPos),
    #[error("relationship {0} does not connect tables of the types given")]
    InvalidRelationshipType(RelationshipId),

    // --- Referential integrity -----------------------------------------
    #[error("object {0} still has children and was not deleted (use force)")]
    ObjectStillReferenced(ObjectId),
    #[error("object {0} is already a child in some chain for this relationship")]
    ChildAlreadyReferenced(ObjectId),
    #[error("relationship {0} has cardinality `one` and parent {1} already has a child")]
    SingleCardinalityViolation(RelationshipId, ObjectId),

    // --- Index -----------------------------------------------------------
    #[error("index {0} not found")]
    IndexNotFound(IndexId),
    #[error("unique constraint violation on index {0}")]
    UniqueConstraintViolation(IndexId),
    #[error("operation not supported by this index kind (e.g. range scan on a hash index)")]
    IndexOperationNotSupported,

    // --- Resource ----------------------------------------------------------
    #[error("out of memory allocating object storage")]
    OutOfMemory,
    #[error("locator table exhausted (max_locators reached)")]
    LocatorsExhausted,
    #[error("transaction log is full (max_log_records reached)")]
    LogFull,

    // --- Configuration (ambient, not in spec §7 but required to report
    // a bad EngineConfig somewhere) --------------------------------------
    #[error("invalid engine configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether the transaction that produced this error may simply be
    /// retried from scratch, per the policy in spec §7.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::TxUpdateConflict)
    }

    /// Lifecycle errors are programmer errors and are never recovered from
    /// within a transaction's own retry loop.
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            EngineError::SessionExists
                | EngineError::NoSessionActive
                | EngineError::TxInProgress
                | EngineError::TxNotOpen
        )
    }

    /// Resource errors are fatal to the current transaction but leave the
    /// process otherwise healthy.
    pub fn is_resource_error(&self) -> bool {
        matches!(
            self,
            EngineError::OutOfMemory | EngineError::LocatorsExhausted | EngineError::LogFull
        )
    }
}
