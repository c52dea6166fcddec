//! Transactional in-memory object storage engine.
//!
//! Modules map directly onto the storage engine's components: typed
//! payload access ([`key`], [`payload`]) and catalog metadata
//! ([`catalog`], declared via [`ddl`]) underpin a versioned record arena
//! ([`record`]) addressed
//! through a locator indirection ([`locator`]) and an append-only
//! transaction log ([`txlog`]). [`index`] and [`scan`] give tables hash
//! and range indexes with snapshot-aware visibility. [`reference`] and
//! [`vlr`] implement the two kinds of object relationship (explicit
//! containers and value-linked auto-connect); [`object`] is the payload
//! CRUD surface both sit underneath. [`session`] ties a thread to an
//! [`engine::Engine`] and its active transaction — the single seam every
//! other module reaches the engine through.

pub mod catalog;
pub mod config;
pub mod ddl;
pub mod engine;
pub mod error;
pub mod index;
pub mod key;
pub mod locator;
pub mod object;
pub mod payload;
pub mod persistence;
pub mod record;
pub mod reference;
pub mod scan;
pub mod session;
pub mod txlog;
pub mod vlr;

pub use config::EngineConfig;
pub use ddl::FieldSpec;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use key::{Holder, HolderKind, Key};
pub use session::{begin_session, begin_txn, commit_txn, end_session, is_txn_active, rollback_txn, set_tx_begin_hook, set_tx_commit_hook, set_tx_rollback_hook};
