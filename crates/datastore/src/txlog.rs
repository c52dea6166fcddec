//! Transaction log (component F).
//!
//! An append-only, capped, per-session ordered list of log records. The
//! log is private until commit, at which point it is sealed (made
//! read-only) before being handed to index maintenance (component K) and
//! to the optional persistence sink (see [`crate::persistence`]).

use crate::error::{EngineError, Result};
use graphdb_primitives::{Locator, Offset, TxId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Create,
    Update,
    Remove,
    /// A same-value copy, used by reference rewrites (e.g. anchor splices)
    /// that need an index-maintenance entry without representing a
    /// logical insert/update of user-visible data.
    Clone,
}

#[derive(Clone, Debug)]
pub struct LogRecord {
    pub locator: Locator,
    pub old_offset: Offset,
    pub new_offset: Offset,
    pub op: Op,
    pub txn_id: TxId,
}

pub struct TxLog {
    records: Vec<LogRecord>,
    sealed: bool,
    max_records: u32,
}

impl TxLog {
    pub fn new(max_records: u32) -> Self {
        TxLog {
            records: Vec::new(),
            sealed: false,
            max_records,
        }
    }

    pub fn append(&mut self, record: LogRecord) -> Result<()> {
        assert!(!self.sealed, "cannot append to a sealed transaction log");
        if self.records.len() as u32 >= self.max_records {
            return Err(EngineError::LogFull);
        }
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Seals the log, making it read-only. Required before handing it to
    /// index maintenance or a persistence sink.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(op: Op) -> LogRecord {
        LogRecord {
            locator: Locator(1),
            old_offset: Offset::NONE,
            new_offset: Offset(1),
            op,
            txn_id: TxId(1),
        }
    }

    #[test]
    fn capacity_is_enforced() {
        let mut log = TxLog::new(1);
        log.append(rec(Op::Create)).unwrap();
        assert!(matches!(log.append(rec(Op::Create)), Err(EngineError::LogFull)));
    }

    #[test]
    #[should_panic(expected = "sealed")]
    fn appending_after_seal_panics() {
        let mut log = TxLog::new(10);
        log.seal();
        let _ = log.append(rec(Op::Create));
    }
}
