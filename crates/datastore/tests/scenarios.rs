//! End-to-end scenarios spanning catalog DDL, the object API, the
//! reference engine, value-linked connect, and index scans, exercised the
//! way a real caller would: open a session, run a transaction, commit,
//! and inspect what's visible afterward.

use graphdb_datastore::ddl::{self, FieldSpec};
use graphdb_datastore::key::{Holder, HolderKind};
use graphdb_datastore::object;
use graphdb_datastore::payload::encode_row;
use graphdb_datastore::reference;
use graphdb_datastore::scan::Predicate;
use graphdb_datastore::{begin_session, begin_txn, commit_txn, end_session, rollback_txn, Engine, EngineConfig, EngineError};
use graphdb_primitives::{Cardinality, ColPos, IndexKind};
use std::ops::Bound;
use std::sync::Arc;

fn fresh_session() -> Arc<Engine> {
    let _ = env_logger::builder().is_test(true).try_init();
    let _ = end_session();
    let engine = Engine::open(EngineConfig::default()).unwrap();
    begin_session(engine.clone()).unwrap();
    engine
}

fn tag_row(tag: &str) -> Vec<u8> {
    let schema = graphdb_datastore::payload::BinarySchema {
        fields: vec![graphdb_datastore::payload::FieldSlot {
            name: "tag".into(),
            kind: HolderKind::Str,
            optional: false,
            repeated_count: 1,
            position: ColPos(0),
            active: true,
        }],
    };
    encode_row(&schema, &[(ColPos(0), Holder::Str(Some(tag.to_string())))])
}

#[test]
fn duplicate_key_in_the_same_transaction_is_caught_only_at_commit() {
    let engine = fresh_session();
    let db = ddl::create_database(&engine, "db");
    let table = ddl::create_table(&engine, db, "widgets", &[FieldSpec::new("tag", HolderKind::Str)], false);
    let index = ddl::create_index(&engine, table, vec![ColPos(0)], IndexKind::Hash, true).unwrap();

    begin_txn().unwrap();
    object::create(table, tag_row("x")).unwrap();
    object::create(table, tag_row("x")).unwrap();
    let err = commit_txn().unwrap_err();
    assert!(matches!(err, EngineError::UniqueConstraintViolation(id) if id == index));
    assert!(!graphdb_datastore::is_txn_active().unwrap());
}

#[test]
fn duplicate_key_across_committed_transactions_is_rejected() {
    let engine = fresh_session();
    let db = ddl::create_database(&engine, "db");
    let table = ddl::create_table(&engine, db, "widgets", &[FieldSpec::new("tag", HolderKind::Str)], false);
    ddl::create_index(&engine, table, vec![ColPos(0)], IndexKind::Hash, true).unwrap();

    begin_txn().unwrap();
    object::create(table, tag_row("x")).unwrap();
    assert!(commit_txn().unwrap());

    begin_txn().unwrap();
    object::create(table, tag_row("x")).unwrap();
    assert!(commit_txn().is_err());
}

#[test]
fn deleting_a_parent_with_children_requires_force() {
    let engine = fresh_session();
    let db = ddl::create_database(&engine, "db");
    let parent_table = ddl::create_table(&engine, db, "parent", &[], false);
    let child_table = ddl::create_table(&engine, db, "child", &[], false);
    let rel = ddl::create_relationship(&engine, parent_table, child_table, Cardinality::Many, None).unwrap();

    begin_txn().unwrap();
    let parent = object::create(parent_table, Vec::new()).unwrap();
    let child = object::create(child_table, Vec::new()).unwrap();
    reference::insert_into_container(parent, child, rel).unwrap();
    assert!(commit_txn().unwrap());

    begin_txn().unwrap();
    let err = object::remove(parent, false).unwrap_err();
    assert!(matches!(err, EngineError::ObjectStillReferenced(id) if id == parent));
    rollback_txn().unwrap();

    begin_txn().unwrap();
    object::remove(parent, true).unwrap();
    assert!(commit_txn().unwrap());

    begin_txn().unwrap();
    assert!(object::get(parent).unwrap().is_none());
    assert!(object::get(child).unwrap().is_some(), "force-deleting the parent detaches children, it does not delete them");
    rollback_txn().unwrap();
}

#[test]
fn range_scan_respects_bounds_and_hash_indexes_reject_it() {
    let engine = fresh_session();
    let db = ddl::create_database(&engine, "db");
    let table = ddl::create_table(&engine, db, "events", &[FieldSpec::new("seq", HolderKind::I32)], false);
    let range_index = ddl::create_index(&engine, table, vec![ColPos(0)], IndexKind::Range, false).unwrap();
    let hash_index = ddl::create_index(&engine, table, vec![ColPos(0)], IndexKind::Hash, false).unwrap();

    let schema = graphdb_datastore::payload::BinarySchema {
        fields: vec![graphdb_datastore::payload::FieldSlot {
            name: "seq".into(),
            kind: HolderKind::I32,
            optional: false,
            repeated_count: 1,
            position: ColPos(0),
            active: true,
        }],
    };

    begin_txn().unwrap();
    for n in 1..=10i32 {
        let row = encode_row(&schema, &[(ColPos(0), Holder::I32(Some(n)))]);
        object::create(table, row).unwrap();
    }
    assert!(commit_txn().unwrap());

    begin_txn().unwrap();
    let predicate = Predicate::Range {
        lower: Bound::Included(graphdb_datastore::key::Key::single(Holder::I32(Some(3)))),
        upper: Bound::Excluded(graphdb_datastore::key::Key::single(Holder::I32(Some(7)))),
    };
    let rows = object::query_index(range_index, predicate.clone(), None).unwrap();
    assert_eq!(rows.len(), 4);

    let err = object::query_index(hash_index, predicate, None).unwrap_err();
    assert!(matches!(err, EngineError::IndexOperationNotSupported));
    rollback_txn().unwrap();
}

#[test]
fn value_linked_relationship_auto_connects_on_create_and_reconnects_on_update() {
    let engine = fresh_session();
    let db = ddl::create_database(&engine, "db");
    let parent_table = ddl::create_table(&engine, db, "team", &[FieldSpec::new("name", HolderKind::Str)], false);
    let child_table = ddl::create_table(&engine, db, "player", &[FieldSpec::new("team_name", HolderKind::Str)], false);
    ddl::create_index(&engine, parent_table, vec![ColPos(0)], IndexKind::Hash, true).unwrap();
    ddl::create_index(&engine, child_table, vec![ColPos(0)], IndexKind::Hash, false).unwrap();
    let rel = ddl::create_relationship(&engine, parent_table, child_table, Cardinality::Many, Some((ColPos(0), ColPos(0)))).unwrap();

    let team_schema = graphdb_datastore::payload::BinarySchema {
        fields: vec![graphdb_datastore::payload::FieldSlot {
            name: "name".into(),
            kind: HolderKind::Str,
            optional: false,
            repeated_count: 1,
            position: ColPos(0),
            active: true,
        }],
    };

    begin_txn().unwrap();
    let team = object::create(parent_table, encode_row(&team_schema, &[(ColPos(0), Holder::Str(Some("red".into())))])).unwrap();
    let player = object::create(child_table, encode_row(&team_schema, &[(ColPos(0), Holder::Str(Some("red".into())))])).unwrap();
    assert!(commit_txn().unwrap());

    begin_txn().unwrap();
    let children = reference::children(team, rel).unwrap();
    assert_eq!(children, vec![player]);
    rollback_txn().unwrap();

    begin_txn().unwrap();
    object::update_payload(player, encode_row(&team_schema, &[(ColPos(0), Holder::Str(Some("blue".into())))])).unwrap();
    assert!(commit_txn().unwrap());

    begin_txn().unwrap();
    assert!(reference::children(team, rel).unwrap().is_empty(), "player moved teams and should no longer be red's child");
    rollback_txn().unwrap();
}

#[test]
fn a_transaction_that_races_a_concurrent_commit_is_told_to_retry() {
    let engine = fresh_session();
    let db = ddl::create_database(&engine, "db");
    let table = ddl::create_table(&engine, db, "counter", &[FieldSpec::new("n", HolderKind::I32)], false);
    let schema = graphdb_datastore::payload::BinarySchema {
        fields: vec![graphdb_datastore::payload::FieldSlot {
            name: "n".into(),
            kind: HolderKind::I32,
            optional: false,
            repeated_count: 1,
            position: ColPos(0),
            active: true,
        }],
    };

    begin_txn().unwrap();
    let obj = object::create(table, encode_row(&schema, &[(ColPos(0), Holder::I32(Some(0)))])).unwrap();
    assert!(commit_txn().unwrap());
    end_session().unwrap();

    // The session manager is thread-local, so each side of the race needs
    // its own OS thread to hold its own transaction snapshot concurrently.
    let barrier = Arc::new(std::sync::Barrier::new(2));

    let winner = {
        let engine = engine.clone();
        let schema = schema.clone();
        let barrier = barrier.clone();
        std::thread::spawn(move || {
            begin_session(engine).unwrap();
            begin_txn().unwrap();
            object::update_payload(obj, encode_row(&schema, &[(ColPos(0), Holder::I32(Some(1)))])).unwrap();
            barrier.wait();
            let committed = commit_txn().unwrap();
            end_session().unwrap();
            committed
        })
    };
    let loser = {
        let engine = engine.clone();
        std::thread::spawn(move || {
            begin_session(engine).unwrap();
            begin_txn().unwrap();
            object::update_payload(obj, encode_row(&schema, &[(ColPos(0), Holder::I32(Some(2)))])).unwrap();
            barrier.wait();
            // Give the other thread a head start at the commit lock so
            // this one observes a locator the other already repointed.
            std::thread::sleep(std::time::Duration::from_millis(20));
            let result = commit_txn();
            end_session().unwrap();
            result
        })
    };

    assert!(winner.join().unwrap());
    let result = loser.join().unwrap();
    let err = result.unwrap_err();
    assert!(matches!(err, EngineError::TxUpdateConflict));
    assert!(err.is_retryable());
}
