mod common;
use common::*;

use bson::{Bson, bson, doc};
use vellum_db::KeyEmission;
use vellum_query::{ErrorKind, OperationOptions};

fn checked_options() -> OperationOptions {
    OperationOptions {
        ignore_revs: false,
        ..OperationOptions::default()
    }
}

// ── insert ──────────────────────────────────────────────────────

#[test]
fn insert_returns_the_document_identity() {
    let db = db_with_collection();
    let mut txn = db.begin(false).unwrap();

    let result = txn
        .insert(
            COLLECTION,
            &Bson::Document(doc! { "_key": "a1", "name": "Acme" }),
            &OperationOptions::default(),
        )
        .unwrap();

    assert!(result.is_ok());
    let identity = match result.payload.unwrap() {
        Bson::Document(doc) => doc,
        other => panic!("expected identity object, got {other:?}"),
    };
    assert_eq!(identity.get_str("_id").unwrap(), "accounts/a1");
    assert_eq!(identity.get_str("_key").unwrap(), "a1");
    assert!(identity.get_str("_rev").is_ok());
}

#[test]
fn insert_generates_a_key_when_absent() {
    let db = db_with_collection();
    let mut txn = db.begin(false).unwrap();

    let result = txn
        .insert(
            COLLECTION,
            &Bson::Document(doc! { "name": "NoKey" }),
            &OperationOptions::default(),
        )
        .unwrap();
    assert!(result.is_ok());
    let identity = match result.payload.unwrap() {
        Bson::Document(doc) => doc,
        other => panic!("expected identity object, got {other:?}"),
    };
    assert!(!identity.get_str("_key").unwrap().is_empty());
}

#[test]
fn insert_with_non_string_key_reports_key_bad() {
    let db = db_with_collection();
    let mut txn = db.begin(false).unwrap();

    let result = txn
        .insert(
            COLLECTION,
            &Bson::Document(doc! { "_key": 7 }),
            &OperationOptions::default(),
        )
        .unwrap();
    assert_eq!(result.kind, ErrorKind::DocumentKeyBad);
}

#[test]
fn batch_insert_counts_errors_per_kind_and_continues() {
    let db = db_with_collection();
    let mut txn = db.begin(false).unwrap();

    let batch = bson!([
        { "_key": "a1" },
        { "_key": "a1" },          // duplicate
        { "_key": "a2" },
        { "_key": 42 },            // bad key
        { "_key": "a1" },          // duplicate again
    ]);
    let result = txn
        .insert(COLLECTION, &batch, &OperationOptions::default())
        .unwrap();

    // The batch itself succeeds; failures land in the counter map.
    assert!(result.is_ok());
    assert_eq!(
        result.error_counts.get(&ErrorKind::UniqueConstraintViolated.code()),
        Some(&2)
    );
    assert_eq!(
        result.error_counts.get(&ErrorKind::DocumentKeyBad.code()),
        Some(&1)
    );

    // Sum of counts equals elements minus successes.
    let failures: u64 = result.error_counts.values().sum();
    assert_eq!(failures, 5 - 2);

    // Failed elements keep their position as error placeholders.
    let Some(Bson::Array(payload)) = result.payload else {
        panic!("expected array payload");
    };
    assert_eq!(payload.len(), 5);
    let Bson::Document(second) = &payload[1] else {
        panic!("expected document");
    };
    assert_eq!(second.get_bool("error").unwrap(), true);
    assert_eq!(
        second.get_i32("errorNum").unwrap(),
        ErrorKind::UniqueConstraintViolated.code()
    );
}

// ── document ────────────────────────────────────────────────────

#[test]
fn document_reads_by_key_and_by_handle() {
    let db = db_with_collection();
    seed(&db, 3);

    let mut txn = db.begin(true).unwrap();
    for addr in [bson!("a1"), bson!("accounts/a1"), bson!({ "_key": "a1" })] {
        let result = txn
            .document(COLLECTION, &addr, &OperationOptions::default())
            .unwrap();
        assert!(result.is_ok(), "failed for {addr:?}");
        let Some(Bson::Document(doc)) = result.payload else {
            panic!("expected document payload");
        };
        assert_eq!(doc.get_str("_id").unwrap(), "accounts/a1");
        assert_eq!(doc.get_i32("x").unwrap(), 1);
    }
}

#[test]
fn document_missing_returns_not_found() {
    let db = db_with_collection();
    let mut txn = db.begin(true).unwrap();
    let result = txn
        .document(COLLECTION, &bson!("nope"), &OperationOptions::default())
        .unwrap();
    assert_eq!(result.kind, ErrorKind::DocumentNotFound);
}

// ── update / replace / revision checks ──────────────────────────

#[test]
fn update_with_stale_revision_reports_conflict_and_current_identity() {
    let db = db_with_collection();
    seed(&db, 1);

    // Look up the live revision.
    let current_rev = {
        let mut txn = db.begin(true).unwrap();
        let result = txn
            .document(COLLECTION, &bson!("a0"), &OperationOptions::default())
            .unwrap();
        let Some(Bson::Document(doc)) = result.payload else {
            panic!("expected document");
        };
        doc.get_str("_rev").unwrap().to_string()
    };

    let mut txn = db.begin(false).unwrap();
    let result = txn
        .update(
            COLLECTION,
            &Bson::Document(doc! { "_key": "a0", "_rev": "stale", "x": 99 }),
            &checked_options(),
        )
        .unwrap();

    assert_eq!(result.kind, ErrorKind::Conflict);
    let Some(Bson::Document(identity)) = result.payload else {
        panic!("conflict must record the current identity");
    };
    assert_eq!(identity.get_str("_id").unwrap(), "accounts/a0");
    assert_eq!(identity.get_str("_key").unwrap(), "a0");
    assert_eq!(identity.get_str("_rev").unwrap(), current_rev);
}

#[test]
fn silent_conflict_omits_the_identity() {
    let db = db_with_collection();
    seed(&db, 1);

    let mut txn = db.begin(false).unwrap();
    let result = txn
        .update(
            COLLECTION,
            &Bson::Document(doc! { "_key": "a0", "_rev": "stale", "x": 99 }),
            &OperationOptions {
                silent: true,
                ..checked_options()
            },
        )
        .unwrap();
    assert_eq!(result.kind, ErrorKind::Conflict);
    assert!(result.payload.is_none());
}

#[test]
fn update_merges_and_bumps_the_revision() {
    let db = db_with_collection();
    seed(&db, 1);

    let mut txn = db.begin(false).unwrap();
    let result = txn
        .update(
            COLLECTION,
            &Bson::Document(doc! { "_key": "a0", "extra": "yes" }),
            &OperationOptions {
                return_new: true,
                ..OperationOptions::default()
            },
        )
        .unwrap();
    assert!(result.is_ok());

    let Some(Bson::Document(identity)) = result.payload else {
        panic!("expected identity");
    };
    assert!(identity.get_str("_oldRev").is_ok());
    assert_ne!(
        identity.get_str("_rev").unwrap(),
        identity.get_str("_oldRev").unwrap()
    );
    let new_doc = identity.get_document("new").unwrap();
    // Merged: the original attribute survives alongside the patch.
    assert_eq!(new_doc.get_i32("x").unwrap(), 0);
    assert_eq!(new_doc.get_str("extra").unwrap(), "yes");
}

#[test]
fn replace_swaps_the_document_wholesale() {
    let db = db_with_collection();
    seed(&db, 1);

    let mut txn = db.begin(false).unwrap();
    let result = txn
        .replace(
            COLLECTION,
            &Bson::Document(doc! { "_key": "a0", "only": "this" }),
            &OperationOptions {
                return_new: true,
                return_old: true,
                ..OperationOptions::default()
            },
        )
        .unwrap();
    assert!(result.is_ok());

    let Some(Bson::Document(identity)) = result.payload else {
        panic!("expected identity");
    };
    let new_doc = identity.get_document("new").unwrap();
    assert!(new_doc.get("x").is_none());
    assert_eq!(new_doc.get_str("only").unwrap(), "this");
    let old_doc = identity.get_document("old").unwrap();
    assert_eq!(old_doc.get_i32("x").unwrap(), 0);
}

#[test]
fn batch_update_stops_at_the_first_failure() {
    let db = db_with_collection();
    seed(&db, 3);

    let mut txn = db.begin(false).unwrap();
    let batch = bson!([
        { "_key": "a0", "x": 100 },
        { "_key": "missing", "x": 100 },
        { "_key": "a2", "x": 100 },
    ]);
    let result = txn
        .update(COLLECTION, &batch, &OperationOptions::default())
        .unwrap();

    assert_eq!(result.kind, ErrorKind::DocumentNotFound);
    assert_eq!(
        result.error_counts.get(&ErrorKind::DocumentNotFound.code()),
        Some(&1)
    );
    // The element after the failure was never processed.
    let Some(Bson::Array(payload)) = result.payload else {
        panic!("expected array payload");
    };
    assert_eq!(payload.len(), 2);
    txn.commit().unwrap();

    let mut txn = db.begin(true).unwrap();
    let a2 = txn
        .document(COLLECTION, &bson!("a2"), &OperationOptions::default())
        .unwrap();
    let Some(Bson::Document(doc)) = a2.payload else {
        panic!("expected document");
    };
    assert_eq!(doc.get_i32("x").unwrap(), 2);
}

// ── remove ──────────────────────────────────────────────────────

#[test]
fn remove_returns_the_old_identity() {
    let db = db_with_collection();
    seed(&db, 2);

    let mut txn = db.begin(false).unwrap();
    let result = txn
        .remove(
            COLLECTION,
            &bson!("a0"),
            &OperationOptions {
                return_old: true,
                ..OperationOptions::default()
            },
        )
        .unwrap();
    assert!(result.is_ok());
    let Some(Bson::Document(identity)) = result.payload else {
        panic!("expected identity");
    };
    assert_eq!(identity.get_str("_key").unwrap(), "a0");
    assert!(identity.get_document("old").is_ok());

    let result = txn
        .document(COLLECTION, &bson!("a0"), &OperationOptions::default())
        .unwrap();
    assert_eq!(result.kind, ErrorKind::DocumentNotFound);
}

// ── truncate / all / allKeys / any / count ──────────────────────

#[test]
fn truncate_empties_the_collection() {
    let db = db_with_collection();
    seed(&db, 5);

    let mut txn = db.begin(false).unwrap();
    let result = txn
        .truncate(COLLECTION, &OperationOptions::default())
        .unwrap();
    assert!(result.is_ok());
    let count = txn.count(COLLECTION).unwrap();
    assert_eq!(count.payload, Some(Bson::Int64(0)));
}

#[test]
fn all_returns_documents_with_ids() {
    let db = db_with_collection();
    seed(&db, 4);

    let mut txn = db.begin(true).unwrap();
    let result = txn
        .all(COLLECTION, 0, u64::MAX, &OperationOptions::default())
        .unwrap();
    let Some(Bson::Array(docs)) = result.payload else {
        panic!("expected array");
    };
    assert_eq!(docs.len(), 4);
    let Bson::Document(first) = &docs[0] else {
        panic!("expected document");
    };
    assert_eq!(first.get_str("_id").unwrap(), "accounts/a0");
}

#[test]
fn all_honours_skip_and_limit() {
    let db = db_with_collection();
    seed(&db, 6);

    let mut txn = db.begin(true).unwrap();
    let result = txn
        .all(COLLECTION, 2, 3, &OperationOptions::default())
        .unwrap();
    let Some(Bson::Array(docs)) = result.payload else {
        panic!("expected array");
    };
    let keys: Vec<&str> = docs
        .iter()
        .map(|d| match d {
            Bson::Document(doc) => doc.get_str("_key").unwrap(),
            _ => panic!("expected document"),
        })
        .collect();
    assert_eq!(keys, vec!["a2", "a3", "a4"]);
}

#[test]
fn all_keys_emission_prefixes() {
    let db = db_with_collection();
    seed(&db, 2);

    let mut txn = db.begin(true).unwrap();
    let mut keys = |emission| {
        let result = txn
            .all_keys(COLLECTION, emission, &OperationOptions::default())
            .unwrap();
        match result.payload {
            Some(Bson::Array(keys)) => keys
                .into_iter()
                .map(|k| match k {
                    Bson::String(s) => s,
                    other => panic!("expected string, got {other:?}"),
                })
                .collect::<Vec<_>>(),
            other => panic!("expected array, got {other:?}"),
        }
    };

    assert_eq!(keys(KeyEmission::Key), vec!["a0", "a1"]);
    assert_eq!(keys(KeyEmission::Id), vec!["accounts/a0", "accounts/a1"]);
    assert_eq!(
        keys(KeyEmission::Path),
        vec![
            "/_db/_system/_api/document/accounts/a0",
            "/_db/_system/_api/document/accounts/a1",
        ]
    );
}

#[test]
fn any_returns_one_document_or_null() {
    let db = db_with_collection();

    let mut txn = db.begin(true).unwrap();
    let empty = txn.any(COLLECTION).unwrap();
    assert_eq!(empty.payload, Some(Bson::Null));
    drop(txn);

    seed(&db, 5);
    let mut txn = db.begin(true).unwrap();
    let result = txn.any(COLLECTION).unwrap();
    let Some(Bson::Document(doc)) = result.payload else {
        panic!("expected one document");
    };
    assert!(doc.get_str("_id").unwrap().starts_with("accounts/"));
}

#[test]
fn count_reflects_writes_in_the_same_transaction() {
    let db = db_with_collection();
    seed(&db, 3);

    let mut txn = db.begin(false).unwrap();
    assert_eq!(txn.count(COLLECTION).unwrap().payload, Some(Bson::Int64(3)));
    txn.insert(
        COLLECTION,
        &Bson::Document(doc! { "_key": "extra" }),
        &OperationOptions::default(),
    )
    .unwrap();
    assert_eq!(txn.count(COLLECTION).unwrap().payload, Some(Bson::Int64(4)));
}

#[test]
fn unknown_collection_is_a_hard_error() {
    let db = temp_db();
    let mut txn = db.begin(true).unwrap();
    let err = txn
        .document(COLLECTION, &bson!("a0"), &OperationOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CollectionNotFound);
}

#[test]
fn wait_for_sync_flag_is_reflected() {
    let db = db_with_collection();
    let mut txn = db.begin(false).unwrap();
    let result = txn
        .insert(
            COLLECTION,
            &Bson::Document(doc! { "_key": "a1" }),
            &OperationOptions {
                wait_for_sync: true,
                ..OperationOptions::default()
            },
        )
        .unwrap();
    assert!(result.wait_for_sync);
}
