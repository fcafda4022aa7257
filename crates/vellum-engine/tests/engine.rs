use std::sync::Arc;

use bson::doc;
use vellum_engine::{Engine, Index, IndexKind, IndexSearch, NameResolver, SortableValue};
use vellum_store::MemoryStore;

fn engine() -> Arc<Engine<MemoryStore>> {
    Arc::new(Engine::open(MemoryStore::new()).unwrap())
}

#[test]
fn create_and_resolve_collection() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();
    assert_eq!(engine.collection_id("accounts"), Some(coll.id));
    assert_eq!(engine.collection_name(coll.id).as_deref(), Some("accounts"));
    assert_eq!(engine.collection_name_or_id(999_999), "999999");
    assert!(engine.create_collection("accounts").is_err());
}

#[test]
fn every_collection_has_a_primary_index() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();
    let primary = coll.primary_index();
    assert_eq!(primary.kind, IndexKind::Primary);
    assert_eq!(primary.fields, vec!["_key".to_string()]);
    assert!(primary.unique);
}

#[test]
fn insert_read_replace_remove() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();

    let mut txn = engine.begin(false).unwrap();
    let (key, rev) = txn
        .insert_document(&coll, doc! { "_key": "a1", "name": "Acme" })
        .unwrap();
    assert_eq!(key, "a1");

    let stored = txn.read_document(&coll, "a1").unwrap().unwrap();
    assert_eq!(stored.rev, rev);
    assert_eq!(stored.doc.get_str("name").unwrap(), "Acme");
    assert_eq!(stored.doc.get_str("_rev").unwrap(), rev);

    let (new_rev, old) = txn
        .replace_document(&coll, "a1", doc! { "name": "Bolt" })
        .unwrap()
        .unwrap();
    assert_ne!(new_rev, rev);
    assert_eq!(old.rev, rev);

    let removed = txn.remove_document(&coll, "a1").unwrap().unwrap();
    assert_eq!(removed.doc.get_str("name").unwrap(), "Bolt");
    assert!(txn.read_document(&coll, "a1").unwrap().is_none());
    txn.commit().unwrap();
}

#[test]
fn duplicate_primary_key_is_rejected() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();

    let mut txn = engine.begin(false).unwrap();
    txn.insert_document(&coll, doc! { "_key": "a1" }).unwrap();
    let err = txn
        .insert_document(&coll, doc! { "_key": "a1" })
        .unwrap_err();
    assert!(err.to_string().contains("unique constraint"));
}

#[test]
fn missing_key_is_rejected() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();
    let mut txn = engine.begin(false).unwrap();
    assert!(txn.insert_document(&coll, doc! { "name": "x" }).is_err());
    assert!(txn.insert_document(&coll, doc! { "_key": 42 }).is_err());
}

#[test]
fn secondary_index_is_maintained_across_writes() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();
    let index = engine
        .ensure_index(&coll, IndexKind::Hash, vec!["city".into()], false, false)
        .unwrap();

    let mut txn = engine.begin(false).unwrap();
    txn.insert_document(&coll, doc! { "_key": "a1", "city": "austin" })
        .unwrap();
    txn.insert_document(&coll, doc! { "_key": "a2", "city": "boston" })
        .unwrap();

    let austin = IndexSearch::Eq(vec![
        SortableValue::from_bson(&bson::Bson::String("austin".into())).unwrap(),
    ]);
    let hits = txn.scan_index(&coll, &index, &austin, None, 10, false).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_key, "a1");

    // Replacing the document moves its index entry.
    txn.replace_document(&coll, "a1", doc! { "city": "boston" })
        .unwrap()
        .unwrap();
    assert!(txn.scan_index(&coll, &index, &austin, None, 10, false).unwrap().is_empty());

    let boston = IndexSearch::Eq(vec![
        SortableValue::from_bson(&bson::Bson::String("boston".into())).unwrap(),
    ]);
    let hits = txn.scan_index(&coll, &index, &boston, None, 10, false).unwrap();
    assert_eq!(hits.len(), 2);

    // Removal cleans up.
    txn.remove_document(&coll, "a1").unwrap().unwrap();
    let hits = txn.scan_index(&coll, &index, &boston, None, 10, false).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_key, "a2");
}

#[test]
fn index_backfill_covers_existing_documents() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();

    let mut txn = engine.begin(false).unwrap();
    txn.insert_document(&coll, doc! { "_key": "a1", "x": 5 }).unwrap();
    txn.insert_document(&coll, doc! { "_key": "a2", "x": 7 }).unwrap();
    txn.commit().unwrap();

    let index = engine
        .ensure_index(&coll, IndexKind::Skiplist, vec!["x".into()], false, false)
        .unwrap();

    let txn = engine.begin(true).unwrap();
    let hits = txn
        .scan_index(&coll, &index, &IndexSearch::Full, None, 10, false)
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].doc_key, "a1");
    assert_eq!(hits[1].doc_key, "a2");
}

#[test]
fn range_scan_respects_bounds_and_order() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();
    let index = engine
        .ensure_index(&coll, IndexKind::Skiplist, vec!["x".into()], false, false)
        .unwrap();

    let mut txn = engine.begin(false).unwrap();
    for (key, x) in [("a1", 1), ("a2", 2), ("a3", 3), ("a4", 4)] {
        txn.insert_document(&coll, doc! { "_key": key, "x": x }).unwrap();
    }

    let sv = |n: i32| SortableValue::from_bson(&bson::Bson::Int32(n)).unwrap();
    let search = IndexSearch::Range {
        prefix: vec![],
        lower: Some((sv(2), false)),
        upper: Some((sv(4), true)),
    };

    let hits = txn.scan_index(&coll, &index, &search, None, 10, false).unwrap();
    let keys: Vec<&str> = hits.iter().map(|e| e.doc_key.as_str()).collect();
    assert_eq!(keys, vec!["a3", "a4"]);

    let hits = txn.scan_index(&coll, &index, &search, None, 10, true).unwrap();
    let keys: Vec<&str> = hits.iter().map(|e| e.doc_key.as_str()).collect();
    assert_eq!(keys, vec!["a4", "a3"]);
}

#[test]
fn paged_index_scan_resumes_after_raw_key() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();
    let index = engine
        .ensure_index(&coll, IndexKind::Skiplist, vec!["x".into()], false, false)
        .unwrap();

    let mut txn = engine.begin(false).unwrap();
    for i in 0..5 {
        txn.insert_document(&coll, doc! { "_key": format!("a{i}"), "x": i })
            .unwrap();
    }

    let first = txn
        .scan_index(&coll, &index, &IndexSearch::Full, None, 2, false)
        .unwrap();
    assert_eq!(first.len(), 2);
    let rest = txn
        .scan_index(
            &coll,
            &index,
            &IndexSearch::Full,
            Some(&first.last().unwrap().raw_key),
            10,
            false,
        )
        .unwrap();
    assert_eq!(rest.len(), 3);
    assert_eq!(rest[0].doc_key, "a2");
}

#[test]
fn unique_secondary_index_rejects_duplicates() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();
    engine
        .ensure_index(&coll, IndexKind::Hash, vec!["email".into()], true, false)
        .unwrap();

    let mut txn = engine.begin(false).unwrap();
    txn.insert_document(&coll, doc! { "_key": "a1", "email": "x@y.z" })
        .unwrap();
    let err = txn
        .insert_document(&coll, doc! { "_key": "a2", "email": "x@y.z" })
        .unwrap_err();
    assert!(err.to_string().contains("unique constraint"));
}

#[test]
fn sparse_index_only_holds_complete_documents() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();
    let index = engine
        .ensure_index(&coll, IndexKind::Skiplist, vec!["x".into()], false, true)
        .unwrap();

    let mut txn = engine.begin(false).unwrap();
    txn.insert_document(&coll, doc! { "_key": "a1", "x": 1 }).unwrap();
    txn.insert_document(&coll, doc! { "_key": "a2" }).unwrap();

    let hits = txn
        .scan_index(&coll, &index, &IndexSearch::Full, None, 10, false)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_key, "a1");
}

#[test]
fn non_sparse_index_stores_missing_as_null() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();
    let index = engine
        .ensure_index(&coll, IndexKind::Skiplist, vec!["x".into()], false, false)
        .unwrap();

    let mut txn = engine.begin(false).unwrap();
    txn.insert_document(&coll, doc! { "_key": "a1" }).unwrap();
    txn.insert_document(&coll, doc! { "_key": "a2", "x": 1 }).unwrap();

    let hits = txn
        .scan_index(&coll, &index, &IndexSearch::Full, None, 10, false)
        .unwrap();
    // Null sorts before any number.
    assert_eq!(hits[0].doc_key, "a1");
    assert_eq!(hits[1].doc_key, "a2");
}

#[test]
fn invoke_on_all_elements_for_removal_sees_every_key() {
    let engine = engine();
    let coll = engine.create_collection("accounts").unwrap();

    let mut txn = engine.begin(false).unwrap();
    for i in 0..4 {
        txn.insert_document(&coll, doc! { "_key": format!("a{i}") }).unwrap();
    }

    let mut removed = Vec::new();
    txn.invoke_on_all_elements_for_removal(&coll, |txn, key| {
        txn.remove_document(&coll, key)?;
        removed.push(key.to_string());
        Ok(true)
    })
    .unwrap();

    assert_eq!(removed.len(), 4);
    assert_eq!(txn.count(&coll).unwrap(), 0);
}

#[test]
fn catalog_survives_reopen() {
    let store = MemoryStore::new();
    {
        let engine = Arc::new(Engine::open(store.clone()).unwrap());
        let coll = engine.create_collection("accounts").unwrap();
        engine
            .ensure_index(&coll, IndexKind::Hash, vec!["city".into()], false, false)
            .unwrap();
        let mut txn = engine.begin(false).unwrap();
        txn.insert_document(&coll, doc! { "_key": "a1", "city": "austin" })
            .unwrap();
        txn.commit().unwrap();
    }

    // A second engine over the same store rebuilds collections and indexes
    // from the catalog.
    let engine = Arc::new(Engine::open(store).unwrap());
    let coll = engine.collection("accounts").unwrap();
    let indexes = coll.indexes();
    assert_eq!(indexes.len(), 2);
    assert_eq!(indexes[1].fields, vec!["city".to_string()]);
    let rebuilt = Index::from_descriptor(&indexes[1].descriptor()).unwrap();
    assert_eq!(rebuilt, *indexes[1]);

    let txn = engine.begin(true).unwrap();
    assert_eq!(txn.count(&coll).unwrap(), 1);
}
