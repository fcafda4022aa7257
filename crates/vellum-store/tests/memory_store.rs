use vellum_store::{MemoryStore, ScanRange, Store, StoreTransaction, prefix_successor};

const KS: &str = "data";

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_keyspace(KS).unwrap();
    let mut txn = store.begin(false).unwrap();
    for key in [b"a1", b"a2", b"a3", b"b1", b"b2"] {
        txn.put(KS, key, b"v").unwrap();
    }
    txn.commit().unwrap();
    store
}

#[test]
fn put_get_roundtrip() {
    let store = MemoryStore::new();
    store.create_keyspace(KS).unwrap();

    let mut txn = store.begin(false).unwrap();
    txn.put(KS, b"k", b"value").unwrap();
    assert_eq!(txn.get(KS, b"k").unwrap().unwrap(), b"value");
    txn.commit().unwrap();

    let txn = store.begin(true).unwrap();
    assert_eq!(txn.get(KS, b"k").unwrap().unwrap(), b"value");
}

#[test]
fn uncommitted_writes_are_invisible() {
    let store = MemoryStore::new();
    store.create_keyspace(KS).unwrap();

    let mut txn = store.begin(false).unwrap();
    txn.put(KS, b"k", b"value").unwrap();
    txn.rollback().unwrap();

    let txn = store.begin(true).unwrap();
    assert!(txn.get(KS, b"k").unwrap().is_none());
}

#[test]
fn readers_keep_their_snapshot() {
    let store = seeded_store();

    let reader = store.begin(true).unwrap();
    assert_eq!(reader.get(KS, b"a1").unwrap().unwrap(), b"v");

    let mut writer = store.begin(false).unwrap();
    writer.delete(KS, b"a1").unwrap();
    writer.commit().unwrap();

    // The reader's lazily-loaded snapshot was taken before the commit.
    assert_eq!(reader.get(KS, b"a1").unwrap().unwrap(), b"v");

    let fresh = store.begin(true).unwrap();
    assert!(fresh.get(KS, b"a1").unwrap().is_none());
}

#[test]
fn read_only_transaction_rejects_writes() {
    let store = seeded_store();
    let mut txn = store.begin(true).unwrap();
    let err = txn.put(KS, b"x", b"y").unwrap_err();
    assert!(err.to_string().contains("read-only"));
}

#[test]
fn missing_keyspace_is_an_error() {
    let store = MemoryStore::new();
    let txn = store.begin(true).unwrap();
    let err = txn.get("nope", b"k").unwrap_err();
    assert!(err.to_string().contains("keyspace not found"));
}

#[test]
fn consumed_transaction_rejects_use() {
    let store = seeded_store();
    let mut txn = store.begin(false).unwrap();
    txn.commit().unwrap();
    assert!(txn.get(KS, b"a1").is_err());
    assert!(txn.commit().is_err());
}

#[test]
fn scan_page_respects_bounds_and_limit() {
    let store = seeded_store();
    let txn = store.begin(true).unwrap();

    let upper = prefix_successor(b"a").unwrap();
    let range = ScanRange {
        lower: Some(b"a"),
        lower_inclusive: true,
        upper: Some(&upper),
        upper_inclusive: false,
        reverse: false,
    };

    let page = txn.scan_page(KS, range, 2).unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].0, b"a1");
    assert_eq!(page[1].0, b"a2");

    let rest = txn
        .scan_page(
            KS,
            ScanRange {
                lower: Some(b"a2"),
                lower_inclusive: false,
                ..range
            },
            10,
        )
        .unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].0, b"a3");
}

#[test]
fn scan_page_reverse_order() {
    let store = seeded_store();
    let txn = store.begin(true).unwrap();

    let page = txn.scan_page(KS, ScanRange::all().reversed(), 2).unwrap();
    assert_eq!(page[0].0, b"b2");
    assert_eq!(page[1].0, b"b1");
}

#[test]
fn count_range_counts_entries() {
    let store = seeded_store();
    let txn = store.begin(true).unwrap();
    assert_eq!(txn.count_range(KS, ScanRange::all()).unwrap(), 5);

    let upper = prefix_successor(b"b").unwrap();
    let range = ScanRange {
        lower: Some(b"b"),
        lower_inclusive: true,
        upper: Some(&upper),
        upper_inclusive: false,
        reverse: false,
    };
    assert_eq!(txn.count_range(KS, range).unwrap(), 2);
}

#[test]
fn dropped_write_transaction_releases_the_write_slot() {
    let store = seeded_store();
    {
        let mut txn = store.begin(false).unwrap();
        txn.put(KS, b"z", b"v").unwrap();
        // Dropped without commit.
    }
    // A second writer must not deadlock.
    let mut txn = store.begin(false).unwrap();
    txn.put(KS, b"z2", b"v").unwrap();
    txn.commit().unwrap();

    let txn = store.begin(true).unwrap();
    assert!(txn.get(KS, b"z").unwrap().is_none());
    assert!(txn.get(KS, b"z2").unwrap().is_some());
}
