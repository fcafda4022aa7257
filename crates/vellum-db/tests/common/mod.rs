use bson::{Bson, doc};
use vellum_db::{Database, DatabaseConfig};
use vellum_store::MemoryStore;

pub const COLLECTION: &str = "accounts";

pub fn temp_db() -> Database<MemoryStore> {
    Database::open(MemoryStore::new(), DatabaseConfig::default()).unwrap()
}

pub fn db_with_collection() -> Database<MemoryStore> {
    let db = temp_db();
    db.create_collection(COLLECTION).unwrap();
    db
}

/// Insert `count` documents `a0..aN` with an increasing `x`.
pub fn seed(db: &Database<MemoryStore>, count: usize) {
    let mut txn = db.begin(false).unwrap();
    for i in 0..count {
        let doc = doc! { "_key": format!("a{i}"), "x": i as i32 };
        let result = txn
            .insert(COLLECTION, &Bson::Document(doc), &Default::default())
            .unwrap();
        assert!(result.is_ok());
    }
    txn.commit().unwrap();
}
