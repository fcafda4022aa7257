use crate::error::StoreError;

/// A key-value storage backend holding named, ordered keyspaces.
pub trait Store {
    type Txn: StoreTransaction;

    fn begin(&self, read_only: bool) -> Result<Self::Txn, StoreError>;

    fn create_keyspace(&self, name: &str) -> Result<(), StoreError>;

    fn drop_keyspace(&self, name: &str) -> Result<(), StoreError>;
}

/// Bounds for a paged key scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanRange<'a> {
    pub lower: Option<&'a [u8]>,
    pub lower_inclusive: bool,
    pub upper: Option<&'a [u8]>,
    pub upper_inclusive: bool,
    pub reverse: bool,
}

impl<'a> ScanRange<'a> {
    pub fn all() -> ScanRange<'static> {
        ScanRange::default()
    }

    pub fn reversed(mut self) -> ScanRange<'a> {
        self.reverse = true;
        self
    }
}

/// Compute the first key greater than every key starting with `prefix`.
///
/// `None` when the prefix is all `0xFF` bytes, meaning the scan is
/// unbounded above.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last() {
        if *last == 0xFF {
            upper.pop();
        } else {
            *upper.last_mut().unwrap() += 1;
            return Some(upper);
        }
    }
    None
}

/// A transaction over a [`Store`].
///
/// Transactions are owned values: commit and rollback take `&mut self` and
/// flip the transaction into a consumed state, so a handle can be shared
/// behind interior mutability without lifetime coupling to the store.
pub trait StoreTransaction {
    fn get(&self, keyspace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn multi_get(
        &self,
        keyspace: &str,
        keys: &[&[u8]],
    ) -> Result<Vec<Option<Vec<u8>>>, StoreError>;

    fn put(&mut self, keyspace: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn delete(&mut self, keyspace: &str, key: &[u8]) -> Result<(), StoreError>;

    /// Return up to `limit` entries within `range`, in key order
    /// (or reverse key order when `range.reverse` is set).
    fn scan_page(
        &self,
        keyspace: &str,
        range: ScanRange<'_>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Count entries within `range`.
    fn count_range(&self, keyspace: &str, range: ScanRange<'_>) -> Result<u64, StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;
}
