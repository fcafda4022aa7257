use std::sync::Arc;

use bson::Document;

use vellum_engine::Index;

/// Shared-ownership reference to an index plus its descriptor.
///
/// Many handles may point at one index; equality is reference equality on
/// the underlying index.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    index: Arc<Index>,
}

impl IndexHandle {
    pub fn new(index: Arc<Index>) -> IndexHandle {
        IndexHandle { index }
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    pub fn id(&self) -> u64 {
        self.index.id
    }

    pub fn is_sorted(&self) -> bool {
        self.index.is_sorted()
    }

    pub fn is_sparse(&self) -> bool {
        self.index.sparse
    }

    /// Write the descriptor, optionally extended with usage figures.
    pub fn to_document(&self, collection_name: &str, figures: Option<u64>) -> Document {
        let mut doc = self.index.descriptor();
        doc.insert("id", format!("{collection_name}/{}", self.index.id));
        if let Some(count) = figures {
            doc.insert("figures", bson::doc! { "documentCount": count as i64 });
        }
        doc
    }
}

impl PartialEq for IndexHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.index, &other.index)
    }
}

impl Eq for IndexHandle {}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_engine::IndexKind;

    #[test]
    fn equality_is_by_reference() {
        let index = Arc::new(Index::primary(1));
        let twin = Arc::new(Index::primary(1));
        let a = IndexHandle::new(Arc::clone(&index));
        let b = IndexHandle::new(index);
        let c = IndexHandle::new(twin);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn descriptor_includes_qualified_id_and_figures() {
        let index = Arc::new(Index {
            id: 7,
            kind: IndexKind::Hash,
            fields: vec!["x".into()],
            unique: false,
            sparse: false,
        });
        let handle = IndexHandle::new(index);
        let doc = handle.to_document("accounts", Some(10));
        assert_eq!(doc.get_str("id").unwrap(), "accounts/7");
        assert_eq!(doc.get_str("type").unwrap(), "hash");
        assert!(doc.get_document("figures").is_ok());
    }
}
