use async_trait::async_trait;
use serde_json::Value;

use crate::{
    db::{batch::WriteBatch, error::DbResult},
    models::{CollectionPath, Document, DocumentPath},
};

/// Hierarchical document store.
///
/// Collections hold documents, documents hold sub-collections. A document
/// written deep in the tree makes every ancestor document listable even
/// though those ancestors were never written themselves.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List root collections that hold at least one document at any depth.
    async fn list_collections(&self) -> DbResult<Vec<CollectionPath>>;

    /// List every document directly in a collection, including implicit
    /// documents that only exist as parents of deeper writes.
    async fn list_documents(&self, collection: &CollectionPath) -> DbResult<Vec<DocumentPath>>;

    /// Create or overwrite a single document.
    async fn set(&self, path: &DocumentPath, data: Value) -> DbResult<()>;

    /// Get a document by path. Implicit documents are not returned.
    async fn get(&self, path: &DocumentPath) -> DbResult<Option<Document>>;

    // ==================== Retention Operations ====================

    /// Documents in `collection` whose timestamp is at or before `cutoff`,
    /// oldest first, at most `limit` of them.
    ///
    /// Documents without a numeric timestamp never match.
    async fn query_expired(
        &self,
        collection: &CollectionPath,
        cutoff: f64,
        limit: usize,
    ) -> DbResult<Vec<DocumentPath>>;

    /// Count documents in `collection` whose timestamp is at or before `cutoff`.
    async fn count_expired(&self, collection: &CollectionPath, cutoff: f64) -> DbResult<u64>;

    /// Apply every staged write atomically and return how many were applied.
    ///
    /// Batches larger than [`MAX_BATCH_WRITES`](crate::db::MAX_BATCH_WRITES)
    /// are rejected before the store is touched.
    async fn commit(&self, batch: WriteBatch) -> DbResult<usize>;

    /// Check the store is reachable.
    async fn health_check(&self) -> DbResult<()>;
}
