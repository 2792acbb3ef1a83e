use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Bound,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use super::{
    batch::{WriteBatch, WriteOp},
    error::DbResult,
    repos::DocumentStore,
};
use crate::models::{CollectionPath, Document, DocumentPath, extract_timestamp};

struct StoredDocument {
    data: Value,
    timestamp: Option<f64>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    documents: BTreeMap<DocumentPath, StoredDocument>,
    /// Ancestors of written documents; never removed.
    refs: BTreeSet<DocumentPath>,
}

impl Inner {
    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::Set { path, data } => {
                self.refs.extend(path.ancestors());
                let stored = StoredDocument {
                    timestamp: extract_timestamp(&data),
                    data,
                    created_at: Utc::now(),
                };
                self.documents.insert(path, stored);
            }
            WriteOp::Delete { path } => {
                self.documents.remove(&path);
            }
        }
    }

    /// Documents directly inside `collection`, in path order.
    fn children<'a>(
        &'a self,
        collection: &CollectionPath,
    ) -> impl Iterator<Item = (&'a DocumentPath, &'a StoredDocument)> + 'a {
        let prefix = format!("{}/", collection);
        self.documents
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while({
                let prefix = prefix.clone();
                move |(path, _)| path.as_str().starts_with(&prefix)
            })
            .filter(move |(path, _)| !path.as_str()[prefix.len()..].contains('/'))
    }

    fn expired<'a>(
        &'a self,
        collection: &CollectionPath,
        cutoff: f64,
    ) -> impl Iterator<Item = (f64, &'a DocumentPath)> + 'a {
        self.children(collection).filter_map(move |(path, doc)| {
            doc.timestamp
                .filter(|ts| *ts <= cutoff)
                .map(|ts| (ts, path))
        })
    }
}

/// In-memory document store.
///
/// All state lives behind one lock, so a commit applies atomically with
/// respect to every other operation. Used for tests and local development.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Inner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents, excluding implicit ones.
    pub fn len(&self) -> usize {
        self.inner.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list_collections(&self) -> DbResult<Vec<CollectionPath>> {
        let inner = self.inner.read();
        let roots: BTreeSet<CollectionPath> = inner
            .documents
            .keys()
            .chain(inner.refs.iter())
            .map(DocumentPath::root)
            .collect();
        Ok(roots.into_iter().collect())
    }

    async fn list_documents(&self, collection: &CollectionPath) -> DbResult<Vec<DocumentPath>> {
        let inner = self.inner.read();
        let docs: BTreeSet<DocumentPath> = inner
            .children(collection)
            .map(|(path, _)| path.clone())
            .chain(
                inner
                    .refs
                    .iter()
                    .filter(|path| path.parent() == *collection)
                    .cloned(),
            )
            .collect();
        Ok(docs.into_iter().collect())
    }

    async fn set(&self, path: &DocumentPath, data: Value) -> DbResult<()> {
        self.inner.write().apply(WriteOp::Set {
            path: path.clone(),
            data,
        });
        Ok(())
    }

    async fn get(&self, path: &DocumentPath) -> DbResult<Option<Document>> {
        let inner = self.inner.read();
        Ok(inner.documents.get(path).map(|doc| Document {
            path: path.clone(),
            data: doc.data.clone(),
            timestamp: doc.timestamp,
            created_at: doc.created_at,
        }))
    }

    async fn query_expired(
        &self,
        collection: &CollectionPath,
        cutoff: f64,
        limit: usize,
    ) -> DbResult<Vec<DocumentPath>> {
        let inner = self.inner.read();
        let mut expired: Vec<(f64, &DocumentPath)> = inner.expired(collection, cutoff).collect();
        expired.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        Ok(expired
            .into_iter()
            .take(limit)
            .map(|(_, path)| path.clone())
            .collect())
    }

    async fn count_expired(&self, collection: &CollectionPath, cutoff: f64) -> DbResult<u64> {
        let inner = self.inner.read();
        Ok(inner.expired(collection, cutoff).count() as u64)
    }

    async fn commit(&self, batch: WriteBatch) -> DbResult<usize> {
        batch.check_size()?;
        let applied = batch.len();
        let mut inner = self.inner.write();
        for op in batch.into_ops() {
            inner.apply(op);
        }
        Ok(applied)
    }

    async fn health_check(&self) -> DbResult<()> {
        Ok(())
    }
}
