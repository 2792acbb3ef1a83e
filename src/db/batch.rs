use serde_json::Value;

use super::error::{DbError, DbResult};
use crate::models::DocumentPath;

/// Maximum number of writes a store applies in one atomic batch.
pub const MAX_BATCH_WRITES: usize = 500;

/// A single staged write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set { path: DocumentPath, data: Value },
    Delete { path: DocumentPath },
}

impl WriteOp {
    pub fn path(&self) -> &DocumentPath {
        match self {
            WriteOp::Set { path, .. } | WriteOp::Delete { path } => path,
        }
    }
}

/// Writes staged for one atomic commit.
///
/// Nothing touches the store until the batch is passed to
/// [`DocumentStore::commit`](super::DocumentStore::commit). Either every write
/// applies or none does.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a create-or-overwrite.
    pub fn set(&mut self, path: DocumentPath, data: Value) -> &mut Self {
        self.ops.push(WriteOp::Set { path, data });
        self
    }

    /// Stage a delete. Deleting a missing document is not an error.
    pub fn delete(&mut self, path: DocumentPath) -> &mut Self {
        self.ops.push(WriteOp::Delete { path });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Reject batches the store cannot apply atomically.
    pub fn check_size(&self) -> DbResult<()> {
        if self.ops.len() > MAX_BATCH_WRITES {
            return Err(DbError::BatchTooLarge {
                size: self.ops.len(),
                limit: MAX_BATCH_WRITES,
            });
        }
        Ok(())
    }
}

impl FromIterator<WriteOp> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = WriteOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(id: &str) -> DocumentPath {
        DocumentPath::parse(&format!("reg/{id}")).unwrap()
    }

    #[test]
    fn test_stage_writes() {
        let mut batch = WriteBatch::new();
        batch
            .set(doc("a"), json!({"timestamp": 1}))
            .delete(doc("b"));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.ops()[1], WriteOp::Delete { path: doc("b") });
        assert_eq!(batch.ops()[0].path(), &doc("a"));
    }

    #[test]
    fn test_size_limit() {
        let full: WriteBatch = (0..MAX_BATCH_WRITES)
            .map(|i| WriteOp::Delete { path: doc(&i.to_string()) })
            .collect();
        assert!(full.check_size().is_ok());

        let mut over = full.clone();
        over.delete(doc("one-more"));
        assert!(matches!(
            over.check_size(),
            Err(DbError::BatchTooLarge { size: 501, limit: 500 })
        ));
    }
}
