use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::common::{parse_collection_path, parse_document_path};
use crate::{
    db::{
        batch::{WriteBatch, WriteOp},
        error::{DbError, DbResult},
        repos::DocumentStore,
    },
    models::{CollectionPath, Document, DocumentPath, extract_timestamp},
};

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn apply(conn: &mut SqliteConnection, op: &WriteOp) -> DbResult<()> {
        match op {
            WriteOp::Set { path, data } => {
                for ancestor in path.ancestors() {
                    sqlx::query(
                        r#"
                        INSERT OR IGNORE INTO document_refs (collection_path, doc_id)
                        VALUES (?, ?)
                        "#,
                    )
                    .bind(ancestor.parent().as_str())
                    .bind(ancestor.id())
                    .execute(&mut *conn)
                    .await?;
                }

                sqlx::query(
                    r#"
                    INSERT INTO documents (path, collection_path, doc_id, timestamp, data, created_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT(path) DO UPDATE SET
                        timestamp = excluded.timestamp,
                        data = excluded.data,
                        created_at = excluded.created_at
                    "#,
                )
                .bind(path.as_str())
                .bind(path.parent().as_str())
                .bind(path.id())
                .bind(extract_timestamp(data))
                .bind(serde_json::to_string(data)?)
                .bind(Utc::now())
                .execute(&mut *conn)
                .await?;
            }
            WriteOp::Delete { path } => {
                sqlx::query("DELETE FROM documents WHERE path = ?")
                    .bind(path.as_str())
                    .execute(&mut *conn)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list_collections(&self) -> DbResult<Vec<CollectionPath>> {
        let rows = sqlx::query(
            r#"
            SELECT collection_path FROM documents WHERE instr(collection_path, '/') = 0
            UNION
            SELECT collection_path FROM document_refs WHERE instr(collection_path, '/') = 0
            ORDER BY 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| parse_collection_path(&row.get::<String, _>(0)))
            .collect()
    }

    async fn list_documents(&self, collection: &CollectionPath) -> DbResult<Vec<DocumentPath>> {
        let rows = sqlx::query(
            r#"
            SELECT doc_id FROM documents WHERE collection_path = ?
            UNION
            SELECT doc_id FROM document_refs WHERE collection_path = ?
            ORDER BY 1
            "#,
        )
        .bind(collection.as_str())
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                collection
                    .doc(&row.get::<String, _>(0))
                    .map_err(DbError::from)
            })
            .collect()
    }

    async fn set(&self, path: &DocumentPath, data: Value) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::apply(
            &mut *tx,
            &WriteOp::Set {
                path: path.clone(),
                data,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, path: &DocumentPath) -> DbResult<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT data, timestamp, created_at
            FROM documents
            WHERE path = ?
            "#,
        )
        .bind(path.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> DbResult<Document> {
            Ok(Document {
                path: path.clone(),
                data: serde_json::from_str(&row.get::<String, _>("data"))?,
                timestamp: row.get::<Option<f64>, _>("timestamp"),
                created_at: row.get::<DateTime<Utc>, _>("created_at"),
            })
        })
        .transpose()
    }

    async fn query_expired(
        &self,
        collection: &CollectionPath,
        cutoff: f64,
        limit: usize,
    ) -> DbResult<Vec<DocumentPath>> {
        let rows = sqlx::query(
            r#"
            SELECT path FROM documents
            WHERE collection_path = ? AND timestamp <= ?
            ORDER BY timestamp ASC, path ASC
            LIMIT ?
            "#,
        )
        .bind(collection.as_str())
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| parse_document_path(&row.get::<String, _>("path")))
            .collect()
    }

    async fn count_expired(&self, collection: &CollectionPath, cutoff: f64) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM documents
            WHERE collection_path = ? AND timestamp <= ?
            "#,
        )
        .bind(collection.as_str())
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn commit(&self, batch: WriteBatch) -> DbResult<usize> {
        batch.check_size()?;
        if batch.is_empty() {
            return Ok(0);
        }

        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.pool.begin().await?;
        for op in batch.ops() {
            Self::apply(&mut *tx, op).await?;
        }
        tx.commit().await?;

        Ok(batch.len())
    }

    async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
