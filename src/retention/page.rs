use crate::{
    db::{DbError, DbResult, DocumentStore, MAX_BATCH_WRITES, WriteBatch, WriteOp},
    models::CollectionPath,
};

/// Delete one page of expired events and return how many were deleted.
///
/// Queries at most `page_size` documents in `events` with
/// `timestamp <= cutoff`, oldest first, and deletes them in one atomic batch.
/// A return of 0 means nothing in the collection qualifies any more.
pub async fn delete_expired_page(
    store: &dyn DocumentStore,
    events: &CollectionPath,
    cutoff: f64,
    page_size: usize,
) -> DbResult<usize> {
    if page_size == 0 || page_size > MAX_BATCH_WRITES {
        return Err(DbError::Validation(format!(
            "page size must be between 1 and {MAX_BATCH_WRITES}, got {page_size}"
        )));
    }

    let expired = store.query_expired(events, cutoff, page_size).await?;
    if expired.is_empty() {
        return Ok(0);
    }

    let batch: WriteBatch = expired
        .into_iter()
        .map(|path| WriteOp::Delete { path })
        .collect();
    let deleted = store.commit(batch).await?;

    tracing::debug!(collection = %events, deleted, "Committed delete page");
    Ok(deleted)
}
