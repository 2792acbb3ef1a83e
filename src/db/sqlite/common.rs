use crate::{
    db::error::{DbError, DbResult},
    models::{CollectionPath, DocumentPath},
};

/// Parse a document path read back from the database
pub fn parse_document_path(s: &str) -> DbResult<DocumentPath> {
    DocumentPath::parse(s)
        .map_err(|e| DbError::Internal(format!("Invalid document path in database: {}", e)))
}

/// Parse a collection path read back from the database
pub fn parse_collection_path(s: &str) -> DbResult<CollectionPath> {
    CollectionPath::parse(s)
        .map_err(|e| DbError::Internal(format!("Invalid collection path in database: {}", e)))
}
