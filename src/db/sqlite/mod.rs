mod common;
mod documents;

pub use documents::SqliteDocumentStore;
