//! Shared document store test infrastructure
//!
//! The same test logic runs against every `DocumentStore` implementation:
//!
//! - **Memory**: always compiled
//! - **SQLite**: in-memory databases with real migrations (feature `database-sqlite`)
//!
//! # Architecture
//!
//! `documents.rs` contains shared test functions that take `&dyn DocumentStore`,
//! plus one submodule per backend that instantiates them with a macro.
