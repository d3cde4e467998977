//! # Pomelo DB - Database Controller
//!
//! The orchestrator binding schema, transform, and adapter: it resolves
//! permissions, rewrites relation constraints into id-set lookups via
//! join tables, executes CRUD, and sanitizes results.

pub mod controller;
pub mod object_id;
pub mod relations;

pub use controller::{DbController, FindResult, QueryOptions, WriteOptions};
pub use object_id::new_object_id;
pub use pomelo_types::{Error, Result};
