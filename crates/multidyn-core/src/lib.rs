//! # Multidyn
//!
//! A multitenant virtualization layer in front of a hosted key-value /
//! document store with a DynamoDB-style data and query API.
//!
//! Tenants each see a private namespace of *virtual tables*; the layer
//! multiplexes all tenants onto a small fixed set of *physical tables*,
//! rewriting keys, items, conditions, and query/scan expressions on the way
//! down and rewriting results on the way back up. Isolation comes from a
//! tenant prefix on every hash key value:
//! `<tenant>.<virtual-table-or-index>.<original-value>`.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use multidyn_core::api::MultidynDb;
//! use multidyn_core::context::StaticTenant;
//! use multidyn_core::repo::InMemoryTableDescriptionRepo;
//! use multidyn_core::store::BackingStore;
//!
//! # fn connect_backing_store() -> Arc<dyn BackingStore> { unimplemented!() }
//! let db = MultidynDb::builder(
//!     connect_backing_store(),
//!     Arc::new(InMemoryTableDescriptionRepo::new()),
//!     StaticTenant::new("org-1"),
//! )
//! .name("multidyn-example")
//! .build();
//! ```

pub mod arn;
pub mod cache;
pub mod clock;
pub mod context;
pub mod error;
pub mod mapper;
pub mod mapping;
pub mod repo;
pub mod request;
pub mod store;
pub mod types;

mod db;

/// The public façade and its configuration.
pub mod api {
    pub use crate::db::{FieldValueDecoder, MultidynDb, MultidynDbBuilder};
}

pub use api::MultidynDb;
pub use error::{Error, Result};
