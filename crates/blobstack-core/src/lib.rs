//! Log-backed object metadata store for Blobstack.
//!
//! This crate owns the durable heart of the service: an in-memory index of
//! stored objects rebuilt on every startup by replaying an append-only log.
//! The log is the single source of truth; the index is a cache of its fold.
//!
//! # Architecture
//!
//! ```text
//! HTTP layer (blobstack-http)
//!        |
//!        v
//!   MetadataStore (index + log handle, one RwLock)
//!        |
//!        +--> append-only log file   (ADD/DEL lines, fsync per mutation)
//!        +--> blob files on disk     (bytes live at each record's path)
//! ```
//!
//! Every mutating operation holds the exclusive side of the lock across both
//! the in-memory change and the log append, so replay always reproduces the
//! exact index a live process held.

pub mod config;
pub mod error;
pub mod log;
pub mod record;
pub mod store;

pub use config::BlobConfig;
pub use error::{StoreError, StoreResult};
pub use record::ObjectRecord;
pub use store::{MetadataStore, ObjectData};
