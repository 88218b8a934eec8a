//! # docsync testkit
//!
//! Test utilities for docsync.
//!
//! This crate provides:
//! - Fixtures: replica sets of in-memory stores, document and blob helpers
//! - Storage wrappers that count concurrency, add latency, or inject
//!   failures
//! - Property-based generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn pushes_local_creation() {
//!     let set = ReplicaSet::new();
//!     set.local.put("a", doc(json!({"title": "x"}))).await.unwrap();
//!     // ... build a replicator over set.local, set.remote, set.signatures
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod wrappers;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::wrappers::*;
    pub use serde_json::json;
}

pub use fixtures::*;
pub use generators::*;
pub use wrappers::*;
