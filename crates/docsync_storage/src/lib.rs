//! # docsync storage
//!
//! The capability interface every document store implements, plus a
//! reference in-memory backend.
//!
//! ## Design Principles
//!
//! - All operations are async and may suspend
//! - Missing documents are reported as [`StorageError::NotFound`], which
//!   callers treat as a normal answer
//! - Optional features are declared up front through [`Capabilities`]
//! - Backend types are resolved through an explicit [`StorageRegistry`]
//!
//! ## Example
//!
//! ```rust
//! use docsync_codec::Document;
//! use docsync_storage::{DocumentStorage, MemoryStorage, Query};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = MemoryStorage::new();
//! store.put("doc-1", Document::new().with("title", "hello")).await.unwrap();
//! let rows = store.query(&Query::all()).await.unwrap();
//! assert_eq!(rows[0].id, "doc-1");
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attachment;
mod backend;
mod capability;
mod error;
mod memory;
mod query;
mod registry;

pub use attachment::{Attachment, AttachmentInfo, DEFAULT_CONTENT_TYPE};
pub use backend::DocumentStorage;
pub use capability::{Capabilities, Capacity};
pub use error::{OptionalExt, StorageError, StorageResult};
pub use memory::{MemorySnapshot, MemoryStorage};
pub use query::{Filter, Query, QueryRow};
pub use registry::{StorageConstructor, StorageDescription, StorageRegistry};
