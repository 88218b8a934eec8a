//! # docsync engine
//!
//! Replication and reconciliation between two document stores.
//!
//! This crate provides:
//! - Content hashing and a signature store recording the last synchronized
//!   state of every document and attachment
//! - Three-way change detection (local, remote, signature) with independent
//!   check toggles per side and change kind
//! - Conflict policies (unresolved, keep local, keep remote, ignore)
//! - Attachment reconciliation nested under each synchronized document
//! - Re-parenting of documents created remotely under a new id
//! - Two bounded operation pools (documents, attachments)
//! - An ordered report of every action taken
//!
//! ## Architecture
//!
//! A repair pass runs in three phases:
//! 1. Repair both wrapped stores (replicators nest)
//! 2. Scan: list and hash both sides, union with every signature
//! 3. Reconcile each candidate in id order through the document pool
//!
//! ## Key Invariants
//!
//! - A signature's hash is the hash of the content both sides held at the
//!   end of the last synchronization of that id
//! - Attachment signatures never outlive their document signature
//! - Per-document failures never abort the pass; they are reported and
//!   collected into [`ReplicateError::Unresolved`]
//! - The report order depends only on the data, never on pool sizes

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attachment;
mod config;
mod conflict;
mod engine;
mod error;
mod executor;
mod hasher;
mod reconcile;
mod reparent;
mod report;
mod scanner;
mod signature;

pub use config::ReplicateOptions;
pub use conflict::{decide, ChangeKind, ConflictPolicy, Decision, Propagation, Side};
pub use engine::{RepairState, RepairStats, Replicator};
pub use error::{RepairFailure, ReplicateError, ReplicateResult, Store};
pub use executor::OperationPool;
pub use hasher::Hasher;
pub use report::{Report, ReportCode, ReportEntry, Scope, Severity};
pub use scanner::Candidate;
pub use signature::{SignatureRecord, SignatureStore, SIGNATURE_CONTENT_TYPE};
