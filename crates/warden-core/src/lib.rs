//! # warden-core
//!
//! Core types, traits, and primitives for the Warden governance loop.
//! This crate defines the shared vocabulary used by every other crate in the
//! workspace: the error taxonomy, action requests and needs tiers, the
//! backend invocation interface, and the journal (transaction-log) interface
//! to the persistent store.

pub mod backend;
pub mod error;
pub mod journal;
pub mod types;

pub use backend::{BackendClient, Invocation};
pub use error::{ErrorKind, Result, WardenError};
pub use journal::{
    ActionRecord, DialogueTurnRecord, Journal, JournalRecord, MemoryJournal, TaskRecord,
    TaskRunRecord, TierRecord, Transaction,
};
pub use types::*;
