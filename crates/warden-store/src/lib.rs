//! # warden-store
//!
//! SQLite implementation of the Warden journal. Holds the six logical tables
//! (`actions`, `transactions`, `dialogue_log`, `hierarchy_of_needs`, `tasks`,
//! `task_runs`) and keeps a tamper-evident hash chain over the audit log.

pub mod store;

pub use store::{ChainReport, SqliteStore};
