//! # warden-cli
//!
//! Command-line interface for the Warden governance loop.
//!
//! ## Commands
//!
//! - `warden run`: Start the task scheduler and the interactive operator console
//! - `warden status`: Needs tier, balance, health and backlog
//! - `warden log`: Recent policy verdicts
//! - `warden economics`: Balance, trend and recent transactions
//! - `warden hierarchy`: Current needs tier and its history
//! - `warden tasks`: Scheduled maintenance tasks and recent runs
//! - `warden submit`: Submit one action request (dialogue continues inline)
//! - `warden credit`: Record an operator deposit
//! - `warden config`: Show the effective configuration
//! - `warden doctor`: Audit the configuration

pub mod commands;

pub use commands::Cli;
