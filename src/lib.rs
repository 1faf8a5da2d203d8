//! Tote calculator: pooled-betting payouts and odds.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod engine;
pub mod storage;
pub mod export;
pub mod shell;
