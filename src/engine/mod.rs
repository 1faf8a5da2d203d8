//! Payout engine: pure pool arithmetic plus the stateful calculator.

pub mod calculator;
pub mod payout;

pub use calculator::Calculator;
