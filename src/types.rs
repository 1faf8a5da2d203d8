//! Shared types for the tote calculator.
//!
//! Runners, calculator settings, saved race snapshots and the error
//! taxonomy. Field names serialize in camelCase so that stored history
//! stays readable by the browser build of the calculator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Odds string used for runners with no tickets.
pub const NO_ODDS: &str = "N/A";

/// Allowed number of runners in a pool.
pub const MIN_RUNNERS: usize = 5;
pub const MAX_RUNNERS: usize = 30;
pub const DEFAULT_RUNNERS: usize = 15;

/// Upper bounds that keep every pool calculation inside `Decimal` range.
pub const MAX_TICKETS_PER_RUNNER: u64 = 1_000_000_000;
pub const MAX_TICKET_PRICE: Decimal = dec!(1000000);
pub const MIN_ROUNDING: Decimal = dec!(0.0001);
pub const MAX_ROUNDING: Decimal = dec!(1000000);

/// Check a field size against the allowed range.
pub fn check_runner_count(count: usize) -> Result<(), ToteError> {
    if !(MIN_RUNNERS..=MAX_RUNNERS).contains(&count) {
        return Err(ToteError::InvalidConfiguration(format!(
            "runner count must be within {MIN_RUNNERS}-{MAX_RUNNERS}, got {count}"
        )));
    }
    Ok(())
}

/// Check a runner's ticket count against the per-runner limit.
pub fn check_tickets(tickets: u64) -> Result<(), ToteError> {
    if tickets > MAX_TICKETS_PER_RUNNER {
        return Err(ToteError::InvalidConfiguration(format!(
            "tickets per runner must not exceed {MAX_TICKETS_PER_RUNNER}, got {tickets}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// A competitor in the pool with its ticket sales and derived payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runner {
    /// Slot number, stable for the lifetime of the pool (1..N).
    pub id: u32,
    pub tickets_sold: u64,
    /// Payout per winning ticket, rounded to the configured increment.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub payout: Decimal,
    /// `"X.X/1"` or `"N/A"`.
    pub odds: String,
}

impl Runner {
    /// A runner with no tickets sold.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            tickets_sold: 0,
            payout: Decimal::ZERO,
            odds: NO_ODDS.to_string(),
        }
    }

    /// Clear tickets and derived values.
    pub fn reset(&mut self) {
        self.tickets_sold = 0;
        self.payout = Decimal::ZERO;
        self.odds = NO_ODDS.to_string();
    }

    /// Build the default runner list: ids 1..=count.
    pub fn field(count: usize) -> Vec<Runner> {
        (1..=count as u32).map(Runner::new).collect()
    }
}

impl fmt::Display for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:<2} tickets={:<5} payout={:.2} odds={}",
            self.id, self.tickets_sold, self.payout, self.odds,
        )
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Pool configuration applied to every calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Display symbol, e.g. `"$"` or `"£"`.
    pub currency: String,
    /// Share of revenue paid out to winners, 0–100.
    pub payout_percentage: Decimal,
    /// Payouts are rounded to the nearest multiple of this.
    pub rounding: Decimal,
    pub ticket_price: Decimal,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            currency: "$".to_string(),
            payout_percentage: dec!(50),
            rounding: dec!(0.5),
            ticket_price: dec!(1.0),
        }
    }
}

impl Settings {
    /// Reject settings that would make the payout arithmetic meaningless.
    pub fn validate(&self) -> Result<(), ToteError> {
        if self.ticket_price <= Decimal::ZERO {
            return Err(ToteError::InvalidConfiguration(format!(
                "ticket price must be positive, got {}",
                self.ticket_price
            )));
        }
        if self.ticket_price > MAX_TICKET_PRICE {
            return Err(ToteError::InvalidConfiguration(format!(
                "ticket price must not exceed {MAX_TICKET_PRICE}, got {}",
                self.ticket_price
            )));
        }
        if self.rounding <= Decimal::ZERO {
            return Err(ToteError::InvalidConfiguration(format!(
                "rounding increment must be positive, got {}",
                self.rounding
            )));
        }
        if self.rounding < MIN_ROUNDING || self.rounding > MAX_ROUNDING {
            return Err(ToteError::InvalidConfiguration(format!(
                "rounding increment must be within {MIN_ROUNDING}-{MAX_ROUNDING}, got {}",
                self.rounding
            )));
        }
        if self.payout_percentage < Decimal::ZERO || self.payout_percentage > dec!(100) {
            return Err(ToteError::InvalidConfiguration(format!(
                "payout percentage must be within 0-100, got {}",
                self.payout_percentage
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ticket={}{:.2} | payout={}% | rounding={}",
            self.currency, self.ticket_price, self.payout_percentage, self.rounding,
        )
    }
}

// ---------------------------------------------------------------------------
// Pool totals
// ---------------------------------------------------------------------------

/// Aggregates derived from the runner list and settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolTotals {
    pub total_tickets: u64,
    pub total_revenue: Decimal,
    pub total_payout: Decimal,
    pub charity_profit: Decimal,
}

impl PoolTotals {
    pub fn fmt_with(&self, currency: &str) -> String {
        format!(
            "tickets={} | revenue={c}{:.2} | payout={c}{:.2} | charity={c}{:.2}",
            self.total_tickets,
            self.total_revenue,
            self.total_payout,
            self.charity_profit,
            c = currency,
        )
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One saved race: the runner list and totals as they were at save time.
///
/// Money is stored as JSON numbers carrying every decimal digit, so a
/// reloaded record compares equal to the one that was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Creation time in epoch milliseconds, unique within a history.
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub runners: Vec<Runner>,
    pub total_tickets: u64,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub total_revenue: Decimal,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub total_payout: Decimal,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub charity_profit: Decimal,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub payout_percentage: Decimal,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub ticket_price: Decimal,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | tickets={} | revenue={c}{:.2} | payout={c}{:.2} | charity={c}{:.2} | {}%",
            self.id,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.total_tickets,
            self.total_revenue,
            self.total_payout,
            self.charity_profit,
            self.payout_percentage,
            c = self.currency,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Recoverable errors raised by the calculator and its store.
#[derive(Debug, thiserror::Error)]
pub enum ToteError {
    #[error("Stored data under '{key}' is corrupt: {source}")]
    PersistenceCorruption {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown runner: {0}")]
    UnknownRunner(u32),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
