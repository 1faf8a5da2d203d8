//! Payout and odds arithmetic.
//!
//! Pure functions over a runner list and [`Settings`]. Money is carried
//! as `Decimal` so that payout + charity always sums back to revenue.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::types::{PoolTotals, Runner, Settings, ToteError, NO_ODDS};

fn overflow(what: &str) -> ToteError {
    ToteError::InvalidConfiguration(format!("{what} is out of range for this pool"))
}

/// Sum of tickets sold across all runners.
pub fn total_tickets(runners: &[Runner]) -> Result<u64, ToteError> {
    runners
        .iter()
        .try_fold(0u64, |acc, r| acc.checked_add(r.tickets_sold))
        .ok_or_else(|| overflow("total tickets"))
}

/// Derive revenue, payout pool and charity share from ticket sales.
pub fn pool_totals(runners: &[Runner], settings: &Settings) -> Result<PoolTotals, ToteError> {
    let total_tickets = total_tickets(runners)?;
    let total_revenue = Decimal::from(total_tickets)
        .checked_mul(settings.ticket_price)
        .ok_or_else(|| overflow("total revenue"))?;
    let total_payout = total_revenue
        .checked_mul(settings.payout_percentage)
        .and_then(|v| v.checked_div(dec!(100)))
        .ok_or_else(|| overflow("total payout"))?;
    let charity_profit = total_revenue
        .checked_sub(total_payout)
        .ok_or_else(|| overflow("charity profit"))?;

    Ok(PoolTotals {
        total_tickets,
        total_revenue,
        total_payout,
        charity_profit,
    })
}

/// Round `value` to the nearest multiple of `increment`, halves away from zero.
///
/// A zero increment leaves the value untouched.
pub fn round_to_nearest(value: Decimal, increment: Decimal) -> Result<Decimal, ToteError> {
    if increment.is_zero() {
        return Ok(value);
    }
    let steps = value
        .checked_div(increment)
        .ok_or_else(|| overflow("payout"))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    steps
        .checked_mul(increment)
        .map(|v| v.normalize())
        .ok_or_else(|| overflow("payout"))
}

/// Fractional odds against a runner, e.g. `"3.0/1"`.
pub fn format_odds(total_tickets: u64, tickets_sold: u64) -> String {
    if tickets_sold == 0 {
        return NO_ODDS.to_string();
    }
    // u64 / u64 with a non-zero divisor always fits
    let odds = (Decimal::from(total_tickets) / Decimal::from(tickets_sold))
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
    format!("{}/1", one_decimal(odds))
}

/// Render with exactly one fractional digit. Expects an already rounded value.
fn one_decimal(value: Decimal) -> String {
    let mut v = value;
    v.rescale(1);
    v.to_string()
}

/// Recompute every runner's payout and odds in place.
///
/// Returns `Ok(false)` and leaves all runners untouched when no tickets
/// have been sold; previously computed values are not reset in that case.
/// On error no runner is modified.
pub fn recompute_payouts(runners: &mut [Runner], settings: &Settings) -> Result<bool, ToteError> {
    let totals = pool_totals(runners, settings)?;
    if totals.total_tickets == 0 {
        debug!("No tickets sold, skipping payout recompute");
        return Ok(false);
    }

    let payouts = runners
        .iter()
        .map(|runner| match runner.tickets_sold {
            0 => Ok(Decimal::ZERO),
            sold => round_to_nearest(totals.total_payout / Decimal::from(sold), settings.rounding),
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (runner, payout) in runners.iter_mut().zip(payouts) {
        runner.payout = payout;
        runner.odds = format_odds(totals.total_tickets, runner.tickets_sold);
    }

    debug!(
        total_tickets = totals.total_tickets,
        total_payout = %totals.total_payout,
        runners = runners.len(),
        "Payouts recomputed"
    );
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
