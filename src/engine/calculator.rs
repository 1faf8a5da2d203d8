//! Calculator: the live race plus saved history.
//!
//! Owns settings, the runner list, the saved race history and the store
//! the history is persisted to. Every history mutation rewrites the whole
//! stored history.

use chrono::{DateTime, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::engine::payout;
use crate::export;
use crate::storage::{self, KeyValueStore};
use crate::types::{
    check_runner_count, check_tickets, PoolTotals, Runner, Settings, Snapshot, ToteError,
    DEFAULT_RUNNERS,
};

pub struct Calculator {
    settings: Settings,
    runners: Vec<Runner>,
    history: Vec<Snapshot>,
    store: Box<dyn KeyValueStore>,
}

impl Calculator {
    /// Create a calculator with validated settings and `runner_count` empty runners.
    /// History starts empty; call [`Calculator::load_history`] to restore it.
    pub fn new(
        settings: Settings,
        runner_count: usize,
        store: Box<dyn KeyValueStore>,
    ) -> Result<Self, ToteError> {
        settings.validate()?;
        check_runner_count(runner_count)?;
        Ok(Self {
            settings,
            runners: Runner::field(runner_count),
            history: Vec::new(),
            store,
        })
    }

    /// Default settings and the default field of 15 runners.
    ///
    /// Always uses the defaults; use [`Calculator::new`] to start from
    /// configured settings or [`Calculator::with_fallback`] when a bad
    /// configuration should not stop the caller.
    pub fn with_store(store: Box<dyn KeyValueStore>) -> Self {
        Self {
            settings: Settings::default(),
            runners: Runner::field(DEFAULT_RUNNERS),
            history: Vec::new(),
            store,
        }
    }

    /// Like [`Calculator::new`], but an invalid settings block or runner
    /// count is logged and replaced by its default instead of failing.
    pub fn with_fallback(
        settings: Settings,
        runner_count: usize,
        store: Box<dyn KeyValueStore>,
    ) -> Self {
        let settings = match settings.validate() {
            Ok(()) => settings,
            Err(e) => {
                warn!(error = %e, "Invalid settings, using defaults");
                Settings::default()
            }
        };
        let runner_count = match check_runner_count(runner_count) {
            Ok(()) => runner_count,
            Err(e) => {
                warn!(error = %e, default = DEFAULT_RUNNERS, "Invalid runner count, using default");
                DEFAULT_RUNNERS
            }
        };
        Self {
            settings,
            runners: Runner::field(runner_count),
            history: Vec::new(),
            store,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn runners(&self) -> &[Runner] {
        &self.runners
    }

    /// Saved races in the order they were saved.
    pub fn history(&self) -> &[Snapshot] {
        &self.history
    }

    pub fn snapshot(&self, id: i64) -> Option<&Snapshot> {
        self.history.iter().find(|s| s.id == id)
    }

    /// Pool totals for the live race. Fails only when the pool is too large
    /// to represent.
    pub fn totals(&self) -> Result<PoolTotals, ToteError> {
        payout::pool_totals(&self.runners, &self.settings)
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_persistent()
    }

    /// Give the store back, e.g. to hand it to a fresh calculator.
    pub fn into_store(self) -> Box<dyn KeyValueStore> {
        self.store
    }

    // -- Live race ----------------------------------------------------------

    /// Replace the settings. Runners keep their current payouts until the
    /// next recompute.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ToteError> {
        settings.validate()?;
        info!(settings = %settings, "Settings updated");
        self.settings = settings;
        Ok(())
    }

    /// Resize the field. Runners that remain keep their tickets and results;
    /// new slots start empty.
    pub fn set_runner_count(&mut self, count: usize) -> Result<(), ToteError> {
        check_runner_count(count)?;
        let current = self.runners.len();
        if count < current {
            self.runners.truncate(count);
        } else {
            self.runners
                .extend((current as u32 + 1..=count as u32).map(Runner::new));
        }
        info!(from = current, to = count, "Runner count changed");
        Ok(())
    }

    /// Record tickets sold for one runner.
    pub fn set_tickets(&mut self, runner_id: u32, tickets: u64) -> Result<(), ToteError> {
        check_tickets(tickets)?;
        let runner = self
            .runners
            .iter_mut()
            .find(|r| r.id == runner_id)
            .ok_or(ToteError::UnknownRunner(runner_id))?;
        runner.tickets_sold = tickets;
        Ok(())
    }

    /// Recompute payouts and odds. Returns `false` when no tickets are sold,
    /// in which case runners keep whatever values they had. On error the
    /// runners are left as they were.
    pub fn recompute_payouts(&mut self) -> Result<bool, ToteError> {
        payout::recompute_payouts(&mut self.runners, &self.settings)
    }

    /// Clear tickets, payouts and odds on every runner. History is untouched.
    pub fn reset_current_race(&mut self) {
        self.runners.iter_mut().for_each(Runner::reset);
        info!(runners = self.runners.len(), "Current race reset");
    }

    // -- History ------------------------------------------------------------

    /// Save the current race to history and persist the full history.
    pub fn save_snapshot(&mut self) -> Result<Snapshot, ToteError> {
        self.save_snapshot_at(Utc::now())
    }

    /// Save with an explicit creation time.
    ///
    /// The snapshot stays in memory even if persisting fails; the next
    /// successful write will include it.
    pub fn save_snapshot_at(&mut self, now: DateTime<Utc>) -> Result<Snapshot, ToteError> {
        let totals = self.totals()?;
        let mut id = now.timestamp_millis();
        if let Some(last) = self.history.iter().map(|s| s.id).max() {
            if id <= last {
                id = last + 1;
            }
        }

        let snapshot = Snapshot {
            id,
            timestamp: now,
            runners: self.runners.clone(),
            total_tickets: totals.total_tickets,
            total_revenue: totals.total_revenue,
            total_payout: totals.total_payout,
            charity_profit: totals.charity_profit,
            currency: self.settings.currency.clone(),
            payout_percentage: self.settings.payout_percentage,
            ticket_price: self.settings.ticket_price,
        };
        self.history.push(snapshot.clone());

        info!(
            id,
            tickets = totals.total_tickets,
            revenue = %totals.total_revenue,
            races = self.history.len(),
            "Race saved"
        );

        self.persist()?;
        Ok(snapshot)
    }

    /// Remove the saved race with `id` and persist the remaining history.
    /// Returns whether a race was removed; nothing is written if not.
    pub fn delete_snapshot(&mut self, id: i64) -> Result<bool, ToteError> {
        let before = self.history.len();
        self.history.retain(|s| s.id != id);
        if self.history.len() == before {
            warn!(id, "No saved race with this id");
            return Ok(false);
        }

        info!(id, races = self.history.len(), "Race deleted");
        self.persist()?;
        Ok(true)
    }

    /// Replace the in-memory history with the stored one.
    ///
    /// Nothing stored leaves the current history as is. Unreadable or
    /// corrupt data empties the history and returns the error so the
    /// caller can report it.
    pub fn load_history(&mut self) -> Result<usize, ToteError> {
        match storage::load_history(&*self.store) {
            Ok(Some(history)) => {
                self.history = history;
                Ok(self.history.len())
            }
            Ok(None) => Ok(self.history.len()),
            Err(e) => {
                warn!(error = %e, "Could not load saved races, starting with empty history");
                self.history.clear();
                Err(e)
            }
        }
    }

    /// CSV text of the saved history, `None` when there is nothing saved.
    pub fn export_history(&self) -> Option<String> {
        export::render_csv(&self.history)
    }

    /// Write the history CSV into `dir`, named for `date`.
    pub fn export_to_dir(&self, dir: &Path, date: NaiveDate) -> Result<Option<PathBuf>, ToteError> {
        export::write_csv(dir, &self.history, date)
    }

    fn persist(&mut self) -> Result<(), ToteError> {
        storage::save_history(&mut *self.store, &self.history)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, MockKeyValueStore, NullStore, HISTORY_KEY};
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn calculator() -> Calculator {
        Calculator::with_store(Box::new(MemoryStore::new()))
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn sell(calc: &mut Calculator, tickets: &[u64]) {
        for (i, &t) in tickets.iter().enumerate() {
            calc.set_tickets(i as u32 + 1, t).unwrap();
        }
    }

    #[test]
    fn test_new_defaults() {
        let calc = calculator();
        assert_eq!(calc.runners().len(), 15);
        assert_eq!(calc.runners()[14].id, 15);
        assert_eq!(calc.settings(), &Settings::default());
        assert!(calc.history().is_empty());
        assert_eq!(calc.totals().unwrap().total_tickets, 0);
    }

    #[test]
    fn test_new_rejects_bad_input() {
        let bad = Settings {
            ticket_price: dec!(0),
            ..Settings::default()
        };
        assert!(Calculator::new(bad, 10, Box::new(NullStore)).is_err());
        assert!(Calculator::new(Settings::default(), 4, Box::new(NullStore)).is_err());
        assert!(Calculator::new(Settings::default(), 31, Box::new(NullStore)).is_err());
        assert!(Calculator::new(Settings::default(), 30, Box::new(NullStore)).is_ok());
    }

    #[test]
    fn test_set_tickets_unknown_runner() {
        let mut calc = calculator();
        assert!(matches!(calc.set_tickets(16, 3), Err(ToteError::UnknownRunner(16))));
        assert!(matches!(calc.set_tickets(0, 3), Err(ToteError::UnknownRunner(0))));
    }

    #[test]
    fn test_set_runner_count_preserves_existing() {
        let mut calc = calculator();
        sell(&mut calc, &[4, 6]);

        calc.set_runner_count(20).unwrap();
        assert_eq!(calc.runners().len(), 20);
        assert_eq!(calc.runners()[0].tickets_sold, 4);
        assert_eq!(calc.runners()[19].id, 20);
        assert_eq!(calc.runners()[19].tickets_sold, 0);

        calc.set_runner_count(5).unwrap();
        assert_eq!(calc.runners().len(), 5);
        assert_eq!(calc.runners()[1].tickets_sold, 6);
        assert_eq!(calc.totals().unwrap().total_tickets, 10);

        assert!(calc.set_runner_count(3).is_err());
        assert_eq!(calc.runners().len(), 5);
    }

    #[test]
    fn test_update_settings_validates() {
        let mut calc = calculator();
        let bad = Settings {
            payout_percentage: dec!(120),
            ..Settings::default()
        };
        assert!(calc.update_settings(bad).is_err());
        assert_eq!(calc.settings().payout_percentage, dec!(50));

        let good = Settings {
            currency: "€".into(),
            ..Settings::default()
        };
        calc.update_settings(good).unwrap();
        assert_eq!(calc.settings().currency, "€");
    }

    #[test]
    fn test_recompute_worked_example() {
        let mut calc = calculator();
        calc.set_runner_count(5).unwrap();
        sell(&mut calc, &[10, 0, 5]);

        assert!(calc.recompute_payouts().unwrap());
        let totals = calc.totals().unwrap();
        assert_eq!(totals.total_tickets, 15);
        assert_eq!(totals.total_revenue, dec!(15));
        assert_eq!(totals.total_payout, dec!(7.5));
        assert_eq!(totals.charity_profit, dec!(7.5));

        let r = calc.runners();
        assert_eq!((r[0].payout, r[0].odds.as_str()), (dec!(1), "1.5/1"));
        assert_eq!((r[1].payout, r[1].odds.as_str()), (Decimal::ZERO, "N/A"));
        assert_eq!((r[2].payout, r[2].odds.as_str()), (dec!(1.5), "3.0/1"));
    }

    #[test]
    fn test_reset_keeps_history() {
        let mut calc = calculator();
        sell(&mut calc, &[3, 3]);
        calc.recompute_payouts().unwrap();
        calc.save_snapshot_at(at(1_000)).unwrap();

        calc.reset_current_race();
        assert!(calc.runners().iter().all(|r| r == &Runner::new(r.id)));
        assert_eq!(calc.history().len(), 1);
        assert_eq!(calc.history()[0].total_tickets, 6);
    }

    #[test]
    fn test_recompute_after_reset_is_noop() {
        let mut calc = calculator();
        sell(&mut calc, &[2]);
        calc.recompute_payouts().unwrap();
        calc.reset_current_race();
        assert!(!calc.recompute_payouts().unwrap());
        assert!(calc.runners().iter().all(|r| r.odds == "N/A"));
    }

    #[test]
    fn test_save_copies_runners() {
        let mut calc = calculator();
        sell(&mut calc, &[5, 5]);
        calc.recompute_payouts().unwrap();
        let saved = calc.save_snapshot_at(at(1_700_000_000_000)).unwrap();

        calc.set_tickets(1, 99).unwrap();
        calc.recompute_payouts().unwrap();

        assert_eq!(saved.runners[0].tickets_sold, 5);
        assert_eq!(calc.history()[0].runners[0].tickets_sold, 5);
        assert_eq!(calc.history()[0].runners[0].odds, "2.0/1");
        assert_eq!(saved.id, 1_700_000_000_000);
        assert_eq!(saved.currency, "$");
        assert_eq!(saved.ticket_price, dec!(1));
    }

    #[test]
    fn test_save_ids_are_unique() {
        let mut calc = calculator();
        let a = calc.save_snapshot_at(at(5_000)).unwrap();
        let b = calc.save_snapshot_at(at(5_000)).unwrap();
        let c = calc.save_snapshot_at(at(4_000)).unwrap();
        assert_eq!(a.id, 5_000);
        assert_eq!(b.id, 5_001);
        assert_eq!(c.id, 5_002);
    }

    #[test]
    fn test_save_persists_whole_history_each_time() {
        let mut store = MockKeyValueStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_set()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, v| serde_json::from_str::<Vec<Snapshot>>(v).unwrap().len() == 1)
            .returning(|_, _| Ok(()));
        store
            .expect_set()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, v| serde_json::from_str::<Vec<Snapshot>>(v).unwrap().len() == 2)
            .returning(|_, _| Ok(()));

        let mut calc = Calculator::with_store(Box::new(store));
        calc.save_snapshot_at(at(1)).unwrap();
        calc.save_snapshot_at(at(2)).unwrap();
    }

    #[test]
    fn test_save_keeps_snapshot_when_write_fails() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_set()
            .returning(|_, _| Err(ToteError::Storage("read-only".into())));

        let mut calc = Calculator::with_store(Box::new(store));
        assert!(calc.save_snapshot_at(at(1)).is_err());
        assert_eq!(calc.history().len(), 1);
    }

    #[test]
    fn test_delete_removes_exactly_one() {
        let mut calc = calculator();
        for (i, tickets) in [3u64, 7, 11].iter().enumerate() {
            calc.set_tickets(1, *tickets).unwrap();
            calc.recompute_payouts().unwrap();
            calc.save_snapshot_at(at(1_000 + i as i64)).unwrap();
        }
        let kept: Vec<Snapshot> = calc
            .history()
            .iter()
            .filter(|s| s.id != 1_001)
            .cloned()
            .collect();

        assert!(calc.delete_snapshot(1_001).unwrap());
        assert_eq!(calc.history(), kept.as_slice());
        assert!(calc.snapshot(1_001).is_none());
        assert_eq!(calc.snapshot(1_002).unwrap().total_tickets, 11);
    }

    #[test]
    fn test_delete_unknown_id_writes_nothing() {
        let mut store = MockKeyValueStore::new();
        store.expect_set().times(0);

        let mut calc = Calculator::with_store(Box::new(store));
        assert!(!calc.delete_snapshot(42).unwrap());
    }

    #[test]
    fn test_reload_yields_identical_history() {
        let mut calc = calculator();
        sell(&mut calc, &[10, 0, 5]);
        calc.recompute_payouts().unwrap();
        calc.save_snapshot_at(at(1_718_000_000_000)).unwrap();
        calc.set_tickets(2, 4).unwrap();
        calc.recompute_payouts().unwrap();
        calc.save_snapshot_at(at(1_718_000_060_000)).unwrap();
        let saved = calc.history().to_vec();

        let mut reloaded = Calculator::with_store(calc.into_store());
        assert!(reloaded.history().is_empty());
        assert_eq!(reloaded.load_history().unwrap(), 2);
        assert_eq!(reloaded.history(), saved.as_slice());
    }

    #[test]
    fn test_load_replaces_existing_history() {
        let mut calc = calculator();
        calc.save_snapshot_at(at(1)).unwrap();
        let stored = calc.into_store();

        let mut other = Calculator::with_store(stored);
        other.history.push(calc_free_snapshot(77));
        other.load_history().unwrap();
        assert_eq!(other.history().len(), 1);
        assert_eq!(other.history()[0].id, 1);
    }

    #[test]
    fn test_load_nothing_stored_keeps_history() {
        let mut calc = Calculator::with_store(Box::new(NullStore));
        calc.save_snapshot_at(at(9)).unwrap();
        assert_eq!(calc.load_history().unwrap(), 1);
        assert_eq!(calc.history()[0].id, 9);
    }

    #[test]
    fn test_load_corrupt_falls_back_to_empty() {
        let store = MemoryStore::new().with_entry(HISTORY_KEY, "[{\"id\":");
        let mut calc = Calculator::with_store(Box::new(store));
        calc.history.push(calc_free_snapshot(5));

        let err = calc.load_history().unwrap_err();
        assert!(matches!(err, ToteError::PersistenceCorruption { .. }));
        assert!(calc.history().is_empty());
    }

    #[test]
    fn test_export_history() {
        let mut calc = calculator();
        assert!(calc.export_history().is_none());

        sell(&mut calc, &[10, 0, 5]);
        let when = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        calc.save_snapshot_at(when).unwrap();
        let csv = calc.export_history().unwrap();
        assert_eq!(
            csv,
            format!("{}\n6/10/2024,15,15.00,7.50,7.50,50%,$", export::CSV_HEADER)
        );
    }

    #[test]
    fn test_with_fallback_replaces_invalid_input() {
        let bad = Settings {
            ticket_price: dec!(0),
            currency: "R".into(),
            ..Settings::default()
        };
        let calc = Calculator::with_fallback(bad, 99, Box::new(NullStore));
        assert_eq!(calc.settings(), &Settings::default());
        assert_eq!(calc.runners().len(), DEFAULT_RUNNERS);

        let good = Settings {
            currency: "R".into(),
            ..Settings::default()
        };
        let calc = Calculator::with_fallback(good.clone(), 8, Box::new(NullStore));
        assert_eq!(calc.settings(), &good);
        assert_eq!(calc.runners().len(), 8);
    }

    #[test]
    fn test_set_tickets_rejects_out_of_range_count() {
        let mut calc = calculator();
        calc.set_tickets(1, 7).unwrap();
        let err = calc.set_tickets(1, 2_000_000_000).unwrap_err();
        assert!(matches!(err, ToteError::InvalidConfiguration(_)));
        assert_eq!(calc.runners()[0].tickets_sold, 7);
    }

    #[test]
    fn test_max_pool_stays_exact_through_reload() {
        let settings = Settings {
            ticket_price: dec!(1000000),
            payout_percentage: dec!(45.67),
            rounding: dec!(0.0001),
            ..Settings::default()
        };
        let mut calc = Calculator::new(settings, 30, Box::new(MemoryStore::new())).unwrap();
        for id in 1..=30 {
            calc.set_tickets(id, 1_000_000_000).unwrap();
        }
        assert!(calc.recompute_payouts().unwrap());
        let saved = calc.save_snapshot_at(at(1)).unwrap();
        assert_eq!(saved.total_payout + saved.charity_profit, saved.total_revenue);

        let mut reloaded = Calculator::with_store(calc.into_store());
        reloaded.load_history().unwrap();
        let back = &reloaded.history()[0];
        assert_eq!(back, &saved);
        assert_eq!(back.total_payout + back.charity_profit, back.total_revenue);
    }

    fn calc_free_snapshot(id: i64) -> Snapshot {
        Snapshot {
            id,
            timestamp: at(id),
            runners: Vec::new(),
            total_tickets: 0,
            total_revenue: Decimal::ZERO,
            total_payout: Decimal::ZERO,
            charity_profit: Decimal::ZERO,
            currency: "$".into(),
            payout_percentage: dec!(50),
            ticket_price: dec!(1),
        }
    }
}
