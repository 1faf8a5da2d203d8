//! Line-oriented command shell over a [`Calculator`].
//!
//! Each input line is parsed into a [`Command`] and dispatched against the
//! calculator. Errors from the calculator are reported back as notices and
//! never end the session.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::engine::Calculator;
use crate::types::Settings;

pub const HELP: &str = "\
Commands:
  tickets <runner> <n>   set tickets sold for a runner
  runners <n>            resize the field (5-30)
  price <x>              ticket price
  percent <x>            payout percentage (0-100)
  rounding <x>           payout rounding increment
  currency <symbol>      currency symbol
  calc                   recompute payouts and odds
  show                   show runners and totals
  save                   save the current race
  delete <id>            delete a saved race
  reset                  clear the current race
  history                list saved races
  load                   reload saved races from storage
  export                 write saved races to CSV
  help                   this text
  quit                   leave";

/// One user action.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Tickets { runner: u32, tickets: u64 },
    Runners(usize),
    Price(Decimal),
    Percent(Decimal),
    Rounding(Decimal),
    Currency(String),
    Calc,
    Show,
    Save,
    Delete(i64),
    Reset,
    History,
    Load,
    Export,
    Help,
    Quit,
}

fn arg<T: FromStr>(parts: &[&str], idx: usize, what: &str) -> anyhow::Result<T> {
    let raw = parts
        .get(idx)
        .ok_or_else(|| anyhow::anyhow!("missing {what}"))?;
    raw.parse().map_err(|_| anyhow::anyhow!("invalid {what}: {raw}"))
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&head) = parts.first() else {
            anyhow::bail!("empty command");
        };

        let cmd = match head.to_lowercase().as_str() {
            "tickets" | "t" => Command::Tickets {
                runner: arg(&parts, 1, "runner")?,
                tickets: arg(&parts, 2, "ticket count")?,
            },
            "runners" => Command::Runners(arg(&parts, 1, "runner count")?),
            "price" => Command::Price(arg(&parts, 1, "price")?),
            "percent" | "pct" => Command::Percent(arg(&parts, 1, "percentage")?),
            "rounding" => Command::Rounding(arg(&parts, 1, "rounding")?),
            "currency" => Command::Currency(arg(&parts, 1, "currency")?),
            "calc" | "calculate" => Command::Calc,
            "show" => Command::Show,
            "save" => Command::Save,
            "delete" | "del" => Command::Delete(arg(&parts, 1, "race id")?),
            "reset" => Command::Reset,
            "history" => Command::History,
            "load" => Command::Load,
            "export" => Command::Export,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => anyhow::bail!("unknown command: {other}"),
        };
        Ok(cmd)
    }
}

/// Result of dispatching one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Continue(String),
    Quit,
}

/// Dispatches commands against a calculator.
pub struct Shell {
    calc: Calculator,
    export_dir: PathBuf,
}

impl Shell {
    pub fn new(calc: Calculator, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            calc,
            export_dir: export_dir.into(),
        }
    }

    pub fn calculator(&self) -> &Calculator {
        &self.calc
    }

    /// Parse and run one input line. Blank lines produce no output.
    pub fn handle_line(&mut self, line: &str) -> Outcome {
        if line.trim().is_empty() {
            return Outcome::Continue(String::new());
        }
        match line.parse::<Command>() {
            Ok(cmd) => self.dispatch(cmd),
            Err(e) => Outcome::Continue(format!("{e} (try 'help')")),
        }
    }

    pub fn dispatch(&mut self, cmd: Command) -> Outcome {
        self.dispatch_on(cmd, Utc::now().date_naive())
    }

    /// Dispatch with an explicit export date.
    pub fn dispatch_on(&mut self, cmd: Command, today: NaiveDate) -> Outcome {
        let text = match cmd {
            Command::Quit => return Outcome::Quit,
            Command::Help => HELP.to_string(),
            Command::Tickets { runner, tickets } => match self.calc.set_tickets(runner, tickets) {
                Ok(()) => format!("Runner {runner}: {tickets} tickets"),
                Err(e) => notice(e),
            },
            Command::Runners(n) => match self.calc.set_runner_count(n) {
                Ok(()) => format!("{n} runners"),
                Err(e) => notice(e),
            },
            Command::Price(x) => self.change_settings(|s| s.ticket_price = x),
            Command::Percent(x) => self.change_settings(|s| s.payout_percentage = x),
            Command::Rounding(x) => self.change_settings(|s| s.rounding = x),
            Command::Currency(c) => self.change_settings(|s| s.currency = c),
            Command::Calc => match self.calc.recompute_payouts() {
                Ok(true) => self.render_race(),
                Ok(false) => "No tickets sold yet".to_string(),
                Err(e) => notice(e),
            },
            Command::Show => self.render_race(),
            Command::Save => match self.calc.save_snapshot() {
                Ok(s) => format!("Saved race {}", s.id),
                Err(e) => notice(e),
            },
            Command::Delete(id) => match self.calc.delete_snapshot(id) {
                Ok(true) => format!("Deleted race {id}"),
                Ok(false) => format!("No saved race {id}"),
                Err(e) => notice(e),
            },
            Command::Reset => {
                self.calc.reset_current_race();
                "Current race cleared".to_string()
            }
            Command::History => self.render_history(),
            Command::Load => match self.calc.load_history() {
                Ok(n) => format!("{n} saved races"),
                Err(e) => notice(e),
            },
            Command::Export => match self.calc.export_to_dir(&self.export_dir, today) {
                Ok(Some(path)) => format!("Exported to {}", path.display()),
                Ok(None) => "Nothing to export".to_string(),
                Err(e) => notice(e),
            },
        };
        Outcome::Continue(text)
    }

    fn change_settings(&mut self, edit: impl FnOnce(&mut Settings)) -> String {
        let mut settings = self.calc.settings().clone();
        edit(&mut settings);
        match self.calc.update_settings(settings) {
            Ok(()) => self.calc.settings().to_string(),
            Err(e) => notice(e),
        }
    }

    fn render_race(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.calc.settings());
        for runner in self.calc.runners() {
            let _ = writeln!(out, "  {runner}");
        }
        match self.calc.totals() {
            Ok(totals) => out.push_str(&totals.fmt_with(&self.calc.settings().currency)),
            Err(e) => out.push_str(&notice(e)),
        }
        out
    }

    fn render_history(&self) -> String {
        if self.calc.history().is_empty() {
            return "No saved races".to_string();
        }
        self.calc
            .history()
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn notice(e: impl std::fmt::Display) -> String {
    warn!(error = %e, "Command failed");
    format!("Error: {e}")
}
