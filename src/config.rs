//! Configuration loading from TOML.
//!
//! Reads `tote.toml` and deserializes into strongly-typed structs. Every
//! section and field is optional; anything left out takes the calculator's
//! built-in default.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::storage::file::DEFAULT_DATA_DIR;
use crate::types::{check_runner_count, Settings, ToteError, DEFAULT_RUNNERS};

/// Default config file path.
pub const DEFAULT_CONFIG_FILE: &str = "tote.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub calculator: CalculatorConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalculatorConfig {
    pub currency: String,
    pub payout_percentage: Decimal,
    pub rounding: Decimal,
    pub ticket_price: Decimal,
    pub runner_count: usize,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            currency: settings.currency,
            payout_percentage: settings.payout_percentage,
            rounding: settings.rounding,
            ticket_price: settings.ticket_price,
            runner_count: DEFAULT_RUNNERS,
        }
    }
}

impl CalculatorConfig {
    /// The pool settings described by this section (not yet validated).
    pub fn settings(&self) -> Settings {
        Settings {
            currency: self.currency.clone(),
            payout_percentage: self.payout_percentage,
            rounding: self.rounding,
            ticket_price: self.ticket_price,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// When false, saved races only live for the current session.
    pub enabled: bool,
    pub data_dir: PathBuf,
    pub export_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            export_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Load from `path`, never failing: an unreadable, malformed or invalid
    /// file is logged and replaced by the built-in defaults.
    pub fn load_or_fallback(path: &Path) -> Self {
        let loaded = Self::load_or_default(path).and_then(|cfg| {
            cfg.validate()
                .with_context(|| format!("Invalid config file: {}", path.display()))?;
            Ok(cfg)
        });
        match loaded {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Config rejected, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Check the calculator section against the same rules the calculator
    /// applies at runtime.
    pub fn validate(&self) -> Result<(), ToteError> {
        self.calculator.settings().validate()?;
        check_runner_count(self.calculator.runner_count)
    }
}
