//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Money values are written as plain numbers in the file and converted to
//! two-decimal `Decimal` amounts by [`GameConfig::rules`].

use anyhow::{bail, Context, Result};
use rust_decimal::prelude::*;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::types::GameRules;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin; `None` disables the CORS layer.
    #[serde(default)]
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origin: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GameConfig {
    pub starting_balance: f64,
    pub default_bet_size: f64,
    pub min_bet_size: f64,
    pub max_bet_size: f64,
    pub machine_opening_balance: f64,
    /// Fixed RNG seed for reproducible sessions. Entropy when absent.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            starting_balance: 1000.0,
            default_bet_size: 10.0,
            min_bet_size: 5.0,
            max_bet_size: 100.0,
            machine_opening_balance: 10000.0,
            rng_seed: None,
        }
    }
}

impl GameConfig {
    /// Convert to exact monetary rules.
    pub fn rules(&self) -> Result<GameRules> {
        Ok(GameRules {
            starting_balance: money("game.starting_balance", self.starting_balance)?,
            default_bet_size: money("game.default_bet_size", self.default_bet_size)?,
            min_bet_size: money("game.min_bet_size", self.min_bet_size)?,
            max_bet_size: money("game.max_bet_size", self.max_bet_size)?,
            machine_opening_balance: money(
                "game.machine_opening_balance",
                self.machine_opening_balance,
            )?,
        })
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_url: "sqlite://slots.db".to_string(),
            max_connections: default_max_connections(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            tracing::warn!(path, "Config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DATABASE_URL` and `SLOTS_BIND` (`host:port`) overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.storage.database_url = url;
        }
        if let Ok(bind) = std::env::var("SLOTS_BIND") {
            let (host, port) = bind
                .rsplit_once(':')
                .with_context(|| format!("SLOTS_BIND must be host:port, got {bind}"))?;
            self.server.host = host.to_string();
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid port in SLOTS_BIND: {port}"))?;
        }
        Ok(())
    }

    /// Reject bet limits that could never be satisfied.
    pub fn validate(&self) -> Result<()> {
        let rules = self.game.rules()?;
        if rules.min_bet_size <= Decimal::ZERO {
            bail!("game.min_bet_size must be positive");
        }
        if rules.min_bet_size > rules.max_bet_size {
            bail!(
                "game.min_bet_size ({}) exceeds game.max_bet_size ({})",
                rules.min_bet_size,
                rules.max_bet_size
            );
        }
        if rules.default_bet_size < rules.min_bet_size || rules.default_bet_size > rules.max_bet_size
        {
            bail!("game.default_bet_size must lie within the bet limits");
        }
        if rules.starting_balance < Decimal::ZERO {
            bail!("game.starting_balance must not be negative");
        }
        if rules.machine_opening_balance < Decimal::ZERO {
            bail!("game.machine_opening_balance must not be negative");
        }
        Ok(())
    }
}

/// Convert a configured amount to a 2-dp decimal. The amount must fit the
/// ledger's integer-cent storage.
fn money(field: &str, value: f64) -> Result<Decimal> {
    if !value.is_finite() {
        bail!("{field} must be a finite number");
    }
    let amount = Decimal::from_f64(value)
        .map(|d| d.round_dp(2))
        .with_context(|| format!("{field} is out of range: {value}"))?;
    if amount.checked_mul(Decimal::ONE_HUNDRED).and_then(|c| c.to_i64()).is_none() {
        bail!("{field} is out of range: {value}");
    }
    Ok(amount)
}
