//! Account ledgers.
//!
//! Defines the `AccountLedger` trait and provides implementations for:
//! - `MemoryLedger` — in-process maps guarded by per-account locks
//! - `SqliteLedger` — sqlx/SQLite with transactional updates
//!
//! A ledger owns every balance in the system, including the machine's.
//! Each method is one atomic unit: it either commits completely or leaves
//! the account and machine untouched.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::types::{Account, AccountId, GameRules, SlotsResult};

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

/// A committed bet debit.
#[derive(Debug, Clone, PartialEq)]
pub struct BetReceipt {
    /// The bet size in effect when the debit committed.
    pub bet_size: Decimal,
    pub account: Account,
    pub machine_balance: Decimal,
}

/// A committed spin settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub payout: Decimal,
    pub account: Account,
    pub machine_balance: Decimal,
}

/// Balance store the spin engine commits through.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountLedger: Send + Sync {
    /// Fetch an account, creating it with the starting balance if needed.
    async fn get_or_create(&self, id: &AccountId) -> SlotsResult<Account>;

    /// Fetch an existing account.
    async fn account(&self, id: &AccountId) -> SlotsResult<Account>;

    /// Debit the account's current bet and credit the machine.
    ///
    /// Fails with `InsufficientBalance` without mutating anything when the
    /// balance cannot cover the bet.
    async fn place_bet(&self, id: &AccountId) -> SlotsResult<BetReceipt>;

    /// Apply a spin payout. A positive payout moves money from the machine
    /// to the account; a zero payout only resets `last_payout`.
    async fn settle(&self, id: &AccountId, payout: Decimal) -> SlotsResult<Settlement>;

    /// Change the account's bet size (already validated by the caller).
    async fn set_bet_size(&self, id: &AccountId, bet_size: Decimal) -> SlotsResult<Account>;

    /// Current machine (house) balance.
    async fn machine_balance(&self) -> SlotsResult<Decimal>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Open the ledger selected by the storage configuration.
pub async fn open_ledger(
    storage: &StorageConfig,
    rules: GameRules,
) -> anyhow::Result<Arc<dyn AccountLedger>> {
    let ledger: Arc<dyn AccountLedger> = match storage.backend {
        StorageBackend::Memory => Arc::new(MemoryLedger::new(rules)),
        StorageBackend::Sqlite => Arc::new(
            SqliteLedger::connect(&storage.database_url, storage.max_connections, rules).await?,
        ),
    };
    Ok(ledger)
}
