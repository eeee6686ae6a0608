//! In-memory ledger.
//!
//! Accounts live in a map of individually locked entries so spins from
//! different accounts never contend. The machine balance has its own lock
//! and is always taken after the account lock.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{AccountLedger, BetReceipt, Settlement};
use crate::types::{Account, AccountId, GameRules, SlotsError, SlotsResult};

pub struct MemoryLedger {
    rules: GameRules,
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<Account>>>>,
    machine: Mutex<Decimal>,
}

impl MemoryLedger {
    pub fn new(rules: GameRules) -> Self {
        let opening = rules.machine_opening_balance;
        Self {
            rules,
            accounts: RwLock::new(HashMap::new()),
            machine: Mutex::new(opening),
        }
    }

    /// Insert or replace an account wholesale. Used to seed fixtures.
    pub async fn insert(&self, id: AccountId, account: Account) {
        self.accounts
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(account)));
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    async fn entry(&self, id: &AccountId) -> SlotsResult<Arc<Mutex<Account>>> {
        self.accounts
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SlotsError::AccountNotFound(id.to_string()))
    }
}

#[async_trait]
impl AccountLedger for MemoryLedger {
    async fn get_or_create(&self, id: &AccountId) -> SlotsResult<Account> {
        let existing = self.accounts.read().await.get(id).cloned();
        if let Some(entry) = existing {
            let account = entry.lock().await.clone();
            return Ok(account);
        }

        let mut accounts = self.accounts.write().await;
        let entry = accounts.entry(id.clone()).or_insert_with(|| {
            info!(account = %id, balance = %self.rules.starting_balance, "Account created");
            Arc::new(Mutex::new(Account::new(&self.rules)))
        });
        let account = entry.lock().await.clone();
        Ok(account)
    }

    async fn account(&self, id: &AccountId) -> SlotsResult<Account> {
        let entry = self.entry(id).await?;
        let account = entry.lock().await.clone();
        Ok(account)
    }

    async fn place_bet(&self, id: &AccountId) -> SlotsResult<BetReceipt> {
        let entry = self.entry(id).await?;
        let mut account = entry.lock().await;

        let bet_size = match account.place_bet() {
            Ok(bet) => bet,
            Err(e) => {
                warn!(account = %id, balance = %account.balance, bet = %account.bet_size, "Bet rejected");
                return Err(e);
            }
        };

        let mut machine = self.machine.lock().await;
        *machine += bet_size;

        debug!(account = %id, bet = %bet_size, machine = %*machine, "Bet committed");
        Ok(BetReceipt {
            bet_size,
            account: account.clone(),
            machine_balance: *machine,
        })
    }

    async fn settle(&self, id: &AccountId, payout: Decimal) -> SlotsResult<Settlement> {
        let entry = self.entry(id).await?;
        let mut account = entry.lock().await;
        let mut machine = self.machine.lock().await;

        account.settle(payout);
        if payout > Decimal::ZERO {
            *machine -= payout;
        }

        debug!(account = %id, payout = %payout, machine = %*machine, "Spin settled");
        Ok(Settlement {
            payout,
            account: account.clone(),
            machine_balance: *machine,
        })
    }

    async fn set_bet_size(&self, id: &AccountId, bet_size: Decimal) -> SlotsResult<Account> {
        let entry = self.entry(id).await?;
        let mut account = entry.lock().await;
        account.bet_size = bet_size;
        account.updated_at = chrono::Utc::now();
        Ok(account.clone())
    }

    async fn machine_balance(&self) -> SlotsResult<Decimal> {
        Ok(*self.machine.lock().await)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
