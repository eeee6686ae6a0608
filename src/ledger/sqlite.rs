//! SQLite ledger (sqlx).
//!
//! Money is stored as integer cents so every debit and credit is a single
//! `UPDATE ... RETURNING` evaluated inside SQLite under its write lock.
//! Each ledger operation runs in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{AccountLedger, BetReceipt, Settlement};
use crate::types::{Account, AccountId, GameRules, SlotsError, SlotsResult};

const ACCOUNT_COLUMNS: &str = "balance_cents, bet_size_cents, last_payout_cents, \
     total_won_cents, total_wager_cents, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    balance_cents: i64,
    bet_size_cents: i64,
    last_payout_cents: i64,
    total_won_cents: i64,
    total_wager_cents: i64,
    created_at: String,
    updated_at: String,
}

impl AccountRow {
    fn into_account(self) -> SlotsResult<Account> {
        Ok(Account {
            balance: from_cents(self.balance_cents),
            bet_size: from_cents(self.bet_size_cents),
            last_payout: from_cents(self.last_payout_cents),
            total_won: from_cents(self.total_won_cents),
            total_wager: from_cents(self.total_wager_cents),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

pub struct SqliteLedger {
    pool: SqlitePool,
    rules: GameRules,
}

impl SqliteLedger {
    /// Connect, run migrations and make sure the machine row exists.
    pub async fn connect(url: &str, max_connections: u32, rules: GameRules) -> SlotsResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(storage_err)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        let ledger = Self { pool, rules };
        ledger.init().await?;
        info!(url, max_connections, "SQLite ledger ready");
        Ok(ledger)
    }

    /// Private in-memory database on a single pinned connection.
    pub async fn in_memory(rules: GameRules) -> SlotsResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(storage_err)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        let ledger = Self { pool, rules };
        ledger.init().await?;
        Ok(ledger)
    }

    async fn init(&self) -> SlotsResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SlotsError::Storage(e.to_string()))?;

        let opening = to_cents(self.rules.machine_opening_balance)?;
        let created = sqlx::query(
            "INSERT INTO machine (id, balance_cents) VALUES (1, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(opening)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?
        .rows_affected();

        if created > 0 {
            info!(balance = %self.rules.machine_opening_balance, "Machine opened");
        }
        Ok(())
    }

    async fn fetch(&self, key: &str) -> SlotsResult<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_key = ?"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(AccountRow::into_account).transpose()
    }
}

#[async_trait]
impl AccountLedger for SqliteLedger {
    async fn get_or_create(&self, id: &AccountId) -> SlotsResult<Account> {
        let key = id.storage_key();
        let now = Utc::now().to_rfc3339();

        let inserted = sqlx::query(
            "INSERT INTO accounts (account_key, balance_cents, bet_size_cents, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) ON CONFLICT(account_key) DO NOTHING",
        )
        .bind(&key)
        .bind(to_cents(self.rules.starting_balance)?)
        .bind(to_cents(self.rules.default_bet_size)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(commit_err)?
        .rows_affected();

        if inserted > 0 {
            info!(account = %id, balance = %self.rules.starting_balance, "Account created");
        }

        self.fetch(&key)
            .await?
            .ok_or_else(|| SlotsError::AccountNotFound(key))
    }

    async fn account(&self, id: &AccountId) -> SlotsResult<Account> {
        let key = id.storage_key();
        self.fetch(&key)
            .await?
            .ok_or_else(|| SlotsError::AccountNotFound(key))
    }

    async fn place_bet(&self, id: &AccountId) -> SlotsResult<BetReceipt> {
        let key = id.storage_key();
        let mut tx = self.pool.begin().await.map_err(commit_err)?;

        let debited: Option<AccountRow> = sqlx::query_as(&format!(
            "UPDATE accounts SET balance_cents = balance_cents - bet_size_cents, \
             total_wager_cents = total_wager_cents + bet_size_cents, updated_at = ? \
             WHERE account_key = ? AND balance_cents >= bet_size_cents \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(Utc::now().to_rfc3339())
        .bind(&key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(commit_err)?;

        let Some(row) = debited else {
            let current: Option<AccountRow> = sqlx::query_as(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_key = ?"
            ))
            .bind(&key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?;
            tx.rollback().await.map_err(commit_err)?;

            return match current {
                None => Err(SlotsError::AccountNotFound(key)),
                Some(row) => {
                    warn!(account = %id, balance_cents = row.balance_cents, bet_cents = row.bet_size_cents, "Bet rejected");
                    Err(SlotsError::InsufficientBalance {
                        needed: from_cents(row.bet_size_cents),
                        available: from_cents(row.balance_cents),
                    })
                }
            };
        };

        let machine_cents: i64 = sqlx::query_scalar(
            "UPDATE machine SET balance_cents = balance_cents + ? WHERE id = 1 RETURNING balance_cents",
        )
        .bind(row.bet_size_cents)
        .fetch_one(&mut *tx)
        .await
        .map_err(commit_err)?;

        tx.commit().await.map_err(commit_err)?;

        let bet_size = from_cents(row.bet_size_cents);
        debug!(account = %id, bet = %bet_size, machine_cents, "Bet committed");
        Ok(BetReceipt {
            bet_size,
            account: row.into_account()?,
            machine_balance: from_cents(machine_cents),
        })
    }

    async fn settle(&self, id: &AccountId, payout: Decimal) -> SlotsResult<Settlement> {
        let key = id.storage_key();
        let payout_cents = to_cents(payout)?;
        let mut tx = self.pool.begin().await.map_err(commit_err)?;

        let settled: Option<AccountRow> = sqlx::query_as(&format!(
            "UPDATE accounts SET balance_cents = balance_cents + ?, \
             total_won_cents = total_won_cents + ?, last_payout_cents = ?, updated_at = ? \
             WHERE account_key = ? RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(payout_cents)
        .bind(payout_cents)
        .bind(payout_cents)
        .bind(Utc::now().to_rfc3339())
        .bind(&key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(commit_err)?;

        let Some(row) = settled else {
            tx.rollback().await.map_err(commit_err)?;
            return Err(SlotsError::AccountNotFound(key));
        };

        let machine_cents: i64 = if payout_cents > 0 {
            sqlx::query_scalar(
                "UPDATE machine SET balance_cents = balance_cents - ? WHERE id = 1 RETURNING balance_cents",
            )
            .bind(payout_cents)
            .fetch_one(&mut *tx)
            .await
            .map_err(commit_err)?
        } else {
            sqlx::query_scalar("SELECT balance_cents FROM machine WHERE id = 1")
                .fetch_one(&mut *tx)
                .await
                .map_err(commit_err)?
        };

        tx.commit().await.map_err(commit_err)?;

        debug!(account = %id, payout = %payout, machine_cents, "Spin settled");
        Ok(Settlement {
            payout,
            account: row.into_account()?,
            machine_balance: from_cents(machine_cents),
        })
    }

    async fn set_bet_size(&self, id: &AccountId, bet_size: Decimal) -> SlotsResult<Account> {
        let key = id.storage_key();
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "UPDATE accounts SET bet_size_cents = ?, updated_at = ? \
             WHERE account_key = ? RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(to_cents(bet_size)?)
        .bind(Utc::now().to_rfc3339())
        .bind(&key)
        .fetch_optional(&self.pool)
        .await
        .map_err(commit_err)?;

        row.ok_or_else(|| SlotsError::AccountNotFound(key))?
            .into_account()
    }

    async fn machine_balance(&self) -> SlotsResult<Decimal> {
        let cents: i64 = sqlx::query_scalar("SELECT balance_cents FROM machine WHERE id = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(from_cents(cents))
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn to_cents(amount: Decimal) -> SlotsResult<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| SlotsError::Storage(format!("amount out of range: {amount}")))
}

fn parse_timestamp(raw: &str) -> SlotsResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| SlotsError::Storage(format!("bad timestamp {raw:?}: {e}")))
}

fn commit_err(e: sqlx::Error) -> SlotsError {
    SlotsError::LedgerCommit(e.to_string())
}

fn storage_err(e: sqlx::Error) -> SlotsError {
    SlotsError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
