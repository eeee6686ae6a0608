//! Spin orchestration: bet → grid → wins → payout → settlement.
//!
//! A spin moves through two ledger commits. The bet debit (IDLE →
//! BET_PLACED) and the payout credit (BET_PLACED → RESOLVED) are each one
//! atomic unit owned by the ledger; the engine itself never touches a
//! balance. Spins on the same account hold a per-account guard across both
//! commits, so they run one after another. Different accounts never share
//! a guard.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use super::detector::detect_wins;
use super::grid::GridSource;
use super::payout::calculate_payout;
use crate::ledger::AccountLedger;
use crate::types::{
    Account, AccountId, AccountSnapshot, Grid, SlotsError, SlotsResult, WinRecord,
};

/// Everything a client needs to animate and score one spin.
#[derive(Debug, Clone)]
pub struct SpinResult {
    pub grid: Grid,
    pub wins: WinRecord,
    pub bet_size: Decimal,
    pub payout: Decimal,
    pub account: Account,
    pub machine_balance: Decimal,
}

impl SpinResult {
    pub fn is_win(&self) -> bool {
        self.payout > Decimal::ZERO
    }

    /// The JSON body returned by `POST /api/spin`.
    pub fn to_response(&self) -> SpinResponse {
        SpinResponse {
            result: self.grid.clone(),
            win_data: self.wins.clone().into_option(),
            payout: self.payout,
            player_data: self.account.snapshot(),
            machine_balance: self.machine_balance,
        }
    }
}

/// Wire format of a spin. `payout` and `machine_balance` serialize as JSON
/// numbers; `player_data` amounts are 2-dp strings.
#[derive(Debug, Clone, Serialize)]
pub struct SpinResponse {
    pub result: Grid,
    pub win_data: Option<WinRecord>,
    pub payout: Decimal,
    pub player_data: AccountSnapshot,
    pub machine_balance: Decimal,
}

pub struct SpinEngine {
    ledger: Arc<dyn AccountLedger>,
    source: Mutex<Box<dyn GridSource>>,
    /// One guard per account, held from bet debit through settlement.
    in_flight: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

impl SpinEngine {
    pub fn new(ledger: Arc<dyn AccountLedger>, source: Box<dyn GridSource>) -> Self {
        Self {
            ledger,
            source: Mutex::new(source),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    async fn account_guard(&self, id: &AccountId) -> Arc<Mutex<()>> {
        self.in_flight
            .lock()
            .await
            .entry(id.clone())
            .or_default()
            .clone()
    }

    pub fn ledger(&self) -> &Arc<dyn AccountLedger> {
        &self.ledger
    }

    /// Run one full spin for an existing account.
    ///
    /// `InsufficientBalance` aborts before anything is written. A failed
    /// settlement surfaces as `LedgerCommit`; the bet debit that preceded
    /// it stays committed.
    pub async fn spin(&self, id: &AccountId) -> SlotsResult<SpinResult> {
        let guard = self.account_guard(id).await;
        let _spinning = guard.lock().await;

        // IDLE -> BET_PLACED
        let receipt = self.ledger.place_bet(id).await?;

        // BET_PLACED -> RESOLVED
        let grid = self.source.lock().await.draw();
        let wins = detect_wins(&grid);
        let payout = calculate_payout(&wins, receipt.bet_size);

        let settlement = match self.ledger.settle(id, payout).await {
            Ok(s) => s,
            Err(e) => {
                error!(
                    account = %id,
                    bet = %receipt.bet_size,
                    payout = %payout,
                    error = %e,
                    "Settlement failed after bet was committed"
                );
                return Err(match e {
                    e @ SlotsError::LedgerCommit(_) => e,
                    other => SlotsError::LedgerCommit(other.to_string()),
                });
            }
        };

        info!(
            account = %id,
            bet = %receipt.bet_size,
            payout = %payout,
            winning_rows = wins.len(),
            balance = %settlement.account.balance,
            machine = %settlement.machine_balance,
            "Spin resolved"
        );

        Ok(SpinResult {
            grid,
            wins,
            bet_size: receipt.bet_size,
            payout,
            account: settlement.account,
            machine_balance: settlement.machine_balance,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
