//! Shared types for the SLOTS server.
//!
//! These types form the data model used across the engine, the ledgers
//! and the web layer. Money is always `rust_decimal::Decimal` with
//! two-decimal-place currency semantics.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::ser::{SerializeMap, SerializeTuple};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Number of reels (columns) on the machine.
pub const REELS: usize = 5;
/// Number of visible rows per reel.
pub const ROWS: usize = 3;

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

/// A reel symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symbol {
    Diamond,
    Floppy,
    Hourglass,
    /// Drawn with the same artwork as `Hourglass` but scored as its own symbol.
    Seven,
    Telephone,
}

impl Symbol {
    /// The ordered symbol set the machine draws from.
    pub const ALL: [Symbol; 5] = [
        Symbol::Diamond,
        Symbol::Floppy,
        Symbol::Hourglass,
        Symbol::Seven,
        Symbol::Telephone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Symbol::Diamond => "diamond",
            Symbol::Floppy => "floppy",
            Symbol::Hourglass => "hourglass",
            Symbol::Seven => "seven",
            Symbol::Telephone => "telephone",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// A 5×3 spin outcome, indexed `[reel][row]`.
///
/// The fixed-size arrays make the 5×3 shape impossible to violate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    reels: [[Symbol; ROWS]; REELS],
}

impl Grid {
    pub fn new(reels: [[Symbol; ROWS]; REELS]) -> Self {
        Self { reels }
    }

    /// Build a grid from row-major data, `rows[row][reel]`.
    pub fn from_rows(rows: [[Symbol; REELS]; ROWS]) -> Self {
        let mut reels = [[Symbol::Diamond; ROWS]; REELS];
        for (row, line) in rows.iter().enumerate() {
            for (reel, sym) in line.iter().enumerate() {
                reels[reel][row] = *sym;
            }
        }
        Self { reels }
    }

    pub fn reels(&self) -> &[[Symbol; ROWS]; REELS] {
        &self.reels
    }

    pub fn get(&self, reel: usize, row: usize) -> Symbol {
        self.reels[reel][row]
    }
}

/// Serialized as `{"0": [..], "1": [..], ...}` keyed by reel index, the
/// shape existing browser clients read.
impl Serialize for Grid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(REELS))?;
        for (idx, reel) in self.reels.iter().enumerate() {
            map.serialize_entry(&idx, reel)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Wins
// ---------------------------------------------------------------------------

/// A winning run on one row: the symbol and the consecutive columns it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinEntry {
    pub symbol: Symbol,
    pub columns: Vec<usize>,
}

impl WinEntry {
    pub fn run_length(&self) -> usize {
        self.columns.len()
    }
}

/// Serialized as `[symbol, [columns...]]`.
impl Serialize for WinEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.symbol)?;
        tup.serialize_element(&self.columns)?;
        tup.end()
    }
}

/// Winning rows of a spin, keyed by 1-based row number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WinRecord(BTreeMap<usize, WinEntry>);

impl WinRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the win for a row, replacing any earlier entry for that row.
    pub fn record(&mut self, row: usize, entry: WinEntry) {
        self.0.insert(row, entry);
    }

    pub fn get(&self, row: usize) -> Option<&WinEntry> {
        self.0.get(&row)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&usize, &WinEntry)> {
        self.0.iter()
    }

    /// Sum of all winning run lengths.
    pub fn multiplier(&self) -> usize {
        self.0.values().map(WinEntry::run_length).sum()
    }

    /// `None` when nothing won, which serializes to JSON `null`.
    pub fn into_option(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Who is playing. Anonymous players are keyed by session, signed-in
/// players by user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccountId {
    Session(String),
    User(i64),
}

impl AccountId {
    /// Stable key used by the ledgers.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountId::Session(id) => write!(f, "session:{id}"),
            AccountId::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Balance and bet state for one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub balance: Decimal,
    pub bet_size: Decimal,
    /// Zero means "no payout on the last spin".
    pub last_payout: Decimal,
    pub total_won: Decimal,
    pub total_wager: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// A fresh account funded according to the game rules.
    pub fn new(rules: &GameRules) -> Self {
        let now = Utc::now();
        Self {
            balance: rules.starting_balance,
            bet_size: rules.default_bet_size,
            last_payout: Decimal::ZERO,
            total_won: Decimal::ZERO,
            total_wager: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_cover_bet(&self) -> bool {
        self.balance >= self.bet_size
    }

    /// Debit the current bet. Leaves the account untouched when the
    /// balance cannot cover it.
    pub fn place_bet(&mut self) -> Result<Decimal, SlotsError> {
        if !self.can_cover_bet() {
            return Err(SlotsError::InsufficientBalance {
                needed: self.bet_size,
                available: self.balance,
            });
        }
        let bet = self.bet_size;
        self.balance -= bet;
        self.total_wager += bet;
        self.updated_at = Utc::now();
        Ok(bet)
    }

    /// Apply a spin's payout. A zero payout only resets `last_payout`.
    pub fn settle(&mut self, payout: Decimal) {
        self.last_payout = payout;
        if payout > Decimal::ZERO {
            self.balance += payout;
            self.total_won += payout;
        }
        self.updated_at = Utc::now();
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            balance: format_money(self.balance),
            bet_size: format_money(self.bet_size),
            last_payout: if self.last_payout.is_zero() {
                "N/A".to_string()
            } else {
                format_money(self.last_payout)
            },
            total_won: format_money(self.total_won),
            total_wager: format_money(self.total_wager),
        }
    }
}

/// Client-facing view of an account: every amount as a 2-dp string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: String,
    pub bet_size: String,
    pub last_payout: String,
    pub total_won: String,
    pub total_wager: String,
}

/// Format an amount with exactly two decimal places.
pub fn format_money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

// ---------------------------------------------------------------------------
// Game rules
// ---------------------------------------------------------------------------

/// Monetary parameters shared by the ledgers and the web layer.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRules {
    pub starting_balance: Decimal,
    pub default_bet_size: Decimal,
    pub min_bet_size: Decimal,
    pub max_bet_size: Decimal,
    pub machine_opening_balance: Decimal,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            starting_balance: dec!(1000.00),
            default_bet_size: dec!(10.00),
            min_bet_size: dec!(5.00),
            max_bet_size: dec!(100.00),
            machine_opening_balance: dec!(10000.00),
        }
    }
}

impl GameRules {
    /// Check a requested bet size against the table limits.
    pub fn validate_bet_size(&self, bet_size: Decimal) -> Result<Decimal, SlotsError> {
        let bet_size = bet_size.round_dp(2);
        if bet_size < self.min_bet_size || bet_size > self.max_bet_size {
            return Err(SlotsError::InvalidBetSize {
                min: self.min_bet_size,
                max: self.max_bet_size,
            });
        }
        Ok(bet_size)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SLOTS.
#[derive(Debug, thiserror::Error)]
pub enum SlotsError {
    #[error("Insufficient balance: need ${needed:.2}, have ${available:.2}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("Only POST requests allowed")]
    InvalidMethod,

    #[error("Bet size must be between {min:.2} and {max:.2}")]
    InvalidBetSize { min: Decimal, max: Decimal },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Ledger commit failed: {0}")]
    LedgerCommit(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type SlotsResult<T> = Result<T, SlotsError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
