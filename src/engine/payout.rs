//! Payout calculation: the bet times the total length of all winning runs.

use rust_decimal::Decimal;

use crate::types::WinRecord;

/// Payout for a spin. No wins pays zero.
pub fn calculate_payout(wins: &WinRecord, bet_size: Decimal) -> Decimal {
    Decimal::from(wins.multiplier()) * bet_size
}
