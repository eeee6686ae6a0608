//! Spin engine — grid generation → win detection → payout → settlement.

pub mod detector;
pub mod grid;
pub mod payout;
pub mod spin;

pub use detector::{detect_wins, horizontal_view, longest_run};
pub use grid::{GridSource, RandomGrid, ScriptedGrid};
pub use payout::calculate_payout;
pub use spin::{SpinEngine, SpinResponse, SpinResult};
