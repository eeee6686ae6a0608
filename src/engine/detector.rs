//! Win detection.
//!
//! Rows are scanned left to right for runs of three or more identical,
//! strictly consecutive symbols. At most one win is kept per row.

use tracing::trace;

use crate::types::{Grid, Symbol, WinEntry, WinRecord};

/// Shortest run that pays.
pub const MIN_RUN: usize = 3;

/// Row-major view of the grid: `view[row][reel]`.
///
/// Built by rotating the reel-major grid a quarter turn and then reversing
/// every resulting row. The two flips cancel, so the view always equals a
/// plain transpose; existing clients depend on this row numbering.
pub fn horizontal_view(grid: &Grid) -> Vec<Vec<Symbol>> {
    let reels = grid.reels();
    let rows = reels.first().map_or(0, |reel| reel.len());

    // rotated[row][reels.len() - 1 - reel] = reels[reel][row]
    let rotated: Vec<Vec<Symbol>> = (0..rows)
        .map(|row| reels.iter().rev().map(|reel| reel[row]).collect())
        .collect();

    rotated
        .into_iter()
        .map(|mut line| {
            line.reverse();
            line
        })
        .collect()
}

/// Longest run of strictly consecutive values in an ascending index list.
///
/// The first maximal run wins ties. A list without any consecutive pair
/// yields an empty slice.
pub fn longest_run(indices: &[usize]) -> &[usize] {
    let (mut current, mut longest) = (1usize, 1usize);
    let (mut start, mut end) = (0usize, 0usize);

    for i in 0..indices.len().saturating_sub(1) {
        if indices[i] + 1 == indices[i + 1] {
            current += 1;
            if current > longest {
                longest = current;
                start = i + 2 - current;
                end = i + 2;
            }
        } else {
            current = 1;
        }
    }

    &indices[start..end]
}

/// Find every winning row in the grid. Rows are reported 1-based.
pub fn detect_wins(grid: &Grid) -> WinRecord {
    let mut wins = WinRecord::new();

    for (row_idx, row) in horizontal_view(grid).iter().enumerate() {
        for sym in row {
            let occurrences = row.iter().filter(|s| *s == sym).count();
            if occurrences < MIN_RUN {
                continue;
            }

            let columns: Vec<usize> = row
                .iter()
                .enumerate()
                .filter(|(_, s)| *s == sym)
                .map(|(col, _)| col)
                .collect();

            let run = longest_run(&columns);
            if run.len() >= MIN_RUN {
                trace!(row = row_idx + 1, symbol = %sym, run = ?run, "Winning run");
                wins.record(
                    row_idx + 1,
                    WinEntry {
                        symbol: *sym,
                        columns: run.to_vec(),
                    },
                );
            }
        }
    }

    wins
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
