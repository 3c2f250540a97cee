//! Pure board logic for Ultimate Tic-Tac-Toe.
//!
//! No room, connection, or timing state lives here; everything operates on
//! plain board values so the room state machine can validate fully before
//! mutating.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A player mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

/// One cell: empty or claimed. Once set, a cell never changes until reset.
pub type Cell = Option<Mark>;

/// A single 3x3 sub-board, row-major.
pub type LocalBoard = [Cell; 9];

/// All nine sub-boards, index-aligned with the macro board.
pub type Board = [LocalBoard; 9];

/// The macro 3x3 board of decided sub-board outcomes. A tied sub-board
/// leaves its cell empty: ties do not claim the cell.
pub type GlobalBoard = [Cell; 9];

/// Result of scanning a 3x3 board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Won(Mark),
    Tie,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cell is already occupied")]
pub struct CellOccupied;

/// The 8 winning lines of a 3x3 board: rows, columns, diagonals.
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Scan all eight lines of a 3x3 board (local or global).
///
/// Returns the mark holding a complete line, `Tie` if no line is complete
/// and every cell is occupied, `None` otherwise.
pub fn check_winner(cells: &[Cell; 9]) -> Option<Outcome> {
    for [a, b, c] in LINES {
        if let Some(mark) = cells[a] {
            if cells[b] == Some(mark) && cells[c] == Some(mark) {
                return Some(Outcome::Won(mark));
            }
        }
    }
    if cells.iter().all(|cell| cell.is_some()) {
        Some(Outcome::Tie)
    } else {
        None
    }
}

/// Place `mark` at (`sub`, `cell`), failing if the cell is taken.
///
/// The board is untouched on error.
pub fn apply_move(
    board: &mut Board,
    sub: usize,
    cell: usize,
    mark: Mark,
) -> Result<(), CellOccupied> {
    if board[sub][cell].is_some() {
        return Err(CellOccupied);
    }
    board[sub][cell] = Some(mark);
    Ok(())
}

/// The sub-board the next player is forced into, or `None` for a free
/// choice.
///
/// The sub-board addressed by the last move's cell is forced unless it is
/// already full or its global cell is decided. A tied sub-board never sets
/// its global cell, so a tie suppresses redirection only by being full.
pub fn next_active_board(
    board: &Board,
    global: &GlobalBoard,
    last_cell: usize,
) -> Option<usize> {
    let full = board[last_cell].iter().all(|cell| cell.is_some());
    if full || global[last_cell].is_some() {
        None
    } else {
        Some(last_cell)
    }
}
