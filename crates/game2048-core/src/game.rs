//! Game state, the move orchestrator and single-level undo.
//!
//! `GameState` is a plain value. Every operation borrows the current state
//! and returns the next one, so a caller that decodes a state from a session
//! blob, applies one operation, and re-encodes the result never shares a
//! grid between two generations.

use crate::error::CoreError;
use crate::grid::{operate_row, Grid, Position, SpawnedTile, DEFAULT_SIZE};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four move directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Hint priority order
    pub const PRIORITY: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }

    fn transposes(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }

    fn reverses(self) -> bool {
        matches!(self, Direction::Right | Direction::Down)
    }

    /// Rotate the grid so this direction becomes "left"
    fn orient(self, grid: &Grid) -> Grid {
        let mut g = if self.transposes() {
            grid.transpose()
        } else {
            grid.clone()
        };
        if self.reverses() {
            g = g.reverse_rows();
        }
        g
    }

    /// Undo `orient`
    fn restore(self, grid: &Grid) -> Grid {
        let mut g = if self.reverses() {
            grid.reverse_rows()
        } else {
            grid.clone()
        };
        if self.transposes() {
            g = g.transpose();
        }
        g
    }

    /// Map a (row, col) in oriented space back to the original grid
    fn to_original(self, size: usize, row: usize, col: usize) -> Position {
        let col = if self.reverses() { size - 1 - col } else { col };
        if self.transposes() {
            Position::new(col, row)
        } else {
            Position::new(row, col)
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(CoreError::InvalidDirection(other.to_string())),
        }
    }
}

/// The single retained pre-move state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub grid: Grid,
    pub score: u64,
    pub moves: u32,
}

/// Outcome of a directional move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResult {
    pub grid: Grid,
    pub score: u64,
    pub moves: u32,
    pub changed: bool,
    /// Merge points in original grid coordinates, in row-processing order
    pub merged_cells: Vec<Position>,
    pub new_tile: Option<SpawnedTile>,
}

/// Final stats of a finished game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalStats {
    pub score: u64,
    pub max_tile: u32,
    pub moves: u32,
}

/// Result of sliding every row in one direction, before spawning
#[derive(Debug, Clone)]
pub(crate) struct Slide {
    pub grid: Grid,
    pub changed: bool,
    pub merged_cells: Vec<Position>,
    pub gained: u64,
}

/// Slide all rows toward `direction`
pub(crate) fn slide(grid: &Grid, direction: Direction) -> Slide {
    let size = grid.size();
    let mut oriented = direction.orient(grid);
    let mut changed = false;
    let mut merged_cells = Vec::new();
    let mut gained = 0u64;

    for r in 0..size {
        let op = operate_row(oriented.row(r));
        if op.row.as_slice() != oriented.row(r) {
            changed = true;
        }
        gained += op.score;
        merged_cells.extend(op.merged.iter().map(|&c| direction.to_original(size, r, c)));
        oriented.replace_row(r, op.row);
    }

    Slide {
        grid: direction.restore(&oriented),
        changed,
        merged_cells,
        gained,
    }
}

/// Full state of one game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub grid: Grid,
    pub score: u64,
    pub moves: u32,
    pub game_over: bool,
    pub last_state: Option<Snapshot>,
}

impl Default for GameState {
    fn default() -> Self {
        Self::blank(DEFAULT_SIZE)
    }
}

impl GameState {
    /// A state with an empty board and no tiles
    pub fn blank(size: usize) -> Self {
        Self::from_grid(Grid::empty(size))
    }

    /// Wrap an existing grid as a fresh game (score and moves at zero)
    pub fn from_grid(grid: Grid) -> Self {
        Self {
            grid,
            score: 0,
            moves: 0,
            game_over: false,
            last_state: None,
        }
    }

    /// Start a new game: empty board plus two spawned tiles
    pub fn setup<R: Rng + ?Sized>(size: usize, rng: &mut R) -> (Self, Vec<SpawnedTile>) {
        let mut state = Self::blank(size);
        let new_tiles = [state.grid.spawn_tile(rng), state.grid.spawn_tile(rng)]
            .into_iter()
            .flatten()
            .collect();
        (state, new_tiles)
    }

    pub fn can_undo(&self) -> bool {
        self.last_state.is_some()
    }

    pub fn max_tile(&self) -> u32 {
        self.grid.max_tile()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            grid: self.grid.clone(),
            score: self.score,
            moves: self.moves,
        }
    }

    fn unchanged_result(&self) -> MoveResult {
        MoveResult {
            grid: self.grid.clone(),
            score: self.score,
            moves: self.moves,
            changed: false,
            merged_cells: Vec::new(),
            new_tile: None,
        }
    }

    /// Apply a directional move.
    ///
    /// A finished game is returned untouched. A move that changes nothing
    /// clears the undo slot and leaves grid, score and moves alone. A move
    /// that changes the board snapshots the prior state, adds the merge
    /// score, bumps the move count and spawns one tile.
    pub fn step<R: Rng + ?Sized>(&self, direction: Direction, rng: &mut R) -> (Self, MoveResult) {
        if self.game_over {
            return (self.clone(), self.unchanged_result());
        }

        let slide = slide(&self.grid, direction);
        if !slide.changed {
            let next = Self {
                last_state: None,
                ..self.clone()
            };
            let result = next.unchanged_result();
            return (next, result);
        }

        let mut next = Self {
            grid: slide.grid,
            score: self.score + slide.gained,
            moves: self.moves + 1,
            game_over: false,
            last_state: Some(self.snapshot()),
        };
        let new_tile = next.grid.spawn_tile(rng);

        log::debug!(
            "move {} gained {} ({} merges), spawn {:?}",
            direction,
            slide.gained,
            slide.merged_cells.len(),
            new_tile
        );

        let result = MoveResult {
            grid: next.grid.clone(),
            score: next.score,
            moves: next.moves,
            changed: true,
            merged_cells: slide.merged_cells,
            new_tile,
        };
        (next, result)
    }

    /// Restore the snapshot taken before the last move. One level only.
    pub fn undo(&self) -> Self {
        match &self.last_state {
            None => self.clone(),
            Some(snapshot) => Self {
                grid: snapshot.grid.clone(),
                score: snapshot.score,
                moves: snapshot.moves,
                game_over: false,
                last_state: None,
            },
        }
    }

    pub fn terminal_stats(&self) -> TerminalStats {
        TerminalStats {
            score: self.score,
            max_tile: self.max_tile(),
            moves: self.moves,
        }
    }

    /// Mark the game over when no move is left and report its final stats
    pub fn check_game_over(&self) -> (Self, Option<TerminalStats>) {
        if self.grid.has_legal_move() {
            return (self.clone(), None);
        }
        let stats = self.terminal_stats();
        let next = Self {
            game_over: true,
            ..self.clone()
        };
        (next, Some(stats))
    }
}
