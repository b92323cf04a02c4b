//! Grid primitives: the square tile matrix and the row transforms that every
//! directional move is built from.
//!
//! All four moves reduce to "slide left": the grid is re-oriented so the
//! requested direction points left, each row is compressed and merged, and
//! the inverse orientation is applied.

use crate::error::{CoreError, CoreResult};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default board edge length
pub const DEFAULT_SIZE: usize = 4;

/// Largest accepted board edge length
pub const MAX_SIZE: usize = 8;

/// Largest tile value. Two of these never merge, so a doubled tile always
/// fits in a `u32`.
pub const MAX_TILE_VALUE: u32 = 1 << 30;

/// Probability that a spawned tile is a 2 (otherwise 4)
pub const SPAWN_TWO_PROBABILITY: f64 = 0.9;

/// A cell position on the grid (0-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// A tile placed by a spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnedTile {
    pub row: usize,
    pub col: usize,
    pub value: u32,
}

/// Result of sliding a single row to the left
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMerge {
    /// The row after the operation
    pub row: Vec<u32>,
    /// Indices (in merged-row coordinates) where two tiles combined
    pub merged: Vec<usize>,
    /// Sum of the newly created tile values
    pub score: u64,
}

/// An N x N board of tile values. `0` is an empty cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Grid {
    rows: Vec<Vec<u32>>,
}

impl<'de> Deserialize<'de> for Grid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows = Vec::<Vec<u32>>::deserialize(deserializer)?;
        Grid::from_rows(rows).map_err(serde::de::Error::custom)
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::empty(DEFAULT_SIZE)
    }
}

/// Whether a value may appear in a cell
pub fn is_tile_value(value: u32) -> bool {
    value == 0 || (value >= 2 && value <= MAX_TILE_VALUE && value.is_power_of_two())
}

/// Whether two neighbouring cells combine on a move
fn mergeable(a: u32, b: u32) -> bool {
    a != 0 && a == b && a < MAX_TILE_VALUE
}

impl Grid {
    /// A size x size grid of zeros
    pub fn empty(size: usize) -> Self {
        Self {
            rows: vec![vec![0; size]; size],
        }
    }

    /// Build a grid from explicit rows, validating shape and tile values
    pub fn from_rows(rows: Vec<Vec<u32>>) -> CoreResult<Self> {
        let size = rows.len();
        if size == 0 {
            return Err(CoreError::InvalidGrid("grid has no rows".into()));
        }
        if size > MAX_SIZE {
            return Err(CoreError::InvalidGrid(format!(
                "{} rows exceeds the largest board ({})",
                size, MAX_SIZE
            )));
        }
        for (r, row) in rows.iter().enumerate() {
            if row.len() != size {
                return Err(CoreError::InvalidGrid(format!(
                    "row {} has {} cells, expected {}",
                    r,
                    row.len(),
                    size
                )));
            }
            if let Some(&bad) = row.iter().find(|&&v| !is_tile_value(v)) {
                return Err(CoreError::InvalidGrid(format!(
                    "row {} holds {}, which is not a tile value",
                    r, bad
                )));
            }
        }
        Ok(Self { rows })
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<u32>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<u32>> {
        self.rows
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.row < self.size() && pos.col < self.size()
    }

    /// Value at a position. Panics if out of bounds, like slice indexing.
    pub fn get(&self, pos: Position) -> u32 {
        self.rows[pos.row][pos.col]
    }

    pub(crate) fn set(&mut self, pos: Position, value: u32) {
        debug_assert!(is_tile_value(value));
        self.rows[pos.row][pos.col] = value;
    }

    /// All positions in row-major order
    pub fn positions(&self) -> impl Iterator<Item = Position> {
        let size = self.size();
        (0..size).flat_map(move |row| (0..size).map(move |col| Position::new(row, col)))
    }

    /// Occupied positions in row-major order
    pub fn occupied(&self) -> Vec<Position> {
        self.positions().filter(|&p| self.get(p) != 0).collect()
    }

    pub fn empty_cells(&self) -> Vec<Position> {
        self.positions().filter(|&p| self.get(p) == 0).collect()
    }

    pub fn empty_count(&self) -> usize {
        self.rows.iter().flatten().filter(|&&v| v == 0).count()
    }

    /// Largest tile on the board (0 for an empty board)
    pub fn max_tile(&self) -> u32 {
        self.rows.iter().flatten().copied().max().unwrap_or(0)
    }

    /// Uniformly chosen empty cell, or `None` when the grid is full
    pub fn random_empty_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Position> {
        let empties = self.empty_cells();
        if empties.is_empty() {
            return None;
        }
        Some(empties[rng.gen_range(0..empties.len())])
    }

    /// Place a 2 (90%) or 4 (10%) in a random empty cell
    pub fn spawn_tile<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<SpawnedTile> {
        let pos = self.random_empty_cell(rng)?;
        let value = if rng.gen::<f64>() < SPAWN_TWO_PROBABILITY {
            2
        } else {
            4
        };
        self.set(pos, value);
        Some(SpawnedTile {
            row: pos.row,
            col: pos.col,
            value,
        })
    }

    /// Whether any move is still possible: an empty cell or two mergeable
    /// horizontal/vertical neighbours.
    pub fn has_legal_move(&self) -> bool {
        if self.empty_count() > 0 {
            return true;
        }
        let size = self.size();
        for r in 0..size {
            for c in 0..size {
                let v = self.rows[r][c];
                if c + 1 < size && mergeable(v, self.rows[r][c + 1]) {
                    return true;
                }
                if r + 1 < size && mergeable(v, self.rows[r + 1][c]) {
                    return true;
                }
            }
        }
        false
    }

    pub fn transpose(&self) -> Grid {
        let size = self.size();
        let rows = (0..size)
            .map(|c| (0..size).map(|r| self.rows[r][c]).collect())
            .collect();
        Grid { rows }
    }

    pub fn reverse_rows(&self) -> Grid {
        let rows = self
            .rows
            .iter()
            .map(|row| row.iter().rev().copied().collect())
            .collect();
        Grid { rows }
    }

    pub(crate) fn row(&self, r: usize) -> &[u32] {
        &self.rows[r]
    }

    pub(crate) fn replace_row(&mut self, r: usize, row: Vec<u32>) {
        debug_assert_eq!(row.len(), self.size());
        self.rows[r] = row;
    }
}

impl std::fmt::Display for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self.max_tile().max(1).to_string().len();
        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|&v| {
                    if v == 0 {
                        format!("{:>width$}", ".", width = width)
                    } else {
                        format!("{:>width$}", v, width = width)
                    }
                })
                .collect();
            writeln!(f, "{}", cells.join(" "))?;
        }
        Ok(())
    }
}

/// Drop zeros, keep order, pad with zeros to the original length
pub fn compress_row(row: &[u32]) -> Vec<u32> {
    let mut out: Vec<u32> = row.iter().copied().filter(|&v| v != 0).collect();
    out.resize(row.len(), 0);
    out
}

/// One left-to-right merge pass.
///
/// Equal non-zero neighbours combine into the left cell and the right cell
/// is zeroed. A freshly doubled tile is never compared against its next
/// neighbour in the same pass, so `[2, 2, 4]` becomes `[4, 0, 4]`, not `[8, 0, 0]`.
/// Tiles already at [`MAX_TILE_VALUE`] stay put.
pub fn merge_row(row: &[u32]) -> RowMerge {
    let mut out = row.to_vec();
    let mut merged = Vec::new();
    let mut score = 0u64;
    let mut i = 0;
    while i + 1 < out.len() {
        if mergeable(out[i], out[i + 1]) {
            out[i] *= 2;
            out[i + 1] = 0;
            score += u64::from(out[i]);
            merged.push(i);
            i += 2;
        } else {
            i += 1;
        }
    }
    RowMerge {
        row: out,
        merged,
        score,
    }
}

/// compress -> merge -> compress
///
/// The second compress closes the gap a merge leaves behind. Merge indices
/// are reported as the merge pass saw them (compressed-row coordinates),
/// not re-located after the final compress.
pub fn operate_row(row: &[u32]) -> RowMerge {
    let merge = merge_row(&compress_row(row));
    RowMerge {
        row: compress_row(&merge.row),
        merged: merge.merged,
        score: merge.score,
    }
}
