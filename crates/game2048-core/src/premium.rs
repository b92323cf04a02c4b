//! Premium board mutators: hint, shuffle and tile swap.
//!
//! None of these consume a move, change the score, or spawn a tile.
//! Entitlement is checked by the caller.

use crate::error::SwapError;
use crate::game::{slide, Direction, GameState};
use crate::grid::Position;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A tile after a successful swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwappedTile {
    pub row: usize,
    pub col: usize,
    pub value: u32,
}

impl GameState {
    /// First direction in left, right, up, down order that would change the
    /// board. `None` when nothing moves or the game is already over.
    pub fn hint(&self) -> Option<Direction> {
        if self.game_over {
            return None;
        }
        Direction::PRIORITY
            .into_iter()
            .find(|&dir| slide(&self.grid, dir).changed)
    }

    /// Permute the occupied cells' values uniformly at random.
    ///
    /// Empty cells stay empty and occupied cells stay occupied. Returns
    /// `None` on a finished game.
    pub fn shuffle<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Self> {
        if self.game_over {
            return None;
        }
        let occupied = self.grid.occupied();
        let mut values: Vec<u32> = occupied.iter().map(|&p| self.grid.get(p)).collect();
        values.shuffle(rng);

        let mut next = self.clone();
        for (pos, value) in occupied.into_iter().zip(values) {
            next.grid.set(pos, value);
        }
        Some(next)
    }

    /// Exchange the values of two occupied cells
    pub fn swap_tiles(
        &self,
        first: Position,
        second: Position,
    ) -> Result<(Self, [SwappedTile; 2]), SwapError> {
        if !self.grid.in_bounds(first) || !self.grid.in_bounds(second) {
            return Err(SwapError::OutOfBounds);
        }
        if first == second {
            return Err(SwapError::SameCell);
        }
        let a = self.grid.get(first);
        let b = self.grid.get(second);
        if a == 0 || b == 0 {
            return Err(SwapError::EmptyCell);
        }
        if self.game_over {
            return Err(SwapError::GameOver);
        }

        let mut next = self.clone();
        next.grid.set(first, b);
        next.grid.set(second, a);
        let tiles = [
            SwappedTile {
                row: first.row,
                col: first.col,
                value: b,
            },
            SwappedTile {
                row: second.row,
                col: second.col,
                value: a,
            },
        ];
        Ok((next, tiles))
    }
}
