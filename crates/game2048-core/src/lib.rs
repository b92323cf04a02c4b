//! 2048 game engine
//!
//! This crate provides the board rules (slide, merge, spawn, game over),
//! single-level undo, the premium mutators (hint, shuffle, swap), a versioned
//! session codec, and the `GameService` that runs them against pluggable
//! session, score and entitlement backends.

mod codec;
mod error;
mod game;
mod grid;
mod premium;
mod scores;
mod session;

pub use codec::{decode, encode, CURRENT_VERSION};
pub use error::{CoreError, CoreResult, StoreError, SwapError};
pub use game::{Direction, GameState, MoveResult, Snapshot, TerminalStats};
pub use grid::{
    compress_row, is_tile_value, merge_row, operate_row, Grid, Position, RowMerge, SpawnedTile,
    DEFAULT_SIZE, MAX_SIZE, MAX_TILE_VALUE, SPAWN_TWO_PROBABILITY,
};
pub use premium::SwappedTile;
pub use scores::{
    history_page, history_stats, leaderboard, rank_order, unix_now, validate_submission,
    HistoryPage, HistoryStats, RankedScore, ScoreRecord, UserId, HISTORY_PAGE_SIZE,
    LEADERBOARD_LIMIT,
};
pub use session::{
    Entitlements, GameService, Loaded, MemoryScoreBook, MemorySessionStore, PlayOutcome,
    ScoreSink, SessionStore,
};
