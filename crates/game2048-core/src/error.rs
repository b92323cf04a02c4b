//! Error types for the 2048 engine and its storage boundary

use thiserror::Error;

/// Reasons a tile swap is rejected. Nothing is mutated when any of these is returned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapError {
    #[error("position is outside the board")]
    OutOfBounds,

    #[error("cannot swap a tile with itself")]
    SameCell,

    #[error("cannot swap an empty cell")]
    EmptyCell,

    #[error("game is already over")]
    GameOver,
}

impl SwapError {
    /// Stable reason code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfBounds => "out_of_bounds",
            Self::SameCell => "same_cell",
            Self::EmptyCell => "empty_cell",
            Self::GameOver => "game_over",
        }
    }
}

/// Failures reported by a session store or score sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage failure: {0}")]
    Backend(String),
}

/// Main error type for the engine crate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    #[error("invalid direction '{0}' (expected up, down, left or right)")]
    InvalidDirection(String),

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("invalid score submission: {0}")]
    InvalidScore(String),

    #[error("tile swap rejected: {0}")]
    Swap(#[from] SwapError),

    #[error("no game in progress")]
    NoActiveGame,

    #[error("premium subscription required")]
    PremiumRequired,

    #[error("no move available to suggest")]
    NoHint,

    #[error("session blob version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("corrupt session blob: {0}")]
    CorruptSession(String),

    #[error("session codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type CoreResult<T> = Result<T, CoreError>;
