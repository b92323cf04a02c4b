//! Score records, leaderboard ranking and per-player history.

use crate::error::{CoreError, CoreResult};
use crate::game::TerminalStats;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
#[cfg(not(all(target_arch = "wasm32", target_os = "unknown")))]
use std::time::{SystemTime, UNIX_EPOCH};

pub type UserId = u64;

/// Default number of leaderboard rows
pub const LEADERBOARD_LIMIT: usize = 20;

/// History rows per page
pub const HISTORY_PAGE_SIZE: usize = 20;

/// Seconds since the unix epoch
#[cfg(not(all(target_arch = "wasm32", target_os = "unknown")))]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Seconds since the unix epoch, from the browser clock
#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
pub fn unix_now() -> u64 {
    (js_sys::Date::now() / 1000.0) as u64
}

/// One finished (or manually submitted) game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub user_id: UserId,
    pub score: u64,
    pub max_tile: u32,
    pub moves: u32,
    /// Unix seconds
    pub created_at: u64,
}

impl ScoreRecord {
    pub fn new(user_id: UserId, stats: TerminalStats, created_at: u64) -> Self {
        Self {
            user_id,
            score: stats.score,
            max_tile: stats.max_tile,
            moves: stats.moves,
            created_at,
        }
    }
}

/// Check a manually submitted score. Values arrive signed because they come
/// from untrusted input.
pub fn validate_submission(score: i64, max_tile: i64, moves: i64) -> CoreResult<TerminalStats> {
    let score = u64::try_from(score)
        .map_err(|_| CoreError::InvalidScore(format!("score {} is negative", score)))?;
    let max_tile = u32::try_from(max_tile)
        .ok()
        .filter(|&t| t >= 2 && t.is_power_of_two())
        .ok_or_else(|| {
            CoreError::InvalidScore(format!("max tile {} is not a tile value", max_tile))
        })?;
    let moves = u32::try_from(moves)
        .map_err(|_| CoreError::InvalidScore(format!("move count {} is out of range", moves)))?;
    Ok(TerminalStats {
        score,
        max_tile,
        moves,
    })
}

/// Leaderboard order: score desc, max tile desc, moves asc, oldest first
pub fn rank_order(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    b.score
        .cmp(&a.score)
        .then(b.max_tile.cmp(&a.max_tile))
        .then(a.moves.cmp(&b.moves))
        .then(a.created_at.cmp(&b.created_at))
}

/// A leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedScore {
    /// 1-based
    pub rank: usize,
    pub record: ScoreRecord,
}

/// Each player's best record, ranked, truncated to `limit`
pub fn leaderboard(records: &[ScoreRecord], limit: usize) -> Vec<RankedScore> {
    let mut best: HashMap<UserId, &ScoreRecord> = HashMap::new();
    for record in records {
        best.entry(record.user_id)
            .and_modify(|current| {
                if rank_order(record, *current) == Ordering::Less {
                    *current = record;
                }
            })
            .or_insert(record);
    }

    let mut rows: Vec<&ScoreRecord> = best.into_values().collect();
    rows.sort_by(|a, b| rank_order(a, b).then(a.user_id.cmp(&b.user_id)));
    rows.into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, record)| RankedScore {
            rank: i + 1,
            record: record.clone(),
        })
        .collect()
}

/// One page of a player's history, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// 1-based
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub records: Vec<ScoreRecord>,
}

impl HistoryPage {
    pub fn pages(&self) -> usize {
        self.total.div_ceil(self.per_page.max(1))
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages()
    }
}

/// Page `page` (1-based, clamped to at least 1) of `user`'s games.
/// A page past the end is empty rather than an error.
pub fn history_page(
    records: &[ScoreRecord],
    user: UserId,
    page: usize,
    per_page: usize,
) -> HistoryPage {
    let page = page.max(1);
    let per_page = per_page.max(1);

    // Later inserts win ties on the timestamp
    let mut mine: Vec<&ScoreRecord> = records.iter().filter(|r| r.user_id == user).rev().collect();
    mine.sort_by_key(|r| Reverse(r.created_at));

    let total = mine.len();
    let records = mine
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .cloned()
        .collect();
    HistoryPage {
        page,
        per_page,
        total,
        records,
    }
}

/// Aggregate stats over a player's games
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_games: usize,
    pub best_score: u64,
    pub best_tile: u32,
    /// Rounded to one decimal
    pub avg_score: f64,
    pub total_moves: u64,
}

pub fn history_stats(records: &[ScoreRecord], user: UserId) -> HistoryStats {
    let mine: Vec<&ScoreRecord> = records.iter().filter(|r| r.user_id == user).collect();
    if mine.is_empty() {
        return HistoryStats::default();
    }
    let total_score: u64 = mine.iter().map(|r| r.score).sum();
    let avg = total_score as f64 / mine.len() as f64;
    HistoryStats {
        total_games: mine.len(),
        best_score: mine.iter().map(|r| r.score).max().unwrap_or(0),
        best_tile: mine.iter().map(|r| r.max_tile).max().unwrap_or(0),
        avg_score: (avg * 10.0).round() / 10.0,
        total_moves: mine.iter().map(|r| u64::from(r.moves)).sum(),
    }
}
