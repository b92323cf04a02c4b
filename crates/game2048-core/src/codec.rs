//! Session codec: a versioned JSON record for a `GameState`.
//!
//! Version 0 is the unversioned field-copy blob written by earlier builds
//! (`size`, `grid`, `score`, `moves`, `game_over`, `last_state`). It decodes
//! through the same record with every field defaulted, so a blob missing a
//! field resumes with engine defaults instead of failing.

use crate::error::{CoreError, CoreResult};
use crate::game::{GameState, Snapshot};
use crate::grid::{Grid, DEFAULT_SIZE, MAX_SIZE};
use serde::{Deserialize, Serialize};

/// Version written by `encode`
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    #[serde(default)]
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
    #[serde(default)]
    grid: Option<Vec<Vec<u32>>>,
    #[serde(default)]
    score: u64,
    #[serde(default)]
    moves: u32,
    #[serde(default, alias = "gameOver")]
    game_over: bool,
    #[serde(default)]
    last_state: Option<SnapshotRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    grid: Vec<Vec<u32>>,
    #[serde(default)]
    score: u64,
    #[serde(default)]
    moves: u32,
}

impl From<&Snapshot> for SnapshotRecord {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            grid: snapshot.grid.rows().to_vec(),
            score: snapshot.score,
            moves: snapshot.moves,
        }
    }
}

/// Serialize a state into a session blob
pub fn encode(state: &GameState) -> CoreResult<String> {
    let record = SessionRecord {
        version: CURRENT_VERSION,
        size: Some(state.grid.size()),
        grid: Some(state.grid.rows().to_vec()),
        score: state.score,
        moves: state.moves,
        game_over: state.game_over,
        last_state: state.last_state.as_ref().map(SnapshotRecord::from),
    };
    Ok(serde_json::to_string(&record)?)
}

/// Rebuild a state from a session blob.
///
/// Fails on malformed JSON, a version newer than `CURRENT_VERSION`, or a
/// board that is not a valid grid (including one larger than `MAX_SIZE` or
/// holding a tile above `MAX_TILE_VALUE`). An unusable snapshot is dropped rather
/// than failing the whole session.
pub fn decode(blob: &str) -> CoreResult<GameState> {
    let record: SessionRecord = serde_json::from_str(blob)?;
    if record.version > CURRENT_VERSION {
        return Err(CoreError::UnsupportedVersion {
            found: record.version,
            supported: CURRENT_VERSION,
        });
    }
    if record.version == 0 {
        log::debug!("decoding unversioned session blob");
    }

    let grid = match record.grid {
        Some(rows) => Grid::from_rows(rows).map_err(|e| CoreError::CorruptSession(e.to_string()))?,
        None => match record.size.unwrap_or(DEFAULT_SIZE) {
            size @ 1..=MAX_SIZE => Grid::empty(size),
            size => {
                return Err(CoreError::CorruptSession(format!(
                    "declared size {} is outside 1..={}",
                    size, MAX_SIZE
                )))
            }
        },
    };
    if let Some(size) = record.size {
        if size != grid.size() {
            return Err(CoreError::CorruptSession(format!(
                "declared size {} but grid is {}x{}",
                size,
                grid.size(),
                grid.size()
            )));
        }
    }

    let last_state = record
        .last_state
        .and_then(|snap| match Grid::from_rows(snap.grid) {
            Ok(g) if g.size() == grid.size() => Some(Snapshot {
                grid: g,
                score: snap.score,
                moves: snap.moves,
            }),
            Ok(g) => {
                log::warn!(
                    "dropping undo snapshot: size {} does not match board size {}",
                    g.size(),
                    grid.size()
                );
                None
            }
            Err(e) => {
                log::warn!("dropping undo snapshot: {}", e);
                None
            }
        });

    Ok(GameState {
        grid,
        score: record.score,
        moves: record.moves,
        game_over: record.game_over,
        last_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Direction;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_round_trip_with_snapshot() {
        let mut rng = StdRng::seed_from_u64(11);
        let (state, _) = GameState::setup(4, &mut rng);
        let (moved, result) = Direction::PRIORITY
            .into_iter()
            .map(|d| state.step(d, &mut rng))
            .find(|(_, r)| r.changed)
            .unwrap();
        assert!(result.changed);
        assert!(moved.can_undo());

        let blob = encode(&moved).unwrap();
        assert_eq!(decode(&blob).unwrap(), moved);
    }

    #[test]
    fn test_encode_is_versioned() {
        let blob = encode(&GameState::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(value["version"], CURRENT_VERSION);
        assert_eq!(value["size"], 4);
    }

    #[test]
    fn test_decode_legacy_blob() {
        let blob = r#"{
            "size": 4,
            "grid": [[2,0,0,0],[0,0,0,0],[0,0,4,0],[0,0,0,0]],
            "score": 8,
            "moves": 3,
            "game_over": false,
            "last_state": {"grid": [[2,2,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,0]], "score": 4, "moves": 2}
        }"#;
        let state = decode(blob).unwrap();
        assert_eq!(state.score, 8);
        assert_eq!(state.moves, 3);
        assert!(state.can_undo());
        assert_eq!(state.undo().score, 4);
    }

    #[test]
    fn test_decode_missing_fields_defaults() {
        let state = decode(r#"{"grid": [[0,2],[0,0]]}"#).unwrap();
        assert_eq!(state.grid.size(), 2);
        assert_eq!(state.score, 0);
        assert_eq!(state.moves, 0);
        assert!(!state.game_over);
        assert!(!state.can_undo());

        let state = decode("{}").unwrap();
        assert_eq!(state, GameState::default());
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let state = decode(r#"{"version":1,"grid":[[0,0],[0,0]],"theme":"dark"}"#).unwrap();
        assert_eq!(state.grid.size(), 2);
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let err = decode(r#"{"version": 9}"#).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnsupportedVersion { found: 9, supported: CURRENT_VERSION }
        ));
    }

    #[test]
    fn test_decode_rejects_bad_grid() {
        assert!(matches!(
            decode(r#"{"grid": [[3,0],[0,0]]}"#).unwrap_err(),
            CoreError::CorruptSession(_)
        ));
        assert!(matches!(
            decode(r#"{"size": 4, "grid": [[0,0],[0,0]]}"#).unwrap_err(),
            CoreError::CorruptSession(_)
        ));
        assert!(matches!(decode("not json").unwrap_err(), CoreError::Codec(_)));
    }

    #[test]
    fn test_decode_rejects_oversized_tile() {
        let err = decode(r#"{"version":1,"grid":[[2147483648,2147483648],[0,0]]}"#).unwrap_err();
        assert!(matches!(err, CoreError::CorruptSession(_)));

        let state = decode(r#"{"version":1,"grid":[[1073741824,1073741824],[2,4]]}"#).unwrap();
        let (after, result) = state.step(Direction::Left, &mut StdRng::seed_from_u64(1));
        assert!(!result.changed);
        assert_eq!(after.grid, state.grid);
        assert!(!after.grid.has_legal_move());
    }

    #[test]
    fn test_decode_rejects_oversized_board() {
        assert!(matches!(
            decode(r#"{"version":1,"size":100000}"#).unwrap_err(),
            CoreError::CorruptSession(_)
        ));
        assert!(matches!(
            decode(r#"{"version":1,"size":0}"#).unwrap_err(),
            CoreError::CorruptSession(_)
        ));
        let rows = vec![vec![0u32; MAX_SIZE + 1]; MAX_SIZE + 1];
        let blob = serde_json::json!({ "version": 1, "grid": rows }).to_string();
        assert!(matches!(decode(&blob).unwrap_err(), CoreError::CorruptSession(_)));
        assert_eq!(decode(r#"{"size":8}"#).unwrap().grid.size(), MAX_SIZE);
    }

    #[test]
    fn test_mismatched_snapshot_is_dropped() {
        let blob = r#"{"grid": [[2,0],[0,0]], "last_state": {"grid": [[0,0,0],[0,0,0],[0,0,0]]}}"#;
        let state = decode(blob).unwrap();
        assert!(!state.can_undo());
    }
}
