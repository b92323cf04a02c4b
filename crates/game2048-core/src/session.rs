//! Session boundary: storage traits, in-memory backends and the
//! `GameService` that runs one decode / operate / encode cycle per call.
//!
//! The service holds no game state of its own. Every operation takes the
//! per-session lock for its whole read-modify-write, so two requests on the
//! same session never interleave.

use crate::codec;
use crate::error::{CoreError, CoreResult, StoreError};
use crate::game::{Direction, GameState, MoveResult, TerminalStats};
use crate::grid::{Position, SpawnedTile, DEFAULT_SIZE, MAX_SIZE};
use crate::premium::SwappedTile;
use crate::scores::{unix_now, validate_submission, ScoreRecord, UserId};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Per-session storage slot for encoded game state
pub trait SessionStore: Send + Sync {
    fn load(&self, session: &str) -> Result<Option<String>, StoreError>;

    fn save(&self, session: &str, blob: &str) -> Result<(), StoreError>;

    fn clear(&self, session: &str) -> Result<(), StoreError>;
}

/// Append-only score log
pub trait ScoreSink: Send + Sync {
    fn record(&self, record: ScoreRecord) -> Result<(), StoreError>;

    /// Every stored record, oldest first
    fn records(&self) -> Result<Vec<ScoreRecord>, StoreError>;
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn load(&self, session: &str) -> Result<Option<String>, StoreError> {
        (**self).load(session)
    }

    fn save(&self, session: &str, blob: &str) -> Result<(), StoreError> {
        (**self).save(session, blob)
    }

    fn clear(&self, session: &str) -> Result<(), StoreError> {
        (**self).clear(session)
    }
}

impl<T: ScoreSink + ?Sized> ScoreSink for Arc<T> {
    fn record(&self, record: ScoreRecord) -> Result<(), StoreError> {
        (**self).record(record)
    }

    fn records(&self) -> Result<Vec<ScoreRecord>, StoreError> {
        (**self).records()
    }
}

/// Premium entitlement lookup
pub trait Entitlements: Send + Sync {
    fn is_premium_active(&self, user: UserId) -> bool;
}

impl<F> Entitlements for F
where
    F: Fn(UserId) -> bool + Send + Sync,
{
    fn is_premium_active(&self, user: UserId) -> bool {
        self(user)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ==================== In-memory backends ====================

/// Session store backed by a `HashMap`
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, session: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.blobs).get(session).cloned())
    }

    fn save(&self, session: &str, blob: &str) -> Result<(), StoreError> {
        lock(&self.blobs).insert(session.to_string(), blob.to_string());
        Ok(())
    }

    fn clear(&self, session: &str) -> Result<(), StoreError> {
        lock(&self.blobs).remove(session);
        Ok(())
    }
}

/// Score log held in a `Vec`
#[derive(Debug, Default)]
pub struct MemoryScoreBook {
    records: Mutex<Vec<ScoreRecord>>,
}

impl MemoryScoreBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScoreSink for MemoryScoreBook {
    fn record(&self, record: ScoreRecord) -> Result<(), StoreError> {
        lock(&self.records).push(record);
        Ok(())
    }

    fn records(&self) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(lock(&self.records).clone())
    }
}

// ==================== Service ====================

/// Outcome of `GameService::play`
#[derive(Debug, Clone, PartialEq)]
pub struct PlayOutcome {
    pub state: GameState,
    pub result: MoveResult,
    /// Set when this call ended the game. The score is already recorded and
    /// the session cleared.
    pub finished: Option<TerminalStats>,
}

/// A freshly created or resumed game
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub state: GameState,
    /// Tiles placed by `setup` when a new game was created
    pub new_tiles: Vec<SpawnedTile>,
}

pub struct GameService<S, K, E> {
    sessions: S,
    scores: K,
    entitlements: E,
    size: usize,
    rng: Mutex<StdRng>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: SessionStore, K: ScoreSink, E: Entitlements> GameService<S, K, E> {
    pub fn new(sessions: S, scores: K, entitlements: E) -> Self {
        Self::with_rng(sessions, scores, entitlements, StdRng::from_entropy())
    }

    /// Deterministic spawns and shuffles
    pub fn with_seed(sessions: S, scores: K, entitlements: E, seed: u64) -> Self {
        Self::with_rng(sessions, scores, entitlements, StdRng::seed_from_u64(seed))
    }

    fn with_rng(sessions: S, scores: K, entitlements: E, rng: StdRng) -> Self {
        Self {
            sessions,
            scores,
            entitlements,
            size: DEFAULT_SIZE,
            rng: Mutex::new(rng),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Board size for newly created games, clamped to `2..=MAX_SIZE`
    pub fn board_size(mut self, size: usize) -> Self {
        self.size = size.clamp(2, MAX_SIZE);
        self
    }

    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    pub fn scores(&self) -> &K {
        &self.scores
    }

    pub fn entitlements(&self) -> &E {
        &self.entitlements
    }

    fn session_lock(&self, session: &str) -> Arc<Mutex<()>> {
        lock(&self.locks)
            .entry(session.to_string())
            .or_default()
            .clone()
    }

    fn load_state(&self, session: &str) -> CoreResult<Option<GameState>> {
        match self.sessions.load(session)? {
            Some(blob) => Ok(Some(codec::decode(&blob)?)),
            None => Ok(None),
        }
    }

    fn require_state(&self, session: &str) -> CoreResult<GameState> {
        self.load_state(session)?.ok_or(CoreError::NoActiveGame)
    }

    fn save_state(&self, session: &str, state: &GameState) -> CoreResult<()> {
        let blob = codec::encode(state)?;
        self.sessions.save(session, &blob)?;
        Ok(())
    }

    fn require_premium(&self, user: UserId) -> CoreResult<()> {
        if self.entitlements.is_premium_active(user) {
            Ok(())
        } else {
            log::warn!("user {} attempted a premium action without entitlement", user);
            Err(CoreError::PremiumRequired)
        }
    }

    fn new_game(&self, session: &str) -> CoreResult<Loaded> {
        let (state, new_tiles) = GameState::setup(self.size, &mut *lock(&self.rng));
        self.save_state(session, &state)?;
        log::info!("session {} started a {}x{} game", session, self.size, self.size);
        Ok(Loaded { state, new_tiles })
    }

    /// Resume the stored game, or create and save a fresh one
    pub fn load_or_start(&self, session: &str) -> CoreResult<Loaded> {
        let slot = self.session_lock(session);
        let _held = lock(&slot);
        match self.load_state(session)? {
            Some(state) => Ok(Loaded {
                state,
                new_tiles: Vec::new(),
            }),
            None => self.new_game(session),
        }
    }

    /// Start over, discarding any game in progress
    pub fn start(&self, session: &str) -> CoreResult<Loaded> {
        let slot = self.session_lock(session);
        let _held = lock(&slot);
        self.new_game(session)
    }

    /// Apply a move. When it ends the game the score is recorded for `user`
    /// and the session slot is cleared together. A stored game that is
    /// already over gets its pending score recorded instead.
    pub fn play(
        &self,
        session: &str,
        user: UserId,
        direction: Direction,
    ) -> CoreResult<PlayOutcome> {
        let slot = self.session_lock(session);
        let _held = lock(&slot);

        let state = self.require_state(session)?;
        if state.game_over {
            // Left behind by a finish whose score write failed
            let stats = state.terminal_stats();
            self.finish(session, user, &state, stats)?;
            let result = state.step(direction, &mut *lock(&self.rng)).1;
            return Ok(PlayOutcome {
                state,
                result,
                finished: Some(stats),
            });
        }

        let (next, result) = state.step(direction, &mut *lock(&self.rng));
        if !result.changed {
            // Only the cleared undo slot can differ
            if next != state {
                self.save_state(session, &next)?;
            }
            return Ok(PlayOutcome {
                state: next,
                result,
                finished: None,
            });
        }

        self.save_state(session, &next)?;
        let (next, finished) = next.check_game_over();
        if let Some(stats) = finished {
            self.finish(session, user, &next, stats)?;
        }
        Ok(PlayOutcome {
            state: next,
            result,
            finished,
        })
    }

    /// Clear the slot and record the score. If the record write fails the
    /// slot is restored so neither side is left half done.
    fn finish(
        &self,
        session: &str,
        user: UserId,
        state: &GameState,
        stats: TerminalStats,
    ) -> CoreResult<()> {
        let blob = codec::encode(state)?;
        self.sessions.clear(session)?;
        let record = ScoreRecord::new(user, stats, unix_now());
        if let Err(err) = self.scores.record(record) {
            log::warn!("score write for user {} failed: {}", user, err);
            if let Err(restore) = self.sessions.save(session, &blob) {
                log::error!("could not restore session {}: {}", session, restore);
            }
            return Err(err.into());
        }
        log::info!(
            "user {} finished: score {}, max tile {}, {} moves",
            user,
            stats.score,
            stats.max_tile,
            stats.moves
        );
        Ok(())
    }

    pub fn undo(&self, session: &str) -> CoreResult<GameState> {
        let slot = self.session_lock(session);
        let _held = lock(&slot);

        let state = self.require_state(session)?;
        if !state.can_undo() {
            return Ok(state);
        }
        let undone = state.undo();
        self.save_state(session, &undone)?;
        Ok(undone)
    }

    pub fn hint(&self, session: &str, user: UserId) -> CoreResult<Direction> {
        let slot = self.session_lock(session);
        let _held = lock(&slot);

        self.require_premium(user)?;
        let state = self.require_state(session)?;
        state.hint().ok_or(CoreError::NoHint)
    }

    /// Shuffle the occupied tiles. A finished game comes back unchanged.
    pub fn shuffle(&self, session: &str, user: UserId) -> CoreResult<GameState> {
        let slot = self.session_lock(session);
        let _held = lock(&slot);

        self.require_premium(user)?;
        let state = self.require_state(session)?;
        let shuffled = state.shuffle(&mut *lock(&self.rng));
        match shuffled {
            Some(next) => {
                self.save_state(session, &next)?;
                Ok(next)
            }
            None => Ok(state),
        }
    }

    pub fn swap(
        &self,
        session: &str,
        user: UserId,
        first: Position,
        second: Position,
    ) -> CoreResult<(GameState, [SwappedTile; 2])> {
        let slot = self.session_lock(session);
        let _held = lock(&slot);

        self.require_premium(user)?;
        let state = self.require_state(session)?;
        let (next, tiles) = state.swap_tiles(first, second).map_err(|reason| {
            log::warn!("swap {:?} <-> {:?} rejected: {}", first, second, reason.code());
            reason
        })?;
        self.save_state(session, &next)?;
        Ok((next, tiles))
    }

    /// Record a manually submitted score
    pub fn submit_score(
        &self,
        user: UserId,
        score: i64,
        max_tile: i64,
        moves: i64,
    ) -> CoreResult<ScoreRecord> {
        let stats = validate_submission(score, max_tile, moves)?;
        let record = ScoreRecord::new(user, stats, unix_now());
        self.scores.record(record.clone())?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SwapError;
    use crate::grid::Grid;

    type TestService<E> = GameService<MemorySessionStore, MemoryScoreBook, E>;

    fn service<E: Entitlements>(entitlements: E) -> TestService<E> {
        GameService::with_seed(MemorySessionStore::new(), MemoryScoreBook::new(), entitlements, 42)
    }

    fn premium(_: UserId) -> bool {
        true
    }

    fn free(_: UserId) -> bool {
        false
    }

    fn put(svc: &TestService<impl Entitlements>, session: &str, rows: Vec<Vec<u32>>) {
        let state = GameState::from_grid(Grid::from_rows(rows).unwrap());
        svc.sessions().save(session, &codec::encode(&state).unwrap()).unwrap();
    }

    #[test]
    fn test_load_or_start_creates_then_resumes() {
        let svc = service(free);
        let first = svc.load_or_start("s1").unwrap();
        assert_eq!(first.new_tiles.len(), 2);

        let again = svc.load_or_start("s1").unwrap();
        assert!(again.new_tiles.is_empty());
        assert_eq!(again.state, first.state);
    }

    #[test]
    fn test_play_requires_game() {
        let svc = service(free);
        assert!(matches!(
            svc.play("none", 1, Direction::Left).unwrap_err(),
            CoreError::NoActiveGame
        ));
    }

    #[test]
    fn test_play_saves_state() {
        let svc = service(free);
        put(&svc, "s", vec![vec![2, 2, 0, 0], vec![0; 4], vec![0; 4], vec![0; 4]]);
        let outcome = svc.play("s", 1, Direction::Left).unwrap();
        assert!(outcome.result.changed);
        assert!(outcome.finished.is_none());

        let stored = codec::decode(&svc.sessions().load("s").unwrap().unwrap()).unwrap();
        assert_eq!(stored, outcome.state);
        assert_eq!(stored.score, 4);
        assert!(stored.can_undo());

        let undone = svc.undo("s").unwrap();
        assert_eq!(undone.score, 0);
    }

    #[test]
    fn test_finishing_move_records_and_clears() {
        let svc = service(free);
        // Sliding left opens one corner cell and any spawn there leaves no move
        put(
            &svc,
            "s",
            vec![vec![2, 4, 2, 4], vec![4, 2, 4, 2], vec![2, 4, 2, 8], vec![0, 16, 32, 64]],
        );
        let outcome = svc.play("s", 9, Direction::Left).unwrap();
        assert!(outcome.result.changed);
        let stats = outcome.finished.unwrap();
        assert!(outcome.state.game_over);

        assert!(svc.sessions().load("s").unwrap().is_none());
        let records = svc.scores().records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, 9);
        assert_eq!(records[0].max_tile, stats.max_tile);

        // A second move cannot record again
        assert!(matches!(
            svc.play("s", 9, Direction::Left).unwrap_err(),
            CoreError::NoActiveGame
        ));
        assert_eq!(svc.scores().len(), 1);
    }

    /// Fails the first `failures` writes, then behaves like a score book
    #[derive(Default)]
    struct FlakySink {
        failures: Mutex<u32>,
        book: MemoryScoreBook,
    }

    impl ScoreSink for FlakySink {
        fn record(&self, record: ScoreRecord) -> Result<(), StoreError> {
            let mut failures = lock(&self.failures);
            if *failures > 0 {
                *failures -= 1;
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.book.record(record)
        }

        fn records(&self) -> Result<Vec<ScoreRecord>, StoreError> {
            self.book.records()
        }
    }

    #[test]
    fn test_failed_record_is_retried_on_next_move() {
        let sink = FlakySink {
            failures: Mutex::new(1),
            ..Default::default()
        };
        let svc = GameService::with_seed(MemorySessionStore::new(), sink, free, 1);
        let state = GameState::from_grid(
            Grid::from_rows(vec![
                vec![2, 4, 2, 4],
                vec![4, 2, 4, 2],
                vec![2, 4, 2, 8],
                vec![0, 16, 32, 64],
            ])
            .unwrap(),
        );
        svc.sessions().save("s", &codec::encode(&state).unwrap()).unwrap();

        let err = svc.play("s", 1, Direction::Left).unwrap_err();
        assert!(matches!(err, CoreError::Storage(StoreError::Unavailable(_))));
        let restored = codec::decode(&svc.sessions().load("s").unwrap().unwrap()).unwrap();
        assert!(restored.game_over);
        assert!(svc.scores().records().unwrap().is_empty());

        let outcome = svc.play("s", 1, Direction::Up).unwrap();
        assert!(!outcome.result.changed);
        assert_eq!(outcome.finished, Some(restored.terminal_stats()));
        assert!(svc.sessions().load("s").unwrap().is_none());
        let records = svc.scores().records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].score, restored.score);

        assert!(matches!(
            svc.play("s", 1, Direction::Up).unwrap_err(),
            CoreError::NoActiveGame
        ));
        assert_eq!(svc.scores().records().unwrap().len(), 1);
    }

    #[test]
    fn test_board_size_is_clamped() {
        let svc = service(free).board_size(100_000);
        assert_eq!(svc.start("big").unwrap().state.grid.size(), MAX_SIZE);
        let svc = service(free).board_size(0);
        assert_eq!(svc.start("small").unwrap().state.grid.size(), 2);
    }

    #[test]
    fn test_premium_gating() {
        let svc = service(free);
        svc.start("s").unwrap();
        assert!(matches!(svc.hint("s", 1).unwrap_err(), CoreError::PremiumRequired));
        assert!(matches!(svc.shuffle("s", 1).unwrap_err(), CoreError::PremiumRequired));
        assert!(matches!(
            svc.swap("s", 1, Position::new(0, 0), Position::new(0, 1)).unwrap_err(),
            CoreError::PremiumRequired
        ));
    }

    #[test]
    fn test_premium_actions() {
        let svc = service(premium);
        put(&svc, "s", vec![vec![2, 2, 0, 0], vec![0; 4], vec![0; 4], vec![0, 0, 0, 8]]);
        assert_eq!(svc.hint("s", 1).unwrap(), Direction::Left);

        let (state, tiles) = svc.swap("s", 1, Position::new(0, 0), Position::new(3, 3)).unwrap();
        assert_eq!(state.grid.get(Position::new(0, 0)), 8);
        assert_eq!(tiles[1].value, 2);

        let shuffled = svc.shuffle("s", 1).unwrap();
        assert_eq!(shuffled.grid.occupied(), state.grid.occupied());
        assert_eq!(shuffled.moves, 0);
    }

    #[test]
    fn test_rejected_swap_does_not_save() {
        let svc = service(premium);
        put(&svc, "s", vec![vec![2, 0], vec![0, 4]]);
        let before = svc.sessions().load("s").unwrap();
        let err = svc.swap("s", 1, Position::new(0, 0), Position::new(0, 1)).unwrap_err();
        assert!(matches!(err, CoreError::Swap(SwapError::EmptyCell)));
        assert_eq!(svc.sessions().load("s").unwrap(), before);
    }

    #[test]
    fn test_no_hint_on_stuck_board() {
        let svc = service(premium);
        put(
            &svc,
            "s",
            vec![vec![2, 4, 2, 4], vec![4, 2, 4, 2], vec![2, 4, 2, 4], vec![4, 2, 4, 2]],
        );
        assert!(matches!(svc.hint("s", 1).unwrap_err(), CoreError::NoHint));
    }

    #[test]
    fn test_submit_score_validation() {
        let svc = service(free);
        let record = svc.submit_score(3, 2048, 128, 300).unwrap();
        assert_eq!(record.score, 2048);
        assert!(matches!(
            svc.submit_score(3, -1, 128, 300).unwrap_err(),
            CoreError::InvalidScore(_)
        ));
        assert_eq!(svc.scores().len(), 1);
    }

    #[test]
    fn test_concurrent_sessions() {
        let svc = Arc::new(service(free));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let svc = Arc::clone(&svc);
                std::thread::spawn(move || {
                    let session = format!("s{}", t % 2);
                    svc.load_or_start(&session).unwrap();
                    for dir in Direction::PRIORITY.into_iter().cycle().take(20) {
                        match svc.play(&session, t, dir) {
                            Ok(_) | Err(CoreError::NoActiveGame) => {}
                            Err(e) => panic!("unexpected error {}", e),
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
