//! WebAssembly build of the 2048 engine
//!
//! `Game2048` drives a `GameService` from JavaScript. Games are saved to
//! `localStorage` after every change, so reloading the page resumes them.

use game2048_core::{
    history_stats, CoreError, Direction, GameService, GameState, Grid, Position, ScoreSink,
    SpawnedTile, SwappedTile, TerminalStats, UserId, DEFAULT_SIZE,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

mod storage;


pub use storage::{LocalScoreBook, LocalSessionStore, PremiumFlag};

/// The browser has one player
const LOCAL_PLAYER: UserId = 1;

type Service = GameService<LocalSessionStore, LocalScoreBook, PremiumFlag>;

// Initialize panic hook for better error messages
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

/// Plain objects rather than `Map`, so flattened views read like JSON
fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StateView<'a> {
    grid: &'a Grid,
    score: u64,
    moves: u32,
    max_tile: u32,
    game_over: bool,
    can_undo: bool,
}

impl<'a> From<&'a GameState> for StateView<'a> {
    fn from(state: &'a GameState) -> Self {
        Self {
            grid: &state.grid,
            score: state.score,
            moves: state.moves,
            max_tile: state.max_tile(),
            game_over: state.game_over,
            can_undo: state.can_undo(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MoveView<'a> {
    #[serde(flatten)]
    state: StateView<'a>,
    changed: bool,
    merged_cells: &'a [Position],
    new_tile: Option<SpawnedTile>,
    finished: Option<TerminalStats>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BoardView<'a> {
    #[serde(flatten)]
    state: StateView<'a>,
    new_tiles: &'a [SpawnedTile],
}

#[derive(Serialize)]
struct SwapView<'a> {
    #[serde(flatten)]
    state: StateView<'a>,
    swapped: [SwappedTile; 2],
}

/// A 2048 game saved in `localStorage` under one key
#[wasm_bindgen]
pub struct Game2048 {
    service: Service,
    premium: PremiumFlag,
    session: String,
    state: GameState,
    new_tiles: Vec<SpawnedTile>,
}

#[wasm_bindgen]
impl Game2048 {
    /// Resume the game saved under `key`, or start one on a `size` board
    /// (clamped to 2..=8)
    #[wasm_bindgen(constructor)]
    pub fn new(key: &str, size: Option<u32>) -> Result<Game2048, JsValue> {
        let premium = PremiumFlag::default();
        let size = size.map_or(DEFAULT_SIZE, |s| s as usize);
        let service = GameService::new(LocalSessionStore, LocalScoreBook, premium.clone())
            .board_size(size);
        let loaded = service.load_or_start(key).map_err(js_error)?;

        Ok(Game2048 {
            service,
            premium,
            session: key.to_string(),
            state: loaded.state,
            new_tiles: loaded.new_tiles,
        })
    }

    /// Throw away the current game and deal a new board
    #[wasm_bindgen(js_name = newGame)]
    pub fn new_game(&mut self) -> Result<JsValue, JsValue> {
        let loaded = self.service.start(&self.session).map_err(js_error)?;
        self.state = loaded.state;
        self.new_tiles = loaded.new_tiles;
        self.state_view()
    }

    /// Slide toward `"up"`, `"down"`, `"left"` or `"right"`
    #[wasm_bindgen(js_name = "move")]
    pub fn play(&mut self, direction: &str) -> Result<JsValue, JsValue> {
        let direction: Direction = direction.parse().map_err(js_error)?;
        if self.state.game_over {
            // The finished game is no longer stored
            return to_js(&MoveView {
                state: StateView::from(&self.state),
                changed: false,
                merged_cells: &[],
                new_tile: None,
                finished: None,
            });
        }

        let outcome = self
            .service
            .play(&self.session, LOCAL_PLAYER, direction)
            .map_err(js_error)?;
        self.state = outcome.state;
        self.new_tiles.clear();
        to_js(&MoveView {
            state: StateView::from(&self.state),
            changed: outcome.result.changed,
            merged_cells: &outcome.result.merged_cells,
            new_tile: outcome.result.new_tile,
            finished: outcome.finished,
        })
    }

    pub fn undo(&mut self) -> Result<JsValue, JsValue> {
        if !self.state.game_over {
            self.state = self.service.undo(&self.session).map_err(js_error)?;
            self.new_tiles.clear();
        }
        self.state_view()
    }

    /// Suggested direction, or `undefined` when nothing can move
    pub fn hint(&self) -> Result<Option<String>, JsValue> {
        if self.state.game_over {
            return Ok(None);
        }
        match self.service.hint(&self.session, LOCAL_PLAYER) {
            Ok(direction) => Ok(Some(direction.as_str().to_string())),
            Err(CoreError::NoHint) => Ok(None),
            Err(e) => Err(js_error(e)),
        }
    }

    pub fn shuffle(&mut self) -> Result<JsValue, JsValue> {
        if !self.state.game_over {
            self.state = self
                .service
                .shuffle(&self.session, LOCAL_PLAYER)
                .map_err(js_error)?;
            self.new_tiles.clear();
        }
        self.state_view()
    }

    pub fn swap(
        &mut self,
        row1: usize,
        col1: usize,
        row2: usize,
        col2: usize,
    ) -> Result<JsValue, JsValue> {
        let (state, swapped) = self
            .service
            .swap(
                &self.session,
                LOCAL_PLAYER,
                Position::new(row1, col1),
                Position::new(row2, col2),
            )
            .map_err(js_error)?;
        self.state = state;
        self.new_tiles.clear();
        to_js(&SwapView {
            state: StateView::from(&self.state),
            swapped,
        })
    }

    /// Current board and counters as a JS object
    #[wasm_bindgen(js_name = state)]
    pub fn state_view(&self) -> Result<JsValue, JsValue> {
        to_js(&BoardView {
            state: StateView::from(&self.state),
            new_tiles: &self.new_tiles,
        })
    }

    /// Get current game state as JSON
    #[wasm_bindgen(js_name = stateJson)]
    pub fn state_json(&self) -> String {
        serde_json::to_string(&StateView::from(&self.state)).unwrap_or_default()
    }

    #[wasm_bindgen(js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.state.can_undo()
    }

    #[wasm_bindgen(js_name = isGameOver)]
    pub fn is_game_over(&self) -> bool {
        self.state.game_over
    }

    pub fn score(&self) -> f64 {
        self.state.score as f64
    }

    pub fn size(&self) -> usize {
        self.state.grid.size()
    }

    /// Unlock hint, shuffle and swap
    #[wasm_bindgen(js_name = setPremium)]
    pub fn set_premium(&self, active: bool) {
        self.premium.set(active);
    }

    #[wasm_bindgen(js_name = isPremium)]
    pub fn is_premium(&self) -> bool {
        self.premium.get()
    }

    /// Best finished score on this browser
    #[wasm_bindgen(js_name = bestScore)]
    pub fn best_score(&self) -> f64 {
        match self.service.scores().records() {
            Ok(records) => history_stats(&records, LOCAL_PLAYER).best_score as f64,
            Err(e) => {
                storage::warn(&format!("could not read scores: {}", e));
                0.0
            }
        }
    }
}
