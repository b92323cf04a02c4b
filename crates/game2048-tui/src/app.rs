use crate::error::AppResult;
use crate::storage::PlayerDirectory;
use crate::theme::Theme;
use crossterm::event::{KeyCode, KeyEvent};
use game2048_billing::Billing;
use game2048_core::{
    history_page, history_stats, leaderboard, CoreError, Direction, Entitlements, GameService,
    GameState, HistoryPage, HistoryStats, Position, RankedScore, ScoreRecord, ScoreSink,
    SessionStore, TerminalStats, UserId, HISTORY_PAGE_SIZE, LEADERBOARD_LIMIT,
};
use std::sync::Arc;
use std::time::Duration;

/// The engine wired to the front end's stores
pub type Service = GameService<Arc<dyn SessionStore>, Arc<dyn ScoreSink>, Billing>;

/// Input poll and timer granularity
pub const TICK_RATE: Duration = Duration::from_millis(100);

/// Ticks a status message stays up
const MESSAGE_TICKS: u32 = 30;

/// Ticks merged and spawned cells stay highlighted
const FLASH_TICKS: u32 = 2;

/// Result of handling a key press
pub enum AppAction {
    Continue,
    Quit,
}

/// Current screen state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
    Playing,
    /// Final stats over the frozen board
    GameOver,
    Leaderboard,
    History,
}

/// What the arrow keys do on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Arrows slide the tiles
    Normal,
    /// Arrows move a cursor; Enter picks the two tiles to exchange
    Swap,
}

/// A leaderboard row with the player's display name
#[derive(Debug, Clone)]
pub struct LeaderboardRow {
    pub name: String,
    pub entry: RankedScore,
}

pub struct App {
    service: Service,
    players: PlayerDirectory,
    session: String,
    pub player: String,
    pub user: UserId,
    pub state: GameState,
    pub screen_state: ScreenState,
    pub mode: InputMode,
    /// Swap cursor
    pub cursor: Position,
    /// First tile picked in swap mode
    pub swap_first: Option<Position>,
    /// Merged and spawned cells from the last move
    pub flash: Vec<Position>,
    flash_timer: u32,
    pub hint: Option<Direction>,
    pub finished: Option<TerminalStats>,
    pub message: Option<String>,
    message_timer: u32,
    pub theme: Theme,
    theme_idx: usize,
    pub leaderboard: Vec<LeaderboardRow>,
    pub history: Option<HistoryPage>,
    pub history_stats: HistoryStats,
}

impl App {
    /// Resume `player`'s game, or start one
    pub fn new(service: Service, players: PlayerDirectory, player: &str) -> AppResult<Self> {
        let user = players.id_for(player)?;
        let session = format!("player-{}", user);
        let loaded = service.load_or_start(&session)?;
        let flash: Vec<Position> = loaded
            .new_tiles
            .iter()
            .map(|t| Position::new(t.row, t.col))
            .collect();
        let screen_state = if loaded.state.game_over {
            ScreenState::GameOver
        } else {
            ScreenState::Playing
        };

        Ok(Self {
            service,
            players,
            session,
            player: player.to_string(),
            user,
            finished: None,
            state: loaded.state,
            screen_state,
            mode: InputMode::Normal,
            cursor: Position::new(0, 0),
            swap_first: None,
            flash_timer: if flash.is_empty() { 0 } else { FLASH_TICKS },
            flash,
            hint: None,
            message: None,
            message_timer: 0,
            theme: Theme::dark(),
            theme_idx: 0,
            leaderboard: Vec::new(),
            history: None,
            history_stats: HistoryStats::default(),
        })
    }

    pub fn is_premium(&self) -> bool {
        self.service.entitlements().is_premium_active(self.user)
    }

    /// Premium days left, for the info panel
    pub fn premium_days_left(&self) -> Option<u64> {
        let status = self
            .service
            .entitlements()
            .status(self.user, game2048_core::unix_now())
            .ok()?;
        status.is_premium.then_some(status.days_left)
    }

    /// Update timers (called every tick)
    pub fn tick(&mut self) {
        if self.message_timer > 0 {
            self.message_timer -= 1;
            if self.message_timer == 0 {
                self.message = None;
            }
        }
        if self.flash_timer > 0 {
            self.flash_timer -= 1;
            if self.flash_timer == 0 {
                self.flash.clear();
            }
        }
    }

    /// Show a temporary message
    pub fn show_message(&mut self, msg: &str) {
        self.message = Some(msg.to_string());
        self.message_timer = MESSAGE_TICKS;
    }

    fn report(&mut self, err: CoreError) {
        log::warn!("{} ({}): {}", self.player, self.session, err);
        match err {
            CoreError::PremiumRequired => {
                self.show_message("Premium required - try `g2048 premium plans`")
            }
            CoreError::NoHint => self.show_message("No move left to suggest"),
            other => self.show_message(&other.to_string()),
        }
    }

    /// Handle a key press
    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        match self.screen_state {
            ScreenState::Playing => self.handle_game_key(key),
            ScreenState::GameOver => self.handle_game_over_key(key),
            ScreenState::Leaderboard => self.handle_leaderboard_key(key),
            ScreenState::History => self.handle_history_key(key),
        }
    }

    fn handle_game_key(&mut self, key: KeyEvent) -> AppAction {
        if let Some(direction) = arrow(key.code) {
            match self.mode {
                InputMode::Normal => self.play(direction),
                InputMode::Swap => self.move_cursor(direction),
            }
            return AppAction::Continue;
        }

        match key.code {
            KeyCode::Char('q') => return AppAction::Quit,

            KeyCode::Enter | KeyCode::Char(' ') if self.mode == InputMode::Swap => {
                self.pick_swap_tile();
            }
            KeyCode::Esc if self.mode == InputMode::Swap => {
                self.mode = InputMode::Normal;
                self.swap_first = None;
                self.show_message("Swap cancelled");
            }

            KeyCode::Char('u') => self.undo(),
            KeyCode::Char('?') => self.request_hint(),
            KeyCode::Char('s') => self.shuffle(),
            KeyCode::Char('w') => self.toggle_swap_mode(),
            KeyCode::Char('n') => self.new_game(),

            KeyCode::Char('t') => {
                self.theme_idx = (self.theme_idx + 1) % Theme::COUNT;
                self.theme = Theme::by_index(self.theme_idx);
            }

            KeyCode::Char('L') => self.open_leaderboard(),
            KeyCode::Char('H') => self.open_history(1),

            _ => {}
        }
        AppAction::Continue
    }

    fn handle_game_over_key(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('q') => return AppAction::Quit,
            KeyCode::Char('n') | KeyCode::Enter | KeyCode::Char(' ') => self.new_game(),
            KeyCode::Char('L') => self.open_leaderboard(),
            KeyCode::Char('H') => self.open_history(1),
            KeyCode::Esc => self.screen_state = ScreenState::Playing,
            _ => {}
        }
        AppAction::Continue
    }

    fn handle_leaderboard_key(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.close_overlay(),
            KeyCode::Char('H') => self.open_history(1),
            _ => {}
        }
        AppAction::Continue
    }

    fn handle_history_key(&mut self, key: KeyEvent) -> AppAction {
        let page = self.history.as_ref().map(|p| p.page).unwrap_or(1);
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.close_overlay(),
            KeyCode::Left | KeyCode::Char('h') => {
                if self.history.as_ref().is_some_and(HistoryPage::has_prev) {
                    self.open_history(page - 1);
                }
            }
            KeyCode::Right | KeyCode::Char('l') => {
                if self.history.as_ref().is_some_and(HistoryPage::has_next) {
                    self.open_history(page + 1);
                }
            }
            KeyCode::Char('L') => self.open_leaderboard(),
            _ => {}
        }
        AppAction::Continue
    }

    fn close_overlay(&mut self) {
        self.screen_state = if self.state.game_over {
            ScreenState::GameOver
        } else {
            ScreenState::Playing
        };
    }

    // ==================== Game actions ====================

    fn play(&mut self, direction: Direction) {
        match self.service.play(&self.session, self.user, direction) {
            Ok(outcome) => {
                self.state = outcome.state;
                if !outcome.result.changed {
                    return;
                }
                self.hint = None;
                self.flash = outcome.result.merged_cells;
                if let Some(tile) = outcome.result.new_tile {
                    self.flash.push(Position::new(tile.row, tile.col));
                }
                self.flash_timer = FLASH_TICKS;
                if let Some(stats) = outcome.finished {
                    self.finished = Some(stats);
                    self.screen_state = ScreenState::GameOver;
                }
            }
            Err(e) => self.report(e),
        }
    }

    fn undo(&mut self) {
        if !self.state.can_undo() {
            self.show_message("Nothing to undo");
            return;
        }
        match self.service.undo(&self.session) {
            Ok(state) => {
                self.state = state;
                self.hint = None;
                self.show_message("Undo");
            }
            Err(e) => self.report(e),
        }
    }

    fn request_hint(&mut self) {
        match self.service.hint(&self.session, self.user) {
            Ok(direction) => {
                self.hint = Some(direction);
                self.show_message(&format!("Try {}", direction.as_str()));
            }
            Err(e) => self.report(e),
        }
    }

    fn shuffle(&mut self) {
        match self.service.shuffle(&self.session, self.user) {
            Ok(state) => {
                self.state = state;
                self.hint = None;
                self.show_message("Shuffled");
            }
            Err(e) => self.report(e),
        }
    }

    fn toggle_swap_mode(&mut self) {
        if self.mode == InputMode::Swap {
            self.mode = InputMode::Normal;
            self.swap_first = None;
            return;
        }
        if !self.is_premium() {
            self.report(CoreError::PremiumRequired);
            return;
        }
        self.mode = InputMode::Swap;
        self.swap_first = None;
        self.show_message("Swap: pick two tiles with Enter");
    }

    fn pick_swap_tile(&mut self) {
        let Some(first) = self.swap_first else {
            self.swap_first = Some(self.cursor);
            return;
        };
        let second = self.cursor;
        match self.service.swap(&self.session, self.user, first, second) {
            Ok((state, _)) => {
                self.state = state;
                self.hint = None;
                self.flash = vec![first, second];
                self.flash_timer = FLASH_TICKS;
                self.mode = InputMode::Normal;
                self.swap_first = None;
                self.show_message("Tiles swapped");
            }
            Err(e) => {
                // Keep swap mode so another pair can be picked
                self.swap_first = None;
                self.report(e);
            }
        }
    }

    fn move_cursor(&mut self, direction: Direction) {
        let last = self.state.grid.size().saturating_sub(1);
        let Position { row, col } = self.cursor;
        self.cursor = match direction {
            Direction::Up => Position::new(row.saturating_sub(1), col),
            Direction::Down => Position::new((row + 1).min(last), col),
            Direction::Left => Position::new(row, col.saturating_sub(1)),
            Direction::Right => Position::new(row, (col + 1).min(last)),
        };
    }

    fn new_game(&mut self) {
        match self.service.start(&self.session) {
            Ok(loaded) => {
                self.state = loaded.state;
                self.flash = loaded
                    .new_tiles
                    .iter()
                    .map(|t| Position::new(t.row, t.col))
                    .collect();
                self.flash_timer = FLASH_TICKS;
                self.finished = None;
                self.hint = None;
                self.mode = InputMode::Normal;
                self.swap_first = None;
                self.screen_state = ScreenState::Playing;
                self.show_message("New game");
            }
            Err(e) => self.report(e),
        }
    }

    // ==================== Score screens ====================

    fn load_records(&mut self) -> Option<Vec<ScoreRecord>> {
        match self.service.scores().records() {
            Ok(records) => Some(records),
            Err(e) => {
                self.report(e.into());
                None
            }
        }
    }

    fn open_leaderboard(&mut self) {
        let Some(records) = self.load_records() else {
            return;
        };
        self.leaderboard = leaderboard(&records, LEADERBOARD_LIMIT)
            .into_iter()
            .map(|entry| LeaderboardRow {
                name: self.players.name_of(entry.record.user_id),
                entry,
            })
            .collect();
        self.screen_state = ScreenState::Leaderboard;
    }

    fn open_history(&mut self, page: usize) {
        let Some(records) = self.load_records() else {
            return;
        };
        self.history = Some(history_page(&records, self.user, page, HISTORY_PAGE_SIZE));
        self.history_stats = history_stats(&records, self.user);
        self.screen_state = ScreenState::History;
    }
}

/// Arrow keys and vim keys as board directions
fn arrow(code: KeyCode) -> Option<Direction> {
    match code {
        KeyCode::Up | KeyCode::Char('k') => Some(Direction::Up),
        KeyCode::Down | KeyCode::Char('j') => Some(Direction::Down),
        KeyCode::Left | KeyCode::Char('h') => Some(Direction::Left),
        KeyCode::Right | KeyCode::Char('l') => Some(Direction::Right),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;
    use game2048_billing::PaymentMethod;
    use game2048_core::{encode, Grid, MemoryScoreBook, MemorySessionStore};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn service() -> Service {
        GameService::with_seed(
            Arc::new(MemorySessionStore::new()) as Arc<dyn SessionStore>,
            Arc::new(MemoryScoreBook::new()) as Arc<dyn ScoreSink>,
            Billing::in_memory(),
            7,
        )
    }

    /// An app for player 1 resuming `rows`
    fn app_with(rows: Vec<Vec<u32>>) -> App {
        let svc = service();
        let state = GameState::from_grid(Grid::from_rows(rows).unwrap());
        svc.sessions()
            .save("player-1", &encode(&state).unwrap())
            .unwrap();
        App::new(svc, PlayerDirectory::in_memory(), "ana").unwrap()
    }

    fn make_premium(app: &App) {
        app.service
            .entitlements()
            .purchase(app.user, 1, PaymentMethod::Demo, game2048_core::unix_now())
            .unwrap();
    }

    #[test]
    fn test_new_player_gets_fresh_game() {
        let app = App::new(service(), PlayerDirectory::in_memory(), "ana").unwrap();
        assert_eq!(app.user, 1);
        assert_eq!(app.state.grid.occupied().len(), 2);
        assert_eq!(app.flash.len(), 2);
        assert_eq!(app.screen_state, ScreenState::Playing);
    }

    #[test]
    fn test_arrow_moves_and_undo() {
        let mut app = app_with(vec![
            vec![2, 2, 0, 0],
            vec![0, 0, 0, 0],
            vec![0, 0, 0, 0],
            vec![0, 0, 0, 0],
        ]);
        app.handle_key(key(KeyCode::Left));
        assert_eq!(app.state.score, 4);
        assert_eq!(app.state.grid.get(Position::new(0, 0)), 4);
        assert!(app.flash.contains(&Position::new(0, 0)));

        app.handle_key(key(KeyCode::Char('u')));
        assert_eq!(app.state.score, 0);
        assert_eq!(app.state.grid.get(Position::new(0, 1)), 2);

        app.handle_key(key(KeyCode::Char('u')));
        assert_eq!(app.message.as_deref(), Some("Nothing to undo"));
    }

    #[test]
    fn test_premium_keys_need_subscription() {
        let mut app = app_with(vec![
            vec![2, 2, 0, 0],
            vec![0, 0, 0, 0],
            vec![0, 0, 0, 0],
            vec![0, 0, 0, 0],
        ]);
        app.handle_key(key(KeyCode::Char('?')));
        assert!(app.hint.is_none());
        assert!(app.message.as_deref().unwrap().starts_with("Premium required"));

        app.handle_key(key(KeyCode::Char('w')));
        assert_eq!(app.mode, InputMode::Normal);

        make_premium(&app);
        app.handle_key(key(KeyCode::Char('?')));
        assert_eq!(app.hint, Some(Direction::Left));
    }

    #[test]
    fn test_swap_mode() {
        let mut app = app_with(vec![
            vec![2, 4, 0, 0],
            vec![0, 0, 0, 0],
            vec![0, 0, 0, 0],
            vec![0, 0, 0, 0],
        ]);
        make_premium(&app);

        app.handle_key(key(KeyCode::Char('w')));
        assert_eq!(app.mode, InputMode::Swap);

        // Arrows steer the cursor instead of sliding
        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Right));
        assert_eq!(app.state.moves, 0);
        app.handle_key(key(KeyCode::Enter));

        assert_eq!(app.state.grid.get(Position::new(0, 0)), 4);
        assert_eq!(app.state.grid.get(Position::new(0, 1)), 2);
        assert_eq!(app.mode, InputMode::Normal);
    }

    #[test]
    fn test_rejected_swap_stays_in_swap_mode() {
        let mut app = app_with(vec![
            vec![2, 0, 0, 0],
            vec![0, 0, 0, 0],
            vec![0, 0, 0, 0],
            vec![0, 0, 0, 0],
        ]);
        make_premium(&app);
        app.handle_key(key(KeyCode::Char('w')));
        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.mode, InputMode::Swap);
        assert!(app.swap_first.is_none());
        assert!(app.message.as_deref().unwrap().contains("itself"));
    }

    #[test]
    fn test_game_over_records_score() {
        let mut app = app_with(vec![
            vec![2, 4, 2, 4],
            vec![4, 2, 4, 2],
            vec![2, 4, 2, 8],
            vec![0, 16, 32, 64],
        ]);
        app.handle_key(key(KeyCode::Left));
        assert_eq!(app.screen_state, ScreenState::GameOver);
        let stats = app.finished.unwrap();
        assert_eq!(stats.max_tile, 64);
        assert_eq!(stats.moves, 1);

        app.handle_key(key(KeyCode::Char('H')));
        assert_eq!(app.screen_state, ScreenState::History);
        assert_eq!(app.history.as_ref().unwrap().total, 1);
        assert_eq!(app.history_stats.total_games, 1);

        app.handle_key(key(KeyCode::Char('L')));
        assert_eq!(app.leaderboard.len(), 1);
        assert_eq!(app.leaderboard[0].name, "ana");

        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.screen_state, ScreenState::GameOver);

        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(app.screen_state, ScreenState::Playing);
        assert_eq!(app.state.moves, 0);
        assert!(!app.state.game_over);
    }

    #[test]
    fn test_timers_expire() {
        let mut app = App::new(service(), PlayerDirectory::in_memory(), "ana").unwrap();
        app.show_message("hello");
        for _ in 0..MESSAGE_TICKS {
            app.tick();
        }
        assert!(app.message.is_none());
        assert!(app.flash.is_empty());
    }

    #[test]
    fn test_quit() {
        let mut app = App::new(service(), PlayerDirectory::in_memory(), "ana").unwrap();
        assert!(matches!(app.handle_key(key(KeyCode::Char('q'))), AppAction::Quit));
    }
}
