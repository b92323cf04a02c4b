use crate::app::{App, InputMode, ScreenState};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::{Color, Print, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use game2048_billing::clock::display_timestamp;
use game2048_core::{Direction, Position, TerminalStats};
use std::io;

/// Cell size in terminal columns and rows
const CELL_W: u16 = 7;
const CELL_H: u16 = 3;

pub fn render(stdout: &mut io::Stdout, app: &App) -> io::Result<()> {
    let (term_width, term_height) = terminal::size()?;

    execute!(stdout, Hide, SetBackgroundColor(app.theme.bg), Clear(ClearType::All))?;

    match app.screen_state {
        ScreenState::Playing => render_game_screen(stdout, app, term_width, term_height)?,
        ScreenState::GameOver => {
            render_game_screen(stdout, app, term_width, term_height)?;
            render_game_over(stdout, app, term_width, term_height)?;
        }
        ScreenState::Leaderboard => render_leaderboard_screen(stdout, app, term_width)?,
        ScreenState::History => render_history_screen(stdout, app, term_width)?,
    }

    if let Some(ref msg) = app.message {
        render_message(stdout, app, msg, term_width)?;
    }

    execute!(stdout, Show)?;
    Ok(())
}

fn board_extent(size: usize) -> (u16, u16) {
    let n = size as u16;
    (n * (CELL_W + 1) + 1, n * (CELL_H + 1) + 1)
}

fn render_game_screen(
    stdout: &mut io::Stdout,
    app: &App,
    term_width: u16,
    term_height: u16,
) -> io::Result<()> {
    let (grid_width, grid_height) = board_extent(app.state.grid.size());

    // Center the grid horizontally, leave room for info panel
    let total_width = grid_width + 28;
    let start_x = if term_width > total_width {
        (term_width - total_width) / 2
    } else {
        1
    };
    let start_y = if term_height > grid_height + 8 { 2 } else { 1 };

    render_grid(stdout, app, start_x, start_y)?;
    render_info_panel(stdout, app, start_x + grid_width + 3, start_y)?;
    render_controls(stdout, app, start_x, start_y + grid_height + 1)?;

    Ok(())
}

fn render_grid(stdout: &mut io::Stdout, app: &App, x: u16, y: u16) -> io::Result<()> {
    let theme = &app.theme;
    let size = app.state.grid.size();
    let (width, height) = board_extent(size);

    // Border: paint the whole board, cells are drawn over it
    execute!(stdout, SetBackgroundColor(theme.border))?;
    let blank = " ".repeat(width as usize);
    for dy in 0..height {
        execute!(stdout, MoveTo(x, y + dy), Print(&blank))?;
    }

    for row in 0..size {
        for col in 0..size {
            render_cell(stdout, app, Position::new(row, col), x, y)?;
        }
    }

    execute!(stdout, SetBackgroundColor(theme.bg))?;
    Ok(())
}

fn render_cell(
    stdout: &mut io::Stdout,
    app: &App,
    pos: Position,
    x: u16,
    y: u16,
) -> io::Result<()> {
    let theme = &app.theme;
    let value = app.state.grid.get(pos);
    let (tile_bg, tile_fg) = theme.tile_colors(value);

    let swapping = app.mode == InputMode::Swap;
    let (bg, fg) = if swapping && app.swap_first == Some(pos) {
        (theme.selected_bg, theme.fg)
    } else if swapping && app.cursor == pos {
        (theme.cursor_bg, theme.fg)
    } else if app.flash.contains(&pos) {
        (theme.flash_bg, theme.tile_dark_fg)
    } else {
        (tile_bg, tile_fg)
    };

    let cx = x + 1 + pos.col as u16 * (CELL_W + 1);
    let cy = y + 1 + pos.row as u16 * (CELL_H + 1);
    let label = if value == 0 {
        String::new()
    } else {
        value.to_string()
    };

    execute!(stdout, SetBackgroundColor(bg), SetForegroundColor(fg))?;
    for dy in 0..CELL_H {
        let text = if dy == CELL_H / 2 {
            format!("{:^width$}", label, width = CELL_W as usize)
        } else {
            " ".repeat(CELL_W as usize)
        };
        execute!(stdout, MoveTo(cx, cy + dy), Print(text))?;
    }
    Ok(())
}

fn render_info_panel(stdout: &mut io::Stdout, app: &App, x: u16, y: u16) -> io::Result<()> {
    let theme = &app.theme;
    let state = &app.state;

    execute!(stdout, SetBackgroundColor(theme.bg))?;

    execute!(
        stdout,
        MoveTo(x, y),
        SetForegroundColor(theme.key),
        Print("═══ 2048 ═══")
    )?;

    let rows = [
        format!("Player: {:>12}", app.player),
        format!("Score:  {:>12}", state.score),
        format!("Tile:   {:>12}", state.max_tile()),
        format!("Moves:  {:>12}", state.moves),
    ];
    for (i, line) in rows.iter().enumerate() {
        execute!(
            stdout,
            MoveTo(x, y + 2 + i as u16),
            SetForegroundColor(theme.info),
            Print(line)
        )?;
    }

    let undo = if state.can_undo() { "ready" } else { "-" };
    execute!(
        stdout,
        MoveTo(x, y + 7),
        SetForegroundColor(theme.fg),
        Print(format!("Undo:   {:>12}", undo))
    )?;

    let (premium, color) = match app.premium_days_left() {
        Some(days) => (format!("{} days", days), theme.success),
        None => ("free".to_string(), theme.info),
    };
    execute!(
        stdout,
        MoveTo(x, y + 8),
        SetForegroundColor(color),
        Print(format!("Premium:{:>12}", premium))
    )?;

    if app.mode == InputMode::Swap {
        execute!(
            stdout,
            MoveTo(x, y + 10),
            SetForegroundColor(Color::Magenta),
            Print("SWAP MODE")
        )?;
    }
    if let Some(direction) = app.hint {
        let arrow = match direction {
            Direction::Up => "↑",
            Direction::Down => "↓",
            Direction::Left => "←",
            Direction::Right => "→",
        };
        execute!(
            stdout,
            MoveTo(x, y + 11),
            SetForegroundColor(theme.key),
            Print(format!("Hint: {} {}", arrow, direction.as_str()))
        )?;
    }

    Ok(())
}

fn render_controls(stdout: &mut io::Stdout, app: &App, x: u16, y: u16) -> io::Result<()> {
    let theme = &app.theme;

    execute!(stdout, SetBackgroundColor(theme.bg))?;

    let controls = [
        ("hjkl/Arrows", "Move"),
        ("u", "Undo"),
        ("?", "Hint"),
        ("s", "Shuffle"),
        ("w", "Swap mode"),
        ("n", "New game"),
        ("L", "Leaderboard"),
        ("H", "History"),
        ("t", "Theme"),
        ("q", "Quit"),
    ];

    // Display in columns of 3
    for (i, (key, desc)) in controls.iter().enumerate() {
        let col = i / 3;
        let row = i % 3;
        let cx = x + (col as u16) * 20;
        let cy = y + row as u16;

        execute!(
            stdout,
            MoveTo(cx, cy),
            SetForegroundColor(theme.key),
            Print(format!("{:>11}", key)),
            SetForegroundColor(theme.info),
            Print(format!(" {}", desc))
        )?;
    }

    Ok(())
}

fn render_message(
    stdout: &mut io::Stdout,
    app: &App,
    msg: &str,
    term_width: u16,
) -> io::Result<()> {
    let theme = &app.theme;
    let padded = format!("  {}  ", msg);
    let x = term_width.saturating_sub(padded.chars().count() as u16) / 2;

    execute!(
        stdout,
        MoveTo(x, 0),
        SetForegroundColor(theme.fg),
        SetBackgroundColor(theme.cursor_bg),
        Print(&padded),
        SetBackgroundColor(theme.bg)
    )?;

    Ok(())
}

fn render_game_over(
    stdout: &mut io::Stdout,
    app: &App,
    term_width: u16,
    term_height: u16,
) -> io::Result<()> {
    let theme = &app.theme;
    let stats = app.finished.unwrap_or(TerminalStats {
        score: app.state.score,
        max_tile: app.state.max_tile(),
        moves: app.state.moves,
    });

    let lines = [
        "GAME OVER".to_string(),
        String::new(),
        format!("Score     {:>10}", stats.score),
        format!("Max tile  {:>10}", stats.max_tile),
        format!("Moves     {:>10}", stats.moves),
        String::new(),
        "n new game   L leaderboard".to_string(),
        "H history    q quit".to_string(),
    ];
    let width: u16 = 32;
    let height = lines.len() as u16 + 2;
    let x = term_width.saturating_sub(width) / 2;
    let y = term_height.saturating_sub(height) / 2;

    execute!(stdout, SetBackgroundColor(theme.cursor_bg))?;
    for dy in 0..height {
        execute!(stdout, MoveTo(x, y + dy), Print(" ".repeat(width as usize)))?;
    }
    for (i, line) in lines.iter().enumerate() {
        let color = if i == 0 { theme.error } else { theme.fg };
        execute!(
            stdout,
            MoveTo(x, y + 1 + i as u16),
            SetForegroundColor(color),
            Print(format!("{:^width$}", line, width = width as usize))
        )?;
    }
    execute!(stdout, SetBackgroundColor(theme.bg))?;
    Ok(())
}

fn render_leaderboard_screen(
    stdout: &mut io::Stdout,
    app: &App,
    term_width: u16,
) -> io::Result<()> {
    let theme = &app.theme;

    let title = "═══ LEADERBOARD ═══";
    let title_x = term_width.saturating_sub(title.chars().count() as u16) / 2;
    execute!(
        stdout,
        MoveTo(title_x, 1),
        SetForegroundColor(theme.key),
        Print(title)
    )?;

    let header = format!(
        "{:>4}  {:<16} {:>8} {:>6} {:>6}  {:<19}",
        "#", "Player", "Score", "Tile", "Moves", "Date"
    );
    let x = term_width.saturating_sub(header.len() as u16) / 2;
    execute!(
        stdout,
        MoveTo(x, 3),
        SetForegroundColor(theme.info),
        Print(&header)
    )?;

    if app.leaderboard.is_empty() {
        execute!(
            stdout,
            MoveTo(x, 5),
            SetForegroundColor(theme.info),
            Print("No finished games yet")
        )?;
    }

    for (i, row) in app.leaderboard.iter().enumerate() {
        let record = &row.entry.record;
        let color = if record.user_id == app.user {
            theme.key
        } else {
            theme.fg
        };
        execute!(
            stdout,
            MoveTo(x, 4 + i as u16),
            SetForegroundColor(color),
            Print(format!(
                "{:>4}  {:<16} {:>8} {:>6} {:>6}  {:<19}",
                row.entry.rank,
                truncate(&row.name, 16),
                record.score,
                record.max_tile,
                record.moves,
                display_timestamp(record.created_at)
            ))
        )?;
    }

    let footer_y = 5 + app.leaderboard.len() as u16;
    execute!(
        stdout,
        MoveTo(x, footer_y),
        SetForegroundColor(theme.info),
        Print("H history   Esc back")
    )?;
    Ok(())
}

fn render_history_screen(stdout: &mut io::Stdout, app: &App, term_width: u16) -> io::Result<()> {
    let theme = &app.theme;
    let stats = &app.history_stats;

    let title = format!("═══ HISTORY: {} ═══", app.player);
    let title_x = term_width.saturating_sub(title.chars().count() as u16) / 2;
    execute!(
        stdout,
        MoveTo(title_x, 1),
        SetForegroundColor(theme.key),
        Print(&title)
    )?;

    let summary = format!(
        "Games {}   Best {}   Best tile {}   Average {:.1}   Moves {}",
        stats.total_games, stats.best_score, stats.best_tile, stats.avg_score, stats.total_moves
    );
    let x = term_width.saturating_sub(summary.len() as u16) / 2;
    execute!(
        stdout,
        MoveTo(x, 3),
        SetForegroundColor(theme.info),
        Print(&summary)
    )?;

    let Some(page) = &app.history else {
        return Ok(());
    };

    execute!(
        stdout,
        MoveTo(x, 5),
        SetForegroundColor(theme.info),
        Print(format!(
            "{:<19}  {:>8} {:>6} {:>6}",
            "Date", "Score", "Tile", "Moves"
        ))
    )?;
    for (i, record) in page.records.iter().enumerate() {
        execute!(
            stdout,
            MoveTo(x, 6 + i as u16),
            SetForegroundColor(theme.fg),
            Print(format!(
                "{:<19}  {:>8} {:>6} {:>6}",
                display_timestamp(record.created_at),
                record.score,
                record.max_tile,
                record.moves
            ))
        )?;
    }

    let prev = if page.has_prev() { "◀ h" } else { "   " };
    let next = if page.has_next() { "l ▶" } else { "   " };
    execute!(
        stdout,
        MoveTo(x, 7 + page.records.len() as u16),
        SetForegroundColor(theme.info),
        Print(format!(
            "{}  page {}/{}  {}    L leaderboard   Esc back",
            prev,
            page.page,
            page.pages().max(1),
            next
        ))
    )?;
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_extent() {
        assert_eq!(board_extent(4), (33, 17));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("ana", 16), "ana");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
