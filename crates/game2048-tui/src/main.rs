mod app;
mod commands;
mod error;
mod render;
mod storage;
mod theme;

use app::{App, AppAction, Service, TICK_RATE};
use clap::{Parser, Subcommand};
use commands::{BuyRequest, Callback};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use error::{AppError, AppResult};
use game2048_billing::{BillingConfig, PaymentMethod};
use game2048_core::{unix_now, GameService, DEFAULT_SIZE, LEADERBOARD_LIMIT};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use storage::{Environment, Stores};

#[derive(Parser)]
#[command(name = "g2048", version, about = "2048 in the terminal, with premium moves")]
struct Cli {
    /// Player name; scores and premium are tracked per player
    #[arg(long, short, env = "G2048_PLAYER", default_value = "player", global = true)]
    player: String,

    /// Board size for new games
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_SIZE as u8,
        value_parser = clap::value_parser!(u8).range(2..=8)
    )]
    size: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Play in the terminal (default)
    Play,
    /// Best score per player
    Leaderboard {
        #[arg(long, default_value_t = LEADERBOARD_LIMIT)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Your finished games, newest first
    History {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        json: bool,
    },
    /// Record a score by hand
    Submit {
        score: i64,
        max_tile: i64,
        moves: i64,
    },
    /// Premium plans and payments
    Premium {
        #[command(subcommand)]
        command: PremiumCommand,
    },
}

#[derive(Subcommand)]
enum PremiumCommand {
    /// List the plans on sale
    Plans {
        #[arg(long)]
        json: bool,
    },
    /// Subscription state and recent orders
    Status,
    /// Buy a plan
    Buy {
        plan: u32,
        /// vnpay, payos or demo; defaults to the first configured gateway
        #[arg(long)]
        method: Option<PaymentMethod>,
        /// Client address reported to VNPay
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,
        /// Preselect a bank on the VNPay page
        #[arg(long)]
        bank: Option<String>,
    },
    /// Show one of your orders; for PayOS, the status or cancel request
    Order {
        id: u64,
        /// Prepare the PayOS request that cancels a pending payment link
        #[arg(long)]
        cancel: bool,
        #[arg(long, requires = "cancel")]
        reason: Option<String>,
    },
    /// Apply a gateway callback to its order
    Verify {
        #[command(subcommand)]
        gateway: VerifyCommand,
    },
    /// End premium now
    Cancel,
}

#[derive(Subcommand)]
enum VerifyCommand {
    /// Return/IPN query string or full return URL
    Vnpay { query: String },
    /// Webhook JSON body from a file, or `-` for stdin
    Payos { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let dir = storage::data_dir();
    init_logging(&dir);

    match run(cli, &dir) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to `<data dir>/g2048.log` so output never lands on the game screen
fn init_logging(dir: &Path) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    let file = fs::create_dir_all(dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("g2048.log"))
    });
    match file {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        // Without a log file, only errors are worth the noise on stderr
        Err(_) => {
            builder.filter_level(log::LevelFilter::Error);
        }
    }
    let _ = builder.try_init();
}

fn run(cli: Cli, dir: &Path) -> AppResult<()> {
    let Stores {
        sessions,
        scores,
        billing,
        players,
    } = storage::open_stores(Environment::detect(), dir)?;
    let service: Service =
        GameService::new(sessions, scores, billing).board_size(cli.size as usize);

    let command = cli.command.unwrap_or(Command::Play);
    if let Command::Play = command {
        let app = App::new(service, players, &cli.player)?;
        return play(app);
    }

    let user = players.id_for(&cli.player)?;
    let now = unix_now();
    let out = &mut io::stdout().lock();
    match command {
        Command::Play => Ok(()),
        Command::Leaderboard { limit, json } => {
            commands::show_leaderboard(&service, &players, limit, json, out)
        }
        Command::History { page, json } => commands::show_history(&service, user, page, json, out),
        Command::Submit {
            score,
            max_tile,
            moves,
        } => commands::submit_score(&service, user, score, max_tile, moves, out),
        Command::Premium { command } => {
            let config = BillingConfig::from_env();
            let billing = service.entitlements();
            match command {
                PremiumCommand::Plans { json } => commands::show_plans(billing, json, out),
                PremiumCommand::Status => commands::show_status(billing, &config, user, now, out),
                PremiumCommand::Buy {
                    plan,
                    method,
                    ip,
                    bank,
                } => {
                    let request = BuyRequest {
                        plan_id: plan,
                        method,
                        ip_addr: &ip,
                        bank_code: bank.as_deref(),
                    };
                    commands::buy(billing, &config, user, request, now, out)
                }
                PremiumCommand::Order { id, cancel, reason } => {
                    let cancel = cancel.then_some(reason.as_deref());
                    commands::show_order(billing, &config, user, id, cancel, out)
                }
                PremiumCommand::Verify { gateway } => {
                    let callback = match gateway {
                        VerifyCommand::Vnpay { query } => Callback::VnPay(query),
                        VerifyCommand::Payos { file } => Callback::PayOs(read_body(&file)?),
                    };
                    commands::verify(billing, &config, callback, now, out)
                }
                PremiumCommand::Cancel => commands::cancel(billing, user, now, out),
            }
        }
    }
}

fn read_body(file: &Path) -> AppResult<String> {
    if file == Path::new("-") {
        let mut body = String::new();
        io::stdin().read_to_string(&mut body)?;
        return Ok(body);
    }
    fs::read_to_string(file).map_err(|e| AppError::Callback(format!("{}: {}", file.display(), e)))
}

fn play(app: App) -> AppResult<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let result = run_app(&mut stdout, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(stdout, LeaveAlternateScreen)?;

    result
}

fn run_app(stdout: &mut io::Stdout, mut app: App) -> AppResult<()> {
    let mut last_tick = Instant::now();

    loop {
        render::render(stdout, &app)?;
        stdout.flush()?;

        let timeout = TICK_RATE.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                // Windows reports releases too
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    break;
                }

                match app.handle_key(key) {
                    AppAction::Continue => {}
                    AppAction::Quit => break,
                }
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            app.tick();
            last_tick = Instant::now();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_premium_buy() {
        let cli = Cli::parse_from([
            "g2048", "--player", "ana", "premium", "buy", "2", "--method", "demo",
        ]);
        assert_eq!(cli.player, "ana");
        match cli.command {
            Some(Command::Premium {
                command: PremiumCommand::Buy { plan, method, .. },
            }) => {
                assert_eq!(plan, 2);
                assert_eq!(method, Some(PaymentMethod::Demo));
            }
            _ => panic!("expected premium buy"),
        }
    }

    #[test]
    fn test_rejects_bad_size_and_method() {
        assert!(Cli::try_parse_from(["g2048", "--size", "1"]).is_err());
        let cancel_method = ["g2048", "premium", "buy", "1", "--method", "manual_cancel"];
        assert!(Cli::try_parse_from(cancel_method).is_err());
    }

    #[test]
    fn test_default_command_is_play() {
        let cli = Cli::parse_from(["g2048"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.size as usize, DEFAULT_SIZE);
    }
}
