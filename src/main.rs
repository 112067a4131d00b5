use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::{cursor, queue, style, terminal};

use beadboard::archive::FsArchiveReader;
use beadboard::config::{self, DashboardOptions};
use beadboard::dashboard::Dashboard;
use beadboard::lock;
use beadboard::log::{init_file_sink, LogLevel};
use beadboard::msg::{Key, Msg};
use beadboard::runner::{AgentPipelineRunner, CommandPostAction, SequentialCampaignRunner};
use beadboard::runtime::Runtime;
use beadboard::store::BdCliStore;
use beadboard::{log_error, log_info};

#[derive(Parser)]
#[command(
    name = "beadboard",
    about = "Interactive dashboard dispatching AI pipelines over a beads backlog"
)]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Path to config file (defaults to {root}/beadboard.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log verbosity level (error, warn, info, debug)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter beadboard.toml
    Init,
    /// Launch the dashboard (the default)
    Run,
}

const STARTER_CONFIG: &str = r#"# beadboard configuration

active_provider = "claude"

[project]
bead_cli = "bd"
archive_dir = "_archive"
closed_fetch_limit = 50

[execution]
phase_timeout_minutes = 30
max_retries = 2

[[providers]]
name = "claude"
cli = "claude"

[[phases]]
name = "plan"

[[phases]]
name = "code"

[[phases]]
name = "test"

[[phases]]
name = "review"

# [campaign]
# validation_command = "bd verify"

# [post_action]
# command = "bd close"
"#;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let level: LogLevel = cli.log_level.parse()?;

    let root = cli
        .root
        .canonicalize()
        .map_err(|e| format!("Invalid root {}: {}", cli.root.display(), e))?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init => init_project(&root),
        Commands::Run => run_dashboard(&root, cli.config.as_deref(), level).await,
    }
}

fn init_project(root: &Path) -> Result<(), String> {
    let config_path = root.join("beadboard.toml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }
    std::fs::write(&config_path, STARTER_CONFIG)
        .map_err(|e| format!("Failed to write {}: {}", config_path.display(), e))?;
    println!("Wrote {}", config_path.display());
    Ok(())
}

async fn run_dashboard(root: &Path, config_path: Option<&Path>, level: LogLevel) -> Result<(), String> {
    let config = match config_path {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config(root)?,
    };

    let runtime_dir = root.join(".beadboard");
    init_file_sink(&runtime_dir.join("beadboard.log"), level)?;
    let _lock = lock::try_acquire(&runtime_dir)?;
    log_info!("beadboard starting in {}", root.display());

    // Wire the collaborators.
    let store = Arc::new(BdCliStore::new(&config.project.bead_cli, root));
    let pipeline_runner = Arc::new(AgentPipelineRunner::new(&config, root));
    let campaign_runner = Arc::new(SequentialCampaignRunner::new(
        config.campaign.validation_command.clone(),
        root,
    ));
    let archive = Arc::new(FsArchiveReader::new(&root.join(&config.project.archive_dir)));

    let mut options = DashboardOptions::new(
        config.phases.iter().map(|p| p.name.clone()).collect(),
    )
    .with_lister(store.clone())
    .with_resolver(store)
    .with_pipeline_runner(pipeline_runner)
    .with_campaign_runner(campaign_runner)
    .with_archive(archive)
    .with_campaign_validation(config.campaign.validation_command.is_some())
    .with_providers(
        config.providers.iter().map(|p| p.name.clone()).collect(),
        &config.active_provider,
    )
    .with_closed_fetch_limit(config.project.closed_fetch_limit);
    if let Some(command) = &config.post_action.command {
        options = options.with_post_action(Arc::new(CommandPostAction::new(command, root)));
    }

    let dashboard = Dashboard::new(&options);
    let runtime = Runtime::new(options);

    // Terminal session: raw mode + alternate screen, restored on drop and
    // on panic.
    let _guard = TerminalGuard::enter()?;
    install_panic_hook();

    let input_tx = runtime.sender();
    if let Ok((w, h)) = terminal::size() {
        let _ = input_tx.send(Msg::Resize(w, h));
    }
    spawn_input_thread(input_tx);

    let result = runtime
        .run(dashboard, |dashboard| draw(&dashboard.view()))
        .await;
    log_info!("beadboard exiting");
    result.map_err(|e| e.to_string())
}

// --- Terminal plumbing ---

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self, String> {
        terminal::enable_raw_mode().map_err(|e| format!("Failed to enable raw mode: {}", e))?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, terminal::EnterAlternateScreen, cursor::Hide)
            .map_err(|e| format!("Failed to enter alternate screen: {}", e))?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        restore_terminal();
    }
}

fn restore_terminal() {
    let mut stdout = io::stdout();
    let _ = crossterm::execute!(stdout, cursor::Show, terminal::LeaveAlternateScreen);
    let _ = terminal::disable_raw_mode();
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        restore_terminal();
        log_error!("panic: {}", info);
        default_hook(info);
    }));
}

fn draw(frame: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    queue!(
        stdout,
        terminal::Clear(terminal::ClearType::All),
        cursor::MoveTo(0, 0)
    )?;
    for (row, line) in frame.lines().enumerate() {
        queue!(stdout, cursor::MoveTo(0, row as u16), style::Print(line))?;
    }
    stdout.flush()
}

/// Blocking reader for terminal events, forwarded into the update loop.
/// Dies with the process when the loop exits.
fn spawn_input_thread(tx: tokio::sync::mpsc::UnboundedSender<Msg>) {
    std::thread::spawn(move || loop {
        match crossterm::event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                if let Some(decoded) = translate_key(key.code, key.modifiers) {
                    if tx.send(Msg::Key(decoded)).is_err() {
                        break;
                    }
                }
            }
            Ok(Event::Resize(w, h)) => {
                if tx.send(Msg::Resize(w, h)).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                log_error!("input read failed: {}", e);
                break;
            }
        }
    });
}

fn translate_key(code: KeyCode, modifiers: KeyModifiers) -> Option<Key> {
    if modifiers.contains(KeyModifiers::CONTROL) {
        return match code {
            KeyCode::Char('c') => Some(Key::CtrlC),
            _ => None,
        };
    }
    match code {
        KeyCode::Char(c) => Some(Key::Char(c)),
        KeyCode::Up => Some(Key::Up),
        KeyCode::Down => Some(Key::Down),
        KeyCode::Left => Some(Key::Left),
        KeyCode::Right => Some(Key::Right),
        KeyCode::Enter => Some(Key::Enter),
        KeyCode::Esc => Some(Key::Esc),
        KeyCode::Tab => Some(Key::Tab),
        KeyCode::PageUp => Some(Key::PageUp),
        KeyCode::PageDown => Some(Key::PageDown),
        _ => None,
    }
}
