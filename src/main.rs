use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use arboard::Clipboard;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod columns;
mod controller;
mod domain;
mod inputter;
mod market;
mod model;
mod source;
mod storage;
mod table;
mod ui;
mod view_controller;
mod views;

use columns::Registry;
use controller::Controller;
use domain::{DashConfig, DashError};
use model::{Model, Status};
use source::{
    COINGECKO_API_URL, CachedSource, HttpSource, JsonFileSource, MarketSource, SystemClock,
};
use storage::{FileStorage, MemoryStorage, Storage};
use ui::{MouseCapture, TableUI};
use view_controller::ViewController;
use views::ViewStore;

/// Terminal crypto market dashboard with customizable, saved table views.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Base url of the market API
    #[arg(long, default_value = COINGECKO_API_URL)]
    api_url: String,

    /// Read a `/coins/markets` response saved as JSON instead of the API,
    /// re-read on every refresh
    #[arg(short, long)]
    data: Option<String>,

    /// Directory holding the saved views
    #[arg(long, default_value = "~/.config/coinview")]
    views_dir: String,

    /// Keep saved views in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Seconds before market data is refreshed
    #[arg(long, default_value_t = 600)]
    refresh_secs: u64,

    /// Milliseconds to wait for terminal events per loop
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    #[arg(long, default_value = "coinview.log")]
    log_file: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let result = run(args);
    ratatui::restore();
    match result {
        Err(e) => {
            error!("Exiting with error: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn expand(path: &str) -> Result<PathBuf, DashError> {
    Ok(PathBuf::from(shellexpand::full(path)?.into_owned()))
}

/// Logs go to a file, the terminal belongs to the UI.
fn init_tracing(path: &Path) -> Result<(), DashError> {
    let file = File::create(path)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coinview=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(args: Args) -> Result<(), DashError> {
    init_tracing(&expand(&args.log_file)?)?;

    let views_dir = if args.ephemeral {
        None
    } else {
        Some(expand(&args.views_dir)?)
    };
    let data_path = args.data.as_deref().map(expand).transpose()?;
    let config = DashConfig::default()
        .event_poll_time(args.poll_ms)
        .refresh_interval(Duration::from_secs(args.refresh_secs))
        .api_url(args.api_url)
        .data_path(data_path)
        .views_dir(views_dir);
    info!("Starting coinview with {config:?}");

    let registry = Registry::builtin();
    let storage: Box<dyn Storage> = match &config.views_dir {
        Some(dir) => Box::new(FileStorage::open(dir)?),
        None => Box::new(MemoryStorage::default()),
    };
    let views = ViewController::new(registry, ViewStore::load(storage, registry));
    let market_source: Box<dyn MarketSource> = match &config.data_path {
        Some(path) => Box::new(JsonFileSource::new(path.clone())),
        None => Box::new(HttpSource::new(&config.api_url)?),
    };
    let source = CachedSource::new(market_source, SystemClock, config.refresh_interval);
    let clipboard = Clipboard::new()
        .map_err(|e| warn!("Clipboard is not available: {e}"))
        .ok();

    let mut terminal = ratatui::init();
    let _mouse = MouseCapture::enable(std::io::stdout())?;
    let size = terminal.size()?;

    let mut model = Model::init(
        &config,
        views,
        source,
        clipboard,
        size.width.into(),
        size.height.into(),
    );
    let mut ui = TableUI::new();
    let controller = Controller::new(&config);

    while model.status != Status::QUITTING {
        model.tick();

        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }

    info!("Bye");
    Ok(())
}
