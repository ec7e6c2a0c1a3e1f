use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, mpsc};

use clap::Parser;
use nvr_kiosk_app::harness::{
    HeadlessHost, LinePage, LoopExit, now_ms, run_event_loop, spawn_line_reader,
};
use nvr_kiosk_app::{AppError, Controller, ControllerSettings, HostShell, app_version};
use nvr_kiosk_config::{ConfigStore, DEFAULT_CONFIG_FILE, JsonFileConfigStore};
use tracing_subscriber::EnvFilter;

/// Kiosk shell controller for a network video recorder dashboard.
///
/// Page envelopes and host commands are read from stdin as JSON lines;
/// broadcasts and replies are written to stdout.
#[derive(Debug, Parser)]
#[command(name = "nvr-kiosk", version = app_version())]
struct Cli {
    /// Clear the persisted config before launching.
    #[arg(long)]
    reset: bool,

    /// Path of the persisted config document.
    #[arg(long, env = "NVR_KIOSK_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Answer reset confirmations with yes.
    #[arg(long)]
    assume_yes: bool,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(stage = "shell", action = "fatal", %error);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("NVR_KIOSK_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<(), AppError> {
    let store: Arc<dyn ConfigStore> = Arc::new(JsonFileConfigStore::new(cli.config.clone()));
    if cli.reset {
        store.clear()?;
        tracing::info!(stage = "config", action = "reset", path = %cli.config.display());
    }

    let settings = ControllerSettings::from_env();
    tracing::info!(
        stage = "shell",
        action = "start",
        version = app_version(),
        auto_login = settings.auto_login_enabled,
        config = %cli.config.display()
    );

    let (events_tx, events_rx) = mpsc::channel();
    spawn_line_reader(BufReader::new(io::stdin()), events_tx.clone())?;

    let mut fullscreen = false;
    loop {
        let mut host = HeadlessHost::new(events_tx.clone(), fullscreen);
        if cli.assume_yes {
            host = host.confirming_resets();
        }
        let page = LinePage::new(io::stdout());
        let mut controller = Controller::new(host, page, Arc::clone(&store), settings);
        controller.start(now_ms());

        match run_event_loop(&mut controller, &events_rx) {
            LoopExit::Relaunch => {
                fullscreen = controller.host().is_fullscreen();
                tracing::info!(stage = "shell", action = "relaunched", fullscreen);
            }
            LoopExit::InputClosed => {
                tracing::info!(stage = "shell", action = "stop", "input closed");
                return Ok(());
            }
        }
    }
}
