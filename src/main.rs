use color_eyre::{Result, eyre::eyre};
use tracing::{error, info};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::fmt;

pub mod app;
pub mod config;
pub mod console;
pub mod csv_utils;
pub mod measurement;
pub mod preset;
pub mod serial_session;
pub mod transcript;

use config::Config;
use console::Console;
use serial_session::{SerialSession, SystemOpener};
use transcript::Transcript;

/// Entry point: check for the rig, open it, then hand the terminal to the app.
fn main() -> Result<()> {
    color_eyre::install()?;
    let config = Config::default();
    let _guard = setup_logging(&config);
    info!("starting waterflow console");

    let ports = serial_session::list_ports();
    let Some(rig) = app::rig_port(&ports, &config.expected_device) else {
        error!("no rig adapter among {} port(s)", ports.len());
        return Err(eyre!(
            "No USB Serial detected.\nPlease check your connection first."
        ));
    };
    let session = SerialSession::open(&rig.port_name, &config, Box::new(SystemOpener))?;

    let mut transcript = Transcript::new(&config.system_log_dir);
    transcript.start_session();
    let console = Console::new(session, transcript);

    let terminal = ratatui::init();
    let result = app::App::new(console, ports, config).run(terminal);
    ratatui::restore();
    info!("console closed");
    result
}

/// Diagnostics go to a daily file; the terminal belongs to the UI.
fn setup_logging(config: &Config) -> WorkerGuard {
    let file_appender = rolling::daily(&config.diag_log_dir, "waterflow.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_level(true)
        .init();
    guard
}
