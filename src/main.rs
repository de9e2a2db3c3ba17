//! # AirPointr Gesture Client
//! Turns hand gestures picked up by a sensor service into media player
//! commands.
//!
//! ## Flow
//! - **Discovery:** services broadcast announcements to UDP 8980; the client
//!   keeps a registry of them and registers with the controlling one.
//! - **Heartbeat:** every 15 s stale services expire and active ones get a
//!   fresh `register`.
//! - **Control:** pointer samples from the controlling service go through the
//!   gesture interpreter; volume, transport and smart-circle events land on
//!   Kodi or MPD.
//!
//! ## Modes
//! - default: drive the configured media backend
//! - `--monitor`: log every pointer sample, no backend
//!
//! Stop with Enter; with stdin closed the client runs until killed.

use clap::Parser;
use std::{
    io::{stdin, stdout, Write},
    path::PathBuf,
    process::ExitCode,
    thread,
};
use log::{error, info, warn};

use airpointr_client::control::{kodi::KodiBackend, mpd::MpdBackend, sink::{CommandSink, MediaBackend}};
use airpointr_client::session::Session;
use airpointr_client::utils::{
    config::{BackendConfig, BackendKind, Config},
    error::Result,
};

#[derive(Debug, Parser)]
#[command(name = "airpointr_client", version, about = "Gesture control client for AirPointr sensor services")]
struct Args {
    /// TOML configuration file; stock defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log pointer samples instead of driving a media player.
    #[arg(short, long)]
    monitor: bool,

    /// Override `backend.kind` from the configuration.
    #[arg(short, long, value_enum)]
    backend: Option<BackendKind>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(kind) = args.backend {
        config.backend.kind = kind;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.logging.level.as_str()))
        .init();
    info!("=== AIRPOINTR CLIENT START ===");

    match run(&config, args.monitor) {
        Ok(()) => {
            info!("=== AIRPOINTR CLIENT FINISHED ===");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, monitor: bool) -> Result<()> {
    let sink = if monitor {
        info!("[Main] Monitor mode, no media backend");
        None
    } else {
        let mut sink = CommandSink::new(open_backend(&config.backend)?);
        let state = sink.probe()?;
        info!("[Main] {} reachable, playback {:?}", sink.backend_name(), state);
        Some(sink)
    };

    let session = Session::start(config, sink)?;

    wait_for_enter();

    info!("[Main] Shutting down...");
    session.shutdown();
    Ok(())
}

fn open_backend(cfg: &BackendConfig) -> Result<Box<dyn MediaBackend>> {
    let backend: Box<dyn MediaBackend> = match cfg.kind {
        BackendKind::Kodi => Box::new(KodiBackend::new(
            &cfg.host,
            cfg.port(),
            cfg.username.clone(),
            cfg.password.clone(),
            cfg.timeout(),
        )?),
        BackendKind::Mpd => {
            if cfg.username.is_some() {
                warn!("[Main] backend.username is ignored for mpd");
            }
            Box::new(MpdBackend::new(
                &cfg.host,
                cfg.port(),
                cfg.password.clone(),
                cfg.timeout(),
            )?)
        }
    };
    info!("[Main] Backend {} at {}:{}", backend.name(), cfg.host, cfg.port());
    Ok(backend)
}

/// Blocks until Enter. Without a terminal (stdin closed) the client runs
/// until it is killed.
fn wait_for_enter() {
    print!("Press Enter to stop... ");
    let _ = stdout().flush();

    let mut input = String::new();
    match stdin().read_line(&mut input) {
        Ok(0) => loop {
            thread::park();
        },
        Ok(_) => {}
        Err(e) => {
            warn!("[Main] stdin unreadable ({}), running until killed", e);
            loop {
                thread::park();
            }
        }
    }
}

