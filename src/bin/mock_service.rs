//! Mock sensor service: announces itself, accepts registrations and streams
//! a scripted gesture sequence, so the client can be exercised without a
//! camera.

use clap::Parser;
use std::{
    io::stdin,
    net::SocketAddr,
    process::ExitCode,
    time::Duration,
};
use log::{error, info};

use airpointr_client::advanced::{
    gesture_script::GestureScript,
    mock_service::{MockService, MockServiceConfig},
};
use airpointr_client::protocol::codec::LicenseStatus;

#[derive(Debug, Parser)]
#[command(name = "mock_service", about = "Scripted stand-in for an AirPointr sensor service")]
struct Args {
    /// Gesture socket address.
    #[arg(long, default_value = "0.0.0.0:8981")]
    bind: SocketAddr,

    /// Discovery target (broadcast or a single client).
    #[arg(long, default_value = "255.255.255.255:8980")]
    announce_to: SocketAddr,

    #[arg(long, default_value = "mock-sensor")]
    hostname: String,

    /// License reported with every pointer frame (demo, licensed, expired, ...).
    #[arg(long, default_value = "demo")]
    license: String,

    /// Milliseconds between pointer frames.
    #[arg(long, default_value_t = 20)]
    period_ms: u64,

    /// Replay the demo script forever.
    #[arg(long)]
    repeat: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = MockServiceConfig {
        bind: args.bind,
        announce_to: args.announce_to,
        hostname: args.hostname,
        license: LicenseStatus::from(args.license),
        frame_period: Duration::from_millis(args.period_ms.max(1)),
        repeat: args.repeat,
        ..MockServiceConfig::default()
    };

    let handle = match MockService::bind(config).and_then(|s| s.spawn(GestureScript::demo())) {
        Ok(h) => h,
        Err(e) => {
            error!("[MockService] Cannot start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("[MockService] Press Enter to stop");
    let mut line = String::new();
    let _ = stdin().read_line(&mut line);

    info!("[MockService] {} frames sent", handle.frames_sent());
    handle.stop();
    ExitCode::SUCCESS
}
