use std::path::PathBuf;

use anyhow::{Context, Result};
use archive_player::app::{spawn_stdin_commands, PlayerApp};
use clap::{Arg, Command};
use common::PlayerCamera;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("archive-player")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Headless live/archive playback session for one camera")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Player configuration file, created with defaults if missing")
                .default_value("archive_player.toml"),
        )
        .arg(
            Arg::new("camera")
                .long("camera")
                .value_name("PATH")
                .help("JSON camera descriptor")
                .required(true),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .value_name("EPOCH_MS")
                .help("Open the archive at this instant instead of live"),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("archive_player.toml"));
    let camera_path = matches
        .get_one::<String>("camera")
        .context("--camera is required")?;
    let start = matches
        .get_one::<String>("start")
        .map(|value| value.parse::<i64>())
        .transpose()
        .context("--start must be an epoch timestamp in milliseconds")?;

    let descriptor = tokio::fs::read_to_string(camera_path)
        .await
        .with_context(|| format!("Failed to read camera descriptor {}", camera_path))?;
    let descriptor: PlayerCamera =
        serde_json::from_str(&descriptor).context("Invalid camera descriptor")?;

    // 加载配置并初始化日志
    let app = PlayerApp::with_config_file(config_path, descriptor, start).await?;
    PlayerApp::init_logging(&app.config().logging)?;
    info!(session = %app.session_id(), "archive-player {}", env!("CARGO_PKG_VERSION"));

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                ctrl_c_token.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    spawn_stdin_commands(command_tx);

    app.run(command_rx, shutdown).await
}
