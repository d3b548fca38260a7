//! Headless application: wires the player to HTTP metadata, the manifest probe engine,
//! a clock-driven sink and a logging timeline, and runs the single-threaded event loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use common::{PlayerCamera, PlayerError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::archive::{ClickTarget, TimelineClick};
use crate::config::{ConfigManager, EnvConfigOverride, LoggingConfig, PlayerConfig};
use crate::heartbeat::{spawn_heartbeat, spawn_position_ticker, spawn_ticker};
use crate::player::{Player, PlayerCommand, PlayerEvent, RefreshRequest};
use crate::provider::{DataProvider, HttpDataProvider};
use crate::stream::{HeadlessSink, ProbeEngineFactory, StreamSession};
use crate::timeline::TracingTimeline;

pub struct PlayerApp {
    config: PlayerConfig,
    descriptor: PlayerCamera,
    requested_start: Option<i64>,
    session_id: Uuid,
}

impl PlayerApp {
    pub fn new(config: PlayerConfig, descriptor: PlayerCamera, requested_start: Option<i64>) -> Self {
        Self {
            config,
            descriptor,
            requested_start,
            session_id: Uuid::new_v4(),
        }
    }

    /// Load the TOML config (writing defaults if missing), then apply environment overrides.
    pub async fn with_config_file(
        config_path: PathBuf,
        descriptor: PlayerCamera,
        requested_start: Option<i64>,
    ) -> Result<Self, PlayerError> {
        let mut manager = ConfigManager::new(config_path);
        manager.load().await?;
        EnvConfigOverride::apply_overrides(manager.get_config_mut());
        manager.validate()?;
        Ok(Self::new(manager.into_config(), descriptor, requested_start))
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(config.with_target)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))
    }

    pub async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<PlayerCommand>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let span = info_span!("player", session = %self.session_id, camera = %self.descriptor.name);
        self.event_loop(&mut commands, shutdown).instrument(span).await
    }

    async fn event_loop(
        self,
        commands: &mut mpsc::UnboundedReceiver<PlayerCommand>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let config = self.config;
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (engine_tx, mut engine_rx) = mpsc::unbounded_channel();

        let http = HttpDataProvider::new(&config.server).context("Failed to create HTTP client")?;
        let factory = ProbeEngineFactory::new(http.client().clone(), engine_tx);
        let provider: Arc<dyn DataProvider> = Arc::new(http);

        let session = StreamSession::new(
            Box::new(factory),
            Box::new(HeadlessSink::default()),
            config.playback.max_fatal_retries,
            config.playback.network_retry_delay,
        );
        let timeline = TracingTimeline::new(config.timeline.initial_window_ms);

        let camera = self.descriptor.to_camera();
        let offset = config.playback.offset_for(self.descriptor.offset_minutes());
        let mut player = Player::new(&config, camera, offset, session, Box::new(timeline), events_tx.clone());
        player.controller_mut().request_start(self.requested_start);

        let tasks = [
            spawn_heartbeat(config.timeline.heartbeat_interval, events_tx.clone(), shutdown.child_token()),
            spawn_position_ticker(config.timeline.position_tick_interval, events_tx.clone(), shutdown.child_token()),
            spawn_ticker(
                config.timeline.refresh_interval,
                events_tx.clone(),
                shutdown.child_token(),
                || PlayerEvent::RefreshDue,
            ),
        ];

        info!(offset_minutes = offset, "Player started");
        if let Some(request) = player.start() {
            spawn_fetch(provider.clone(), request, events_tx.clone());
        }

        loop {
            let refresh = tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(event) = events_rx.recv() => player.handle_event(event),
                Some((engine_id, event)) = engine_rx.recv() => {
                    player.handle_event(PlayerEvent::Engine(engine_id, event))
                }
                Some(command) = commands.recv() => player.handle_command(command),
            };
            if let Some(request) = refresh {
                spawn_fetch(provider.clone(), request, events_tx.clone());
            }
        }

        player.shutdown();
        shutdown.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task failed");
            }
        }
        Ok(())
    }
}

/// Run a metadata fetch off the event loop and post its result back.
pub fn spawn_fetch(
    provider: Arc<dyn DataProvider>,
    request: RefreshRequest,
    events: mpsc::UnboundedSender<PlayerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = provider.fetch_archive_metadata(&request.camera).await;
        let _ = events.send(PlayerEvent::Metadata(request.ticket, result));
    })
}

/// One line of console input as a player command.
///
/// `live`, `back`, `forward`, `faster`, `slower`, `play`, `pause`, `follow on|off`,
/// `quality <name>`, `seek <epoch ms>`, `date <epoch ms>`, `volume <0..1>`.
pub fn parse_command(line: &str) -> Option<PlayerCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?;
    let argument = parts.next();

    let command = match (verb, argument) {
        ("live", None) => PlayerCommand::SetLive,
        ("back", None) => PlayerCommand::RewindBackward,
        ("forward", None) => PlayerCommand::RewindForward,
        ("faster", None) => PlayerCommand::IncreaseSpeed,
        ("slower", None) => PlayerCommand::DecreaseSpeed,
        ("play", None) => PlayerCommand::Play,
        ("pause", None) => PlayerCommand::Pause,
        ("follow", Some("on")) => PlayerCommand::SetFollow(true),
        ("follow", Some("off")) => PlayerCommand::SetFollow(false),
        ("quality", Some(name)) => PlayerCommand::ChangeQuality(name.to_string()),
        ("seek", Some(value)) => PlayerCommand::TimelineClick(TimelineClick {
            instant: value.parse().ok()?,
            target: ClickTarget::Background,
            group: None,
        }),
        ("date", Some(value)) => PlayerCommand::CalendarDate(value.parse().ok()?),
        ("volume", Some(value)) => PlayerCommand::SetVolume(value.parse().ok()?),
        _ => return None,
    };

    if parts.next().is_some() {
        return None;
    }
    Some(command)
}

/// Forward console commands until stdin closes.
pub fn spawn_stdin_commands(sender: mpsc::UnboundedSender<PlayerCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_command(&line) {
                Some(command) => {
                    if sender.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!(input = %line.trim(), "Unknown command"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert!(matches!(parse_command("live"), Some(PlayerCommand::SetLive)));
        assert!(matches!(parse_command("  back "), Some(PlayerCommand::RewindBackward)));
        assert!(matches!(parse_command("follow off"), Some(PlayerCommand::SetFollow(false))));
        assert!(matches!(
            parse_command("quality low"),
            Some(PlayerCommand::ChangeQuality(q)) if q == "low"
        ));
    }

    #[test]
    fn test_parse_seek_builds_background_click() {
        match parse_command("seek 1705312800000") {
            Some(PlayerCommand::TimelineClick(click)) => {
                assert_eq!(click.instant, 1_705_312_800_000);
                assert_eq!(click.target, ClickTarget::Background);
                assert_eq!(click.group, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_command("").is_none());
        assert!(parse_command("seek soon").is_none());
        assert!(parse_command("live now").is_none());
        assert!(parse_command("rewind").is_none());
    }
}
