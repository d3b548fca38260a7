use std::time::Duration;

use common::{PlaybackErrorKind, PlayerError, Result, SourceType};
use tracing::{debug, error, info, warn};

use super::engine::{EngineConfig, EngineErrorKind, EngineEvent, EngineFactory, EngineId, StreamingEngine};
use super::sink::VideoSink;
use crate::archive::SourceRequest;
use crate::clock::ClockModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStrategy {
    Native,
    Adaptive,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Detached,
    Attached,
    /// A fatal error is being recovered from
    Recovering,
    Failed,
}

/// Fatal error bookkeeping; the counter restarts on every parsed manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalState {
    pub in_error: bool,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl FatalState {
    fn new(max_retries: u32) -> Self {
        Self {
            in_error: false,
            retry_count: 0,
            max_retries,
        }
    }
}

/// What the session did with a load request or engine event
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Ignored,
    /// A new engine is loading the source
    Loading,
    /// Same source, only the position changed
    Seeked,
    Attached,
    /// Source playable; carries the derived segment clock correction
    Ready { server_offset: f64 },
    /// Reload the same source after `delay`
    RetryAfter(Duration),
    MediaRecovery,
    Detached,
    Failed(PlaybackErrorKind),
}

/// Owns the streaming engine and the video sink for one camera.
pub struct StreamSession {
    factory: Box<dyn EngineFactory>,
    sink: Box<dyn VideoSink>,
    engine: Option<Box<dyn StreamingEngine>>,
    next_engine_id: EngineId,
    strategy: Option<PlaybackStrategy>,
    state: SessionState,
    fatal: FatalState,
    source: Option<SourceRequest>,
    server_offset: f64,
    retry_delay: Duration,
    retry_pending: bool,
}

impl StreamSession {
    pub fn new(
        factory: Box<dyn EngineFactory>,
        sink: Box<dyn VideoSink>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            factory,
            sink,
            engine: None,
            next_engine_id: 1,
            strategy: None,
            state: SessionState::Detached,
            fatal: FatalState::new(max_retries),
            source: None,
            server_offset: 0.0,
            retry_delay,
            retry_pending: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn strategy(&self) -> Option<PlaybackStrategy> {
        self.strategy
    }

    pub fn fatal(&self) -> FatalState {
        self.fatal
    }

    pub fn source(&self) -> Option<&SourceRequest> {
        self.source.as_ref()
    }

    pub fn server_offset(&self) -> f64 {
        self.server_offset
    }

    pub fn engine_id(&self) -> Option<EngineId> {
        self.engine.as_ref().map(|e| e.id())
    }

    pub fn sink(&self) -> &dyn VideoSink {
        self.sink.as_ref()
    }

    pub fn sink_mut(&mut self) -> &mut dyn VideoSink {
        self.sink.as_mut()
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    fn select_strategy(&self) -> PlaybackStrategy {
        if self.sink.can_play_native() {
            PlaybackStrategy::Native
        } else if self.factory.is_supported() {
            PlaybackStrategy::Adaptive
        } else {
            PlaybackStrategy::Unsupported
        }
    }

    /// Pick the playback strategy and load the first source.
    pub fn init(&mut self, source: SourceRequest) -> Result<SessionOutcome> {
        let strategy = self.select_strategy();
        info!(?strategy, "Stream session initialised");
        self.strategy = Some(strategy);
        self.load(source)
    }

    /// Play `source`. A different source always recreates the engine; an archive source
    /// with the same URL only seeks.
    pub fn load(&mut self, source: SourceRequest) -> Result<SessionOutcome> {
        let strategy = match self.strategy {
            Some(strategy) => strategy,
            None => {
                let strategy = self.select_strategy();
                self.strategy = Some(strategy);
                strategy
            }
        };

        if strategy == PlaybackStrategy::Unsupported {
            self.destroy();
            self.sink.show_error(PlaybackErrorKind::Hard);
            self.state = SessionState::Failed;
            return Err(PlayerError::UnsupportedFormat(source.url));
        }

        self.retry_pending = false;

        if self.is_same_archive_source(&source) {
            let position = source.start_position.map(f64::from).unwrap_or(0.0) - self.server_offset;
            debug!(position, "Seeking within loaded source");
            self.sink.set_current_time(position.max(0.0));
            self.source = Some(source);
            return Ok(SessionOutcome::Seeked);
        }

        info!(kind = ?source.kind, url = %source.url, "Loading source");
        self.source = Some(source);
        self.server_offset = 0.0;
        Ok(self.reload())
    }

    fn is_same_archive_source(&self, source: &SourceRequest) -> bool {
        self.state == SessionState::Attached
            && source.kind == SourceType::Archive
            && self
                .source
                .as_ref()
                .is_some_and(|current| current.kind == SourceType::Archive && current.url == source.url)
    }

    /// Tear down and recreate playback for the current source.
    fn reload(&mut self) -> SessionOutcome {
        let Some(source) = self.source.clone() else {
            return SessionOutcome::Ignored;
        };
        let start_position = source.start_position.map(f64::from);

        match self.strategy {
            Some(PlaybackStrategy::Native) => {
                self.sink.set_src(&source.url);
                if let Some(position) = start_position {
                    self.sink.set_current_time(position);
                }
                self.sink.play();
                self.state = SessionState::Attached;
                SessionOutcome::Ready { server_offset: 0.0 }
            }
            Some(PlaybackStrategy::Adaptive) => {
                self.destroy();
                let id = self.next_engine_id;
                self.next_engine_id += 1;
                let config = EngineConfig {
                    low_latency: true,
                    start_position,
                };
                let mut engine = self.factory.create(id, config);
                engine.attach_media();
                self.engine = Some(engine);
                self.sink.set_src(&source.url);
                debug!(engine_id = id, "Engine created");
                SessionOutcome::Loading
            }
            _ => SessionOutcome::Ignored,
        }
    }

    pub fn handle_engine_event(&mut self, engine_id: EngineId, event: EngineEvent) -> SessionOutcome {
        if self.engine_id() != Some(engine_id) {
            debug!(engine_id, ?event, "Dropping event from stale engine");
            return SessionOutcome::Ignored;
        }

        match event {
            EngineEvent::MediaAttached => {
                self.state = SessionState::Attached;
                if let (Some(engine), Some(source)) = (self.engine.as_mut(), self.source.as_ref()) {
                    engine.load_source(&source.url);
                }
                SessionOutcome::Attached
            }
            EngineEvent::ManifestParsed { first_fragment } => self.on_manifest_parsed(first_fragment),
            EngineEvent::MediaDetached => {
                self.state = SessionState::Detached;
                SessionOutcome::Detached
            }
            EngineEvent::Error { fatal: false, kind, details } => {
                debug!(?kind, details = %details, "Non-fatal engine error");
                SessionOutcome::Ignored
            }
            EngineEvent::Error { fatal: true, kind, details } => self.on_fatal_error(kind, &details),
        }
    }

    fn on_manifest_parsed(&mut self, first_fragment: Option<String>) -> SessionOutcome {
        self.fatal.in_error = false;
        self.fatal.retry_count = 0;
        self.state = SessionState::Attached;

        let live = self.source.as_ref().is_some_and(|s| s.kind == SourceType::Live);
        self.server_offset = if live {
            0.0
        } else {
            ClockModel::derive_server_offset(first_fragment.as_deref().unwrap_or(""))
        };

        if let Some(engine) = self.engine.as_mut() {
            if let Some(start) = engine.start_position().filter(|s| *s > 0.0) {
                let corrected = start - self.server_offset;
                engine.set_start_position(corrected);
                self.sink.set_current_time(corrected);
            }
        }
        self.sink.play();

        debug!(server_offset = self.server_offset, "Manifest parsed");
        SessionOutcome::Ready {
            server_offset: self.server_offset,
        }
    }

    fn on_fatal_error(&mut self, kind: EngineErrorKind, details: &str) -> SessionOutcome {
        self.fatal.in_error = true;
        self.fatal.retry_count += 1;
        warn!(
            ?kind,
            details,
            retry = self.fatal.retry_count,
            max = self.fatal.max_retries,
            "Fatal engine error"
        );

        if self.fatal.retry_count >= self.fatal.max_retries {
            error!("Retry budget exhausted, stopping playback");
            return self.fail(PlaybackErrorKind::Hard);
        }

        match kind {
            EngineErrorKind::Network => {
                self.state = SessionState::Recovering;
                self.retry_pending = true;
                SessionOutcome::RetryAfter(self.retry_delay)
            }
            EngineErrorKind::Media => {
                self.state = SessionState::Recovering;
                if let Some(engine) = self.engine.as_mut() {
                    engine.recover_media_error();
                }
                SessionOutcome::MediaRecovery
            }
            EngineErrorKind::Other => self.fail(PlaybackErrorKind::Soft),
        }
    }

    fn fail(&mut self, kind: PlaybackErrorKind) -> SessionOutcome {
        self.destroy();
        self.sink.show_error(kind);
        self.state = SessionState::Failed;
        SessionOutcome::Failed(kind)
    }

    /// The network retry delay elapsed. Does nothing if a newer load superseded the retry.
    pub fn on_retry_timer(&mut self) -> SessionOutcome {
        if !self.retry_pending || self.state == SessionState::Failed {
            debug!("Dropping stale retry");
            return SessionOutcome::Ignored;
        }
        self.retry_pending = false;
        info!("Retrying source after network error");
        self.reload()
    }

    pub fn destroy(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop_load();
            engine.destroy();
            debug!(engine_id = engine.id(), "Engine destroyed");
        }
        self.state = SessionState::Detached;
        self.retry_pending = false;
    }

    /// Drop the engine and clear the sticky error, ready for a new camera.
    pub fn reset(&mut self) {
        self.destroy();
        self.source = None;
        self.server_offset = 0.0;
        self.fatal = FatalState::new(self.fatal.max_retries);
        self.sink.clear_error();
    }
}
