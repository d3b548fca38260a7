//! Player aggregate: routes events between the archive controller, the stream session and
//! the timeline widget.

use std::time::Duration;

use common::{ArchiveMetadata, Camera, PlaybackErrorKind, PlayerError, Quality, Result, SourceType, TimeWindow};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::archive::{
    ArchiveController, ArchiveSettings, PositionSample, SourceRequest, TimelineClick, Transition,
};
use crate::config::PlayerConfig;
use crate::fragments::JoinThresholds;
use crate::speed::SpeedLadder;
use crate::stream::{EngineEvent, EngineId, SessionOutcome, StreamSession};
use crate::timeline::{apply_changes, TimelineWidget};
use crate::timer::{TimerPurpose, TimerRegistry};

const HOUR_SECONDS: f64 = 3600.0;

/// Identifies one metadata fetch. Only the latest ticket for the current camera is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    pub generation: u64,
    pub camera: String,
}

/// Metadata fetch the event loop has to run
#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub ticket: RefreshTicket,
    pub camera: Camera,
}

#[derive(Debug, Clone)]
pub enum PlayerCommand {
    SetLive,
    RewindBackward,
    RewindForward,
    TimelineClick(TimelineClick),
    CalendarDate(i64),
    ChangeQuality(String),
    IncreaseSpeed,
    DecreaseSpeed,
    SetFollow(bool),
    /// Visible timeline window changed by zoom or pan
    RangeChanged(TimeWindow),
    Play,
    Pause,
    SetVolume(f64),
    SwitchCamera { camera: Camera, offset_minutes: i32 },
}

#[derive(Debug)]
pub enum PlayerEvent {
    Heartbeat,
    PositionTick,
    RefreshDue,
    Engine(EngineId, EngineEvent),
    TimerFired(TimerPurpose, u64),
    Metadata(RefreshTicket, Result<ArchiveMetadata>),
    /// The loaded hour source played to its end
    SourceEnded,
    Command(PlayerCommand),
}

pub struct Player {
    controller: ArchiveController,
    session: StreamSession,
    timeline: Box<dyn TimelineWidget>,
    timers: TimerRegistry,
    speed: SpeedLadder,
    refresh_generation: u64,
    latest_refresh: Option<RefreshTicket>,
    motion_settle_delay: Duration,
    session_started: bool,
}

impl Player {
    pub fn new(
        config: &PlayerConfig,
        camera: Camera,
        offset_minutes: i32,
        session: StreamSession,
        timeline: Box<dyn TimelineWidget>,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Self {
        let quality = Quality {
            current: config.playback.default_quality.clone(),
            ..Quality::default()
        };
        let thresholds = JoinThresholds {
            start: config.timeline.join_start_ms,
            end: config.timeline.join_end_ms,
            max: config.timeline.join_max_ms,
            divisor: config.timeline.join_divisor,
        };
        let settings = ArchiveSettings::from_config(&config.playback, &config.timeline);

        Self {
            controller: ArchiveController::new(camera, offset_minutes, quality, settings, thresholds),
            session,
            timeline,
            timers: TimerRegistry::new(events),
            speed: SpeedLadder::default(),
            refresh_generation: 0,
            latest_refresh: None,
            motion_settle_delay: config.timeline.motion_settle_delay,
            session_started: false,
        }
    }

    pub fn controller(&self) -> &ArchiveController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ArchiveController {
        &mut self.controller
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn timeline(&self) -> &dyn TimelineWidget {
        self.timeline.as_ref()
    }

    pub fn speed(&self) -> SpeedLadder {
        self.speed
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Kick off the first metadata fetch.
    pub fn start(&mut self) -> Option<RefreshRequest> {
        self.begin_refresh()
    }

    pub fn shutdown(&mut self) {
        self.timers.cancel_all();
        self.session.destroy();
        info!(camera = %self.controller.camera().name, "Player stopped");
    }

    pub fn begin_refresh(&mut self) -> Option<RefreshRequest> {
        if !self.controller.needs_metadata() {
            if !self.controller.is_loaded() && self.session.sink().error().is_none() {
                warn!(codec = %self.controller.camera().codec, "Codec not supported, archive disabled");
                self.session.sink_mut().show_error(PlaybackErrorKind::Hard);
            }
            return None;
        }

        self.refresh_generation += 1;
        let ticket = RefreshTicket {
            generation: self.refresh_generation,
            camera: self.controller.camera().name.clone(),
        };
        self.latest_refresh = Some(ticket.clone());
        debug!(generation = ticket.generation, camera = %ticket.camera, "Metadata refresh started");

        Some(RefreshRequest {
            ticket,
            camera: self.controller.camera().clone(),
        })
    }

    fn is_current_refresh(&self, ticket: &RefreshTicket) -> bool {
        self.latest_refresh.as_ref() == Some(ticket) && ticket.camera == self.controller.camera().name
    }

    pub fn on_metadata(&mut self, ticket: RefreshTicket, result: Result<ArchiveMetadata>) {
        if !self.is_current_refresh(&ticket) {
            debug!(generation = ticket.generation, camera = %ticket.camera, "Dropping stale metadata response");
            return;
        }

        match result {
            Ok(metadata) => {
                let first_load = !self.controller.is_loaded();
                let transition = self.controller.apply_metadata(metadata);
                self.apply(transition);

                if first_load {
                    let current = self.controller.date().current;
                    self.timeline.move_to(current);
                    self.controller.set_timeline_attached(true);
                    let motion = self.controller.render_motion(self.timeline.visible_window());
                    self.apply(motion);
                }
            }
            Err(PlayerError::ArchiveDataMissing(camera)) => {
                error!(camera = %camera, "Server returned no archive data");
                self.session.sink_mut().show_error(PlaybackErrorKind::Hard);
            }
            Err(e) => {
                warn!(error = %e, "Metadata fetch failed, keeping previous data");
            }
        }
    }

    /// Returns a metadata fetch to run when the event calls for one.
    pub fn handle_event(&mut self, event: PlayerEvent) -> Option<RefreshRequest> {
        match event {
            PlayerEvent::Heartbeat => {
                let transition = self.controller.heartbeat();
                self.apply(transition);
            }
            PlayerEvent::PositionTick => self.on_position_tick(),
            PlayerEvent::RefreshDue => return self.begin_refresh(),
            PlayerEvent::Engine(engine_id, event) => {
                let outcome = self.session.handle_engine_event(engine_id, event);
                self.on_session_outcome(outcome);
            }
            PlayerEvent::TimerFired(purpose, generation) => self.on_timer(purpose, generation),
            PlayerEvent::Metadata(ticket, result) => self.on_metadata(ticket, result),
            PlayerEvent::SourceEnded => {
                let transition = self.controller.next_hour();
                self.apply(transition);
            }
            PlayerEvent::Command(command) => return self.handle_command(command),
        }
        None
    }

    fn on_position_tick(&mut self) {
        let sink = self.session.sink();
        let sample = PositionSample {
            elapsed: sink.current_time(),
            paused: sink.is_paused(),
            error: sink.error().is_some(),
        };

        let archive_source = self.controller.camera().src_type == SourceType::Archive;
        if archive_source && !sample.paused && sample.elapsed + self.session.server_offset() >= HOUR_SECONDS {
            debug!("Archive hour finished");
            let transition = self.controller.next_hour();
            self.apply(transition);
            return;
        }

        let transition = self.controller.position_tick(sample);
        self.apply(transition);
    }

    fn on_timer(&mut self, purpose: TimerPurpose, generation: u64) {
        if !self.timers.take_if_current(purpose, generation) {
            return;
        }
        match purpose {
            TimerPurpose::MotionSettle => {
                let transition = self.controller.render_motion(self.timeline.visible_window());
                self.apply(transition);
            }
            TimerPurpose::NetworkRetry => {
                let outcome = self.session.on_retry_timer();
                self.on_session_outcome(outcome);
            }
        }
    }

    pub fn handle_command(&mut self, command: PlayerCommand) -> Option<RefreshRequest> {
        let result = match command {
            PlayerCommand::SetLive => Ok(self.controller.set_live(false)),
            PlayerCommand::RewindBackward => self.controller.rewind_backward(),
            PlayerCommand::RewindForward => self.controller.rewind_forward(),
            PlayerCommand::TimelineClick(click) => self.controller.timeline_click(click),
            PlayerCommand::CalendarDate(selected) => self.controller.calendar_date_change(selected),
            PlayerCommand::ChangeQuality(quality) => self.controller.change_quality(&quality),
            PlayerCommand::IncreaseSpeed => {
                let blocked = self.controller.camera().blocked;
                self.speed.increase(blocked).map(|rate| self.apply_rate(rate))
            }
            PlayerCommand::DecreaseSpeed => {
                let blocked = self.controller.camera().blocked;
                self.speed.decrease(blocked).map(|rate| self.apply_rate(rate))
            }
            PlayerCommand::SetFollow(follow) => {
                self.controller.set_follow(follow);
                let current = self.controller.date().current;
                Ok(Transition {
                    move_to: follow.then_some(current),
                    ..Transition::default()
                })
            }
            PlayerCommand::RangeChanged(window) => {
                self.timeline.set_visible_window(window);
                self.timers.schedule(TimerPurpose::MotionSettle, self.motion_settle_delay);
                Ok(Transition::default())
            }
            PlayerCommand::Play => {
                self.session.sink_mut().play();
                Ok(Transition::default())
            }
            PlayerCommand::Pause => {
                self.session.sink_mut().pause();
                Ok(Transition::default())
            }
            PlayerCommand::SetVolume(volume) => {
                self.session.sink_mut().set_volume(volume);
                Ok(Transition::default())
            }
            PlayerCommand::SwitchCamera { camera, offset_minutes } => {
                self.timers.cancel_all();
                self.session.reset();
                self.speed.reset();
                self.session_started = false;
                self.latest_refresh = None;
                let transition = self.controller.switch_camera(camera, offset_minutes);
                self.apply(transition);
                return self.begin_refresh();
            }
        };

        match result {
            Ok(transition) => self.apply(transition),
            Err(e) => warn!(error = %e, "Command refused"),
        }
        None
    }

    fn apply_rate(&mut self, rate: Option<f64>) -> Transition {
        if let Some(rate) = rate {
            info!(rate, "Playback speed changed");
            self.session.sink_mut().set_playback_rate(rate);
        }
        Transition::default()
    }

    fn apply(&mut self, transition: Transition) {
        if transition.is_empty() {
            return;
        }

        apply_changes(self.timeline.as_mut(), &transition.fragments);
        if let Some(marker) = transition.marker {
            self.timeline.set_marker(marker);
        }
        if let Some(instant) = transition.move_to {
            self.timeline.move_to(instant);
        }
        if transition.reset_speed && self.speed.cap_to_normal() {
            self.session.sink_mut().set_playback_rate(self.speed.current());
        }
        if let Some(source) = transition.source {
            self.load_source(source);
        }
    }

    fn load_source(&mut self, source: SourceRequest) {
        self.timers.cancel(TimerPurpose::NetworkRetry);
        let result = if self.session_started {
            self.session.load(source)
        } else {
            self.session_started = true;
            self.session.init(source)
        };

        match result {
            Ok(outcome) => self.on_session_outcome(outcome),
            Err(e) => error!(error = %e, "Source could not be played"),
        }
    }

    fn on_session_outcome(&mut self, outcome: SessionOutcome) {
        match outcome {
            SessionOutcome::Ready { server_offset } => {
                self.controller.on_manifest_parsed(server_offset);
                let rate = self.speed.current();
                self.session.sink_mut().set_playback_rate(rate);
            }
            SessionOutcome::RetryAfter(delay) => {
                self.timers.schedule(TimerPurpose::NetworkRetry, delay);
            }
            SessionOutcome::Failed(kind) => {
                self.timers.cancel(TimerPurpose::NetworkRetry);
                error!(?kind, "Playback stopped");
            }
            SessionOutcome::Ignored
            | SessionOutcome::Loading
            | SessionOutcome::Seeked
            | SessionOutcome::Attached
            | SessionOutcome::MediaRecovery
            | SessionOutcome::Detached => {}
        }
    }
}
