//! Live/archive mode state machine and playhead authority.
//!
//! Every operation returns a [`Transition`] describing the effects the player must apply:
//! a source to (re)load, a marker or viewport move, and fragment changes for the timeline.

pub mod source;

use common::{
    ArchiveDate, ArchiveMetadata, Camera, FragmentGroup, Mode, PlayerError, Quality,
    RenderedFragment, Result, SourceType, TimeWindow,
};
use tracing::{debug, info, warn};

use crate::clock::ClockModel;
use crate::config::{PlaybackConfig, TimelineConfig};
use crate::fragments::{FragmentStore, JoinThresholds};

pub use source::SourceRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    Background,
    Item,
    Axis,
}

/// Click reported by the timeline widget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineClick {
    pub instant: i64,
    pub target: ClickTarget,
    /// `data-group` attribute of the clicked element
    pub group: Option<FragmentGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentChange {
    Clear,
    Add(Vec<RenderedFragment>),
    Update(Vec<RenderedFragment>),
    Remove(Vec<u64>),
}

/// Effects of one controller operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub source: Option<SourceRequest>,
    pub marker: Option<i64>,
    pub move_to: Option<i64>,
    pub fragments: Vec<FragmentChange>,
    /// Cap playback speed back to 1x
    pub reset_speed: bool,
}

impl Transition {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Video element state sampled on each position tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub elapsed: f64,
    pub paused: bool,
    pub error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSettings {
    pub rewind_step_ms: i64,
    pub live_margin_ms: i64,
    pub missing_skip_ms: i64,
    pub live_lag_threshold_ms: i64,
    pub heartbeat_step_ms: i64,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            rewind_step_ms: 15_000,
            live_margin_ms: 60_000,
            missing_skip_ms: 1_000,
            live_lag_threshold_ms: 5_000,
            heartbeat_step_ms: 1_000,
        }
    }
}

impl ArchiveSettings {
    pub fn from_config(playback: &PlaybackConfig, timeline: &TimelineConfig) -> Self {
        Self {
            rewind_step_ms: playback.rewind_step_ms,
            live_margin_ms: playback.live_margin_ms,
            missing_skip_ms: playback.missing_skip_ms,
            live_lag_threshold_ms: playback.live_lag_threshold_ms,
            heartbeat_step_ms: timeline.heartbeat_interval.as_millis() as i64,
        }
    }
}

pub struct ArchiveController {
    camera: Camera,
    quality: Quality,
    date: ArchiveDate,
    mode: Mode,
    store: FragmentStore,
    settings: ArchiveSettings,
    follow: bool,
    loaded: bool,
    timeline_attached: bool,
}

impl ArchiveController {
    pub fn new(
        camera: Camera,
        offset_minutes: i32,
        quality: Quality,
        settings: ArchiveSettings,
        thresholds: JoinThresholds,
    ) -> Self {
        let date = Self::fresh_date(&camera, offset_minutes);
        Self {
            camera,
            quality,
            date,
            mode: Mode::Live,
            store: FragmentStore::new(thresholds),
            settings,
            follow: false,
            loaded: false,
            timeline_attached: false,
        }
    }

    fn fresh_date(camera: &Camera, offset_minutes: i32) -> ArchiveDate {
        ArchiveDate {
            current: camera.real_time * 1000,
            offset: offset_minutes,
            ..ArchiveDate::default()
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn quality(&self) -> &Quality {
        &self.quality
    }

    pub fn date(&self) -> &ArchiveDate {
        &self.date
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_live(&self) -> bool {
        self.mode.is_live()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn fragments(&self) -> &FragmentStore {
        &self.store
    }

    pub fn follow(&self) -> bool {
        self.follow
    }

    pub fn clock(&self) -> ClockModel {
        ClockModel::new(self.date.offset, self.date.server_offset)
    }

    pub fn range(&self) -> TimeWindow {
        self.date.range()
    }

    pub fn set_follow(&mut self, follow: bool) {
        self.follow = follow;
    }

    pub fn set_timeline_attached(&mut self, attached: bool) {
        self.timeline_attached = attached;
    }

    pub fn set_quality_list(&mut self, list: Vec<String>) {
        self.quality.display = !list.is_empty();
        self.quality.list = list;
    }

    /// Start time requested from outside, honoured once by the first metadata load.
    pub fn request_start(&mut self, instant: Option<i64>) {
        self.date.url = instant;
    }

    /// Unsupported codecs never fetch metadata.
    pub fn needs_metadata(&self) -> bool {
        self.camera.is_codec_supported()
    }

    // ------------------------------------------------------------------
    // Source derivation
    // ------------------------------------------------------------------

    pub fn set_src(&mut self, unixtime: i64) -> SourceRequest {
        let (url, load) = source::archive_url(&self.camera, unixtime);
        self.date.last = unixtime;
        self.date.load = load;
        self.date.hour = self.clock().local_hour(unixtime);
        self.camera.src_type = SourceType::Archive;
        self.camera.src = url.clone();
        debug!(url = %url, load, "Archive source selected");
        SourceRequest {
            kind: SourceType::Archive,
            url,
            start_position: Some(load),
        }
    }

    pub fn set_live_src(&mut self) -> SourceRequest {
        let url = source::live_url(&self.camera, &self.quality.current);
        self.camera.src_type = SourceType::Live;
        self.camera.src = url.clone();
        debug!(url = %url, "Live source selected");
        SourceRequest {
            kind: SourceType::Live,
            url,
            start_position: None,
        }
    }

    /// Source matching the current mode, used when the session is (re)initialised.
    pub fn current_source(&mut self) -> SourceRequest {
        if self.is_live() {
            self.set_live_src()
        } else {
            self.set_src(self.date.current)
        }
    }

    pub fn thumbnail_url(&self, instant: i64) -> Option<String> {
        if self.camera.blocked || !self.camera.thumbnails || !self.range().contains(instant) {
            return None;
        }
        Some(source::thumbnail_url(&self.camera, instant))
    }

    pub fn snapshot_url(&self) -> String {
        source::snapshot_url(&self.camera, self.date.current)
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Replace fragment data and ranges from a metadata fetch.
    ///
    /// The first load resolves the playhead and yields the initial source. Later refreshes
    /// keep the mode and re-clamp an archive playhead into the new range.
    pub fn apply_metadata(&mut self, metadata: ArchiveMetadata) -> Transition {
        let real_time = if self.loaded {
            metadata.server_real_time.max(self.date.live / 1000)
        } else {
            metadata.server_real_time
        };
        self.camera.real_time = real_time;
        if metadata.min_thumbnails_available {
            self.camera.thumbnails = true;
        }

        let retention_floor = real_time - i64::from(self.camera.dvr_depth) * 86_400;
        let border = metadata.recorded_border.unwrap_or(retention_floor);
        let start = border.max(retention_floor) * 1000;
        let live_time = real_time * 1000;
        let end = (live_time - self.settings.live_margin_ms).max(start);

        self.date.start = start;
        self.date.end = end;
        self.date.live = live_time;

        self.store.clear();
        self.store.add_missing(metadata.missing);
        for bucket in metadata.motion {
            self.store.add_motion_bucket(bucket);
        }
        self.store.set_main_range(self.date.range(), live_time);

        let mut transition = Transition::default();

        if !self.loaded {
            let requested = self.date.url.take();
            self.date.current = match requested {
                Some(url) if url > start && url < end => url,
                Some(url) => {
                    warn!(requested = url, start, end, "Requested start outside archive, falling back to live");
                    live_time
                }
                None => live_time,
            };
            self.date.last = live_time;
            self.mode = if self.date.current == live_time {
                Mode::Live
            } else {
                Mode::Archive
            };
            self.loaded = true;
            transition.source = Some(self.current_source());
            info!(camera = %self.camera.name, mode = ?self.mode, start, end, "Archive metadata loaded");
        } else if !self.is_live() {
            self.date.current = self.range().clamp(self.date.current);
        }

        let mut records: Vec<RenderedFragment> = self.store.render_main().to_vec();
        records.extend(self.store.render_missing(self.camera.dvr_depth));
        transition.fragments = vec![FragmentChange::Clear, FragmentChange::Add(records)];
        transition.marker = Some(self.date.current);
        transition
    }

    /// Recompute the motion overlay for the visible window.
    pub fn render_motion(&mut self, visible: TimeWindow) -> Transition {
        let removed = self.store.remove_motion_fragments();
        let added = self.store.render_motion(visible, self.camera.dvr_depth);

        let mut fragments = Vec::new();
        if !removed.is_empty() {
            fragments.push(FragmentChange::Remove(removed));
        }
        if !added.is_empty() {
            fragments.push(FragmentChange::Add(added));
        }
        Transition {
            fragments,
            ..Transition::default()
        }
    }

    // ------------------------------------------------------------------
    // Clock events
    // ------------------------------------------------------------------

    /// Wall-clock heartbeat: the live edge and the pending stretch both advance.
    pub fn heartbeat(&mut self) -> Transition {
        if !self.loaded {
            return Transition::default();
        }
        self.date.live += self.settings.heartbeat_step_ms;
        self.date.end += self.settings.heartbeat_step_ms;
        self.store.set_main_range(self.date.range(), self.date.live);

        Transition {
            fragments: vec![FragmentChange::Update(self.store.render_main().to_vec())],
            ..Transition::default()
        }
    }

    /// Derive the playhead from the video element's elapsed time.
    pub fn position_tick(&mut self, sample: PositionSample) -> Transition {
        if !self.loaded || !self.timeline_attached || sample.paused || sample.error {
            return Transition::default();
        }

        if self.camera.src_type == SourceType::Live {
            self.date.current = ClockModel::to_absolute(sample.elapsed, self.date.last);
            let lagging = self.date.live - self.date.current > self.settings.live_lag_threshold_ms;
            let mode = if lagging { Mode::Archive } else { Mode::Live };
            if mode != self.mode {
                info!(from = ?self.mode, to = ?mode, "Live playback lag changed mode");
                self.mode = mode;
            }
            return Transition {
                marker: Some(self.date.current),
                move_to: self.follow.then_some(self.date.current),
                reset_speed: true,
                ..Transition::default()
            };
        }

        if let Some(gap) = self.store.missing_at(self.date.current) {
            let target = gap.end * 1000 + self.settings.missing_skip_ms;
            info!(gap_start = gap.start, gap_end = gap.end, "Playhead entered missing interval, skipping");
            if target > self.date.end {
                return self.set_live(true);
            }
            self.date.current = target;
            let source = self.set_src(target);
            return Transition {
                source: Some(source),
                marker: Some(target),
                ..Transition::default()
            };
        }

        self.date.current = self
            .clock()
            .archive_position(self.date.current, self.date.hour, sample.elapsed);

        Transition {
            marker: Some(self.date.current),
            move_to: self.follow.then_some(self.date.current),
            reset_speed: self.date.current >= self.date.end,
            ..Transition::default()
        }
    }

    /// Record the segment clock correction reported once the manifest is parsed.
    pub fn on_manifest_parsed(&mut self, server_offset: f64) {
        self.date.server_offset = if self.camera.src_type == SourceType::Live {
            0.0
        } else {
            server_offset
        };
    }

    /// The current hour source finished; continue with the next local hour.
    pub fn next_hour(&mut self) -> Transition {
        if self.camera.src_type == SourceType::Live {
            let source = self.set_live_src();
            return Transition {
                source: Some(source),
                ..Transition::default()
            };
        }

        let next = self.clock().start_of_next_hour(self.date.last);
        if next > self.date.end {
            info!("Archive exhausted, returning to live");
            return self.set_live(true);
        }
        self.date.current = next;
        let source = self.set_src(next);
        Transition {
            source: Some(source),
            marker: Some(next),
            ..Transition::default()
        }
    }

    // ------------------------------------------------------------------
    // User commands
    // ------------------------------------------------------------------

    fn ensure_archive_access(&self) -> Result<()> {
        if self.camera.blocked {
            return Err(PlayerError::ArchiveBlocked(self.camera.name.clone()));
        }
        Ok(())
    }

    fn enter_archive(&mut self, instant: i64) -> Transition {
        if self.is_live() {
            info!(instant, "Live -> Archive");
        }
        self.mode = Mode::Archive;
        self.date.current = instant;
        let source = self.set_src(instant);
        Transition {
            source: Some(source),
            marker: Some(instant),
            ..Transition::default()
        }
    }

    /// Return to the live edge. A no-op while already live unless forced.
    pub fn set_live(&mut self, force: bool) -> Transition {
        if self.is_live() && !force {
            return Transition::default();
        }
        if !self.is_live() {
            info!("Archive -> Live");
        }
        self.mode = Mode::Live;
        let source = self.set_live_src();
        self.date.last = self.date.live;
        self.date.current = self.date.live;
        Transition {
            source: Some(source),
            marker: Some(self.date.current),
            move_to: Some(self.date.current),
            ..Transition::default()
        }
    }

    pub fn change_quality(&mut self, quality: &str) -> Result<Transition> {
        if !self.quality.list.is_empty() && !self.quality.list.iter().any(|q| q == quality) {
            return Err(PlayerError::UnknownQuality(quality.to_string()));
        }
        self.quality.current = quality.to_string();
        Ok(self.set_live(true))
    }

    pub fn timeline_click(&mut self, click: TimelineClick) -> Result<Transition> {
        self.ensure_archive_access()?;
        if click.target != ClickTarget::Background {
            return Ok(Transition::default());
        }

        let range = self.range();
        if !range.contains(click.instant) {
            return Ok(Transition::default());
        }

        let mut instant = click.instant;
        if click.group == Some(FragmentGroup::Missing) {
            let unix = (click.instant as f64 / 1000.0).round() as i64;
            let Some(gap) = self.store.missing_at_second(unix) else {
                return Ok(Transition::default());
            };
            instant = gap.end * 1000 + self.settings.missing_skip_ms;
        }

        self.follow = false;
        Ok(self.enter_archive(range.clamp(instant)))
    }

    pub fn rewind_backward(&mut self) -> Result<Transition> {
        self.ensure_archive_access()?;
        let target = if self.is_live() {
            self.date.end
        } else {
            self.range().clamp(self.date.current - self.settings.rewind_step_ms)
        };
        Ok(self.enter_archive(target))
    }

    pub fn rewind_forward(&mut self) -> Result<Transition> {
        self.ensure_archive_access()?;
        if self.is_live() {
            return Ok(Transition::default());
        }

        let target = self.date.current + self.settings.rewind_step_ms;
        if target > self.date.end {
            let mut transition = self.set_live(true);
            transition.move_to = None;
            return Ok(transition);
        }
        Ok(self.enter_archive(target))
    }

    /// Jump to a calendar date. Dates outside the recording take the time of day of the
    /// nearest range edge and are then clamped into the range.
    pub fn calendar_date_change(&mut self, selected: i64) -> Result<Transition> {
        self.ensure_archive_access()?;
        let clock = self.clock();
        let range = self.range();

        let adjusted = if selected < range.start {
            clock.with_time_of_day(selected, range.start)
        } else if selected > range.end {
            clock.with_time_of_day(selected, range.end)
        } else {
            selected
        };
        let target = range.clamp(adjusted);

        self.follow = false;
        let mut transition = self.enter_archive(target);
        transition.move_to = Some(target);
        Ok(transition)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn reset_params(&mut self) {
        self.date.url = None;
        self.timeline_attached = false;
    }

    /// Replace the camera wholesale; all session state starts over.
    pub fn switch_camera(&mut self, camera: Camera, offset_minutes: i32) -> Transition {
        info!(from = %self.camera.name, to = %camera.name, "Switching camera");
        self.reset_params();
        self.date = Self::fresh_date(&camera, offset_minutes);
        self.camera = camera;
        self.mode = Mode::Live;
        self.store.clear();
        self.follow = false;
        self.loaded = false;
        Transition {
            fragments: vec![FragmentChange::Clear],
            ..Transition::default()
        }
    }
}
