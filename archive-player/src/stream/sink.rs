use common::PlaybackErrorKind;
use tokio::time::Instant;
use tracing::{debug, warn};

/// The video element a session plays into. The session is the only writer of `src`.
pub trait VideoSink: Send {
    /// Elapsed seconds since the start of the loaded source
    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, seconds: f64);

    fn play(&mut self);

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&mut self, rate: f64);

    fn volume(&self) -> f64;

    fn set_volume(&mut self, volume: f64);

    fn src(&self) -> Option<&str>;

    fn set_src(&mut self, url: &str);

    /// Whether the element plays the streaming container without an adaptive engine
    fn can_play_native(&self) -> bool;

    fn show_error(&mut self, kind: PlaybackErrorKind);

    fn error(&self) -> Option<PlaybackErrorKind>;

    fn clear_error(&mut self);
}

/// Sink without a decoder: the playhead is advanced by the runtime clock.
#[derive(Debug)]
pub struct HeadlessSink {
    src: Option<String>,
    base: f64,
    started: Option<Instant>,
    rate: f64,
    volume: f64,
    native: bool,
    error: Option<PlaybackErrorKind>,
}

impl Default for HeadlessSink {
    fn default() -> Self {
        Self::new(false)
    }
}

impl HeadlessSink {
    pub fn new(native: bool) -> Self {
        Self {
            src: None,
            base: 0.0,
            started: None,
            rate: 1.0,
            volume: 1.0,
            native,
            error: None,
        }
    }

    fn rebase(&mut self) {
        let now = self.current_time();
        self.base = now;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}

impl VideoSink for HeadlessSink {
    fn current_time(&self) -> f64 {
        match self.started {
            Some(started) => self.base + started.elapsed().as_secs_f64() * self.rate,
            None => self.base,
        }
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.base = seconds.max(0.0);
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    fn play(&mut self) {
        if self.started.is_none() && self.error.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.base = self.current_time();
        self.started = None;
    }

    fn is_paused(&self) -> bool {
        self.started.is_none()
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.rebase();
        self.rate = rate;
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn src(&self) -> Option<&str> {
        self.src.as_deref()
    }

    fn set_src(&mut self, url: &str) {
        debug!(url, "Sink source set");
        self.src = Some(url.to_string());
        self.base = 0.0;
        self.started = None;
        self.error = None;
    }

    fn can_play_native(&self) -> bool {
        self.native
    }

    fn show_error(&mut self, kind: PlaybackErrorKind) {
        warn!(?kind, "Playback error shown");
        self.pause();
        self.error = Some(kind);
    }

    fn error(&self) -> Option<PlaybackErrorKind> {
        self.error
    }

    fn clear_error(&mut self) {
        self.error = None;
    }
}
