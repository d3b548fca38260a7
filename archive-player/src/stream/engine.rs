use tokio::sync::mpsc;

pub type EngineId = u64;

/// Events an engine posts back to the session that owns it
pub type EngineEventSender = mpsc::UnboundedSender<(EngineId, EngineEvent)>;
pub type EngineEventReceiver = mpsc::UnboundedReceiver<(EngineId, EngineEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    Network,
    Media,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    MediaAttached,
    /// Manifest loaded; carries the relative URL of the first fragment if known
    ManifestParsed { first_fragment: Option<String> },
    MediaDetached,
    Error {
        fatal: bool,
        kind: EngineErrorKind,
        details: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub low_latency: bool,
    /// Seconds into the source to start from
    pub start_position: Option<f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            low_latency: true,
            start_position: None,
        }
    }
}

/// Adaptive streaming engine driven by a [`StreamSession`](super::StreamSession).
///
/// Calls never block. Progress is reported asynchronously as [`EngineEvent`]s tagged with
/// the engine id.
pub trait StreamingEngine: Send {
    fn id(&self) -> EngineId;

    fn attach_media(&mut self);

    fn load_source(&mut self, url: &str);

    fn start_position(&self) -> Option<f64>;

    fn set_start_position(&mut self, seconds: f64);

    fn recover_media_error(&mut self);

    fn stop_load(&mut self);

    fn destroy(&mut self);
}

pub trait EngineFactory: Send {
    /// Whether the adaptive engine can run on this platform at all
    fn is_supported(&self) -> bool;

    fn create(&mut self, id: EngineId, config: EngineConfig) -> Box<dyn StreamingEngine>;
}
