//! Streaming session: engine lifecycle, playback strategy and fatal-error recovery.

pub mod engine;
pub mod probe;
pub mod session;
pub mod sink;

pub use engine::{
    EngineConfig, EngineErrorKind, EngineEvent, EngineEventReceiver, EngineEventSender,
    EngineFactory, EngineId, StreamingEngine,
};
pub use probe::{ProbeEngine, ProbeEngineFactory};
pub use session::{FatalState, PlaybackStrategy, SessionOutcome, SessionState, StreamSession};
pub use sink::{HeadlessSink, VideoSink};
