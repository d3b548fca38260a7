pub mod clock;
pub mod fragments;
pub mod archive;
pub mod stream;
#[cfg(test)]
mod session_test;
pub mod timeline;
pub mod provider;
pub mod timer;
pub mod heartbeat;
pub mod speed;
pub mod player;
pub mod config;
pub mod serde_helpers;
pub mod app;

pub use archive::{ArchiveController, FragmentChange, SourceRequest, Transition};
pub use clock::ClockModel;
pub use fragments::FragmentStore;
pub use player::{Player, PlayerCommand, PlayerEvent};
pub use stream::StreamSession;
