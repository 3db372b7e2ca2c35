pub mod audio;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod expression;
pub mod lipsync;
pub mod model;
pub mod sequencer;
pub mod services;
pub mod text;

// Re-export specific items if needed for convenient access
pub use audio::{AudioCache, AudioPlaybackEngine, SimBackend};
pub use config::EngineConfig;
pub use sequencer::{PlaybackSequencer, SessionContext};
