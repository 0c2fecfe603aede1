pub mod config;
pub mod error;
pub mod events;
pub mod playlist;
pub mod scan;
pub mod tasks {
    pub mod controls;
    pub mod engine;
    pub mod presenter;
}

pub use error::Error;
pub use events::{EngineEvent, PlaybackState, PlaybackStatus, Progress, SlideChange};
pub use tasks::engine::{EngineOptions, PlaybackEngine};
