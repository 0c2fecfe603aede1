use std::path::PathBuf;
use std::time::Duration;

/// Everything the playback engine tells the outside world.
///
/// Both streams share one channel so a consumer always observes the progress
/// reset of a transition before the slide change that caused it.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Progress(Progress),
    SlideChanged(SlideChange),
}

/// Elapsed time within the current slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub elapsed: Duration,
    pub slide_duration: Duration,
}

impl Progress {
    pub fn reset(slide_duration: Duration) -> Self {
        Self {
            elapsed: Duration::ZERO,
            slide_duration,
        }
    }

    /// Elapsed time in seconds, in `[0, slide_duration]`.
    pub fn seconds(&self) -> f64 {
        self.elapsed.min(self.slide_duration).as_secs_f64()
    }

    /// Elapsed time normalised to `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.slide_duration.is_zero() {
            return 0.0;
        }
        (self.seconds() / self.slide_duration.as_secs_f64()).clamp(0.0, 1.0)
    }
}

/// Emitted once per transition, automatic or manual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideChange {
    /// Zero-based position in the playlist.
    pub index: usize,
    pub item: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Latest state published by the engine task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub index: usize,
    pub state: PlaybackState,
    /// Time left on the current slide as of the last tick, pause or transition.
    pub remaining: Duration,
}
