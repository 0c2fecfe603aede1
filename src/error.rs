use thiserror::Error;

/// Library error type for slideshow operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine was handed a playlist without any items.
    #[error("playlist must contain at least one item")]
    EmptyPlaylist,

    /// The per-slide duration was zero.
    #[error("slide duration must be greater than zero")]
    InvalidDuration,

    /// Some other engine option was out of range.
    #[error("invalid engine option: {0}")]
    InvalidOption(String),

    /// A command was issued after the engine stopped.
    #[error("playback engine has been stopped")]
    Stopped,

    /// One or more photo directories are invalid or unreadable.
    #[error("invalid photo directory: {0}")]
    BadDir(String),

    /// The scan completed but found no images.
    #[error("no images found in configured directories")]
    EmptyScan,

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),
}
