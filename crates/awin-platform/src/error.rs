use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("no display server available: {0}")]
    NoDisplay(String),
    #[error("failed to load {library}: {reason}")]
    MissingLibrary { library: String, reason: String },
    #[error("required capability {0} is not offered")]
    MissingCapability(&'static str),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("window creation failed: {0}")]
    WindowCreation(String),
    #[error("unknown window {0}")]
    UnknownWindow(u64),
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] awin_core::ConfigError),
}

pub type Result<T> = std::result::Result<T, PlatformError>;
