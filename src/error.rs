use thiserror::Error;

/// Main error type for the loudcast library
#[derive(Error, Debug)]
pub enum LoudcastError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Normalize error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Network retrieval errors (feed document or audio enclosure)
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request failed: {url} - {reason}")]
    Request { url: String, reason: String },

    #[error("Server returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("Failed to store download {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Loudness analysis errors
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Analysis of {path} failed: {reason}")]
    ToolFailed { path: String, reason: String },

    #[error("Analysis of {path} timed out after {seconds}s")]
    TimedOut { path: String, seconds: u64 },

    #[error("No loudness measurement found for {path}")]
    NoMeasurement { path: String },

    #[error("Missing {field} in analysis of {path}")]
    MissingField { path: String, field: String },

    #[error("Malformed value for {label}: {value:?}")]
    MalformedValue { label: String, value: String },

    #[error("Malformed loudness report: {reason}")]
    MalformedReport { reason: String },
}

/// Audio filter errors
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Filter run on {path} failed: {reason}")]
    ToolFailed { path: String, reason: String },

    #[error("Filter run on {path} timed out after {seconds}s")]
    TimedOut { path: String, seconds: u64 },

    #[error("Filter produced no output file: {path}")]
    MissingOutput { path: String },

    #[error("Failed to move output into place at {path}: {reason}")]
    Persist { path: String, reason: String },
}

/// Feed document errors
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to parse feed: {reason}")]
    Parse { reason: String },

    #[error("Failed to write feed: {reason}")]
    Write { reason: String },
}

/// Publishing errors
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("`{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("`{command}` timed out after {seconds}s")]
    TimedOut { command: String, seconds: u64 },

    #[error("{path} is outside the repository {repo}")]
    OutsideRepository { path: String, repo: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using LoudcastError
pub type Result<T> = std::result::Result<T, LoudcastError>;

impl LoudcastError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Whether this error must abort the whole run.
    ///
    /// Everything scoped to a single episode (fetching its audio, probing,
    /// normalizing) is isolated by the pipeline; only a feed that cannot be
    /// read or a broken configuration leaves nothing to process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Feed(FeedError::Parse { .. }) | Self::Config(_))
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Probe(ProbeError::ToolFailed { path, .. })
            | Self::Normalize(NormalizeError::ToolFailed { path, .. }) => {
                format!("ffmpeg could not process '{}'. Check that ffmpeg is installed and the file is valid audio.", path)
            }
            Self::Feed(FeedError::Parse { reason }) => {
                format!("The upstream feed is not valid RSS ({}).", reason)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            Self::Publish(e) => {
                format!("Publishing failed; processed files were kept on disk. {}", e)
            }
            _ => self.to_string(),
        }
    }
}
