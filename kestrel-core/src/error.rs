use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Occurs when `kestrel.toml` fails to load.
    #[error("failed to load kestrel.toml: {0}")]
    LoadConfig(String),
    /// Occurs when the selected reporter is not registered.
    #[error("unknown reporter \"{0}\"")]
    UnknownReporter(String),
    /// Occurs when a focus or skip pattern is not a valid regular expression.
    #[error("invalid pattern \"{pattern}\": {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Errors raised while locating and loading spec files. All of them are fatal to
/// the invocation.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("path \"{}\" does not exist", .0.display())]
    MissingPath(PathBuf),
    #[error("failed to read \"{}\": {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },
    #[error("failed to scan \"{}\": {reason}", root.display())]
    Walk { root: PathBuf, reason: String },
    #[error("failed to load \"{}\": {reason}", path.display())]
    Load { path: PathBuf, reason: String },
}
