use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Not found or not a directory: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to hash '{}': {source}", path.display())]
    HashFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Wrap an io error with the path it happened on, keeping its kind.
    pub fn io_at(path: &std::path::Path, what: &str, err: io::Error) -> Self {
        Error::Io(io::Error::new(
            err.kind(),
            format!("Error {} {}: {}", what, path.display(), err),
        ))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
