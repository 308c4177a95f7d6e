//! CLI error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Routing file error: {0}")]
    Routing(#[from] toml::de::Error),

    #[error(transparent)]
    Relay(#[from] findcast::RelayError),

    #[error("Configuration error: {0}")]
    Config(String),
}
