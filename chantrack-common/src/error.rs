//! Common error types for chantrack

use thiserror::Error;

/// Common result type for chantrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across chantrack crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
