//! Error handling for the `jarl` CLI driver.

use thiserror::Error;

/// Every way the driver itself (as opposed to the script it runs) can fail.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("could not read script {path}: {source}")]
    ReadScript {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The script compiled and ran, but reported at least one diagnostic or
    /// raised a runtime error; the message has already been delivered to
    /// the configured error sink, so this variant only carries exit-status
    /// intent back to `main`.
    #[error("script execution failed")]
    ScriptFailed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
