//! Configuration error types.

use std::path::PathBuf;

/// Errors that can occur when loading, saving, parsing, or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read `path` from disk.
    #[error("failed to read config {path}: {source}")]
    ReadError {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the config directory or file.
    #[error("failed to write config: {0}")]
    WriteError(#[source] std::io::Error),

    /// The file is not valid RON for [`crate::Config`].
    #[error("failed to parse config: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    /// Failed to serialize config to RON.
    #[error("failed to serialize config: {0}")]
    SerializeError(#[source] ron::Error),

    /// The platform has no per-user configuration directory.
    #[error("no configuration directory available on this platform")]
    NoConfigDir,

    /// A loaded value is outside its usable range.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Dotted path of the offending setting, e.g. `network.poll_rate_hz`.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
