//! Error types for the call detection core

use std::path::PathBuf;

/// Result type alias for detection operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors caused by the caller. Signal-level problems (silence, short
/// buffers, numeric degeneracy) never surface here; they degrade to an
/// empty result or a lower quality label instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failed.
    #[error("invalid detection config: {message}")]
    InvalidConfig {
        /// Description of the validation failure.
        message: String,
    },

    /// Sample rate of zero.
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    /// Frequency band is empty or inverted after clamping to Nyquist.
    #[error("invalid frequency band: {low_khz} kHz .. {high_khz} kHz")]
    InvalidBand {
        /// Lower band edge (kHz).
        low_khz: f64,
        /// Upper band edge (kHz).
        high_khz: f64,
    },

    /// Failed to read a configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Failed to parse an in-memory TOML document.
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }
}
