//! FFG-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, FfgError>;

/// Top-level error type for Freefall Guard.
#[derive(Debug, Error)]
pub enum FfgError {
    #[error("[FFG-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[FFG-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[FFG-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[FFG-1101] invalid device {device:?}: {details}")]
    InvalidDevice { device: String, details: String },

    #[error("[FFG-2001] freefall sensor unavailable at {path}: {source}")]
    SensorUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[FFG-2002] freefall sensor read failure at {path}: {details}")]
    SensorReadError { path: PathBuf, details: String },

    #[error("[FFG-2101] head control attribute missing at {path}")]
    DeviceControlUnavailable { path: PathBuf },

    #[error("[FFG-2102] head control write failure at {path}: {details}")]
    DeviceControlWriteError { path: PathBuf, details: String },

    #[error("[FFG-2201] protection indicator unavailable at {path}: {details}")]
    IndicatorUnavailable { path: PathBuf, details: String },

    #[error("[FFG-2301] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[FFG-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[FFG-3002] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[FFG-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl FfgError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "FFG-1001",
            Self::MissingConfig { .. } => "FFG-1002",
            Self::ConfigParse { .. } => "FFG-1003",
            Self::InvalidDevice { .. } => "FFG-1101",
            Self::SensorUnavailable { .. } => "FFG-2001",
            Self::SensorReadError { .. } => "FFG-2002",
            Self::DeviceControlUnavailable { .. } => "FFG-2101",
            Self::DeviceControlWriteError { .. } => "FFG-2102",
            Self::IndicatorUnavailable { .. } => "FFG-2201",
            Self::Serialization { .. } => "FFG-2301",
            Self::Io { .. } => "FFG-3001",
            Self::ChannelClosed { .. } => "FFG-3002",
            Self::Runtime { .. } => "FFG-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// `DeviceControlUnavailable` is deliberately not retryable: a missing
    /// sysfs attribute is a configuration problem, not a transient fault.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SensorReadError { .. }
                | Self::DeviceControlWriteError { .. }
                | Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for FfgError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for FfgError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
