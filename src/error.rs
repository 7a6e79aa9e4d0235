//! Error and warning taxonomy for MIST conversion
//!
//! Configuration problems are fatal to conversion capability and surface as
//! [`ConfigError`]. A single report that cannot be read or walked surfaces as
//! [`ConversionError`] and is isolated to that file. Per-call and
//! per-argument problems never fail anything; they are recorded as
//! [`ConversionWarning`]s next to the produced document.

use std::path::PathBuf;
use thiserror::Error;

use crate::abstraction::Abstraction;

/// Configuration directory or mapping documents missing or unparsable
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Mapping document not found: {0}")]
    MissingDocument(PathBuf),

    #[error("Failed to read mapping document {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse mapping document {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Failure to convert one input file
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Failed to read report {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse report {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write MIST report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion of {path} panicked: {message}")]
    Panicked { path: PathBuf, message: String },

    #[error("Output {output} of {path} collides with the output of '{claimed_by}'")]
    OutputCollision {
        path: PathBuf,
        output: PathBuf,
        claimed_by: String,
    },
}

/// How a call's rule was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Exact (category, api) match
    Exact,
    /// Category-level generic rule
    Generic,
    /// No rule matched; the unknown sentinel was used
    Unknown,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Exact => write!(f, "exact"),
            Resolution::Generic => write!(f, "generic"),
            Resolution::Unknown => write!(f, "unknown"),
        }
    }
}

/// Non-fatal issue recorded while converting one report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionWarning {
    #[error("process {process} call {call}: no exact rule for {category}/{api}, used {resolution} rule")]
    RuleResolution {
        process: usize,
        call: usize,
        category: String,
        api: String,
        resolution: Resolution,
    },

    #[error("process {process} call {call}: argument '{argument}' missing or malformed for {abstraction}, default token used")]
    ArgumentDefault {
        process: usize,
        call: usize,
        argument: String,
        abstraction: Abstraction,
    },

    #[error("report contains no processes")]
    EmptyReport,
}
