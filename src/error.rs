use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading configuration or loading source data.
///
/// No variant is recovered from inside the crate: every failure aborts the
/// current operation and reaches the caller as-is.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file missing, unreadable or malformed.
    #[error("configuration file {path}: {reason}")]
    ConfigFile { path: PathBuf, reason: String },

    /// A `${...}` reference could not be resolved.
    #[error("interpolation failed in [{section}] {option}: {reason}")]
    Interpolation {
        section: String,
        option: String,
        reason: String,
    },

    /// A present value could not be coerced to the requested kind.
    #[error("cannot read [{section}] {option} = '{value}' as {kind}")]
    TypeCoercion {
        section: String,
        option: String,
        value: String,
        kind: String,
    },

    /// The requested section is not in the configuration.
    #[error("section '{0}' not found in configuration")]
    SectionNotFound(String),

    /// A required option is absent from a section.
    #[error("section '{section}' has no '{option}' option")]
    MissingOption { section: String, option: String },

    /// No path could be resolved for a data load.
    #[error("could not load data for '{0}': no file given or configured")]
    MissingFile(String),

    /// The type tag has no registered loader.
    #[error("type '{0}' is not registered")]
    UnknownType(String),

    /// `write` was called without a destination.
    #[error("no configuration file to write to")]
    NoConfigPath,

    /// Both a config file and a config object were supplied.
    #[error("a config file and a config object are mutually exclusive")]
    ConflictingInputs,

    /// A registered loader failed.
    #[error("loading '{section}' failed")]
    Loader {
        section: String,
        #[source]
        source: anyhow::Error,
    },

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
