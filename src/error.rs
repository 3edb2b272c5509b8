//! Error type shared by the engine, the network registry and persistence

use std::{io, path::PathBuf};

use thiserror::Error;

/// Everything that can go wrong while planning a charging run.
///
/// Partition violations are not listed: the genetic operators repair them in place.
#[derive(Error, Debug)]
pub enum Error {
    /// Empty request set, zero PDVs, zero population or an index outside the registry.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// A configuration section failed validation.
    #[error("config error: {0}")]
    Config(String),

    /// Reading or writing a file failed.
    #[error("persistence error on {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A delimited guess/path file exists but its contents don't make sense.
    #[error("corrupt data in {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("could not parse TOML: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("could not write TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
