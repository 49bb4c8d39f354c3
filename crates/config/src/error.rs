//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A configuration source could not be read or parsed
    #[display("could not load configuration")]
    Load,
    /// A configuration file named explicitly does not exist
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// File extension is not one of `toml`, `yaml`, `yml` or `json`
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// A setting parsed but has an unusable value
    #[display("invalid configuration value: {_0}")]
    Invalid(#[error(not(source))] &'static str),
}
