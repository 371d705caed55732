//! Error taxonomy for timer trace processing
//!
//! Binary corruption is fatal (`FormatError`), text parsing problems are
//! recovered locally and only logged (`ProtocolWarning`).

use thiserror::Error;

/// A value handed to an event constructor lies outside its valid range
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid timestamp: {secs}.{nsecs} out of range")]
    Timestamp { secs: i64, nsecs: i64 },

    #[error("invalid task name length {0} (expected 1..=255)")]
    TaskLength(usize),

    #[error("invalid task name: non-ASCII byte {0:#04x}")]
    TaskEncoding(u8),

    #[error("invalid timer handle {0}")]
    Handle(u64),

    #[error("invalid milliseconds expiry {0}")]
    Millis(u64),
}

/// The binary event stream is structurally invalid
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Cannot unpack performance event {field}: missing input data")]
    MissingData { field: &'static str },

    #[error("Cannot probe performance event endianness: invalid endianness code {0:#04x}")]
    InvalidEndian(u8),

    #[error("Cannot unpack performance event timespec: invalid range")]
    InvalidTimespec,

    #[error("Cannot unpack performance event task: invalid length {0}")]
    InvalidTaskLength(usize),

    #[error("Cannot unpack performance event task: invalid ASCII encoding")]
    InvalidTaskEncoding,

    #[error("Cannot unpack performance event address: invalid range")]
    InvalidAddress,

    #[error("Cannot unpack performance event milliseconds: invalid range")]
    InvalidMillis,

    #[error("Cannot unpack performance event: unsupported event kind '{0}'")]
    UnsupportedKind(u8),

    #[error("Cannot unpack performance event: {0} trailing bytes after last record")]
    TrailingData(usize),

    #[error("Cannot pack performance events: {0} events exceed header capacity")]
    TooManyEvents(usize),
}

/// Non-fatal protocol violation: the offending record is dropped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolWarning {
    #[error("ignoring previous '{0}' trace: duplicate enter / missed exit event")]
    DuplicateBegin(&'static str),

    #[error("skipping unexpected '{0}' trace: enter event missed")]
    MissingBegin(&'static str),

    #[error("ignoring trace: {0}")]
    MalformedLine(&'static str),

    #[error("ignoring unexpected '{0}' trace: not supported")]
    UnsupportedProbe(String),
}

/// Top-level error for one conversion or statistics pass
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No valid kernel timer traces found")]
    EmptyInput,

    #[error("invalid '{event}' trace: missing {field} event field")]
    MissingField { event: String, field: &'static str },

    #[error("invalid '{event}' trace: {field} event field out of range")]
    FieldRange { event: String, field: &'static str },

    #[error("Interrupted")]
    Interrupted,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for timer trace operations
pub type Result<T> = std::result::Result<T, Error>;
