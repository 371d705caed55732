//! timerperf - timer subsystem trace conversion and latency statistics
//!
//! This library converts kernel ftrace timer lines into a compact binary
//! performance event stream, decodes that stream back, and correlates
//! userspace timer library tracepoints into per-operation duration
//! statistics.

pub mod cli;
pub mod codec;
pub mod commands;
pub mod config;
pub mod convert;
pub mod correlate;
pub mod error;
pub mod event;
pub mod report;
pub mod stats;
pub mod trace_text;

pub use codec::{decode, encode, Decoder, Encoder, Endian};
pub use convert::KernelConverter;
pub use correlate::{Correlator, TimerStats};
pub use error::{Error, FormatError, ProtocolWarning, Result, ValidationError};
pub use event::{Event, EventKind, Payload, TaskName, TimerHandle, Timestamp};
pub use stats::SampleStats;
