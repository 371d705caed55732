//! Binary performance event format
//!
//! ```text
//! header : marker:u8 ('n' | 'l' | 'b')  count:u32
//! record : secs:i64 nsecs:i64  task_len:u16 task:[u8; task_len]  kind:u8  payload
//!
//! payload by kind:
//!   0 arm_tspec : handle:i64 secs:i64 nsecs:i64
//!   1 arm_msec  : handle:i64 msecs:i64
//!   3 cancel    : handle:i64
//!   6 run       : (none)
//!   7 expire    : handle:i64 now_secs:i64 now_nsecs:i64 sched_secs:i64 sched_nsecs:i64
//! ```
//!
//! Every multi-byte integer uses the byte order announced by the marker.
//! Tags 2, 4 and 5 have no payload layout and are rejected.

use crate::error::{FormatError, ValidationError};
use crate::event::{Event, EventKind, Payload, TaskName, TimerHandle, Timestamp};
use serde::{Deserialize, Serialize};

/// Header size: marker byte plus record count
pub const HEADER_LEN: usize = 1 + 4;

/// Byte order of a performance event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    /// Byte order of the host
    #[default]
    Native,
    Little,
    Big,
}

impl Endian {
    /// Header marker byte
    pub fn marker(self) -> u8 {
        match self {
            Endian::Native => b'n',
            Endian::Little => b'l',
            Endian::Big => b'b',
        }
    }

    pub fn from_marker(marker: u8) -> Result<Self, FormatError> {
        match marker {
            b'n' => Ok(Endian::Native),
            b'l' => Ok(Endian::Little),
            b'b' => Ok(Endian::Big),
            other => Err(FormatError::InvalidEndian(other)),
        }
    }
}

macro_rules! endian_put {
    ($name:ident, $ty:ty) => {
        fn $name(&mut self, value: $ty) {
            let bytes = match self.endian {
                Endian::Native => value.to_ne_bytes(),
                Endian::Little => value.to_le_bytes(),
                Endian::Big => value.to_be_bytes(),
            };
            self.body.extend_from_slice(&bytes);
        }
    };
}

macro_rules! endian_get {
    ($name:ident, $ty:ty, $len:literal) => {
        fn $name(&mut self, field: &'static str) -> Result<$ty, FormatError> {
            let bytes = self.take::<$len>(field)?;
            Ok(match self.endian {
                Endian::Native => <$ty>::from_ne_bytes(bytes),
                Endian::Little => <$ty>::from_le_bytes(bytes),
                Endian::Big => <$ty>::from_be_bytes(bytes),
            })
        }
    };
}

/// Accumulates encoded records; the header is written by [`Encoder::finish`]
#[derive(Debug)]
pub struct Encoder {
    endian: Endian,
    body: Vec<u8>,
    count: usize,
}

impl Encoder {
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            body: Vec::new(),
            count: 0,
        }
    }

    /// Number of records pushed so far
    pub fn count(&self) -> usize {
        self.count
    }

    endian_put!(put_u16, u16);
    endian_put!(put_u32, u32);
    endian_put!(put_i64, i64);

    fn put_timestamp(&mut self, stamp: &Timestamp) {
        self.put_i64(stamp.secs());
        self.put_i64(stamp.nsecs());
    }

    fn put_handle(&mut self, handle: TimerHandle) {
        // TimerHandle is capped at i64::MAX on construction
        self.put_i64(handle.get() as i64);
    }

    /// Append one record: timestamp, task, kind tag, then the payload
    pub fn push(&mut self, event: &Event) -> Result<(), ValidationError> {
        if let Payload::ArmMillis { msecs, .. } = event.payload {
            if msecs > i64::MAX as u64 {
                return Err(ValidationError::Millis(msecs));
            }
        }

        self.put_timestamp(&event.stamp);
        self.put_u16(event.task.len() as u16);
        self.body.extend_from_slice(event.task.as_bytes());
        self.body.push(event.kind().tag());

        match &event.payload {
            Payload::ArmTimespec { handle, expiry } => {
                self.put_handle(*handle);
                self.put_timestamp(expiry);
            }
            Payload::ArmMillis { handle, msecs } => {
                self.put_handle(*handle);
                self.put_i64(*msecs as i64);
            }
            Payload::Cancel { handle } => self.put_handle(*handle),
            Payload::Run => {}
            Payload::Expire {
                handle,
                now,
                scheduled,
            } => {
                self.put_handle(*handle);
                self.put_timestamp(now);
                self.put_timestamp(scheduled);
            }
        }

        self.count += 1;
        Ok(())
    }

    /// Prefix the header and return the whole stream
    pub fn finish(mut self) -> Result<Vec<u8>, FormatError> {
        let count =
            u32::try_from(self.count).map_err(|_| FormatError::TooManyEvents(self.count))?;
        let body = std::mem::take(&mut self.body);

        self.body.reserve(HEADER_LEN + body.len());
        self.body.push(self.endian.marker());
        self.put_u32(count);
        self.body.extend_from_slice(&body);

        Ok(self.body)
    }
}

/// Encode a whole event sequence
pub fn encode(events: &[Event], endian: Endian) -> crate::error::Result<Vec<u8>> {
    let mut encoder = Encoder::new(endian);
    for event in events {
        encoder.push(event)?;
    }
    Ok(encoder.finish()?)
}

/// Lazy record decoder over an in-memory buffer
///
/// Yields one `Result` per record and stops after the first error. Decoding
/// fails if the buffer ends before the header's record count is reached, or
/// if bytes remain once it is.
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    off: usize,
    endian: Endian,
    count: u32,
    decoded: u32,
    failed: bool,
}

impl<'a> Decoder<'a> {
    /// Probe the header of `data`
    pub fn new(data: &'a [u8]) -> Result<Self, FormatError> {
        let marker = *data.first().ok_or(FormatError::MissingData {
            field: "endianness",
        })?;
        let mut decoder = Self {
            data,
            off: 1,
            endian: Endian::from_marker(marker)?,
            count: 0,
            decoded: 0,
            failed: false,
        };
        decoder.count = decoder.get_u32("count")?;

        Ok(decoder)
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Record count announced by the header
    pub fn record_count(&self) -> u32 {
        self.count
    }

    fn take<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], FormatError> {
        let end = self.off + N;
        let bytes = self
            .data
            .get(self.off..end)
            .ok_or(FormatError::MissingData { field })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.off = end;
        Ok(out)
    }

    endian_get!(get_u16, u16, 2);
    endian_get!(get_u32, u32, 4);
    endian_get!(get_i64, i64, 8);

    fn get_timespec(&mut self) -> Result<Timestamp, FormatError> {
        if self.off + 16 > self.data.len() {
            return Err(FormatError::MissingData { field: "timespec" });
        }
        let secs = self.get_i64("timespec")?;
        let nsecs = self.get_i64("timespec")?;
        Timestamp::new(secs, nsecs).map_err(|_| FormatError::InvalidTimespec)
    }

    fn get_task(&mut self) -> Result<TaskName, FormatError> {
        let len = self.get_u16("task")? as usize;
        let bytes = self
            .data
            .get(self.off..self.off + len)
            .ok_or(FormatError::MissingData { field: "task" })?;
        let task = TaskName::new(bytes).map_err(|err| match err {
            ValidationError::TaskEncoding(_) => FormatError::InvalidTaskEncoding,
            _ => FormatError::InvalidTaskLength(len),
        })?;
        self.off += len;
        Ok(task)
    }

    fn get_kind(&mut self) -> Result<EventKind, FormatError> {
        let [tag] = self.take::<1>("operation type")?;
        EventKind::try_from(tag).map_err(FormatError::UnsupportedKind)
    }

    fn get_handle(&mut self) -> Result<TimerHandle, FormatError> {
        let raw = self.get_i64("address")?;
        if raw < 0 {
            return Err(FormatError::InvalidAddress);
        }
        TimerHandle::new(raw as u64).map_err(|_| FormatError::InvalidAddress)
    }

    fn get_msecs(&mut self) -> Result<u64, FormatError> {
        let raw = self.get_i64("milliseconds")?;
        if raw < 0 {
            return Err(FormatError::InvalidMillis);
        }
        Ok(raw as u64)
    }

    fn decode_one(&mut self) -> Result<Event, FormatError> {
        let stamp = self.get_timespec()?;
        let task = self.get_task()?;
        let kind = self.get_kind()?;

        let payload = match kind {
            EventKind::ArmTimespec => Payload::ArmTimespec {
                handle: self.get_handle()?,
                expiry: self.get_timespec()?,
            },
            EventKind::ArmMillis => Payload::ArmMillis {
                handle: self.get_handle()?,
                msecs: self.get_msecs()?,
            },
            EventKind::Cancel => Payload::Cancel {
                handle: self.get_handle()?,
            },
            EventKind::Run => Payload::Run,
            EventKind::Expire => Payload::Expire {
                handle: self.get_handle()?,
                now: self.get_timespec()?,
                scheduled: self.get_timespec()?,
            },
            EventKind::ArmSeconds | EventKind::IssueTimespec | EventKind::IssueMillis => {
                return Err(FormatError::UnsupportedKind(kind.tag()))
            }
        };

        Ok(Event {
            stamp,
            task,
            payload,
        })
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<Event, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if self.decoded == self.count {
            let trailing = self.data.len() - self.off;
            if trailing == 0 {
                return None;
            }
            self.failed = true;
            return Some(Err(FormatError::TrailingData(trailing)));
        }

        let result = self.decode_one();
        match result {
            Ok(_) => self.decoded += 1,
            Err(_) => self.failed = true,
        }
        Some(result)
    }
}

/// Decode a whole buffer
pub fn decode(data: &[u8]) -> Result<Vec<Event>, FormatError> {
    Decoder::new(data)?.collect()
}
