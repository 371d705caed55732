//! Timer subsystem event model
//!
//! An [`Event`] is one decoded timer operation: when it happened, which task
//! issued it, and a kind-specific [`Payload`]. The kind is never stored on its
//! own; it is derived from the payload so the two cannot disagree.

use crate::error::ValidationError;
use serde::Serialize;
use std::fmt;

/// Nanoseconds per second
pub const NSEC_PER_SEC: i64 = 1_000_000_000;

/// Longest task name representable on the wire
pub const TASK_NAME_MAX: usize = 0xff;

/// A (seconds, nanoseconds) pair with nanoseconds normalized into [0, 1e9)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Timestamp {
    secs: i64,
    nsecs: i64,
}

impl Timestamp {
    /// The origin of time, 0.000000000
    pub const ZERO: Timestamp = Timestamp { secs: 0, nsecs: 0 };

    /// Build a timestamp, rejecting negative seconds and out of range nanoseconds
    pub fn new(secs: i64, nsecs: i64) -> Result<Self, ValidationError> {
        if secs < 0 || !(0..NSEC_PER_SEC).contains(&nsecs) {
            return Err(ValidationError::Timestamp { secs, nsecs });
        }
        Ok(Self { secs, nsecs })
    }

    /// Split a millisecond count into a timestamp
    pub fn from_millis(msecs: u64) -> Self {
        Self {
            secs: (msecs / 1000) as i64,
            nsecs: ((msecs % 1000) * 1_000_000) as i64,
        }
    }

    /// Split a nanosecond count into a timestamp
    pub fn from_nanos(nanos: u64) -> Self {
        Self {
            secs: (nanos / NSEC_PER_SEC as u64) as i64,
            nsecs: (nanos % NSEC_PER_SEC as u64) as i64,
        }
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn nsecs(&self) -> i64 {
        self.nsecs
    }

    /// Total nanoseconds since the origin
    pub fn as_nanos(&self) -> i128 {
        self.secs as i128 * NSEC_PER_SEC as i128 + self.nsecs as i128
    }

    /// Signed distance from `earlier` to `self` in nanoseconds, saturating at the i64 range
    pub fn nanos_since(&self, earlier: &Timestamp) -> i64 {
        let delta = self.as_nanos() - earlier.as_nanos();
        delta.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nsecs)
    }
}

/// Name of the task that emitted an event (1 to 255 ASCII bytes)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskName(Vec<u8>);

impl TaskName {
    pub fn new(name: impl Into<Vec<u8>>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() || name.len() > TASK_NAME_MAX {
            return Err(ValidationError::TaskLength(name.len()));
        }
        if let Some(&byte) = name.iter().find(|b| !b.is_ascii()) {
            return Err(ValidationError::TaskEncoding(byte));
        }
        Ok(Self(name))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: an empty name cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Opaque timer identity correlating begin and end of keyed operations
///
/// Stored on the wire as a signed 64-bit integer, hence capped at `i64::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(raw: u64) -> Result<Self, ValidationError> {
        if raw > i64::MAX as u64 {
            return Err(ValidationError::Handle(raw));
        }
        Ok(Self(raw))
    }

    /// Handle for a raw pointer value
    ///
    /// Kernel and tagged userspace addresses have the top bit set; dropping
    /// it keeps handles distinct within a trace while fitting the wire range.
    pub fn from_address(addr: u64) -> Self {
        Self(addr & i64::MAX as u64)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::LowerHex for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Wire tag of an event
///
/// `ArmSeconds`, `IssueTimespec` and `IssueMillis` have no payload layout and
/// are rejected by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum EventKind {
    ArmTimespec = 0,
    ArmMillis = 1,
    ArmSeconds = 2,
    Cancel = 3,
    IssueTimespec = 4,
    IssueMillis = 5,
    Run = 6,
    Expire = 7,
}

impl EventKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Lower case display name
    pub fn name(self) -> &'static str {
        match self {
            EventKind::ArmTimespec => "arm_tspec",
            EventKind::ArmMillis => "arm_msec",
            EventKind::ArmSeconds => "arm_sec",
            EventKind::Cancel => "cancel",
            EventKind::IssueTimespec => "issue_tspec",
            EventKind::IssueMillis => "issue_msec",
            EventKind::Run => "run",
            EventKind::Expire => "expire",
        }
    }
}

impl TryFrom<u8> for EventKind {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => EventKind::ArmTimespec,
            1 => EventKind::ArmMillis,
            2 => EventKind::ArmSeconds,
            3 => EventKind::Cancel,
            4 => EventKind::IssueTimespec,
            5 => EventKind::IssueMillis,
            6 => EventKind::Run,
            7 => EventKind::Expire,
            other => return Err(other),
        })
    }
}

/// Kind-specific event data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Timer armed with a relative timespec expiry
    ArmTimespec { handle: TimerHandle, expiry: Timestamp },
    /// Timer armed with a relative millisecond expiry
    ArmMillis { handle: TimerHandle, msecs: u64 },
    Cancel { handle: TimerHandle },
    /// One pass of the expiry processing loop
    Run,
    /// Callback of a single timer; `now` minus `scheduled` is its latency
    Expire {
        handle: TimerHandle,
        now: Timestamp,
        scheduled: Timestamp,
    },
}

impl Payload {
    pub fn kind(&self) -> EventKind {
        match self {
            Payload::ArmTimespec { .. } => EventKind::ArmTimespec,
            Payload::ArmMillis { .. } => EventKind::ArmMillis,
            Payload::Cancel { .. } => EventKind::Cancel,
            Payload::Run => EventKind::Run,
            Payload::Expire { .. } => EventKind::Expire,
        }
    }

    pub fn handle(&self) -> Option<TimerHandle> {
        match self {
            Payload::ArmTimespec { handle, .. }
            | Payload::ArmMillis { handle, .. }
            | Payload::Cancel { handle }
            | Payload::Expire { handle, .. } => Some(*handle),
            Payload::Run => None,
        }
    }
}

/// A single timer subsystem event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub stamp: Timestamp,
    pub task: TaskName,
    pub payload: Payload,
}

impl Event {
    pub fn new(stamp: Timestamp, task: TaskName, payload: Payload) -> Result<Self, ValidationError> {
        if let Payload::ArmMillis { msecs, .. } = payload {
            if msecs > i64::MAX as u64 {
                return Err(ValidationError::Millis(msecs));
            }
        }
        Ok(Self {
            stamp,
            task,
            payload,
        })
    }

    pub fn run(stamp: Timestamp, task: TaskName) -> Self {
        Self {
            stamp,
            task,
            payload: Payload::Run,
        }
    }

    pub fn cancel(stamp: Timestamp, task: TaskName, handle: TimerHandle) -> Self {
        Self {
            stamp,
            task,
            payload: Payload::Cancel { handle },
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> {}: ", self.stamp, self.kind().name())?;
        match &self.payload {
            Payload::ArmTimespec { handle, expiry } => {
                write!(f, "@0x{:x} [{}] ({})", handle, expiry, self.task)
            }
            Payload::ArmMillis { handle, msecs } => write!(
                f,
                "@0x{:x} [{}] ({})",
                handle,
                Timestamp::from_millis(*msecs),
                self.task
            ),
            Payload::Cancel { handle } => write!(f, "@0x{:x} ({})", handle, self.task),
            Payload::Run => write!(f, "({})", self.task),
            Payload::Expire {
                handle,
                now,
                scheduled,
            } => write!(
                f,
                "@0x{:x} [{}] scheduled [{}] ({})",
                handle, now, scheduled, self.task
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str) -> TaskName {
        TaskName::new(name).unwrap()
    }

    #[test]
    fn test_timestamp_rejects_out_of_range() {
        assert!(Timestamp::new(0, NSEC_PER_SEC).is_err());
        assert!(Timestamp::new(-1, 0).is_err());
        assert!(Timestamp::new(0, -1).is_err());
        assert!(Timestamp::new(12, 999_999_999).is_ok());
    }

    #[test]
    fn test_timestamp_from_millis() {
        let ts = Timestamp::from_millis(2_500);
        assert_eq!(ts.secs(), 2);
        assert_eq!(ts.nsecs(), 500_000_000);
    }

    #[test]
    fn test_timestamp_nanos_since() {
        let a = Timestamp::new(1, 900_000_000).unwrap();
        let b = Timestamp::new(2, 100_000_000).unwrap();
        assert_eq!(b.nanos_since(&a), 200_000_000);
        assert_eq!(a.nanos_since(&b), -200_000_000);
    }

    #[test]
    fn test_task_name_length_bounds() {
        assert_eq!(TaskName::new(""), Err(ValidationError::TaskLength(0)));
        assert!(TaskName::new(vec![b'a'; 255]).is_ok());
        assert_eq!(
            TaskName::new(vec![b'a'; 256]),
            Err(ValidationError::TaskLength(256))
        );
    }

    #[test]
    fn test_task_name_rejects_non_ascii() {
        assert_eq!(
            TaskName::new(b"t\xc3\xa9".to_vec()),
            Err(ValidationError::TaskEncoding(0xc3))
        );
        assert!(TaskName::new("kworker/0:1-123").is_ok());
    }

    #[test]
    fn test_handle_rejects_sign_bit() {
        assert!(TimerHandle::new(i64::MAX as u64).is_ok());
        assert!(TimerHandle::new(1 << 63).is_err());
    }

    #[test]
    fn test_handle_from_address_clears_top_bit() {
        assert_eq!(
            TimerHandle::from_address(0xffff_8880_0a1b_2c30).get(),
            0x7fff_8880_0a1b_2c30
        );
        assert_eq!(TimerHandle::from_address(0x5581_d8c0).get(), 0x5581_d8c0);
    }

    #[test]
    fn test_kind_tags_round_trip() {
        for tag in 0u8..8 {
            let kind = EventKind::try_from(tag).unwrap();
            assert_eq!(kind.tag(), tag);
        }
        assert_eq!(EventKind::try_from(8), Err(8));
    }

    #[test]
    fn test_event_display() {
        let stamp = Timestamp::new(12, 345).unwrap();
        let handle = TimerHandle::new(0xbeef).unwrap();
        let evt = Event::new(
            stamp,
            task("swapper/0"),
            Payload::ArmMillis { handle, msecs: 1500 },
        )
        .unwrap();
        assert_eq!(
            evt.to_string(),
            "<12.000000345> arm_msec: @0xbeef [1.500000000] (swapper/0)"
        );
        assert_eq!(
            Event::run(stamp, task("ksoftirqd/1")).to_string(),
            "<12.000000345> run: (ksoftirqd/1)"
        );
    }

    #[test]
    fn test_event_rejects_oversized_millis() {
        let handle = TimerHandle::new(1).unwrap();
        let result = Event::new(
            Timestamp::ZERO,
            task("t"),
            Payload::ArmMillis {
                handle,
                msecs: u64::MAX,
            },
        );
        assert_eq!(result, Err(ValidationError::Millis(u64::MAX)));
    }
}
