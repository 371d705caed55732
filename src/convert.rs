//! Kernel timer trace conversion
//!
//! Turns ftrace `timer:*` lines such as
//!
//! ```text
//!   kworker/0:1-123   [000] d.s1  5432.101234: timer_start: timer=ffff88800a1b2c30 function=f expires=4295 [timeout=250] cpu=0 idx=0 flags=
//! ```
//!
//! into [`Event`]s. A line is tokenized right to left from the ` timer=`
//! separator: operation, timestamp, flags, `[cpu]`, and whatever precedes
//! the CPU field is the task name.
//!
//! The kernel brackets every callback with `timer_expire_entry` /
//! `timer_expire_exit`; consecutive brackets belong to one pass of the timer
//! softirq and are folded into a single `Run` event.

use crate::error::{Error, ProtocolWarning, Result};
use crate::event::{Event, EventKind, Payload, TaskName, TimerHandle, Timestamp};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Largest millisecond timeout stored by the converter
pub const MSECS_MAX: u64 = i32::MAX as u64;

/// Fields of one tokenized kernel trace line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelLine<'a> {
    pub task: &'a str,
    pub stamp: &'a str,
    pub operation: &'a str,
    pub timer: &'a str,
    pub tail: &'a str,
}

impl<'a> KernelLine<'a> {
    /// Split a line into its fields, or `None` if it does not have the
    /// `TASK [CPU] FLAGS STAMP: OPERATION: timer=HEX TAIL` shape
    pub fn tokenize(line: &'a str) -> Option<Self> {
        let (head, rest) = line.split_once(" timer=")?;

        let head = head.trim_end().strip_suffix(':')?;
        let (head, operation) = head.trim_end().rsplit_once(char::is_whitespace)?;
        if operation.is_empty() || operation.contains(':') {
            return None;
        }

        let head = head.trim_end().strip_suffix(':')?;
        let (head, stamp) = head.trim_end().rsplit_once(char::is_whitespace)?;
        if stamp.is_empty() || !stamp.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
            return None;
        }

        let (head, flags) = head.trim_end().rsplit_once(char::is_whitespace)?;
        if !(4..=5).contains(&flags.len()) {
            return None;
        }

        let head = head.trim_end().strip_suffix(']')?;
        let (task, cpu) = head.rsplit_once('[')?;
        if cpu.is_empty() || !cpu.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let task = task.trim();
        if task.is_empty() {
            return None;
        }

        let hex_len = rest
            .bytes()
            .take_while(|b| b.is_ascii_hexdigit())
            .count();
        if hex_len == 0 {
            return None;
        }
        let (timer, tail) = rest.split_at(hex_len);

        Some(Self {
            task,
            stamp,
            operation,
            timer,
            tail: tail.trim_end_matches(&['\n', '\r'][..]),
        })
    }
}

/// Parse a `SECONDS.MICROSECONDS` kernel timestamp
fn parse_stamp(stamp: &str) -> std::result::Result<Timestamp, &'static str> {
    let (secs, usecs) = stamp.split_once('.').ok_or("invalid timestamp format")?;
    if secs.is_empty() || usecs.contains('.') {
        return Err("invalid timestamp format");
    }
    if usecs.len() != 6 {
        return Err("invalid timestamp microseconds format");
    }
    let secs: i64 = secs.parse().map_err(|_| "invalid timestamp range")?;
    let usecs: i64 = usecs.parse().map_err(|_| "invalid timestamp range")?;

    Timestamp::new(secs, usecs * 1000).map_err(|_| "invalid timestamp range")
}

/// Extract the `[timeout=N]` clock tick count from a `timer_start` tail
fn parse_timeout(tail: &str) -> Option<u64> {
    let start = tail.find("[timeout=")?;
    if !tail[..start].ends_with(char::is_whitespace) {
        return None;
    }
    let digits = &tail[start + "[timeout=".len()..];
    let len = digits.bytes().take_while(|b| b.is_ascii_digit()).count();
    let after = digits[len..].strip_prefix(']')?;
    if len == 0 || !after.starts_with(char::is_whitespace) {
        return None;
    }
    digits[..len].parse().ok()
}

/// Clock ticks to milliseconds, clamped to the i32 range
pub fn ticks_to_msecs(ticks: u64, clock_ticks: u64) -> u64 {
    let msecs = ticks as u128 * 1000 / clock_ticks.max(1) as u128;
    msecs.min(MSECS_MAX as u128) as u64
}

/// Stateful kernel trace to event converter
#[derive(Debug)]
pub struct KernelConverter {
    clock_ticks: u64,
    last: Option<EventKind>,
    count: usize,
}

impl KernelConverter {
    /// `clock_ticks` is the kernel tick frequency used to scale timeouts
    pub fn new(clock_ticks: u64) -> Self {
        Self {
            clock_ticks: clock_ticks.max(1),
            last: None,
            count: 0,
        }
    }

    /// Number of events accepted so far
    pub fn count(&self) -> usize {
        self.count
    }

    fn drop_line(&mut self, warning: ProtocolWarning) -> Option<Event> {
        warn!("{}", warning);
        self.last = None;
        None
    }

    /// Convert a single line, or `None` if it is skipped
    pub fn convert_line(&mut self, line: &str) -> Option<Event> {
        let Some(tokens) = KernelLine::tokenize(line) else {
            return self.drop_line(ProtocolWarning::MalformedLine("unmatched trace line format"));
        };

        if !matches!(
            tokens.operation,
            "timer_start" | "timer_cancel" | "timer_expire_entry" | "timer_expire_exit"
        ) {
            debug!(
                "ignoring trace: unsupported '{}' timer operation",
                tokens.operation
            );
            self.last = None;
            return None;
        }

        let stamp = match parse_stamp(tokens.stamp) {
            Ok(stamp) => stamp,
            Err(reason) => return self.drop_line(ProtocolWarning::MalformedLine(reason)),
        };
        let Ok(task) = TaskName::new(tokens.task) else {
            return self.drop_line(ProtocolWarning::MalformedLine("invalid task name"));
        };
        let Ok(handle) = u64::from_str_radix(tokens.timer, 16).map(TimerHandle::from_address)
        else {
            return self.drop_line(ProtocolWarning::MalformedLine("invalid timer address"));
        };

        let payload = match tokens.operation {
            "timer_start" => {
                self.last = Some(EventKind::ArmMillis);
                let Some(ticks) = parse_timeout(tokens.tail) else {
                    warn!(
                        "{}",
                        ProtocolWarning::MalformedLine("invalid 'timer_start' timer operation")
                    );
                    return None;
                };
                Payload::ArmMillis {
                    handle,
                    msecs: ticks_to_msecs(ticks, self.clock_ticks),
                }
            }
            "timer_cancel" => {
                self.last = Some(EventKind::Cancel);
                Payload::Cancel { handle }
            }
            "timer_expire_entry" => {
                if self.last == Some(EventKind::Run) {
                    return None;
                }
                self.last = Some(EventKind::Run);
                Payload::Run
            }
            // timer_expire_exit closes the bracket opened by the entry
            _ => {
                self.last = Some(EventKind::Run);
                return None;
            }
        };

        self.count += 1;
        Some(Event {
            stamp,
            task,
            payload,
        })
    }

    /// Convert every line, failing with `EmptyInput` if none is accepted
    ///
    /// `interrupt` is polled between lines.
    pub fn convert<I, S>(&mut self, lines: I, interrupt: &AtomicBool) -> Result<Vec<Event>>
    where
        I: IntoIterator<Item = std::io::Result<S>>,
        S: AsRef<str>,
    {
        let mut events = Vec::new();
        for line in lines {
            if interrupt.load(Ordering::Relaxed) {
                return Err(Error::Interrupted);
            }
            if let Some(event) = self.convert_line(line?.as_ref()) {
                events.push(event);
            }
        }

        if events.is_empty() {
            return Err(Error::EmptyInput);
        }
        Ok(events)
    }
}
