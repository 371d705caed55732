//! babeltrace2 text dump reader
//!
//! Reads the "pretty" output of `babeltrace2` over a userspace trace:
//!
//! ```text
//! [1712.000010200] (+0.000000300) host etux_timer:arm_msec_exit_trcevt: { cpu_id = 1 }, { timer_addr = 0x5581d8c0 }
//! ```
//!
//! The bracketed stamp comes first (`--clock-seconds`, `--clock-cycles` or
//! the default wall clock form), followed by the `provider:event:` name and
//! any number of `{ key = value, ... }` groups. Groups are flattened; a key
//! appearing twice keeps its last value, which is the payload field.

use crate::correlate::{Correlator, Operation, Probe, TraceMessage};
use crate::error::{Error, ProtocolWarning, Result};
use crate::event::{TimerHandle, Timestamp, NSEC_PER_SEC};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use tracing::{info, warn};

/// `key = value` pairs inside field groups. Quoted strings are matched as a
/// whole so separators inside them do not split the value.
static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*) = ("(?:[^"\\]|\\.)*"|[^,}\s]+)"#)
        .expect("Invalid trace field regex pattern")
});

/// A decoded field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Integer(i128),
    Real(f64),
    Text(&'a str),
}

impl<'a> FieldValue<'a> {
    fn parse(raw: &'a str) -> Self {
        if let Some(text) = raw.strip_prefix('"') {
            return FieldValue::Text(text.strip_suffix('"').unwrap_or(text));
        }

        let (negative, digits) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (radix, digits) = match digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            Some(hex) => (16, hex),
            None => (10, digits),
        };
        // from_str_radix takes a sign of its own; only the one stripped above counts
        let integer = if digits.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            i128::from_str_radix(digits, radix).ok()
        } else {
            None
        };
        let integer = match integer {
            Some(value) if negative => value.checked_neg(),
            other => other,
        };
        if let Some(value) = integer {
            return FieldValue::Integer(value);
        }

        match raw.parse::<f64>() {
            Ok(value) => FieldValue::Real(value),
            Err(_) => FieldValue::Text(raw),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Real(_) => FieldKind::Real,
            FieldValue::Text(_) => FieldKind::String,
        }
    }
}

/// Field class as shown by the probe listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Real,
    String,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldKind::Integer => "integer",
            FieldKind::Real => "real",
            FieldKind::String => "string",
        })
    }
}

/// One event line of a dump
#[derive(Debug, Clone, PartialEq)]
pub struct DumpLine<'a> {
    /// Nanoseconds from the clock origin
    pub stamp_ns: i64,
    /// Full event name, e.g. `etux_timer:run_enter_trcevt`
    pub name: &'a str,
    pub fields: Vec<(&'a str, FieldValue<'a>)>,
}

impl<'a> DumpLine<'a> {
    /// Parse one line; blank lines yield `Ok(None)`
    pub fn parse(line: &'a str) -> std::result::Result<Option<Self>, &'static str> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let rest = line
            .strip_prefix('[')
            .ok_or("missing timestamp")?;
        let (stamp, mut rest) = rest.split_once(']').ok_or("unterminated timestamp")?;
        let stamp_ns = parse_stamp(stamp).ok_or("invalid timestamp")?;

        let name = loop {
            rest = rest.trim_start();
            if rest.is_empty() || rest.starts_with('{') {
                return Err("missing event name");
            }
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            let (token, tail) = rest.split_at(end);
            rest = tail;
            if let Some(name) = token.strip_suffix(':') {
                if name.contains(':') {
                    break name;
                }
            }
        };

        let fields = FIELD_RE
            .captures_iter(rest)
            .filter_map(|caps| {
                let key = caps.get(1)?.as_str();
                let value = caps.get(2)?.as_str();
                Some((key, FieldValue::parse(value)))
            })
            .collect();

        Ok(Some(Self {
            stamp_ns,
            name,
            fields,
        }))
    }

    pub fn field(&self, key: &str) -> Option<FieldValue<'a>> {
        self.fields
            .iter()
            .rev()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| *value)
    }

    fn integer(&self, key: &str) -> Option<i128> {
        match self.field(key)? {
            FieldValue::Integer(value) => Some(value),
            _ => None,
        }
    }

    /// Correlation message for this line, `Ok(None)` for foreign probes
    ///
    /// Fields that are absent or not integers are left out of the message;
    /// the correlator decides whether they were required.
    pub fn message(&self) -> Result<Option<TraceMessage>> {
        let Some(probe) = Probe::from_name(self.name) else {
            warn!("{}", ProtocolWarning::UnsupportedProbe(self.name.to_string()));
            return Ok(None);
        };
        let mut message = TraceMessage::new(probe, self.stamp_ns);

        if probe.op.is_keyed() {
            if let Some(raw) = self.integer("timer_addr") {
                let addr = u64::try_from(raw).map_err(|_| self.out_of_range("timer_addr"))?;
                message = message.with_timer(TimerHandle::from_address(addr));
            }
        }

        if probe == Probe::enter(Operation::Expire) {
            if let Some((now, scheduled)) = self.deadline()? {
                message = message.with_deadline(now, scheduled);
            }
        }

        Ok(Some(message))
    }

    fn timespec(&self, secs: &'static str, nsecs: &'static str) -> Result<Option<Timestamp>> {
        let (Some(s), Some(ns)) = (self.integer(secs), self.integer(nsecs)) else {
            return Ok(None);
        };
        let s = i64::try_from(s).map_err(|_| self.out_of_range(secs))?;
        let ns = i64::try_from(ns).map_err(|_| self.out_of_range(nsecs))?;
        Ok(Some(Timestamp::new(s, ns)?))
    }

    fn deadline(&self) -> Result<Option<(Timestamp, Timestamp)>> {
        let now = self.timespec("now_sec", "now_nsec")?;
        let scheduled = self.timespec("timer_sec", "timer_nsec")?;
        Ok(now.zip(scheduled))
    }

    fn out_of_range(&self, field: &'static str) -> Error {
        Error::FieldRange {
            event: self.name.to_string(),
            field,
        }
    }
}

/// Parse the content of the leading `[...]` group into nanoseconds
fn parse_stamp(stamp: &str) -> Option<i64> {
    // `--clock-date` prefixes the time of day with the calendar date
    let stamp = stamp.rsplit(' ').next()?;

    let (whole, frac) = match stamp.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (stamp, None),
    };

    let nanos = match frac {
        None => 0,
        Some(frac) => {
            if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            frac.parse::<i64>().ok()? * 10i64.pow(9 - frac.len() as u32)
        }
    };

    let secs = if whole.contains(':') {
        let mut secs: i64 = 0;
        let mut parts = 0;
        for part in whole.split(':') {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            secs = secs.checked_mul(60)?.checked_add(part.parse().ok()?)?;
            parts += 1;
        }
        if parts != 3 {
            return None;
        }
        secs
    } else {
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: i64 = whole.parse().ok()?;
        if frac.is_none() {
            // `--clock-cycles`: a nanosecond clock counter
            return Some(value);
        }
        value
    };

    secs.checked_mul(NSEC_PER_SEC)?.checked_add(nanos)
}

/// Run every event line of a dump through `visit`
///
/// Malformed lines are logged and skipped. Returns the number of event lines
/// visited.
fn scan<I, S, F>(lines: I, interrupt: &AtomicBool, mut visit: F) -> Result<usize>
where
    I: IntoIterator<Item = std::io::Result<S>>,
    S: AsRef<str>,
    F: FnMut(&DumpLine<'_>) -> Result<()>,
{
    let mut count = 0;
    for line in lines {
        if interrupt.load(Ordering::Relaxed) {
            return Err(Error::Interrupted);
        }
        let line = line?;
        match DumpLine::parse(line.as_ref()) {
            Ok(Some(parsed)) => {
                visit(&parsed)?;
                count += 1;
            }
            Ok(None) => {}
            Err(reason) => warn!("{}", ProtocolWarning::MalformedLine(reason)),
        }
    }
    Ok(count)
}

/// Feed a whole dump through a fresh correlator
pub fn correlate<I, S>(lines: I, interrupt: &AtomicBool) -> Result<Correlator>
where
    I: IntoIterator<Item = std::io::Result<S>>,
    S: AsRef<str>,
{
    let mut correlator = Correlator::new();
    let count = scan(lines, interrupt, |line| match line.message()? {
        Some(message) => correlator.feed(&message),
        None => Ok(()),
    })?;
    info!(
        "Processed {} timer traces ({} protocol warnings, {} unterminated)",
        count,
        correlator.warnings(),
        correlator.pending()
    );
    Ok(correlator)
}

/// Event names found in a dump, each with its fields
pub type ProbeCatalog = BTreeMap<String, BTreeMap<String, FieldKind>>;

/// Collect the distinct probes of a dump
pub fn probe<I, S>(lines: I, interrupt: &AtomicBool) -> Result<ProbeCatalog>
where
    I: IntoIterator<Item = std::io::Result<S>>,
    S: AsRef<str>,
{
    let mut catalog = ProbeCatalog::new();
    scan(lines, interrupt, |line| {
        let fields = catalog.entry(line.name.to_string()).or_default();
        for (key, value) in &line.fields {
            fields.entry(key.to_string()).or_insert(value.kind());
        }
        Ok(())
    })?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::Category;

    const ARM_ENTER: &str = "[1712.000010000] (+0.000000000) host etux_timer:arm_msec_enter_trcevt: { cpu_id = 1 }, { timer_addr = 0x5581d8c0, expiry_msec = 250 }";
    const ARM_EXIT: &str = "[1712.000010700] (+0.000000700) host etux_timer:arm_msec_exit_trcevt: { cpu_id = 1 }, { timer_addr = 0x5581d8c0 }";
    const EXPIRE_ENTER: &str = "[1712.000500000] (+0.000489300) host etux_timer:expire_enter_trcevt: { cpu_id = 1 }, { timer_addr = 0x5581d8c0, now_sec = 1712, now_nsec = 250400, timer_sec = 1712, timer_nsec = 250000 }";
    const EXPIRE_EXIT: &str = "[1712.000502000] (+0.000002000) host etux_timer:expire_exit_trcevt: { cpu_id = 1 }, { timer_addr = 0x5581d8c0 }";

    fn no_interrupt() -> AtomicBool {
        AtomicBool::new(false)
    }

    fn lines(input: &[&str]) -> Vec<std::io::Result<String>> {
        input.iter().map(|l| Ok(l.to_string())).collect()
    }

    #[test]
    fn test_parse_seconds_stamp_and_fields() {
        let line = DumpLine::parse(ARM_ENTER).unwrap().unwrap();
        assert_eq!(line.stamp_ns, 1_712_000_010_000);
        assert_eq!(line.name, "etux_timer:arm_msec_enter_trcevt");
        assert_eq!(line.field("timer_addr"), Some(FieldValue::Integer(0x5581d8c0)));
        assert_eq!(line.field("expiry_msec"), Some(FieldValue::Integer(250)));
        assert_eq!(line.field("cpu_id"), Some(FieldValue::Integer(1)));
        assert_eq!(line.field("missing"), None);
    }

    #[test]
    fn test_parse_stamp_forms() {
        assert_eq!(parse_stamp("1.5"), Some(1_500_000_000));
        assert_eq!(parse_stamp("123456789"), Some(123_456_789));
        assert_eq!(parse_stamp("01:00:02.000000003"), Some(3_602_000_000_003));
        assert_eq!(
            parse_stamp("2024-03-01 00:00:01.000000000"),
            Some(1_000_000_000)
        );
        assert_eq!(parse_stamp("1.1234567890"), None);
        assert_eq!(parse_stamp("1:2"), None);
        assert_eq!(parse_stamp("abc"), None);
    }

    #[test]
    fn test_parse_without_delta_or_host() {
        let line = DumpLine::parse("[5] etux_timer:run_enter_trcevt:").unwrap().unwrap();
        assert_eq!(line.stamp_ns, 5);
        assert_eq!(line.name, "etux_timer:run_enter_trcevt");
        assert!(line.fields.is_empty());
    }

    #[test]
    fn test_parse_string_and_real_fields() {
        let line = DumpLine::parse(
            r#"[1.0] h p:e: { msg = "a = b, c", ratio = 0.5, state = -3 }"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(line.field("msg"), Some(FieldValue::Text("a = b, c")));
        assert_eq!(line.field("ratio"), Some(FieldValue::Real(0.5)));
        assert_eq!(line.field("state"), Some(FieldValue::Integer(-3)));
        assert_eq!(line.fields.len(), 3);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(DumpLine::parse("   ").unwrap(), None);
        assert!(DumpLine::parse("no stamp here").is_err());
        assert!(DumpLine::parse("[1.0 etux_timer:run_enter_trcevt:").is_err());
        assert!(DumpLine::parse("[1.0] host { a = 1 }").is_err());
        assert!(DumpLine::parse("[x.y] etux_timer:run_enter_trcevt:").is_err());
    }

    #[test]
    fn test_parse_doubly_signed_values() {
        let line = DumpLine::parse(
            "[1.0] h etux_timer:run_enter_trcevt: { a = --170141183460469231731687303715884105728, b = -0x-8000, c = +-1, d = -0x10 }",
        )
        .unwrap()
        .unwrap();
        assert_eq!(line.fields.len(), 4);
        assert!(!matches!(line.field("a"), Some(FieldValue::Integer(_))));
        assert!(!matches!(line.field("b"), Some(FieldValue::Integer(_))));
        assert!(!matches!(line.field("c"), Some(FieldValue::Integer(_))));
        assert_eq!(line.field("d"), Some(FieldValue::Integer(-16)));
    }

    #[test]
    fn test_high_timer_address_is_masked() {
        let correlator = correlate(
            lines(&[
                "[1.000000000] host etux_timer:cancel_enter_trcevt: { cpu_id = 0 }, { timer_addr = 0xb400007123456780 }",
                "[1.000000300] host etux_timer:cancel_exit_trcevt: { cpu_id = 0 }, { timer_addr = 0xb400007123456780 }",
            ]),
            &no_interrupt(),
        )
        .unwrap();
        assert_eq!(correlator.samples(Category::Cancel), &[300]);

        let line = DumpLine::parse(
            "[1.0] host etux_timer:cancel_enter_trcevt: { timer_addr = 0xb400007123456780 }",
        )
        .unwrap()
        .unwrap();
        let message = line.message().unwrap().unwrap();
        assert_eq!(message.timer.map(|t| t.get()), Some(0x3400_0071_2345_6780));
    }

    #[test]
    fn test_negative_timer_address_is_out_of_range() {
        let err = correlate(
            lines(&["[1.0] host etux_timer:cancel_enter_trcevt: { timer_addr = -4 }"]),
            &no_interrupt(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::FieldRange { field: "timer_addr", .. }));
        assert!(err.to_string().contains("timer_addr event field out of range"));
    }

    #[test]
    fn test_message_for_expire_enter() {
        let line = DumpLine::parse(EXPIRE_ENTER).unwrap().unwrap();
        let message = line.message().unwrap().unwrap();
        assert_eq!(message.timer.map(|t| t.get()), Some(0x5581d8c0));
        assert_eq!(message.deadline.map(|d| d.latency_ns()), Some(400));
    }

    #[test]
    fn test_foreign_probe_is_skipped() {
        let line = DumpLine::parse("[1.0] host lttng_ust_statedump:start: { }")
            .unwrap()
            .unwrap();
        assert_eq!(line.message().unwrap(), None);
    }

    #[test]
    fn test_correlate_dump() {
        let correlator = correlate(
            lines(&[ARM_ENTER, ARM_EXIT, "garbage", EXPIRE_ENTER, EXPIRE_EXIT]),
            &no_interrupt(),
        )
        .unwrap();
        assert_eq!(correlator.samples(Category::ArmMsec), &[700]);
        assert_eq!(correlator.samples(Category::Expire), &[2_000]);
        assert_eq!(correlator.samples(Category::ExpireLatency), &[400]);
    }

    #[test]
    fn test_correlate_missing_timer_is_fatal() {
        let err = correlate(
            lines(&["[1.0] host etux_timer:cancel_enter_trcevt: { cpu_id = 0 }"]),
            &no_interrupt(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "timer_addr", .. }));
    }

    #[test]
    fn test_correlate_interrupted() {
        let interrupt = AtomicBool::new(true);
        let err = correlate(lines(&[ARM_ENTER]), &interrupt).unwrap_err();
        assert!(matches!(err, Error::Interrupted));
    }

    #[test]
    fn test_probe_catalog() {
        let catalog = probe(lines(&[ARM_ENTER, ARM_EXIT, ARM_EXIT]), &no_interrupt()).unwrap();
        assert_eq!(catalog.len(), 2);
        let enter = &catalog["etux_timer:arm_msec_enter_trcevt"];
        assert_eq!(
            enter.keys().map(String::as_str).collect::<Vec<_>>(),
            ["cpu_id", "expiry_msec", "timer_addr"]
        );
        assert_eq!(enter["timer_addr"], FieldKind::Integer);
    }
}
