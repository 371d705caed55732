//! Tracepoint vocabulary of the timer library
//!
//! Every timer operation is bracketed by an `_enter_trcevt` and an
//! `_exit_trcevt` tracepoint under the `etux_timer` provider.

use crate::event::{TimerHandle, Timestamp};

/// Timed timer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ArmTspec,
    ArmMsec,
    ArmSec,
    Cancel,
    IssueTspec,
    IssueMsec,
    Run,
    Expire,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::ArmTspec,
        Operation::ArmMsec,
        Operation::ArmSec,
        Operation::Cancel,
        Operation::IssueTspec,
        Operation::IssueMsec,
        Operation::Run,
        Operation::Expire,
    ];

    /// Operations correlated through `timer_addr`
    pub fn is_keyed(self) -> bool {
        matches!(
            self,
            Operation::ArmTspec
                | Operation::ArmMsec
                | Operation::ArmSec
                | Operation::Cancel
                | Operation::Expire
        )
    }
}

/// Which side of the operation bracket a tracepoint marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Enter,
    Exit,
}

/// One `etux_timer` tracepoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Probe {
    pub op: Operation,
    pub phase: Phase,
}

impl Probe {
    pub const fn enter(op: Operation) -> Self {
        Self {
            op,
            phase: Phase::Enter,
        }
    }

    pub const fn exit(op: Operation) -> Self {
        Self {
            op,
            phase: Phase::Exit,
        }
    }

    /// Full tracepoint name, e.g. `etux_timer:arm_tspec_enter_trcevt`
    pub fn name(self) -> &'static str {
        use Operation as Op;
        use Phase::{Enter, Exit};

        match (self.op, self.phase) {
            (Op::ArmTspec, Enter) => "etux_timer:arm_tspec_enter_trcevt",
            (Op::ArmTspec, Exit) => "etux_timer:arm_tspec_exit_trcevt",
            (Op::ArmMsec, Enter) => "etux_timer:arm_msec_enter_trcevt",
            (Op::ArmMsec, Exit) => "etux_timer:arm_msec_exit_trcevt",
            (Op::ArmSec, Enter) => "etux_timer:arm_sec_enter_trcevt",
            (Op::ArmSec, Exit) => "etux_timer:arm_sec_exit_trcevt",
            (Op::Cancel, Enter) => "etux_timer:cancel_enter_trcevt",
            (Op::Cancel, Exit) => "etux_timer:cancel_exit_trcevt",
            (Op::IssueTspec, Enter) => "etux_timer:issue_tspec_enter_trcevt",
            (Op::IssueTspec, Exit) => "etux_timer:issue_tspec_exit_trcevt",
            (Op::IssueMsec, Enter) => "etux_timer:issue_msec_enter_trcevt",
            (Op::IssueMsec, Exit) => "etux_timer:issue_msec_exit_trcevt",
            (Op::Run, Enter) => "etux_timer:run_enter_trcevt",
            (Op::Run, Exit) => "etux_timer:run_exit_trcevt",
            (Op::Expire, Enter) => "etux_timer:expire_enter_trcevt",
            (Op::Expire, Exit) => "etux_timer:expire_exit_trcevt",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Operation::ALL
            .iter()
            .flat_map(|&op| [Probe::enter(op), Probe::exit(op)])
            .find(|probe| probe.name() == name)
    }
}

/// Deadline information carried by `expire_enter`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    /// Clock reading when the callback started
    pub now: Timestamp,
    /// Expiry the timer was armed for
    pub scheduled: Timestamp,
}

impl Deadline {
    /// How late the timer fired, in nanoseconds
    pub fn latency_ns(&self) -> i64 {
        self.now.nanos_since(&self.scheduled)
    }
}

/// A decoded tracepoint occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceMessage {
    pub probe: Probe,
    /// Nanoseconds from the trace clock origin
    pub stamp_ns: i64,
    pub timer: Option<TimerHandle>,
    pub deadline: Option<Deadline>,
}

impl TraceMessage {
    pub fn new(probe: Probe, stamp_ns: i64) -> Self {
        Self {
            probe,
            stamp_ns,
            timer: None,
            deadline: None,
        }
    }

    pub fn with_timer(mut self, timer: TimerHandle) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn with_deadline(mut self, now: Timestamp, scheduled: Timestamp) -> Self {
        self.deadline = Some(Deadline { now, scheduled });
        self
    }
}
