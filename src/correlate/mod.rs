//! Timer operation correlation
//!
//! Replays a chronological stream of `etux_timer` tracepoint messages and
//! pairs enter/exit occurrences per operation category:
//! - arm (tspec, msec, sec), cancel and expire are keyed by `timer_addr`
//! - issue (tspec, msec) and run allow one outstanding operation
//! - expire additionally records scheduling latency at enter
//! - run subtracts the expire callbacks that completed inside it
//!
//! One `Correlator` serves exactly one pass.

mod elapse;
mod probe;

pub use elapse::{Elapse, ExpireElapse, KeyedElapse, RunElapse, SampleSet};
pub use probe::{Deadline, Operation, Phase, Probe, TraceMessage};

use crate::error::{Error, Result};
use crate::event::TimerHandle;
use crate::stats::SampleStats;
use std::cell::OnceCell;

/// Per-category pairing state for one trace pass
#[derive(Debug, Default)]
pub struct Correlator {
    arm_tspec: KeyedElapse,
    arm_msec: KeyedElapse,
    arm_sec: KeyedElapse,
    cancel: KeyedElapse,
    issue_tspec: Elapse,
    issue_msec: Elapse,
    expire: ExpireElapse,
    run: RunElapse,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn missing(message: &TraceMessage, field: &'static str) -> Error {
        Error::MissingField {
            event: message.probe.name().to_string(),
            field,
        }
    }

    fn pair_keyed(
        keyed: &mut KeyedElapse,
        phase: Phase,
        name: &'static str,
        timer: TimerHandle,
        stamp: i64,
    ) {
        match phase {
            Phase::Enter => keyed.begin(name, timer, stamp),
            Phase::Exit => {
                keyed.end(name, timer, stamp);
            }
        }
    }

    fn pair(elapse: &mut Elapse, phase: Phase, name: &'static str, stamp: i64) {
        match phase {
            Phase::Enter => elapse.begin(name, stamp),
            Phase::Exit => {
                elapse.end(name, stamp);
            }
        }
    }

    /// Account for one tracepoint message
    ///
    /// Fails only when a message lacks a field its category requires.
    /// Pairing anomalies are logged and the message is dropped.
    pub fn feed(&mut self, message: &TraceMessage) -> Result<()> {
        let Probe { op, phase } = message.probe;
        let name = message.probe.name();
        let stamp = message.stamp_ns;
        let timer = || {
            message
                .timer
                .ok_or_else(|| Self::missing(message, "timer_addr"))
        };

        match op {
            Operation::ArmTspec => {
                Self::pair_keyed(&mut self.arm_tspec, phase, name, timer()?, stamp)
            }
            Operation::ArmMsec => {
                Self::pair_keyed(&mut self.arm_msec, phase, name, timer()?, stamp)
            }
            Operation::ArmSec => {
                Self::pair_keyed(&mut self.arm_sec, phase, name, timer()?, stamp)
            }
            Operation::Cancel => {
                Self::pair_keyed(&mut self.cancel, phase, name, timer()?, stamp)
            }
            Operation::IssueTspec => Self::pair(&mut self.issue_tspec, phase, name, stamp),
            Operation::IssueMsec => Self::pair(&mut self.issue_msec, phase, name, stamp),
            Operation::Expire => {
                let timer = timer()?;
                match phase {
                    Phase::Enter => {
                        let deadline = message
                            .deadline
                            .ok_or_else(|| Self::missing(message, "expiry"))?;
                        self.expire.begin(name, timer, stamp, deadline.latency_ns());
                    }
                    Phase::Exit => {
                        self.expire.end(name, timer, stamp);
                    }
                }
            }
            Operation::Run => match phase {
                Phase::Enter => self.run.begin(name, stamp, &self.expire),
                Phase::Exit => {
                    self.run.end(name, stamp, &self.expire);
                }
            },
        }

        Ok(())
    }

    /// Protocol warnings raised so far
    pub fn warnings(&self) -> usize {
        self.arm_tspec.warnings()
            + self.arm_msec.warnings()
            + self.arm_sec.warnings()
            + self.cancel.warnings()
            + self.issue_tspec.warnings()
            + self.issue_msec.warnings()
            + self.expire.warnings()
            + self.run.warnings()
    }

    /// Begins left without an end; they are never counted
    pub fn pending(&self) -> usize {
        self.arm_tspec.pending()
            + self.arm_msec.pending()
            + self.arm_sec.pending()
            + self.cancel.pending()
            + self.issue_tspec.pending()
            + self.issue_msec.pending()
            + self.expire.pending()
            + self.run.pending()
    }

    /// Raw samples of one category
    pub fn samples(&self, category: Category) -> &[i64] {
        match category {
            Category::ArmTspec => self.arm_tspec.samples().as_slice(),
            Category::ArmMsec => self.arm_msec.samples().as_slice(),
            Category::ArmSec => self.arm_sec.samples().as_slice(),
            Category::Cancel => self.cancel.samples().as_slice(),
            Category::IssueTspec => self.issue_tspec.samples().as_slice(),
            Category::IssueMsec => self.issue_msec.samples().as_slice(),
            Category::Run => self.run.samples().as_slice(),
            Category::Expire => self.expire.samples().as_slice(),
            Category::ExpireLatency => self.expire.latency().as_slice(),
        }
    }

    /// Close the pass and hand the sample sets to the aggregator
    pub fn finish(self) -> TimerStats {
        TimerStats {
            arm_tspec: self.arm_tspec.samples().stats(),
            arm_msec: self.arm_msec.samples().stats(),
            arm_sec: self.arm_sec.samples().stats(),
            cancel: self.cancel.samples().stats(),
            issue_tspec: self.issue_tspec.samples().stats(),
            issue_msec: self.issue_msec.samples().stats(),
            run: self.run.samples().stats(),
            expire: self.expire.samples().stats(),
            expire_latency: self.expire.latency().stats(),
            arm: OnceCell::new(),
            issue: OnceCell::new(),
            total: OnceCell::new(),
        }
    }
}

/// Sample set selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    ArmTspec,
    ArmMsec,
    ArmSec,
    Cancel,
    IssueTspec,
    IssueMsec,
    Run,
    Expire,
    ExpireLatency,
}

/// Statistics of a completed pass, unions computed on demand
#[derive(Debug)]
pub struct TimerStats {
    pub arm_tspec: SampleStats,
    pub arm_msec: SampleStats,
    pub arm_sec: SampleStats,
    pub cancel: SampleStats,
    pub issue_tspec: SampleStats,
    pub issue_msec: SampleStats,
    pub run: SampleStats,
    pub expire: SampleStats,
    pub expire_latency: SampleStats,
    arm: OnceCell<SampleStats>,
    issue: OnceCell<SampleStats>,
    total: OnceCell<SampleStats>,
}

impl TimerStats {
    pub fn get(&self, category: Category) -> &SampleStats {
        match category {
            Category::ArmTspec => &self.arm_tspec,
            Category::ArmMsec => &self.arm_msec,
            Category::ArmSec => &self.arm_sec,
            Category::Cancel => &self.cancel,
            Category::IssueTspec => &self.issue_tspec,
            Category::IssueMsec => &self.issue_msec,
            Category::Run => &self.run,
            Category::Expire => &self.expire,
            Category::ExpireLatency => &self.expire_latency,
        }
    }

    /// All arm variants
    pub fn arm(&self) -> &SampleStats {
        self.arm
            .get_or_init(|| SampleStats::union([&self.arm_tspec, &self.arm_msec, &self.arm_sec]))
    }

    /// All issue variants
    pub fn issue(&self) -> &SampleStats {
        self.issue
            .get_or_init(|| SampleStats::union([&self.issue_tspec, &self.issue_msec]))
    }

    /// Arm, cancel, issue and run; expire callbacks are not part of the total
    pub fn total(&self) -> &SampleStats {
        self.total.get_or_init(|| {
            SampleStats::union([
                &self.arm_tspec,
                &self.arm_msec,
                &self.arm_sec,
                &self.cancel,
                &self.issue_tspec,
                &self.issue_msec,
                &self.run,
            ])
        })
    }
}
