//! Console rendering of events, statistics and probe listings
//!
//! Statistics are kept in nanoseconds; the table shows per-operation values
//! in microseconds and totals in milliseconds, each total followed by its
//! share of the overall total.

use crate::correlate::TimerStats;
use crate::event::Event;
use crate::stats::{SampleStats, StatsSummary};
use crate::trace_text::ProbeCatalog;
use serde::Serialize;
use std::io::{self, Write};

const NAME_WIDTH: usize = 16;
const VALUE_WIDTH: usize = 12;
const TOTAL_WIDTH: usize = 18;
const COUNT_WIDTH: usize = 14;
const RULE_WIDTH: usize = NAME_WIDTH + 5 * (VALUE_WIDTH + 1) + TOTAL_WIDTH + COUNT_WIDTH + 2;

const NSEC_PER_USEC: f64 = 1_000.0;
const NSEC_PER_MSEC: f64 = 1_000_000.0;

/// Percentage of `part` in `whole`, 0 when `whole` is empty
fn ratio(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part * 100.0 / whole
    }
}

/// Statistics of one pass in microseconds, as emitted by `--format json`
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub unit: &'static str,
    pub arm_tspec: StatsSummary,
    pub arm_msec: StatsSummary,
    pub arm_sec: StatsSummary,
    pub arm: StatsSummary,
    pub cancel: StatsSummary,
    pub issue_tspec: StatsSummary,
    pub issue_msec: StatsSummary,
    pub issue: StatsSummary,
    pub run: StatsSummary,
    pub expire: StatsSummary,
    pub expire_latency: StatsSummary,
    pub total: StatsSummary,
}

impl StatsReport {
    pub fn new(stats: &TimerStats) -> Self {
        let usec = |set: &SampleStats| set.summary().scaled(NSEC_PER_USEC);
        Self {
            unit: "usec",
            arm_tspec: usec(&stats.arm_tspec),
            arm_msec: usec(&stats.arm_msec),
            arm_sec: usec(&stats.arm_sec),
            arm: usec(stats.arm()),
            cancel: usec(&stats.cancel),
            issue_tspec: usec(&stats.issue_tspec),
            issue_msec: usec(&stats.issue_msec),
            issue: usec(stats.issue()),
            run: usec(&stats.run),
            expire: usec(&stats.expire),
            expire_latency: usec(&stats.expire_latency),
            total: usec(stats.total()),
        }
    }
}

/// Output context handed to every rendering routine
pub struct Console<W: Write> {
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// One decoded binary event per line
    pub fn show_event(&mut self, event: &Event) -> io::Result<()> {
        writeln!(self.out, "{}", event)
    }

    fn rule(&mut self, fill: char) -> io::Result<()> {
        writeln!(self.out, "{}", fill.to_string().repeat(RULE_WIDTH))
    }

    fn header(&mut self) -> io::Result<()> {
        writeln!(
            self.out,
            "{:<nw$} {:>vw$} {:>vw$} {:>vw$} {:>vw$} {:>vw$} {:>tw$} {:>cw$}",
            "OPERATION",
            "MIN",
            "MAX",
            "STDDEV",
            "MEDIAN",
            "MEAN",
            "TOTAL( RATIO)",
            "#NR( RATIO)",
            nw = NAME_WIDTH,
            vw = VALUE_WIDTH,
            tw = TOTAL_WIDTH,
            cw = COUNT_WIDTH,
        )?;
        writeln!(
            self.out,
            "{:<nw$} {:>vw$} {:>vw$} {:>vw$} {:>vw$} {:>vw$} {:>tw$} {:>cw$}",
            "",
            "usec",
            "usec",
            "usec",
            "usec",
            "usec",
            "msec(     %)",
            "    (     %)",
            nw = NAME_WIDTH,
            vw = VALUE_WIDTH,
            tw = TOTAL_WIDTH,
            cw = COUNT_WIDTH,
        )?;
        self.rule('=')
    }

    fn section(&mut self, title: &str) -> io::Result<()> {
        writeln!(self.out, "{}", title)?;
        self.rule('-')
    }

    fn values(&mut self, name: &str, stats: &SampleStats) -> io::Result<()> {
        let usec = stats.summary().scaled(NSEC_PER_USEC);
        write!(
            self.out,
            "{:<nw$} {:>vw$.3} {:>vw$.3} {:>vw$.3} {:>vw$.3} {:>vw$.3}",
            name,
            usec.min,
            usec.max,
            usec.stdev,
            usec.median,
            usec.mean,
            nw = NAME_WIDTH,
            vw = VALUE_WIDTH,
        )
    }

    fn row(&mut self, name: &str, stats: &SampleStats, all: &SampleStats) -> io::Result<()> {
        self.values(name, stats)?;
        let total = format!(
            "{:.3}({:6.2})",
            stats.sum() / NSEC_PER_MSEC,
            ratio(stats.sum(), all.sum())
        );
        let count = format!(
            "{}({:6.2})",
            stats.count(),
            ratio(stats.count() as f64, all.count() as f64)
        );
        writeln!(
            self.out,
            " {:>tw$} {:>cw$}",
            total,
            count,
            tw = TOTAL_WIDTH,
            cw = COUNT_WIDTH
        )
    }

    /// Statistics table with Arm, Issue, Expiry and Overall sections
    pub fn show_stats(&mut self, stats: &TimerStats) -> io::Result<()> {
        let all = stats.total();

        self.header()?;

        self.section("Arm statistics")?;
        self.row("arm tspec", &stats.arm_tspec, all)?;
        self.row("arm msec", &stats.arm_msec, all)?;
        self.row("arm sec", &stats.arm_sec, all)?;
        self.row("Total", stats.arm(), all)?;
        writeln!(self.out)?;

        self.section("Issue statistics")?;
        self.row("issue (tspec)", &stats.issue_tspec, all)?;
        self.row("issue (msec)", &stats.issue_msec, all)?;
        self.row("Total", stats.issue(), all)?;
        writeln!(self.out)?;

        self.section("Expiry statistics")?;
        self.row("duration", &stats.expire, all)?;
        self.values("latency", &stats.expire_latency)?;
        writeln!(self.out)?;
        writeln!(self.out)?;

        self.section("Overall statistics")?;
        self.row("arm", stats.arm(), all)?;
        self.row("cancel", &stats.cancel, all)?;
        self.row("issue", stats.issue(), all)?;
        self.row("run", &stats.run, all)?;
        writeln!(
            self.out,
            "{:<nw$} {:>pad$} {:>tw$.3} {:>cw$}",
            "Total",
            "",
            all.sum() / NSEC_PER_MSEC,
            all.count(),
            nw = NAME_WIDTH,
            pad = 5 * (VALUE_WIDTH + 1) - 1,
            tw = TOTAL_WIDTH - 8,
            cw = COUNT_WIDTH + 8,
        )
    }

    /// Same content as [`Console::show_stats`] as a JSON document
    pub fn show_stats_json(&mut self, stats: &TimerStats) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, &StatsReport::new(stats))?;
        writeln!(self.out)
    }

    /// Probe names, each followed by its fields and their class
    pub fn show_catalog(&mut self, catalog: &ProbeCatalog) -> io::Result<()> {
        for (name, fields) in catalog {
            writeln!(self.out, "{}", name)?;
            for (field, kind) in fields {
                writeln!(self.out, "+-- {} ({})", field, kind)?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::{Correlator, Operation, Probe, TraceMessage};
    use crate::event::{Payload, TaskName, TimerHandle, Timestamp};
    use crate::trace_text::FieldKind;
    use std::collections::BTreeMap;

    fn render(f: impl FnOnce(&mut Console<Vec<u8>>) -> io::Result<()>) -> String {
        let mut console = Console::new(Vec::new());
        f(&mut console).unwrap();
        String::from_utf8(console.into_inner()).unwrap()
    }

    fn sample_stats() -> TimerStats {
        let mut correlator = Correlator::new();
        let timer = TimerHandle::new(0x10).unwrap();
        for (probe, stamp) in [
            (Probe::enter(Operation::ArmMsec), 0),
            (Probe::exit(Operation::ArmMsec), 3_000),
            (Probe::enter(Operation::Cancel), 10_000),
            (Probe::exit(Operation::Cancel), 11_000),
        ] {
            correlator
                .feed(&TraceMessage::new(probe, stamp).with_timer(timer))
                .unwrap();
        }
        correlator.finish()
    }

    #[test]
    fn test_ratio_guards_empty_total() {
        assert_eq!(ratio(5.0, 0.0), 0.0);
        assert_eq!(ratio(1.0, 4.0), 25.0);
    }

    #[test]
    fn test_show_event_line() {
        let event = Event::new(
            Timestamp::new(12, 5).unwrap(),
            TaskName::new("worker").unwrap(),
            Payload::Cancel {
                handle: TimerHandle::new(0xbeef).unwrap(),
            },
        )
        .unwrap();
        let out = render(|c| c.show_event(&event));
        assert_eq!(out, format!("{}\n", event));
    }

    #[test]
    fn test_stats_table_sections_and_ratios() {
        let stats = sample_stats();
        let out = render(|c| c.show_stats(&stats));
        for title in [
            "Arm statistics",
            "Issue statistics",
            "Expiry statistics",
            "Overall statistics",
        ] {
            assert!(out.contains(title), "missing {title}");
        }
        let arm_msec = out.lines().find(|l| l.starts_with("arm msec")).unwrap();
        assert!(arm_msec.contains("3.000"));
        assert!(arm_msec.contains("0.003( 75.00)"));
        assert!(arm_msec.contains("1( 50.00)"));
        let issue = out.lines().find(|l| l.starts_with("issue (tspec)")).unwrap();
        assert!(issue.contains("0.000(  0.00)"));
        assert!(issue.contains("0(  0.00)"));
    }

    #[test]
    fn test_empty_stats_render() {
        let stats = Correlator::new().finish();
        let out = render(|c| c.show_stats(&stats));
        assert!(!out.contains("NaN"));
    }

    #[test]
    fn test_stats_json_in_usec() {
        let stats = sample_stats();
        let out = render(|c| c.show_stats_json(&stats));
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["unit"], "usec");
        assert_eq!(value["arm_msec"]["mean"], 3.0);
        assert_eq!(value["total"]["count"], 2);
        assert_eq!(value["expire"]["count"], 0);
    }

    #[test]
    fn test_catalog_listing() {
        let mut catalog = ProbeCatalog::new();
        catalog.insert(
            "etux_timer:run_enter_trcevt".to_string(),
            BTreeMap::from([("cpu_id".to_string(), FieldKind::Integer)]),
        );
        let out = render(|c| c.show_catalog(&catalog));
        assert_eq!(out, "etux_timer:run_enter_trcevt\n+-- cpu_id (integer)\n\n");
    }
}
