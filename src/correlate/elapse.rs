//! Begin/end pairing state machines
//!
//! Each category owns an append-only list of elapsed nanoseconds. A begin
//! without a matching end is overwritten by the next begin; an end without
//! a pending begin is dropped. Both cases are logged as protocol warnings.

use crate::error::ProtocolWarning;
use crate::event::TimerHandle;
use crate::stats::SampleStats;
use std::collections::HashMap;
use tracing::warn;

/// Append-only elapsed time samples of one category
#[derive(Debug, Default)]
pub struct SampleSet {
    samples: Vec<i64>,
}

impl SampleSet {
    pub fn push(&mut self, nanos: i64) {
        self.samples.push(nanos);
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.samples
    }

    /// Current position, used to find samples appended later
    pub fn mark(&self) -> usize {
        self.samples.len()
    }

    /// Samples appended since `mark`, excluding the most recent one
    //
    // NOTE: leaving out the most recent sample is probably an off-by-one.
    // Preserved until the intended window is confirmed.
    pub fn since_mark(&self, mark: usize) -> &[i64] {
        let end = self.samples.len().saturating_sub(1);
        if mark >= end {
            return &[];
        }
        &self.samples[mark..end]
    }

    pub fn stats(&self) -> SampleStats {
        SampleStats::from_nanos(&self.samples)
    }
}

fn report(warning: ProtocolWarning, warnings: &mut usize) {
    warn!("{}", warning);
    *warnings += 1;
}

/// Pairing keyed by timer handle; many operations may be outstanding
#[derive(Debug, Default)]
pub struct KeyedElapse {
    pending: HashMap<TimerHandle, i64>,
    elapsed: SampleSet,
    warnings: usize,
}

impl KeyedElapse {
    pub fn begin(&mut self, name: &'static str, timer: TimerHandle, stamp_ns: i64) {
        if self.pending.insert(timer, stamp_ns).is_some() {
            report(ProtocolWarning::DuplicateBegin(name), &mut self.warnings);
        }
    }

    pub fn end(&mut self, name: &'static str, timer: TimerHandle, stamp_ns: i64) -> Option<i64> {
        let Some(start) = self.pending.remove(&timer) else {
            report(ProtocolWarning::MissingBegin(name), &mut self.warnings);
            return None;
        };
        let nanos = stamp_ns - start;
        self.elapsed.push(nanos);
        Some(nanos)
    }

    pub fn samples(&self) -> &SampleSet {
        &self.elapsed
    }

    /// Begins still waiting for their end
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn warnings(&self) -> usize {
        self.warnings
    }
}

/// Pairing with at most one outstanding operation
#[derive(Debug, Default)]
pub struct Elapse {
    pending: Option<i64>,
    elapsed: SampleSet,
    warnings: usize,
}

impl Elapse {
    pub fn begin(&mut self, name: &'static str, stamp_ns: i64) {
        if self.pending.replace(stamp_ns).is_some() {
            report(ProtocolWarning::DuplicateBegin(name), &mut self.warnings);
        }
    }

    /// Raw elapsed time since the pending begin, clearing it
    fn take(&mut self, name: &'static str, stamp_ns: i64) -> Option<i64> {
        match self.pending.take() {
            Some(start) => Some(stamp_ns - start),
            None => {
                report(ProtocolWarning::MissingBegin(name), &mut self.warnings);
                None
            }
        }
    }

    pub fn end(&mut self, name: &'static str, stamp_ns: i64) -> Option<i64> {
        let nanos = self.take(name, stamp_ns)?;
        self.elapsed.push(nanos);
        Some(nanos)
    }

    pub fn samples(&self) -> &SampleSet {
        &self.elapsed
    }

    pub fn pending(&self) -> usize {
        usize::from(self.pending.is_some())
    }

    pub fn warnings(&self) -> usize {
        self.warnings
    }
}

/// Callback duration per timer plus scheduling latency
#[derive(Debug, Default)]
pub struct ExpireElapse {
    keyed: KeyedElapse,
    latency: SampleSet,
}

impl ExpireElapse {
    pub fn begin(&mut self, name: &'static str, timer: TimerHandle, stamp_ns: i64, latency_ns: i64) {
        self.keyed.begin(name, timer, stamp_ns);
        self.latency.push(latency_ns);
    }

    pub fn end(&mut self, name: &'static str, timer: TimerHandle, stamp_ns: i64) -> Option<i64> {
        self.keyed.end(name, timer, stamp_ns)
    }

    pub fn samples(&self) -> &SampleSet {
        self.keyed.samples()
    }

    pub fn latency(&self) -> &SampleSet {
        &self.latency
    }

    pub fn pending(&self) -> usize {
        self.keyed.pending()
    }

    pub fn warnings(&self) -> usize {
        self.keyed.warnings()
    }
}

/// Processing loop duration, net of the callbacks it ran
#[derive(Debug, Default)]
pub struct RunElapse {
    inner: Elapse,
    expire_mark: usize,
}

impl RunElapse {
    pub fn begin(&mut self, name: &'static str, stamp_ns: i64, expire: &ExpireElapse) {
        self.inner.begin(name, stamp_ns);
        self.expire_mark = expire.samples().mark();
    }

    pub fn end(&mut self, name: &'static str, stamp_ns: i64, expire: &ExpireElapse) -> Option<i64> {
        let raw = self.inner.take(name, stamp_ns)?;
        let nested: i64 = expire.samples().since_mark(self.expire_mark).iter().sum();
        let nanos = raw - nested;
        self.inner.elapsed.push(nanos);
        Some(nanos)
    }

    pub fn samples(&self) -> &SampleSet {
        self.inner.samples()
    }

    pub fn pending(&self) -> usize {
        self.inner.pending()
    }

    pub fn warnings(&self) -> usize {
        self.inner.warnings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: &str = "test";

    fn handle(raw: u64) -> TimerHandle {
        TimerHandle::new(raw).unwrap()
    }

    #[test]
    fn test_since_mark_excludes_last() {
        let mut set = SampleSet::default();
        for n in [1, 2, 3, 4] {
            set.push(n);
        }
        assert_eq!(set.since_mark(0), &[1, 2, 3]);
        assert_eq!(set.since_mark(2), &[3]);
        assert!(set.since_mark(3).is_empty());
        assert!(set.since_mark(4).is_empty());
        assert!(SampleSet::default().since_mark(0).is_empty());
    }

    #[test]
    fn test_keyed_concurrent_handles() {
        let mut keyed = KeyedElapse::default();
        keyed.begin(NAME, handle(1), 100);
        keyed.begin(NAME, handle(2), 110);
        assert_eq!(keyed.pending(), 2);
        assert_eq!(keyed.end(NAME, handle(2), 115), Some(5));
        assert_eq!(keyed.end(NAME, handle(1), 130), Some(30));
        assert_eq!(keyed.samples().as_slice(), &[5, 30]);
        assert_eq!(keyed.warnings(), 0);
    }

    #[test]
    fn test_unkeyed_duplicate_begin_overwrites() {
        let mut elapse = Elapse::default();
        elapse.begin(NAME, 10);
        elapse.begin(NAME, 12);
        assert_eq!(elapse.warnings(), 1);
        assert_eq!(elapse.end(NAME, 20), Some(8));
        assert_eq!(elapse.end(NAME, 25), None);
        assert_eq!(elapse.warnings(), 2);
        assert_eq!(elapse.samples().as_slice(), &[8]);
    }

    #[test]
    fn test_expire_records_latency_at_begin() {
        let mut expire = ExpireElapse::default();
        expire.begin(NAME, handle(9), 1_000, 250);
        assert_eq!(expire.latency().as_slice(), &[250]);
        assert!(expire.samples().as_slice().is_empty());
        assert_eq!(expire.end(NAME, handle(9), 1_040), Some(40));
    }
}
