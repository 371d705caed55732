//! Binary performance event codec throughput
//!
//! Measures packing and unpacking of event streams of increasing size, and
//! the kernel text conversion feeding them.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench codec_throughput
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::AtomicBool;
use timerperf::{decode, encode, Endian, Event, KernelConverter, Payload, TaskName, TimerHandle, Timestamp};

/// Mixed stream resembling a busy timer wheel
fn create_bench_events(count: usize) -> Vec<Event> {
    let task = TaskName::new("kworker/0:1-123").unwrap();
    (0..count)
        .map(|i| {
            let stamp = Timestamp::from_nanos(i as u64 * 1_000);
            let handle = TimerHandle::new(0x5581_d8c0 + (i as u64 % 64) * 0x40).unwrap();
            let payload = match i % 4 {
                0 => Payload::ArmMillis { handle, msecs: 250 },
                1 => Payload::Cancel { handle },
                2 => Payload::Run,
                _ => Payload::ArmTimespec {
                    handle,
                    expiry: Timestamp::from_millis(10),
                },
            };
            Event::new(stamp, task.clone(), payload).unwrap()
        })
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for count in [100, 1_000, 10_000] {
        let events = create_bench_events(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &events, |b, events| {
            b.iter(|| encode(black_box(events), Endian::Little).unwrap());
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for count in [100, 1_000, 10_000] {
        let data = encode(&create_bench_events(count), Endian::Big).unwrap();
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &data, |b, data| {
            b.iter(|| decode(black_box(data)).unwrap());
        });
    }

    group.finish();
}

fn bench_kernel_conversion(c: &mut Criterion) {
    let lines: Vec<String> = (0..1_000)
        .map(|i| {
            format!(
                "     kworker/0:1-123     [000] ....  5432.{:06}: timer_start: timer=ffff88800a1b{:04x} function=f expires=4295 [timeout=250] cpu=0 idx=0 flags=",
                i,
                i
            )
        })
        .collect();
    let interrupt = AtomicBool::new(false);

    c.bench_function("convert_1000_lines", |b| {
        b.iter(|| {
            let mut converter = KernelConverter::new(100);
            let events = converter
                .convert(lines.iter().map(|l| Ok::<_, std::io::Error>(l.as_str())), &interrupt)
                .unwrap();
            black_box(events);
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_kernel_conversion);
criterion_main!(benches);
