//! Command implementations behind the CLI

use crate::cli::{Command, ReportFormat};
use crate::codec::{encode, Decoder};
use crate::config::Config;
use crate::convert::KernelConverter;
use crate::error::Error;
use crate::report::Console;
use crate::trace_text;
use anyhow::{Context, Result};
use regex::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

const STDIO: &str = "-";

fn open_input(path: &str) -> Result<Box<dyn BufRead>> {
    if path == STDIO {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("Cannot open '{}'", path))?;
    Ok(Box::new(BufReader::new(file)))
}

fn open_output(path: &str) -> Result<Box<dyn Write>> {
    if path == STDIO {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    let file = File::create(path).with_context(|| format!("Cannot create '{}'", path))?;
    Ok(Box::new(BufWriter::new(file)))
}

/// Split `reader` into lines, replacing invalid UTF-8 instead of failing
///
/// Task names are raw bytes in kernel traces; lines carrying a non-ASCII
/// name are then dropped by the converter.
fn lossy_lines<R: BufRead>(mut reader: R) -> impl Iterator<Item = io::Result<String>> {
    let mut buf = Vec::new();
    std::iter::from_fn(move || {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => {
                if buf.ends_with(b"\n") {
                    buf.pop();
                    if buf.ends_with(b"\r") {
                        buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&buf).into_owned()))
            }
            Err(err) => Some(Err(err)),
        }
    })
}

/// Whether the pass stopped on user request rather than on a failure
pub fn is_interrupted(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<Error>(), Some(Error::Interrupted)))
}

/// Run one command to completion
pub fn run(command: Command, config: &Config, interrupt: &AtomicBool) -> Result<()> {
    match command {
        Command::Convert {
            input,
            output,
            endian,
            clock_ticks,
        } => {
            let clock_ticks = clock_ticks.unwrap_or_else(|| config.clock_ticks());
            let endian = endian.unwrap_or(config.endian);
            convert(&input, &output, endian, clock_ticks, interrupt)
        }
        Command::Show { input, task } => show(&input, task.as_deref(), interrupt),
        Command::Stat { input, format } => stat(&input, format, interrupt),
        Command::List { input } => list(&input, interrupt),
    }
}

fn convert(
    input: &str,
    output: &str,
    endian: crate::codec::Endian,
    clock_ticks: u64,
    interrupt: &AtomicBool,
) -> Result<()> {
    debug!("converting with {} clock ticks per second", clock_ticks);

    let reader = open_input(input)?;
    let mut converter = KernelConverter::new(clock_ticks);
    let events = converter
        .convert(lossy_lines(reader), interrupt)
        .context("Cannot convert kernel timer traces to performance events")?;
    info!("Processed {} kernel timer traces", events.len());

    let data = encode(&events, endian).context("Cannot pack performance events")?;
    let mut out = open_output(output)?;
    out.write_all(&data)
        .and_then(|()| out.flush())
        .with_context(|| format!("Cannot write performance events to '{}'", output))?;
    Ok(())
}

fn show(input: &str, task: Option<&str>, interrupt: &AtomicBool) -> Result<()> {
    let filter = task
        .map(Regex::new)
        .transpose()
        .context("Invalid task name filter")?;

    let mut data = Vec::new();
    open_input(input)?
        .read_to_end(&mut data)
        .with_context(|| format!("Cannot read '{}'", input))?;

    let decoder = Decoder::new(&data).context("Cannot load performance events")?;
    debug!(
        "{:?} endian stream of {} events",
        decoder.endian(),
        decoder.record_count()
    );

    let mut console = Console::new(io::stdout().lock());
    for event in decoder {
        if interrupt.load(Ordering::Relaxed) {
            return Err(Error::Interrupted.into());
        }
        let event = event.context("Cannot load performance events")?;
        if let Some(filter) = &filter {
            if !filter.is_match(&event.task.to_string_lossy()) {
                continue;
            }
        }
        console.show_event(&event)?;
    }
    console.flush()?;
    Ok(())
}

fn stat(input: &str, format: ReportFormat, interrupt: &AtomicBool) -> Result<()> {
    let correlator = trace_text::correlate(lossy_lines(open_input(input)?), interrupt)
        .context("Cannot collect timer statistics")?;
    let stats = correlator.finish();

    let mut console = Console::new(io::stdout().lock());
    match format {
        ReportFormat::Text => console.show_stats(&stats)?,
        ReportFormat::Json => console.show_stats_json(&stats)?,
    }
    console.flush()?;
    Ok(())
}

fn list(input: &str, interrupt: &AtomicBool) -> Result<()> {
    let catalog = trace_text::probe(lossy_lines(open_input(input)?), interrupt)
        .context("Cannot probe trace")?;

    let mut console = Console::new(io::stdout().lock());
    console.show_catalog(&catalog)?;
    console.flush()?;
    Ok(())
}
