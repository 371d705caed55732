//! CLI argument parsing for timerperf

use crate::codec::Endian;
use crate::config::LogLevel;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable table (default)
    Text,
    /// JSON document for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "timerperf")]
#[command(version)]
#[command(about = "Timer subsystem trace converter and latency statistics", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Diagnostic verbosity (overrides the configuration file)
    #[arg(short = 'l', long = "log", value_enum, global = true)]
    pub log: Option<LogLevel>,

    /// TOML configuration file
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert kernel ftrace timer lines to binary performance events
    Convert {
        /// Kernel trace text, "-" for standard input
        #[arg(value_name = "INPUT", default_value = "-")]
        input: String,

        /// Binary output, "-" for standard output
        #[arg(short = 'o', long = "output", value_name = "OUTPUT", default_value = "-")]
        output: String,

        /// Byte order of the produced stream
        #[arg(short = 'e', long = "endian", value_enum)]
        endian: Option<Endian>,

        /// Kernel tick rate used to convert timeouts to milliseconds
        #[arg(long = "clock-ticks", value_name = "HZ", value_parser = clap::value_parser!(u64).range(1..))]
        clock_ticks: Option<u64>,
    },

    /// Print the events of a binary performance event stream
    Show {
        /// Binary event file, "-" for standard input
        #[arg(value_name = "INPUT", default_value = "-")]
        input: String,

        /// Only show events whose task name matches this regular expression
        #[arg(long = "task", value_name = "REGEX")]
        task: Option<String>,
    },

    /// Compute timer operation statistics from a babeltrace2 text dump
    Stat {
        /// Trace dump, "-" for standard input
        #[arg(value_name = "INPUT", default_value = "-")]
        input: String,

        /// Output format
        #[arg(long = "format", value_enum, default_value = "text")]
        format: ReportFormat,
    },

    /// List the probes and fields found in a babeltrace2 text dump
    List {
        /// Trace dump, "-" for standard input
        #[arg(value_name = "INPUT", default_value = "-")]
        input: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_convert_defaults() {
        let cli = Cli::parse_from(["timerperf", "convert"]);
        match cli.command {
            Command::Convert {
                input,
                output,
                endian,
                clock_ticks,
            } => {
                assert_eq!(input, "-");
                assert_eq!(output, "-");
                assert!(endian.is_none());
                assert!(clock_ticks.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(cli.common.log.is_none());
    }

    #[test]
    fn test_cli_convert_options() {
        let cli = Cli::parse_from([
            "timerperf",
            "convert",
            "trace.txt",
            "-o",
            "events.bin",
            "-e",
            "big",
            "--clock-ticks",
            "250",
        ]);
        match cli.command {
            Command::Convert {
                input,
                output,
                endian,
                clock_ticks,
            } => {
                assert_eq!(input, "trace.txt");
                assert_eq!(output, "events.bin");
                assert_eq!(endian, Some(Endian::Big));
                assert_eq!(clock_ticks, Some(250));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_zero_clock_ticks() {
        assert!(Cli::try_parse_from(["timerperf", "convert", "--clock-ticks", "0"]).is_err());
    }

    #[test]
    fn test_cli_log_is_global() {
        let cli = Cli::parse_from(["timerperf", "show", "-l", "debug", "--task", "^kworker"]);
        assert_eq!(cli.common.log, Some(LogLevel::Debug));
        match cli.command {
            Command::Show { input, task } => {
                assert_eq!(input, "-");
                assert_eq!(task.as_deref(), Some("^kworker"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_stat_format() {
        let cli = Cli::parse_from(["timerperf", "stat", "dump.txt", "--format", "json"]);
        match cli.command {
            Command::Stat { input, format } => {
                assert_eq!(input, "dump.txt");
                assert_eq!(format, ReportFormat::Json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["timerperf"]).is_err());
    }

    #[test]
    fn test_cli_log_level_names() {
        let cli = Cli::parse_from(["timerperf", "--log", "warning", "list"]);
        assert_eq!(cli.common.log, Some(LogLevel::Warning));
        assert!(matches!(cli.command, Command::List { .. }));
    }
}
