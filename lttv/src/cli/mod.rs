//! Command-line surface for the bundled text-dump binary.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "lttv",
    about = "Decode and analyze Linux Trace Toolkit traces",
    after_help = "\
EXAMPLES:
    lttv ./trace-dir                              Walk a traceset, print a summary
    lttv ./trace-dir --filter 'pid == 1234'       Only process events for one pid
    lttv ./trace-dir --export stats.json          Dump the stats tree to JSON
    lttv ./trace-dir --end-time 5000000 -q        Stop early, suppress progress output"
)]
pub struct Args {
    /// One or more trace directories to merge into a single traceset
    #[arg(required = true)]
    pub traces: Vec<PathBuf>,

    /// Stop processing once an event's tsc reaches this value
    #[arg(long, value_name = "TSC")]
    pub end_time: Option<u64>,

    /// Stop after processing this many events
    #[arg(long, value_name = "N")]
    pub max_events: Option<usize>,

    /// Only process events matching this filter expression
    #[arg(long, value_name = "EXPR")]
    pub filter: Option<String>,

    /// Write the stats tree to this file as JSON
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Events between automatic state checkpoints (overrides the engine default)
    #[arg(long, value_name = "N")]
    pub save_interval: Option<u64>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
