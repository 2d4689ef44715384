use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use lttv::cli::Args;
use lttv::decode::StreamDecoder;
use lttv::domain::types::{Cpu, Tsc, TraceIndex};
use lttv::driver::{Driver, EventData};
use lttv::export::export_stats;
use lttv::filter::parse;
use lttv::iterator::MergedIterator;
use lttv::marker::MarkerRegistry;

/// Read every regular file in `dir`, sorted by name, as one per-CPU
/// tracefile, assigning CPU indices by position. There is no standardized
/// tracefile naming in the wire format this engine decodes, so directory
/// entry order is the only convention available; callers that care about a
/// specific CPU-to-file mapping should name files so lexical order matches.
fn read_trace_dir(dir: &Path) -> Result<Vec<Vec<u8>>> {
    let mut paths: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("reading trace directory {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, std::io::Error>>()?;
    paths.sort();
    paths
        .into_iter()
        .filter(|p| p.is_file())
        .map(|p| fs::read(&p).with_context(|| format!("reading tracefile {}", p.display())))
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut registries = Vec::with_capacity(args.traces.len());
    let mut streams = Vec::new();
    let mut cpu_count: u32 = 0;

    for (trace_idx, dir) in args.traces.iter().enumerate() {
        let files = read_trace_dir(dir)?;
        registries.push(MarkerRegistry::new());
        for (cpu_idx, data) in files.into_iter().enumerate() {
            let cpu = Cpu(u32::try_from(cpu_idx).expect("cpu index fits u32"));
            cpu_count = cpu_count.max(cpu.0 + 1);
            // The merged iterator borrows every stream's bytes for the
            // lifetime of the whole run; leaking is simpler than threading
            // an arena through main() for a process that exits right after.
            let data: &'static [u8] = Box::leak(data.into_boxed_slice());
            let opened = StreamDecoder::open(data, cpu)
                .with_context(|| format!("opening tracefile in {}", dir.display()))?;
            streams.push((TraceIndex(trace_idx), opened.decoder));
        }
    }

    let iterator = MergedIterator::begin(streams, &registries).context("priming merged iterator")?;
    let mut driver = Driver::new(iterator, registries, cpu_count.max(1));

    if let Some(interval) = args.save_interval {
        driver.tracker_mut().set_save_interval(interval);
    }

    if let Some(expr) = &args.filter {
        let parsed = parse(expr).with_context(|| format!("parsing filter expression `{expr}`"))?;
        driver.set_filter(Some(parsed));
    }

    if !args.quiet {
        driver.on_event(
            1,
            0,
            Box::new(|data: &mut EventData| {
                println!("{} pid={} cpu={} {}", data.tsc.0, data.pid.0, data.cpu.0, data.event_name);
                false
            }),
        );
    }

    driver.begin();

    let end_time = args.end_time.map_or(Tsc::MAX, Tsc);
    const BATCH_SIZE: usize = 10_000;
    let mut total = 0usize;
    loop {
        let remaining = args.max_events.map(|m| m.saturating_sub(total));
        let this_batch = remaining.map_or(BATCH_SIZE, |r| r.min(BATCH_SIZE));
        if this_batch == 0 {
            break;
        }
        let (processed, reason) = driver.middle(end_time, this_batch, None)?;
        total += processed;
        if processed < this_batch {
            info!("middle loop stopped: {reason:?}");
            break;
        }
    }

    driver.end();
    driver.finalize_stats()?;

    if !args.quiet {
        println!("processed {total} events, {} process rows tracked", driver.tracker().table().len());
    }

    if let Some(path) = &args.export {
        export_stats(driver.stats().tree(), driver.stats().interner(), path)
            .with_context(|| format!("exporting stats to {}", path.display()))?;
    }

    Ok(())
}
