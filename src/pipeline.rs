//! The five-stage aggregation pipeline.
//!
//! Lister -> Reader -> ParserPool -> Aggregator -> Writer, each pair of
//! stages connected by a bounded channel. A full queue blocks its producer;
//! that is the only backpressure mechanism. The writer runs on the calling
//! thread and its return marks pipeline completion.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::config::VisitaggConfig;
use crate::stats::PipelineSummary;
use crate::visit::{busy_work, Visit};

// Channel capacities between stages. Paths and aggregated records move one
// at a time, raw and parsed lines move in batches.
const PATH_QUEUE_CAP: usize = 8;
const RAW_QUEUE_CAP: usize = 64;
const PARSED_QUEUE_CAP: usize = 64;
const AGGREGATED_QUEUE_CAP: usize = 8;

struct ReadStats {
    files: usize,
    lines: usize,
    elapsed: Duration,
}

struct ParseStats {
    lines: usize,
    elapsed: Duration,
}

struct AggregateStats {
    unique: usize,
}

/// Run the full pipeline to completion. Returns once the output file has
/// been written and flushed, or with the first fatal error from any stage.
///
/// Any stage failure sets the shared abort flag; the other stages notice it
/// (or the resulting channel disconnects) and exit early without emitting
/// further data, so a failed run leaves at most an empty or partial output
/// file.
pub fn run_pipeline(config: &VisitaggConfig) -> Result<PipelineSummary> {
    config.validate()?;

    let started = Instant::now();
    let abort = Arc::new(AtomicBool::new(false));
    let threads = config.effective_threads();
    let batch_size = config.batch_size;
    let parse_cost = config.parse_cost;

    let (path_tx, path_rx) = bounded::<PathBuf>(PATH_QUEUE_CAP);
    let (raw_tx, raw_rx) = bounded::<Vec<String>>(RAW_QUEUE_CAP);
    let (parsed_tx, parsed_rx) = bounded::<Vec<Visit>>(PARSED_QUEUE_CAP);
    let (agg_tx, agg_rx) = bounded::<Visit>(AGGREGATED_QUEUE_CAP);

    // Stage functions borrow their senders so that on failure the abort
    // flag is set before the closure drops the sender and disconnects the
    // channel. Downstream stages checking the flag after a disconnect are
    // then guaranteed to see it.
    let lister = {
        let input_dir = config.input_dir.clone();
        let abort = Arc::clone(&abort);
        thread::spawn(move || {
            let result = list_files(&input_dir, &path_tx, &abort);
            flag_on_error(&abort, result)
        })
    };

    let reader = {
        let abort = Arc::clone(&abort);
        thread::spawn(move || {
            let result = read_lines(&path_rx, &raw_tx, batch_size, &abort);
            flag_on_error(&abort, result)
        })
    };

    let mut workers = Vec::with_capacity(threads);
    for _ in 0..threads {
        let raw_rx = raw_rx.clone();
        let parsed_tx = parsed_tx.clone();
        let abort = Arc::clone(&abort);
        workers.push(thread::spawn(move || {
            let result = parse_batches(&raw_rx, &parsed_tx, batch_size, parse_cost, &abort);
            flag_on_error(&abort, result)
        }));
    }
    // Completion barrier for the worker pool: each worker holds its own
    // clone of the parsed-batch sender, so the channel only disconnects
    // once every worker has exited. No single worker can close it early.
    drop(raw_rx);
    drop(parsed_tx);

    let aggregator = {
        let abort = Arc::clone(&abort);
        thread::spawn(move || {
            let result = aggregate(&parsed_rx, &agg_tx, &abort);
            flag_on_error(&abort, result)
        })
    };

    // Writer runs on the calling thread; the pipeline is complete exactly
    // when it has drained its input and flushed the sink.
    let write_started = Instant::now();
    let write_result = write_output(agg_rx, &config.output_file);
    if write_result.is_err() {
        abort.store(true, Ordering::Relaxed);
    }
    let write_time = write_started.elapsed();

    // Join in pipeline order so the error closest to the source wins.
    join_stage(lister, "lister")?;
    let read_stats = join_stage(reader, "reader")?;

    let mut lines_parsed = 0;
    let mut parse_time = Duration::ZERO;
    for worker in workers {
        let stats = join_stage(worker, "parser")?;
        lines_parsed += stats.lines;
        parse_time = parse_time.max(stats.elapsed);
    }

    let agg_stats = join_stage(aggregator, "aggregator")?;
    let lines_written = write_result?;

    Ok(PipelineSummary {
        files_read: read_stats.files,
        lines_read: read_stats.lines,
        lines_parsed,
        unique_visits: agg_stats.unique,
        lines_written,
        read_time: read_stats.elapsed,
        parse_time,
        write_time,
        total_time: started.elapsed(),
    })
}

fn flag_on_error<T>(abort: &AtomicBool, result: Result<T>) -> Result<T> {
    if result.is_err() {
        abort.store(true, Ordering::Relaxed);
    }
    result
}

fn join_stage<T>(handle: thread::JoinHandle<Result<T>>, stage: &str) -> Result<T> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => bail!("{} stage panicked", stage),
    }
}

/// Lister: emit every non-directory entry of `dir`, non-recursively, in
/// whatever order the directory scan returns.
fn list_files(dir: &Path, out: &Sender<PathBuf>, abort: &AtomicBool) -> Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read input directory '{}'", dir.display()))?;

    for entry in entries {
        if abort.load(Ordering::Relaxed) {
            break;
        }
        let entry = entry
            .with_context(|| format!("failed to scan input directory '{}'", dir.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to stat '{}'", entry.path().display()))?;
        if file_type.is_dir() {
            continue;
        }
        if out.send(entry.path()).is_err() {
            break; // downstream gone, shutting down
        }
    }

    Ok(())
}

/// Reader: stream each file line by line into batches of `batch_size`. The
/// batch accumulator persists across file boundaries, so a batch is a pure
/// count-based grouping over the concatenated line stream. One final
/// undersized batch is flushed when input is exhausted.
fn read_lines(
    paths: &Receiver<PathBuf>,
    out: &Sender<Vec<String>>,
    batch_size: usize,
    abort: &AtomicBool,
) -> Result<ReadStats> {
    let started = Instant::now();
    let mut files = 0;
    let mut lines = 0;
    let mut batch = Vec::with_capacity(batch_size);

    for path in paths {
        if abort.load(Ordering::Relaxed) {
            break;
        }
        let file = File::open(&path)
            .with_context(|| format!("failed to open input file '{}'", path.display()))?;
        let reader = BufReader::new(file);

        for line in reader.lines() {
            let line =
                line.with_context(|| format!("read error in '{}'", path.display()))?;
            lines += 1;
            batch.push(line);
            if batch.len() == batch_size {
                let full = mem::replace(&mut batch, Vec::with_capacity(batch_size));
                if out.send(full).is_err() {
                    return Ok(ReadStats {
                        files,
                        lines,
                        elapsed: started.elapsed(),
                    });
                }
            }
        }
        files += 1;
    }

    if !batch.is_empty() {
        let _ = out.send(batch);
    }

    Ok(ReadStats {
        files,
        lines,
        elapsed: started.elapsed(),
    })
}

/// One parse worker. All workers drain the same raw-batch channel, so batch
/// distribution is first-available; all feed the same parsed-batch channel,
/// so output interleaving is unspecified. Each worker keeps its own local
/// output batch and flushes the final partial one when its input closes.
fn parse_batches(
    input: &Receiver<Vec<String>>,
    out: &Sender<Vec<Visit>>,
    batch_size: usize,
    parse_cost: u32,
    abort: &AtomicBool,
) -> Result<ParseStats> {
    let started = Instant::now();
    let mut lines = 0;
    let mut batch = Vec::with_capacity(batch_size);

    for raw_batch in input {
        if abort.load(Ordering::Relaxed) {
            break;
        }
        for line in &raw_batch {
            busy_work(parse_cost);
            let visit = Visit::parse_line(line)?;
            lines += 1;
            batch.push(visit);
            if batch.len() == batch_size {
                let full = mem::replace(&mut batch, Vec::with_capacity(batch_size));
                if out.send(full).is_err() {
                    return Ok(ParseStats {
                        lines,
                        elapsed: started.elapsed(),
                    });
                }
            }
        }
    }

    if !batch.is_empty() {
        let _ = out.send(batch);
    }

    Ok(ParseStats {
        lines,
        elapsed: started.elapsed(),
    })
}

/// Aggregator: single consumer folding every record into a key -> visit
/// map. Count merging is commutative, so the unordered interleaving of
/// worker batches cannot change the result. Emission starts only after the
/// input channel closes; any record seen later could still merge into an
/// existing key.
fn aggregate(
    input: &Receiver<Vec<Visit>>,
    out: &Sender<Visit>,
    abort: &AtomicBool,
) -> Result<AggregateStats> {
    let mut map: HashMap<String, Visit> = HashMap::new();

    for batch in input {
        if abort.load(Ordering::Relaxed) {
            return Ok(AggregateStats { unique: 0 });
        }
        for visit in batch {
            if let Some(existing) = map.get_mut(visit.key()) {
                existing.count += visit.count;
            } else {
                map.insert(visit.key().to_string(), visit);
            }
        }
    }

    // A failed upstream stage may have dropped unflushed partial batches;
    // emit nothing rather than a silently truncated aggregate.
    if abort.load(Ordering::Relaxed) {
        return Ok(AggregateStats { unique: 0 });
    }

    let unique = map.len();
    for (_, visit) in map {
        if out.send(visit).is_err() {
            break;
        }
    }

    Ok(AggregateStats { unique })
}

/// Writer: create-or-truncate the sink and append one line per aggregated
/// record, in whatever order the aggregator emits them.
fn write_output(input: Receiver<Visit>, path: &Path) -> Result<usize> {
    let file = File::create(path)
        .with_context(|| format!("failed to create output file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;

    for visit in input {
        writeln!(writer, "{}", visit)
            .with_context(|| format!("write error in '{}'", path.display()))?;
        written += 1;
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush output file '{}'", path.display()))?;

    Ok(written)
}
