//! Batch conversion over a fixed worker pool
//!
//! ```text
//! work items ──▶ job channel ──▶ worker 0..N ──▶ result channel ──▶ BatchReport
//!                 (bounded,        read report
//!                  fully known)    convert
//!                                  write <stem>.mist
//! ```
//!
//! Workers share only the read-only [`ConversionTables`]. Each unit owns its
//! input and output files, so a failure (including a panic) in one unit is
//! recorded against its id and never touches its siblings. Items whose output
//! path is already claimed by an earlier item are failed before dispatch.

use crate::config::ConversionTables;
use crate::error::{ConversionError, ConversionWarning};
use crate::mist::MIST_EXTENSION;
use crate::normalizer::{BehaviorNormalizer, Conversion};
use crate::report::load_report;
use crossbeam::channel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, info, warn};

/// Batch execution options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    /// Number of worker threads
    pub workers: usize,

    /// Print one progress line per converted file
    pub show_progress: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: available_workers(),
            show_progress: false,
        }
    }
}

impl BatchOptions {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be >= 1, got 0".to_string());
        }
        Ok(())
    }
}

/// Available processing units, at least one
pub fn available_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// One input report to convert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub input: PathBuf,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, input: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
        }
    }
}

/// Outcome of a batch run, keyed by work-item id
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Written MIST report per converted item
    pub outputs: BTreeMap<String, PathBuf>,

    /// File-level failure per item that produced no output
    pub warnings: BTreeMap<String, String>,

    /// Per-call conversion warnings of converted items
    pub notes: BTreeMap<String, Vec<ConversionWarning>>,
}

impl BatchReport {
    pub fn converted(&self) -> usize {
        self.outputs.len()
    }

    pub fn failed(&self) -> usize {
        self.warnings.len()
    }
}

/// Output location for an input report: `<output_dir>/<file stem>.mist`
///
/// Only the last extension is stripped, so `a.json.gz` becomes `a.json.mist`.
pub fn output_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(format!("{}.{}", stem, MIST_EXTENSION))
}

/// Whether a file name looks like a behavior report (`.json` or `.gz`)
pub fn is_report_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("gz"))
}

/// Enumerate the reports of an input directory as work items
///
/// Items are sorted by path and identified by their file name.
pub fn collect_inputs(dir: &Path) -> std::io::Result<Vec<WorkItem>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_report_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| {
            let id = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            WorkItem::new(id, path)
        })
        .collect())
}

/// Convert one file and write its MIST report
///
/// A partially written output is removed when the write fails.
pub fn convert_file(
    input: &Path,
    output: &Path,
    normalizer: &BehaviorNormalizer<'_>,
) -> Result<Conversion, ConversionError> {
    let report = load_report(input)?;
    let conversion = normalizer.convert(&report);
    if let Err(source) = conversion.document.save(output) {
        remove_partial_output(output);
        return Err(ConversionError::Write {
            path: output.to_path_buf(),
            source,
        });
    }
    Ok(conversion)
}

type UnitResult = (String, PathBuf, Result<Conversion, ConversionError>);

/// Pair each item with its output path, failing items whose path is taken
fn plan_outputs<'a>(
    items: &'a [WorkItem],
    output_dir: &Path,
    report: &mut BatchReport,
) -> Vec<(&'a WorkItem, PathBuf)> {
    let mut claimed: HashMap<PathBuf, &str> = HashMap::with_capacity(items.len());
    let mut jobs = Vec::with_capacity(items.len());

    for item in items {
        let output = output_path(&item.input, output_dir);
        if let Some(owner) = claimed.get(&output) {
            let error = ConversionError::OutputCollision {
                path: item.input.clone(),
                output,
                claimed_by: owner.to_string(),
            };
            warn!("{}: {}", item.id, error);
            report.warnings.insert(item.id.clone(), error.to_string());
            continue;
        }
        claimed.insert(output.clone(), &item.id);
        jobs.push((item, output));
    }
    jobs
}

/// Convert every work item, writing outputs into `output_dir`
///
/// Never fails as a whole: each item ends up either in `outputs` or in
/// `warnings`. Items are not retried.
pub fn run(
    items: &[WorkItem],
    output_dir: &Path,
    tables: &ConversionTables,
    options: &BatchOptions,
) -> BatchReport {
    let mut report = BatchReport::default();
    if items.is_empty() {
        return report;
    }

    let jobs = plan_outputs(items, output_dir, &mut report);
    if jobs.is_empty() {
        return report;
    }

    let workers = options.workers.clamp(1, jobs.len());
    let normalizer = BehaviorNormalizer::from_tables(tables);

    let (job_tx, job_rx) = channel::bounded::<(&WorkItem, PathBuf)>(jobs.len());
    let (result_tx, result_rx) = channel::unbounded::<UnitResult>();

    for job in jobs {
        // Capacity equals the number of jobs, so this never blocks.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    thread::scope(|scope| {
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let normalizer = &normalizer;
            scope.spawn(move || {
                for (item, output) in job_rx.iter() {
                    if options.show_progress {
                        print_progress(&item.input);
                    }
                    debug!("worker {} converting {}", worker, item.input.display());
                    let result = run_unit(&item.input, &output, || {
                        convert_file(&item.input, &output, normalizer)
                    });
                    if result_tx.send((item.id.clone(), output, result)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    for (id, output, result) in result_rx.iter() {
        match result {
            Ok(conversion) => {
                if !conversion.warnings.is_empty() {
                    debug!(
                        "{}: {} conversion warnings",
                        id,
                        conversion.warnings.len()
                    );
                    report.notes.insert(id.clone(), conversion.warnings);
                }
                report.outputs.insert(id, output);
            }
            Err(e) => {
                warn!("{}: {}", id, e);
                report.warnings.insert(id, e.to_string());
            }
        }
    }

    info!(
        "Batch complete: {} converted, {} failed",
        report.converted(),
        report.failed()
    );
    report
}

/// Run one unit, turning a panic into a failure of that unit alone
fn run_unit<F>(input: &Path, output: &Path, convert: F) -> Result<Conversion, ConversionError>
where
    F: FnOnce() -> Result<Conversion, ConversionError>,
{
    panic::catch_unwind(AssertUnwindSafe(convert)).unwrap_or_else(|payload| {
        remove_partial_output(output);
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(ConversionError::Panicked {
            path: input.to_path_buf(),
            message,
        })
    })
}

fn remove_partial_output(output: &Path) {
    match fs::remove_file(output) {
        Ok(()) => debug!("Removed partial output {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", output.display(), e),
    }
}

fn print_progress(input: &Path) {
    let display = input.display().to_string();
    let tail: String = {
        let chars: Vec<char> = display.chars().collect();
        chars[chars.len().saturating_sub(55)..].iter().collect()
    };
    println!("Converting {:*>58}", tail);
}
