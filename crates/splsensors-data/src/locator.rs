//! Sensor file discovery and observation loading.
//!
//! Observations come either from a fresh scan of raw files, parsed with the
//! family's [`SensorParser`](crate::sensors::SensorParser), or from a
//! previously exported `<vessel>_<FAMILY>_Full_Log.csv` inventory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use splsensors_core::error::{Result, SplError};
use splsensors_core::models::{SensorFamily, SensorObservation};
use splsensors_core::time_utils::TimestampProcessor;
use tracing::{debug, warn};

use crate::anomalies::is_undersized;
use crate::sensors::{min_file_size, parser_for};

/// Inventory column holding the sensor file path.
pub const INVENTORY_PATH_COLUMN: &str = "FilePath";
/// Inventory column holding the sensor start time.
pub const INVENTORY_START_COLUMN: &str = "Sensor Start";

// ── Public types ──────────────────────────────────────────────────────────────

/// A file left out of matching because it is below the family's size floor.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub size_mb: f64,
}

/// A file (or inventory row) that did not yield a start time.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub family: SensorFamily,
    pub path: PathBuf,
    pub reason: String,
}

/// Everything the locator learned about one family.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub family: SensorFamily,
    /// Files (or inventory rows) considered, including skipped and failed ones.
    pub discovered: usize,
    pub observations: Vec<SensorObservation>,
    pub skipped: Vec<SkippedFile>,
    pub failures: Vec<ParseFailure>,
}

impl ScanOutcome {
    fn new(family: SensorFamily, discovered: usize) -> Self {
        Self {
            family,
            discovered,
            observations: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }
}

// ── Fresh scan ────────────────────────────────────────────────────────────────

/// List the files of `family` under `root`, sorted by path.
///
/// In recursive mode directories named in `exclude` are pruned before descent.
/// Extension matching ignores case.
pub fn find_sensor_files(
    root: &Path,
    family: SensorFamily,
    recursive: bool,
    exclude: &HashSet<String>,
) -> Vec<PathBuf> {
    if !root.exists() {
        warn!("{} folder does not exist: {}", family, root.display());
        return Vec::new();
    }

    let mut walker = walkdir::WalkDir::new(root).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_entry(|entry| {
            !(recursive
                && entry.depth() > 0
                && entry.file_type().is_dir()
                && exclude.contains(&*entry.file_name().to_string_lossy()))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && matches_family(entry.path(), family))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    debug!("{} {} files found under {}", files.len(), family, root.display());
    files
}

fn matches_family(path: &Path, family: SensorFamily) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            family
                .extensions()
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Read the start time of every file in `files`.
///
/// Undersized files go to [`ScanOutcome::skipped`]; files that fail to parse
/// go to [`ScanOutcome::failures`]. `on_file` is called once per file.
pub fn scan_family<F>(family: SensorFamily, files: &[PathBuf], mut on_file: F) -> ScanOutcome
where
    F: FnMut(&Path),
{
    let parser = parser_for(family);
    let has_floor = min_file_size(family).is_some();
    let mut outcome = ScanOutcome::new(family, files.len());

    for path in files {
        on_file(path);

        if has_floor {
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            if is_undersized(family, size) {
                debug!("Skipping {} ({} bytes)", path.display(), size);
                outcome.skipped.push(SkippedFile {
                    path: path.clone(),
                    size_mb: size as f64 / (1024.0 * 1024.0),
                });
                continue;
            }
        }

        match parser.parse(path) {
            Ok(ts) => outcome
                .observations
                .push(SensorObservation::new(family, path.clone(), ts)),
            Err(e) => {
                warn!("{}", e);
                outcome.failures.push(ParseFailure {
                    family,
                    path: path.clone(),
                    reason: failure_reason(e),
                });
            }
        }
    }

    debug!(
        "{}: {} observations, {} skipped, {} failed",
        family,
        outcome.observations.len(),
        outcome.skipped.len(),
        outcome.failures.len()
    );
    outcome
}

fn failure_reason(err: SplError) -> String {
    match err {
        SplError::SensorParse { reason, .. } => reason,
        other => other.to_string(),
    }
}

// ── Cached replay ─────────────────────────────────────────────────────────────

/// Rebuild observations from an exported inventory without touching raw files.
///
/// The `FilePath` and `Sensor Start` columns are located by header name; their
/// absence is [`SplError::InventorySchema`]. Rows with an unreadable start are
/// reported as failures.
pub fn load_inventory(path: &Path, family: SensorFamily) -> Result<ScanOutcome> {
    let file = std::fs::File::open(path).map_err(|source| SplError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let path_idx = column(INVENTORY_PATH_COLUMN);
    let start_idx = column(INVENTORY_START_COLUMN);

    let (Some(path_idx), Some(start_idx)) = (path_idx, start_idx) else {
        let missing: Vec<&str> = [
            (INVENTORY_PATH_COLUMN, path_idx),
            (INVENTORY_START_COLUMN, start_idx),
        ]
        .into_iter()
        .filter(|(_, idx)| idx.is_none())
        .map(|(name, _)| name)
        .collect();
        return Err(SplError::InventorySchema {
            path: path.to_path_buf(),
            missing: missing.join(", "),
        });
    };

    let mut outcome = ScanOutcome::new(family, 0);
    for record in reader.records() {
        let record = record?;
        let file_path = record.get(path_idx).unwrap_or_default().trim();
        if file_path.is_empty() {
            continue;
        }
        outcome.discovered += 1;

        let start = record.get(start_idx).unwrap_or_default();
        match TimestampProcessor::parse_str(start) {
            Some(ts) => outcome
                .observations
                .push(SensorObservation::new(family, file_path, ts)),
            None => outcome.failures.push(ParseFailure {
                family,
                path: PathBuf::from(file_path),
                reason: SplError::TimestampParse(format!("{INVENTORY_START_COLUMN} \"{start}\"")).to_string(),
            }),
        }
    }

    debug!(
        "{}: {} observations replayed from {}",
        family,
        outcome.observations.len(),
        path.display()
    );
    Ok(outcome)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
