//! Per-family analysis pipeline.
//!
//! Takes a family's discovered observations through matching, duplicate
//! resolution, the timestamp anomaly pass and the flat view, returning a
//! [`FamilyAnalysis`] ready for the report layer.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::TimeDelta;
use splsensors_core::error::Result;
use splsensors_core::models::{SensorFamily, SensorObservation, Session, SessionId};
use tracing::{debug, info};

use crate::aggregator::{flat_rows, FlatRow};
use crate::anomalies::{checks_timestamps, wrong_timestamps};
use crate::locator::{ParseFailure, ScanOutcome, SkippedFile};
use crate::matcher::{match_family, MatchOutcome};
use crate::navigation::{extract_session, NavigationConverter};

// ── Public types ──────────────────────────────────────────────────────────────

/// Per-family line of the process summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub family: SensorFamily,
    pub processed: usize,
    pub duplicated: usize,
    /// Only families with a timestamp plausibility check carry a count.
    pub wrong_timestamp: Option<usize>,
    pub renamed: usize,
    /// Only relocatable families carry a count.
    pub moved: Option<usize>,
    pub duration: Duration,
}

/// Everything derived for one sensor family.
#[derive(Debug, Clone)]
pub struct FamilyAnalysis {
    pub family: SensorFamily,
    /// Files or inventory rows considered.
    pub discovered: usize,
    pub skipped: Vec<SkippedFile>,
    pub failures: Vec<ParseFailure>,
    pub matches: MatchOutcome,
    pub flat: Vec<FlatRow>,
    pub wrong_timestamps: Vec<SensorObservation>,
}

impl FamilyAnalysis {
    pub fn summary(&self, renamed: usize, moved: Option<usize>, duration: Duration) -> SummaryRow {
        SummaryRow {
            family: self.family,
            processed: self.discovered,
            duplicated: self.matches.removed_duplicates(),
            wrong_timestamp: checks_timestamps(self.family).then_some(self.wrong_timestamps.len()),
            renamed,
            moved,
            duration,
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Convert every position file into a [`Session`], in discovery order.
///
/// The first conversion failure aborts the whole extraction.
pub fn extract_sessions<F>(
    files: &[PathBuf],
    converter: &dyn NavigationConverter,
    work_dir: &Path,
    mut on_file: F,
) -> Result<Vec<Session>>
where
    F: FnMut(&Path),
{
    let started = Instant::now();
    let mut sessions = Vec::with_capacity(files.len());
    for (idx, file) in files.iter().enumerate() {
        on_file(file);
        sessions.push(extract_session(SessionId(idx), file, converter, work_dir)?);
    }

    let problems = sessions.iter().filter(|s| s.is_problem()).count();
    info!(
        sessions = sessions.len(),
        problems,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "SPL sessions extracted"
    );
    Ok(sessions)
}

/// Run matching, duplicate resolution and anomaly checks for one family.
pub fn analyze_family(
    scan: ScanOutcome,
    sessions: &[Session],
    vessel: &str,
    buffer: TimeDelta,
) -> FamilyAnalysis {
    let family = scan.family;

    // ── Step 1: Anomalies ─────────────────────────────────────────────────────
    let wrong = if checks_timestamps(family) {
        wrong_timestamps(&scan.observations)
    } else {
        Vec::new()
    };
    if !wrong.is_empty() {
        info!("{} {} file(s) have a wrong start time", wrong.len(), family);
    }

    // ── Step 2: Match and resolve duplicates ──────────────────────────────────
    let matches = match_family(family, sessions, &scan.observations, buffer);
    let removed = matches.removed_duplicates();
    if removed > 0 {
        info!("{} {} file(s) were duplicated", removed, family);
    }

    // ── Step 3: Flat view ─────────────────────────────────────────────────────
    let flat = flat_rows(family, &matches.entries, sessions, vessel);

    debug!(
        "{}: {} discovered, {} flat rows, {} skipped, {} failures",
        family,
        scan.discovered,
        flat.len(),
        scan.skipped.len(),
        scan.failures.len()
    );

    FamilyAnalysis {
        family,
        discovered: scan.discovered,
        skipped: scan.skipped,
        failures: scan.failures,
        matches,
        flat,
        wrong_timestamps: wrong,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
