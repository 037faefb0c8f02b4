//! Interval assignment of sensor observations to navigation sessions.
//!
//! Every session is tested against every observation of a family; membership
//! is `start - buffer <= ts <= end`. An observation may land in several
//! sessions, which surfaces as identical timestamps in the flat table and is
//! resolved by [`resolve_duplicates`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use splsensors_core::models::{
    file_stem, MatchLabel, SensorFamily, SensorObservation, Session, SessionId, SessionLine,
};
use tracing::debug;

use crate::anomalies::duplicate_timestamps;

// ── Public types ──────────────────────────────────────────────────────────────

/// How a matched observation relates to its session.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub session: SessionId,
    pub label: MatchLabel,
    /// Rename target; `None` when the session carries no real line name.
    pub proposed_path: Option<PathBuf>,
}

/// One row of the flat per-family table.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatEntry {
    pub observation: SensorObservation,
    /// `None` when no session covers the observation ("Missing SPL").
    pub assignment: Option<Assignment>,
}

impl FlatEntry {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.observation.timestamp
    }

    pub fn is_matched(&self) -> bool {
        self.assignment.is_some()
    }
}

/// Result of matching one family against all sessions.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub family: SensorFamily,
    /// Authoritative flat table: one row per distinct timestamp, matched rows
    /// first in session order, then unmatched observations.
    pub entries: Vec<FlatEntry>,
    /// Every row involved in a timestamp collision, survivor included,
    /// sorted by timestamp.
    pub duplicates: Vec<FlatEntry>,
}

impl MatchOutcome {
    pub fn matched(&self) -> impl Iterator<Item = &FlatEntry> {
        self.entries.iter().filter(|e| e.is_matched())
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &FlatEntry> {
        self.entries.iter().filter(|e| !e.is_matched())
    }

    /// Rows dropped by duplicate resolution.
    pub fn removed_duplicates(&self) -> usize {
        let groups: HashSet<DateTime<Utc>> = self.duplicates.iter().map(|e| e.timestamp()).collect();
        self.duplicates.len() - groups.len()
    }
}

// ── Labels and renames ────────────────────────────────────────────────────────

/// `OK` when the session's real line name is a case-sensitive substring of
/// `stem`; `WRONG` otherwise, including for sessions without a real name.
pub fn label_for(line: &SessionLine, stem: &str) -> MatchLabel {
    match line.name() {
        Some(name) if stem.contains(name) => MatchLabel::Ok,
        _ => MatchLabel::Wrong,
    }
}

/// `<dir>/<stem>_<line><.ext>` for a session with a real line name.
pub fn proposed_path(path: &Path, line: &SessionLine) -> Option<PathBuf> {
    let name = line.name()?;
    let mut file_name = format!("{}_{}", file_stem(path), name);
    if let Some(ext) = path.extension() {
        file_name.push('.');
        file_name.push_str(&ext.to_string_lossy());
    }
    Some(match path.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    })
}

// ── Matching ──────────────────────────────────────────────────────────────────

/// Assign observations to sessions, without duplicate resolution.
///
/// Sessions are visited in discovery order and each qualifying session yields
/// its own row; observations no session covers follow as unmatched rows.
pub fn match_sessions(
    sessions: &[Session],
    observations: &[SensorObservation],
    buffer: TimeDelta,
) -> Vec<FlatEntry> {
    let mut entries = Vec::new();
    let mut covered = vec![false; observations.len()];

    for session in sessions {
        for (idx, obs) in observations.iter().enumerate() {
            if !session.contains(obs.timestamp, buffer) {
                continue;
            }
            covered[idx] = true;
            entries.push(FlatEntry {
                observation: obs.clone(),
                assignment: Some(Assignment {
                    session: session.id,
                    label: label_for(&session.line, &obs.display_name),
                    proposed_path: proposed_path(&obs.file_path, &session.line),
                }),
            });
        }
    }

    entries.extend(
        observations
            .iter()
            .zip(covered)
            .filter(|(_, covered)| !covered)
            .map(|(obs, _)| FlatEntry {
                observation: obs.clone(),
                assignment: None,
            }),
    );
    entries
}

/// Keep the first row of every timestamp.
///
/// Returns `(survivors, duplicates)` where `duplicates` holds every member of
/// each colliding group, sorted by timestamp. Running it on its own survivors
/// yields the same survivors and no duplicates.
pub fn resolve_duplicates(entries: Vec<FlatEntry>) -> (Vec<FlatEntry>, Vec<FlatEntry>) {
    let colliding = duplicate_timestamps(entries.iter().map(FlatEntry::timestamp));
    if colliding.is_empty() {
        return (entries, Vec::new());
    }

    let mut duplicates: Vec<FlatEntry> = entries
        .iter()
        .filter(|e| colliding.contains(&e.timestamp()))
        .cloned()
        .collect();
    duplicates.sort_by_key(FlatEntry::timestamp);

    let mut seen = HashSet::new();
    let survivors = entries
        .into_iter()
        .filter(|e| seen.insert(e.timestamp()))
        .collect();

    (survivors, duplicates)
}

/// Match one family and resolve duplicate timestamps.
pub fn match_family(
    family: SensorFamily,
    sessions: &[Session],
    observations: &[SensorObservation],
    buffer: TimeDelta,
) -> MatchOutcome {
    let (entries, duplicates) = resolve_duplicates(match_sessions(sessions, observations, buffer));
    let outcome = MatchOutcome {
        family,
        entries,
        duplicates,
    };
    debug!(
        "{}: {} matched, {} missing SPL, {} duplicate rows removed",
        family,
        outcome.matched().count(),
        outcome.unmatched().count(),
        outcome.removed_duplicates()
    );
    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────
