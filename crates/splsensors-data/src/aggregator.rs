//! Flat and session-wide views over match results.
//!
//! The flat view keeps one row per observation annotated with its session.
//! The session-wide view folds matched observations into one row per session
//! with one multi-line cell per sensor family.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use splsensors_core::formatting::{format_seconds, format_timestamp};
use splsensors_core::models::{MatchLabel, SensorFamily, Session, SessionId, SessionLine};
use splsensors_core::time_utils::seconds_between;

use crate::matcher::{FlatEntry, MatchOutcome};

/// Column headers of the per-family `Full_Log.csv`.
pub const FULL_LOG_COLUMNS: [&str; 12] = [
    "Session Start",
    "Session End",
    "Session Name",
    "Max Gap [s]",
    "Vessel Name",
    "Sensor Start",
    "Start Difference [s]",
    "FilePath",
    "Sensor FileName",
    "Match",
    "SPL LineName",
    "Sensor New LineName",
];

// ── Flat view ─────────────────────────────────────────────────────────────────

/// One observation with its session context.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow {
    pub family: SensorFamily,
    pub session: Option<SessionId>,
    pub session_start: Option<DateTime<Utc>>,
    pub session_end: Option<DateTime<Utc>>,
    pub session_name: Option<String>,
    pub max_gap: Option<f64>,
    pub vessel: Option<String>,
    pub sensor_start: DateTime<Utc>,
    /// `sensor_start - session_start` in seconds; negative when the sensor
    /// started before its session.
    pub start_difference: Option<f64>,
    pub file_path: PathBuf,
    pub file_name: String,
    pub label: Option<MatchLabel>,
    pub line: Option<SessionLine>,
    pub new_path: Option<PathBuf>,
}

impl FlatRow {
    /// Cells in [`FULL_LOG_COLUMNS`] order.
    pub fn to_record(&self) -> Vec<String> {
        vec![
            format_timestamp(self.session_start),
            format_timestamp(self.session_end),
            self.session_name.clone().unwrap_or_default(),
            format_seconds(self.max_gap),
            self.vessel.clone().unwrap_or_default(),
            format_timestamp(Some(self.sensor_start)),
            format_seconds(self.start_difference),
            self.file_path.display().to_string(),
            self.file_name.clone(),
            self.label.map(|l| l.to_string()).unwrap_or_default(),
            self.line.as_ref().map(|l| l.to_string()).unwrap_or_default(),
            self.new_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ]
    }
}

fn session_index(sessions: &[Session]) -> HashMap<SessionId, &Session> {
    sessions.iter().map(|s| (s.id, s)).collect()
}

/// Annotate entries with their session's interval, name and gap.
pub fn flat_rows(
    family: SensorFamily,
    entries: &[FlatEntry],
    sessions: &[Session],
    vessel: &str,
) -> Vec<FlatRow> {
    let index = session_index(sessions);
    entries
        .iter()
        .map(|entry| {
            let obs = &entry.observation;
            let assignment = entry.assignment.as_ref();
            let session = assignment.and_then(|a| index.get(&a.session).copied());
            let session_start = session.and_then(|s| s.start);

            FlatRow {
                family,
                session: assignment.map(|a| a.session),
                session_start,
                session_end: session.and_then(|s| s.end),
                session_name: session.and_then(|s| s.session_name.clone()),
                max_gap: session.and_then(|s| s.max_gap),
                vessel: session.map(|_| vessel.to_string()),
                sensor_start: obs.timestamp,
                start_difference: session_start.map(|start| seconds_between(obs.timestamp, start)),
                file_path: obs.file_path.clone(),
                file_name: obs.display_name.clone(),
                label: assignment.map(|a| a.label),
                line: session.map(|s| s.line.clone()),
                new_path: assignment.and_then(|a| a.proposed_path.clone()),
            }
        })
        .collect()
}

// ── Session-wide view ─────────────────────────────────────────────────────────

/// One session with the observations of every family folded into cells.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionWideRow {
    pub session: SessionId,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub vessel: String,
    pub line: SessionLine,
    /// `<stem> [OK]` / `<stem> [WRONG]` entries per family.
    pub cells: BTreeMap<SensorFamily, Vec<String>>,
}

impl SessionWideRow {
    /// Newline-joined cell for `family`; `None` when empty.
    pub fn cell(&self, family: SensorFamily) -> Option<String> {
        self.cells
            .get(&family)
            .filter(|entries| !entries.is_empty())
            .map(|entries| entries.join("\n"))
    }

    pub fn has_wrong(&self, family: SensorFamily) -> bool {
        self.cells
            .get(&family)
            .map(|entries| entries.iter().any(|e| e.ends_with("[WRONG]")))
            .unwrap_or(false)
    }

    /// Number of observations folded into this row, across families.
    pub fn observation_count(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }
}

/// A session whose start equals an earlier session's start; its observations
/// are folded into the earlier session's row.
#[derive(Debug, Clone, PartialEq)]
pub struct StartCollision {
    pub session: SessionId,
    pub owner: SessionId,
    pub start: DateTime<Utc>,
}

/// Session-wide rows sorted by start, plus start collisions.
#[derive(Debug, Clone, Default)]
pub struct SessionWideView {
    pub rows: Vec<SessionWideRow>,
    pub collisions: Vec<StartCollision>,
}

impl SessionWideView {
    /// Rows whose `family` cell holds a `[WRONG]` entry, then rows where the
    /// cell is empty; both groups in start order.
    pub fn not_matching(&self, family: SensorFamily) -> Vec<&SessionWideRow> {
        let wrong = self.rows.iter().filter(|r| r.has_wrong(family));
        let empty = self.rows.iter().filter(|r| r.cell(family).is_none());
        wrong.chain(empty).collect()
    }

    /// Rows whose real line name is shared with another session, sorted by name.
    pub fn duplicated_line_names(&self) -> Vec<&SessionWideRow> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for row in &self.rows {
            if let SessionLine::Named(name) = &row.line {
                *counts.entry(name.as_str()).or_default() += 1;
            }
        }
        let mut rows: Vec<&SessionWideRow> = self
            .rows
            .iter()
            .filter(|r| match &r.line {
                SessionLine::Named(name) => counts.get(name.as_str()).copied().unwrap_or(0) > 1,
                _ => false,
            })
            .collect();
        rows.sort_by(|a, b| a.line.to_string().cmp(&b.line.to_string()));
        rows
    }

    /// Rows of sessions classified as empty, too small or nameless.
    pub fn problem_rows(&self) -> Vec<&SessionWideRow> {
        self.rows.iter().filter(|r| r.line.is_problem()).collect()
    }
}

/// Build the session-wide view from every family's match outcome.
///
/// Rows are keyed by session start; a session repeating an earlier start is
/// recorded as a [`StartCollision`] and shares the earlier row. Sessions
/// without a start get a row of their own and sort last.
pub fn build_session_wide(sessions: &[Session], vessel: &str, outcomes: &[MatchOutcome]) -> SessionWideView {
    let mut rows: Vec<SessionWideRow> = Vec::with_capacity(sessions.len());
    let mut by_start: BTreeMap<DateTime<Utc>, usize> = BTreeMap::new();
    let mut row_of: HashMap<SessionId, usize> = HashMap::new();
    let mut collisions = Vec::new();

    for session in sessions {
        if let Some(start) = session.start {
            if let Some(&idx) = by_start.get(&start) {
                row_of.insert(session.id, idx);
                collisions.push(StartCollision {
                    session: session.id,
                    owner: rows[idx].session,
                    start,
                });
                continue;
            }
            by_start.insert(start, rows.len());
        }
        row_of.insert(session.id, rows.len());
        rows.push(SessionWideRow {
            session: session.id,
            start: session.start,
            end: session.end,
            vessel: vessel.to_string(),
            line: session.line.clone(),
            cells: BTreeMap::new(),
        });
    }

    for outcome in outcomes {
        for entry in outcome.matched() {
            let Some(assignment) = &entry.assignment else {
                continue;
            };
            if let Some(&idx) = row_of.get(&assignment.session) {
                rows[idx]
                    .cells
                    .entry(outcome.family)
                    .or_default()
                    .push(format!("{} [{}]", entry.observation.display_name, assignment.label));
            }
        }
    }

    rows.sort_by_key(|r| (r.start.is_none(), r.start));
    SessionWideView { rows, collisions }
}

/// Distinct session ids that appear in `rows`.
pub fn sessions_in(rows: &[FlatRow]) -> HashSet<SessionId> {
    rows.iter().filter_map(|r| r.session).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::match_family;
    use chrono::{TimeDelta, TimeZone};
    use splsensors_core::models::SensorObservation;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 10, 17, h, m, s).unwrap()
    }

    fn session(id: usize, start: Option<DateTime<Utc>>, minutes: i64, line: SessionLine) -> Session {
        Session {
            id: SessionId(id),
            source: PathBuf::from(format!("/nav/{id}/V-Position.fbf")),
            start,
            end: start.map(|s| s + TimeDelta::minutes(minutes)),
            line,
            max_gap: Some(0.5),
            session_name: start.map(splsensors_core::time_utils::session_name),
        }
    }

    fn named(name: &str) -> SessionLine {
        SessionLine::Named(name.to_string())
    }

    fn obs(family: SensorFamily, name: &str, at: DateTime<Utc>) -> SensorObservation {
        SensorObservation::new(family, format!("/data/{name}.dat"), at)
    }

    fn sessions() -> Vec<Session> {
        vec![
            session(0, Some(ts(11, 0, 0)), 30, named("M200")),
            session(1, Some(ts(10, 0, 0)), 30, named("M100")),
            session(2, None, 0, SessionLine::Empty),
        ]
    }

    // ── flat_rows ─────────────────────────────────────────────────────────────

    #[test]
    fn test_flat_row_start_difference_and_context() {
        let sessions = sessions();
        let outcome = match_family(
            SensorFamily::Mbes,
            &sessions,
            &[obs(SensorFamily::Mbes, "M100_a", ts(10, 0, 10)), obs(SensorFamily::Mbes, "lost", ts(7, 0, 0))],
            TimeDelta::zero(),
        );
        let rows = flat_rows(SensorFamily::Mbes, &outcome.entries, &sessions, "Vessel");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].session, Some(SessionId(1)));
        assert_eq!(rows[0].start_difference, Some(10.0));
        assert_eq!(rows[0].vessel.as_deref(), Some("Vessel"));
        assert_eq!(rows[0].label, Some(MatchLabel::Ok));
        assert_eq!(rows[1].session, None);
        assert_eq!(rows[1].vessel, None);
        assert_eq!(sessions_in(&rows).len(), 1);
    }

    #[test]
    fn test_flat_row_record_layout() {
        let sessions = sessions();
        let outcome = match_family(
            SensorFamily::Mbes,
            &sessions,
            &[obs(SensorFamily::Mbes, "M100_a", ts(10, 0, 10))],
            TimeDelta::zero(),
        );
        let record = flat_rows(SensorFamily::Mbes, &outcome.entries, &sessions, "Vessel")[0].to_record();

        assert_eq!(record.len(), FULL_LOG_COLUMNS.len());
        assert_eq!(record[0], "17 Oct 2020 10:00:00.000");
        assert_eq!(record[2], "20201017-100000.000");
        assert_eq!(record[3], "0.500");
        assert_eq!(record[6], "10.000");
        assert_eq!(record[8], "M100_a");
        assert_eq!(record[9], "OK");
        assert_eq!(record[10], "M100");
        assert_eq!(record[11], "/data/M100_a_M100.dat");
    }

    // ── build_session_wide ────────────────────────────────────────────────────

    #[test]
    fn test_session_wide_sorted_and_joined() {
        let sessions = sessions();
        let mbes = match_family(
            SensorFamily::Mbes,
            &sessions,
            &[
                obs(SensorFamily::Mbes, "M100_a", ts(10, 5, 0)),
                obs(SensorFamily::Mbes, "M100_b", ts(10, 6, 0)),
                obs(SensorFamily::Mbes, "X", ts(11, 5, 0)),
            ],
            TimeDelta::zero(),
        );
        let view = build_session_wide(&sessions, "Vessel", &[mbes]);

        let order: Vec<_> = view.rows.iter().map(|r| r.session).collect();
        assert_eq!(order, vec![SessionId(1), SessionId(0), SessionId(2)]);
        assert_eq!(
            view.rows[0].cell(SensorFamily::Mbes).as_deref(),
            Some("M100_a [OK]\nM100_b [OK]")
        );
        assert_eq!(view.rows[1].cell(SensorFamily::Mbes).as_deref(), Some("X [WRONG]"));
        assert_eq!(view.rows[2].cell(SensorFamily::Mbes), None);
    }

    #[test]
    fn test_session_wide_never_loses_matched_observations() {
        let sessions = vec![
            session(0, Some(ts(10, 0, 0)), 30, named("A")),
            session(1, Some(ts(10, 0, 0)), 40, named("B")),
            session(2, Some(ts(12, 0, 0)), 30, named("C")),
        ];
        let observations: Vec<_> = (0..20)
            .map(|i| obs(SensorFamily::Sbp, &format!("f{i}"), ts(9, 55, 0) + TimeDelta::minutes(7 * i)))
            .collect();
        let outcome = match_family(SensorFamily::Sbp, &sessions, &observations, TimeDelta::zero());
        let matched = outcome.matched().count();
        let view = build_session_wide(&sessions, "V", &[outcome]);

        let folded: usize = view.rows.iter().map(SessionWideRow::observation_count).sum();
        assert_eq!(folded, matched);
        assert_eq!(view.collisions.len(), 1);
        assert_eq!(view.collisions[0].session, SessionId(1));
        assert_eq!(view.collisions[0].owner, SessionId(0));
    }

    #[test]
    fn test_not_matching_wrong_then_empty() {
        let sessions = sessions();
        let mag = match_family(
            SensorFamily::Mag,
            &sessions,
            &[obs(SensorFamily::Mag, "other", ts(11, 5, 0))],
            TimeDelta::zero(),
        );
        let view = build_session_wide(&sessions, "V", &[mag]);
        let rows: Vec<_> = view
            .not_matching(SensorFamily::Mag)
            .iter()
            .map(|r| r.session)
            .collect();
        assert_eq!(rows, vec![SessionId(0), SessionId(1), SessionId(2)]);
    }

    #[test]
    fn test_duplicated_line_names_and_problems() {
        let sessions = vec![
            session(0, Some(ts(10, 0, 0)), 10, named("M1")),
            session(1, Some(ts(11, 0, 0)), 10, named("M1")),
            session(2, Some(ts(12, 0, 0)), 10, named("M2")),
            session(3, None, 0, SessionLine::Empty),
            session(4, Some(ts(13, 0, 0)), 0, SessionLine::NoLineName),
        ];
        let view = build_session_wide(&sessions, "V", &[]);

        let dups: Vec<_> = view.duplicated_line_names().iter().map(|r| r.session).collect();
        assert_eq!(dups, vec![SessionId(0), SessionId(1)]);
        let problems: Vec<_> = view.problem_rows().iter().map(|r| r.session).collect();
        assert_eq!(problems, vec![SessionId(4), SessionId(3)]);
    }
}
