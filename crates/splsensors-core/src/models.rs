use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Sensor type category a recording belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorFamily {
    /// Multibeam echo sounder (`.all`).
    #[serde(rename = "MBES")]
    Mbes,
    /// Sidescan sonar (`.xtf`).
    #[serde(rename = "SSS")]
    Sss,
    /// Sub-bottom profiler (`.sgy`/`.seg`/`.segy`).
    #[serde(rename = "SBP")]
    Sbp,
    /// Magnetometer (`.csv`).
    #[serde(rename = "MAG")]
    Mag,
    /// Ultra-high-resolution seismic (`.sgy`/`.seg`/`.segy`).
    #[serde(rename = "SUHRS")]
    Suhrs,
}

impl SensorFamily {
    /// Every family, in processing order.
    pub const ALL: [SensorFamily; 5] = [
        SensorFamily::Mbes,
        SensorFamily::Sss,
        SensorFamily::Sbp,
        SensorFamily::Mag,
        SensorFamily::Suhrs,
    ];

    /// Short upper-case tag used in file names and report headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorFamily::Mbes => "MBES",
            SensorFamily::Sss => "SSS",
            SensorFamily::Sbp => "SBP",
            SensorFamily::Mag => "MAG",
            SensorFamily::Suhrs => "SUHRS",
        }
    }

    /// Lower-case file extensions (without dot) recognised for this family.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            SensorFamily::Mbes => &["all"],
            SensorFamily::Sss => &["xtf"],
            SensorFamily::Sbp | SensorFamily::Suhrs => &["sgy", "seg", "segy"],
            SensorFamily::Mag => &["csv"],
        }
    }

    /// Whether matched files of this family are relocated by the move step.
    pub fn is_movable(&self) -> bool {
        matches!(self, SensorFamily::Mag | SensorFamily::Suhrs)
    }
}

impl fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SensorFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorFamily::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown sensor family: {s}"))
    }
}

/// Position of a session in discovery order; observations refer to sessions
/// through this id only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub usize);

/// Line name of a navigation session, or why no usable name exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionLine {
    /// A real survey line name.
    Named(String),
    /// The conversion produced no samples at all.
    Empty,
    /// Fewer samples than the extractor's minimum. The first sample's name is
    /// kept when it was not blank.
    TooSmall { line_name: Option<String> },
    /// Samples exist but the line-name field is blank.
    NoLineName,
}

impl SessionLine {
    /// The real line name, if one was recovered.
    pub fn name(&self) -> Option<&str> {
        match self {
            SessionLine::Named(name) => Some(name),
            SessionLine::TooSmall { line_name } => line_name.as_deref(),
            SessionLine::Empty | SessionLine::NoLineName => None,
        }
    }

    /// `true` for every classification other than [`SessionLine::Named`].
    pub fn is_problem(&self) -> bool {
        !matches!(self, SessionLine::Named(_))
    }
}

impl fmt::Display for SessionLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionLine::Named(name) => f.write_str(name),
            SessionLine::Empty => f.write_str("EmptySPL"),
            SessionLine::TooSmall { .. } => f.write_str("SPLtoSmall"),
            SessionLine::NoLineName => f.write_str("NoLineNameFound"),
        }
    }
}

/// One navigation session, extracted from a single position file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Position file the session was extracted from.
    pub source: PathBuf,
    /// First sample time; `None` for empty sessions.
    pub start: Option<DateTime<Utc>>,
    /// Last sample time; `None` for empty sessions.
    pub end: Option<DateTime<Utc>>,
    pub line: SessionLine,
    /// Largest gap between consecutive samples, in seconds.
    pub max_gap: Option<f64>,
    /// Compact form of `start`, used as a human-readable key.
    pub session_name: Option<String>,
}

impl Session {
    /// Inclusive membership test against `[start - buffer, end]`.
    ///
    /// Sessions without both bounds never contain anything. A buffer reaching
    /// past the earliest representable instant leaves the lower edge open.
    pub fn contains(&self, ts: DateTime<Utc>, buffer: TimeDelta) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                let above_lower = start.checked_sub_signed(buffer).map_or(true, |lower| ts >= lower);
                above_lower && ts <= end
            }
            _ => false,
        }
    }

    pub fn is_problem(&self) -> bool {
        self.line.is_problem()
    }
}

/// Whether a matched observation's file name carries its session's line name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchLabel {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "WRONG")]
    Wrong,
}

impl MatchLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchLabel::Ok => "OK",
            MatchLabel::Wrong => "WRONG",
        }
    }
}

impl fmt::Display for MatchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sensor file's recording-start instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorObservation {
    pub family: SensorFamily,
    pub file_path: PathBuf,
    /// File stem of `file_path`.
    pub display_name: String,
    pub timestamp: DateTime<Utc>,
}

impl SensorObservation {
    pub fn new(family: SensorFamily, file_path: impl Into<PathBuf>, timestamp: DateTime<Utc>) -> Self {
        let file_path = file_path.into();
        let display_name = file_stem(&file_path);
        Self {
            family,
            file_path,
            display_name,
            timestamp,
        }
    }
}

/// Lossy file stem of `path`, empty when there is none.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
