//! Session extraction from navigation position files.
//!
//! A position file (`.fbf`, `.fbz`, `.pos`) is converted to a text artifact of
//! `(timestamp, line name)` samples by an external program, and the samples are
//! folded into a single [`Session`].

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use splsensors_core::error::{Result, SplError};
use splsensors_core::models::{file_stem, Session, SessionId, SessionLine};
use splsensors_core::time_utils::{seconds_between, session_name, TimestampProcessor};
use tracing::{debug, warn};

/// Sessions with fewer samples than this are classified as too small.
pub const MIN_SAMPLES: usize = 5;

/// Position file extensions, in discovery order.
pub const SESSION_EXTENSIONS: [&str; 3] = ["fbf", "fbz", "pos"];

// ── NavSample ─────────────────────────────────────────────────────────────────

/// One `(timestamp, line name)` row of a converted position file.
#[derive(Debug, Clone, PartialEq)]
pub struct NavSample {
    pub timestamp: DateTime<Utc>,
    /// Line name with surrounding quotes and whitespace removed; may be empty.
    pub line_name: String,
}

// ── Conversion capability ─────────────────────────────────────────────────────

/// Turns a position file into a text artifact of navigation samples.
pub trait NavigationConverter {
    /// Write the samples of `source` to `artifact`, one per line.
    fn convert(&self, source: &Path, artifact: &Path) -> Result<()>;
}

/// Runs an external conversion program as
/// `<program> -n3 <source> Time LineName` with stdout redirected to the artifact.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: PathBuf,
}

impl CommandConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl NavigationConverter for CommandConverter {
    fn convert(&self, source: &Path, artifact: &Path) -> Result<()> {
        let failed = |reason: String| SplError::ConversionFailed {
            path: source.to_path_buf(),
            reason,
        };

        let stdout = File::create(artifact)
            .map_err(|e| failed(format!("cannot create {}: {}", artifact.display(), e)))?;

        let status = Command::new(&self.program)
            .arg("-n3")
            .arg(source)
            .arg("Time")
            .arg("LineName")
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::null())
            .status()
            .map_err(|e| failed(format!("cannot run {}: {}", self.program.display(), e)))?;

        if !status.success() {
            return Err(failed(format!("{} exited with {}", self.program.display(), status)));
        }
        Ok(())
    }
}

/// Removes the conversion artifact when dropped, whatever the outcome.
struct ArtifactGuard {
    path: PathBuf,
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Could not remove {}: {}", self.path.display(), e);
            }
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

fn sample_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^([^,]+),\s*"?(.*?)"?\s*$"#).expect("regex is valid"))
}

/// Parse the converted artifact text. Blank lines and rows whose timestamp
/// cannot be read are skipped.
pub fn parse_samples(text: &str) -> Vec<NavSample> {
    let re = sample_regex();
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let Some(caps) = re.captures(line.trim_end()) else {
                debug!("navigation row without separator: {:?}", line);
                return None;
            };
            let Some(timestamp) = TimestampProcessor::parse_navigation(&caps[1]) else {
                debug!("navigation row with unreadable time: {:?}", line);
                return None;
            };
            Some(NavSample {
                timestamp,
                line_name: caps[2].trim().to_string(),
            })
        })
        .collect()
}

/// Fold an ordered sample trace into a [`Session`].
pub fn summarize_samples(id: SessionId, source: &Path, samples: &[NavSample]) -> Session {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Session {
            id,
            source: source.to_path_buf(),
            start: None,
            end: None,
            line: SessionLine::Empty,
            max_gap: None,
            session_name: None,
        };
    };

    let max_gap = samples
        .windows(2)
        .map(|pair| seconds_between(pair[1].timestamp, pair[0].timestamp))
        .reduce(f64::max);

    let name = first.line_name.trim();
    let line = if samples.len() < MIN_SAMPLES {
        SessionLine::TooSmall {
            line_name: (!name.is_empty()).then(|| name.to_string()),
        }
    } else if name.is_empty() {
        SessionLine::NoLineName
    } else {
        SessionLine::Named(name.to_string())
    };

    Session {
        id,
        source: source.to_path_buf(),
        start: Some(first.timestamp),
        end: Some(last.timestamp),
        line,
        max_gap,
        session_name: Some(session_name(first.timestamp)),
    }
}

/// Convert one position file and build its [`Session`].
///
/// The artifact `<work_dir>/<stem>.txt` is deleted on every path. A failing
/// conversion is returned as [`SplError::ConversionFailed`].
pub fn extract_session(
    id: SessionId,
    source: &Path,
    converter: &dyn NavigationConverter,
    work_dir: &Path,
) -> Result<Session> {
    let artifact = work_dir.join(format!("{}.txt", file_stem(source)));
    let _guard = ArtifactGuard {
        path: artifact.clone(),
    };

    converter.convert(source, &artifact)?;

    let bytes = std::fs::read(&artifact).map_err(|e| SplError::ConversionFailed {
        path: source.to_path_buf(),
        reason: format!("no output produced ({})", e),
    })?;
    let samples = parse_samples(&String::from_utf8_lossy(&bytes));

    let session = summarize_samples(id, source, &samples);
    debug!(
        source = %source.display(),
        samples = samples.len(),
        line = %session.line,
        "session extracted"
    );
    Ok(session)
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Find every `<position>.fbf`, `.fbz` and `.pos` file under `spl_folder`.
///
/// Files are grouped by kind in that order and sorted by path within a kind.
pub fn discover_session_files(spl_folder: &Path, position: &str) -> Vec<PathBuf> {
    if !spl_folder.exists() {
        warn!("SPL folder does not exist: {}", spl_folder.display());
        return Vec::new();
    }

    let all: Vec<PathBuf> = walkdir::WalkDir::new(spl_folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.file_stem().map(|s| s == position).unwrap_or(false))
        .collect();

    let mut ordered = Vec::with_capacity(all.len());
    for ext in SESSION_EXTENSIONS {
        let mut kind: Vec<PathBuf> = all
            .iter()
            .filter(|path| has_extension(path, ext))
            .cloned()
            .collect();
        kind.sort();
        debug!("{} *.{} session files found", kind.len(), ext);
        ordered.extend(kind);
    }
    ordered
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
