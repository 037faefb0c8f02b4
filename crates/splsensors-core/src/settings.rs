use chrono::TimeDelta;
use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Result, SplError};
use crate::models::SensorFamily;

/// Default navigation conversion program.
pub const DEFAULT_CONVERTER: &str = "Fugro.DescribedData2Ascii.exe";

/// Largest accepted `--buffer`, in seconds (one year).
pub const MAX_BUFFER_SECONDS: f64 = 366.0 * 86_400.0;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Line name comparison and rename tool between SPL sessions and sensor files
#[derive(Parser, Debug, Clone)]
#[command(
    name = "splsensors",
    about = "Line name comparison and rename tool between SPL sessions and sensor files",
    version
)]
pub struct Settings {
    /// Root folder holding the *.fbf/*.fbz/*.pos session files
    #[arg(short = 'i', long)]
    pub spl_folder: Option<PathBuf>,

    /// SPL position file name, without extension (e.g. Vessel-CRP-Position)
    #[arg(short = 'p', long)]
    pub spl_position: Option<String>,

    /// Root folder of the *.all (MBES) files
    #[arg(short = 'A', long)]
    pub all_folder: Option<PathBuf>,

    /// Root folder of the *.xtf (SSS) files
    #[arg(short = 'X', long)]
    pub xtf_folder: Option<PathBuf>,

    /// Root folder of the *.sgy/*.seg/*.segy (SBP) files
    #[arg(short = 'S', long)]
    pub sgy_sbp_folder: Option<PathBuf>,

    /// Root folder of the *.csv (MAG) files
    #[arg(short = 'M', long)]
    pub csv_mag_folder: Option<PathBuf>,

    /// Root folder of the *.sgy/*.seg/*.segy (SUHRS) files
    #[arg(short = 'H', long)]
    pub sgy_suhrs_folder: Option<PathBuf>,

    /// Previously exported MBES Full_Log.csv to replay instead of scanning
    #[arg(long)]
    pub mbes_inventory: Option<PathBuf>,

    /// Previously exported SSS Full_Log.csv to replay instead of scanning
    #[arg(long)]
    pub sss_inventory: Option<PathBuf>,

    /// Previously exported SBP Full_Log.csv to replay instead of scanning
    #[arg(long)]
    pub sbp_inventory: Option<PathBuf>,

    /// Previously exported MAG Full_Log.csv to replay instead of scanning
    #[arg(long)]
    pub mag_inventory: Option<PathBuf>,

    /// Previously exported SUHRS Full_Log.csv to replay instead of scanning
    #[arg(long)]
    pub suhrs_inventory: Option<PathBuf>,

    /// Output folder for all the log files
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Recurse into the sensor subfolders
    #[arg(short = 'r', long, default_value = "yes", value_parser = ["yes", "no"])]
    pub recursive: String,

    /// Move MAG and SUHRS files into a vessel (or WRONG) folder
    #[arg(short = 'm', long = "move", default_value = "yes", value_parser = ["yes", "no"])]
    pub move_files: String,

    /// Rename the matched sensor files
    #[arg(short = 'n', long, default_value = "no", value_parser = ["yes", "no"])]
    pub rename: String,

    /// Layout of the consolidated report: one workbook, or one CSV per sheet
    #[arg(long, default_value = "xlsx", value_parser = ["xlsx", "csv"])]
    pub report_format: String,

    /// Folders excluded from the recursive search, comma separated with no whitespace (e.g. DNP,DoNotProcess)
    #[arg(short = 'e', long)]
    pub exclude_folder: Option<String>,

    /// Seconds subtracted from each session start when matching sensor files
    #[arg(long, default_value = "0")]
    pub buffer: f64,

    /// Navigation conversion program
    #[arg(long, default_value = DEFAULT_CONVERTER)]
    pub converter: PathBuf,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.splsensors/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spl_folder: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spl_position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converter: Option<PathBuf>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".splsensors").join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            spl_folder: s.spl_folder.clone(),
            spl_position: s.spl_position.clone(),
            output: s.output.clone(),
            exclude_folder: s.exclude_folder.clone(),
            buffer: Some(s.buffer),
            converter: Some(s.converter.clone()),
        }
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Same as [`Settings::load_with_last_used`] with explicit arguments and
    /// config path.
    pub fn load_with_last_used_impl(args: Vec<std::ffi::OsString>, config_path: &Path) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            return Self::apply_debug(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins. Sensor folders are never remembered: a stale folder
        // would silently pull last survey's files into this run.
        if !is_arg_explicitly_set(&matches, "spl_folder") && settings.spl_folder.is_none() {
            settings.spl_folder = last.spl_folder;
        }
        if !is_arg_explicitly_set(&matches, "spl_position") && settings.spl_position.is_none() {
            settings.spl_position = last.spl_position;
        }
        if !is_arg_explicitly_set(&matches, "output") && settings.output.is_none() {
            settings.output = last.output;
        }
        if !is_arg_explicitly_set(&matches, "exclude_folder") && settings.exclude_folder.is_none() {
            settings.exclude_folder = last.exclude_folder;
        }
        if !is_arg_explicitly_set(&matches, "buffer") {
            if let Some(v) = last.buffer {
                settings.buffer = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "converter") {
            if let Some(v) = last.converter {
                settings.converter = v;
            }
        }

        settings = Self::apply_debug(settings);

        let params = LastUsedParams::from(&settings);
        if let Err(e) = params.save_to(config_path) {
            tracing::debug!("could not persist last-used parameters: {}", e);
        }

        settings
    }

    /// `--debug` overrides the log level.
    fn apply_debug(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Validate the raw arguments and convert them into a [`RunConfig`].
    ///
    /// Only argument-level checks happen here; folder existence and the
    /// output-lock check belong to the runtime pre-flight.
    pub fn to_run_config(&self) -> Result<RunConfig> {
        let spl_position = self
            .spl_position
            .clone()
            .ok_or_else(|| SplError::Config("No SPL position file name was defined".to_string()))?;
        let vessel = vessel_from_position(&spl_position)?;

        let spl_folder = self
            .spl_folder
            .clone()
            .ok_or_else(|| SplError::Config("No SPL Folder was defined".to_string()))?;
        let output_folder = self
            .output
            .clone()
            .ok_or_else(|| SplError::Config("No Output Folder was defined".to_string()))?;

        let buffer = buffer_from_seconds(self.buffer)?;

        let candidates = [
            (SensorFamily::Mbes, &self.all_folder, &self.mbes_inventory),
            (SensorFamily::Sss, &self.xtf_folder, &self.sss_inventory),
            (SensorFamily::Sbp, &self.sgy_sbp_folder, &self.sbp_inventory),
            (SensorFamily::Mag, &self.csv_mag_folder, &self.mag_inventory),
            (SensorFamily::Suhrs, &self.sgy_suhrs_folder, &self.suhrs_inventory),
        ];
        let sensor_sources = candidates
            .into_iter()
            .filter_map(|(family, folder, inventory)| {
                let input = match (inventory, folder) {
                    (Some(path), _) => SensorInput::Inventory(path.clone()),
                    (None, Some(root)) => SensorInput::Scan(root.clone()),
                    (None, None) => return None,
                };
                Some(SensorSource {
                    family,
                    input,
                    folder: folder.clone(),
                })
            })
            .collect();

        Ok(RunConfig {
            spl_folder,
            spl_position,
            vessel,
            sensor_sources,
            output_folder,
            recursive: self.recursive == "yes",
            move_files: self.move_files == "yes",
            rename: self.rename == "yes",
            report_format: if self.report_format == "csv" {
                ReportFormat::Csv
            } else {
                ReportFormat::Xlsx
            },
            exclude: parse_exclude_list(self.exclude_folder.as_deref()),
            buffer,
            converter: self.converter.clone(),
        })
    }
}

/// Convert `--buffer` seconds into a [`TimeDelta`], rejecting negative,
/// non-finite and out-of-range values.
pub fn buffer_from_seconds(seconds: f64) -> Result<TimeDelta> {
    if !seconds.is_finite() || !(0.0..=MAX_BUFFER_SECONDS).contains(&seconds) {
        return Err(SplError::Config(format!(
            "buffer must be between 0 and {} seconds, got {}",
            MAX_BUFFER_SECONDS, seconds
        )));
    }
    TimeDelta::try_milliseconds((seconds * 1000.0).round() as i64)
        .ok_or_else(|| SplError::Config(format!("buffer of {} seconds is out of range", seconds)))
}

// ── RunConfig ──────────────────────────────────────────────────────────────────

/// Where a family's observations come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorInput {
    /// Parse every matching raw file under this root.
    Scan(PathBuf),
    /// Replay a previously exported per-family inventory.
    Inventory(PathBuf),
}

/// One sensor family requested for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSource {
    pub family: SensorFamily,
    pub input: SensorInput,
    /// Family root folder, when known; the move step targets subfolders of it.
    pub folder: Option<PathBuf>,
}

/// How the consolidated report is laid out on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// `_<vessel>_FINAL_Log.xlsx`, one worksheet per sheet.
    #[default]
    Xlsx,
    /// `_<vessel>_FINAL_Log/<sheet>.csv`.
    Csv,
}

/// Validated, typed configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub spl_folder: PathBuf,
    pub spl_position: String,
    pub vessel: String,
    pub sensor_sources: Vec<SensorSource>,
    pub output_folder: PathBuf,
    pub recursive: bool,
    pub move_files: bool,
    pub rename: bool,
    pub report_format: ReportFormat,
    pub exclude: HashSet<String>,
    pub buffer: TimeDelta,
    pub converter: PathBuf,
}

/// Vessel name encoded in a position name (`<vessel>-...-Position`).
pub fn vessel_from_position(spl_position: &str) -> Result<String> {
    if !spl_position.contains("-Position") {
        return Err(SplError::InvalidPositionName(spl_position.to_string()));
    }
    let vessel = spl_position.split('-').next().unwrap_or_default();
    if vessel.is_empty() {
        return Err(SplError::InvalidPositionName(spl_position.to_string()));
    }
    Ok(vessel.to_string())
}

/// Split a comma-separated folder list into a set, dropping empty entries.
pub fn parse_exclude_list(raw: Option<&str>) -> HashSet<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
