use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by splsensors.
#[derive(Error, Debug)]
pub enum SplError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be created or written to disk.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A CSV document could not be read or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A timestamp string did not match any recognised format.
    #[error("Invalid timestamp format: {0}")]
    TimestampParse(String),

    /// The SPL position name does not follow the `<vessel>-...-Position` convention.
    #[error("The SPL file {0} is not a position file")]
    InvalidPositionName(String),

    /// A required input or output folder does not exist.
    #[error("{what} folder not found: {path}")]
    FolderNotFound { what: String, path: PathBuf },

    /// A file in the output folder is held open by another program.
    #[error("The following file is locked ({0}). Please close the files in the output folder")]
    OutputLocked(PathBuf),

    /// No navigation session files were discovered.
    #[error("No SPL files were found in {0}")]
    NoSessionFiles(PathBuf),

    /// The external navigation conversion step failed for a session file.
    #[error("Conversion of {path} failed: {reason}")]
    ConversionFailed { path: PathBuf, reason: String },

    /// A cached inventory lives in the folder the current run writes to.
    #[error("Inventory {0} is inside the output folder; move it elsewhere before replaying it")]
    InventoryColocated(PathBuf),

    /// A cached inventory does not carry the required columns.
    #[error("Inventory {path} is missing required column(s): {missing}")]
    InventorySchema { path: PathBuf, missing: String },

    /// A single sensor file could not yield a start timestamp.
    #[error("Could not read start time from {path}: {reason}")]
    SensorParse { path: PathBuf, reason: String },

    /// A rename or move would overwrite an existing file.
    #[error("Cannot move {from} to {to}: target already exists")]
    RenameConflict { from: PathBuf, to: PathBuf },

    /// The consolidated report workbook could not be assembled or saved.
    #[error("Failed to write report {path}: {reason}")]
    Report { path: PathBuf, reason: String },

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SplError {
    /// Shorthand for a [`SplError::SensorParse`] with a formatted reason.
    pub fn sensor_parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SplError::SensorParse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the splsensors crates.
pub type Result<T> = std::result::Result<T, SplError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = SplError::FileRead {
            path: PathBuf::from("/data/line.all"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/data/line.all"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_file_write() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = SplError::FileWrite {
            path: PathBuf::from("/out/V_MBES_Full_Log.csv"),
            source: io_err,
        };
        assert_eq!(
            err.to_string(),
            "Failed to write file /out/V_MBES_Full_Log.csv: read-only"
        );
    }

    #[test]
    fn test_error_display_timestamp_parse() {
        let err = SplError::TimestampParse("Sensor Start \"yesterday\"".to_string());
        assert_eq!(err.to_string(), "Invalid timestamp format: Sensor Start \"yesterday\"");
    }

    #[test]
    fn test_error_display_invalid_position_name() {
        let err = SplError::InvalidPositionName("Vessel-CRP".to_string());
        assert_eq!(err.to_string(), "The SPL file Vessel-CRP is not a position file");
    }

    #[test]
    fn test_error_display_folder_not_found() {
        let err = SplError::FolderNotFound {
            what: "SPL".to_string(),
            path: PathBuf::from("/missing/dir"),
        };
        assert_eq!(err.to_string(), "SPL folder not found: /missing/dir");
    }

    #[test]
    fn test_error_display_conversion_failed_names_file() {
        let err = SplError::ConversionFailed {
            path: PathBuf::from("/nav/0001/Vessel-CRP-Position.fbf"),
            reason: "exit status 1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Vessel-CRP-Position.fbf"));
        assert!(msg.contains("exit status 1"));
    }

    #[test]
    fn test_error_display_inventory_schema() {
        let err = SplError::InventorySchema {
            path: PathBuf::from("/cache/V_MBES_Full_Log.csv"),
            missing: "Sensor Start".to_string(),
        };
        assert!(err.to_string().contains("missing required column(s): Sensor Start"));
    }

    #[test]
    fn test_sensor_parse_helper() {
        let err = SplError::sensor_parse("/x/a.xtf", "no ping packet");
        match err {
            SplError::SensorParse { path, reason } => {
                assert_eq!(path, PathBuf::from("/x/a.xtf"));
                assert_eq!(reason, "no ping packet");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SplError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: SplError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
