//! Checks that must pass before any file is read or written.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use splsensors_core::error::{Result, SplError};
use splsensors_core::settings::{vessel_from_position, RunConfig, SensorInput};
use tracing::{debug, warn};

/// Run every pre-flight check, in the order a user would fix them.
pub fn run_preflight(config: &RunConfig) -> Result<()> {
    vessel_from_position(&config.spl_position)?;
    check_folders(config)?;
    check_inventories(config)?;
    check_output_unlocked(&config.output_folder)?;
    debug!("pre-flight checks passed");
    Ok(())
}

/// The SPL folder, the output folder and every requested sensor input must exist.
pub fn check_folders(config: &RunConfig) -> Result<()> {
    require_dir("SPL", &config.spl_folder)?;
    require_dir("Output", &config.output_folder)?;

    for source in &config.sensor_sources {
        match &source.input {
            SensorInput::Scan(root) => require_dir(source.family.as_str(), root)?,
            SensorInput::Inventory(path) => {
                if !path.is_file() {
                    return Err(SplError::FileRead {
                        path: path.clone(),
                        source: std::io::Error::new(std::io::ErrorKind::NotFound, "inventory not found"),
                    });
                }
            }
        }
        if config.move_files && source.family.is_movable() && source.folder.is_none() {
            warn!(
                "{} files cannot be moved: no {} folder was given",
                source.family, source.family
            );
        }
    }
    Ok(())
}

fn require_dir(what: &str, path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(SplError::FolderNotFound {
            what: what.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// A replayed inventory must not live in the folder this run writes to.
pub fn check_inventories(config: &RunConfig) -> Result<()> {
    let output = canonical(&config.output_folder);
    for source in &config.sensor_sources {
        if let SensorInput::Inventory(path) = &source.input {
            let parent = path.parent().map(canonical).unwrap_or_default();
            if parent == output {
                return Err(SplError::InventoryColocated(path.clone()));
            }
        }
    }
    Ok(())
}

/// Every file directly inside `output` must open for read and write.
pub fn check_output_unlocked(output: &Path) -> Result<()> {
    let entries = std::fs::read_dir(output).map_err(|source| SplError::FileRead {
        path: output.to_path_buf(),
        source,
    })?;

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if OpenOptions::new().read(true).write(true).open(&path).is_err() {
            return Err(SplError::OutputLocked(path));
        }
    }
    Ok(())
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
