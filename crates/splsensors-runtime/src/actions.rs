//! Rename and move planning and execution.
//!
//! A plan is computed for a whole family first; every target is checked
//! before the first file is touched, so a conflict leaves the family as it was.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use splsensors_core::error::{Result, SplError};
use splsensors_core::models::MatchLabel;
use splsensors_data::analysis::FamilyAnalysis;
use tracing::{debug, info};

/// Destination folders for relocatable families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTargets {
    /// Receives files labelled `OK`.
    pub ok_dir: PathBuf,
    /// Receives files labelled `WRONG`.
    pub wrong_dir: PathBuf,
}

impl MoveTargets {
    /// `<family folder>/<vessel>` and `<family folder>/WRONG`.
    pub fn for_family(folder: &Path, vessel: &str) -> Self {
        Self {
            ok_dir: folder.join(vessel),
            wrong_dir: folder.join("WRONG"),
        }
    }

    fn dir_for(&self, label: MatchLabel) -> &Path {
        match label {
            MatchLabel::Ok => &self.ok_dir,
            MatchLabel::Wrong => &self.wrong_dir,
        }
    }
}

/// One filesystem operation; a rename and a move of the same file collapse
/// into a single action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAction {
    pub from: PathBuf,
    pub to: PathBuf,
    pub renamed: bool,
    pub moved: bool,
}

/// Counts of completed operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionCounts {
    pub renamed: usize,
    pub moved: usize,
}

/// Compute the actions for every matched, surviving row of `analysis`.
pub fn plan_actions(analysis: &FamilyAnalysis, rename: bool, move_to: Option<&MoveTargets>) -> Vec<FileAction> {
    if !rename && move_to.is_none() {
        return Vec::new();
    }

    analysis
        .matches
        .matched()
        .filter_map(|entry| {
            let assignment = entry.assignment.as_ref()?;
            let from = entry.observation.file_path.clone();

            let renamed_path = if rename { assignment.proposed_path.clone() } else { None };
            let renamed = renamed_path.is_some();
            let current = renamed_path.unwrap_or_else(|| from.clone());

            let (to, moved) = match move_to {
                Some(targets) => {
                    let file_name = current.file_name()?;
                    (targets.dir_for(assignment.label).join(file_name), true)
                }
                None => (current, false),
            };

            (to != from).then_some(FileAction { from, to, renamed, moved })
        })
        .collect()
}

/// Fail with [`SplError::RenameConflict`] if any target exists or two actions
/// share a target.
pub fn check_conflicts(actions: &[FileAction]) -> Result<()> {
    let mut targets: HashSet<&Path> = HashSet::new();
    for action in actions {
        if action.to.exists() || !targets.insert(&action.to) {
            return Err(SplError::RenameConflict {
                from: action.from.clone(),
                to: action.to.clone(),
            });
        }
    }
    Ok(())
}

/// Check, then perform every action. `on_action` is called after each one.
pub fn execute_actions<F>(actions: &[FileAction], mut on_action: F) -> Result<ActionCounts>
where
    F: FnMut(&FileAction),
{
    check_conflicts(actions)?;

    let mut counts = ActionCounts::default();
    for action in actions {
        if let Some(dir) = action.to.parent() {
            std::fs::create_dir_all(dir)?;
        }
        move_file(&action.from, &action.to)?;
        debug!("{} -> {}", action.from.display(), action.to.display());

        counts.renamed += usize::from(action.renamed);
        counts.moved += usize::from(action.moved);
        on_action(action);
    }

    if !actions.is_empty() {
        info!(renamed = counts.renamed, moved = counts.moved, "sensor files relocated");
    }
    Ok(counts)
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::metadata(from).map_err(|source| SplError::FileRead {
        path: from.to_path_buf(),
        source,
    })?;
    std::fs::copy(from, to).map_err(|source| SplError::FileWrite {
        path: to.to_path_buf(),
        source,
    })?;
    std::fs::remove_file(from)?;
    Ok(())
}
