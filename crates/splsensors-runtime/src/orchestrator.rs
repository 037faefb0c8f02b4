//! Whole-run orchestration.
//!
//! Runs pre-flight checks, extracts every navigation session, then takes each
//! requested sensor family through locate → analyse → export → rename/move,
//! and finally assembles the consolidated report.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use splsensors_core::error::{Result, SplError};
use splsensors_core::models::Session;
use splsensors_core::settings::{ReportFormat, RunConfig, SensorInput, SensorSource};
use splsensors_data::aggregator::build_session_wide;
use splsensors_data::analysis::{analyze_family, extract_sessions, FamilyAnalysis, SummaryRow};
use splsensors_data::locator::{find_sensor_files, load_inventory, scan_family, ScanOutcome};
use splsensors_data::navigation::{discover_session_files, CommandConverter, NavigationConverter};
use tracing::info;

use crate::actions::{execute_actions, plan_actions, ActionCounts, MoveTargets};
use crate::preflight::run_preflight;
use crate::report::{
    full_log_path, write_full_log, write_report, CsvDirectoryWriter, ReportInput, ReportWriter, XlsxWriter,
};

const BANNER_WIDTH: usize = 50;

// ── Public types ──────────────────────────────────────────────────────────────

/// What a finished run reports back to the caller.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub vessel: String,
    pub session_count: usize,
    /// Sessions that are empty, too small or without a line name.
    pub problem_sessions: usize,
    /// Sensor files (or inventory rows) considered across all families.
    pub sensor_files: usize,
    pub rows: Vec<SummaryRow>,
    pub output_folder: PathBuf,
    /// The workbook, or the folder of per-sheet CSV files.
    pub report_path: PathBuf,
    pub duration: Duration,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Drives one complete run over a validated [`RunConfig`].
pub struct Orchestrator<'a> {
    config: &'a RunConfig,
    converter: Box<dyn NavigationConverter>,
    show_progress: bool,
}

impl<'a> Orchestrator<'a> {
    /// Uses the configured external conversion program.
    pub fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            converter: Box::new(CommandConverter::new(config.converter.clone())),
            show_progress: true,
        }
    }

    pub fn with_converter(mut self, converter: Box<dyn NavigationConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Banners and progress bars on the terminal; off in tests.
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Execute the run. Any fatal condition aborts with its [`SplError`].
    pub fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let config = self.config;

        run_preflight(config)?;

        // ── Sessions ──────────────────────────────────────────────────────────
        self.banner("Extracting SPL sessions");
        let files = discover_session_files(&config.spl_folder, &config.spl_position);
        if files.is_empty() {
            return Err(SplError::NoSessionFiles(config.spl_folder.clone()));
        }
        info!("{} SPL session file(s) found", files.len());

        let bar = self.progress_bar(files.len(), "SPL sessions");
        let sessions = extract_sessions(&files, self.converter.as_ref(), &config.output_folder, |_| bar.inc(1))?;
        bar.finish_and_clear();

        // ── Sensor families ───────────────────────────────────────────────────
        let mut families = Vec::with_capacity(config.sensor_sources.len());
        let mut rows = Vec::with_capacity(config.sensor_sources.len());
        for source in &config.sensor_sources {
            self.banner(&format!("Processing {} files", source.family));
            let family_started = Instant::now();

            let analysis = self.analyze_source(source, &sessions)?;
            write_full_log(
                &full_log_path(&config.output_folder, &config.vessel, source.family),
                &analysis.flat,
            )?;

            let counts = self.relocate(source, &analysis)?;
            let moved = source.family.is_movable().then_some(counts.moved);
            rows.push(analysis.summary(counts.renamed, moved, family_started.elapsed()));
            families.push(analysis);
        }

        // ── Report ────────────────────────────────────────────────────────────
        self.banner("Writing report");
        let outcomes: Vec<_> = families.iter().map(|a| a.matches.clone()).collect();
        let session_wide = build_session_wide(&sessions, &config.vessel, &outcomes);
        let input = ReportInput {
            vessel: &config.vessel,
            sessions: &sessions,
            families: &families,
            summary: &rows,
            session_wide: &session_wide,
        };
        let writer: Box<dyn ReportWriter> = match config.report_format {
            ReportFormat::Xlsx => Box::new(XlsxWriter::create(&config.output_folder, &config.vessel)),
            ReportFormat::Csv => Box::new(CsvDirectoryWriter::create(&config.output_folder, &config.vessel)?),
        };
        let report_path = write_report(writer, &input)?;

        let summary = RunSummary {
            vessel: config.vessel.clone(),
            session_count: sessions.len(),
            problem_sessions: sessions.iter().filter(|s| s.is_problem()).count(),
            sensor_files: families.iter().map(|a| a.discovered).sum(),
            rows,
            output_folder: config.output_folder.clone(),
            report_path,
            duration: started.elapsed(),
        };
        info!(
            sessions = summary.session_count,
            sensor_files = summary.sensor_files,
            elapsed_ms = summary.duration.as_millis() as u64,
            "run complete"
        );
        Ok(summary)
    }

    fn analyze_source(&self, source: &SensorSource, sessions: &[Session]) -> Result<FamilyAnalysis> {
        let config = self.config;
        let scan: ScanOutcome = match &source.input {
            SensorInput::Scan(root) => {
                let files = find_sensor_files(root, source.family, config.recursive, &config.exclude);
                info!("{} {} file(s) found in {}", files.len(), source.family, root.display());
                let bar = self.progress_bar(files.len(), source.family.as_str());
                let outcome = scan_family(source.family, &files, |_| bar.inc(1));
                bar.finish_and_clear();
                outcome
            }
            SensorInput::Inventory(path) => {
                info!("Replaying {} inventory {}", source.family, path.display());
                load_inventory(path, source.family)?
            }
        };
        Ok(analyze_family(scan, sessions, &config.vessel, config.buffer))
    }

    fn relocate(&self, source: &SensorSource, analysis: &FamilyAnalysis) -> Result<ActionCounts> {
        let config = self.config;
        let targets = match (&source.folder, config.move_files && source.family.is_movable()) {
            (Some(folder), true) => Some(MoveTargets::for_family(folder, &config.vessel)),
            _ => None,
        };

        let actions = plan_actions(analysis, config.rename, targets.as_ref());
        if actions.is_empty() {
            return Ok(ActionCounts::default());
        }
        let bar = self.progress_bar(actions.len(), "Relocating");
        let counts = execute_actions(&actions, |_| bar.inc(1))?;
        bar.finish_and_clear();
        Ok(counts)
    }

    fn progress_bar(&self, len: usize, message: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        bar.set_style(
            ProgressStyle::with_template("{msg:>12} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(message.to_string());
        bar
    }

    fn banner(&self, title: &str) {
        if self.show_progress {
            let rule = "#".repeat(BANNER_WIDTH);
            println!("{}\n{}\n{}", rule.bright_blue(), title.bright_blue().bold(), rule.bright_blue());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
