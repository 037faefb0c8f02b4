mod bootstrap;

use std::process::ExitCode;

use colored::Colorize;
use splsensors_core::formatting::{format_count, format_duration};
use splsensors_core::settings::Settings;
use splsensors_runtime::orchestrator::{Orchestrator, RunSummary};
use splsensors_runtime::report::summary_table;

fn main() -> ExitCode {
    let settings = Settings::load_with_last_used();

    if let Err(e) = bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref()) {
        eprintln!("{}", format!("Could not initialise logging: {e:#}").red().bold());
        return ExitCode::FAILURE;
    }

    if settings.clear {
        println!("Saved parameters cleared.");
        if settings.spl_folder.is_none() {
            return ExitCode::SUCCESS;
        }
    }

    match run(&settings) {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!("run aborted: {e:?}");
            eprintln!("{}", format!("{e:#}").red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(settings: &Settings) -> anyhow::Result<RunSummary> {
    let config = settings.to_run_config()?;

    tracing::info!("splsensors v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Vessel: {}, Rename: {}, Move: {}, Buffer: {}s",
        config.vessel,
        config.rename,
        config.move_files,
        config.buffer.num_milliseconds() as f64 / 1000.0
    );

    Ok(Orchestrator::new(&config).run()?)
}

fn print_summary(summary: &RunSummary) {
    println!(
        "A total of {} sensors files were processed and {} SPL Sessions",
        format_count(summary.sensor_files),
        format_count(summary.session_count)
    );
    println!("{}", summary_table(&summary.rows));

    if summary.problem_sessions > 0 {
        let verb = if summary.problem_sessions == 1 { "has" } else { "have" };
        let line = format!(
            "A total of {}/{} Session SPL {} no Linename information or Empty Session.",
            summary.problem_sessions, summary.session_count, verb
        );
        println!("{}", line.yellow());
    }

    println!(
        "{}",
        format!("Logs can be found in {}.", summary.output_folder.display()).bright_blue()
    );
    println!("Total run time: {}", format_duration(summary.duration));
}
