pub mod context;
pub mod events;
pub mod executor;
pub mod state;

use anyhow::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};

pub use events::*;
pub use executor::{CancelHandle, FlowRunner, RunOptions, SessionGuard};
pub use state::*;

use crate::driver::appium::AppiumConnector;
use crate::parser::types::Suite;
use crate::parser::yaml::{builtin_suite, parse_suite_file};
use crate::report::types::TestResults;
use crate::utils::config::{Config, Overrides};

/// Load the suites to run: the built-in one, a single file, or every YAML file in a directory
pub fn load_suites(path: Option<&Path>) -> Result<Vec<(PathBuf, Suite)>> {
    let Some(path) = path else {
        return Ok(vec![(PathBuf::from("<builtin>"), builtin_suite()?)]);
    };

    if !path.is_dir() {
        return Ok(vec![(path.to_path_buf(), parse_suite_file(path)?)]);
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e
                    .path()
                    .extension()
                    .map_or(false, |ext| ext == "yaml" || ext == "yml")
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();

    files
        .into_iter()
        .map(|file| {
            let suite = parse_suite_file(&file)?;
            Ok((file, suite))
        })
        .collect()
}

/// First Ctrl-C stops the run after the session is released; a second one exits at once
async fn cancel_on_ctrl_c(cancel: CancelHandle) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    println!(
        "\n{} Interrupted, releasing session (Ctrl-C again to force quit)",
        "⏹".yellow()
    );
    log::warn!("Interrupt received, stopping after session release");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        log::error!("Second interrupt, exiting without release");
        std::process::exit(130);
    }
}

/// Run suites one after another, each against its own session
///
/// Returns the collected results; reports are written when `report` is set.
pub async fn run_suites(
    path: Option<&Path>,
    config: &Config,
    overrides: &Overrides,
    options: &RunOptions,
    report: bool,
) -> Result<TestResults> {
    let suites = load_suites(path)?;
    if suites.is_empty() {
        println!("{} No suites found.", "ℹ".blue());
    }

    let cancel = CancelHandle::new();
    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let mut reports = Vec::new();
    for (file, suite) in &suites {
        if cancel.is_cancelled() {
            log::warn!("Skipping suite {} after interrupt", suite.name);
            break;
        }
        let effective = config.for_suite(suite, overrides);
        log::info!("Running suite {} from {}", suite.name, file.display());

        let connector = AppiumConnector::new(&effective.server_url, effective.http_timeout());
        let runner = FlowRunner::new(Box::new(connector), effective, options.clone())
            .with_cancel(cancel.clone())
            .with_console();
        let state = runner.run_suite(suite).await;
        reports.push(state.to_report());
    }
    interrupt.abort();

    // Let the console listener drain before printing anything else
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    let results = TestResults::new(reports);
    if report {
        crate::report::write_reports(&results, &config.output_dir)?;
    }

    Ok(results)
}
