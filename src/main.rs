use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use ajax_flow::driver::appium::DEFAULT_SERVER_URL;
use ajax_flow::runner::executor::plan_cases;
use ajax_flow::utils::config::{Config, Overrides};
use ajax_flow::{driver, report, runner, utils};

#[derive(Parser)]
#[command(name = "ajax-flow")]
#[command(version = "0.1.0")]
#[command(about = "Login and navigation flow runner for the Ajax Android app", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in suite, a suite file, or every suite in a directory
    Run {
        /// Path to suite file or directory (built-in suite if omitted)
        path: Option<PathBuf>,

        /// Automation server URL
        #[arg(long)]
        server: Option<String>,

        /// Output directory for reports and screenshots
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Log file, overwritten at every run
        #[arg(long, default_value = "test.log")]
        log_file: PathBuf,

        /// Session-wide implicit wait in seconds
        #[arg(long)]
        implicit_wait: Option<u64>,

        /// Default explicit wait in milliseconds
        #[arg(long)]
        wait_timeout: Option<u64>,

        /// Run only cases whose name matches
        #[arg(short, long)]
        case: Option<String>,

        /// Save a screenshot when a case fails
        #[arg(long, short = 's', default_value = "false")]
        snapshot: bool,

        /// Generate reports (JSON, JUnit)
        #[arg(long, default_value = "false")]
        report: bool,
    },

    /// Validate suites and print the planned cases
    Check {
        /// Path to suite file or directory (built-in suite if omitted)
        path: Option<PathBuf>,
    },

    /// Query automation server readiness
    Status {
        /// Automation server URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server: String,
    },

    /// Generate report from test results
    Report {
        /// Path to test results JSON
        results: PathBuf,

        /// Output format (json, junit)
        #[arg(short, long, default_value = "junit")]
        format: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            path,
            server,
            output,
            log_file,
            implicit_wait,
            wait_timeout,
            case,
            snapshot,
            report,
        } => {
            utils::logging::init_file_logging(&log_file)?;

            let source = path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in suite".to_string());
            println!("{} Running suites from: {}", "▶".green().bold(), source);
            println!("  Output: {}", output.display().to_string().cyan());
            println!("  Log: {}", log_file.display().to_string().cyan());
            if let Some(ref name) = case {
                println!("  Case: {}", name.cyan());
            }
            if snapshot {
                println!("  Snapshots: {}", "Enabled".green());
            }
            if report {
                println!("  Reports: {}", "Enabled".green());
            }

            let config = Config {
                log_file,
                output_dir: output,
                ..Config::default()
            };
            let overrides = Overrides {
                server_url: server,
                implicit_wait_secs: implicit_wait,
                wait_timeout_ms: wait_timeout,
            };
            let options = runner::RunOptions {
                snapshot,
                case_filter: case,
            };

            let results =
                runner::run_suites(path.as_deref(), &config, &overrides, &options, report).await?;

            let summary = &results.summary;
            println!(
                "\n{} {} passed, {} failed, {} skipped",
                "Σ".bold(),
                summary.passed.to_string().green(),
                summary.failed.to_string().red(),
                summary.skipped.to_string().yellow()
            );

            if !results.is_success() {
                anyhow::bail!("Test run failed");
            }
        }

        Commands::Check { path } => {
            let suites = runner::load_suites(path.as_deref())?;
            for (file, suite) in &suites {
                println!(
                    "{} {} ({})",
                    "✓".green(),
                    suite.name.bold(),
                    file.display()
                );
                for planned in plan_cases(suite, None) {
                    let transition = match (&planned.case.from, &planned.case.to) {
                        (Some(from), Some(to)) => format!("{} → {}", from, to),
                        (None, Some(to)) => format!("→ {}", to),
                        (Some(from), None) => format!("{} →", from),
                        (None, None) => String::new(),
                    };
                    println!(
                        "  • {} [{} steps] {}",
                        planned.name.cyan(),
                        planned.case.steps.len(),
                        transition.dimmed()
                    );
                }
            }
        }

        Commands::Status { server } => {
            println!("{} Querying {}...", "🔍".to_string().blue(), server.cyan());
            driver::check_server(&server, Config::default().http_timeout()).await?;
        }

        Commands::Report {
            results,
            format,
            output,
        } => {
            println!(
                "{} Generating {} report from: {}",
                "📊".to_string().blue(),
                format.cyan(),
                results.display()
            );
            report::generate_report(&results, &format, output.as_deref())?;
        }
    }

    Ok(())
}
