use super::state::{CaseStatus, TestSummary};
use tokio::sync::broadcast;

/// Suite execution events for real-time updates
#[derive(Debug, Clone)]
pub enum TestEvent {
    // Suite / session events
    SuiteStarted {
        suite_name: String,
        run_id: String,
        server: String,
        case_count: usize,
    },
    SessionCreated {
        session_id: String,
    },
    SetupFailed {
        error: String,
    },
    SessionReleased {
        session_id: String,
        error: Option<String>,
    },
    SuiteFinished {
        suite_name: String,
        summary: TestSummary,
    },

    // Case events
    CaseStarted {
        case_name: String,
        description: Option<String>,
        step_count: usize,
    },
    CaseFinished {
        case_name: String,
        status: CaseStatus,
        duration_ms: Option<u64>,
        error: Option<String>,
    },

    // Step events
    StepStarted {
        case_name: String,
        index: usize,
        step: String,
    },
    StepPassed {
        case_name: String,
        index: usize,
        duration_ms: u64,
    },
    StepFailed {
        case_name: String,
        index: usize,
        error: String,
        duration_ms: u64,
    },

    Log {
        message: String,
    },
}

/// Event emitter for broadcasting test events
pub struct EventEmitter {
    sender: broadcast::Sender<TestEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<TestEvent>) {
        let (sender, receiver) = broadcast::channel(256);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: TestEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }
}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<TestEvent>) {
        use colored::Colorize;
        use std::io::IsTerminal;

        let interactive = std::io::stdout().is_terminal();
        let mut spinner: Option<ProgressBar> = None;

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                TestEvent::SuiteStarted {
                    suite_name,
                    run_id,
                    server,
                    case_count,
                } => {
                    println!(
                        "\n{} Suite {} ({} cases) on {}",
                        "▶".green().bold(),
                        suite_name.white().bold(),
                        case_count,
                        server.cyan()
                    );
                    println!("  Run: {}", run_id.dimmed());
                }

                TestEvent::SessionCreated { session_id } => {
                    println!("  Session: {}", session_id.cyan());
                }

                TestEvent::SetupFailed { error } => {
                    println!("  {} Setup failed: {}", "✗".red().bold(), error.red());
                }

                TestEvent::SessionReleased { session_id, error } => match error {
                    None => println!("\n  {} Session {} released", "■".blue(), session_id),
                    Some(error) => println!(
                        "\n  {} Session {} release failed: {}",
                        "⚠".yellow(),
                        session_id,
                        error.yellow()
                    ),
                },

                TestEvent::SuiteFinished {
                    suite_name,
                    summary,
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("\n{} Suite {} finished", "■".blue().bold(), suite_name);
                    println!("  Total cases: {}", summary.total_cases);
                    println!(
                        "  {} passed, {} failed, {} skipped",
                        summary.passed.to_string().green(),
                        summary.failed.to_string().red(),
                        summary.skipped.to_string().yellow()
                    );
                    if let Some(duration) = summary.total_duration_ms {
                        println!("  Duration: {}ms", duration);
                    }
                }

                TestEvent::CaseStarted {
                    case_name,
                    description,
                    step_count,
                } => {
                    println!(
                        "\n  {} Case: {} ({} steps)",
                        "→".blue(),
                        case_name.white().bold(),
                        step_count
                    );
                    if let Some(description) = description {
                        println!("    {}", description.dimmed());
                    }
                }

                TestEvent::CaseFinished {
                    case_name,
                    status,
                    duration_ms,
                    error,
                } => {
                    let duration = duration_ms
                        .map(|ms| format!(" ({}ms)", ms))
                        .unwrap_or_default();
                    match status {
                        CaseStatus::Passed => {
                            println!("  {} {}{}", "✓".green(), case_name, duration.dimmed())
                        }
                        CaseStatus::Skipped => println!(
                            "  {} {} skipped: {}",
                            "○".yellow(),
                            case_name,
                            error.unwrap_or_default()
                        ),
                        _ => println!(
                            "  {} {}{}: {}",
                            "✗".red(),
                            case_name,
                            duration.dimmed(),
                            error.unwrap_or_default().red()
                        ),
                    }
                }

                TestEvent::StepStarted { index, step, .. } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    let message = format!("[{}] {}", index + 1, step);
                    let pb = if interactive {
                        ProgressBar::new_spinner()
                    } else {
                        ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
                    };
                    pb.set_style(
                        ProgressStyle::default_spinner()
                            .template("    {spinner:.cyan} {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                    );
                    pb.set_message(message);
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinner = Some(pb);
                }

                TestEvent::StepPassed {
                    index, duration_ms, ..
                } => {
                    let text = spinner
                        .take()
                        .map(|pb| {
                            let msg = pb.message();
                            pb.finish_and_clear();
                            msg
                        })
                        .unwrap_or_else(|| format!("[{}]", index + 1));
                    println!(
                        "    {} {} {}",
                        "✓".green(),
                        text,
                        format!("({}ms)", duration_ms).dimmed()
                    );
                }

                TestEvent::StepFailed {
                    index,
                    error,
                    duration_ms,
                    ..
                } => {
                    let text = spinner
                        .take()
                        .map(|pb| {
                            let msg = pb.message();
                            pb.finish_and_clear();
                            msg
                        })
                        .unwrap_or_else(|| format!("[{}]", index + 1));
                    println!(
                        "    {} {} {}",
                        "✗".red(),
                        text,
                        format!("({}ms)", duration_ms).dimmed()
                    );
                    println!("      {}", error.red());
                }

                TestEvent::Log { message } => {
                    println!("    {}", message);
                }
            }
        }
    }
}
