use base64::Engine;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use super::context::CaseContext;
use super::events::{ConsoleEventListener, EventEmitter, TestEvent};
use super::state::{CaseState, CaseStatus, StepState, SuiteState};
use crate::driver::traits::{DriverConnector, ElementRef, Locator, SessionDriver};
use crate::error::{FlowError, FlowResult};
use crate::parser::types::{Step, Suite, TestCase};
use crate::utils::config::Config;

/// Owns the live session for the duration of a suite run
///
/// `release` consumes the guard, so a session is quit at most once. Dropping an
/// unreleased guard leaves the session open on the server and is logged.
pub struct SessionGuard {
    driver: Box<dyn SessionDriver>,
    released: bool,
}

impl SessionGuard {
    pub fn new(driver: Box<dyn SessionDriver>) -> Self {
        Self {
            driver,
            released: false,
        }
    }

    pub fn driver(&self) -> &dyn SessionDriver {
        self.driver.as_ref()
    }

    pub fn session_id(&self) -> &str {
        self.driver.session_id()
    }

    /// Quit the session and terminate the application
    pub async fn release(mut self) -> FlowResult<()> {
        self.released = true;
        self.driver.quit().await
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.released {
            log::warn!(
                "Session {} dropped without release",
                self.driver.session_id()
            );
        }
    }
}

/// One runnable instance of a test case: a case plus one variant
#[derive(Debug, Clone)]
pub struct PlannedCase<'a> {
    pub name: String,
    pub case: &'a TestCase,
    pub vars: BTreeMap<String, String>,
}

/// Expand variants into case instances, in declaration order
pub fn plan_cases<'a>(suite: &'a Suite, filter: Option<&str>) -> Vec<PlannedCase<'a>> {
    let filter = filter.map(str::to_lowercase);

    suite
        .cases
        .iter()
        .filter(|case| match &filter {
            Some(f) => {
                let name = case.name.to_lowercase();
                name == *f || name.starts_with(f.as_str())
            }
            None => true,
        })
        .flat_map(|case| {
            if case.variants.is_empty() {
                vec![PlannedCase {
                    name: case.name.clone(),
                    case,
                    vars: BTreeMap::new(),
                }]
            } else {
                let many = case.variants.len() > 1;
                case.variants
                    .iter()
                    .enumerate()
                    .map(|(idx, vars)| PlannedCase {
                        name: if many {
                            format!("{} [{}]", case.name, idx + 1)
                        } else {
                            case.name.clone()
                        },
                        case,
                        vars: vars.clone(),
                    })
                    .collect()
            }
        })
        .collect()
}

/// Options that do not come from the suite file
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Save a screenshot when a case fails
    pub snapshot: bool,
    /// Run only cases whose name matches (exact or prefix, case-insensitive)
    pub case_filter: Option<String>,
}

/// Stops a run before its next case; the session is still released
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self(Arc::new(sender))
    }

    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    async fn cancelled(&self) {
        let mut receiver = self.0.subscribe();
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the cases of a suite, in order, against one session
pub struct FlowRunner {
    connector: Box<dyn DriverConnector>,
    config: Config,
    options: RunOptions,
    emitter: EventEmitter,
    cancel: CancelHandle,
}

impl FlowRunner {
    pub fn new(connector: Box<dyn DriverConnector>, config: Config, options: RunOptions) -> Self {
        Self {
            connector,
            config,
            options,
            emitter: EventEmitter::default(),
            cancel: CancelHandle::new(),
        }
    }

    /// Share a cancel handle, e.g. one fired on Ctrl-C
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Print progress to the console
    pub fn with_console(self) -> Self {
        tokio::spawn(ConsoleEventListener::listen(self.emitter.subscribe()));
        self
    }

    /// Subscribe to execution events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TestEvent> {
        self.emitter.subscribe()
    }

    /// Run a suite: acquire the session, run every case, release the session
    pub async fn run_suite(&self, suite: &Suite) -> SuiteState {
        let planned = plan_cases(suite, self.options.case_filter.as_deref());
        let mut state = SuiteState::new(
            &Uuid::new_v4().to_string(),
            &suite.name,
            self.connector.endpoint(),
        );
        state.start();

        log::info!(
            "Suite {} ({} cases) on {}",
            suite.name,
            planned.len(),
            self.connector.endpoint()
        );
        self.emitter.emit(TestEvent::SuiteStarted {
            suite_name: suite.name.clone(),
            run_id: state.run_id.clone(),
            server: self.connector.endpoint().to_string(),
            case_count: planned.len(),
        });

        // 1. Session acquisition
        let guard = match self.connector.connect(&suite.capabilities).await {
            Ok(driver) => SessionGuard::new(driver),
            Err(e) => {
                self.setup_failed(&mut state, &planned, e);
                return self.finish(state);
            }
        };

        state.session_id = Some(guard.session_id().to_string());
        self.emitter.emit(TestEvent::SessionCreated {
            session_id: guard.session_id().to_string(),
        });

        // 2. Cases, unless the session could not be configured
        match guard
            .driver()
            .set_implicit_wait(self.config.implicit_wait())
            .await
        {
            Ok(()) => {
                for planned_case in &planned {
                    if self.cancel.is_cancelled() {
                        state.add_case(interrupted_case(planned_case));
                        continue;
                    }
                    tokio::select! {
                        case_state = self.run_case(guard.driver(), planned_case) => {
                            state.add_case(case_state);
                        }
                        _ = self.cancel.cancelled() => {
                            log::warn!("Run interrupted during {}", planned_case.name);
                            self.emitter.emit(TestEvent::Log {
                                message: format!("Interrupted during {}", planned_case.name),
                            });
                            state.add_case(interrupted_case(planned_case));
                        }
                    }
                }
            }
            Err(e) => {
                let e = if e.is_setup() {
                    e
                } else {
                    FlowError::Setup(format!("could not set implicit wait: {}", e))
                };
                self.setup_failed(&mut state, &planned, e);
            }
        }

        // 3. Release, whatever happened above
        let session_id = guard.session_id().to_string();
        let release = guard.release().await;
        state.released = true;
        let error = match release {
            Ok(()) => {
                log::info!("Session {} released", session_id);
                None
            }
            Err(e) => {
                log::warn!("Session {} release failed: {}", session_id, e);
                state.teardown_error = Some(e.to_string());
                Some(e.to_string())
            }
        };
        self.emitter
            .emit(TestEvent::SessionReleased { session_id, error });

        self.finish(state)
    }

    fn setup_failed(&self, state: &mut SuiteState, planned: &[PlannedCase<'_>], error: FlowError) {
        log::error!("Setup failed for suite {}: {}", state.suite_name, error);
        self.emitter.emit(TestEvent::SetupFailed {
            error: error.to_string(),
        });
        state.setup_error = Some(error.to_string());

        let reason = error.to_string();
        for planned_case in planned {
            let mut case = new_case_state(planned_case);
            case.skip(&reason);
            state.add_case(case);
        }
    }

    fn finish(&self, mut state: SuiteState) -> SuiteState {
        state.finish();
        let summary = state.summary();
        log::info!(
            "Suite {} finished: {} passed, {} failed, {} skipped",
            state.suite_name,
            summary.passed,
            summary.failed,
            summary.skipped
        );
        self.emitter.emit(TestEvent::SuiteFinished {
            suite_name: state.suite_name.clone(),
            summary,
        });
        state
    }

    /// Run one case instance; the first failing step aborts it
    async fn run_case(&self, driver: &dyn SessionDriver, planned: &PlannedCase<'_>) -> CaseState {
        let ctx = CaseContext::new(
            planned.vars.clone(),
            self.config.implicit_wait(),
            self.config.wait_timeout(),
            self.config.poll_interval(),
        );
        let steps = &planned.case.steps;
        let mut state = new_case_state(planned);
        for (step_state, step) in state.steps.iter_mut().zip(steps) {
            step_state.display = ctx.substitute_vars(&step.display_name());
        }
        let description = planned
            .case
            .description
            .as_deref()
            .map(|d| ctx.substitute_vars(d));

        match &description {
            Some(d) => log::info!("{}: {}", planned.name, d),
            None => log::info!("{}", planned.name),
        }
        self.emitter.emit(TestEvent::CaseStarted {
            case_name: planned.name.clone(),
            description,
            step_count: steps.len(),
        });

        state.start();

        for (i, step) in steps.iter().enumerate() {
            state.current_index = i;
            let Some(step_state) = state.current_step() else {
                break;
            };
            let display = step_state.display.clone();
            step_state.start();
            self.emitter.emit(TestEvent::StepStarted {
                case_name: planned.name.clone(),
                index: i,
                step: display.clone(),
            });

            match execute_step(driver, step, &ctx).await {
                Ok(()) => {
                    step_state.pass();
                    let duration_ms = step_state.duration_ms.unwrap_or(0);
                    log::info!(
                        "{} step {}/{}: {} passed ({}ms)",
                        planned.name,
                        i + 1,
                        steps.len(),
                        display,
                        duration_ms
                    );
                    self.emitter.emit(TestEvent::StepPassed {
                        case_name: planned.name.clone(),
                        index: i,
                        duration_ms,
                    });
                }
                Err(e) => {
                    let error = e.to_string();
                    let kind = e.kind();
                    step_state.fail(error.clone());
                    let duration_ms = step_state.duration_ms.unwrap_or(0);
                    log::error!(
                        "{} step {}/{}: {} failed ({}ms): {}",
                        planned.name,
                        i + 1,
                        steps.len(),
                        display,
                        duration_ms,
                        error
                    );
                    self.emitter.emit(TestEvent::StepFailed {
                        case_name: planned.name.clone(),
                        index: i,
                        error,
                        duration_ms,
                    });

                    state.error_kind = Some(kind.to_string());
                    state.current_index = i + 1;
                    state.skip_remaining("Previous step failed");
                    break;
                }
            }
        }

        state.finish();

        if state.status == CaseStatus::Failed && self.options.snapshot {
            state.screenshot_path = self.capture_failure(driver, &planned.name).await;
        }

        self.emitter.emit(TestEvent::CaseFinished {
            case_name: planned.name.clone(),
            status: state.status.clone(),
            duration_ms: state.total_duration_ms,
            error: state.error.clone(),
        });

        state
    }

    /// Save a screenshot of the failing screen; problems are only logged
    async fn capture_failure(&self, driver: &dyn SessionDriver, case_name: &str) -> Option<String> {
        let safe_name: String = case_name
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let filename = format!(
            "failure_{}_{}.png",
            safe_name,
            Uuid::new_v4().to_string().chars().take(8).collect::<String>()
        );
        let path: PathBuf = self.config.output_dir.join(&filename);

        let result = async {
            let data = driver.screenshot().await.map_err(|e| e.to_string())?;
            let bytes = decode_screenshot(&data).map_err(|e| e.to_string())?;
            std::fs::create_dir_all(&self.config.output_dir).map_err(|e| e.to_string())?;
            std::fs::write(&path, bytes).map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        }
        .await;

        match result {
            Ok(()) => {
                log::info!("Saved failure screenshot {}", path.display());
                self.emitter.emit(TestEvent::Log {
                    message: format!("Screenshot saved: {}", path.display()),
                });
                Some(filename)
            }
            Err(e) => {
                log::warn!("Could not capture screenshot for {}: {}", case_name, e);
                None
            }
        }
    }
}

/// Decode a base64 screenshot; some servers wrap the payload in line breaks
fn decode_screenshot(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(compact)
}

fn interrupted_case(planned: &PlannedCase<'_>) -> CaseState {
    let mut case = new_case_state(planned);
    case.skip("Run interrupted");
    case
}

fn new_case_state(planned: &PlannedCase<'_>) -> CaseState {
    let steps = planned
        .case
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| StepState::new(i, &step.display_name()))
        .collect();
    CaseState::new(&planned.name, planned.vars.clone(), steps)
        .with_screens(planned.case.from.clone(), planned.case.to.clone())
}

/// Execute one step: resolve, act, or assert
pub async fn execute_step(
    driver: &dyn SessionDriver,
    step: &Step,
    ctx: &CaseContext,
) -> FlowResult<()> {
    match step {
        Step::TapOn(target) => {
            let element = driver.find_element(&target.to_locator()?).await?;
            driver.click(&element).await
        }

        Step::InputText(params) => {
            let element = driver.find_element(&params.target.to_locator()?).await?;
            if params.clear {
                driver.clear(&element).await?;
            }
            driver
                .send_keys(&element, &ctx.substitute_vars(&params.text))
                .await
        }

        Step::WaitForVisible(params) => {
            let locator = params.target.to_locator()?;
            wait_until_visible(driver, &locator, ctx.wait_for(params.timeout), ctx).await?;
            Ok(())
        }

        Step::AssertSourceContains(params) => {
            let marker = ctx.substitute_vars(&params.marker);
            let source = driver.page_source().await?;
            if source.contains(&marker) {
                Ok(())
            } else {
                Err(FlowError::Assertion(format!(
                    "{}: expected page source to contain \"{}\" ({} chars observed)",
                    params.message.as_deref().unwrap_or("Marker not found"),
                    marker,
                    source.len()
                )))
            }
        }

        Step::AssertSourceLacks(params) => {
            let marker = ctx.substitute_vars(&params.marker);
            let source = driver.page_source().await?;
            if source.contains(&marker) {
                Err(FlowError::Assertion(format!(
                    "{}: expected page source not to contain \"{}\"",
                    params.message.as_deref().unwrap_or("Unexpected marker found"),
                    marker
                )))
            } else {
                Ok(())
            }
        }

        Step::AssertChildren(params) => {
            let parent_locator = params.parent.to_locator()?;
            let children_locator = params.children.to_locator()?;
            let parent =
                wait_until_visible(driver, &parent_locator, ctx.wait_for(params.timeout), ctx)
                    .await?;
            let children = driver
                .find_child_elements(&parent, &children_locator)
                .await?;
            if children.is_empty() {
                Err(FlowError::Assertion(format!(
                    "{}: expected at least one {} within {}, found 0",
                    params.message.as_deref().unwrap_or("No child elements"),
                    children_locator,
                    parent_locator
                )))
            } else {
                Ok(())
            }
        }
    }
}

/// Poll until an element matching `locator` is displayed
///
/// The implicit wait is switched off while polling so every lookup returns at once and
/// the bound holds; it is restored afterwards on every path.
pub async fn wait_until_visible(
    driver: &dyn SessionDriver,
    locator: &Locator,
    timeout: std::time::Duration,
    ctx: &CaseContext,
) -> FlowResult<ElementRef> {
    driver.set_implicit_wait(std::time::Duration::ZERO).await?;
    let result = poll_visible(driver, locator, timeout, ctx.poll_interval).await;
    let restored = driver.set_implicit_wait(ctx.implicit_wait).await;

    let element = result?;
    restored?;
    Ok(element)
}

async fn poll_visible(
    driver: &dyn SessionDriver,
    locator: &Locator,
    timeout: std::time::Duration,
    poll_interval: std::time::Duration,
) -> FlowResult<ElementRef> {
    let deadline = Instant::now() + timeout;

    loop {
        for element in driver.find_elements(locator).await? {
            match driver.is_displayed(&element).await {
                Ok(true) => return Ok(element),
                Ok(false) => {}
                Err(e) if e.protocol_code() == Some("stale element reference") => {}
                Err(e) => return Err(e),
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(FlowError::WaitTimeout {
                locator: locator.clone(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}
