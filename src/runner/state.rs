use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Step execution status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Passed,
    Failed { error: String },
    Skipped { reason: String },
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Passed | StepStatus::Failed { .. } | StepStatus::Skipped { .. }
        )
    }
}

/// State for a single step execution
#[derive(Debug, Clone)]
pub struct StepState {
    pub index: usize,
    pub display: String,
    pub status: StepStatus,
    pub started_at: Option<Instant>,
    pub duration_ms: Option<u64>,
}

impl StepState {
    pub fn new(index: usize, display: &str) -> Self {
        Self {
            index,
            display: display.to_string(),
            status: StepStatus::Pending,
            started_at: None,
            duration_ms: None,
        }
    }

    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Instant::now());
    }

    pub fn pass(&mut self) {
        self.finish(StepStatus::Passed);
    }

    pub fn fail(&mut self, error: String) {
        self.finish(StepStatus::Failed { error });
    }

    pub fn skip(&mut self, reason: String) {
        self.status = StepStatus::Skipped { reason };
    }

    fn finish(&mut self, status: StepStatus) {
        self.status = status;
        if let Some(start) = self.started_at {
            self.duration_ms = Some(start.elapsed().as_millis() as u64);
        }
    }

    pub fn to_report(&self) -> StepStateReport {
        StepStateReport {
            index: self.index,
            display: self.display.clone(),
            status: self.status.clone(),
            duration_ms: self.duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStateReport {
    pub index: usize,
    pub display: String,
    pub status: StepStatus,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CaseStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

/// State for one test case instance (one variant of a case)
#[derive(Debug, Clone)]
pub struct CaseState {
    pub case_name: String,
    pub vars: BTreeMap<String, String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: CaseStatus,
    pub steps: Vec<StepState>,
    pub current_index: usize,
    pub started_at: Option<Instant>,
    pub total_duration_ms: Option<u64>,
    pub error: Option<String>,
    /// Failure class of `error`, e.g. "ElementNotFound"
    pub error_kind: Option<String>,
    pub screenshot_path: Option<String>,
}

impl CaseState {
    pub fn new(name: &str, vars: BTreeMap<String, String>, steps: Vec<StepState>) -> Self {
        Self {
            case_name: name.to_string(),
            vars,
            from: None,
            to: None,
            status: CaseStatus::Pending,
            steps,
            current_index: 0,
            started_at: None,
            total_duration_ms: None,
            error: None,
            error_kind: None,
            screenshot_path: None,
        }
    }

    pub fn with_screens(mut self, from: Option<String>, to: Option<String>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn start(&mut self) {
        self.status = CaseStatus::Running;
        self.started_at = Some(Instant::now());
    }

    pub fn current_step(&mut self) -> Option<&mut StepState> {
        self.steps.get_mut(self.current_index)
    }

    /// Settle the case status from its steps: any failed step fails the case
    pub fn finish(&mut self) {
        if let Some(start) = self.started_at {
            self.total_duration_ms = Some(start.elapsed().as_millis() as u64);
        }

        let failed = self.steps.iter().find_map(|step| match &step.status {
            StepStatus::Failed { error } => Some(error.clone()),
            _ => None,
        });

        self.status = match failed {
            Some(error) => {
                self.error = Some(error);
                CaseStatus::Failed
            }
            None => CaseStatus::Passed,
        };
    }

    /// Mark every pending step skipped
    pub fn skip_remaining(&mut self, reason: &str) {
        let from = self.current_index.min(self.steps.len());
        for step in &mut self.steps[from..] {
            if matches!(step.status, StepStatus::Pending) {
                step.skip(reason.to_string());
            }
        }
    }

    /// Mark the whole case skipped without running it
    pub fn skip(&mut self, reason: &str) {
        self.skip_remaining(reason);
        self.status = CaseStatus::Skipped;
        self.error = Some(reason.to_string());
    }

    pub fn to_report(&self) -> CaseStateReport {
        CaseStateReport {
            case_name: self.case_name.clone(),
            vars: self.vars.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            status: self.status.clone(),
            steps: self.steps.iter().map(|s| s.to_report()).collect(),
            total_duration_ms: self.total_duration_ms,
            error: self.error.clone(),
            error_kind: self.error_kind.clone(),
            screenshot_path: self.screenshot_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseStateReport {
    pub case_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    pub status: CaseStatus,
    pub steps: Vec<StepStateReport>,
    pub total_duration_ms: Option<u64>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub screenshot_path: Option<String>,
}

/// State of one suite run against one session
#[derive(Debug, Clone)]
pub struct SuiteState {
    pub run_id: String,
    pub suite_name: String,
    pub server: String,
    pub session_id: Option<String>,
    pub cases: Vec<CaseState>,
    pub setup_error: Option<String>,
    pub teardown_error: Option<String>,
    pub released: bool,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl SuiteState {
    pub fn new(run_id: &str, suite_name: &str, server: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            suite_name: suite_name.to_string(),
            server: server.to_string(),
            session_id: None,
            cases: Vec::new(),
            setup_error: None,
            teardown_error: None,
            released: false,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn add_case(&mut self, case: CaseState) {
        self.cases.push(case);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Instant::now());
    }

    /// Whether every case passed and the session came up
    pub fn is_success(&self) -> bool {
        self.setup_error.is_none()
            && self
                .cases
                .iter()
                .all(|case| case.status == CaseStatus::Passed)
    }

    pub fn summary(&self) -> TestSummary {
        let mut passed = 0;
        let mut failed = 0;
        let mut skipped = 0;

        for case in &self.cases {
            match case.status {
                CaseStatus::Passed => passed += 1,
                CaseStatus::Failed => failed += 1,
                CaseStatus::Skipped => skipped += 1,
                _ => {}
            }
        }

        let total_duration_ms = self.started_at.map(|start| {
            self.finished_at
                .unwrap_or_else(Instant::now)
                .duration_since(start)
                .as_millis() as u64
        });

        TestSummary {
            run_id: self.run_id.clone(),
            total_cases: self.cases.len() as u32,
            passed,
            failed,
            skipped,
            total_duration_ms,
        }
    }

    pub fn to_report(&self) -> SuiteReport {
        SuiteReport {
            run_id: self.run_id.clone(),
            suite_name: self.suite_name.clone(),
            server: self.server.clone(),
            session_id: self.session_id.clone(),
            cases: self.cases.iter().map(|c| c.to_report()).collect(),
            setup_error: self.setup_error.clone(),
            teardown_error: self.teardown_error.clone(),
            summary: self.summary(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub run_id: String,
    pub total_cases: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total_duration_ms: Option<u64>,
}

impl TestSummary {
    /// Sum the summaries of several suites
    pub fn merge(&mut self, other: &TestSummary) {
        self.total_cases += other.total_cases;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.total_duration_ms = match (self.total_duration_ms, other.total_duration_ms) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteReport {
    pub run_id: String,
    pub suite_name: String,
    pub server: String,
    pub session_id: Option<String>,
    pub cases: Vec<CaseStateReport>,
    pub setup_error: Option<String>,
    pub teardown_error: Option<String>,
    pub summary: TestSummary,
}
