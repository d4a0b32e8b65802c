use crate::runner::state::{SuiteReport, TestSummary};
use serde::{Deserialize, Serialize};

/// Results of one invocation, possibly spanning several suites
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResults {
    pub suites: Vec<SuiteReport>,
    pub summary: TestSummary,
    pub generated_at: String,
}

impl TestResults {
    pub fn new(suites: Vec<SuiteReport>) -> Self {
        let mut summary = TestSummary {
            run_id: uuid::Uuid::new_v4().to_string(),
            ..TestSummary::default()
        };
        for suite in &suites {
            summary.merge(&suite.summary);
        }

        Self {
            suites,
            summary,
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Every suite came up and every case passed
    pub fn is_success(&self) -> bool {
        self.suites.iter().all(|s| s.setup_error.is_none())
            && self.summary.failed == 0
            && self.summary.skipped == 0
    }
}
