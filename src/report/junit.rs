use super::types::TestResults;
use crate::runner::state::{CaseStateReport, CaseStatus, SuiteReport};
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

fn seconds(ms: Option<u64>) -> String {
    (ms.unwrap_or(0) as f64 / 1000.0).to_string()
}

/// Generate JUnit XML report string from TestResults
pub fn generate_junit_xml(results: &TestResults) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let summary = &results.summary;
    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "ajax-flow-run"));
    suites_start.push_attribute(("tests", summary.total_cases.to_string().as_str()));
    suites_start.push_attribute(("failures", summary.failed.to_string().as_str()));
    suites_start.push_attribute(("skipped", summary.skipped.to_string().as_str()));
    suites_start.push_attribute(("time", seconds(summary.total_duration_ms).as_str()));
    writer.write_event(Event::Start(suites_start))?;

    for suite in &results.suites {
        write_test_suite(&mut writer, suite, &results.generated_at)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let result = writer.into_inner().into_inner();
    let xml = String::from_utf8(result)?;
    Ok(xml)
}

fn write_test_suite<W: std::io::Write>(
    writer: &mut Writer<W>,
    suite: &SuiteReport,
    timestamp: &str,
) -> Result<()> {
    let summary = &suite.summary;
    let errors = if suite.setup_error.is_some() { 1 } else { 0 };

    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", suite.suite_name.as_str()));
    suite_start.push_attribute(("tests", summary.total_cases.to_string().as_str()));
    suite_start.push_attribute(("failures", summary.failed.to_string().as_str()));
    suite_start.push_attribute(("errors", errors.to_string().as_str()));
    suite_start.push_attribute(("skipped", summary.skipped.to_string().as_str()));
    suite_start.push_attribute(("id", suite.run_id.as_str()));
    suite_start.push_attribute(("time", seconds(summary.total_duration_ms).as_str()));
    suite_start.push_attribute(("timestamp", timestamp));
    writer.write_event(Event::Start(suite_start))?;

    for case in &suite.cases {
        write_test_case(writer, &suite.suite_name, case)?;
    }

    // Session problems are not tied to a single case
    let mut system_err = Vec::new();
    if let Some(err) = &suite.setup_error {
        system_err.push(format!("setup: {}", err));
    }
    if let Some(err) = &suite.teardown_error {
        system_err.push(format!("teardown: {}", err));
    }
    if !system_err.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("system-err")))?;
        writer.write_event(Event::Text(BytesText::new(&system_err.join("\n"))))?;
        writer.write_event(Event::End(BytesEnd::new("system-err")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    Ok(())
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    suite_name: &str,
    case: &CaseStateReport,
) -> Result<()> {
    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", case.case_name.as_str()));
    case_start.push_attribute(("classname", suite_name));
    case_start.push_attribute(("time", seconds(case.total_duration_ms).as_str()));

    writer.write_event(Event::Start(case_start))?;

    let message = case.error.as_deref().unwrap_or("Unknown error");
    match case.status {
        CaseStatus::Failed => {
            let mut fail_start = BytesStart::new("failure");
            fail_start.push_attribute(("message", message));
            let kind = case.error_kind.as_deref().unwrap_or("AssertionError");
            fail_start.push_attribute(("type", kind));
            writer.write_event(Event::Start(fail_start))?;
            writer.write_event(Event::Text(BytesText::new(message)))?;
            writer.write_event(Event::End(BytesEnd::new("failure")))?;
        }
        CaseStatus::Skipped => {
            let mut skip = BytesStart::new("skipped");
            skip.push_attribute(("message", message));
            writer.write_event(Event::Empty(skip))?;
        }
        _ => {}
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Write report to file
pub fn write_report(results: &TestResults, output_dir: &Path) -> Result<()> {
    let xml = generate_junit_xml(results)?;
    let path = output_dir.join("junit.xml");
    std::fs::write(&path, xml)?;
    println!("    Generated JUnit report: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::state::TestSummary;
    use std::collections::BTreeMap;

    fn case(name: &str, status: CaseStatus, error: Option<&str>) -> CaseStateReport {
        CaseStateReport {
            case_name: name.to_string(),
            vars: BTreeMap::new(),
            from: None,
            to: None,
            status,
            steps: vec![],
            total_duration_ms: Some(1500),
            error: error.map(str::to_string),
            error_kind: None,
            screenshot_path: None,
        }
    }

    #[test]
    fn test_generate_junit_xml() {
        let summary = TestSummary {
            run_id: "run-1".to_string(),
            total_cases: 3,
            passed: 1,
            failed: 1,
            skipped: 1,
            total_duration_ms: Some(3500),
        };
        let suite = SuiteReport {
            run_id: "run-1".to_string(),
            suite_name: "ajax_login".to_string(),
            server: "http://127.0.0.1:4723/wd/hub".to_string(),
            session_id: Some("abc".to_string()),
            cases: vec![
                case("allow_notifications", CaseStatus::Passed, None),
                case(
                    "login_with_valid_credentials",
                    CaseStatus::Failed,
                    Some("Login failed with valid credentials"),
                ),
                case("open_sidebar", CaseStatus::Skipped, Some("not reached")),
            ],
            setup_error: None,
            teardown_error: Some("device went away".to_string()),
            summary: summary.clone(),
        };
        let results = TestResults {
            suites: vec![suite],
            summary,
            generated_at: "2026-01-01 12:00:00".to_string(),
        };

        let xml = generate_junit_xml(&results).expect("Failed to generate XML");

        assert!(xml.contains(r#"<testsuites name="ajax-flow-run""#));
        assert!(xml.contains(r#"tests="3""#));
        assert!(xml.contains(r#"failures="1""#));
        assert!(xml.contains(r#"<testcase name="allow_notifications" classname="ajax_login""#));
        assert!(xml.contains(r#"message="Login failed with valid credentials""#));
        assert!(xml.contains(r#"<skipped message="not reached"/>"#));
        assert!(xml.contains("teardown: device went away"));
    }

    #[test]
    fn test_failure_type_follows_error_kind() {
        let mut failed = case(
            "open_sidebar",
            CaseStatus::Failed,
            Some("Element xpath=//xpath_of_sidebar_element not visible after 10000ms"),
        );
        failed.error_kind = Some("WaitTimeout".to_string());
        let suite = SuiteReport {
            run_id: "run-2".to_string(),
            suite_name: "ajax_login".to_string(),
            server: "http://127.0.0.1:4723/wd/hub".to_string(),
            session_id: None,
            cases: vec![failed],
            setup_error: None,
            teardown_error: None,
            summary: TestSummary::default(),
        };
        let results = TestResults {
            suites: vec![suite],
            summary: TestSummary::default(),
            generated_at: "2026-01-01 12:00:00".to_string(),
        };

        let xml = generate_junit_xml(&results).unwrap();
        assert!(xml.contains(r#"type="WaitTimeout""#));
        assert!(!xml.contains("AssertionError"));
    }
}
