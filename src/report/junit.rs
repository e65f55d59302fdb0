use super::types::SessionResults;
use crate::runner::state::{RunReport, RunStatus, StepStatus};
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

/// Generate JUnit XML with one testcase per script run
pub fn generate_junit_xml(results: &SessionResults) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let total_tests = results.runs.len();
    let failures = results
        .runs
        .iter()
        .filter(|r| matches!(r.status, RunStatus::Failed { .. }))
        .count();
    let skipped = results
        .runs
        .iter()
        .filter(|r| r.status == RunStatus::Cancelled)
        .count();
    let total_duration: u64 = results
        .runs
        .iter()
        .map(|r| r.total_duration_ms.unwrap_or(0))
        .sum();
    let time = seconds(total_duration);

    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "lumi-automation-run"));
    suites_start.push_attribute(("tests", total_tests.to_string().as_str()));
    suites_start.push_attribute(("failures", failures.to_string().as_str()));
    suites_start.push_attribute(("skipped", skipped.to_string().as_str()));
    suites_start.push_attribute(("time", time.as_str()));
    writer.write_event(Event::Start(suites_start))?;

    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", "scripts"));
    suite_start.push_attribute(("tests", total_tests.to_string().as_str()));
    suite_start.push_attribute(("failures", failures.to_string().as_str()));
    suite_start.push_attribute(("skipped", skipped.to_string().as_str()));
    suite_start.push_attribute(("id", results.session_id.as_str()));
    suite_start.push_attribute(("time", time.as_str()));
    suite_start.push_attribute(("timestamp", results.generated_at.as_str()));
    writer.write_event(Event::Start(suite_start))?;

    for run in &results.runs {
        write_test_case(&mut writer, run)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let result = writer.into_inner().into_inner();
    Ok(String::from_utf8(result)?)
}

fn seconds(ms: u64) -> String {
    (ms as f64 / 1000.0).to_string()
}

fn write_test_case<W: std::io::Write>(writer: &mut Writer<W>, run: &RunReport) -> Result<()> {
    let classname = run
        .script_path
        .as_deref()
        .unwrap_or(run.script_name.as_str())
        .replace(['/', '\\'], ".");

    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", run.script_name.as_str()));
    case_start.push_attribute(("classname", classname.as_str()));
    case_start.push_attribute(("time", seconds(run.total_duration_ms.unwrap_or(0)).as_str()));
    writer.write_event(Event::Start(case_start))?;

    match run.status {
        RunStatus::Failed { step } => {
            let (kind, message) = match run.steps.get(step).map(|s| &s.status) {
                Some(StepStatus::Failed { kind, error }) => (kind.to_string(), error.clone()),
                _ => ("execution".to_string(), "Unknown error".to_string()),
            };
            let mut fail_start = BytesStart::new("failure");
            fail_start.push_attribute(("message", message.as_str()));
            fail_start.push_attribute(("type", kind.as_str()));
            writer.write_event(Event::Start(fail_start))?;
            writer.write_event(Event::Text(BytesText::new(&format!("step {}: {}", step, message))))?;
            writer.write_event(Event::End(BytesEnd::new("failure")))?;
        }
        RunStatus::Cancelled => {
            let mut skip = BytesStart::new("skipped");
            skip.push_attribute(("message", "cancelled"));
            writer.write_event(Event::Empty(skip))?;
        }
        _ => {}
    }

    let teardown: Vec<String> = run
        .teardown_failures
        .iter()
        .map(|f| format!("could not close '{}': {}", f.name, f.error))
        .collect();
    if !teardown.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("system-err")))?;
        writer.write_event(Event::Text(BytesText::new(&teardown.join("\n"))))?;
        writer.write_event(Event::End(BytesEnd::new("system-err")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Write `junit.xml` into `output_dir`
pub fn write_report(results: &SessionResults, output_dir: &Path) -> Result<()> {
    let xml = generate_junit_xml(results)?;
    let path = output_dir.join("junit.xml");
    std::fs::write(&path, xml)?;
    println!("    Generated JUnit report: {}", path.display());
    Ok(())
}
