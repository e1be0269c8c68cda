use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

use super::types::{ReplayResults, StepOutcome};

/// Generate JUnit XML with one testcase per replayed action
pub fn generate_junit_xml(results: &ReplayResults) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let tests = results.total.to_string();
    let failures = results.failed().to_string();
    let skipped = results.skipped().to_string();
    let time = seconds(results.duration_ms.unwrap_or(0));

    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "lumi-recorder-replay"));
    suites_start.push_attribute(("tests", tests.as_str()));
    suites_start.push_attribute(("failures", failures.as_str()));
    suites_start.push_attribute(("skipped", skipped.as_str()));
    suites_start.push_attribute(("time", time.as_str()));
    writer.write_event(Event::Start(suites_start))?;

    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", results.recording_name.as_str()));
    suite_start.push_attribute(("tests", tests.as_str()));
    suite_start.push_attribute(("failures", failures.as_str()));
    suite_start.push_attribute(("skipped", skipped.as_str()));
    if let Some(id) = &results.recording_id {
        suite_start.push_attribute(("id", id.as_str()));
    }
    suite_start.push_attribute(("time", time.as_str()));
    suite_start.push_attribute(("timestamp", results.generated_at.as_str()));
    writer.write_event(Event::Start(suite_start))?;

    for index in 0..results.total {
        write_test_case(&mut writer, results, index)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let xml = String::from_utf8(writer.into_inner().into_inner())?;
    Ok(xml)
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    results: &ReplayResults,
    index: usize,
) -> Result<()> {
    let name = match results.actions.get(index) {
        Some(action) => format!("{}. {}", index + 1, action.describe()),
        None => format!("{}.", index + 1),
    };
    let classname = format!("replay.{}", results.recording_name.replace(' ', "_"));

    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", name.as_str()));
    case_start.push_attribute(("classname", classname.as_str()));
    writer.write_event(Event::Start(case_start))?;

    match results.outcome(index) {
        StepOutcome::Failed => {
            let message = results
                .error_for(index)
                .map(|e| e.message.as_str())
                .unwrap_or("Unknown error");
            let mut fail_start = BytesStart::new("failure");
            fail_start.push_attribute(("message", message));
            fail_start.push_attribute(("type", "ReplayError"));
            writer.write_event(Event::Start(fail_start))?;
            writer.write_event(Event::Text(BytesText::new(message)))?;
            writer.write_event(Event::End(BytesEnd::new("failure")))?;
        }
        StepOutcome::Skipped => {
            let mut skip = BytesStart::new("skipped");
            skip.push_attribute(("message", "replay stopped"));
            writer.write_event(Event::Empty(skip))?;
        }
        StepOutcome::Passed => {}
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

fn seconds(ms: u64) -> String {
    (ms as f64 / 1000.0).to_string()
}

/// Write report to file
pub fn write_report(results: &ReplayResults, output_dir: &Path) -> Result<()> {
    let xml = generate_junit_xml(results)?;
    let path = output_dir.join("junit.xml");
    std::fs::write(&path, xml)?;
    println!("    Generated JUnit report: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;
    use crate::replayer::StepError;

    #[test]
    fn test_generate_junit_xml() {
        let actions = vec![
            Action::click("#submit-btn", 1),
            Action::click("#missing", 2),
            Action::scroll("html", 0.0, 300.0, 3),
        ];
        let results = ReplayResults {
            recording_id: Some("1714552200000".to_string()),
            recording_name: "checkout".to_string(),
            total: 3,
            cursor: 2,
            cancelled: true,
            errors: vec![StepError {
                index: 1,
                message: "element not found: #missing".to_string(),
                action: actions[1].clone(),
            }],
            actions,
            duration_ms: Some(1600),
            generated_at: "2024-05-01 08:30:00".to_string(),
        };

        let xml = generate_junit_xml(&results).expect("Failed to generate XML");

        assert!(xml.contains(r#"<testsuites name="lumi-recorder-replay""#));
        assert!(xml.contains(r#"tests="3""#));
        assert!(xml.contains(r#"failures="1""#));
        assert!(xml.contains(r#"skipped="1""#));
        assert!(xml.contains(r#"<testcase name="1. click: #submit-btn""#));
        assert!(xml.contains(r#"message="element not found: #missing""#));
        assert!(xml.contains(r#"<skipped message="replay stopped"/>"#));
    }
}
