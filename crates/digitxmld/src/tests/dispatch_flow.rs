//! End-to-end request flows through the serve loop.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use rstest::{fixture, rstest};
use serde_json::Value;

use super::support::{RecordingHealthReporter, TestInstall};
use crate::dispatch::{ToolRouter, serve};
use crate::safety_harness::ConfigurableValidator;
use crate::session::WorkspaceContext;

struct Harness {
    install: TestInstall,
    router: ToolRouter,
    context: WorkspaceContext,
}

impl Harness {
    fn run(&mut self, lines: &[&str]) -> Vec<Value> {
        let input = Cursor::new(lines.join("\n").into_bytes());
        let mut output = Vec::new();
        serve(
            &self.router,
            &mut self.context,
            input,
            &mut output,
            &AtomicBool::new(false),
        )
        .expect("serve loop");
        String::from_utf8(output)
            .expect("utf8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("response is JSON"))
            .collect()
    }
}

#[fixture]
fn harness() -> Harness {
    let install = TestInstall::new();
    install.write_data("items.xml", "<items><item quant=\"5 10\"/><item quant=\"7\"/></items>");
    install.write_data("other.xml", "<other/>");
    let manager = install.manager(
        ConfigurableValidator::passing(),
        Arc::new(RecordingHealthReporter::default()),
    );
    Harness {
        install,
        router: ToolRouter::new(manager, Arc::new(AtomicBool::new(false))),
        context: WorkspaceContext::new(),
    }
}

const SPLIT_QUANT: &str = r#"{"language":"builtin","transform":"split-quant"}"#;

#[rstest]
fn session_tools_follow_the_active_document(mut harness: Harness) {
    let responses = harness.run(&[
        r#"{"tool":"get_current_file"}"#,
        r#"{"tool":"switch_xml_file","file":"items.xml"}"#,
        r#"{"tool":"get_current_file"}"#,
        r#"{"tool":"close_document"}"#,
        r#"{"tool":"get_current_file"}"#,
    ]);
    assert_eq!(responses.len(), 5);
    assert_eq!(responses[0]["success"], false);
    assert_eq!(responses[0]["error"]["kind"], "session_not_loaded");
    assert_eq!(responses[1]["success"], true);
    assert_eq!(responses[1]["result"]["root"], "items");
    assert_eq!(responses[2]["result"]["elements"], 3);
    assert_eq!(responses[3]["result"]["discarded_changes"], false);
    assert_eq!(responses[4]["error"]["kind"], "session_not_loaded");
}

#[rstest]
fn committed_transform_rewrites_the_file(mut harness: Harness) {
    let request = format!(
        r#"{{"tool":"apply_transformation","file":"items.xml","script":{SPLIT_QUANT},"description":"split quant"}}"#
    );
    let responses = harness.run(&[&request]);
    assert_eq!(responses[0]["success"], true, "{:?}", responses[0]);
    assert_eq!(responses[0]["result"]["outcome"], "committed");
    assert!(responses[0]["result"]["backup"].is_object());
    let written = harness.install.read_data("items.xml");
    assert!(written.contains(r#"quantMin="5" quantMax="10""#), "{written}");
    assert!(written.contains(r#"<item quantMin="7"/>"#), "{written}");
}

#[rstest]
fn active_document_commits_refresh_the_session(mut harness: Harness) {
    let responses = harness.run(&[
        r#"{"tool":"switch_xml_file","file":"items.xml"}"#,
        r#"{"tool":"get_structure_summary"}"#,
    ]);
    assert_eq!(responses[1]["result"]["root"], "items");
    assert_eq!(responses[1]["result"]["total_elements"], 3);

    let before = harness.install.read_data("items.xml");
    let request = format!(r#"{{"tool":"apply_transformation","script":{SPLIT_QUANT},"validate":false}}"#);
    let responses = harness.run(&[&request, r#"{"tool":"get_current_file"}"#]);
    assert_eq!(responses[0]["result"]["outcome"], "committed");
    assert_eq!(responses[1]["result"]["dirty"], false);
    assert_ne!(harness.install.read_data("items.xml"), before);
}

#[rstest]
fn malformed_lines_do_not_stop_the_loop(mut harness: Harness) {
    let responses = harness.run(&[
        "{ not json",
        "",
        r#"{"tool":"no_such_tool"}"#,
        r#"{"tool":"list_workspace_files"}"#,
    ]);
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["error"]["kind"], "malformed_request");
    assert_eq!(responses[1]["success"], false);
    assert_eq!(responses[2]["result"]["count"], 2);
}

#[rstest]
fn batches_report_each_item_in_order(mut harness: Harness) {
    let request = format!(
        r#"{{"tool":"batch_corrections","policy":"continue_and_collect","items":[{{"file":"items.xml","script":{SPLIT_QUANT}}},{{"file":"missing.xml","script":{SPLIT_QUANT}}},{{"file":"other.xml","script":{SPLIT_QUANT}}}]}}"#
    );
    let responses = harness.run(&[&request]);
    let result = &responses[0]["result"];
    let statuses: Vec<&str> = result["outcomes"]
        .as_array()
        .expect("outcomes array")
        .iter()
        .map(|outcome| outcome["status"].as_str().expect("status"))
        .collect();
    assert_eq!(statuses, ["committed", "failed", "committed"]);
    assert_eq!(result["summary"]["failed"], 1);
}

#[rstest]
fn query_scripts_cannot_be_committed(mut harness: Harness) {
    let responses = harness.run(&[
        r#"{"tool":"apply_transformation","file":"items.xml","script":{"language":"xpath","expression":"//item"}}"#,
    ]);
    assert_eq!(responses[0]["error"]["kind"], "invalid_request");
}
