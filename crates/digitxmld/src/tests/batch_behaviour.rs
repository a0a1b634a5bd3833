//! Behavioural tests for batch corrections.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8PathBuf;
use digitxml_engine::{BuiltinTransform, Element, Node, Script, XmlDocument};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::support::{RecordingHealthReporter, TestInstall};
use crate::safety_harness::{
    BatchItem, BatchPolicy, BatchReport, ConfigurableValidator, CorrectionBatch,
    CorrectionOutcome,
};
use crate::session::WorkspaceContext;

/// Scenario world for batch scenarios.
pub struct BatchWorld {
    install: TestInstall,
    validator: ConfigurableValidator,
    targets: Vec<Utf8PathBuf>,
    originals: HashMap<String, String>,
    context: WorkspaceContext,
    cancel: AtomicBool,
    report: Option<BatchReport>,
}

impl BatchWorld {
    fn new() -> Self {
        Self {
            install: TestInstall::new(),
            validator: ConfigurableValidator::passing(),
            targets: Vec::new(),
            originals: HashMap::new(),
            context: WorkspaceContext::new(),
            cancel: AtomicBool::new(false),
            report: None,
        }
    }

    fn seed(&mut self, name: &str, root: Element) {
        let text = XmlDocument::new(root).to_xml_string();
        self.install.write_data(name, &text);
        self.originals.insert(name.to_owned(), text);
        self.targets.push(self.install.data_path(name));
    }

    fn run(&mut self, policy: BatchPolicy) {
        let validator = std::mem::replace(&mut self.validator, ConfigurableValidator::passing());
        let manager = self
            .install
            .manager(validator, Arc::new(RecordingHealthReporter::default()));
        let items = self
            .targets
            .iter()
            .map(|target| BatchItem {
                target: target.clone(),
                script: Script::Builtin {
                    transform: BuiltinTransform::SplitQuant,
                },
            })
            .collect();
        let batch = CorrectionBatch::new(items, policy);
        self.report = Some(manager.batch(&mut self.context, &batch, &self.cancel));
    }

    fn report(&self) -> &BatchReport {
        self.report.as_ref().expect("the batch has run")
    }

    fn active_item(&self) -> Element {
        self.context
            .current()
            .expect("an active document")
            .tree()
            .root()
            .child_elements()
            .next()
            .cloned()
            .expect("active document has an item")
    }
}

const fn status(outcome: &CorrectionOutcome) -> &'static str {
    match outcome {
        CorrectionOutcome::Committed { .. } => "committed",
        CorrectionOutcome::SkippedInvalid { .. } => "skipped_invalid",
        CorrectionOutcome::Failed { .. } => "failed",
    }
}

fn assert_not_attempted(world: &RefCell<BatchWorld>, count: &str) {
    let expected: usize = count.parse().expect("numeric count");
    assert_eq!(world.borrow().report().summary.not_attempted, expected);
}

#[fixture]
fn world() -> RefCell<BatchWorld> {
    RefCell::new(BatchWorld::new())
}

// ---- Given steps ----

#[given("a batch target {name} with an item whose quant is {value}")]
fn given_quant_target(world: &RefCell<BatchWorld>, name: String, value: String) {
    let item = Element::new("item").with_attribute("quant", value.trim_matches('"'));
    world
        .borrow_mut()
        .seed(name.trim_matches('"'), Element::new("items").with_child(Node::Element(item)));
}

#[given("a batch target {name} containing a {element} element")]
fn given_marked_target(world: &RefCell<BatchWorld>, name: String, element: String) {
    let root = Element::new("items")
        .with_child(Node::Element(Element::new("item").with_attribute("quant", "1 2")))
        .with_child(Node::Element(Element::new(element.trim_matches('"'))));
    world.borrow_mut().seed(name.trim_matches('"'), root);
}

#[given("batch validation rejects documents containing {element}")]
fn given_batch_validator(world: &RefCell<BatchWorld>, element: String) {
    world.borrow_mut().validator = ConfigurableValidator::rejecting_element(element.trim_matches('"'));
}

#[given("the batch also targets the missing document {name}")]
fn given_missing_target(world: &RefCell<BatchWorld>, name: String) {
    let mut world = world.borrow_mut();
    let path = world.install.data_path(name.trim_matches('"'));
    world.targets.push(path);
}

#[given("the batch has been cancelled")]
fn given_cancelled(world: &RefCell<BatchWorld>) {
    world.borrow().cancel.store(true, Ordering::SeqCst);
}

#[given("batch target {name} is the active document")]
fn given_active_document(world: &RefCell<BatchWorld>, name: String) {
    let mut world = world.borrow_mut();
    let manager = world.install.manager(
        ConfigurableValidator::passing(),
        Arc::new(RecordingHealthReporter::default()),
    );
    manager
        .load_or_switch(&mut world.context, name.trim_matches('"'))
        .expect("switch to document");
}

// ---- When steps ----

#[when("the batch runs under the {policy} policy")]
fn when_batch_runs(world: &RefCell<BatchWorld>, policy: String) {
    let policy: BatchPolicy = policy.trim_matches('"').parse().expect("known policy");
    world.borrow_mut().run(policy);
}

// ---- Then steps ----

#[then("the batch reports outcomes {expected}")]
fn then_outcomes(world: &RefCell<BatchWorld>, expected: String) {
    let world = world.borrow();
    let report = world.report();
    let actual: Vec<&str> = report.outcomes.iter().map(status).collect();
    let expected: Vec<&str> = expected
        .trim_matches('"')
        .split(',')
        .map(str::trim)
        .filter(|status| !status.is_empty())
        .collect();
    assert_eq!(actual, expected);
    for (outcome, target) in report.outcomes.iter().zip(&world.targets) {
        assert_eq!(outcome.target(), target, "outcomes follow input order");
    }
}

#[then("{count} item was not attempted")]
fn then_one_not_attempted(world: &RefCell<BatchWorld>, count: String) {
    assert_not_attempted(world, &count);
}

#[then("{count} items were not attempted")]
fn then_many_not_attempted(world: &RefCell<BatchWorld>, count: String) {
    assert_not_attempted(world, &count);
}

#[then("batch target {name} keeps its original bytes")]
fn then_target_unchanged(world: &RefCell<BatchWorld>, name: String) {
    let world = world.borrow();
    let name = name.trim_matches('"');
    assert_eq!(
        Some(&world.install.read_data(name)),
        world.originals.get(name)
    );
}

#[then("the failed item has kind {kind}")]
fn then_failed_kind(world: &RefCell<BatchWorld>, kind: String) {
    let world = world.borrow();
    let failed = world
        .report()
        .outcomes
        .iter()
        .find_map(|outcome| match outcome {
            CorrectionOutcome::Failed { kind, .. } => Some(kind.clone()),
            _ => None,
        })
        .expect("a failed outcome");
    assert_eq!(failed, kind.trim_matches('"'));
}

#[then("the batch is marked cancelled")]
fn then_cancelled(world: &RefCell<BatchWorld>) {
    assert!(world.borrow().report().summary.cancelled);
}

#[then("the active document has an item with attribute {name}")]
fn then_active_item_attribute(world: &RefCell<BatchWorld>, name: String) {
    let item = world.borrow().active_item();
    assert!(item.attribute(name.trim_matches('"')).is_some(), "{item:?}");
}

#[then("the active document has no uncommitted changes")]
fn then_active_clean(world: &RefCell<BatchWorld>) {
    let world = world.borrow();
    assert!(!world.context.current().expect("active document").is_dirty());
}

#[scenario(path = "tests/features/batch.feature")]
fn batch(#[from(world)] _: RefCell<BatchWorld>) {}
