//! Behavioural tests for the daemon bootstrap sequence.

use std::cell::RefCell;
use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::support::{HealthEvent, RecordingHealthReporter, TestInstall};
use crate::bootstrap::{BootstrapError, Daemon, FileConfigLoader, bootstrap_with};

/// Scenario world for bootstrap scenarios.
pub struct BootstrapWorld {
    install: TestInstall,
    reporter: Arc<RecordingHealthReporter>,
    result: Option<Result<Daemon, BootstrapError>>,
}

impl BootstrapWorld {
    fn new() -> Self {
        Self {
            install: TestInstall::new(),
            reporter: Arc::new(RecordingHealthReporter::default()),
            result: None,
        }
    }

    fn write_config(&self, extra: &str) {
        self.install.write_root(
            "config.json",
            &format!("{{\"log_filter\": \"off\"{extra}}}"),
        );
    }

    fn daemon(&self) -> &Daemon {
        match self.result.as_ref().expect("bootstrap has run") {
            Ok(daemon) => daemon,
            Err(error) => panic!("bootstrap failed: {error}"),
        }
    }

    fn event_names(&self) -> Vec<&'static str> {
        self.reporter
            .events()
            .iter()
            .map(|event| match event {
                HealthEvent::BootstrapStarting => "starting",
                HealthEvent::BootstrapSucceeded => "succeeded",
                HealthEvent::BootstrapFailed(_) => "failed",
                HealthEvent::SessionLoaded(_) => "session_loaded",
                HealthEvent::BackupFellBack(_) => "backup_fell_back",
            })
            .collect()
    }
}

#[fixture]
fn world() -> RefCell<BootstrapWorld> {
    RefCell::new(BootstrapWorld::new())
}

// ---- Given steps ----

#[given("an installation without a start-up document")]
fn given_plain_install(world: &RefCell<BootstrapWorld>) {
    world.borrow().write_config("");
}

#[given("an installation whose start-up document is {name}")]
fn given_startup_document(world: &RefCell<BootstrapWorld>, name: String) {
    let world = world.borrow();
    let name = name.trim_matches('"');
    world.install.write_data(name, "<recipes><recipe/></recipes>");
    world.write_config(&format!(", \"default_file\": \"data/{name}\""));
}

#[given("an installation whose start-up document {name} does not exist")]
fn given_missing_startup_document(world: &RefCell<BootstrapWorld>, name: String) {
    let name = name.trim_matches('"');
    world
        .borrow()
        .write_config(&format!(", \"default_file\": \"data/{name}\""));
}

#[given("an installation with a malformed configuration file")]
fn given_malformed_config(world: &RefCell<BootstrapWorld>) {
    world.borrow().install.write_root("config.json", "{ not json");
}

// ---- When steps ----

#[when("the daemon bootstrap runs")]
fn when_bootstrap_runs(world: &RefCell<BootstrapWorld>) {
    let mut world = world.borrow_mut();
    let loader = FileConfigLoader::new(world.install.root().to_path_buf(), "config.json");
    let result = bootstrap_with(&loader, world.install.root(), world.reporter.clone());
    world.result = Some(result);
}

// ---- Then steps ----

#[then("bootstrap succeeds")]
fn then_bootstrap_succeeds(world: &RefCell<BootstrapWorld>) {
    let world = world.borrow();
    assert_eq!(world.daemon().config().log_filter(), "off");
}

#[then("bootstrap fails")]
fn then_bootstrap_fails(world: &RefCell<BootstrapWorld>) {
    let world = world.borrow();
    assert!(
        matches!(
            world.result,
            Some(Err(BootstrapError::Configuration { .. }))
        ),
        "bootstrap should fail on configuration"
    );
}

#[then("the reported events are {expected}")]
fn then_events(world: &RefCell<BootstrapWorld>, expected: String) {
    let expected: Vec<&str> = expected
        .trim_matches('"')
        .split(',')
        .map(str::trim)
        .collect();
    assert_eq!(world.borrow().event_names(), expected);
}

#[then("no document is active")]
fn then_no_document(world: &RefCell<BootstrapWorld>) {
    let world = world.borrow();
    assert!(world.daemon().context().session().is_none());
}

#[then("the active document is {name}")]
fn then_active_document(world: &RefCell<BootstrapWorld>, name: String) {
    let world = world.borrow();
    let session = world
        .daemon()
        .context()
        .session()
        .expect("a document is active");
    assert_eq!(
        session.source_path(),
        world.install.data_path(name.trim_matches('"'))
    );
}

#[scenario(path = "tests/features/bootstrap.feature")]
fn bootstrap(#[from(world)] _: RefCell<BootstrapWorld>) {}
