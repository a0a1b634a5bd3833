//! Temporary installation root with a data directory and a schema stub.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use digitxml_config::{Config, WorkspaceResolver};
use digitxml_engine::ToolchainEngine;
use tempfile::TempDir;

use crate::health::HealthReporter;
use crate::safety_harness::{
    ApplyPipeline, BackupStore, ConfigurableValidator, MonotonicClock, TransformationExecutor,
    ValidationGate,
};
use crate::workspace::WorkspaceManager;

/// Installation root laid out like a deployed daemon.
pub struct TestInstall {
    _dir: TempDir,
    root: Utf8PathBuf,
    config: Config,
}

impl TestInstall {
    /// Creates an installation with an empty `data` directory and a
    /// `schema.rnc` that the test validators never read.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        fs::create_dir_all(root.join("data")).expect("create data dir");
        fs::write(root.join("schema.rnc"), "start = element * { any }").expect("write schema");
        Self {
            _dir: dir,
            root,
            config: Config::default().with_xml_schema_path("schema.rnc"),
        }
    }

    /// Installation root.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Absolute path of a data file.
    pub fn data_path(&self, name: &str) -> Utf8PathBuf {
        self.root.join("data").join(name)
    }

    /// Writes a data file.
    pub fn write_data(&self, name: &str, content: &str) {
        let path = self.data_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create data parent");
        }
        fs::write(path, content).expect("write data file");
    }

    /// Reads a data file.
    pub fn read_data(&self, name: &str) -> String {
        fs::read_to_string(self.data_path(name)).expect("read data file")
    }

    /// Writes a file relative to the installation root.
    pub fn write_root(&self, name: &str, content: &str) {
        fs::write(self.root.join(name), content).expect("write root file");
    }

    /// Points the backup directory beneath a regular file so it can never
    /// be created.
    pub fn block_backup_dir(&mut self) {
        fs::write(self.root.join("blocker"), "").expect("write blocker");
        self.config = self.config.clone().with_backup_dir("blocker/backups");
    }

    /// Builds a manager that runs built-in transforms natively and
    /// validates with `validator`.
    pub fn manager(
        &self,
        validator: ConfigurableValidator,
        reporter: Arc<dyn HealthReporter>,
    ) -> WorkspaceManager {
        let resolver = WorkspaceResolver::new(self.root.clone(), &self.config).expect("resolver");
        let clock = Arc::new(MonotonicClock::default());
        let pipeline = ApplyPipeline::new(
            BackupStore::new(resolver.backup_dir().to_path_buf(), Arc::clone(&clock)),
            ValidationGate::new(
                Arc::new(validator),
                resolver.schema_path().map(Utf8Path::to_path_buf),
            ),
            TransformationExecutor::new(Arc::new(ToolchainEngine::new(
                self.config.toolchain().clone(),
            ))),
            clock,
        )
        .with_unavailable_policy(self.config.unavailable_validator());
        WorkspaceManager::new(resolver, pipeline)
            .with_lock_timeout(Some(Duration::from_secs(5)))
            .with_reporter(reporter)
    }
}
