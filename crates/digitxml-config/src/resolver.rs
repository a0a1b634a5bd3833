//! Maps logical workspace paths onto the filesystem.
//!
//! Every logical path is anchored at the installation root, never at the
//! process working directory. Resolution is lexical: `.` and `..` components
//! are folded without touching the filesystem, so two processes started from
//! different directories agree on every resolved path.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use glob::Pattern;
use thiserror::Error;
use tracing::warn;

use crate::Config;
use crate::defaults::DEFAULT_DISCOVERY_PATTERN;

const RESOLVER_TARGET: &str = "digitxml_config::resolver";

/// Errors raised while resolving or discovering workspace paths.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The installation root was not an absolute path.
    #[error("installation root '{root}' must be absolute")]
    RelativeRoot {
        /// Offending root.
        root: Utf8PathBuf,
    },
    /// Resolution produced no existing file where one was required.
    #[error("path not found: {path}")]
    PathNotFound {
        /// The path as requested by the caller.
        path: String,
    },
    /// The discovery pattern could not be compiled.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Pattern supplied by the caller.
        pattern: String,
        /// Description of the problem.
        message: String,
    },
}

/// Resolves configured logical paths relative to an installation root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceResolver {
    root: Utf8PathBuf,
    data_path: Utf8PathBuf,
    schema_path: Option<Utf8PathBuf>,
    backup_dir: Utf8PathBuf,
    log_dir: Utf8PathBuf,
    default_file: Option<Utf8PathBuf>,
}

impl WorkspaceResolver {
    /// Builds a resolver for `config` anchored at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::RelativeRoot`] unless `root` is absolute.
    pub fn new(root: impl Into<Utf8PathBuf>, config: &Config) -> Result<Self, ResolveError> {
        let root = root.into();
        if !root.is_absolute() {
            return Err(ResolveError::RelativeRoot { root });
        }
        let root = normalize(&root);
        let anchor = |logical: &Utf8Path| anchor_at(&root, logical);
        Ok(Self {
            data_path: anchor(config.xml_data_path()),
            schema_path: config.xml_schema_path().map(anchor),
            backup_dir: anchor(config.backup_dir()),
            log_dir: anchor(config.log_dir()),
            default_file: config.default_file().map(anchor),
            root,
        })
    }

    /// The installation root every logical path is anchored at.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Resolves a logical path. Absolute inputs are accepted as-is.
    #[must_use]
    pub fn resolve(&self, logical: &Utf8Path) -> Utf8PathBuf {
        anchor_at(&self.root, logical)
    }

    /// Resolves a logical path and requires the result to exist.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::PathNotFound`] when nothing exists there.
    pub fn resolve_existing(&self, logical: &Utf8Path) -> Result<Utf8PathBuf, ResolveError> {
        let resolved = self.resolve(logical);
        if resolved.exists() {
            Ok(resolved)
        } else {
            Err(ResolveError::PathNotFound {
                path: logical.to_string(),
            })
        }
    }

    /// Directory holding the workspace documents.
    ///
    /// When the configured data path names a file (it carries an extension),
    /// its parent directory is the data root.
    #[must_use]
    pub fn data_root(&self) -> &Utf8Path {
        if self.data_path.extension().is_some() {
            self.data_path.parent().unwrap_or(&self.root)
        } else {
            &self.data_path
        }
    }

    /// Document opened at start-up: the configured default file, else the
    /// data path itself when it names a file.
    #[must_use]
    pub fn default_document(&self) -> Option<&Utf8Path> {
        self.default_file.as_deref().or_else(|| {
            self.data_path
                .extension()
                .is_some()
                .then_some(self.data_path.as_path())
        })
    }

    /// Resolved schema location, if validation is configured.
    #[must_use]
    pub fn schema_path(&self) -> Option<&Utf8Path> {
        self.schema_path.as_deref()
    }

    /// Resolved backup directory.
    #[must_use]
    pub fn backup_dir(&self) -> &Utf8Path {
        &self.backup_dir
    }

    /// Resolved log directory.
    #[must_use]
    pub fn log_dir(&self) -> &Utf8Path {
        &self.log_dir
    }

    /// Locates a document requested by an operator.
    ///
    /// Relative requests are tried against the data root first and then the
    /// installation root.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::PathNotFound`] when no candidate exists.
    pub fn locate(&self, requested: &str) -> Result<Utf8PathBuf, ResolveError> {
        let requested_path = Utf8Path::new(requested);
        let candidates = if requested_path.is_absolute() {
            vec![normalize(requested_path)]
        } else {
            vec![
                anchor_at(self.data_root(), requested_path),
                anchor_at(&self.root, requested_path),
            ]
        };
        candidates
            .into_iter()
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ResolveError::PathNotFound {
                path: requested.to_owned(),
            })
    }

    /// Lists files matching `pattern`, relative to the data root.
    ///
    /// The result is sorted lexicographically and contains regular files
    /// only; calling again re-runs the discovery from scratch. The data root
    /// is matched literally. Entries that cannot be read are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidPattern`] when the glob is malformed.
    pub fn discover(&self, pattern: Option<&str>) -> Result<Vec<Utf8PathBuf>, ResolveError> {
        let pattern = pattern
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or(DEFAULT_DISCOVERY_PATTERN);
        let escaped_root = Pattern::escape(self.data_root().as_str());
        let anchored = anchor_at(Utf8Path::new(&escaped_root), Utf8Path::new(pattern));
        let entries = glob::glob(anchored.as_str()).map_err(|error| {
            ResolveError::InvalidPattern {
                pattern: pattern.to_owned(),
                message: error.to_string(),
            }
        })?;

        let mut found = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => match Utf8PathBuf::from_path_buf(path) {
                    Ok(path) => found.push(path),
                    Err(path) => warn!(
                        target: RESOLVER_TARGET,
                        path = %path.display(),
                        "skipping non-UTF-8 path during discovery"
                    ),
                },
                Ok(_) => {}
                Err(error) => warn!(
                    target: RESOLVER_TARGET,
                    path = %error.path().display(),
                    error = %error.error(),
                    "skipping unreadable path during discovery"
                ),
            }
        }
        found.sort();
        found.dedup();
        Ok(found)
    }
}

/// Returns true when `raw` contains glob metacharacters.
#[must_use]
pub fn is_pattern(raw: &str) -> bool {
    raw.contains(['*', '?', '['])
}

fn anchor_at(base: &Utf8Path, logical: &Utf8Path) -> Utf8PathBuf {
    if logical.is_absolute() {
        normalize(logical)
    } else {
        normalize(&base.join(logical))
    }
}

/// Folds `.` and `..` components lexically.
fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut normalized = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                let popped = matches!(
                    normalized.components().next_back(),
                    Some(Utf8Component::Normal(_))
                ) && normalized.pop();
                if !popped && !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_str()),
        }
    }
    normalized
}
