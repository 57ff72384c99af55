//! Filesystem-backed experiment registry.
//!
//! Every experiment is a directory under the runs root:
//!
//! ```text
//! <root>/<name>/
//!     train/
//!     inference/
//!     train_config.json
//!     inference_config.json
//! ```
//!
//! Documents are written once. `create` stages the whole layout in a hidden
//! sibling directory and renames it into place, so an experiment either exists
//! completely or not at all.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::documents::{
    INFERENCE_CONFIG_FILE, InferenceConfig, TRAIN_CONFIG_FILE, TrainingConfig, to_document_bytes,
};
use crate::error::{Result, ValidationError, WizardError};

/// Token that leaves a name prompt; it can never be an experiment name.
pub const EXIT_TOKEN: &str = "E";

/// Paths belonging to one experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentLayout {
    dir: PathBuf,
}

impl ExperimentLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn train_dir(&self) -> PathBuf {
        self.dir.join("train")
    }

    pub fn inference_dir(&self) -> PathBuf {
        self.dir.join("inference")
    }

    pub fn train_config_path(&self) -> PathBuf {
        self.dir.join(TRAIN_CONFIG_FILE)
    }

    pub fn inference_config_path(&self) -> PathBuf {
        self.dir.join(INFERENCE_CONFIG_FILE)
    }
}

/// Outcome of a delete request that passed the existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Declined,
}

/// Registry of experiments under one root directory.
#[derive(Debug, Clone)]
pub struct ExperimentStore {
    root: PathBuf,
}

impl ExperimentStore {
    /// Open the store, creating the root directory if it does not exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            info!(root = %root.display(), "Creating experiments root");
        }
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all experiments, excluding hidden (dot-prefixed) entries.
    pub fn list(&self) -> Result<BTreeSet<String>> {
        std::fs::create_dir_all(&self.root)?;
        let mut names = BTreeSet::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.insert(name);
            }
        }
        Ok(names)
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.root.join(name).exists()
    }

    /// Layout of a (possibly not yet existing) experiment.
    pub fn layout(&self, name: &str) -> ExperimentLayout {
        ExperimentLayout::new(self.root.join(name))
    }

    /// Layout of an existing experiment.
    pub fn resolve(&self, name: &str) -> Result<ExperimentLayout> {
        validate_name(name)?;
        if !self.exists(name) {
            return Err(WizardError::NotFound {
                name: name.to_string(),
            });
        }
        Ok(self.layout(name))
    }

    /// Fail with `AlreadyExists` if `name` is taken.
    pub fn ensure_available(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        if self.root.join(name).exists() {
            return Err(WizardError::AlreadyExists {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Materialize a new experiment with its two documents.
    pub fn create(
        &self,
        name: &str,
        training: &TrainingConfig,
        inference: &InferenceConfig,
    ) -> Result<ExperimentLayout> {
        self.ensure_available(name)?;
        let train_bytes = to_document_bytes(training)?;
        let inference_bytes = to_document_bytes(inference)?;

        let staging = ExperimentLayout::new(self.root.join(staging_dir_name(name)));
        if staging.dir().exists() {
            std::fs::remove_dir_all(staging.dir())?;
        }
        let staged = (|| -> std::io::Result<()> {
            std::fs::create_dir_all(staging.train_dir())?;
            std::fs::create_dir_all(staging.inference_dir())?;
            std::fs::write(staging.train_config_path(), &train_bytes)?;
            std::fs::write(staging.inference_config_path(), &inference_bytes)?;
            Ok(())
        })();
        if let Err(e) = staged {
            if let Err(cleanup) = std::fs::remove_dir_all(staging.dir()) {
                warn!(error = %cleanup, "Failed to remove staging directory");
            }
            return Err(e.into());
        }

        let layout = self.layout(name);
        std::fs::rename(staging.dir(), layout.dir())?;
        info!(experiment = name, dir = %layout.dir().display(), "Experiment created");
        Ok(layout)
    }

    /// Remove an experiment and everything under it.
    ///
    /// `confirm` is asked only after the existence check; anything but `true`
    /// leaves the store untouched.
    pub fn delete<F>(&self, name: &str, confirm: F) -> Result<DeleteOutcome>
    where
        F: FnOnce(&str) -> Result<bool>,
    {
        let layout = self.resolve(name)?;
        if !confirm(name)? {
            debug!(experiment = name, "Deletion declined");
            return Ok(DeleteOutcome::Declined);
        }
        std::fs::remove_dir_all(layout.dir())?;
        info!(experiment = name, "Experiment deleted");
        Ok(DeleteOutcome::Deleted)
    }
}

/// Longest single path component most filesystems accept, in bytes.
const MAX_COMPONENT_BYTES: usize = 255;

fn staging_dir_name(name: &str) -> String {
    format!(".{name}.staging")
}

/// Experiment names are a single visible path segment.
pub fn validate_name(name: &str) -> std::result::Result<(), ValidationError> {
    let reject = |reason: &str| {
        Err(ValidationError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };
    if name.trim().is_empty() {
        return reject("name is empty");
    }
    if name != name.trim() {
        return reject("name has leading or trailing whitespace");
    }
    if name.starts_with('.') {
        return reject("name starts with '.'");
    }
    if name.contains(['/', '\\']) {
        return reject("name contains a path separator");
    }
    if name == EXIT_TOKEN {
        return reject("name is reserved");
    }
    if staging_dir_name(name).len() > MAX_COMPONENT_BYTES {
        return reject("name is too long");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{CollectedInputs, generate};
    use tempfile::TempDir;

    fn documents(store: &ExperimentStore, name: &str) -> (TrainingConfig, InferenceConfig) {
        generate(&store.layout(name), &CollectedInputs::new("sample.rec"))
    }

    #[test]
    fn test_open_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("runs");
        let store = ExperimentStore::open(&root).unwrap();
        assert!(root.is_dir());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_skips_hidden_entries() {
        let dir = TempDir::new().unwrap();
        let store = ExperimentStore::open(dir.path()).unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::create_dir(dir.path().join(".cache")).unwrap();
        std::fs::write(dir.path().join(".DS_Store"), "").unwrap();
        let names: Vec<_> = store.list().unwrap().into_iter().collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_create_then_exists() {
        let dir = TempDir::new().unwrap();
        let store = ExperimentStore::open(dir.path()).unwrap();
        let (train, inference) = documents(&store, "e1");
        let layout = store.create("e1", &train, &inference).unwrap();

        assert!(store.exists("e1"));
        assert!(layout.train_dir().is_dir());
        assert!(layout.inference_dir().is_dir());
        assert!(layout.train_config_path().is_file());
        assert!(layout.inference_config_path().is_file());
        // no staging leftovers
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_create_existing_is_already_exists() {
        let dir = TempDir::new().unwrap();
        let store = ExperimentStore::open(dir.path()).unwrap();
        let (train, inference) = documents(&store, "e1");
        store.create("e1", &train, &inference).unwrap();
        let before = std::fs::read(store.layout("e1").train_config_path()).unwrap();

        let err = store.create("e1", &train, &inference).unwrap_err();
        assert!(matches!(err, WizardError::AlreadyExists { .. }));
        let after = std::fs::read(store.layout("e1").train_config_path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_delete_confirmed_removes_tree() {
        let dir = TempDir::new().unwrap();
        let store = ExperimentStore::open(dir.path()).unwrap();
        let (train, inference) = documents(&store, "e1");
        let layout = store.create("e1", &train, &inference).unwrap();
        std::fs::write(layout.train_dir().join("ckpt.pt"), "weights").unwrap();

        let outcome = store.delete("e1", |_| Ok(true)).unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert!(!store.exists("e1"));
        assert!(!layout.dir().exists());
    }

    #[test]
    fn test_delete_declined_keeps_tree() {
        let dir = TempDir::new().unwrap();
        let store = ExperimentStore::open(dir.path()).unwrap();
        let (train, inference) = documents(&store, "e1");
        store.create("e1", &train, &inference).unwrap();

        let outcome = store.delete("e1", |_| Ok(false)).unwrap();
        assert_eq!(outcome, DeleteOutcome::Declined);
        assert!(store.exists("e1"));
    }

    #[test]
    fn test_delete_missing_is_not_found_and_never_confirms() {
        let dir = TempDir::new().unwrap();
        let store = ExperimentStore::open(dir.path()).unwrap();
        std::fs::create_dir(dir.path().join("keep")).unwrap();

        let err = store
            .delete("ghost", |_| panic!("confirmation must not be requested"))
            .unwrap_err();
        assert!(matches!(err, WizardError::NotFound { .. }));
        let names: Vec<_> = store.list().unwrap().into_iter().collect();
        assert_eq!(names, ["keep"]);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("e1").is_ok());
        assert!(validate_name("run 2024-05").is_ok());
        for bad in ["", "  ", ".hidden", "a/b", "..", "E", " e1"] {
            assert!(validate_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_validate_name_length_leaves_room_for_staging() {
        let longest = "a".repeat(MAX_COMPONENT_BYTES - ".".len() - ".staging".len());
        assert!(validate_name(&longest).is_ok());
        let err = validate_name(&format!("{longest}a")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidName { .. }));
        // multi-byte characters count by their encoded length
        assert!(validate_name(&"é".repeat(124)).is_err());
    }

    #[test]
    fn test_create_with_longest_name() {
        let dir = TempDir::new().unwrap();
        let store = ExperimentStore::open(dir.path()).unwrap();
        let name = "a".repeat(MAX_COMPONENT_BYTES - ".".len() - ".staging".len());
        let (training, inference) = documents(&store, &name);
        store.create(&name, &training, &inference).unwrap();
        assert_eq!(store.list().unwrap().into_iter().collect::<Vec<_>>(), [name]);
    }

    #[test]
    fn test_exists_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = ExperimentStore::open(dir.path().join("runs")).unwrap();
        assert!(!store.exists(".."));
        assert!(!store.exists("../runs"));
    }
}
