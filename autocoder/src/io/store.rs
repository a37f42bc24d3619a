//! Namespaced text store for designs, code and run artifacts.
//!
//! Keys are `(namespace, phase, version)` triples. [`FsStore`] lays them out
//! as files under `<root>/<project>/<folder>/`; [`MemoryStore`] keeps them in
//! memory for tests and dry runs.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Project plus storage sub-folder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace {
    pub project: String,
    pub folder: String,
}

impl Namespace {
    pub fn new(project: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            folder: folder.into(),
        }
    }
}

/// Kind of artifact being stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Design captured right after drafting.
    InitialDesign,
    /// Design after the refinement loop.
    FinalDesign,
    /// Task-coder accumulation, rewritten after every task.
    Codebase,
    /// One task's synthesized unit, versioned by task index.
    TaskOutput,
    /// One self-improvement round, versioned by round.
    Improvement,
    /// JSON run summary.
    Summary,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactKey {
    pub namespace: Namespace,
    pub phase: Phase,
    pub version: Option<u32>,
}

impl ArtifactKey {
    pub fn new(namespace: &Namespace, phase: Phase) -> Self {
        Self {
            namespace: namespace.clone(),
            phase,
            version: None,
        }
    }

    pub fn versioned(namespace: &Namespace, phase: Phase, version: u32) -> Self {
        Self {
            namespace: namespace.clone(),
            phase,
            version: Some(version),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Overwrite,
    Append,
}

/// Abstraction over artifact persistence.
pub trait ArtifactStore {
    fn write(&self, key: &ArtifactKey, text: &str, mode: WriteMode) -> Result<()>;
    /// `Ok(None)` when nothing is stored under `key`.
    fn read(&self, key: &ArtifactKey) -> Result<Option<String>>;
    /// Remove `key`; clearing a missing key is not an error.
    fn clear(&self, key: &ArtifactKey) -> Result<()>;
    /// Versions stored for `phase` in `namespace`, ascending. Empty for
    /// unversioned phases.
    fn list_versions(&self, namespace: &Namespace, phase: Phase) -> Result<Vec<u32>>;
}

/// Filesystem-backed store.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    code_extension: String,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>, code_extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            code_extension: code_extension.into(),
        }
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        let dir = self
            .root
            .join(&key.namespace.project)
            .join(&key.namespace.folder);
        let ext = &self.code_extension;
        let version = key.version.unwrap_or(0);
        match key.phase {
            Phase::InitialDesign => dir.join("design_initial.txt"),
            Phase::FinalDesign => dir.join("design_final.txt"),
            Phase::Codebase => dir.join(format!("generated_code.{ext}")),
            Phase::TaskOutput => dir.join("tasks").join(format!("{TASK_PREFIX}{version}.{ext}")),
            Phase::Improvement => dir.join(format!("{IMPROVEMENT_PREFIX}{version}.{ext}")),
            Phase::Summary => dir.join("run_summary.json"),
        }
    }
}

const TASK_PREFIX: &str = "task_";
const IMPROVEMENT_PREFIX: &str = "generated_code_iteration";

impl ArtifactStore for FsStore {
    fn write(&self, key: &ArtifactKey, text: &str, mode: WriteMode) -> Result<()> {
        let path = self.path_for(key);
        ensure_parent(&path)?;
        match mode {
            WriteMode::Overwrite => {
                fs::write(&path, text).with_context(|| format!("write {}", path.display()))?;
            }
            WriteMode::Append => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("open {} for append", path.display()))?;
                file.write_all(text.as_bytes())
                    .with_context(|| format!("append {}", path.display()))?;
            }
        }
        debug!(path = %path.display(), bytes = text.len(), ?mode, "stored artifact");
        Ok(())
    }

    fn read(&self, key: &ArtifactKey) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }

    fn clear(&self, key: &ArtifactKey) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
        }
    }

    fn list_versions(&self, namespace: &Namespace, phase: Phase) -> Result<Vec<u32>> {
        let prefix = match phase {
            Phase::TaskOutput => TASK_PREFIX,
            Phase::Improvement => IMPROVEMENT_PREFIX,
            _ => return Ok(Vec::new()),
        };
        let sample = self.path_for(&ArtifactKey::versioned(namespace, phase, 0));
        let Some(dir) = sample.parent() else {
            return Ok(Vec::new());
        };
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).with_context(|| format!("list {}", dir.display())),
        };

        let suffix = format!(".{}", self.code_extension);
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("list {}", dir.display()))?;
            let name = entry.file_name();
            let Some(digits) = name
                .to_str()
                .and_then(|name| name.strip_prefix(prefix))
                .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            else {
                continue;
            };
            // Only names `path_for` would produce, so `007` is not version 7.
            if let Some(version) = digits
                .parse::<u32>()
                .ok()
                .filter(|version| version.to_string() == digits)
            {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    Ok(())
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<ArtifactKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, in key order.
    pub fn keys(&self) -> Vec<ArtifactKey> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Stored versions for `phase`, ascending.
    pub fn versions(&self, phase: Phase) -> Vec<u32> {
        self.entries
            .borrow()
            .keys()
            .filter(|key| key.phase == phase)
            .filter_map(|key| key.version)
            .collect()
    }
}

impl ArtifactStore for MemoryStore {
    fn write(&self, key: &ArtifactKey, text: &str, mode: WriteMode) -> Result<()> {
        let mut entries = self.entries.borrow_mut();
        match mode {
            WriteMode::Overwrite => {
                entries.insert(key.clone(), text.to_string());
            }
            WriteMode::Append => entries.entry(key.clone()).or_default().push_str(text),
        }
        Ok(())
    }

    fn read(&self, key: &ArtifactKey) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn clear(&self, key: &ArtifactKey) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn list_versions(&self, namespace: &Namespace, phase: Phase) -> Result<Vec<u32>> {
        Ok(self
            .entries
            .borrow()
            .keys()
            .filter(|key| key.phase == phase && &key.namespace == namespace)
            .filter_map(|key| key.version)
            .collect())
    }
}
