//! Shared test doubles.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use txfs_kernel::{
    Capability, MkdirOptions, RmOptions, RmdirOptions, TxStorage, VfsError, VfsResult, WriteOptions,
};

/// Install a test-writer subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// A storage call as observed by [`RecordingStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Write { path: String, data: Vec<u8> },
    Read { path: String },
    Exists { path: String },
    Rename { from: String, to: String },
    Mkdir { path: String, recursive: bool },
    Rm { path: String, force: bool },
    Rmdir { path: String },
    Unlink { path: String },
}

impl Call {
    fn name(&self) -> &'static str {
        match self {
            Call::Write { .. } => "write_file",
            Call::Read { .. } => "read_file",
            Call::Exists { .. } => "exists",
            Call::Rename { .. } => "rename",
            Call::Mkdir { .. } => "mkdir",
            Call::Rm { .. } => "rm",
            Call::Rmdir { .. } => "rmdir",
            Call::Unlink { .. } => "unlink",
        }
    }

    fn path(&self) -> &str {
        match self {
            Call::Rename { from, .. } => from,
            Call::Write { path, .. }
            | Call::Read { path }
            | Call::Exists { path }
            | Call::Mkdir { path, .. }
            | Call::Rm { path, .. }
            | Call::Rmdir { path }
            | Call::Unlink { path } => path,
        }
    }
}

/// Records every call; fails the ones matching a `(method, path)` rule.
///
/// Existence and reads are answered from a seeded file map when the
/// `ReadFile`/`Exists` capabilities are enabled.
pub struct RecordingStorage {
    calls: Mutex<Vec<Call>>,
    failures: Vec<(&'static str, String)>,
    capabilities: BTreeSet<Capability>,
    files: HashMap<String, Vec<u8>>,
}

impl RecordingStorage {
    /// Supports every mutating operation, but not reads.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Vec::new(),
            capabilities: [
                Capability::WriteFile,
                Capability::Rename,
                Capability::Mkdir,
                Capability::Rm,
                Capability::Rmdir,
                Capability::Unlink,
            ]
            .into_iter()
            .collect(),
            files: HashMap::new(),
        }
    }

    /// Fail calls to `method` on `path` (the source path for renames).
    pub fn failing(mut self, method: &'static str, path: &str) -> Self {
        self.failures.push((method, path.to_string()));
        self
    }

    /// Enable reads and existence checks over the given files.
    pub fn with_files<'a>(mut self, files: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Self {
        self.capabilities.insert(Capability::ReadFile);
        self.capabilities.insert(Capability::Exists);
        self.files = files
            .into_iter()
            .map(|(p, d)| (p.to_string(), d.to_vec()))
            .collect();
        self
    }

    /// Restrict the declared capabilities.
    pub fn only(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.iter().copied().collect();
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Every recorded rename as `(from, to)`.
    pub fn renames(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Rename { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    /// Position of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(pred)
    }

    fn record(&self, call: Call) -> VfsResult<()> {
        let fail = self
            .failures
            .iter()
            .any(|(method, path)| *method == call.name() && path == call.path());
        let path = call.path().to_string();
        let method = call.name();
        self.calls.lock().unwrap().push(call);
        if fail {
            Err(VfsError::not_found(format!("{method} {path}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TxStorage for RecordingStorage {
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    async fn write_file(&self, path: &str, data: &[u8], _options: WriteOptions) -> VfsResult<()> {
        self.record(Call::Write {
            path: path.to_string(),
            data: data.to_vec(),
        })
    }

    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        self.record(Call::Read {
            path: path.to_string(),
        })?;
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| VfsError::not_found(path))
    }

    async fn exists(&self, path: &str) -> VfsResult<bool> {
        self.record(Call::Exists {
            path: path.to_string(),
        })?;
        Ok(self.files.contains_key(path))
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> VfsResult<()> {
        self.record(Call::Rename {
            from: old_path.to_string(),
            to: new_path.to_string(),
        })
    }

    async fn mkdir(&self, path: &str, options: MkdirOptions) -> VfsResult<()> {
        self.record(Call::Mkdir {
            path: path.to_string(),
            recursive: options.recursive,
        })
    }

    async fn rm(&self, path: &str, options: RmOptions) -> VfsResult<()> {
        self.record(Call::Rm {
            path: path.to_string(),
            force: options.force,
        })
    }

    async fn rmdir(&self, path: &str, _options: RmdirOptions) -> VfsResult<()> {
        self.record(Call::Rmdir {
            path: path.to_string(),
        })
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        self.record(Call::Unlink {
            path: path.to_string(),
        })
    }
}
