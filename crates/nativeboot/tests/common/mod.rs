//! Test doubles shared by the integration tests

#![allow(dead_code)]

use nativeboot::{HostLoader, LinkError, LoaderConfig, ResourceBundle};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Module list of the qimessaging bindings, in dependency order
pub const QI_MODULES: [&str; 5] = [
    "libgnustl_shared",
    "libqi",
    "libqitype",
    "libqimessaging",
    "libqimessagingjni",
];

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn qi_config() -> LoaderConfig {
    LoaderConfig::from_file(fixture("qimessaging.toml")).unwrap()
}

/// A call observed by [`RecordingHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    ByName(String),
    FromPath {
        module: String,
        path: PathBuf,
        /// File contents at the moment of the load
        contents: Option<Vec<u8>>,
    },
}

impl HostCall {
    pub fn module(&self) -> &str {
        match self {
            HostCall::ByName(m) => m.as_str(),
            HostCall::FromPath { module, .. } => module.as_str(),
        }
    }
}

/// Host loader double that records every call
#[derive(Default)]
pub struct RecordingHost {
    resolvable: HashSet<String>,
    reject_paths: bool,
    delete_on_load: bool,
    calls: Mutex<Vec<HostCall>>,
}

impl RecordingHost {
    /// Host whose library search finds exactly `names`
    pub fn resolving<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            resolvable: names.into_iter().map(str::to_string).collect(),
            ..Default::default()
        }
    }

    /// Fail every load by path, as for a file that is not a valid library
    pub fn rejecting_paths(mut self) -> Self {
        self.reject_paths = true;
        self
    }

    /// Remove the file during a load by path, so the loader's own cleanup fails
    pub fn deleting_on_load(mut self) -> Self {
        self.delete_on_load = true;
        self
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    pub fn attempted(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.module().to_string()).collect()
    }
}

impl HostLoader for RecordingHost {
    fn load_by_name(&self, module: &str) -> Result<(), LinkError> {
        self.calls.lock().push(HostCall::ByName(module.to_string()));
        if self.resolvable.contains(module) {
            Ok(())
        } else {
            Err(LinkError::NotFound {
                name: module.to_string(),
                reason: "cannot open shared object file".to_string(),
            })
        }
    }

    fn load_from_path(&self, module: &str, path: &Path) -> Result<(), LinkError> {
        self.calls.lock().push(HostCall::FromPath {
            module: module.to_string(),
            path: path.to_path_buf(),
            contents: std::fs::read(path).ok(),
        });
        if self.delete_on_load {
            let _ = std::fs::remove_file(path);
        }
        if self.reject_paths {
            Err(LinkError::NotFound {
                name: path.display().to_string(),
                reason: "invalid ELF header".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Bundle wrapper counting lookups
pub struct CountingBundle<B> {
    inner: B,
    lookups: AtomicUsize,
}

impl<B> CountingBundle<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl<B: ResourceBundle> ResourceBundle for CountingBundle<B> {
    fn contains(&self, path: &str) -> bool {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.contains(path)
    }

    fn read(
        &self,
        path: &str,
        reader: &mut dyn FnMut(&mut dyn Read) -> io::Result<u64>,
    ) -> io::Result<u64> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.read(path, reader)
    }
}

/// Reader that fails after `good` bytes
pub struct FailingReader {
    pub good: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.good == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated resource"));
        }
        let n = self.good.min(buf.len());
        buf[..n].fill(0x7f);
        self.good -= n;
        Ok(n)
    }
}

/// Bundle that claims every resource but breaks while streaming it
pub struct TruncatedBundle {
    pub good: usize,
}

impl ResourceBundle for TruncatedBundle {
    fn contains(&self, _path: &str) -> bool {
        true
    }

    fn read(
        &self,
        _path: &str,
        reader: &mut dyn FnMut(&mut dyn Read) -> io::Result<u64>,
    ) -> io::Result<u64> {
        reader(&mut FailingReader { good: self.good })
    }
}

pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
