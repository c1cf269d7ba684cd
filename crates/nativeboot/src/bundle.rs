//! Embedded resource bundles
//!
//! A bundle is the set of files shipped inside the application's own
//! distributable. Native artifacts are looked up in it by a path of the form
//! `/<module><suffix>`.
//!
//! Three backends are provided:
//! - [`StaticBundle`] - bytes compiled into the binary (`include_bytes!`)
//! - [`DirBundle`] - a resource root directory next to the application
//! - [`ArchiveBundle`] - a zip archive (jar-style packaging)

use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Lookup of embedded resources by path
pub trait ResourceBundle {
    /// Whether a resource exists at `path`
    fn contains(&self, path: &str) -> bool;

    /// Open the resource at `path` and hand a stream over it to `reader`.
    ///
    /// Returns whatever `reader` returns. A missing resource is reported as
    /// [`io::ErrorKind::NotFound`].
    fn read(
        &self,
        path: &str,
        reader: &mut dyn FnMut(&mut dyn Read) -> io::Result<u64>,
    ) -> io::Result<u64>;
}

impl<T: ResourceBundle + ?Sized> ResourceBundle for &T {
    fn contains(&self, path: &str) -> bool {
        (**self).contains(path)
    }

    fn read(
        &self,
        path: &str,
        reader: &mut dyn FnMut(&mut dyn Read) -> io::Result<u64>,
    ) -> io::Result<u64> {
        (**self).read(path, reader)
    }
}

impl<T: ResourceBundle + ?Sized> ResourceBundle for Arc<T> {
    fn contains(&self, path: &str) -> bool {
        (**self).contains(path)
    }

    fn read(
        &self,
        path: &str,
        reader: &mut dyn FnMut(&mut dyn Read) -> io::Result<u64>,
    ) -> io::Result<u64> {
        (**self).read(path, reader)
    }
}

/// Bundle paths are rooted at `/`; backends store them without it.
fn entry_name(path: &str) -> &str {
    path.trim_start_matches('/')
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("resource not found in bundle: {}", path),
    )
}

// ============================================================================
// Static bundle
// ============================================================================

/// Resources held in memory, typically compiled in with `include_bytes!`.
///
/// # Example
///
/// ```ignore
/// let bundle = StaticBundle::new()
///     .with("/libqi.so", include_bytes!("../native/libqi.so"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticBundle {
    entries: HashMap<String, Cow<'static, [u8]>>,
}

impl StaticBundle {
    /// Create an empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, builder style
    pub fn with(mut self, path: &str, bytes: impl Into<Cow<'static, [u8]>>) -> Self {
        self.insert(path, bytes);
        self
    }

    /// Add or replace a resource
    pub fn insert(&mut self, path: &str, bytes: impl Into<Cow<'static, [u8]>>) {
        self.entries
            .insert(entry_name(path).to_string(), bytes.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceBundle for StaticBundle {
    fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(entry_name(path))
    }

    fn read(
        &self,
        path: &str,
        reader: &mut dyn FnMut(&mut dyn Read) -> io::Result<u64>,
    ) -> io::Result<u64> {
        let bytes = self
            .entries
            .get(entry_name(path))
            .ok_or_else(|| not_found(path))?;
        let mut stream: &[u8] = bytes;
        reader(&mut stream)
    }
}

// ============================================================================
// Directory bundle
// ============================================================================

/// Resources laid out under a root directory
#[derive(Debug, Clone)]
pub struct DirBundle {
    root: PathBuf,
}

impl DirBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a bundle path to a file under the root.
    ///
    /// Returns `None` for paths that would escape the root (`..`, absolute
    /// components, drive prefixes).
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(entry_name(path));
        if relative.as_os_str().is_empty() {
            return None;
        }
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl ResourceBundle for DirBundle {
    fn contains(&self, path: &str) -> bool {
        self.resolve(path).map_or(false, |p| p.is_file())
    }

    fn read(
        &self,
        path: &str,
        reader: &mut dyn FnMut(&mut dyn Read) -> io::Result<u64>,
    ) -> io::Result<u64> {
        let file_path = self.resolve(path).ok_or_else(|| not_found(path))?;
        let mut file = File::open(file_path)?;
        reader(&mut file)
    }
}

// ============================================================================
// Archive bundle
// ============================================================================

/// Resources stored in a zip archive
pub struct ArchiveBundle<R = File> {
    archive: Mutex<zip::ZipArchive<R>>,
}

impl ArchiveBundle<File> {
    /// Open a zip archive on disk
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::new(file)
    }
}

impl<R: Read + Seek> ArchiveBundle<R> {
    /// Read the central directory of an archive held by `reader`
    pub fn new(reader: R) -> io::Result<Self> {
        let archive = zip::ZipArchive::new(reader)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self {
            archive: Mutex::new(archive),
        })
    }

    /// Number of entries in the archive, directories included
    pub fn len(&self) -> usize {
        self.archive.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Read + Seek> ResourceBundle for ArchiveBundle<R> {
    fn contains(&self, path: &str) -> bool {
        let name = entry_name(path);
        if name.is_empty() || name.ends_with('/') {
            return false;
        }
        let archive = self.archive.lock();
        let found = archive.file_names().any(|n| n == name);
        found
    }

    fn read(
        &self,
        path: &str,
        reader: &mut dyn FnMut(&mut dyn Read) -> io::Result<u64>,
    ) -> io::Result<u64> {
        let mut archive = self.archive.lock();
        let mut entry = archive.by_name(entry_name(path)).map_err(|e| match e {
            zip::result::ZipError::FileNotFound => not_found(path),
            zip::result::ZipError::Io(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })?;
        reader(&mut entry)
    }
}
