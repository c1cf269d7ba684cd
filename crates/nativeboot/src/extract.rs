//! Extraction of embedded artifacts to a loadable location
//!
//! An embedded module cannot be handed to the host loader directly, so its
//! bytes are streamed into a fresh temporary file, which is then renamed to
//! the conventional `<module><suffix>` name in the same directory. Each
//! extraction gets its own directory, so concurrent extractions of one module
//! never share a path.

use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

use crate::bundle::ResourceBundle;
use crate::platform::PlatformSuffix;

/// Copy buffer size; artifacts are never held in memory as a whole
pub const CHUNK_SIZE: usize = 10_000;

/// Errors that can occur while extracting an embedded artifact
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Temporary file could not be created
    #[error("Failed to create temporary file in {dir}: {source}")]
    CreateTemp {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading the resource or writing the temporary file failed
    #[error("Failed to copy resource {resource} to {path}: {source}")]
    Copy {
        resource: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Renaming the temporary file to the artifact name failed
    #[error("Failed to rename {from} to {to}: {source}")]
    Persist {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An artifact extracted to disk.
///
/// The file and its private directory are removed when this value is
/// dropped. Removal is best-effort: a file still mapped by the host loader
/// may refuse deletion on some platforms, which is not an error.
#[derive(Debug)]
pub struct ExtractedArtifact {
    path: PathBuf,
    bytes: u64,
    // Dropped after `Drop::drop` has removed the file
    _dir: TempDir,
}

impl ExtractedArtifact {
    /// Absolute path of the renamed artifact
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes copied out of the bundle
    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }
}

impl Drop for ExtractedArtifact {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::trace!("could not remove {}: {}", self.path.display(), e);
        }
    }
}

/// Extract the resource `resource` of `bundle` into a fresh directory under
/// `dir`.
///
/// # Arguments
/// * `bundle` - Bundle holding the artifact
/// * `resource` - Bundle path, `/<module><suffix>`
/// * `module` - Logical module name
/// * `suffix` - Platform suffix of the artifact
/// * `dir` - Parent of the per-extraction directory
///
/// # Returns
/// * `Ok(ExtractedArtifact)` - `<dir>/<unique>/<module><suffix>`, fully
///   written and closed
/// * `Err(ExtractError)` - No renamed file is left behind
pub fn extract(
    bundle: &dyn ResourceBundle,
    resource: &str,
    module: &str,
    suffix: PlatformSuffix,
    dir: &Path,
) -> Result<ExtractedArtifact, ExtractError> {
    let create_error = |source: io::Error| ExtractError::CreateTemp {
        dir: dir.to_path_buf(),
        source,
    };
    let private_dir = tempfile::Builder::new()
        .prefix(module)
        .tempdir_in(dir)
        .map_err(create_error)?;
    let temp = tempfile::Builder::new()
        .prefix(module)
        .suffix(suffix.as_str())
        .tempfile_in(private_dir.path())
        .map_err(create_error)?;
    let temp_path = temp.path().to_path_buf();

    let copy_error = |source: io::Error| ExtractError::Copy {
        resource: resource.to_string(),
        path: temp_path.clone(),
        source,
    };

    // Dropping `temp` and `private_dir` on any error below deletes the
    // partial file
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, temp);
    let bytes = bundle
        .read(resource, &mut |input| copy_chunked(input, &mut writer))
        .map_err(copy_error)?;
    let temp = writer
        .into_inner()
        .map_err(|e| copy_error(e.into_error()))?;

    // Sibling of the temporary file
    let target = private_dir.path().join(suffix.artifact_name(module));

    let file = temp.persist(&target).map_err(|e| ExtractError::Persist {
        from: temp_path.clone(),
        to: target.clone(),
        source: e.error,
    })?;
    // Close before the file is handed to the loader
    drop(file);

    log::debug!(
        "extracted {} ({} bytes) to {}",
        resource,
        bytes,
        target.display()
    );

    Ok(ExtractedArtifact {
        path: target,
        bytes,
        _dir: private_dir,
    })
}

/// Copy `input` to `output` through a `CHUNK_SIZE` buffer
fn copy_chunked(input: &mut dyn Read, output: &mut dyn Write) -> io::Result<u64> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        output.write_all(&buffer[..n])?;
        total += n as u64;
    }
    output.flush()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::StaticBundle;

    /// Yields `good` bytes, then fails
    struct FailingReader {
        good: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.good == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk on fire"));
            }
            let n = self.good.min(buf.len());
            buf[..n].fill(1);
            self.good -= n;
            Ok(n)
        }
    }

    struct BrokenBundle;

    impl ResourceBundle for BrokenBundle {
        fn contains(&self, _path: &str) -> bool {
            true
        }

        fn read(
            &self,
            _path: &str,
            reader: &mut dyn FnMut(&mut dyn Read) -> io::Result<u64>,
        ) -> io::Result<u64> {
            reader(&mut FailingReader { good: 3 * CHUNK_SIZE })
        }
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_extract_copies_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let bundle = StaticBundle::new().with("/libqi.so", payload.clone());

        let artifact = extract(&bundle, "/libqi.so", "libqi", PlatformSuffix::Default, dir.path())
            .unwrap();

        let private_dir = artifact.path().parent().unwrap();
        assert_eq!(private_dir.parent(), Some(dir.path()));
        assert!(artifact.path().ends_with("libqi.so"));
        assert_eq!(artifact.len(), payload.len() as u64);
        assert_eq!(std::fs::read(artifact.path()).unwrap(), payload);
        // Only the renamed artifact remains; the temp name is gone
        assert_eq!(dir_entries(private_dir), vec!["libqi.so".to_string()]);

        drop(artifact);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_same_module_extracted_twice_into_one_dir() {
        let dir = tempfile::tempdir().unwrap();
        let first = StaticBundle::new().with("/libqi.so", vec![1u8; 64]);
        let second = StaticBundle::new().with("/libqi.so", vec![2u8; 32]);

        let a = extract(&first, "/libqi.so", "libqi", PlatformSuffix::Default, dir.path()).unwrap();
        let b = extract(&second, "/libqi.so", "libqi", PlatformSuffix::Default, dir.path()).unwrap();

        assert_ne!(a.path(), b.path());
        assert_eq!(std::fs::read(a.path()).unwrap(), vec![1u8; 64]);
        assert_eq!(std::fs::read(b.path()).unwrap(), vec![2u8; 32]);

        // Releasing one leaves the other intact
        drop(b);
        assert_eq!(std::fs::read(a.path()).unwrap(), vec![1u8; 64]);
        assert_eq!(dir_entries(dir.path()).len(), 1);

        drop(a);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_extract_empty_resource() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = StaticBundle::new().with("/libqi.dll", Vec::<u8>::new());

        let artifact = extract(&bundle, "/libqi.dll", "libqi", PlatformSuffix::Windows, dir.path())
            .unwrap();
        assert!(artifact.is_empty());
        assert!(artifact.path().ends_with("libqi.dll"));
    }

    #[test]
    fn test_mid_copy_failure_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();

        let err = extract(&BrokenBundle, "/libqi.so", "libqi", PlatformSuffix::Default, dir.path())
            .unwrap_err();

        match err {
            ExtractError::Copy { resource, source, .. } => {
                assert_eq!(resource, "/libqi.so");
                assert_eq!(source.to_string(), "disk on fire");
            }
            other => panic!("expected Copy error, got {:?}", other),
        }
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_missing_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let bundle = StaticBundle::new().with("/libqi.so", &b"x"[..]);

        let err = extract(&bundle, "/libqi.so", "libqi", PlatformSuffix::Default, &missing)
            .unwrap_err();
        assert!(matches!(err, ExtractError::CreateTemp { dir, .. } if dir == missing));
    }

    #[test]
    fn test_removal_failure_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = StaticBundle::new().with("/libqi.so", &b"x"[..]);

        let artifact = extract(&bundle, "/libqi.so", "libqi", PlatformSuffix::Default, dir.path())
            .unwrap();
        std::fs::remove_file(artifact.path()).unwrap();
        // Second removal fails inside Drop without panicking
        drop(artifact);
    }

    #[test]
    fn test_copy_chunked_counts_bytes() {
        let mut input: &[u8] = &[9u8; CHUNK_SIZE + 1];
        let mut output = Vec::new();
        assert_eq!(copy_chunked(&mut input, &mut output).unwrap(), CHUNK_SIZE as u64 + 1);
        assert_eq!(output.len(), CHUNK_SIZE + 1);
    }
}
