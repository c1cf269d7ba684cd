//! Platform artifact naming
//!
//! Maps the host operating system family to the file-name conventions of
//! dynamically loadable code (.so, .dylib, .dll).

use once_cell::sync::Lazy;
use std::fmt;

static HOST_SUFFIX: Lazy<PlatformSuffix> =
    Lazy::new(|| PlatformSuffix::from_os_family(std::env::consts::OS));

/// File-name suffix of a loadable native artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformSuffix {
    /// `.dll`
    Windows,
    /// `.dylib`
    Apple,
    /// `.so`, used by every other platform
    Default,
}

impl PlatformSuffix {
    /// Select the suffix for an operating system family name.
    ///
    /// Accepts both the identifiers of `std::env::consts::OS` (`"windows"`,
    /// `"macos"`) and host-reported product names (`"Windows 10"`,
    /// `"Mac OS X"`). Matching is case-sensitive. Anything unrecognized maps
    /// to [`PlatformSuffix::Default`].
    ///
    /// # Example
    ///
    /// ```ignore
    /// assert_eq!(PlatformSuffix::from_os_family("Mac OS X"), PlatformSuffix::Apple);
    /// assert_eq!(PlatformSuffix::from_os_family("haiku"), PlatformSuffix::Default);
    /// ```
    pub fn from_os_family(family: &str) -> Self {
        if family == "windows" || family.starts_with("Windows") {
            PlatformSuffix::Windows
        } else if family == "macos" || family.starts_with("Mac") {
            PlatformSuffix::Apple
        } else {
            PlatformSuffix::Default
        }
    }

    /// Suffix of the running host, computed once per process
    pub fn host() -> Self {
        *HOST_SUFFIX
    }

    /// The suffix string, including the leading dot
    pub fn as_str(self) -> &'static str {
        match self {
            PlatformSuffix::Windows => ".dll",
            PlatformSuffix::Apple => ".dylib",
            PlatformSuffix::Default => ".so",
        }
    }

    /// `<module><suffix>`, the name an extracted artifact is given on disk
    pub fn artifact_name(self, module: &str) -> String {
        format!("{}{}", module, self.as_str())
    }

    /// Path of the module inside a resource bundle: `/<module><suffix>`
    pub fn resource_path(self, module: &str) -> String {
        format!("/{}", self.artifact_name(module))
    }

    /// File name the host's by-name search looks for.
    ///
    /// Windows uses `<module>.dll`. Elsewhere the `lib` prefix is added unless
    /// the module name already carries it, so `"qi"` and `"libqi"` both map to
    /// `libqi.so`. The check is purely textual: a module whose own name starts
    /// with `lib`, such as `"libertine"`, is looked up as `libertine.so` and
    /// never as `liblibertine.so`.
    pub fn library_file_name(self, module: &str) -> String {
        match self {
            PlatformSuffix::Windows => self.artifact_name(module),
            PlatformSuffix::Apple | PlatformSuffix::Default => {
                if module.starts_with("lib") {
                    self.artifact_name(module)
                } else {
                    format!("lib{}", self.artifact_name(module))
                }
            }
        }
    }
}

impl fmt::Display for PlatformSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
