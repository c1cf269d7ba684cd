//! Host dynamic loader
//!
//! Cross-platform loading of shared libraries (.so, .dylib, .dll), either by
//! bare name through the platform's library search or from an explicit path.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::platform::PlatformSuffix;

/// Errors reported by the host loader
#[derive(Debug, Error)]
pub enum LinkError {
    /// Library could not be found or is not loadable on this host
    #[error("Library not found: {name}: {reason}")]
    NotFound {
        /// Name or path that was attempted
        name: String,
        /// Loader diagnostic (dlerror / GetLastError)
        reason: String,
    },

    /// Symbol not found in library
    #[error("Symbol not found: {symbol} in {module}")]
    SymbolNotFound {
        /// Symbol name that was not found
        symbol: String,
        /// Module the lookup ran against
        module: String,
    },

    /// Symbol lookup against a module this loader never opened
    #[error("Module not loaded: {0}")]
    ModuleNotLoaded(String),

    /// Path or name not representable for the platform API
    #[error("Invalid library path: {0}")]
    InvalidPath(String),
}

/// The two loading primitives a host offers
pub trait HostLoader {
    /// Load a module by its bare name, letting the host apply its own naming
    /// convention and library search order.
    fn load_by_name(&self, module: &str) -> Result<(), LinkError>;

    /// Load a module from an explicit file path
    fn load_from_path(&self, module: &str, path: &Path) -> Result<(), LinkError>;
}

impl<T: HostLoader + ?Sized> HostLoader for &T {
    fn load_by_name(&self, module: &str) -> Result<(), LinkError> {
        (**self).load_by_name(module)
    }

    fn load_from_path(&self, module: &str, path: &Path) -> Result<(), LinkError> {
        (**self).load_from_path(module, path)
    }
}

impl<T: HostLoader + ?Sized> HostLoader for std::sync::Arc<T> {
    fn load_by_name(&self, module: &str) -> Result<(), LinkError> {
        (**self).load_by_name(module)
    }

    fn load_from_path(&self, module: &str, path: &Path) -> Result<(), LinkError> {
        (**self).load_from_path(module, path)
    }
}

// ============================================================================
// System loader
// ============================================================================

/// [`HostLoader`] backed by the operating system's dynamic linker.
///
/// Every library it opens stays loaded for the rest of the process. Handles
/// are kept so symbols can be looked up later, but never closed.
///
/// # Platform-specific behavior
///
/// - **Linux / macOS**: `dlopen(RTLD_NOW | RTLD_GLOBAL)`, so that modules loaded
///   later in a sequence can bind against symbols of earlier ones
/// - **Windows**: `LoadLibraryW`
pub struct SystemLoader {
    suffix: PlatformSuffix,
    search_paths: Vec<PathBuf>,
    libraries: Mutex<HashMap<String, LibraryHandle>>,
}

impl SystemLoader {
    pub fn new() -> Self {
        Self {
            suffix: PlatformSuffix::host(),
            search_paths: Vec::new(),
            libraries: Mutex::new(HashMap::new()),
        }
    }

    /// Directories tried, in order, before the host's default search
    pub fn with_search_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_paths.extend(paths);
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Whether `module` was loaded through this loader
    pub fn is_loaded(&self, module: &str) -> bool {
        self.libraries.lock().contains_key(module)
    }

    /// Look up a symbol in a module previously loaded through this loader.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - The symbol name is correct
    /// - The type `T` is a pointer-sized type matching the symbol (usually an
    ///   `extern "C" fn`)
    ///
    /// # Example
    ///
    /// ```ignore
    /// type HelloFn = extern "C" fn();
    /// let hello: HelloFn = unsafe { loader.symbol("libqimessagingjni", "hello")? };
    /// ```
    pub unsafe fn symbol<T>(&self, module: &str, symbol: &str) -> Result<T, LinkError> {
        let libraries = self.libraries.lock();
        let library = libraries
            .get(module)
            .ok_or_else(|| LinkError::ModuleNotLoaded(module.to_string()))?;
        library.symbol(symbol, module)
    }

    fn open(&self, module: &str, target: &str) -> Result<(), LinkError> {
        let handle = LibraryHandle::load(target)?;
        self.libraries.lock().insert(module.to_string(), handle);
        Ok(())
    }
}

impl Default for SystemLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl HostLoader for SystemLoader {
    fn load_by_name(&self, module: &str) -> Result<(), LinkError> {
        let file_name = self.suffix.library_file_name(module);

        for dir in &self.search_paths {
            let candidate = dir.join(&file_name);
            if !candidate.is_file() {
                continue;
            }
            match self.load_from_path(module, &candidate) {
                Ok(()) => return Ok(()),
                Err(e) => log::debug!("skipping {}: {}", candidate.display(), e),
            }
        }

        // Bare file name: the platform applies its default search order
        self.open(module, &file_name)
    }

    fn load_from_path(&self, module: &str, path: &Path) -> Result<(), LinkError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| LinkError::InvalidPath(format!("{:?}", path)))?;
        self.open(module, path_str)
    }
}

// Platform-specific implementations

#[cfg(unix)]
type LibraryHandle = UnixLibrary;

#[cfg(windows)]
type LibraryHandle = WindowsLibrary;

// ============================================================================
// Unix Implementation (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
struct UnixLibrary {
    handle: *mut std::ffi::c_void,
}

#[cfg(unix)]
impl UnixLibrary {
    fn load(path: &str) -> Result<Self, LinkError> {
        use std::ffi::CStr;

        let c_path =
            CString::new(path).map_err(|_| LinkError::InvalidPath(path.to_string()))?;

        let handle = unsafe {
            // RTLD_NOW: Resolve all symbols immediately
            // RTLD_GLOBAL: Export symbols to modules loaded afterwards
            libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL)
        };

        if handle.is_null() {
            let reason = unsafe {
                let err_ptr = libc::dlerror();
                if err_ptr.is_null() {
                    "Unknown error".to_string()
                } else {
                    CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
                }
            };

            return Err(LinkError::NotFound {
                name: path.to_string(),
                reason,
            });
        }

        Ok(UnixLibrary { handle })
    }

    unsafe fn symbol<T>(&self, name: &str, module: &str) -> Result<T, LinkError> {
        let c_name = CString::new(name).map_err(|_| LinkError::SymbolNotFound {
            symbol: name.to_string(),
            module: module.to_string(),
        })?;

        // Clear any previous errors
        libc::dlerror();

        let symbol = libc::dlsym(self.handle, c_name.as_ptr());

        if !libc::dlerror().is_null() || symbol.is_null() {
            return Err(LinkError::SymbolNotFound {
                symbol: name.to_string(),
                module: module.to_string(),
            });
        }

        Ok(std::mem::transmute_copy(&symbol))
    }
}

#[cfg(unix)]
unsafe impl Send for UnixLibrary {}
#[cfg(unix)]
unsafe impl Sync for UnixLibrary {}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
struct WindowsLibrary {
    handle: *mut std::ffi::c_void,
}

#[cfg(windows)]
impl WindowsLibrary {
    fn load(path: &str) -> Result<Self, LinkError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        // Convert to wide string
        let wide: Vec<u16> = OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };

        if handle.is_null() {
            let error = unsafe { GetLastError() };
            return Err(LinkError::NotFound {
                name: path.to_string(),
                reason: format!("error code: {}", error),
            });
        }

        Ok(WindowsLibrary { handle })
    }

    unsafe fn symbol<T>(&self, name: &str, module: &str) -> Result<T, LinkError> {
        let c_name = CString::new(name).map_err(|_| LinkError::SymbolNotFound {
            symbol: name.to_string(),
            module: module.to_string(),
        })?;

        let symbol = GetProcAddress(self.handle, c_name.as_ptr());

        if symbol.is_null() {
            return Err(LinkError::SymbolNotFound {
                symbol: name.to_string(),
                module: module.to_string(),
            });
        }

        Ok(std::mem::transmute_copy(&symbol))
    }
}

#[cfg(windows)]
unsafe impl Send for WindowsLibrary {}
#[cfg(windows)]
unsafe impl Sync for WindowsLibrary {}

// Windows FFI declarations
#[cfg(windows)]
extern "system" {
    fn LoadLibraryW(filename: *const u16) -> *mut std::ffi::c_void;
    fn GetProcAddress(
        module: *mut std::ffi::c_void,
        procname: *const std::ffi::c_char,
    ) -> *mut std::ffi::c_void;
    fn GetLastError() -> u32;
}
