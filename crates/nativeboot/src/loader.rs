//! Native module loader
//!
//! Resolves each module either from the application's resource bundle
//! (extract, then load by path) or through the host's library search (load
//! by name), and sequences a configured list of modules in dependency order.

use parking_lot::Mutex;
use std::path::PathBuf;
use thiserror::Error;

use crate::bundle::ResourceBundle;
use crate::config::{validate_module_name, LoaderConfig};
use crate::extract::{extract, ExtractError};
use crate::host::{HostLoader, LinkError, SystemLoader};
use crate::platform::PlatformSuffix;

/// Where a loaded module came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadSource {
    /// Extracted from the resource bundle and loaded by path
    EmbeddedResource,
    /// Found by the host's library search
    SystemPath,
}

/// Errors that can occur while loading a single module
#[derive(Debug, Error)]
pub enum LoadError {
    /// Not in the bundle, and the host could not find it either
    #[error("Native module {module} is not embedded at {resource} and the system loader failed: {source}")]
    Unresolved {
        module: String,
        resource: String,
        #[source]
        source: LinkError,
    },

    /// Extracted, but the host refused to load the file
    #[error("Failed to load extracted module {module} from {path}: {source}")]
    Link {
        module: String,
        path: PathBuf,
        #[source]
        source: LinkError,
    },

    /// Embedded artifact could not be written out
    #[error("Failed to extract native module {module}: {source}")]
    Extraction {
        module: String,
        #[source]
        source: ExtractError,
    },

    /// Name cannot be used as a file name
    #[error("Invalid native module name: {0:?}")]
    InvalidName(String),
}

impl LoadError {
    /// Module the error is about
    pub fn module(&self) -> &str {
        match self {
            LoadError::Unresolved { module, .. }
            | LoadError::Link { module, .. }
            | LoadError::Extraction { module, .. } => module.as_str(),
            LoadError::InvalidName(name) => name.as_str(),
        }
    }
}

/// Progress of the bundle load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    NotStarted,
    InProgress,
    /// Every required module loaded; absorbing
    Loaded,
    /// A required module failed; the next `load_all` starts over
    Failed,
}

/// Outcome of one module in a bundle load
#[derive(Debug)]
pub struct ModuleOutcome {
    pub name: String,
    pub result: Result<LoadSource, LoadError>,
}

/// Per-module outcomes of a successful bundle load, in attempt order.
///
/// Failures listed here belong to best-effort modules.
#[derive(Debug, Default)]
pub struct LoadReport {
    modules: Vec<ModuleOutcome>,
    already_loaded: bool,
}

impl LoadReport {
    /// True when the call was a no-op because the bundle was already loaded
    pub fn is_already_loaded(&self) -> bool {
        self.already_loaded
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleOutcome> {
        self.modules.iter()
    }

    /// Source of a module that loaded in this sequence. Modules already loaded
    /// by an earlier `load` are included with the source recorded then.
    pub fn source_of(&self, module: &str) -> Option<LoadSource> {
        self.modules
            .iter()
            .find(|m| m.name == module)
            .and_then(|m| m.result.as_ref().ok().copied())
    }

    /// Best-effort modules that failed
    pub fn failures(&self) -> impl Iterator<Item = &ModuleOutcome> {
        self.modules.iter().filter(|m| m.result.is_err())
    }
}

#[derive(Debug)]
struct LoaderState {
    phase: LoadPhase,
    /// Modules loaded by this loader, in load order
    loaded: Vec<(String, LoadSource)>,
}

impl LoaderState {
    fn source_of(&self, module: &str) -> Option<LoadSource> {
        self.loaded
            .iter()
            .find(|(name, _)| name == module)
            .map(|(_, source)| *source)
    }
}

/// Loads native modules from a resource bundle or the host search path.
///
/// All state transitions happen under one lock, so concurrent callers see a
/// single, serialized load sequence.
///
/// # Example
///
/// ```ignore
/// let config = LoaderConfig::from_file("native.toml")?;
/// let bundle = DirBundle::new("resources");
/// let loader = NativeLoader::system(config, bundle);
/// if !loader.load_all() {
///     return Err("native support unavailable".into());
/// }
/// ```
pub struct NativeLoader<B, H> {
    config: LoaderConfig,
    bundle: B,
    host: H,
    suffix: PlatformSuffix,
    state: Mutex<LoaderState>,
}

impl<B: ResourceBundle> NativeLoader<B, SystemLoader> {
    /// Loader using the operating system's dynamic linker, searching the
    /// configured `search_paths` first
    pub fn system(config: LoaderConfig, bundle: B) -> Self {
        let host = SystemLoader::new().with_search_paths(config.search_paths.iter().cloned());
        Self::new(config, bundle, host)
    }
}

impl<B: ResourceBundle, H: HostLoader> NativeLoader<B, H> {
    pub fn new(config: LoaderConfig, bundle: B, host: H) -> Self {
        Self {
            config,
            bundle,
            host,
            suffix: PlatformSuffix::host(),
            state: Mutex::new(LoaderState {
                phase: LoadPhase::NotStarted,
                loaded: Vec::new(),
            }),
        }
    }

    /// Override the platform suffix (defaults to the host's)
    pub fn with_suffix(mut self, suffix: PlatformSuffix) -> Self {
        self.suffix = suffix;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn bundle(&self) -> &B {
        &self.bundle
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn suffix(&self) -> PlatformSuffix {
        self.suffix
    }

    pub fn phase(&self) -> LoadPhase {
        self.state.lock().phase
    }

    /// Whether the whole configured sequence has loaded
    pub fn is_loaded(&self) -> bool {
        self.phase() == LoadPhase::Loaded
    }

    /// Modules loaded so far, in load order
    pub fn loaded_modules(&self) -> Vec<(String, LoadSource)> {
        self.state.lock().loaded.clone()
    }

    /// Load a single module by logical name.
    ///
    /// A module this loader already loaded is not loaded again; its recorded
    /// source is returned.
    ///
    /// # Returns
    /// * `Ok(LoadSource)` - Where the module was loaded from
    /// * `Err(LoadError)` - The module is not usable in this process
    pub fn load(&self, module: &str) -> Result<LoadSource, LoadError> {
        let mut state = self.state.lock();
        self.load_locked(&mut state, module)
    }

    /// Load every configured module in order.
    ///
    /// Returns `false` when a required module failed. Details are logged; use
    /// [`NativeLoader::try_load_all`] to get them as values.
    pub fn load_all(&self) -> bool {
        self.try_load_all().is_ok()
    }

    /// Load every configured module in order.
    ///
    /// Best-effort failures are collected in the report. The first required
    /// failure stops the sequence and is returned.
    pub fn try_load_all(&self) -> Result<LoadReport, LoadError> {
        let mut state = self.state.lock();

        if state.phase == LoadPhase::Loaded {
            log::info!("Native libraries already loaded");
            return Ok(LoadReport {
                modules: Vec::new(),
                already_loaded: true,
            });
        }

        state.phase = LoadPhase::InProgress;
        let mut report = LoadReport::default();

        for spec in &self.config.modules {
            match self.load_locked(&mut state, &spec.name) {
                Ok(source) => report.modules.push(ModuleOutcome {
                    name: spec.name.clone(),
                    result: Ok(source),
                }),
                Err(e) if !spec.required => {
                    log::debug!("best-effort module {} skipped: {}", spec.name, e);
                    report.modules.push(ModuleOutcome {
                        name: spec.name.clone(),
                        result: Err(e),
                    });
                }
                Err(e) => {
                    state.phase = LoadPhase::Failed;
                    log::warn!(
                        "Required native module {} failed to load, aborting: {}",
                        spec.name,
                        e
                    );
                    return Err(e);
                }
            }
        }

        state.phase = LoadPhase::Loaded;
        log::info!(
            "Loaded native modules: {}",
            state
                .loaded
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(report)
    }

    fn load_locked(&self, state: &mut LoaderState, module: &str) -> Result<LoadSource, LoadError> {
        if let Some(source) = state.source_of(module) {
            return Ok(source);
        }
        if validate_module_name(module).is_err() {
            return Err(LoadError::InvalidName(module.to_string()));
        }

        let source = self.resolve(module)?;
        state.loaded.push((module.to_string(), source));
        Ok(source)
    }

    fn resolve(&self, module: &str) -> Result<LoadSource, LoadError> {
        let resource = self.suffix.resource_path(module);

        if !self.bundle.contains(&resource) {
            log::debug!("{} not embedded, using system library search", module);
            return match self.host.load_by_name(module) {
                Ok(()) => {
                    log::debug!("loaded {} from system path", module);
                    Ok(LoadSource::SystemPath)
                }
                Err(source) => {
                    if self.config.is_quiet(module) {
                        log::debug!("Unsatisfied link error: {}", source);
                    } else {
                        log::warn!("Unsatisfied link error: {}", source);
                    }
                    Err(LoadError::Unresolved {
                        module: module.to_string(),
                        resource,
                        source,
                    })
                }
            };
        }

        let dir = self.config.extraction_dir();
        let artifact = extract(&self.bundle, &resource, module, self.suffix, &dir).map_err(
            |source| {
                log::warn!("Could not extract embedded module {}: {}", module, source);
                LoadError::Extraction {
                    module: module.to_string(),
                    source,
                }
            },
        )?;

        // The artifact is removed when it goes out of scope, loaded or not
        match self.host.load_from_path(module, artifact.path()) {
            Ok(()) => {
                log::debug!("loaded {} from embedded resource {}", module, resource);
                Ok(LoadSource::EmbeddedResource)
            }
            Err(source) => {
                log::warn!("Unsatisfied link error: {}", source);
                Err(LoadError::Link {
                    module: module.to_string(),
                    path: artifact.path().to_path_buf(),
                    source,
                })
            }
        }
    }
}
