//! nativeboot: start-up loading of native libraries
//!
//! This crate resolves the platform-specific shared libraries an application
//! depends on and loads them into the process, in a fixed dependency order:
//! - Platform artifact naming (.so / .dylib / .dll)
//! - Resource bundles holding embedded artifacts (static, directory, zip)
//! - Extraction of embedded artifacts to a loadable temporary file
//! - Fallback to the host's library search
//! - Sequenced, idempotent loading of a configured module list

pub mod bundle;
pub mod config;
pub mod extract;
pub mod host;
pub mod loader;
pub mod platform;

pub use bundle::{ArchiveBundle, DirBundle, ResourceBundle, StaticBundle};
pub use config::{ConfigError, LoaderConfig, ModuleSpec};
pub use extract::{ExtractError, ExtractedArtifact, CHUNK_SIZE};
pub use host::{HostLoader, LinkError, SystemLoader};
pub use loader::{LoadError, LoadPhase, LoadReport, LoadSource, ModuleOutcome, NativeLoader};
pub use platform::PlatformSuffix;
