//! OS directory resolution for the config file and the JSON log.

use std::path::{Path, PathBuf};
use std::{fmt, io};

/// Errors that can occur while resolving or creating the app directories.
#[derive(Debug)]
pub enum PlatformError {
    /// The OS did not provide a configuration directory.
    NoConfigDir,
    /// A directory could not be created.
    Io(io::Error),
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoConfigDir => write!(f, "could not determine OS configuration directory"),
            Self::Io(e) => write!(f, "platform I/O error: {e}"),
        }
    }
}

impl std::error::Error for PlatformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::NoConfigDir => None,
        }
    }
}

impl From<io::Error> for PlatformError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Where Cadence keeps `config.ron` and its log file.
///
/// Follows OS conventions (XDG on Linux, Known Folders on Windows, Library on
/// macOS). Logs go to the state dir where the OS has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    /// Holds the JSON log file written in debug builds.
    pub log_dir: PathBuf,
}

/// Directory name used under every OS base directory.
pub const APP_NAME: &str = "cadence";

impl PlatformDirs {
    /// Resolves the directories without touching the disk.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NoConfigDir`] if the OS does not expose a
    /// configuration directory.
    pub fn resolve() -> Result<Self, PlatformError> {
        let config_dir = dirs::config_dir()
            .ok_or(PlatformError::NoConfigDir)?
            .join(APP_NAME);
        let log_dir = match dirs::state_dir() {
            Some(state) => state.join(APP_NAME).join("logs"),
            None => config_dir.join("logs"),
        };
        Ok(Self {
            config_dir,
            log_dir,
        })
    }

    /// Resolves the directories and creates them.
    pub fn resolve_and_create() -> Result<Self, PlatformError> {
        let dirs = Self::resolve()?;
        dirs.create_dirs()?;
        Ok(dirs)
    }

    /// Directories rooted under `root` instead of the OS locations.
    pub fn resolve_with_root(root: &Path) -> Self {
        let app_dir = root.join(APP_NAME);
        Self {
            config_dir: app_dir.join("config"),
            log_dir: app_dir.join("logs"),
        }
    }

    /// Creates every directory in `self`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Io`] if any directory cannot be created.
    pub fn create_dirs(&self) -> Result<(), PlatformError> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }

    /// `override_dir` if given, else the resolved config dir.
    pub fn config_dir_or(&self, override_dir: Option<&Path>) -> PathBuf {
        override_dir.map_or_else(|| self.config_dir.clone(), Path::to_path_buf)
    }
}
