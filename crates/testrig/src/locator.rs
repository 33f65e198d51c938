//! Install location lookup.
//!
//! Resolving a product version to an install directory and executable is a
//! registry/configuration concern that lives outside the acquisition state
//! machine. The manager only sees the [`InstallLocator`] contract;
//! [`RegistryLocator`] is the file-backed default and [`FixedLocator`] pins
//! explicit paths for tests and single-install setups.

use crate::error::{Result, RigError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A resolved application install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledApp {
    /// Install root directory.
    pub install_dir: PathBuf,
    /// Path to the application executable.
    pub executable: PathBuf,
}

/// Resolves a product version identifier to an install.
pub trait InstallLocator: Send + Sync {
    /// Look up the install for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`RigError::InstallNotFound`] if no install is registered
    /// for the version, [`RigError::Locator`] if the registry itself is
    /// unreadable.
    fn locate(&self, version: &str) -> Result<InstalledApp>;
}

/// One entry in the install registry file.
#[derive(Debug, Clone, Deserialize)]
struct RegistryEntry {
    install_dir: PathBuf,
    /// Executable path. Relative paths are resolved against `install_dir`.
    executable: PathBuf,
}

/// File-backed locator.
///
/// Reads a JSON file mapping version identifiers to installs:
///
/// ```json
/// { "2024.1": { "install_dir": "/opt/hostapp/2024.1", "executable": "bin/hostapp" } }
/// ```
pub struct RegistryLocator {
    registry_path: PathBuf,
}

impl RegistryLocator {
    /// Create a locator reading from `registry_path`.
    pub fn new(registry_path: impl Into<PathBuf>) -> Self {
        Self {
            registry_path: registry_path.into(),
        }
    }

    fn load(&self) -> Result<HashMap<String, RegistryEntry>> {
        let raw = fs::read_to_string(&self.registry_path).map_err(|e| RigError::Locator {
            message: format!(
                "cannot read install registry {}: {}",
                self.registry_path.display(),
                e
            ),
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl InstallLocator for RegistryLocator {
    fn locate(&self, version: &str) -> Result<InstalledApp> {
        let entries = self.load()?;
        let entry = entries
            .get(version)
            .ok_or_else(|| RigError::InstallNotFound {
                version: version.to_string(),
            })?;

        let executable = if entry.executable.is_absolute() {
            entry.executable.clone()
        } else {
            entry.install_dir.join(&entry.executable)
        };

        debug!(
            "Resolved version {} to {}",
            version,
            executable.display()
        );

        Ok(InstalledApp {
            install_dir: entry.install_dir.clone(),
            executable,
        })
    }
}

/// Locator pinned to one explicit install, regardless of version.
pub struct FixedLocator {
    app: InstalledApp,
}

impl FixedLocator {
    /// Pin an install by its directory and executable path.
    pub fn new(install_dir: impl AsRef<Path>, executable: impl AsRef<Path>) -> Self {
        Self {
            app: InstalledApp {
                install_dir: install_dir.as_ref().to_path_buf(),
                executable: executable.as_ref().to_path_buf(),
            },
        }
    }
}

impl InstallLocator for FixedLocator {
    fn locate(&self, _version: &str) -> Result<InstalledApp> {
        Ok(self.app.clone())
    }
}
