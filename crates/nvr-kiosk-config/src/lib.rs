#![warn(missing_docs)]
//! # nvr-kiosk-config
//!
//! ## Purpose
//! Persists the kiosk [`Config`] record between runs.
//!
//! ## Responsibilities
//! - Define the [`ConfigStore`] seam the controller and login throttle use.
//! - Store the record as a JSON document with atomic replace-on-write.
//! - Provide an in-memory store for tests and degraded operation.
//!
//! ## Data flow
//! Startup calls [`ConfigStore::load`]; page `configSave` / `configSavePartial`
//! messages and the login throttle call [`ConfigStore::save`] with a
//! [`ConfigPatch`]; `--reset` calls [`ConfigStore::clear`].
//!
//! ## Error model
//! I/O and decode failures return [`ConfigError`]. A missing file is not an
//! error; it loads as [`Config::default`].
//!
//! ## Security and privacy notes
//! The document contains the dashboard password in plaintext. On Unix the
//! file is created with `0o600` permissions.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use nvr_kiosk_core::{Config, ConfigPatch, CoreError};
use thiserror::Error;

/// Default file name used when no path is configured.
pub const DEFAULT_CONFIG_FILE: &str = "nvr-kiosk.json";

/// Durable key-value record accessor.
pub trait ConfigStore: Send + Sync {
    /// Reads the current record.
    fn load(&self) -> Result<Config, ConfigError>;

    /// Merges `patch` into the stored record.
    ///
    /// Fields absent from `patch` keep their stored values.
    fn save(&self, patch: &ConfigPatch) -> Result<(), ConfigError>;

    /// Removes every stored value so the next load yields defaults.
    fn clear(&self) -> Result<(), ConfigError>;
}

/// JSON document store on the local filesystem.
#[derive(Debug)]
pub struct JsonFileConfigStore {
    path: PathBuf,
    // Serializes read-merge-write so concurrent saves cannot drop fields.
    write_lock: Mutex<()>,
}

impl JsonFileConfigStore {
    /// Creates a store backed by `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_current(&self) -> Result<Config, ConfigError> {
        match fs::read(&self.path) {
            Ok(raw) => Config::from_json_bytes(&raw).map_err(|error| ConfigError::Decode {
                path: self.path.clone(),
                source: error,
            }),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
            Err(error) => Err(ConfigError::Io {
                path: self.path.clone(),
                source: error,
            }),
        }
    }

    fn write_atomic(&self, config: &Config) -> Result<(), ConfigError> {
        let bytes = config.to_json_bytes().map_err(|error| ConfigError::Decode {
            path: self.path.clone(),
            source: error,
        })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|error| self.io_error(error))?;
        }

        let temp_path = self.temp_path();
        let written = write_private(&temp_path, &bytes)
            .and_then(|()| fs::rename(&temp_path, &self.path));
        if let Err(error) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path)
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                tracing::warn!(
                    stage = "config",
                    action = "temp_left",
                    path = %temp_path.display(),
                    error = %cleanup
                );
            }
            return Err(self.io_error(error));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn io_error(&self, source: io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ConfigStore for JsonFileConfigStore {
    fn load(&self) -> Result<Config, ConfigError> {
        self.read_current()
    }

    fn save(&self, patch: &ConfigPatch) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().map_err(|_| ConfigError::Poisoned)?;
        let mut config = self.read_current()?;
        config.apply_patch(patch);
        self.write_atomic(&config)?;
        tracing::debug!(
            stage = "config",
            action = "saved",
            path = %self.path.display(),
            "config patch persisted"
        );
        Ok(())
    }

    fn clear(&self) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().map_err(|_| ConfigError::Poisoned)?;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(
                    stage = "config",
                    action = "cleared",
                    path = %self.path.display(),
                    "persisted config removed"
                );
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(self.io_error(error)),
        }
    }
}

/// Volatile store used by tests and as a fallback when the disk store fails.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: Mutex<Config>,
}

impl MemoryConfigStore {
    /// Creates a store holding [`Config::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `config`.
    pub fn with_config(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Config, ConfigError> {
        self.config
            .lock()
            .map(|config| config.clone())
            .map_err(|_| ConfigError::Poisoned)
    }

    fn save(&self, patch: &ConfigPatch) -> Result<(), ConfigError> {
        let mut config = self.config.lock().map_err(|_| ConfigError::Poisoned)?;
        config.apply_patch(patch);
        Ok(())
    }

    fn clear(&self) -> Result<(), ConfigError> {
        let mut config = self.config.lock().map_err(|_| ConfigError::Poisoned)?;
        *config = Config::default();
        Ok(())
    }
}

fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = open_private(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

/// Config persistence errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem failure.
    #[error("config io failure at {path}: {source}")]
    Io {
        /// File involved in the failure.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Stored document could not be decoded or encoded.
    #[error("config document at {path} is invalid: {source}")]
    Decode {
        /// File involved in the failure.
        path: PathBuf,
        /// Underlying codec error.
        source: CoreError,
    },
    /// A previous writer panicked while holding the store lock.
    #[error("config store lock poisoned")]
    Poisoned,
}
