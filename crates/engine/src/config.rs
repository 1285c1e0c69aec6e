//! Engine configuration via `reflow.toml`
//!
//! A default `reflow.toml` is written into the state directory on first
//! open. To change settings, edit the file and start the next run.

use std::path::{Path, PathBuf};

use reflow_core::{Error, Result, Value};
use serde::{Deserialize, Serialize};

/// Config file name placed in the state directory.
pub const CONFIG_FILE_NAME: &str = "reflow.toml";

/// Default snapshot file name.
pub const DEFAULT_SNAPSHOT_FILE: &str = "reflow.snap";

/// Engine configuration loaded from `reflow.toml`.
///
/// # Example
///
/// ```toml
/// snapshot_file = "reflow.snap"
/// parallel = false
/// lock = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the snapshot and lock file; `None` keeps
    /// snapshots in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Snapshot file name inside `state_dir`.
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
    /// Decide independent entities of a wave concurrently.
    #[serde(default)]
    pub parallel: bool,
    /// Take `<state_dir>/.lock` for the duration of each run.
    #[serde(default = "default_lock")]
    pub lock: bool,
    /// Value inserted for a suppressed Function with no previous value.
    #[serde(skip)]
    pub unresolved: Value,
}

fn default_snapshot_file() -> String {
    DEFAULT_SNAPSHOT_FILE.to_string()
}

fn default_lock() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            snapshot_file: default_snapshot_file(),
            parallel: false,
            lock: default_lock(),
            unresolved: Value::Null,
        }
    }
}

impl EngineConfig {
    /// Config with in-memory snapshots
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Config persisting snapshots under `dir`
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Set parallel wave evaluation
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enable or disable the cross-process lock file
    pub fn with_lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }

    /// Set the unresolved sentinel
    pub fn with_unresolved(mut self, unresolved: impl Into<Value>) -> Self {
        self.unresolved = unresolved.into();
        self
    }

    /// Set the snapshot file name
    pub fn with_snapshot_file(mut self, file: impl Into<String>) -> Self {
        self.snapshot_file = file.into();
        self
    }

    /// Check field values.
    ///
    /// # Errors
    ///
    /// Returns an error if `snapshot_file` is empty or is not a bare file name.
    pub fn validate(&self) -> Result<()> {
        let file = self.snapshot_file.as_str();
        let bare = !file.is_empty() && !file.contains(['/', '\\']) && file != "." && file != "..";
        if !bare {
            return Err(Error::Config(format!(
                "Invalid snapshot_file '{}' in {}. Expected a bare file name.",
                file, CONFIG_FILE_NAME
            )));
        }
        Ok(())
    }

    /// Path of the lock file, if any
    pub fn lock_path(&self) -> Option<PathBuf> {
        match (&self.state_dir, self.lock) {
            (Some(dir), true) => Some(dir.join(".lock")),
            _ => None,
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Reflow engine configuration
#
# Snapshot file name inside the state directory (default: "reflow.snap").
snapshot_file = "reflow.snap"

# Evaluate independent entities of one wave concurrently (default: false).
# Resolvers must then tolerate running on worker threads.
parallel = false

# Hold an exclusive lock on <state_dir>/.lock for each run (default: true).
lock = true
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Load `reflow.toml` from `dir`, creating the directory and a default
    /// file on first use. `state_dir` defaults to `dir`.
    pub fn load_or_create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(CONFIG_FILE_NAME);
        Self::write_default_if_missing(&path)?;
        let mut config = Self::from_file(&path)?;
        if config.state_dir.is_none() {
            config.state_dir = Some(dir.to_path_buf());
        }
        Ok(config)
    }
}
