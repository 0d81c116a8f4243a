//! Engine configuration.
//!
//! Read from JSON, either an explicit file or the per-user file at
//! `<config dir>/scriptpad/config.json`:
//!
//! ```json
//! {
//!   "references": ["System.Runtime", "System.Threading", "Pad.Api"],
//!   "imports": ["using System;"],
//!   "script_root": "/home/me/scripts"
//! }
//! ```
//!
//! Missing fields take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Libraries every session references from the start.
pub const DEFAULT_REFERENCES: &[&str] = &["System.Runtime", "System.Threading", "Pad.Api"];

/// Directives issued by the session bootstrapper.
pub const DEFAULT_IMPORTS: &[&str] = &[
    "using System;",
    "using System.Threading;",
    "using System.Collections.Generic;",
    "using Pad.Api;",
    "using static Pad.Api.Host;",
];

/// Construction-time settings of a [`crate::ScriptEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base reference set (host library names).
    pub references: Vec<String>,
    /// Import directives submitted by `add_default_imports`, in order.
    pub imports: Vec<String>,
    /// Root for relative `#load` paths.
    pub script_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            references: DEFAULT_REFERENCES.iter().map(|s| s.to_string()).collect(),
            imports: DEFAULT_IMPORTS.iter().map(|s| s.to_string()).collect(),
            script_root: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Location of the per-user configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("scriptpad").join("config.json"))
    }

    /// Load the per-user configuration if it exists, else the defaults.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.references, ["System.Runtime", "System.Threading", "Pad.Api"]);
        assert_eq!(config.imports.len(), 5);
        assert_eq!(config.imports.last().unwrap(), "using static Pad.Api.Host;");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "script_root": "/tmp/scripts" }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.script_root, Some(PathBuf::from("/tmp/scripts")));
        assert_eq!(config.references, EngineConfig::default().references);
    }

    #[test]
    fn test_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = EngineConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
