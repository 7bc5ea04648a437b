//! Type checking configuration, read from a TOML document.
//!
//! ```toml
//! [check]
//! entry = ["app::main"]
//! builtins = true
//!
//! [diagnostics]
//! color = false
//! ```

use std::path::Path as FsPath;

use gera_common::Path;
use serde::Deserialize;

use crate::diagnostics::DiagnosticOptions;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckConfig {
    #[serde(default)]
    pub check: CheckSection,
    #[serde(default)]
    pub diagnostics: DiagnosticOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckSection {
    /// Fully qualified paths of the symbols whose variants are kept.
    #[serde(default)]
    pub entry: Vec<String>,
    /// Register the `core` built-in procedures before checking.
    #[serde(default = "default_builtins")]
    pub builtins: bool,
}

fn default_builtins() -> bool {
    true
}

impl Default for CheckSection {
    fn default() -> Self {
        CheckSection {
            entry: Vec::new(),
            builtins: default_builtins(),
        }
    }
}

impl CheckConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse check config: {}", e))
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: &FsPath) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_str(&content)
    }

    /// A default configuration with one entry point.
    pub fn with_entry(entry: &str) -> Self {
        let mut config = CheckConfig::default();
        config.check.entry.push(entry.to_string());
        config
    }

    pub fn entry_points(&self) -> Vec<Path> {
        self.check.entry.iter().map(|entry| Path::parse(entry)).collect()
    }
}
