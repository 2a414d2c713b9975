//! Configuration file parsing for `zvm.toml`.
//!
//! Searches the current directory then its ancestors, falling back to
//! `~/.config/zvm/zvm.toml` if no project-level file is found.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use zvm_provider_http::HttpConfig;

pub const CONFIG_FILE: &str = "zvm.toml";

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ZvmConfig {
    #[serde(default)]
    pub trace: TraceSection,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub repl: ReplSection,
    #[serde(default)]
    pub modules: ModulesSection,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TraceSection {
    /// Print one line per dispatched op to stdout.
    pub console: bool,
}

impl Default for TraceSection {
    fn default() -> Self {
        Self { console: true }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct ReplSection {
    /// History file; relative paths resolve under HOME.
    pub history: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModulesSection {
    /// Host modules imported into every VM before it runs anything.
    pub preload: Vec<String>,
}

impl Default for ModulesSection {
    fn default() -> Self {
        Self {
            preload: vec![crate::FS_MODULE.to_string(), crate::HTTP_MODULE.to_string()],
        }
    }
}

impl ZvmConfig {
    /// Load config from `zvm.toml`, searching the current dir then parents,
    /// then the user config dir. Returns `Default` when no file is found.
    pub fn load() -> Result<Self, String> {
        Ok(Self::load_with_path()?.map(|(_, cfg)| cfg).unwrap_or_default())
    }

    /// Load config and return the path of the file that was used.
    pub fn load_with_path() -> Result<Option<(PathBuf, Self)>, String> {
        let cwd = std::env::current_dir().map_err(|e| format!("cannot read current dir: {}", e))?;
        match find_config(&cwd, dirs::home_dir().as_deref()) {
            Some(path) => Self::load_from(&path).map(|cfg| Some((path, cfg))),
            None => Ok(None),
        }
    }

    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        Self::from_str(&content).map_err(|e| format!("invalid toml in '{}': {}", path.display(), e))
    }

    /// Parse a TOML string directly.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

/// The first `zvm.toml` in `start` or its ancestors, else the one in the
/// user config dir under `home`.
pub fn find_config(start: &Path, home: Option<&Path>) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    let global = home?.join(".config").join("zvm").join(CONFIG_FILE);
    global.is_file().then_some(global)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
