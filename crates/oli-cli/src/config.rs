use anyhow::{bail, Context, Result};
use oli_core::types::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use oli_core::{ChatConfig, ChatError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".oli.yaml";

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

/// Contents of `.oli.yaml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub apikey: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub pipe: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
}

/// Named preset selected with `--role`.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Values that came from flags or environment variables.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub apikey: Option<String>,
    pub model: Option<String>,
    pub system: Option<String>,
    pub pipe: Option<String>,
    pub base_url: Option<String>,
    pub role: Option<String>,
    pub online: bool,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load the config file.
///
/// An explicit path must exist. Otherwise `./.oli.yaml` and then
/// `~/.oli.yaml` are tried, and no file at all yields the defaults.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return read(path);
    }
    for path in search_paths() {
        if path.is_file() {
            tracing::debug!(path = %path.display(), "using config file");
            return read(&path);
        }
    }
    Ok(FileConfig::default())
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(CONFIG_FILE_NAME));
    }
    if let Some(home) = home::home_dir() {
        paths.push(home.join(CONFIG_FILE_NAME));
    }
    paths
}

fn read(path: &Path) -> Result<FileConfig> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    if data.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&data)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Merge flags/env, the selected role, the file and the built-in defaults
/// (in that order of precedence) into one immutable [`ChatConfig`].
pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<ChatConfig> {
    let role = match overrides.role.as_deref() {
        None => None,
        Some(name) => match file.roles.iter().find(|r| r.name == name) {
            Some(role) => Some(role.clone()),
            None => {
                let known: Vec<&str> = file.roles.iter().map(|r| r.name.as_str()).collect();
                bail!(
                    "unknown role '{name}' (configured roles: {})",
                    if known.is_empty() {
                        "none".to_string()
                    } else {
                        known.join(", ")
                    }
                );
            }
        },
    };

    let api_key = non_empty(overrides.apikey)
        .or(non_empty(file.apikey))
        .ok_or_else(|| {
            ChatError::Config(format!(
                "no API key: pass --apikey, set OPENROUTER_API_KEY, or add `apikey` to {CONFIG_FILE_NAME}"
            ))
        })?;

    let role_model = role.as_ref().and_then(|r| non_empty(r.model.clone()));
    let role_system = role.as_ref().and_then(|r| non_empty(r.system.clone()));

    Ok(ChatConfig {
        api_key,
        model: non_empty(overrides.model)
            .or(role_model)
            .or(non_empty(file.model))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        online: overrides.online,
        system: non_empty(overrides.system)
            .or(role_system)
            .or(non_empty(file.system)),
        pipe: non_empty(overrides.pipe).or(non_empty(file.pipe)),
        base_url: non_empty(overrides.base_url)
            .or(non_empty(file.base_url))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
