use crate::error::ConfigError;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "face_manager.yaml";

/// Contents of the optional YAML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YamlConfig {
    pub target_root: Option<PathBuf>,
    pub res_dir: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub progress_log: Option<PathBuf>,
    pub required_class: Option<String>,
    pub album: Option<String>,
    pub destination_root: Option<PathBuf>,
    pub app: Option<AppIdentityConfig>,
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AppIdentityConfig {
    pub app_id: Option<String>,
    pub public_host: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: Option<u16>,
}

/// Missing file => `Ok(None)`; unreadable or malformed => error.
pub fn load_yaml(path: &Path) -> Result<Option<YamlConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg = serde_yaml::from_reader(file).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(cfg))
}
