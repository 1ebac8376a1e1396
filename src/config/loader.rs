//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::NodeConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::identity::NodeIdentity;

const APP_DIR: &str = "localp2p";
const CONFIG_FILE: &str = "config.toml";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<ValidationError>),
    NoConfigDir,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
            ConfigError::NoConfigDir => {
                write!(f, "Could not find the platform config directory; pass --config")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<NodeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: NodeConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load the config at `path`, or write a fresh default one there first.
///
/// A fresh config gets a generated node identity, so the id stays stable
/// across restarts once the file exists.
pub fn load_or_init(path: &Path) -> Result<NodeConfig, ConfigError> {
    if path.exists() {
        return load_config(path);
    }

    let identity = NodeIdentity::generate();
    let mut config = NodeConfig::default();
    config.node.id = identity.id().to_string();
    config.node.display_name = identity.display_name().to_string();

    save_config(&config, path)?;
    tracing::info!(path = %path.display(), node_id = %config.node.id, "Created default configuration");

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Write a configuration as TOML, creating parent directories.
pub fn save_config(config: &NodeConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
    }
    let content = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    fs::write(path, content).map_err(ConfigError::Io)
}

/// Platform default location of the node config file.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    config_path_in(dirs::config_dir())
}

fn config_path_in(config_dir: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    let dir = config_dir.ok_or(ConfigError::NoConfigDir)?;
    Ok(dir.join(APP_DIR).join(CONFIG_FILE))
}
