use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

const CONFIG_FILE_NAME: &str = ".gatorconfig.json";
const CONFIG_PATH_ENV: &str = "GATOR_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_url")]
    pub db_url: String,

    #[serde(default)]
    pub current_user_name: Option<String>,

    #[serde(skip)]
    path: PathBuf,
}

fn default_db_url() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gator");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("gator.db").to_string_lossy().to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path()?)
    }

    /// Read the config at `path`, writing out defaults if it does not exist.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let mut config: Config = serde_json::from_str(&content).map_err(|e| {
                AppError::Config(format!("{} is not valid: {}", path.display(), e))
            })?;
            // Older configs store a logged-out user as an empty name.
            config.current_user_name = config.current_user_name.filter(|name| !name.is_empty());
            config.path = path;
            Ok(config)
        } else {
            let config = Config {
                db_url: default_db_url(),
                current_user_name: None,
                path,
            };
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// Make `name` the current user and persist the change.
    pub fn set_user(&mut self, name: &str) -> Result<()> {
        self.current_user_name = Some(name.to_string());
        self.save()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `$GATOR_CONFIG` if set, otherwise `~/.gatorconfig.json`.
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        dirs::home_dir()
            .map(|home| home.join(CONFIG_FILE_NAME))
            .ok_or_else(|| AppError::Config("could not determine the home directory".to_string()))
    }
}
