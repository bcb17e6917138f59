use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::EcolapError;
use crate::sectors::Competition;

const CONFIG_DIR_NAME: &str = "ecolap";
const CONFIG_FILE_NAME: &str = "config.json";

/// Wheel perimeter used when neither the command line nor the config set one
pub const DEFAULT_WHEEL_PERIMETER_M: f64 = 1.5;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the sector files, defaults to the platform data dir
    pub data_dir: Option<PathBuf>,
    pub default_competition: Option<String>,
    pub wheel_perimeter_m: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_competition: None,
            wheel_perimeter_m: DEFAULT_WHEEL_PERIMETER_M,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf, EcolapError> {
        Ok(dirs::config_dir()
            .ok_or(EcolapError::NoConfigDir)?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    /// Config saved in the user config dir, if any. An unreadable file is
    /// reported and ignored.
    pub fn from_local_file() -> Option<Self> {
        let config_path = Self::config_path().ok()?;
        if !config_path.exists() {
            return None;
        }
        match Self::from_file(&config_path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring config file {:?}: {}", config_path, e);
                None
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, EcolapError> {
        let file =
            std::fs::File::open(path).map_err(|e| EcolapError::ConfigIOError { source: e })?;
        let config = serde_json::from_reader(file)
            .map_err(|e| EcolapError::ConfigSerializeError { source: e })?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self) -> Result<(), EcolapError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), EcolapError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EcolapError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| EcolapError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| EcolapError::ConfigSerializeError { source: e })
    }

    /// Competition named on the command line, or the configured default
    pub fn competition(
        &self,
        name: Option<&str>,
        wheel_perimeter_m: Option<f64>,
    ) -> Result<Competition, EcolapError> {
        let name = name
            .or(self.default_competition.as_deref())
            .ok_or(EcolapError::MissingCompetition)?;
        Competition::new(name, wheel_perimeter_m.unwrap_or(self.wheel_perimeter_m))
    }
}
