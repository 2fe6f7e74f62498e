use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Geographic center of the contiguous US, used when a year has no data.
pub const DEFAULT_CENTER: [f64; 2] = [37.0902, -95.7129];

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub scene: SceneConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub data_csv: PathBuf,
    #[serde(default)]
    pub columns: ColumnConfig,
}

/// Header names of the required CSV columns.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ColumnConfig {
    pub facility_id: String,
    pub facility_name: String,
    pub state: String,
    pub city_name: String,
    pub latitude: String,
    pub longitude: String,
    pub population: String,
    pub compliance_begin_date: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            facility_id: "pws id".to_string(),
            facility_name: "pws name".to_string(),
            state: "State".to_string(),
            city_name: "City Name".to_string(),
            latitude: "lat".to_string(),
            longitude: "lng".to_string(),
            population: "population".to_string(),
            compliance_begin_date: "compliance period begin date".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SceneConfig {
    pub min_year: i32,
    pub max_year: i32,
    /// `[latitude, longitude]`
    pub default_center: [f64; 2],
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            min_year: 2001,
            max_year: 2024,
            default_center: DEFAULT_CENTER,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub scene_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { scene_dir: PathBuf::from("output/scenes") }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 10000,
            static_dir: PathBuf::from("static"),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Inclusive range of years offered to the year selector.
    pub fn year_range(&self) -> std::ops::RangeInclusive<i32> {
        self.scene.min_year..=self.scene.max_year
    }
}
