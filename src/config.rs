use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static DIRS: Lazy<Option<ProjectDirs>> = Lazy::new(|| ProjectDirs::from("", "", "facecheck"));

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| match &*DIRS {
    Some(dirs) => dirs.config_dir().join("config.toml"),
    None => PathBuf::from("facecheck.toml"),
});

static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| match &*DIRS {
    Some(dirs) => dirs.data_dir().to_path_buf(),
    None => PathBuf::from("."),
});

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("recognize.downscale must be at least 1")]
    ZeroDownscale,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub camera: String,
    pub models: Models,
    pub detection: Detection,
    pub verify: Verify,
    pub recognize: Recognize,
    pub store: Store,
    pub preview: Preview,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Models {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Detection {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Verify {
    pub reference: PathBuf,
    /// Largest cosine distance still accepted as the same person.
    pub max_distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Recognize {
    pub reference: PathBuf,
    pub threshold: f32,
    pub downscale: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Store {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Preview {
    pub window: bool,
    pub snapshot: Option<PathBuf>,
    pub font_scale: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: "/dev/video0".to_string(),
            models: Models::default(),
            detection: Detection::default(),
            verify: Verify::default(),
            recognize: Recognize::default(),
            store: Store::default(),
            preview: Preview::default(),
        }
    }
}

impl Default for Models {
    fn default() -> Self {
        let dir = DATA_DIR.join("models");
        Self {
            detector: dir.join(facecheck_vision::model::DEFAULT_DETECTOR_FILE),
            recognizer: dir.join(facecheck_vision::model::DEFAULT_RECOGNIZER_FILE),
        }
    }
}

impl Default for Detection {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

impl Default for Verify {
    fn default() -> Self {
        Self {
            reference: PathBuf::from("uploads/me.jpg"),
            max_distance: 0.593,
        }
    }
}

impl Default for Recognize {
    fn default() -> Self {
        Self {
            reference: PathBuf::from("uploads/test.jpg"),
            threshold: 0.85,
            downscale: 4,
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self {
            dir: DATA_DIR.join("faces"),
        }
    }
}

impl Default for Preview {
    fn default() -> Self {
        Self {
            window: cfg!(feature = "window"),
            snapshot: None,
            font_scale: 2,
        }
    }
}

fn check(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("detection.score_threshold", self.detection.score_threshold, 0.0, 1.0)?;
        check("detection.nms_threshold", self.detection.nms_threshold, 0.0, 1.0)?;
        check("verify.max_distance", self.verify.max_distance, 0.0, 2.0)?;
        check("recognize.threshold", self.recognize.threshold, -1.0, 1.0)?;
        if self.recognize.downscale == 0 {
            return Err(ConfigError::ZeroDownscale);
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(CONFIG_PATH.as_path());
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(CONFIG_PATH.as_path());
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
