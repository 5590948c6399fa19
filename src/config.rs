use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::calories::FoodInfo;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_API_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_CAMERA_URL: &str = "stub://webcam";
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "models/best.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_STABILIZATION_DELAY_MS: u64 = 500;
const DEFAULT_STALENESS_WINDOW_MS: u64 = 5_000;

/// Model class names in class-id order.
pub const DEFAULT_FOOD_CLASSES: [&str; 10] = [
    "Apple",
    "Banana",
    "Watermelon",
    "Strawberry",
    "Orange",
    "Bread",
    "Carrot",
    "Cucumber",
    "Broccoli",
    "Pizza",
];

#[derive(Debug, Deserialize, Default)]
struct FoodLensConfigFile {
    data_dir: Option<PathBuf>,
    api: Option<ApiConfigFile>,
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    foods: Option<Vec<FoodInfo>>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    script_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    stabilization_delay_ms: Option<u64>,
    staleness_window_ms: Option<u64>,
    classes: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct FoodLensConfig {
    pub data_dir: PathBuf,
    pub api_addr: String,
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub foods: Vec<FoodInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// Stop the stream after this many frames (synthetic sources only).
    pub max_frames: Option<u64>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_CAMERA_URL.to_string(),
            target_fps: DEFAULT_CAMERA_FPS,
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            max_frames: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub script_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub stabilization_delay: Duration,
    pub staleness_window: Duration,
    pub classes: Vec<String>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            script_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            stabilization_delay: Duration::from_millis(DEFAULT_STABILIZATION_DELAY_MS),
            staleness_window: Duration::from_millis(DEFAULT_STALENESS_WINDOW_MS),
            classes: DEFAULT_FOOD_CLASSES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl FoodLensConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FOOD_LENS_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FoodLensConfigFile) -> Self {
        let data_dir = file
            .data_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());

        let camera_file = file.camera.unwrap_or_default();
        let camera_defaults = CameraSettings::default();
        let camera = CameraSettings {
            url: camera_file.url.unwrap_or(camera_defaults.url),
            target_fps: camera_file.target_fps.unwrap_or(camera_defaults.target_fps),
            width: camera_file.width.unwrap_or(camera_defaults.width),
            height: camera_file.height.unwrap_or(camera_defaults.height),
            max_frames: camera_file.max_frames,
        };

        let det = file.detection.unwrap_or_default();
        let det_defaults = DetectionSettings::default();
        let detection = DetectionSettings {
            backend: det.backend.unwrap_or(det_defaults.backend),
            model_path: det.model_path.unwrap_or(det_defaults.model_path),
            script_path: det.script_path,
            input_size: det.input_size.unwrap_or(det_defaults.input_size),
            confidence_threshold: det
                .confidence_threshold
                .unwrap_or(det_defaults.confidence_threshold),
            stabilization_delay: det
                .stabilization_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(det_defaults.stabilization_delay),
            staleness_window: det
                .staleness_window_ms
                .map(Duration::from_millis)
                .unwrap_or(det_defaults.staleness_window),
            classes: det.classes.unwrap_or(det_defaults.classes),
        };

        Self {
            data_dir,
            api_addr,
            camera,
            detection,
            foods: file.foods.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("FOOD_LENS_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(addr) = std::env::var("FOOD_LENS_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| anyhow!("PORT must be a TCP port number"))?;
            let mut addr: SocketAddr = self
                .api_addr
                .parse()
                .map_err(|e| anyhow!("invalid api address '{}': {}", self.api_addr, e))?;
            addr.set_port(port);
            self.api_addr = addr.to_string();
        }
        if let Ok(url) = std::env::var("FOOD_LENS_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(backend) = std::env::var("FOOD_LENS_BACKEND") {
            if !backend.trim().is_empty() {
                self.detection.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(path) = std::env::var("FOOD_LENS_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detection.model_path = PathBuf::from(path);
            }
        }
        if let Ok(threshold) = std::env::var("FOOD_LENS_CONFIDENCE") {
            self.detection.confidence_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("FOOD_LENS_CONFIDENCE must be a number between 0 and 1"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(anyhow!("data_dir must not be empty"));
        }
        let threshold = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                threshold
            ));
        }
        if self.detection.stabilization_delay.is_zero() {
            return Err(anyhow!("stabilization delay must be greater than zero"));
        }
        if self.detection.staleness_window < self.detection.stabilization_delay {
            return Err(anyhow!(
                "staleness window must not be shorter than the stabilization delay"
            ));
        }
        if self.detection.classes.is_empty() {
            return Err(anyhow!("at least one detection class is required"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<FoodLensConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = FoodLensConfig::from_file(FoodLensConfigFile::default());
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.detection.stabilization_delay, Duration::from_millis(500));
        assert_eq!(cfg.detection.staleness_window, Duration::from_secs(5));
        assert_eq!(cfg.detection.classes.len(), 10);
        assert_eq!(cfg.api_addr, "127.0.0.1:5000");
    }

    #[test]
    fn rejects_staleness_shorter_than_delay() {
        let mut cfg = FoodLensConfig::from_file(FoodLensConfigFile::default());
        cfg.detection.staleness_window = Duration::from_millis(100);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut cfg = FoodLensConfig::from_file(FoodLensConfigFile::default());
        cfg.detection.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }
}
