use serde_derive::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::predictor::MotionModel;

pub const CONFIG_ENV: &str = "SPEEDTRACK_CONFIG";

const DEFAULT_IOU_THRESHOLD: f32 = 0.3;
const DEFAULT_MAX_MISSES: u32 = 1;
const DEFAULT_HISTORY_LEN: usize = 16;
const DEFAULT_DETECTION_LINE_Y: f32 = 300.0;
// COCO car, motorbike, bus, truck
const DEFAULT_VEHICLE_CLASSES: [i32; 4] = [2, 3, 5, 7];
const DEFAULT_CALIBRATION_FACTOR: f64 = 5.6;
const DEFAULT_SPEED_UNIT: &str = "km/h";
const DEFAULT_SPEED_LIMIT: f64 = 80.0;
const DEFAULT_CROP_WIDTH: u32 = 250;
const DEFAULT_FRAME_STRIDE: u32 = 3;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_FPS: f64 = 25.0;
const DEFAULT_FONT_SCALE: f32 = 16.0;

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    tracker: Option<TrackerConfigFile>,
    speed: Option<SpeedConfigFile>,
    violation: Option<ViolationConfigFile>,
    plate: Option<PlateConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    annotate: Option<AnnotateConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    iou_threshold: Option<f32>,
    max_misses: Option<u32>,
    history_len: Option<usize>,
    detection_line_y: Option<f32>,
    vehicle_classes: Option<Vec<i32>>,
    motion_model: Option<MotionModel>,
}

#[derive(Debug, Deserialize, Default)]
struct SpeedConfigFile {
    calibration_factor: Option<f64>,
    unit: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ViolationConfigFile {
    speed_limit: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct PlateConfigFile {
    crop_width: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    frame_stride: Option<u32>,
    jpeg_quality: Option<u8>,
    fps: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotateConfigFile {
    font_path: Option<PathBuf>,
    font_scale: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Minimum IoU between a predicted track box and a detection to match them
    pub iou_threshold: f32,
    /// A track is evicted once it missed more than this many updates in a row
    pub max_misses: u32,
    pub history_len: usize,
    /// Detections with their center above this row are not tracked yet
    pub detection_line_y: f32,
    pub vehicle_classes: Vec<i32>,
    pub motion_model: MotionModel,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_misses: DEFAULT_MAX_MISSES,
            history_len: DEFAULT_HISTORY_LEN,
            detection_line_y: DEFAULT_DETECTION_LINE_Y,
            vehicle_classes: DEFAULT_VEHICLE_CLASSES.to_vec(),
            motion_model: MotionModel::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedConfig {
    /// Converts px/s into `unit`
    pub calibration_factor: f64,
    pub unit: String,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            calibration_factor: DEFAULT_CALIBRATION_FACTOR,
            unit: DEFAULT_SPEED_UNIT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViolationConfig {
    pub speed_limit: f64,
}

impl Default for ViolationConfig {
    fn default() -> Self {
        Self {
            speed_limit: DEFAULT_SPEED_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlateConfig {
    /// Crops are resized to this width before reading, `None` keeps them as is
    pub crop_width: Option<u32>,
}

impl Default for PlateConfig {
    fn default() -> Self {
        Self {
            crop_width: Some(DEFAULT_CROP_WIDTH),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Only every `frame_stride`-th frame is processed
    pub frame_stride: u32,
    pub jpeg_quality: u8,
    /// Frame rate assumed by sources that carry no timestamps
    pub fps: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_stride: DEFAULT_FRAME_STRIDE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            fps: DEFAULT_FPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotateConfig {
    /// Labels are drawn only when a TTF/OTF font is configured
    pub font_path: Option<PathBuf>,
    pub font_scale: f32,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_scale: DEFAULT_FONT_SCALE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub speed: SpeedConfig,
    pub violation: ViolationConfig,
    pub plate: PlateConfig,
    pub pipeline: PipelineConfig,
    pub annotate: AnnotateConfig,
}

impl Config {
    /// Reads the file named by `SPEEDTRACK_CONFIG` (if set), applies the
    /// environment overrides and validates the result.
    pub fn load() -> Result<Self, Error> {
        let path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self, Error> {
        let file = match path {
            Some(path) => read_config_file(path)?,
            None => ConfigFile::default(),
        };

        let mut cfg = Self::from_file(file);
        cfg.apply_env()?;
        cfg.validate()?;

        Ok(cfg)
    }

    /// Parses TOML without looking at the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        let cfg = Self::from_file(toml::from_str(raw)?);
        cfg.validate()?;

        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Self {
        let tracker = file.tracker.unwrap_or_default();
        let speed = file.speed.unwrap_or_default();
        let violation = file.violation.unwrap_or_default();
        let plate = file.plate.unwrap_or_default();
        let pipeline = file.pipeline.unwrap_or_default();
        let annotate = file.annotate.unwrap_or_default();

        Self {
            tracker: TrackerConfig {
                iou_threshold: tracker.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
                max_misses: tracker.max_misses.unwrap_or(DEFAULT_MAX_MISSES),
                history_len: tracker.history_len.unwrap_or(DEFAULT_HISTORY_LEN),
                detection_line_y: tracker.detection_line_y.unwrap_or(DEFAULT_DETECTION_LINE_Y),
                vehicle_classes: tracker
                    .vehicle_classes
                    .unwrap_or_else(|| DEFAULT_VEHICLE_CLASSES.to_vec()),
                motion_model: tracker.motion_model.unwrap_or_default(),
            },
            speed: SpeedConfig {
                calibration_factor: speed
                    .calibration_factor
                    .unwrap_or(DEFAULT_CALIBRATION_FACTOR),
                unit: speed.unit.unwrap_or_else(|| DEFAULT_SPEED_UNIT.to_string()),
            },
            violation: ViolationConfig {
                speed_limit: violation.speed_limit.unwrap_or(DEFAULT_SPEED_LIMIT),
            },
            plate: PlateConfig {
                // 0 in the file turns resizing off
                crop_width: match plate.crop_width {
                    Some(0) => None,
                    Some(width) => Some(width),
                    None => Some(DEFAULT_CROP_WIDTH),
                },
            },
            pipeline: PipelineConfig {
                frame_stride: pipeline.frame_stride.unwrap_or(DEFAULT_FRAME_STRIDE),
                jpeg_quality: pipeline.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                fps: pipeline.fps.unwrap_or(DEFAULT_FPS),
            },
            annotate: AnnotateConfig {
                font_path: annotate.font_path,
                font_scale: annotate.font_scale.unwrap_or(DEFAULT_FONT_SCALE),
            },
        }
    }

    fn apply_env(&mut self) -> Result<(), Error> {
        if let Some(limit) = env_number::<f64>("SPEEDTRACK_SPEED_LIMIT")? {
            self.violation.speed_limit = limit;
        }
        if let Some(stride) = env_number::<u32>("SPEEDTRACK_FRAME_STRIDE")? {
            self.pipeline.frame_stride = stride;
        }
        if let Some(line) = env_number::<f32>("SPEEDTRACK_DETECTION_LINE")? {
            self.tracker.detection_line_y = line;
        }
        if let Some(factor) = env_number::<f64>("SPEEDTRACK_CALIBRATION")? {
            self.speed.calibration_factor = factor;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.pipeline.frame_stride == 0 {
            return Err(Error::Config("frame_stride must be at least 1".into()));
        }
        if !(self.tracker.iou_threshold > 0.0 && self.tracker.iou_threshold <= 1.0) {
            return Err(Error::Config("iou_threshold must be in (0, 1]".into()));
        }
        if self.tracker.history_len < 2 {
            return Err(Error::Config("history_len must be at least 2".into()));
        }
        if !(self.speed.calibration_factor.is_finite() && self.speed.calibration_factor > 0.0) {
            return Err(Error::Config("calibration_factor must be positive".into()));
        }
        if !self.violation.speed_limit.is_finite() {
            return Err(Error::Config("speed_limit must be a finite number".into()));
        }
        if !(self.pipeline.fps.is_finite() && self.pipeline.fps > 0.0) {
            return Err(Error::Config("fps must be positive".into()));
        }
        if self.pipeline.jpeg_quality == 0 || self.pipeline.jpeg_quality > 100 {
            return Err(Error::Config("jpeg_quality must be in 1..=100".into()));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile, Error> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    toml::from_str(&raw)
        .map_err(|e| Error::Config(format!("invalid config file {}: {}", path.display(), e)))
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>, Error> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} must be a number", key))),
        _ => Ok(None),
    }
}
