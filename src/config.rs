use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::detect::backends::mixture::{
    DEFAULT_BACKGROUND_RATIO, DEFAULT_DETECT_SHADOWS, DEFAULT_HISTORY, DEFAULT_INITIAL_VARIANCE,
    DEFAULT_MAX_COMPONENTS, DEFAULT_MAX_VARIANCE, DEFAULT_MIN_VARIANCE, DEFAULT_SHADOW_RATIO,
    DEFAULT_VAR_THRESHOLD,
};
use crate::detect::filter::{
    DEFAULT_LABEL, DEFAULT_MAX_AREA, DEFAULT_MAX_ASPECT_RATIO, DEFAULT_MIN_AREA,
    DEFAULT_MIN_ASPECT_RATIO, DEFAULT_MIN_EXTENT, DEFAULT_MIN_SOLIDITY,
};
use crate::detect::{FilterThresholds, KernelShape, MixtureConfig, PipelineSettings};
use crate::eval::DEFAULT_IOU_THRESHOLD;
use crate::logging::LogSettings;

pub const CONFIG_ENV: &str = "TRAFFIC_CV_CONFIG";

const DEFAULT_IMAGE_DIR: &str = "data/images";
const DEFAULT_ANNOTATIONS_DIR: &str = "data/annotations";
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_LOG_LEVEL: &str = "info";
const MAX_COMPONENTS_LIMIT: usize = 16;

#[derive(Debug, Deserialize, Default)]
struct TrafficConfigFile {
    paths: Option<PathsConfigFile>,
    background: Option<BackgroundConfigFile>,
    mask: Option<MaskConfigFile>,
    morphology: Option<MorphologyConfigFile>,
    filter: Option<FilterConfigFile>,
    evaluation: Option<EvaluationConfigFile>,
    logging: Option<LoggingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct PathsConfigFile {
    image_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    annotations_dir: Option<PathBuf>,
    font_path: Option<PathBuf>,
    save_debug: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct BackgroundConfigFile {
    stream_mode: Option<StreamMode>,
    history: Option<u32>,
    var_threshold: Option<f64>,
    detect_shadows: Option<bool>,
    shadow_ratio: Option<f64>,
    max_components: Option<usize>,
    background_ratio: Option<f64>,
    initial_variance: Option<f64>,
    min_variance: Option<f64>,
    max_variance: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct MaskConfigFile {
    threshold: Option<u8>,
    max_value: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct MorphologyConfigFile {
    kernel_shape: Option<KernelShape>,
    kernel_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct FilterConfigFile {
    min_area: Option<u64>,
    max_area: Option<u64>,
    min_aspect_ratio: Option<f64>,
    max_aspect_ratio: Option<f64>,
    min_extent: Option<f64>,
    min_solidity: Option<f64>,
    label: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EvaluationConfigFile {
    iou_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingConfigFile {
    level: Option<String>,
    file: Option<PathBuf>,
}

/// How background statistics are shared across a directory of images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Every image is its own one-frame stream.
    #[default]
    PerImage,
    /// The sorted images form one stream sharing a model.
    Sequence,
}

impl FromStr for StreamMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_image" => Ok(StreamMode::PerImage),
            "sequence" => Ok(StreamMode::Sequence),
            other => Err(anyhow!(
                "unknown stream mode '{}' (expected per_image or sequence)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathSettings {
    pub image_dir: PathBuf,
    pub output_dir: PathBuf,
    pub annotations_dir: PathBuf,
    pub font_path: Option<PathBuf>,
    pub save_debug: bool,
}

impl PathSettings {
    pub fn results_dir(&self) -> PathBuf {
        self.output_dir.join("results")
    }

    pub fn images_out_dir(&self) -> PathBuf {
        self.output_dir.join("images")
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.output_dir.join("debug")
    }

    pub fn report_dir(&self) -> PathBuf {
        self.output_dir.join("evaluation")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrafficConfig {
    pub paths: PathSettings,
    pub stream_mode: StreamMode,
    pub background: MixtureConfig,
    pub pipeline: PipelineSettings,
    pub iou_threshold: f64,
    pub logging: LogSettings,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self::from_file(TrafficConfigFile::default())
    }
}

impl TrafficConfig {
    /// Defaults, then the file named by `TRAFFIC_CV_CONFIG`, then
    /// `TRAFFIC_CV_*` environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok().filter(|p| !p.trim().is_empty());
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a specific file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrafficConfigFile) -> Self {
        let paths = file.paths.unwrap_or_default();
        let background = file.background.unwrap_or_default();
        let mask = file.mask.unwrap_or_default();
        let morphology = file.morphology.unwrap_or_default();
        let filter = file.filter.unwrap_or_default();
        let logging = file.logging.unwrap_or_default();

        Self {
            paths: PathSettings {
                image_dir: paths
                    .image_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_DIR)),
                output_dir: paths
                    .output_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
                annotations_dir: paths
                    .annotations_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_ANNOTATIONS_DIR)),
                font_path: paths.font_path,
                save_debug: paths.save_debug.unwrap_or(true),
            },
            stream_mode: background.stream_mode.unwrap_or_default(),
            background: MixtureConfig {
                history: background.history.unwrap_or(DEFAULT_HISTORY),
                var_threshold: background.var_threshold.unwrap_or(DEFAULT_VAR_THRESHOLD),
                detect_shadows: background.detect_shadows.unwrap_or(DEFAULT_DETECT_SHADOWS),
                shadow_ratio: background.shadow_ratio.unwrap_or(DEFAULT_SHADOW_RATIO),
                max_components: background.max_components.unwrap_or(DEFAULT_MAX_COMPONENTS),
                background_ratio: background
                    .background_ratio
                    .unwrap_or(DEFAULT_BACKGROUND_RATIO),
                initial_variance: background
                    .initial_variance
                    .unwrap_or(DEFAULT_INITIAL_VARIANCE),
                min_variance: background.min_variance.unwrap_or(DEFAULT_MIN_VARIANCE),
                max_variance: background.max_variance.unwrap_or(DEFAULT_MAX_VARIANCE),
            },
            pipeline: PipelineSettings {
                mask_threshold: mask
                    .threshold
                    .unwrap_or(crate::detect::pipeline::DEFAULT_MASK_THRESHOLD),
                mask_max_value: mask
                    .max_value
                    .unwrap_or(crate::detect::pipeline::DEFAULT_MASK_MAX_VALUE),
                kernel_shape: morphology.kernel_shape.unwrap_or_default(),
                kernel_size: morphology
                    .kernel_size
                    .unwrap_or(crate::detect::pipeline::DEFAULT_KERNEL_SIZE),
                filter: FilterThresholds {
                    min_area: filter.min_area.unwrap_or(DEFAULT_MIN_AREA),
                    max_area: filter.max_area.unwrap_or(DEFAULT_MAX_AREA),
                    min_aspect_ratio: filter.min_aspect_ratio.unwrap_or(DEFAULT_MIN_ASPECT_RATIO),
                    max_aspect_ratio: filter.max_aspect_ratio.unwrap_or(DEFAULT_MAX_ASPECT_RATIO),
                    min_extent: filter.min_extent.unwrap_or(DEFAULT_MIN_EXTENT),
                    min_solidity: filter.min_solidity.unwrap_or(DEFAULT_MIN_SOLIDITY),
                    label: filter.label.unwrap_or_else(|| DEFAULT_LABEL.to_string()),
                },
            },
            iou_threshold: file
                .evaluation
                .and_then(|e| e.iou_threshold)
                .unwrap_or(DEFAULT_IOU_THRESHOLD),
            logging: LogSettings {
                level: logging.level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
                file: logging.file,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = env_value("TRAFFIC_CV_IMAGE_DIR") {
            self.paths.image_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_value("TRAFFIC_CV_OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_value("TRAFFIC_CV_ANNOTATIONS_DIR") {
            self.paths.annotations_dir = PathBuf::from(dir);
        }
        if let Some(iou) = env_value("TRAFFIC_CV_IOU_THRESHOLD") {
            self.iou_threshold = iou
                .parse()
                .map_err(|_| anyhow!("TRAFFIC_CV_IOU_THRESHOLD must be a number"))?;
        }
        if let Some(mode) = env_value("TRAFFIC_CV_STREAM_MODE") {
            self.stream_mode = mode.parse()?;
        }
        if let Some(path) = env_value("TRAFFIC_CV_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let bg = &self.background;
        if bg.history == 0 {
            return Err(anyhow!("background history must be greater than zero"));
        }
        if !(bg.var_threshold > 0.0) {
            return Err(anyhow!("background var_threshold must be positive"));
        }
        if !(bg.shadow_ratio > 0.0 && bg.shadow_ratio <= 1.0) {
            return Err(anyhow!("background shadow_ratio must be in (0, 1]"));
        }
        if bg.max_components == 0 || bg.max_components > MAX_COMPONENTS_LIMIT {
            return Err(anyhow!(
                "background max_components must be between 1 and {}",
                MAX_COMPONENTS_LIMIT
            ));
        }
        if !(bg.background_ratio > 0.0 && bg.background_ratio <= 1.0) {
            return Err(anyhow!("background background_ratio must be in (0, 1]"));
        }
        if !(bg.min_variance > 0.0 && bg.min_variance <= bg.max_variance) {
            return Err(anyhow!(
                "background variance bounds must satisfy 0 < min_variance <= max_variance"
            ));
        }
        if !(bg.initial_variance > 0.0) {
            return Err(anyhow!("background initial_variance must be positive"));
        }

        if self.pipeline.kernel_size == 0 {
            return Err(anyhow!("morphology kernel_size must be at least 1"));
        }

        let f = &self.pipeline.filter;
        if f.min_area > f.max_area {
            return Err(anyhow!("filter min_area exceeds max_area"));
        }
        if !(f.min_aspect_ratio > 0.0 && f.min_aspect_ratio <= f.max_aspect_ratio) {
            return Err(anyhow!(
                "filter aspect ratio bounds must satisfy 0 < min <= max"
            ));
        }
        for (name, value) in [("min_extent", f.min_extent), ("min_solidity", f.min_solidity)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("filter {} must be in [0, 1]", name));
            }
        }
        if f.label.is_empty() || f.label.chars().any(char::is_whitespace) {
            return Err(anyhow!("filter label must be a single non-empty word"));
        }

        if !(self.iou_threshold > 0.0 && self.iou_threshold <= 1.0) {
            return Err(anyhow!("evaluation iou_threshold must be in (0, 1]"));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<TrafficConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_detector_constants() {
        let cfg = TrafficConfig::default();
        assert_eq!(cfg.background, MixtureConfig::default());
        assert_eq!(cfg.pipeline, PipelineSettings::default());
        assert_eq!(cfg.iou_threshold, 0.5);
        assert_eq!(cfg.stream_mode, StreamMode::PerImage);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn stream_mode_parses() {
        assert_eq!("sequence".parse::<StreamMode>().unwrap(), StreamMode::Sequence);
        assert_eq!("per-image".parse::<StreamMode>().unwrap(), StreamMode::PerImage);
        assert!("video".parse::<StreamMode>().is_err());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = TrafficConfig::default();
        cfg.background.history = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = TrafficConfig::default();
        cfg.pipeline.kernel_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = TrafficConfig::default();
        cfg.pipeline.filter.min_area = 5000;
        cfg.pipeline.filter.max_area = 4000;
        assert!(cfg.validate().is_err());

        for iou in [0.0, 1.5, f64::NAN] {
            let mut cfg = TrafficConfig::default();
            cfg.iou_threshold = iou;
            assert!(cfg.validate().is_err(), "iou {} accepted", iou);
        }

        let mut cfg = TrafficConfig::default();
        cfg.pipeline.filter.label = "big car".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn output_layout_hangs_off_output_dir() {
        let mut cfg = TrafficConfig::default();
        cfg.paths.output_dir = PathBuf::from("/tmp/run");
        assert_eq!(cfg.paths.results_dir(), PathBuf::from("/tmp/run/results"));
        assert_eq!(cfg.paths.report_dir(), PathBuf::from("/tmp/run/evaluation"));
    }
}
