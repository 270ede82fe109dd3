use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{BackendRegistry, ScriptedBackend};
use crate::encode::{default_output_name, EncodeMode, FfmpegSettings, OutputNaming, OutputTarget};
use crate::error::init_failure;
use crate::event::SegmentPolicy;
use crate::ingest::file::{is_local_file_path, SyntheticConfig};
use crate::ingest::FileConfig;
use crate::progress::DEFAULT_PROGRESS_EVERY;

const DEFAULT_INPUT: &str = "stub://demo";
const DEFAULT_OUTPUT_DIR: &str = "processed_videos";
const DEFAULT_PROGRESS_NAME: &str = "progress.log";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_VIDEO_CODEC: &str = "libx264";
const DEFAULT_AUDIO_CODEC: &str = "aac";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.3;
const DEFAULT_MIN_FACE_SIZE: f32 = 50.0;
const DEFAULT_MIN_HAND_SIZE: f32 = 30.0;

#[derive(Debug, Deserialize, Default)]
struct ClipperConfigFile {
    input_path: Option<String>,
    output_dir: Option<PathBuf>,
    output_name: Option<String>,
    progress_path: Option<PathBuf>,
    progress_every: Option<u64>,
    segment: Option<SegmentPolicy>,
    encoder: Option<EncoderConfigFile>,
    detector: Option<DetectorConfigFile>,
    synthetic: Option<SyntheticConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct EncoderConfigFile {
    ffmpeg_path: Option<String>,
    video_codec: Option<String>,
    audio_codec: Option<String>,
    naming: Option<OutputNaming>,
    mode: Option<EncodeMode>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<DetectorKind>,
    script_path: Option<PathBuf>,
    face_model: Option<PathBuf>,
    hand_model: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence_threshold: Option<f32>,
    min_face_size: Option<f32>,
    min_hand_size: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SyntheticConfigFile {
    fps: Option<f64>,
    frames: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    #[default]
    Scripted,
    Tract,
}

#[derive(Debug, Clone)]
pub struct ClipperConfig {
    pub input_path: String,
    pub output_dir: PathBuf,
    /// Output file name; derived from the input path when unset.
    pub output_name: Option<String>,
    /// Progress snapshot path; `<output_dir>/progress.log` when unset.
    pub progress_path: Option<PathBuf>,
    pub progress_every: u64,
    pub segment: SegmentPolicy,
    pub encoder: EncoderSettings,
    pub detector: DetectorSettings,
    pub synthetic: SyntheticConfig,
}

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub ffmpeg_path: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub naming: OutputNaming,
    pub mode: EncodeMode,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: DetectorKind,
    /// Detection script for the scripted backend. Without one every frame
    /// has no regions.
    pub script_path: Option<PathBuf>,
    pub face_model: Option<PathBuf>,
    pub hand_model: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    pub min_face_size: f32,
    pub min_hand_size: f32,
}

impl ClipperConfig {
    /// Load from the file named by `CLIPPER_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like `load`, with an explicit config file taking precedence over
    /// `CLIPPER_CONFIG`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("CLIPPER_CONFIG").ok().map(PathBuf::from);
        let file_cfg = match config_path.or(env_path.as_deref()) {
            Some(path) => Some(read_config_file(path).map_err(init_failure)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env().map_err(init_failure)?;
        cfg.validate().map_err(init_failure)?;
        Ok(cfg)
    }

    fn from_file(file: ClipperConfigFile) -> Self {
        let encoder = file.encoder.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let synthetic = file.synthetic.unwrap_or_default();
        let synthetic_defaults = SyntheticConfig::default();
        Self {
            input_path: file.input_path.unwrap_or_else(|| DEFAULT_INPUT.to_string()),
            output_dir: file
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            output_name: file.output_name,
            progress_path: file.progress_path,
            progress_every: file.progress_every.unwrap_or(DEFAULT_PROGRESS_EVERY),
            segment: file.segment.unwrap_or_default(),
            encoder: EncoderSettings {
                ffmpeg_path: encoder
                    .ffmpeg_path
                    .unwrap_or_else(|| DEFAULT_FFMPEG.to_string()),
                video_codec: encoder
                    .video_codec
                    .unwrap_or_else(|| DEFAULT_VIDEO_CODEC.to_string()),
                audio_codec: encoder
                    .audio_codec
                    .unwrap_or_else(|| DEFAULT_AUDIO_CODEC.to_string()),
                naming: encoder.naming.unwrap_or_default(),
                mode: encoder.mode.unwrap_or_default(),
            },
            detector: DetectorSettings {
                backend: detector.backend.unwrap_or_default(),
                script_path: detector.script_path,
                face_model: detector.face_model,
                hand_model: detector.hand_model,
                input_width: detector.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                input_height: detector.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE),
                min_face_size: detector.min_face_size.unwrap_or(DEFAULT_MIN_FACE_SIZE),
                min_hand_size: detector.min_hand_size.unwrap_or(DEFAULT_MIN_HAND_SIZE),
            },
            synthetic: SyntheticConfig {
                fps: synthetic.fps.unwrap_or(synthetic_defaults.fps),
                frames: synthetic.frames.unwrap_or(synthetic_defaults.frames),
                width: synthetic.width.unwrap_or(synthetic_defaults.width),
                height: synthetic.height.unwrap_or(synthetic_defaults.height),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(input) = env_value("CLIPPER_INPUT") {
            self.input_path = input;
        }
        if let Some(dir) = env_value("CLIPPER_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_value("CLIPPER_PROGRESS_PATH") {
            self.progress_path = Some(PathBuf::from(path));
        }
        if let Some(codec) = env_value("CLIPPER_VIDEO_CODEC") {
            self.encoder.video_codec = codec;
        }
        if let Some(codec) = env_value("CLIPPER_AUDIO_CODEC") {
            self.encoder.audio_codec = codec;
        }
        if let Some(value) = env_value("CLIPPER_LEAD_IN") {
            self.segment.lead_in = parse_seconds("CLIPPER_LEAD_IN", &value)?;
        }
        if let Some(value) = env_value("CLIPPER_LEAD_OUT") {
            self.segment.lead_out = parse_seconds("CLIPPER_LEAD_OUT", &value)?;
        }
        if let Some(value) = env_value("CLIPPER_MIN_EVENT_SECONDS") {
            self.segment.min_event_seconds = parse_seconds("CLIPPER_MIN_EVENT_SECONDS", &value)?;
        }
        if let Some(value) = env_value("CLIPPER_NAMING") {
            self.encoder.naming = match value.to_lowercase().as_str() {
                "single" => OutputNaming::Single,
                "per_segment" | "per-segment" => OutputNaming::PerSegment,
                other => {
                    return Err(anyhow!(
                        "CLIPPER_NAMING must be 'single' or 'per_segment', got '{}'",
                        other
                    ))
                }
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_path.trim().is_empty() {
            return Err(anyhow!("input_path must not be empty"));
        }
        if !is_local_file_path(&self.input_path) {
            return Err(anyhow!(
                "input_path must be a local file or stub:// source, got '{}'",
                self.input_path
            ));
        }
        if !(self.segment.lead_in >= 0.0) || !(self.segment.lead_out >= 0.0) {
            return Err(anyhow!("segment lead_in and lead_out must be non-negative"));
        }
        if !(self.segment.min_event_seconds > 0.0) {
            return Err(anyhow!("segment min_event_seconds must be greater than zero"));
        }
        if self.progress_every == 0 {
            return Err(anyhow!("progress_every must be greater than zero"));
        }
        if self.encoder.video_codec.trim().is_empty() || self.encoder.audio_codec.trim().is_empty()
        {
            return Err(anyhow!("encoder codecs must not be empty"));
        }
        if self.encoder.ffmpeg_path.trim().is_empty() {
            return Err(anyhow!("encoder ffmpeg_path must not be empty"));
        }
        if let Some(name) = &self.output_name {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(anyhow!("output_name must be a plain file name"));
            }
        }
        if !(self.synthetic.fps > 0.0) {
            return Err(anyhow!("synthetic fps must be greater than zero"));
        }
        if self.detector.backend == DetectorKind::Tract
            && (self.detector.face_model.is_none() || self.detector.hand_model.is_none())
        {
            return Err(anyhow!("tract backend requires face_model and hand_model"));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within [0, 1]"));
        }
        Ok(())
    }

    /// Output file all segments are written to (or derived from, with
    /// per-segment naming).
    pub fn output_path(&self) -> PathBuf {
        let name = self
            .output_name
            .clone()
            .unwrap_or_else(|| default_output_name(&self.input_path));
        self.output_dir.join(name)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.progress_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(DEFAULT_PROGRESS_NAME))
    }

    pub fn output_target(&self) -> OutputTarget {
        OutputTarget::new(self.output_path(), self.encoder.naming)
    }

    pub fn file_config(&self) -> FileConfig {
        FileConfig {
            path: self.input_path.clone(),
            synthetic: self.synthetic.clone(),
        }
    }

    pub fn ffmpeg_settings(&self) -> FfmpegSettings {
        FfmpegSettings {
            ffmpeg_path: self.encoder.ffmpeg_path.clone(),
            input_path: PathBuf::from(&self.input_path),
            video_codec: self.encoder.video_codec.clone(),
            audio_codec: self.encoder.audio_codec.clone(),
        }
    }

    /// Build the detector backends. Any failure here is an initialization
    /// failure.
    pub fn build_registry(&self) -> Result<BackendRegistry> {
        let mut registry = BackendRegistry::new();
        match self.detector.backend {
            DetectorKind::Scripted => {
                let backend = match &self.detector.script_path {
                    Some(path) => ScriptedBackend::from_json_file(path).map_err(init_failure)?,
                    None => ScriptedBackend::new(),
                };
                log::info!("scripted detector with {} entries", backend.len());
                registry.register(backend);
            }
            DetectorKind::Tract => self.register_tract(&mut registry)?,
        }
        Ok(registry)
    }

    #[cfg(feature = "backend-tract")]
    fn register_tract(&self, registry: &mut BackendRegistry) -> Result<()> {
        use crate::detect::{RegionClass, TractBackend, TractSettings};

        let models = [
            (
                RegionClass::Face,
                self.detector.face_model.as_ref(),
                self.detector.min_face_size,
            ),
            (
                RegionClass::Hand,
                self.detector.hand_model.as_ref(),
                self.detector.min_hand_size,
            ),
        ];
        for (class, model, min_size) in models {
            let model_path = model
                .cloned()
                .ok_or_else(|| init_failure(anyhow!("no {} model configured", class.as_str())))?;
            let backend = TractBackend::load(TractSettings {
                model_path,
                class,
                input_width: self.detector.input_width,
                input_height: self.detector.input_height,
                confidence_threshold: self.detector.confidence_threshold,
                min_size,
            })
            .map_err(init_failure)?;
            registry.register_as(format!("tract-{}", class.as_str()), backend);
        }
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    fn register_tract(&self, _registry: &mut BackendRegistry) -> Result<()> {
        Err(init_failure(anyhow!(
            "tract backend requires the backend-tract feature"
        )))
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_seconds(key: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| anyhow!("{} must be a number of seconds", key))
}

fn read_config_file(path: &Path) -> Result<ClipperConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
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
