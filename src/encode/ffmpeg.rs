//! Segment encoder driving the `ffmpeg` executable.
//!
//! Each segment takes two ffmpeg runs against the original source:
//! 1. the audio of the window is encoded into a scratch file;
//! 2. the video of the window is encoded and muxed with the scratch audio.
//!
//! The scratch file is removed after every encode, successful or not.
//! Sources without an audio stream produce video-only output.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};

use super::{OutputTarget, SegmentEncoder};
use crate::error::ClipperError;
use crate::event::Segment;

/// Scratch audio file name, created next to the output.
pub const SCRATCH_AUDIO_NAME: &str = "temp-audio.m4a";

/// Bytes of ffmpeg stderr kept in error messages.
const STDERR_TAIL: usize = 500;

#[derive(Clone, Debug)]
pub struct FfmpegSettings {
    pub ffmpeg_path: String,
    pub input_path: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            input_path: PathBuf::new(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
        }
    }
}

pub struct FfmpegEncoder {
    settings: FfmpegSettings,
    target: OutputTarget,
}

impl FfmpegEncoder {
    pub fn new(settings: FfmpegSettings, target: OutputTarget) -> Self {
        Self { settings, target }
    }

    pub fn scratch_audio_path(&self) -> PathBuf {
        self.target.dir().join(SCRATCH_AUDIO_NAME)
    }

    fn extract_audio(&self, segment: &Segment, scratch: &Path) -> Result<bool> {
        let args = audio_args(&self.settings, segment, scratch);
        match run_ffmpeg(&self.settings.ffmpeg_path, &args) {
            Ok(()) => Ok(true),
            Err(FfmpegFailure::Exit(stderr)) if is_missing_audio(&stderr) => {
                log::debug!("source has no audio stream; encoding video only");
                Ok(false)
            }
            Err(failure) => Err(failure.into_error("audio extraction")),
        }
    }

    fn encode_video(&self, segment: &Segment, scratch: Option<&Path>, output: &Path) -> Result<()> {
        let args = video_args(&self.settings, segment, scratch, output);
        run_ffmpeg(&self.settings.ffmpeg_path, &args)
            .map_err(|failure| failure.into_error("video encode"))
    }
}

impl SegmentEncoder for FfmpegEncoder {
    fn encode(&mut self, segment: &Segment) -> Result<PathBuf> {
        let output = self.target.path_for(segment);
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output directory {}", parent.display()))?;
        }
        let scratch = self.scratch_audio_path();

        log::info!(
            "encoding segment {:.2}s - {:.2}s -> {}",
            segment.start_time,
            segment.end_time,
            output.display()
        );

        let result = self
            .extract_audio(segment, &scratch)
            .and_then(|has_audio| {
                self.encode_video(segment, has_audio.then_some(scratch.as_path()), &output)
            });

        if scratch.exists() {
            if let Err(e) = std::fs::remove_file(&scratch) {
                log::warn!("failed to remove scratch audio {}: {}", scratch.display(), e);
            }
        }

        result?;
        log::info!(
            "segment encoded {:.2}s - {:.2}s -> {}",
            segment.start_time,
            segment.end_time,
            output.display()
        );
        Ok(output)
    }

    fn target(&self) -> OutputTarget {
        self.target.clone()
    }
}

enum FfmpegFailure {
    Spawn(std::io::Error),
    Exit(String),
}

impl FfmpegFailure {
    fn into_error(self, stage: &str) -> anyhow::Error {
        let message = match self {
            FfmpegFailure::Spawn(e) => format!("{stage}: ffmpeg could not be started: {e}"),
            FfmpegFailure::Exit(stderr) => format!("{stage}: {}", tail(&stderr)),
        };
        anyhow::Error::new(ClipperError::Encoding(message))
    }
}

fn run_ffmpeg(program: &str, args: &[String]) -> std::result::Result<(), FfmpegFailure> {
    log::debug!("ffmpeg {}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(FfmpegFailure::Spawn)?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let stderr = if stderr.trim().is_empty() {
            format!("ffmpeg exited with {}", output.status)
        } else {
            stderr
        };
        Err(FfmpegFailure::Exit(stderr))
    }
}

fn is_missing_audio(stderr: &str) -> bool {
    stderr.contains("does not contain any stream")
        || stderr.contains("matches no streams")
}

fn tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - STDERR_TAIL).collect()
}

fn is_mp4_family(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| matches!(ext.as_str(), "mp4" | "m4v" | "mov"))
}

fn window_args(segment: &Segment) -> (String, String) {
    (
        format!("{:.3}", segment.start_time),
        format!("{:.3}", segment.duration()),
    )
}

pub(crate) fn audio_args(
    settings: &FfmpegSettings,
    segment: &Segment,
    scratch: &Path,
) -> Vec<String> {
    let (start, duration) = window_args(segment);
    vec![
        "-v".into(),
        "warning".into(),
        "-ss".into(),
        start,
        "-i".into(),
        settings.input_path.to_string_lossy().into_owned(),
        "-t".into(),
        duration,
        "-vn".into(),
        "-map".into(),
        "0:a:0".into(),
        "-c:a".into(),
        settings.audio_codec.clone(),
        "-y".into(),
        scratch.to_string_lossy().into_owned(),
    ]
}

pub(crate) fn video_args(
    settings: &FfmpegSettings,
    segment: &Segment,
    scratch: Option<&Path>,
    output: &Path,
) -> Vec<String> {
    let (start, duration) = window_args(segment);
    let mut args: Vec<String> = vec![
        "-v".into(),
        "warning".into(),
        "-ss".into(),
        start,
        "-i".into(),
        settings.input_path.to_string_lossy().into_owned(),
    ];
    if let Some(scratch) = scratch {
        args.extend(["-i".into(), scratch.to_string_lossy().into_owned()]);
    }
    args.extend(["-t".into(), duration, "-map".into(), "0:v:0".into()]);
    if scratch.is_some() {
        args.extend(["-map".into(), "1:a:0".into(), "-c:a".into(), "copy".into()]);
    } else {
        args.push("-an".into());
    }
    args.extend([
        "-c:v".into(),
        settings.video_codec.clone(),
        "-avoid_negative_ts".into(),
        "make_zero".into(),
    ]);
    if is_mp4_family(output) {
        args.extend(["-movflags".into(), "+faststart".into()]);
    }
    args.push("-y".into());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Fail early when the configured ffmpeg executable cannot be started.
pub fn probe_ffmpeg(program: &str) -> Result<()> {
    let status = Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("ffmpeg executable '{}' could not be started", program))?;
    if !status.success() {
        return Err(anyhow!("'{} -version' exited with {}", program, status));
    }
    Ok(())
}
