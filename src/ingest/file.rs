//! Local file frame source.
//!
//! `FileSource` reads frames from a local video file, or from a synthetic
//! `stub://` source for dry runs. The file source is responsible for:
//! - Decoding frames in order, in memory
//! - Reporting frame rate and container duration before the first frame
//! - Stamping each frame with its 1-based index and `index / fps` timestamp
//!
//! Only local paths are accepted; URL schemes other than `stub://` are refused.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::FrameSource;
use crate::frame::Frame;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "/data/input/VID_0001.mp4") or `stub://<name>`.
    pub path: String,
    /// Synthetic source settings, used only for `stub://` paths.
    pub synthetic: SyntheticConfig,
}

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub fps: f64,
    pub frames: u64,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            frames: 300,
            width: 320,
            height: 240,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            synthetic: SyntheticConfig::default(),
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn open(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if is_synthetic(&config.path) {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config)?),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::open(config)?),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "file ingestion requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> FileStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

impl FrameSource for FileSource {
    fn fps(&self) -> f64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.config.synthetic.fps,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.fps(),
        }
    }

    fn duration(&self) -> f64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.duration(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.duration(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_decoded: u64,
    pub bytes_decoded: u64,
    /// Packets the decoder rejected and that were skipped.
    pub packets_skipped: u64,
    pub path: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for dry runs
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    config: FileConfig,
    frame_count: u64,
    bytes_decoded: u64,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Result<Self> {
        if !(config.synthetic.fps > 0.0) {
            return Err(anyhow!("synthetic source fps must be > 0"));
        }
        log::info!(
            "FileSource: opened {} (synthetic, {} frames @ {} fps)",
            config.path,
            config.synthetic.frames,
            config.synthetic.fps
        );
        Ok(Self {
            config,
            frame_count: 0,
            bytes_decoded: 0,
        })
    }

    fn duration(&self) -> f64 {
        self.config.synthetic.frames as f64 / self.config.synthetic.fps
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.config.synthetic.frames {
            return Ok(None);
        }
        self.frame_count += 1;

        let pixels = self.generate_synthetic_pixels();
        let frame = Frame::new(
            pixels,
            self.config.synthetic.width,
            self.config.synthetic.height,
            self.frame_count,
            self.config.synthetic.fps,
        );
        self.bytes_decoded += frame.byte_len() as u64;
        Ok(Some(frame))
    }

    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let pixel_count =
            (self.config.synthetic.width as usize) * (self.config.synthetic.height as usize) * 3;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        pixels
    }

    fn stats(&self) -> FileStats {
        FileStats {
            frames_decoded: self.frame_count,
            bytes_decoded: self.bytes_decoded,
            packets_skipped: 0,
            path: self.config.path.clone(),
        }
    }
}

pub(crate) fn is_synthetic(path: &str) -> bool {
    path.starts_with("stub://")
}

pub(crate) fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if is_synthetic(path) {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(frames: u64) -> FileConfig {
        FileConfig {
            path: "stub://unit".to_string(),
            synthetic: SyntheticConfig {
                fps: 10.0,
                frames,
                width: 4,
                height: 2,
            },
        }
    }

    #[test]
    fn rejects_remote_urls() {
        let config = FileConfig {
            path: "rtsp://camera/stream".to_string(),
            ..FileConfig::default()
        };
        assert!(FileSource::open(config).is_err());
        assert!(!is_local_file_path("   "));
        assert!(is_local_file_path("/data/in.mp4"));
    }

    #[test]
    fn synthetic_source_is_finite_and_ordered() -> Result<()> {
        let mut source = FileSource::open(stub_config(3))?;
        assert_eq!(source.fps(), 10.0);
        assert!((source.duration() - 0.3).abs() < 1e-9);

        let mut indices = Vec::new();
        while let Some(frame) = source.next_frame()? {
            assert_eq!(frame.view().rgb()?.len(), 4 * 2 * 3);
            indices.push(frame.index);
        }
        assert_eq!(indices, vec![1, 2, 3]);

        let stats = source.stats();
        assert_eq!(stats.frames_decoded, 3);
        assert_eq!(stats.packets_skipped, 0);
        assert_eq!(stats.bytes_decoded, 3 * 24);
        Ok(())
    }

    #[test]
    fn synthetic_source_requires_positive_fps() {
        let mut config = stub_config(3);
        config.synthetic.fps = 0.0;
        assert!(FileSource::open(config).is_err());
    }
}
