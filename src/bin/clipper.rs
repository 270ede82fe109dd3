//! clipper - cut hand-to-face approach moments out of a video
//!
//! 1. Loads configuration (file, environment, flags)
//! 2. Opens the input and the face/hand detectors
//! 3. Runs the frame loop, encoding a segment for every qualifying event
//! 4. Prints a run summary
//!
//! Logs go to stderr and, with `--log-file`, to a file as well.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use approach_clipper::encode::{probe_ffmpeg, FfmpegEncoder};
use approach_clipper::error::init_failure;
use approach_clipper::logging::{self, DEFAULT_LOG_FILE};
use approach_clipper::ui::{Ui, UiMode};
use approach_clipper::{
    telemetry, BackgroundEncoder, ClipperConfig, DryRunEncoder, EncodeMode, FileSource, Pipeline,
    ProgressReporter, RegionDetector, SegmentEncoder,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML by extension). Overrides CLIPPER_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Input video, or stub://<name> for a synthetic run.
    #[arg(long)]
    input: Option<String>,
    /// Directory for encoded segments and the progress snapshot.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Log segments instead of encoding them.
    #[arg(long)]
    dry_run: bool,
    /// Console output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
    /// Also append log records to this file (logs/video_processing.log when
    /// given without a value).
    #[arg(
        long,
        env = "CLIPPER_LOG_FILE",
        num_args = 0..=1,
        default_missing_value = DEFAULT_LOG_FILE
    )]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_file.as_deref())?;

    let is_tty = std::io::stderr().is_terminal();
    let disable_pretty = std::env::var_os("NO_COLOR").is_some() || std::env::var_os("CI").is_some();
    let ui = Ui::new(args.ui, is_tty, disable_pretty);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = ClipperConfig::load_from(args.config.as_deref())?;
        if let Some(input) = args.input {
            cfg.input_path = input;
        }
        if let Some(dir) = args.output_dir {
            cfg.output_dir = dir;
        }
        cfg.validate().map_err(init_failure)?;
        cfg
    };

    let output = cfg.output_path();
    ctrlc::set_handler(move || {
        log::warn!("interrupted; {} may be incomplete", output.display());
        std::process::exit(130);
    })
    .context("failed to install Ctrl-C handler")?;

    let source = {
        let _stage = ui.stage("Open input");
        FileSource::open(cfg.file_config()).map_err(init_failure)?
    };

    let detector = {
        let _stage = ui.stage("Load detectors");
        RegionDetector::new(cfg.build_registry()?)?
    };

    let encoder = {
        let _stage = ui.stage("Prepare encoder");
        std::fs::create_dir_all(&cfg.output_dir)
            .with_context(|| format!("failed to create {}", cfg.output_dir.display()))
            .map_err(init_failure)?;
        build_encoder(&cfg, args.dry_run)?
    };

    let reporter = ProgressReporter::new(cfg.progress_path(), cfg.progress_every);
    log::info!(
        "input={} output={} progress={}",
        cfg.input_path,
        cfg.output_path().display(),
        reporter.path().display()
    );

    let summary = {
        let _stage = ui.stage("Process frames");
        Pipeline::new(source, detector, encoder, cfg.segment.clone())?
            .with_progress(reporter)
            .run()
    };

    ui.report(&summary);
    log::info!(
        "gpu utilization: {}%, cpu utilization: {:.1}%",
        telemetry::gpu_utilization(),
        telemetry::cpu_utilization()
    );
    Ok(())
}

fn build_encoder(cfg: &ClipperConfig, dry_run: bool) -> Result<Box<dyn SegmentEncoder>> {
    let target = cfg.output_target();
    let encoder: Box<dyn SegmentEncoder> = if dry_run || cfg.input_path.starts_with("stub://") {
        log::info!("dry run: segments will be logged, not encoded");
        Box::new(DryRunEncoder::new(target))
    } else {
        probe_ffmpeg(&cfg.encoder.ffmpeg_path).map_err(init_failure)?;
        Box::new(FfmpegEncoder::new(cfg.ffmpeg_settings(), target))
    };
    Ok(match cfg.encoder.mode {
        EncodeMode::Inline => encoder,
        EncodeMode::Background => {
            Box::new(BackgroundEncoder::spawn(encoder).map_err(init_failure)?)
        }
    })
}
