use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use approach_clipper::config::{ClipperConfig, DetectorKind};
use approach_clipper::{ClipperError, EncodeMode, OutputNaming};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CLIPPER_CONFIG",
        "CLIPPER_INPUT",
        "CLIPPER_OUTPUT_DIR",
        "CLIPPER_PROGRESS_PATH",
        "CLIPPER_VIDEO_CODEC",
        "CLIPPER_AUDIO_CODEC",
        "CLIPPER_LEAD_IN",
        "CLIPPER_LEAD_OUT",
        "CLIPPER_MIN_EVENT_SECONDS",
        "CLIPPER_NAMING",
    ] {
        std::env::remove_var(key);
    }
}

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = lock_env();
    clear_env();

    let cfg = ClipperConfig::load().expect("load defaults");

    assert_eq!(cfg.input_path, "stub://demo");
    assert_eq!(cfg.output_dir, PathBuf::from("processed_videos"));
    assert_eq!(
        cfg.output_path(),
        PathBuf::from("processed_videos/PROCESSED_stub_demo.mp4")
    );
    assert_eq!(cfg.progress_path(), PathBuf::from("processed_videos/progress.log"));
    assert_eq!(cfg.progress_every, 100);
    assert_eq!(cfg.segment.lead_in, 1.0);
    assert_eq!(cfg.segment.lead_out, 10.0);
    assert_eq!(cfg.segment.min_event_seconds, 1.0);
    assert!(!cfg.segment.flush_on_end);
    assert_eq!(cfg.encoder.video_codec, "libx264");
    assert_eq!(cfg.encoder.audio_codec, "aac");
    assert_eq!(cfg.encoder.naming, OutputNaming::Single);
    assert_eq!(cfg.encoder.mode, EncodeMode::Inline);
    assert_eq!(cfg.detector.backend, DetectorKind::Scripted);
    assert_eq!(cfg.detector.min_face_size, 50.0);
    assert_eq!(cfg.detector.min_hand_size, 30.0);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = lock_env();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{
        "input_path": "/data/Input_videos/VID_0001.mp4",
        "output_dir": "/tmp/clips",
        "progress_every": 50,
        "segment": { "lead_in": 2.0, "lead_out": 8.0, "flush_on_end": true },
        "encoder": { "naming": "per_segment", "mode": "background", "audio_codec": "libopus" },
        "detector": { "confidence_threshold": 0.5 },
        "synthetic": { "fps": 25.0 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("CLIPPER_CONFIG", file.path());
    std::env::set_var("CLIPPER_OUTPUT_DIR", "/srv/out");
    std::env::set_var("CLIPPER_LEAD_OUT", "12.5");
    std::env::set_var("CLIPPER_VIDEO_CODEC", "libx265");

    let cfg = ClipperConfig::load().expect("load config");

    assert_eq!(cfg.input_path, "/data/Input_videos/VID_0001.mp4");
    assert_eq!(
        cfg.output_path(),
        PathBuf::from("/srv/out/PROCESSED_Input_videos_VID_0001.mp4")
    );
    assert_eq!(cfg.progress_path(), PathBuf::from("/srv/out/progress.log"));
    assert_eq!(cfg.progress_every, 50);
    assert_eq!(cfg.segment.lead_in, 2.0);
    assert_eq!(cfg.segment.lead_out, 12.5);
    assert_eq!(cfg.segment.min_event_seconds, 1.0);
    assert!(cfg.segment.flush_on_end);
    assert_eq!(cfg.encoder.naming, OutputNaming::PerSegment);
    assert_eq!(cfg.encoder.mode, EncodeMode::Background);
    assert_eq!(cfg.encoder.video_codec, "libx265");
    assert_eq!(cfg.encoder.audio_codec, "libopus");
    assert_eq!(cfg.detector.confidence_threshold, 0.5);
    assert_eq!(cfg.synthetic.fps, 25.0);

    clear_env();
}

#[test]
fn loads_toml_file_by_extension() {
    let _guard = lock_env();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
input_path = "stub://toml"
output_name = "clip.mkv"

[segment]
min_event_seconds = 0.5

[encoder]
naming = "single"
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = ClipperConfig::load_from(Some(file.path())).expect("load toml");
    assert_eq!(cfg.input_path, "stub://toml");
    assert_eq!(cfg.output_path(), PathBuf::from("processed_videos/clip.mkv"));
    assert_eq!(cfg.segment.min_event_seconds, 0.5);
}

#[test]
fn invalid_settings_are_initialization_failures() {
    let _guard = lock_env();
    clear_env();

    for (key, value) in [
        ("CLIPPER_LEAD_IN", "-1"),
        ("CLIPPER_MIN_EVENT_SECONDS", "0"),
        ("CLIPPER_LEAD_OUT", "soon"),
        ("CLIPPER_NAMING", "random"),
        ("CLIPPER_INPUT", "rtsp://camera-1/stream"),
        ("CLIPPER_VIDEO_CODEC", " "),
    ] {
        clear_env();
        std::env::set_var(key, value);
        let result = ClipperConfig::load();
        if key == "CLIPPER_VIDEO_CODEC" {
            // Blank overrides are ignored.
            assert!(result.is_ok(), "{key}={value} should be ignored");
            continue;
        }
        let err = result.expect_err(&format!("{key}={value} should be rejected"));
        let kind = err.downcast_ref::<ClipperError>().expect("clipper error");
        assert!(kind.is_fatal(), "{key}={value}");
    }

    clear_env();
}

#[test]
fn zero_progress_cadence_is_rejected() {
    let _guard = lock_env();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"progress_every": 0}"#).expect("write config");
    assert!(ClipperConfig::load_from(Some(file.path())).is_err());
}

#[test]
fn unreadable_config_file_is_rejected() {
    let _guard = lock_env();
    clear_env();

    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing.json");
    let err = ClipperConfig::load_from(Some(&missing)).expect_err("missing file");
    assert!(err.to_string().contains("missing.json"));

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    assert!(ClipperConfig::load_from(Some(file.path())).is_err());
}

#[test]
fn tract_backend_requires_both_models() {
    let _guard = lock_env();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut file,
        br#"{"detector": {"backend": "tract", "face_model": "/models/face.onnx"}}"#,
    )
    .expect("write config");
    assert!(ClipperConfig::load_from(Some(file.path())).is_err());
}

#[test]
fn scripted_registry_loads_script_file() {
    let _guard = lock_env();
    clear_env();

    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("script.json");
    std::fs::write(
        &script,
        r#"[{"frame": 1, "class": "face", "boxes": [[0, 0, 10, 10]]}]"#,
    )
    .expect("write script");
    let config = dir.path().join("config.json");
    std::fs::write(
        &config,
        format!(
            r#"{{"detector": {{"script_path": "{}"}}}}"#,
            script.display()
        ),
    )
    .expect("write config");

    let cfg = ClipperConfig::load_from(Some(&config)).expect("load config");
    let registry = cfg.build_registry().expect("registry");
    assert_eq!(registry.list(), vec!["scripted".to_string()]);

    std::fs::write(&script, "[{]").expect("corrupt script");
    let err = cfg.build_registry().expect_err("corrupt script");
    assert!(err
        .downcast_ref::<ClipperError>()
        .is_some_and(ClipperError::is_fatal));
}
