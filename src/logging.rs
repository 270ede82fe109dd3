//! Log setup for the `clipper` binary.
//!
//! Records always go to stderr. With a log file they are mirrored there too,
//! appended across runs.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// Conventional log location, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "logs/video_processing.log";

/// Install the global logger with default filter `info` (`RUST_LOG` wins).
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        let file = open_log_file(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(Tee::new(io::stderr(), file))));
    }
    builder.try_init().context("failed to install logger")
}

/// Open `path` for appending, creating missing parent directories.
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

/// Writes every buffer to both sinks.
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    pub fn into_inner(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.first.write_all(buf)?;
        self.second.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tee_writes_both_sinks() -> io::Result<()> {
        let mut tee = Tee::new(Vec::new(), Vec::new());
        writeln!(tee, "[INFO] segment 0.067s - 11.067s")?;
        tee.flush()?;
        let (console, file) = tee.into_inner();
        assert_eq!(console, b"[INFO] segment 0.067s - 11.067s\n");
        assert_eq!(console, file);
        Ok(())
    }

    #[test]
    fn log_file_is_created_and_appended() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("logs").join("video_processing.log");

        writeln!(open_log_file(&path)?, "first run")?;
        writeln!(open_log_file(&path)?, "second run")?;

        assert_eq!(std::fs::read_to_string(&path)?, "first run\nsecond run\n");
        Ok(())
    }

    #[test]
    fn default_log_file_lives_under_logs() {
        assert_eq!(
            Path::new(DEFAULT_LOG_FILE).parent(),
            Some(Path::new("logs"))
        );
    }
}
