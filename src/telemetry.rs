//! Host telemetry queries (GPU and CPU utilization). Read-only; every
//! failure degrades to 0.

use std::process::{Command, Stdio};
use std::time::Duration;

use sysinfo::System;

use crate::error::ClipperError;

/// GPU utilization in percent, from `nvidia-smi`. Returns 0 when the tool is
/// missing, fails, or prints something unexpected.
pub fn gpu_utilization() -> u32 {
    gpu_utilization_with("nvidia-smi")
}

pub(crate) fn gpu_utilization_with(program: &str) -> u32 {
    let output = match Command::new(program)
        .args(["--query-gpu=utilization.gpu", "--format=csv,noheader,nounits"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            log::debug!("{}", ClipperError::Telemetry(format!("{program}: {e}")));
            return 0;
        }
    };
    if !output.status.success() {
        log::debug!(
            "{}",
            ClipperError::Telemetry(format!("{program} exited with {}", output.status))
        );
        return 0;
    }
    parse_utilization(&String::from_utf8_lossy(&output.stdout)).unwrap_or(0)
}

/// Window over which CPU usage is sampled.
const CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(100);

/// Host-wide CPU utilization in percent, sampled over a short window.
/// Returns 0 on platforms sysinfo does not support.
pub fn cpu_utilization() -> f32 {
    if !sysinfo::IS_SUPPORTED_SYSTEM {
        log::debug!(
            "{}",
            ClipperError::Telemetry("cpu usage is not available on this platform".to_string())
        );
        return 0.0;
    }
    let mut system = System::new();
    system.refresh_cpu_usage();
    std::thread::sleep(CPU_SAMPLE_WINDOW.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
    system.refresh_cpu_usage();
    clamp_percent(system.global_cpu_usage())
}

fn clamp_percent(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// First GPU's utilization from `nvidia-smi` csv output.
fn parse_utilization(stdout: &str) -> Option<u32> {
    let value: u32 = stdout.lines().next()?.trim().parse().ok()?;
    Some(value.min(100))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_gpu() {
        assert_eq!(parse_utilization("37\n12\n"), Some(37));
        assert_eq!(parse_utilization(" 5 \n"), Some(5));
        assert_eq!(parse_utilization("[N/A]\n"), None);
        assert_eq!(parse_utilization(""), None);
    }

    #[test]
    fn cpu_reading_is_a_percentage() {
        let cpu = cpu_utilization();
        assert!((0.0..=100.0).contains(&cpu), "{cpu}");
    }

    #[test]
    fn unusable_cpu_readings_degrade_to_zero() {
        assert_eq!(clamp_percent(f32::NAN), 0.0);
        assert_eq!(clamp_percent(-3.0), 0.0);
        assert_eq!(clamp_percent(250.0), 100.0);
        assert_eq!(clamp_percent(42.5), 42.5);
    }

    #[test]
    fn missing_tool_reads_as_zero() {
        assert_eq!(gpu_utilization_with("/nonexistent/nvidia-smi"), 0);
    }
}
