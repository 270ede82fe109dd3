use thiserror::Error;

/// Failure classes of a clipping run.
///
/// Only `Initialization` is fatal. The other variants are logged at the point
/// where they occur and the pipeline continues with a neutral default.
#[derive(Debug, Error)]
pub enum ClipperError {
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("detection failed: {0}")]
    Detection(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("telemetry failed: {0}")]
    Telemetry(String),
}

impl ClipperError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClipperError::Initialization(_))
    }
}

/// Wrap any error chain as an initialization failure.
pub fn init_failure(err: anyhow::Error) -> anyhow::Error {
    anyhow::Error::new(ClipperError::Initialization(format!("{err:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_initialization_is_fatal() {
        assert!(ClipperError::Initialization("model".into()).is_fatal());
        assert!(!ClipperError::Detection("frame".into()).is_fatal());
        assert!(!ClipperError::Encoding("mux".into()).is_fatal());
        assert!(!ClipperError::Telemetry("write".into()).is_fatal());
    }

    #[test]
    fn init_failure_is_downcastable() {
        let err = init_failure(anyhow::anyhow!("no such model"));
        let kind = err.downcast_ref::<ClipperError>().expect("clipper error");
        assert!(kind.is_fatal());
        assert!(err.to_string().contains("no such model"));
    }
}
