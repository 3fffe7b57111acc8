//! Error types for the audio transform engine.

use screenlive_resampler::ResampleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TempoError {
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Resampler error: {0}")]
    Resampler(#[from] ResampleError),
}

pub type Result<T> = std::result::Result<T, TempoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn invalid_config_message() {
        let err = TempoError::InvalidConfig("overlap must be positive".into());
        assert_eq!(
            err.to_string(),
            "Invalid engine configuration: overlap must be positive"
        );
    }

    #[test]
    fn resampler_error_converts_with_source() {
        let err: TempoError = ResampleError::InvalidRatio(0.0).into();
        assert!(matches!(err, TempoError::Resampler(_)));
        assert!(err.source().is_some());
    }
}
