//! Error types for the resampler.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("Failed to create resampler: {0}")]
    Construction(String),

    #[error("Resampling error: {0}")]
    Process(String),

    #[error("Invalid resample ratio: {0}")]
    InvalidRatio(f64),

    #[error("Invalid channel count: {0}")]
    InvalidChannels(usize),
}

pub type Result<T> = std::result::Result<T, ResampleError>;

impl From<rubato::ResamplerConstructionError> for ResampleError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        ResampleError::Construction(e.to_string())
    }
}

impl From<rubato::ResampleError> for ResampleError {
    fn from(e: rubato::ResampleError) -> Self {
        ResampleError::Process(e.to_string())
    }
}
