//! Engine configuration.

use crate::error::{Result, TempoError};

/// Interpolation used by the rate stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Two-point linear interpolation.
    Linear,
    /// Four-point Catmull-Rom interpolation.
    #[default]
    Cubic,
    /// Band-limited sinc resampling. Ignores the anti-alias filter settings.
    Sinc,
}

/// WSOLA time-stretch parameters.
///
/// `None` for the sequence or seek window derives the value from the
/// current tempo.
#[derive(Debug, Clone, PartialEq)]
pub struct StretchParams {
    /// Length of one processing sequence in milliseconds.
    pub sequence_ms: Option<f64>,
    /// Range searched for the best overlap position in milliseconds.
    pub seek_window_ms: Option<f64>,
    /// Cross-fade length in milliseconds.
    pub overlap_ms: f64,
    /// Coarse-to-fine search instead of a full scan.
    pub quick_seek: bool,
}

impl Default for StretchParams {
    fn default() -> Self {
        Self {
            sequence_ms: None,
            seek_window_ms: None,
            overlap_ms: 8.0,
            quick_seek: false,
        }
    }
}

impl StretchParams {
    pub fn with_sequence_ms(mut self, ms: f64) -> Self {
        self.sequence_ms = Some(ms);
        self
    }

    pub fn with_seek_window_ms(mut self, ms: f64) -> Self {
        self.seek_window_ms = Some(ms);
        self
    }

    pub fn with_overlap_ms(mut self, ms: f64) -> Self {
        self.overlap_ms = ms;
        self
    }

    pub fn with_quick_seek(mut self, enabled: bool) -> Self {
        self.quick_seek = enabled;
        self
    }
}

/// Audio transformer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub interpolation: Interpolation,
    /// Run the anti-alias FIR around interpolating transposers.
    pub anti_alias: bool,
    /// FIR length in taps. Rounded down to a multiple of 4.
    pub anti_alias_length: usize,
    pub stretch: StretchParams,
    /// TPDF dither on the float to 16-bit conversion.
    pub dither: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::default(),
            anti_alias: true,
            anti_alias_length: 64,
            stretch: StretchParams::default(),
            dither: false,
        }
    }
}

impl EngineConfig {
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_anti_alias(mut self, enabled: bool) -> Self {
        self.anti_alias = enabled;
        self
    }

    pub fn with_anti_alias_length(mut self, taps: usize) -> Self {
        self.anti_alias_length = taps;
        self
    }

    pub fn with_stretch(mut self, stretch: StretchParams) -> Self {
        self.stretch = stretch;
        self
    }

    pub fn with_dither(mut self, enabled: bool) -> Self {
        self.dither = enabled;
        self
    }

    /// Check the configuration before building an engine.
    pub fn validate(&self) -> Result<()> {
        let stretch = &self.stretch;
        if !(stretch.overlap_ms.is_finite() && stretch.overlap_ms > 0.0) {
            return Err(TempoError::InvalidConfig(format!(
                "overlap must be positive, got {} ms",
                stretch.overlap_ms
            )));
        }
        if let Some(ms) = stretch.sequence_ms {
            if !(ms.is_finite() && ms > 0.0) {
                return Err(TempoError::InvalidConfig(format!(
                    "sequence length must be positive, got {} ms",
                    ms
                )));
            }
        }
        if let Some(ms) = stretch.seek_window_ms {
            if !(ms.is_finite() && ms > 0.0) {
                return Err(TempoError::InvalidConfig(format!(
                    "seek window must be positive, got {} ms",
                    ms
                )));
            }
        }
        if self.anti_alias && self.interpolation != Interpolation::Sinc && self.anti_alias_length < 4
        {
            return Err(TempoError::InvalidConfig(format!(
                "anti-alias filter needs at least 4 taps, got {}",
                self.anti_alias_length
            )));
        }
        Ok(())
    }
}
