//! Rate stage: transposer plus optional anti-alias filter.

use tracing::debug;

use crate::aa_filter::AaFilter;
use crate::config::{EngineConfig, Interpolation};
use crate::error::Result;
use crate::transposer::{InterpolatingTransposer, SincTransposer, Transposer};

pub struct RateStage {
    transposer: Box<dyn Transposer>,
    filter: Option<AaFilter>,
    rate: f64,
    scratch: Vec<f32>,
}

impl RateStage {
    pub fn new(config: &EngineConfig, channels: usize) -> Result<Self> {
        let transposer: Box<dyn Transposer> = match config.interpolation {
            Interpolation::Linear => Box::new(InterpolatingTransposer::linear(channels)),
            Interpolation::Cubic => Box::new(InterpolatingTransposer::cubic(channels)),
            Interpolation::Sinc => Box::new(SincTransposer::new(channels)?),
        };
        let filter = (config.anti_alias && config.interpolation != Interpolation::Sinc)
            .then(|| AaFilter::new(config.anti_alias_length, channels));
        Ok(Self::with_transposer(transposer, filter))
    }

    pub fn with_transposer(transposer: Box<dyn Transposer>, filter: Option<AaFilter>) -> Self {
        Self {
            transposer,
            filter,
            rate: 1.0,
            scratch: Vec::new(),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        if rate == self.rate {
            return Ok(());
        }
        if rate == 1.0 {
            debug!("Rate stage bypassed");
            self.reset();
        } else {
            self.transposer.set_rate(rate)?;
            if let Some(filter) = self.filter.as_mut() {
                filter.set_cutoff(0.5 * rate.min(1.0 / rate));
            }
        }
        self.rate = rate;
        Ok(())
    }

    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<()> {
        if self.rate == 1.0 {
            out.extend_from_slice(input);
            return Ok(());
        }
        match self.filter.as_mut() {
            // Speeding up: band-limit before dropping samples
            Some(filter) if self.rate > 1.0 => {
                self.scratch.clear();
                filter.process(input, &mut self.scratch);
                self.transposer.transpose(&self.scratch, out)
            }
            // Slowing down: remove imaging after interpolation
            Some(filter) => {
                self.scratch.clear();
                self.transposer.transpose(input, &mut self.scratch)?;
                filter.process(&self.scratch, out);
                Ok(())
            }
            None => self.transposer.transpose(input, out),
        }
    }

    pub fn reset(&mut self) {
        self.transposer.reset();
        if let Some(filter) = self.filter.as_mut() {
            filter.reset();
        }
    }

    pub fn latency_frames(&self) -> usize {
        if self.rate == 1.0 {
            0
        } else {
            self.transposer.latency_frames()
        }
    }
}
