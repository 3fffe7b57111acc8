//! Tempo, rate and pitch factors with their clamping rules.

use tracing::debug;

/// Bounds for absolute factors.
pub const MIN_FACTOR: f64 = 0.1;
pub const MAX_FACTOR: f64 = 10.0;

/// Bounds for percent changes.
pub const MIN_CHANGE_PERCENT: f64 = -50.0;
pub const MAX_CHANGE_PERCENT: f64 = 100.0;

/// The three user-facing factors.
///
/// Pitch has three parameterizations; whichever setter ran last wins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    tempo: f64,
    rate: f64,
    pitch: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tempo: 1.0,
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

impl Settings {
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    /// Tempo applied by the time-stretch stage.
    pub fn effective_tempo(&self) -> f64 {
        self.tempo / self.pitch
    }

    /// Rate applied by the rate stage.
    pub fn effective_rate(&self) -> f64 {
        self.rate * self.pitch
    }

    /// Overall speed; output length is input length divided by this.
    pub fn speed(&self) -> f64 {
        self.tempo * self.rate
    }

    pub fn set_tempo(&mut self, value: f64) {
        if let Some(v) = clamp_factor("tempo", value) {
            self.tempo = v;
        }
    }

    pub fn set_tempo_change(&mut self, percent: f64) {
        if let Some(v) = from_percent("tempo", percent) {
            self.tempo = v;
        }
    }

    pub fn set_rate(&mut self, value: f64) {
        if let Some(v) = clamp_factor("rate", value) {
            self.rate = v;
        }
    }

    pub fn set_rate_change(&mut self, percent: f64) {
        if let Some(v) = from_percent("rate", percent) {
            self.rate = v;
        }
    }

    pub fn set_pitch(&mut self, value: f64) {
        if let Some(v) = clamp_factor("pitch", value) {
            self.pitch = v;
        }
    }

    /// Pitch as `2^octaves`, octaves in [-1, 1].
    pub fn set_pitch_octaves(&mut self, octaves: f64) {
        if !octaves.is_finite() {
            debug!(octaves, "Ignoring non-finite pitch octaves");
            return;
        }
        self.pitch = 2f64.powf(octaves.clamp(-1.0, 1.0));
    }

    /// Pitch as `2^(semitones/12)`, semitones in [-12, 12].
    pub fn set_pitch_semitones(&mut self, semitones: f64) {
        if !semitones.is_finite() {
            debug!(semitones, "Ignoring non-finite pitch semitones");
            return;
        }
        self.pitch = 2f64.powf(semitones.clamp(-12.0, 12.0) / 12.0);
    }
}

fn clamp_factor(name: &'static str, value: f64) -> Option<f64> {
    if !value.is_finite() {
        debug!(name, value, "Ignoring non-finite factor");
        return None;
    }
    let clamped = value.clamp(MIN_FACTOR, MAX_FACTOR);
    if clamped != value {
        debug!(name, value, clamped, "Factor clamped");
    }
    Some(clamped)
}

fn from_percent(name: &'static str, percent: f64) -> Option<f64> {
    if !percent.is_finite() {
        debug!(name, percent, "Ignoring non-finite change");
        return None;
    }
    let clamped = percent.clamp(MIN_CHANGE_PERCENT, MAX_CHANGE_PERCENT);
    if clamped != percent {
        debug!(name, percent, clamped, "Change clamped");
    }
    Some(1.0 + clamped / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod percent_changes {
        use super::*;

        #[test]
        fn tempo_change_formula() {
            let mut s = Settings::default();
            s.set_tempo_change(50.0);
            assert_eq!(s.tempo(), 1.5);
            s.set_tempo_change(-25.0);
            assert_eq!(s.tempo(), 0.75);
        }

        #[test]
        fn rate_change_clamped_to_range() {
            let mut s = Settings::default();
            s.set_rate_change(250.0);
            assert_eq!(s.rate(), 2.0);
            s.set_rate_change(-90.0);
            assert_eq!(s.rate(), 0.5);
        }
    }

    mod absolute {
        use super::*;

        #[test]
        fn factors_clamped() {
            let mut s = Settings::default();
            s.set_tempo(0.01);
            assert_eq!(s.tempo(), MIN_FACTOR);
            s.set_rate(50.0);
            assert_eq!(s.rate(), MAX_FACTOR);
            s.set_pitch(-1.0);
            assert_eq!(s.pitch(), MIN_FACTOR);
        }

        #[test]
        fn non_finite_ignored() {
            let mut s = Settings::default();
            s.set_tempo(1.25);
            s.set_tempo(f64::NAN);
            s.set_tempo_change(f64::INFINITY);
            assert_eq!(s.tempo(), 1.25);
            s.set_pitch_octaves(f64::NAN);
            s.set_pitch_semitones(f64::NEG_INFINITY);
            assert_eq!(s.pitch(), 1.0);
        }
    }

    mod pitch {
        use super::*;

        #[test]
        fn octaves_and_semitones() {
            let mut s = Settings::default();
            s.set_pitch_octaves(1.0);
            assert_eq!(s.pitch(), 2.0);
            s.set_pitch_semitones(0.0);
            assert_eq!(s.pitch(), 1.0);
            s.set_pitch_semitones(-12.0);
            assert_eq!(s.pitch(), 0.5);
            s.set_pitch_octaves(3.0);
            assert_eq!(s.pitch(), 2.0);
        }

        #[test]
        fn last_setter_wins() {
            let mut s = Settings::default();
            s.set_pitch_semitones(12.0);
            s.set_pitch(0.8);
            assert_eq!(s.pitch(), 0.8);
        }
    }

    mod effective {
        use super::*;

        #[test]
        fn pitch_moves_work_between_stages() {
            let mut s = Settings::default();
            s.set_pitch(2.0);
            s.set_tempo(1.5);
            assert_eq!(s.effective_tempo(), 0.75);
            assert_eq!(s.effective_rate(), 2.0);
            // Pitch alone does not change duration
            assert_eq!(s.speed(), 1.5);
        }
    }
}
