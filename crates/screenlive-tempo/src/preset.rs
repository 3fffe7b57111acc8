//! Voice-changer presets.

use crate::settings::Settings;

/// Named voice effects built from pitch and rate settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePreset {
    /// Up eight semitones.
    Kitty,
    Rose,
    Uncle,
    /// Up an octave and 20% faster.
    Funny,
}

impl VoicePreset {
    pub const ALL: [VoicePreset; 4] = [
        VoicePreset::Kitty,
        VoicePreset::Rose,
        VoicePreset::Uncle,
        VoicePreset::Funny,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VoicePreset::Kitty => "kitty",
            VoicePreset::Rose => "rose",
            VoicePreset::Uncle => "uncle",
            VoicePreset::Funny => "funny",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Reset `settings` to neutral and apply the preset.
    pub fn apply(&self, settings: &mut Settings) {
        *settings = Settings::default();
        match self {
            VoicePreset::Kitty => settings.set_pitch_semitones(8.0),
            VoicePreset::Rose => settings.set_pitch(2.1),
            VoicePreset::Uncle => settings.set_pitch(0.8),
            VoicePreset::Funny => {
                settings.set_pitch_octaves(1.0);
                settings.set_rate(1.2);
            }
        }
    }
}
