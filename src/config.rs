//! Configuration types for the lip-sync animation core.
//!
//! Every tunable the animation algorithms consume lives here: frequency band
//! boundaries, classification thresholds, phoneme timing tables, and
//! transition envelope durations. Nothing in the algorithm modules hard-codes
//! a threshold; they all read from these structs so hosts can calibrate for
//! their own microphones and meshes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the lip-sync engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    /// Frequency band partition used by the classifier.
    pub bands: BandConfig,
    /// Viseme classification thresholds.
    pub classifier: ClassifierConfig,
    /// Text phonemization and event timing settings.
    pub phonemizer: PhonemizerConfig,
    /// Transition scheduling and smoothing settings.
    pub scheduler: SchedulerConfig,
}

/// One frequency band: a half-open range `[low_hz, high_hz)` of the spectrum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrequencyBand {
    /// Lower bound in Hz (inclusive).
    pub low_hz: f32,
    /// Upper bound in Hz (exclusive).
    pub high_hz: f32,
}

/// Fixed partition of the spectrum into four coarse bands.
///
/// The classifier only ever looks at these four energies; it is a heuristic
/// over coarse bands, not an acoustic model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    /// Low band: fundamental and first formant region.
    pub low: FrequencyBand,
    /// Mid band: vowel formant region.
    pub mid: FrequencyBand,
    /// High band: sibilant energy.
    pub high: FrequencyBand,
    /// Ultra band: fricative hiss above the sibilant peak.
    pub ultra: FrequencyBand,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            low: FrequencyBand {
                low_hz: 60.0,
                high_hz: 500.0,
            },
            mid: FrequencyBand {
                low_hz: 500.0,
                high_hz: 2_000.0,
            },
            high: FrequencyBand {
                low_hz: 2_000.0,
                high_hz: 4_500.0,
            },
            ultra: FrequencyBand {
                low_hz: 4_500.0,
                high_hz: 8_000.0,
            },
        }
    }
}

/// Viseme classification thresholds.
///
/// The decision thresholds below are carried over from field-tuned values
/// with no documented derivation. They work acceptably on consumer
/// microphones at 44.1/48 kHz but should be treated as calibration starting
/// points, not ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Overall intensity below which a frame is classified as silence.
    ///
    /// Band energies are normalized to \[0, 1\]. Typical values:
    ///   - 0.01: very sensitive (mouth moves on faint input)
    ///   - 0.03: normal sensitivity (default)
    ///   - 0.08: noisy environments
    pub silence_floor: f32,
    /// Minimum dominant high/ultra energy for the sibilant/fricative class.
    pub sibilant_min_high: f32,
    /// Minimum low-band energy for the mid-dominant frame to count as a
    /// vowel (rules out isolated formant noise).
    pub vowel_min_low: f32,
    /// Mid/low energy ratio above which a vowel is classified front/close
    /// rather than open/back.
    pub front_vowel_ratio: f32,
    /// Minimum low-band energy for the bilabial/plosive class.
    pub plosive_min_low: f32,
    /// Maximum mid-band energy for the bilabial/plosive class.
    pub plosive_max_mid: f32,
    /// Minimum low-band energy for the nasal class.
    pub nasal_min_low: f32,
    /// Minimum mid-band energy for the nasal class.
    pub nasal_min_mid: f32,
    /// Maximum high-band energy for the nasal class.
    pub nasal_max_high: f32,
    /// Confidence divisor: `confidence = min(1, dominant / calibration)`.
    pub calibration: f32,
    /// Overall intensity above which the jaw-open secondary shape engages.
    pub jaw_open_min_intensity: f32,
    /// High-band energy above which the mouth-stretch secondary engages.
    pub stretch_min_high: f32,
    /// Energy at or below this value counts as "no signal at all" for the
    /// analysis-unavailable watchdog. Deliberately far below
    /// `silence_floor`: real microphone silence still carries noise-floor
    /// energy, a blocked analysis source reads exactly zero.
    pub near_zero_epsilon: f32,
    /// Consecutive near-zero analysis ticks before live analysis is
    /// reported unavailable (~1.5 s at 60 ticks/s by default).
    pub unavailable_after_ticks: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            silence_floor: 0.03,
            sibilant_min_high: 0.25,
            vowel_min_low: 0.08,
            front_vowel_ratio: 1.8,
            plosive_min_low: 0.40,
            plosive_max_mid: 0.15,
            nasal_min_low: 0.20,
            nasal_min_mid: 0.15,
            nasal_max_high: 0.10,
            calibration: 0.6,
            jaw_open_min_intensity: 0.35,
            stretch_min_high: 0.30,
            near_zero_epsilon: 1e-4,
            unavailable_after_ticks: 90,
        }
    }
}

/// Text phonemization and event timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhonemizerConfig {
    /// Nominal duration for plain vowels in ms.
    pub vowel_ms: f32,
    /// Nominal duration for vowel digraphs ("ai", "ee", "oo") in ms.
    pub diphthong_ms: f32,
    /// Nominal duration for fricatives/sibilants in ms.
    pub fricative_ms: f32,
    /// Nominal duration for stop consonants in ms.
    pub stop_ms: f32,
    /// Nominal duration for nasals/liquids in ms.
    pub liquid_ms: f32,
    /// Nominal duration for inter-word rests in ms.
    pub rest_ms: f32,
    /// Hard floor for any single event's duration in ms. Very short audio
    /// collapses to fewer events rather than dipping below this.
    pub min_event_ms: f32,
    /// Known total durations below this (in seconds) trigger the collapse
    /// to a reduced key subset of events.
    pub short_audio_threshold_s: f32,
    /// Absolute minimum event count after normalization.
    pub min_events_floor: usize,
    /// Lower bound on events per character of input text.
    pub min_events_per_char: f32,
    /// Upper bound on events per character of input text.
    pub max_events_per_char: f32,
}

impl Default for PhonemizerConfig {
    fn default() -> Self {
        Self {
            vowel_ms: 140.0,
            diphthong_ms: 160.0,
            fricative_ms: 110.0,
            stop_ms: 80.0,
            liquid_ms: 100.0,
            rest_ms: 60.0,
            min_event_ms: 60.0,
            short_audio_threshold_s: 0.8,
            min_events_floor: 2,
            min_events_per_char: 0.25,
            max_events_per_char: 1.2,
        }
    }
}

/// Transition scheduling and smoothing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Exponential smoothing factor for the live path.
    ///
    /// Each tick: `weight = previous * smoothing + target * (1 - smoothing)`.
    /// Higher values are smoother but laggier. Typical range 0.6–0.9.
    pub smoothing: f32,
    /// Duration of the fade to neutral on cancel / session end, in ms.
    /// An instant snap to zero is perceptually jarring; this is always a
    /// ramp, never a jump.
    pub final_fade_ms: f32,
    /// Weight of the secondary blend shape relative to the primary.
    pub secondary_scale: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.8,
            final_fade_ms: 300.0,
            secondary_scale: 0.7,
        }
    }
}

impl LipSyncConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::LipSyncError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot
    /// be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::LipSyncError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/selkie/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("selkie").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("selkie")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/selkie-config/config.toml")
        }
    }
}
