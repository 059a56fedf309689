//! Per-frame viseme classification from frequency-domain energy.
//!
//! The classifier is a deterministic heuristic over four coarse frequency
//! bands — not an acoustic model. Each analysis tick it summarizes the
//! spectrum into band energies, walks a fixed-priority decision chain, and
//! produces a viseme descriptor with a confidence value. It never fails:
//! degenerate input is the silence case.
//!
//! Also here: the signal watchdog that tells a genuinely silent microphone
//! apart from an analysis source that yields no data at all (e.g. a
//! cross-origin-restricted audio node reading all zeros).

use crate::config::{BandConfig, ClassifierConfig, FrequencyBand};
use crate::viseme::{NEUTRAL_VISEME, PhonemeCode, VisemeDescriptor, viseme_for};

/// One frame of frequency-domain energy, normalized to \[0, 1\] per bin.
#[derive(Debug, Clone)]
pub struct SpectrumFrame {
    bins: Vec<f32>,
}

impl SpectrumFrame {
    /// Build a frame from byte-range magnitudes (0–255), as produced by
    /// browser-style analyser nodes.
    pub fn from_bytes(bins: &[u8]) -> Self {
        Self {
            bins: bins.iter().map(|b| f32::from(*b) / 255.0).collect(),
        }
    }

    /// Build a frame from already-normalized magnitudes. Values are clamped
    /// into \[0, 1\]; NaN becomes zero.
    pub fn from_normalized(bins: &[f32]) -> Self {
        Self {
            bins: bins
                .iter()
                .map(|b| if b.is_nan() { 0.0 } else { b.clamp(0.0, 1.0) })
                .collect(),
        }
    }

    /// Number of frequency bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Whether the frame holds no bins.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Mean energy per configured band, each in \[0, 1\].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandEnergies {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
    pub ultra: f32,
}

impl BandEnergies {
    /// The largest single band energy.
    pub fn dominant(&self) -> f32 {
        self.low.max(self.mid).max(self.high).max(self.ultra)
    }
}

/// Result of classifying one analysis frame. Produced every tick, never
/// persisted.
#[derive(Debug, Clone)]
pub struct ClassificationSample {
    /// Mean energy per band.
    pub band_energy: BandEnergies,
    /// Mean energy over all bins.
    pub overall_intensity: f32,
    /// Sound class the decision chain settled on.
    pub code: PhonemeCode,
    /// Blend-shape descriptor, secondary slot already overlaid.
    pub viseme: VisemeDescriptor,
    /// Decision confidence in \[0, 1\].
    pub confidence: f32,
    /// Caller-supplied frame timestamp in ms.
    pub timestamp_ms: f64,
}

impl ClassificationSample {
    /// The silence sample: neutral viseme, zero intensity and confidence.
    pub fn silence(timestamp_ms: f64) -> Self {
        Self {
            band_energy: BandEnergies::default(),
            overall_intensity: 0.0,
            code: PhonemeCode::Rest,
            viseme: NEUTRAL_VISEME,
            confidence: 0.0,
            timestamp_ms,
        }
    }
}

/// Heuristic spectrum-to-viseme classifier.
pub struct VisemeClassifier {
    bands: BandConfig,
    cfg: ClassifierConfig,
}

impl VisemeClassifier {
    /// Create a classifier over the given band partition and thresholds.
    pub fn new(bands: BandConfig, cfg: ClassifierConfig) -> Self {
        Self { bands, cfg }
    }

    /// Classify one spectrum frame.
    ///
    /// `sample_rate` and `fft_size` describe the analysis node that
    /// produced the frame; they map band boundaries in Hz onto bin ranges
    /// via `bin_hz = sample_rate / fft_size`. Pure and total: an empty or
    /// all-zero frame yields the silence sample.
    pub fn classify(
        &self,
        frame: &SpectrumFrame,
        sample_rate: f32,
        fft_size: usize,
        timestamp_ms: f64,
    ) -> ClassificationSample {
        if frame.is_empty() || sample_rate <= 0.0 || fft_size == 0 {
            return ClassificationSample::silence(timestamp_ms);
        }

        let bin_hz = sample_rate / fft_size as f32;
        let energy = BandEnergies {
            low: band_mean(&frame.bins, self.bands.low, bin_hz),
            mid: band_mean(&frame.bins, self.bands.mid, bin_hz),
            high: band_mean(&frame.bins, self.bands.high, bin_hz),
            ultra: band_mean(&frame.bins, self.bands.ultra, bin_hz),
        };
        let overall = frame.bins.iter().sum::<f32>() / frame.bins.len() as f32;

        let (code, confidence) = self.decide(&energy, overall);
        let viseme = self.overlay_secondary(viseme_for(code), &energy, overall);

        ClassificationSample {
            band_energy: energy,
            overall_intensity: overall,
            code,
            viseme,
            confidence,
            timestamp_ms,
        }
    }

    /// Fixed-priority decision chain over the band summary.
    fn decide(&self, e: &BandEnergies, overall: f32) -> (PhonemeCode, f32) {
        let c = &self.cfg;

        // 1. Silence floor.
        if overall < c.silence_floor {
            return (PhonemeCode::Rest, 0.0);
        }

        let dominant = e.dominant();
        let confidence = (dominant / c.calibration).min(1.0);

        // 2. Sibilant/fricative: high or ultra band on top. Ultra heavier
        //    than high reads as F/V hiss, otherwise S/Z.
        if (e.high >= dominant || e.ultra >= dominant) && dominant > c.sibilant_min_high {
            let code = if e.ultra >= e.high {
                PhonemeCode::Ff
            } else {
                PhonemeCode::Ss
            };
            return (code, confidence);
        }

        // 3. Vowel: mid band dominant with a moderate low-band floor. The
        //    mid/low ratio separates front/close from open/back.
        if e.mid >= dominant && e.low > c.vowel_min_low {
            let ratio = e.mid / e.low.max(1e-6);
            let code = if ratio > c.front_vowel_ratio {
                PhonemeCode::Ee
            } else {
                PhonemeCode::Aa
            };
            return (code, confidence);
        }

        // 4. Bilabial/plosive: low-band spike with little mid.
        if e.low > c.plosive_min_low && e.mid < c.plosive_max_mid {
            return (PhonemeCode::Mbp, confidence);
        }

        // 5. Nasal: sustained low+mid without high.
        if e.low > c.nasal_min_low && e.mid > c.nasal_min_mid && e.high < c.nasal_max_high {
            return (PhonemeCode::Nn, confidence);
        }

        // 6. Nothing matched: neutral at low confidence.
        (PhonemeCode::Rest, 0.1)
    }

    /// Choose the secondary slot independently of the primary pick:
    /// loudness drives a jaw-open proxy, high-band presence a mouth-stretch
    /// proxy. Falls back to the table's own secondary.
    fn overlay_secondary(
        &self,
        mut viseme: VisemeDescriptor,
        e: &BandEnergies,
        overall: f32,
    ) -> VisemeDescriptor {
        if overall > self.cfg.jaw_open_min_intensity {
            viseme.secondary = Some("jawOpen");
        } else if e.high > self.cfg.stretch_min_high {
            viseme.secondary = Some("mouthStretchLeft");
        }
        viseme
    }
}

/// Mean magnitude over the bins covered by `band`, or 0.0 when the band
/// maps outside the frame.
fn band_mean(bins: &[f32], band: FrequencyBand, bin_hz: f32) -> f32 {
    if bin_hz <= 0.0 {
        return 0.0;
    }
    let lo = ((band.low_hz / bin_hz).floor() as usize).min(bins.len());
    let hi = ((band.high_hz / bin_hz).floor() as usize).min(bins.len());
    if hi <= lo {
        return 0.0;
    }
    let slice = &bins[lo..hi];
    slice.iter().sum::<f32>() / slice.len() as f32
}

/// Tracks runs of zero-energy analysis ticks while a live source is
/// attached.
///
/// Real microphone silence keeps some noise-floor energy; an analysis node
/// that cannot read its source (cross-origin media, disconnected graph)
/// reports exactly zero forever. A long enough all-zero run is surfaced as
/// "analysis unavailable" so the caller can fall back to the text path.
#[derive(Debug)]
pub struct SignalWatchdog {
    near_zero_ticks: u32,
    run_length: u32,
    epsilon: f32,
    tripped: bool,
}

impl SignalWatchdog {
    /// Create a watchdog from the classifier thresholds.
    pub fn new(cfg: &ClassifierConfig) -> Self {
        Self {
            near_zero_ticks: 0,
            run_length: cfg.unavailable_after_ticks,
            epsilon: cfg.near_zero_epsilon,
            tripped: false,
        }
    }

    /// Feed one tick's overall intensity. Returns `true` exactly once, on
    /// the tick the unavailable condition is first detected.
    pub fn observe(&mut self, overall_intensity: f32) -> bool {
        if overall_intensity > self.epsilon {
            self.near_zero_ticks = 0;
            self.tripped = false;
            return false;
        }
        self.near_zero_ticks = self.near_zero_ticks.saturating_add(1);
        if !self.tripped && self.near_zero_ticks >= self.run_length {
            self.tripped = true;
            return true;
        }
        false
    }

    /// Whether the unavailable condition is currently active.
    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Clear all state (e.g. on live source re-attach).
    pub fn reset(&mut self) {
        self.near_zero_ticks = 0;
        self.tripped = false;
    }
}
