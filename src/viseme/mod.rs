//! Viseme table for lip-sync animation.
//!
//! A viseme is a visual mouth shape that corresponds to a phoneme (sound).
//! This module defines the phoneme codes produced by the tokenizer and the
//! classifier, the static lookup from code to blend-shape descriptor, and
//! the weight vector applied to the target mesh.
//!
//! Blend-shape names follow the Oculus viseme set (`viseme_aa`,
//! `viseme_PP`, ...) with ARKit-style secondaries (`jawOpen`,
//! `mouthStretchLeft`, `mouthPucker`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Blend-shape name of the neutral/rest mouth pose.
pub const NEUTRAL_SHAPE: &str = "viseme_sil";

/// Phoneme sound classes understood by the animation core.
///
/// These are coarse visual classes, not a full phone inventory: sounds that
/// produce the same mouth shape share a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhonemeCode {
    /// Inter-word pause / mouth at rest.
    Rest,
    /// Open vowel as in "father".
    Aa,
    /// Front vowel as in "see" / "she" (letter `e` and the "ee" digraph).
    Ee,
    /// Close front vowel as in "bit".
    Ih,
    /// Rounded mid vowel as in "go".
    Oh,
    /// Rounded close vowel as in "put".
    Uw,
    /// Vowel digraph "ai" as in "rain".
    Ay,
    /// Vowel digraph "oo" as in "moon".
    Oo,
    /// Dental fricative "th".
    Th,
    /// Postalveolar "sh".
    Sh,
    /// Affricate "ch" / "j".
    Ch,
    /// Velar nasal "ng".
    Ng,
    /// Alveolar sibilant: s, z, x.
    Ss,
    /// Labiodental: f, v.
    Ff,
    /// Bilabial: m, b, p.
    Mbp,
    /// Alveolar stop: t, d.
    Dd,
    /// Velar stop: c, k, g, q.
    Kk,
    /// Alveolar nasal: n.
    Nn,
    /// Lateral: l.
    Ll,
    /// Rhotic: r.
    Rr,
    /// Labio-velar glide: w.
    Ww,
}

/// Immutable description of how one phoneme class maps onto the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisemeDescriptor {
    /// Primary morph target driven by this sound.
    pub primary: &'static str,
    /// Optional secondary morph target overlaid at reduced weight.
    pub secondary: Option<&'static str>,
    /// Peak activation weight for the primary shape, in \[0, 1\].
    pub base_intensity: f32,
}

/// Descriptor used for rests, fades, and any unknown code.
pub const NEUTRAL_VISEME: VisemeDescriptor = VisemeDescriptor {
    primary: NEUTRAL_SHAPE,
    secondary: None,
    base_intensity: 0.25,
};

/// Look up the viseme descriptor for a phoneme code.
///
/// Total function: every code has an entry, and the neutral descriptor
/// doubles as the rest entry used for inter-word pauses and fade targets.
pub fn viseme_for(code: PhonemeCode) -> VisemeDescriptor {
    use PhonemeCode::*;
    match code {
        Rest => NEUTRAL_VISEME,
        Aa => VisemeDescriptor {
            primary: "viseme_aa",
            secondary: Some("jawOpen"),
            base_intensity: 0.95,
        },
        Ee => VisemeDescriptor {
            primary: "viseme_E",
            secondary: Some("mouthStretchLeft"),
            base_intensity: 0.85,
        },
        Ih => VisemeDescriptor {
            primary: "viseme_I",
            secondary: None,
            base_intensity: 0.75,
        },
        Oh => VisemeDescriptor {
            primary: "viseme_O",
            secondary: Some("jawOpen"),
            base_intensity: 0.90,
        },
        Uw => VisemeDescriptor {
            primary: "viseme_U",
            secondary: Some("mouthPucker"),
            base_intensity: 0.80,
        },
        Ay => VisemeDescriptor {
            primary: "viseme_E",
            secondary: Some("jawOpen"),
            base_intensity: 0.90,
        },
        Oo => VisemeDescriptor {
            primary: "viseme_U",
            secondary: Some("mouthPucker"),
            base_intensity: 0.85,
        },
        Th => VisemeDescriptor {
            primary: "viseme_TH",
            secondary: None,
            base_intensity: 0.65,
        },
        Sh => VisemeDescriptor {
            primary: "viseme_CH",
            secondary: Some("mouthPucker"),
            base_intensity: 0.70,
        },
        Ch => VisemeDescriptor {
            primary: "viseme_CH",
            secondary: None,
            base_intensity: 0.70,
        },
        Ng => VisemeDescriptor {
            primary: "viseme_kk",
            secondary: None,
            base_intensity: 0.55,
        },
        Ss => VisemeDescriptor {
            primary: "viseme_SS",
            secondary: Some("mouthStretchLeft"),
            base_intensity: 0.70,
        },
        Ff => VisemeDescriptor {
            primary: "viseme_FF",
            secondary: None,
            base_intensity: 0.75,
        },
        Mbp => VisemeDescriptor {
            primary: "viseme_PP",
            secondary: None,
            base_intensity: 0.85,
        },
        Dd => VisemeDescriptor {
            primary: "viseme_DD",
            secondary: None,
            base_intensity: 0.60,
        },
        Kk => VisemeDescriptor {
            primary: "viseme_kk",
            secondary: None,
            base_intensity: 0.60,
        },
        Nn => VisemeDescriptor {
            primary: "viseme_nn",
            secondary: None,
            base_intensity: 0.55,
        },
        Ll => VisemeDescriptor {
            primary: "viseme_DD",
            secondary: None,
            base_intensity: 0.60,
        },
        Rr => VisemeDescriptor {
            primary: "viseme_RR",
            secondary: None,
            base_intensity: 0.65,
        },
        Ww => VisemeDescriptor {
            primary: "viseme_U",
            secondary: Some("mouthPucker"),
            base_intensity: 0.70,
        },
    }
}

impl PhonemeCode {
    /// Whether this code is a vowel class (longer nominal duration).
    pub fn is_vowel(self) -> bool {
        use PhonemeCode::*;
        matches!(self, Aa | Ee | Ih | Oh | Uw | Ay | Oo)
    }
}

/// Per-tick blend-shape activation weights, keyed by morph target name.
///
/// This is the only artifact the engine exposes to the renderer. Every
/// stored value is clamped into \[0, 1\]; unknown ids are simply absent,
/// never created with placeholder values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlendWeightVector {
    weights: HashMap<String, f32>,
}

impl BlendWeightVector {
    /// Create an empty vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a weight, clamped into \[0, 1\]. NaN is treated as zero.
    pub fn set(&mut self, id: &str, weight: f32) {
        let w = if weight.is_nan() {
            0.0
        } else {
            weight.clamp(0.0, 1.0)
        };
        if let Some(slot) = self.weights.get_mut(id) {
            *slot = w;
        } else {
            self.weights.insert(id.to_owned(), w);
        }
    }

    /// Set a weight only if it raises the current value. Used when several
    /// overlapping envelopes drive the same shape in one tick.
    pub fn raise(&mut self, id: &str, weight: f32) {
        let current = self.get(id);
        if weight > current {
            self.set(id, weight);
        }
    }

    /// Current weight for a shape, 0.0 when absent.
    pub fn get(&self, id: &str) -> f32 {
        self.weights.get(id).copied().unwrap_or(0.0)
    }

    /// Whether the vector holds an entry for this shape.
    pub fn contains(&self, id: &str) -> bool {
        self.weights.contains_key(id)
    }

    /// Iterate over `(shape, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of shapes with an entry (including zeroed ones).
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether the vector holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Whether every stored weight is (numerically) zero.
    pub fn is_neutral(&self) -> bool {
        self.weights.values().all(|w| *w <= f32::EPSILON)
    }

    /// Zero every stored entry, keeping the keys. The final all-neutral
    /// emission uses this so the mesh never gets stuck mid-expression.
    pub fn neutralize(&mut self) {
        for w in self.weights.values_mut() {
            *w = 0.0;
        }
    }

    /// Multiply every stored weight by `factor` (clamped afterwards).
    pub fn scale(&mut self, factor: f32) {
        for w in self.weights.values_mut() {
            *w = (*w * factor).clamp(0.0, 1.0);
        }
    }

    /// Copy of this vector keeping only shapes present in the mesh's morph
    /// dictionary. Absent ids are skipped, never errors.
    pub fn filtered(&self, morph_targets: &HashMap<String, usize>) -> BlendWeightVector {
        let mut out = BlendWeightVector::new();
        for (id, w) in self.iter() {
            if morph_targets.contains_key(id) {
                out.set(id, w);
            }
        }
        out
    }
}
