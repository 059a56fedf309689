//! Selkie: speech-driven facial animation.
//!
//! Converts a speech signal — live frequency-domain energy frames or, when
//! analysis is unavailable, plain text — into a time-varying vector of
//! blend-shape weights applied to a 3D face mesh, synchronized to playback.
//!
//! # Architecture
//!
//! Two pipelines feed one scheduler, which feeds one weight sink:
//! - **Live path**: spectrum frame → `VisemeClassifier` → exponential
//!   smoothing → blend weights, every analysis tick
//! - **Text path**: text → `TextPhonemizer` → timed phoneme events →
//!   per-frame envelope evaluation → blend weights
//!
//! [`LipSyncEngine`] owns at most one session at a time; starting either
//! path supersedes the other (generation invalidation), and every session
//! ends with exactly one all-neutral emission so the mesh never gets stuck
//! mid-expression. The whole crate is single-threaded and frame-driven:
//! the host calls [`LipSyncEngine::tick`] once per display frame.
//!
//! Classification is a deterministic heuristic over four coarse frequency
//! bands, not acoustic modeling; thresholds live in [`LipSyncConfig`] and
//! should be treated as calibration starting points.

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod phonemize;
pub mod schedule;
pub mod viseme;

pub use classify::{BandEnergies, ClassificationSample, SignalWatchdog, SpectrumFrame, VisemeClassifier};
pub use config::{BandConfig, ClassifierConfig, FrequencyBand, LipSyncConfig, PhonemizerConfig, SchedulerConfig};
pub use engine::{EngineEvent, LipSyncEngine, WeightSink};
pub use error::{LipSyncError, Result};
pub use phonemize::{PhonemeEvent, TextPhonemizer};
pub use schedule::{SessionMode, Tick, TransitionScheduler};
pub use viseme::{BlendWeightVector, NEUTRAL_SHAPE, PhonemeCode, VisemeDescriptor, viseme_for};
