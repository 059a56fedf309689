//! Composition root: one engine, one active session, one weight sink.
//!
//! The engine owns the phonemizer, classifier, and scheduler, arbitrates
//! between the live and text pipelines (mutually exclusive, never
//! concurrent — both write to the same weight sink), and filters outgoing
//! weights through the mesh's morph-target dictionary.
//!
//! Everything is frame-driven: the host calls `tick(now_ms)` once per
//! display frame and feeds spectrum frames at the same cadence while a live
//! source is attached. No threads, no timers.

use crate::classify::{SignalWatchdog, SpectrumFrame, VisemeClassifier};
use crate::config::LipSyncConfig;
use crate::phonemize::TextPhonemizer;
use crate::schedule::{Tick, TransitionScheduler};
use crate::viseme::BlendWeightVector;
use std::collections::HashMap;
use tracing::{info, warn};

/// Callback receiving the filtered weight vector once per tick while a
/// session is active, plus one final all-neutral call when it ends.
pub type WeightSink = Box<dyn FnMut(&BlendWeightVector) + Send>;

/// Observable engine conditions, drained by the host each frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A new session became authoritative.
    SessionStarted {
        /// Session generation (monotonic).
        generation: u64,
        /// Live-analysis path (`true`) or text path (`false`).
        live: bool,
    },
    /// The active session completed or was cancelled; the final neutral
    /// vector has been emitted.
    SessionEnded {
        /// Generation of the session that ended.
        generation: u64,
    },
    /// Live analysis produced no signal at all for the configured run of
    /// ticks. Distinct from legitimate silence: the caller should fall
    /// back to the text path.
    AnalysisUnavailable,
}

/// Speech-driven facial animation engine.
pub struct LipSyncEngine {
    phonemizer: TextPhonemizer,
    classifier: VisemeClassifier,
    scheduler: TransitionScheduler,
    watchdog: SignalWatchdog,
    /// Morph targets that exist on the active mesh. Weights for ids absent
    /// from this dictionary are silently dropped.
    morph_targets: HashMap<String, usize>,
    sink: Option<WeightSink>,
    events: Vec<EngineEvent>,
    live_attached: bool,
}

impl LipSyncEngine {
    /// Create an engine for a mesh described by `morph_targets`
    /// (blend-shape name to influence index).
    pub fn new(cfg: LipSyncConfig, morph_targets: HashMap<String, usize>) -> Self {
        Self {
            phonemizer: TextPhonemizer::new(cfg.phonemizer.clone()),
            classifier: VisemeClassifier::new(cfg.bands.clone(), cfg.classifier.clone()),
            scheduler: TransitionScheduler::new(cfg.scheduler.clone()),
            watchdog: SignalWatchdog::new(&cfg.classifier),
            morph_targets,
            sink: None,
            events: Vec::new(),
            live_attached: false,
        }
    }

    /// Install the weight sink invoked on every tick of an active session.
    pub fn set_weight_sink(&mut self, sink: WeightSink) {
        self.sink = Some(sink);
    }

    /// Start a text-driven session for `text`, superseding whatever is
    /// active. `known_duration_s` (e.g. measured audio length) tightens the
    /// event timing when present. Text that produces no phonemes degrades
    /// to a cancel.
    pub fn speak(&mut self, text: &str, known_duration_s: Option<f32>, now_ms: f64) {
        self.live_attached = false;
        let events = self.phonemizer.events_for(text, known_duration_s);
        if events.is_empty() {
            info!("speak produced no events, cancelling");
            self.scheduler.cancel(now_ms);
            return;
        }
        self.scheduler.start(events, now_ms);
        self.events.push(EngineEvent::SessionStarted {
            generation: self.scheduler.generation(),
            live: false,
        });
    }

    /// Attach a live analysis source, superseding whatever is active. The
    /// host then feeds `push_spectrum` once per tick.
    pub fn attach_live(&mut self, now_ms: f64) {
        self.live_attached = true;
        self.watchdog.reset();
        self.scheduler.begin_live(now_ms);
        self.events.push(EngineEvent::SessionStarted {
            generation: self.scheduler.generation(),
            live: true,
        });
    }

    /// Feed one frequency-domain frame from the live source.
    ///
    /// Ignored unless a live session is attached. Classification never
    /// fails; an empty frame counts as silence (and feeds the
    /// analysis-unavailable watchdog).
    pub fn push_spectrum(
        &mut self,
        frame: &SpectrumFrame,
        sample_rate: f32,
        fft_size: usize,
        now_ms: f64,
    ) {
        if !self.live_attached {
            return;
        }
        let sample = self.classifier.classify(frame, sample_rate, fft_size, now_ms);
        if self.watchdog.observe(sample.overall_intensity) {
            warn!("live analysis yields no signal, reporting unavailable");
            self.events.push(EngineEvent::AnalysisUnavailable);
        }
        self.scheduler.apply_live(&sample);
    }

    /// Detach the live source (explicit detach or natural audio end) and
    /// fade to neutral.
    pub fn detach_live(&mut self, now_ms: f64) {
        if self.live_attached {
            self.live_attached = false;
            self.scheduler.cancel(now_ms);
        }
    }

    /// Cancel the active session, fading to neutral. Idempotent.
    pub fn cancel(&mut self, now_ms: f64) {
        self.live_attached = false;
        self.scheduler.cancel(now_ms);
    }

    /// Advance the engine one frame.
    ///
    /// While a session is active this produces a weight vector filtered to
    /// the mesh's known morph targets, hands it to the sink, and returns
    /// it. The final call of a session carries the all-neutral vector.
    pub fn tick(&mut self, now_ms: f64) -> Option<BlendWeightVector> {
        let (filtered, ended) = match self.scheduler.tick(now_ms) {
            Tick::Inactive => return None,
            Tick::Weights(w) => (w.filtered(&self.morph_targets), false),
            Tick::Finished(w) => (w.filtered(&self.morph_targets), true),
        };
        if let Some(sink) = self.sink.as_mut() {
            sink(&filtered);
        }
        if ended {
            self.events.push(EngineEvent::SessionEnded {
                generation: self.scheduler.generation(),
            });
        }
        Some(filtered)
    }

    /// Take all pending engine events.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Current session generation.
    pub fn generation(&self) -> u64 {
        self.scheduler.generation()
    }

    /// Whether a session (including its closing fade) is in progress.
    pub fn is_active(&self) -> bool {
        self.scheduler.is_active()
    }

    /// Whether a live source is currently attached.
    pub fn is_live(&self) -> bool {
        self.live_attached
    }

    /// Replace the mesh's morph-target dictionary (e.g. after a mesh swap).
    pub fn set_morph_targets(&mut self, morph_targets: HashMap<String, usize>) {
        self.morph_targets = morph_targets;
    }
}
