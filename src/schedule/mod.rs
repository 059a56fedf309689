//! Transition scheduling: phoneme events and live samples into a continuous
//! blend-weight stream.
//!
//! One session at a time moves through `Idle → scheduled/live → fading →
//! Idle`. The timeline is an explicit, inspectable list of events evaluated
//! against the session clock each tick; there are no timer handles to
//! track, so cancellation is "bump the generation and stop iterating".
//!
//! Envelopes: an isolated phoneme pulse rises and falls on `sin(p·π)` so
//! consecutive phonemes never show a hard edge; fades to neutral use an
//! ease-out curve applied multiplicatively to the last known weights, since
//! a fade has no rise phase.

use crate::classify::ClassificationSample;
use crate::config::SchedulerConfig;
use crate::phonemize::PhonemeEvent;
use crate::viseme::BlendWeightVector;
use std::f32::consts::PI;
use tracing::{debug, info};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// No session; nothing is written to the mesh.
    Idle,
    /// A text-path timeline is scheduled/running.
    TextScheduled,
    /// A live classifier stream drives the weights directly.
    Live,
    /// A cancel or completion fade to neutral is in progress.
    Fading,
}

/// Result of one scheduler tick.
#[derive(Debug)]
pub enum Tick<'a> {
    /// No session active.
    Inactive,
    /// Session active: the weights to apply this tick.
    Weights(&'a BlendWeightVector),
    /// The session just ended: the mandatory final all-neutral vector.
    Finished(&'a BlendWeightVector),
}

/// Rise-then-fall pulse envelope over progress `p ∈ [0, 1]`.
pub fn bell(p: f32) -> f32 {
    (p.clamp(0.0, 1.0) * PI).sin()
}

/// Quartic ease-out over progress `p ∈ [0, 1]`.
pub fn ease_out(p: f32) -> f32 {
    1.0 - (1.0 - p.clamp(0.0, 1.0)).powi(4)
}

/// Turns phoneme timelines or live classification samples into per-tick
/// blend weights.
pub struct TransitionScheduler {
    cfg: SchedulerConfig,
    mode: SessionMode,
    generation: u64,
    timeline: Vec<PhonemeEvent>,
    session_start_ms: f64,
    /// Output buffer: the weights produced by the latest tick.
    weights: BlendWeightVector,
    /// Snapshot taken when a cancel fade or a start() lead-out begins.
    fade_from: BlendWeightVector,
    fade_start_ms: f64,
    /// When set, the previous session's weights are still decaying under a
    /// new session's output (start() never snaps to zero).
    lead_fade_from_ms: Option<f64>,
    /// Snapshot for the terminal return-to-neutral event.
    terminal_from: BlendWeightVector,
    terminal_captured: bool,
    live_target: Option<ClassificationSample>,
}

impl TransitionScheduler {
    /// Create an idle scheduler.
    pub fn new(cfg: SchedulerConfig) -> Self {
        Self {
            cfg,
            mode: SessionMode::Idle,
            generation: 0,
            timeline: Vec::new(),
            session_start_ms: 0.0,
            weights: BlendWeightVector::new(),
            fade_from: BlendWeightVector::new(),
            fade_start_ms: 0.0,
            lead_fade_from_ms: None,
            terminal_from: BlendWeightVector::new(),
            terminal_captured: false,
            live_target: None,
        }
    }

    /// Current session generation. Incremented on every start/cancel so
    /// work tagged with a stale generation can discard itself.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current lifecycle state.
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Whether a session (including a fade) is in progress.
    pub fn is_active(&self) -> bool {
        self.mode != SessionMode::Idle
    }

    /// Start a text-path session from a phoneme timeline.
    ///
    /// Supersedes whatever was running: the generation is bumped
    /// immediately, the old timeline is dropped, and any weights still on
    /// the mesh decay through the fade path underneath the new events
    /// rather than snapping to zero. An empty timeline degrades to
    /// `cancel()`.
    pub fn start(&mut self, events: Vec<PhonemeEvent>, now_ms: f64) {
        if events.is_empty() {
            self.cancel(now_ms);
            return;
        }
        self.generation = self.generation.wrapping_add(1);
        self.begin_lead_fade(now_ms);
        self.timeline = events;
        self.session_start_ms = now_ms;
        self.terminal_captured = false;
        self.live_target = None;
        self.mode = SessionMode::TextScheduled;
        info!(
            generation = self.generation,
            events = self.timeline.len(),
            "text session scheduled"
        );
    }

    /// Start a live-path session. Classification samples are applied with
    /// `apply_live` and written out on each tick.
    pub fn begin_live(&mut self, now_ms: f64) {
        self.generation = self.generation.wrapping_add(1);
        self.begin_lead_fade(now_ms);
        self.timeline.clear();
        self.terminal_captured = false;
        self.live_target = None;
        self.mode = SessionMode::Live;
        info!(generation = self.generation, "live session attached");
    }

    /// Feed the latest smoothed classification estimate. The live path
    /// overwrites rather than queues: each sample is a continuous estimate,
    /// not a discrete event.
    pub fn apply_live(&mut self, sample: &ClassificationSample) {
        if self.mode == SessionMode::Live {
            self.live_target = Some(sample.clone());
        }
    }

    /// Cancel the current session and fade to neutral over the configured
    /// fade duration. Idempotent: cancelling an idle scheduler with nothing
    /// on the mesh is a no-op.
    pub fn cancel(&mut self, now_ms: f64) {
        if self.mode == SessionMode::Idle && self.weights.is_neutral() {
            return;
        }
        self.generation = self.generation.wrapping_add(1);
        self.timeline.clear();
        self.live_target = None;
        self.lead_fade_from_ms = None;
        self.fade_from = self.weights.clone();
        self.fade_start_ms = now_ms;
        self.mode = SessionMode::Fading;
        debug!(generation = self.generation, "session cancelled, fading to neutral");
    }

    /// Evaluate the session at `now_ms` and produce this tick's weights.
    ///
    /// Exactly one `Tick::Finished` (all-neutral) is produced per session,
    /// after which the scheduler is idle.
    pub fn tick(&mut self, now_ms: f64) -> Tick<'_> {
        match self.mode {
            SessionMode::Idle => Tick::Inactive,
            SessionMode::Fading => self.tick_fade(now_ms),
            SessionMode::TextScheduled => self.tick_text(now_ms),
            SessionMode::Live => self.tick_live(now_ms),
        }
    }

    fn begin_lead_fade(&mut self, now_ms: f64) {
        if self.weights.is_neutral() {
            self.lead_fade_from_ms = None;
        } else {
            self.fade_from = self.weights.clone();
            self.lead_fade_from_ms = Some(now_ms);
        }
    }

    /// Overlay the decaying previous-session weights during a lead fade.
    fn apply_lead_fade(&mut self, now_ms: f64, out: &mut BlendWeightVector) {
        let Some(from_ms) = self.lead_fade_from_ms else {
            return;
        };
        let p = ((now_ms - from_ms) / f64::from(self.cfg.final_fade_ms)) as f32;
        if p >= 1.0 {
            self.lead_fade_from_ms = None;
            return;
        }
        let remaining = 1.0 - ease_out(p);
        for (id, w) in self.fade_from.iter() {
            out.raise(id, w * remaining);
        }
    }

    fn tick_fade(&mut self, now_ms: f64) -> Tick<'_> {
        let p = ((now_ms - self.fade_start_ms) / f64::from(self.cfg.final_fade_ms)) as f32;
        if p >= 1.0 {
            self.weights = self.fade_from.clone();
            self.weights.neutralize();
            self.mode = SessionMode::Idle;
            info!("fade complete, session idle");
            return Tick::Finished(&self.weights);
        }
        let mut out = self.fade_from.clone();
        out.scale(1.0 - ease_out(p));
        self.weights = out;
        Tick::Weights(&self.weights)
    }

    fn tick_text(&mut self, now_ms: f64) -> Tick<'_> {
        let t = (now_ms - self.session_start_ms).max(0.0) as f32;

        let session_end = self
            .timeline
            .iter()
            .map(|e| e.start_offset_ms + e.duration_ms)
            .fold(0.0f32, f32::max);
        if t >= session_end {
            self.timeline.clear();
            self.weights.neutralize();
            self.mode = SessionMode::Idle;
            info!(generation = self.generation, "text session complete");
            return Tick::Finished(&self.weights);
        }

        // Terminal return-to-neutral: once it begins it takes over from the
        // pulse envelopes, decaying the last known weights.
        let terminal = self
            .timeline
            .iter()
            .find(|e| e.terminal && t >= e.start_offset_ms)
            .cloned();
        if let Some(ev) = terminal {
            if !self.terminal_captured {
                self.terminal_from = self.weights.clone();
                self.terminal_captured = true;
            }
            let p = ((t - ev.start_offset_ms) / ev.duration_ms.max(1.0)).clamp(0.0, 1.0);
            let mut out = self.terminal_from.clone();
            out.scale(1.0 - ease_out(p));
            self.weights = out;
            return Tick::Weights(&self.weights);
        }

        // Bell pulses for every active event; overlapping envelopes on the
        // same shape keep the louder one.
        let mut out = self.weights.clone();
        out.neutralize();
        for ev in &self.timeline {
            if ev.terminal {
                continue;
            }
            let local = t - ev.start_offset_ms;
            if local < 0.0 || local >= ev.duration_ms {
                continue;
            }
            let p = local / ev.duration_ms.max(1.0);
            let w = ev.viseme.base_intensity * bell(p);
            out.raise(ev.viseme.primary, w);
            if let Some(secondary) = ev.viseme.secondary {
                out.raise(secondary, w * self.cfg.secondary_scale);
            }
        }
        self.apply_lead_fade(now_ms, &mut out);
        self.weights = out;
        Tick::Weights(&self.weights)
    }

    fn tick_live(&mut self, now_ms: f64) -> Tick<'_> {
        let alpha = self.cfg.smoothing.clamp(0.0, 0.99);

        let mut target = BlendWeightVector::new();
        if let Some(sample) = &self.live_target {
            let w = sample.viseme.base_intensity * sample.confidence;
            target.set(sample.viseme.primary, w);
            if let Some(secondary) = sample.viseme.secondary {
                target.set(secondary, w * self.cfg.secondary_scale);
            }
        }

        // Exponential averaging over the union of previous and target keys;
        // shapes the target no longer names decay toward zero.
        let mut out = BlendWeightVector::new();
        for (id, prev) in self.weights.iter() {
            out.set(id, prev * alpha + target.get(id) * (1.0 - alpha));
        }
        for (id, tw) in target.iter() {
            if !self.weights.contains(id) {
                out.set(id, tw * (1.0 - alpha));
            }
        }
        self.apply_lead_fade(now_ms, &mut out);
        self.weights = out;
        Tick::Weights(&self.weights)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::config::PhonemizerConfig;
    use crate::phonemize::TextPhonemizer;
    use crate::viseme::{PhonemeCode, viseme_for};

    fn scheduler() -> TransitionScheduler {
        TransitionScheduler::new(SchedulerConfig::default())
    }

    fn pulse(code: PhonemeCode, start_ms: f32, duration_ms: f32) -> PhonemeEvent {
        PhonemeEvent {
            code,
            viseme: viseme_for(code),
            start_offset_ms: start_ms,
            duration_ms,
            terminal: false,
        }
    }

    #[test]
    fn bell_rises_and_falls() {
        assert!(bell(0.0).abs() < 1e-6);
        assert!((bell(0.5) - 1.0).abs() < 1e-6);
        assert!(bell(1.0).abs() < 1e-6);
        assert!(bell(0.25) > 0.0 && bell(0.25) < 1.0);
    }

    #[test]
    fn ease_out_is_monotonic() {
        assert!(ease_out(0.0).abs() < 1e-6);
        assert!((ease_out(1.0) - 1.0).abs() < 1e-6);
        let mut prev = 0.0;
        for i in 1..=10 {
            let v = ease_out(i as f32 / 10.0);
            assert!(v >= prev);
            prev = v;
        }
    }

    #[test]
    fn weights_neutral_at_onset_and_peak_at_midpoint() {
        let mut s = scheduler();
        let ev = pulse(PhonemeCode::Aa, 0.0, 200.0);
        let primary = ev.viseme.primary;
        s.start(vec![ev], 1000.0);

        match s.tick(1000.0) {
            Tick::Weights(w) => assert!(w.get(primary).abs() < 1e-6),
            other => panic!("expected weights, got {other:?}"),
        }
        match s.tick(1100.0) {
            Tick::Weights(w) => {
                let peak = w.get(primary);
                assert!((peak - viseme_for(PhonemeCode::Aa).base_intensity).abs() < 1e-3);
            }
            other => panic!("expected weights, got {other:?}"),
        }
    }

    #[test]
    fn secondary_tracks_primary_at_reduced_weight() {
        let mut s = scheduler();
        let ev = pulse(PhonemeCode::Aa, 0.0, 200.0);
        let (primary, secondary) = (ev.viseme.primary, ev.viseme.secondary.unwrap());
        s.start(vec![ev], 0.0);
        if let Tick::Weights(w) = s.tick(100.0) {
            let p = w.get(primary);
            let sec = w.get(secondary);
            assert!(p > 0.0);
            assert!((sec - p * 0.7).abs() < 1e-3);
        } else {
            panic!("expected weights");
        }
    }

    #[test]
    fn session_completes_with_single_neutral_emission() {
        let mut s = scheduler();
        s.start(vec![pulse(PhonemeCode::Aa, 0.0, 100.0)], 0.0);
        let _ = s.tick(50.0);
        match s.tick(150.0) {
            Tick::Finished(w) => assert!(w.is_neutral()),
            other => panic!("expected finished, got {other:?}"),
        }
        assert!(matches!(s.tick(160.0), Tick::Inactive));
        assert!(!s.is_active());
    }

    #[test]
    fn cancel_fades_monotonically_then_finishes_neutral() {
        let mut s = scheduler();
        s.start(vec![pulse(PhonemeCode::Aa, 0.0, 400.0)], 0.0);
        let _ = s.tick(200.0); // mid-pulse, weights up
        let primary = viseme_for(PhonemeCode::Aa).primary;
        let before = match s.tick(200.0) {
            Tick::Weights(w) => w.get(primary),
            other => panic!("expected weights, got {other:?}"),
        };
        assert!(before > 0.0);

        s.cancel(200.0);
        let mut last = before;
        for i in 1..=2 {
            let now = 200.0 + f64::from(i) * 100.0;
            match s.tick(now) {
                Tick::Weights(w) => {
                    let v = w.get(primary);
                    assert!(v < last, "fade must decrease: {v} >= {last}");
                    last = v;
                }
                other => panic!("expected weights, got {other:?}"),
            }
        }
        match s.tick(600.0) {
            Tick::Finished(w) => assert!(w.is_neutral()),
            other => panic!("expected finished, got {other:?}"),
        }
    }

    #[test]
    fn cancel_when_idle_is_a_no_op() {
        let mut s = scheduler();
        let generation = s.generation();
        s.cancel(0.0);
        s.cancel(10.0);
        assert_eq!(s.generation(), generation);
        assert!(matches!(s.tick(20.0), Tick::Inactive));
    }

    #[test]
    fn empty_timeline_degrades_to_cancel() {
        let mut s = scheduler();
        s.start(Vec::new(), 0.0);
        assert!(matches!(s.tick(0.0), Tick::Inactive));
    }

    #[test]
    fn starting_supersedes_previous_generation() {
        let mut s = scheduler();
        s.start(vec![pulse(PhonemeCode::Aa, 0.0, 1_000.0)], 0.0);
        let first = s.generation();
        let _ = s.tick(500.0);

        s.start(vec![pulse(PhonemeCode::Ss, 0.0, 1_000.0)], 500.0);
        assert!(s.generation() > first);
        // The old event would have peaked at 500; after the lead fade runs
        // out, only the new event's shapes remain active.
        if let Tick::Weights(w) = s.tick(1_400.0) {
            assert!(w.get(viseme_for(PhonemeCode::Ss).primary) > 0.0);
            assert!(w.get(viseme_for(PhonemeCode::Aa).primary).abs() < 1e-3);
        } else {
            panic!("expected weights");
        }
    }

    #[test]
    fn start_does_not_snap_previous_weights_to_zero() {
        let mut s = scheduler();
        s.start(vec![pulse(PhonemeCode::Aa, 0.0, 1_000.0)], 0.0);
        let primary = viseme_for(PhonemeCode::Aa).primary;
        let before = match s.tick(500.0) {
            Tick::Weights(w) => w.get(primary),
            other => panic!("expected weights, got {other:?}"),
        };
        assert!(before > 0.9);

        // New session whose event starts later: immediately after the
        // restart the old shape is still partially up, fading out.
        s.start(vec![pulse(PhonemeCode::Ss, 500.0, 400.0)], 1_000.0);
        if let Tick::Weights(w) = s.tick(1_050.0) {
            let residual = w.get(primary);
            assert!(residual > 0.0, "lead fade keeps old weights non-zero");
            assert!(residual < before, "but decaying");
        } else {
            panic!("expected weights");
        }
    }

    #[test]
    fn terminal_event_decays_last_known_weights() {
        let p = TextPhonemizer::new(PhonemizerConfig::default());
        let events = p.assign_durations(
            &[PhonemeCode::Aa, PhonemeCode::Oh, PhonemeCode::Ee, PhonemeCode::Uw],
            Some(2.0),
        );
        let mut s = scheduler();
        s.start(events, 0.0);

        // Ramp through the pulses.
        let mut held: f32 = 0.0;
        for now in [100.0, 400.0, 900.0, 1_400.0, 1_650.0] {
            if let Tick::Weights(w) = s.tick(now) {
                held = held.max(w.iter().map(|(_, v)| v).fold(0.0, f32::max));
            }
        }
        assert!(held > 0.0);

        // Inside the terminal window the total weight only decreases.
        let mut prev = f32::MAX;
        for now in [1_750.0, 1_850.0, 1_950.0] {
            if let Tick::Weights(w) = s.tick(now) {
                let total: f32 = w.iter().map(|(_, v)| v).sum();
                assert!(total <= prev + 1e-4);
                prev = total;
            }
        }
    }

    #[test]
    fn live_path_smooths_toward_target() {
        use crate::classify::ClassificationSample;
        let mut s = scheduler();
        s.begin_live(0.0);

        let mut sample = ClassificationSample::silence(0.0);
        sample.code = PhonemeCode::Aa;
        sample.viseme = viseme_for(PhonemeCode::Aa);
        sample.confidence = 1.0;
        sample.overall_intensity = 0.5;
        s.apply_live(&sample);

        let primary = viseme_for(PhonemeCode::Aa).primary;
        let target = viseme_for(PhonemeCode::Aa).base_intensity;
        let mut prev = 0.0;
        for i in 1..=30 {
            if let Tick::Weights(w) = s.tick(f64::from(i) * 16.0) {
                let v = w.get(primary);
                assert!(v >= prev - 1e-5, "smoothed weight should rise");
                prev = v;
            }
        }
        assert!((prev - target).abs() < 0.05, "converges near target: {prev} vs {target}");

        // Silence target: weights decay back down.
        s.apply_live(&ClassificationSample::silence(500.0));
        for i in 31..=80 {
            let _ = s.tick(f64::from(i) * 16.0);
        }
        if let Tick::Weights(w) = s.tick(1_400.0) {
            assert!(w.get(primary) < 0.05);
        } else {
            panic!("expected weights");
        }
    }
}
