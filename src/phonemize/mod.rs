//! Deterministic text-to-phoneme-event conversion.
//!
//! This is not a G2P system: it scans text word by word, matching the
//! longest known letter pattern (digraphs like "sh", "th", "ee") before
//! falling back to single-letter sound classes, and skipping anything it
//! does not recognize. The output drives the transition scheduler when no
//! live audio analysis is available.

use crate::config::PhonemizerConfig;
use crate::viseme::{NEUTRAL_VISEME, PhonemeCode, VisemeDescriptor, viseme_for};
use rand::Rng;

/// One scheduled phoneme: a viseme with a position on the utterance
/// timeline. Ordered by `start_offset_ms`, non-overlapping by construction
/// (except the terminal fade, which deliberately overlays the tail).
#[derive(Debug, Clone, PartialEq)]
pub struct PhonemeEvent {
    /// Sound class this event animates.
    pub code: PhonemeCode,
    /// Resolved blend-shape descriptor for the code.
    pub viseme: VisemeDescriptor,
    /// Onset relative to the session clock, in ms.
    pub start_offset_ms: f32,
    /// Envelope duration in ms.
    pub duration_ms: f32,
    /// Terminal return-to-neutral event: decays the last known weights with
    /// an ease-out curve instead of running a bell pulse.
    pub terminal: bool,
}

/// Converts text into ordered, timed phoneme events.
pub struct TextPhonemizer {
    cfg: PhonemizerConfig,
}

impl TextPhonemizer {
    /// Create a phonemizer with the given timing configuration.
    pub fn new(cfg: PhonemizerConfig) -> Self {
        Self { cfg }
    }

    /// Full text path: tokenize, time, and (when no duration is known)
    /// normalize the event count for the text length.
    pub fn events_for(&self, text: &str, total_duration_s: Option<f32>) -> Vec<PhonemeEvent> {
        let codes = self.tokenize(text);
        let events = self.assign_durations(&codes, total_duration_s);
        if total_duration_s.is_none() {
            self.normalize_count(events, text.chars().count())
        } else {
            events
        }
    }

    /// Scan text into phoneme codes, case-insensitively and word by word.
    ///
    /// At each position the longest known multi-character pattern wins
    /// ("she" is `[Sh, Ee]`, never `[Ss, Ee]`). Unmatched characters emit
    /// nothing. A `Rest` code is inserted after every word that produced at
    /// least one sound, which also yields the trailing rest at text end.
    pub fn tokenize(&self, text: &str) -> Vec<PhonemeCode> {
        let lowered = text.to_lowercase();
        let mut codes = Vec::new();
        for word in lowered.split_whitespace() {
            let chars: Vec<char> = word.chars().collect();
            let before = codes.len();
            let mut i = 0;
            while i < chars.len() {
                if i + 1 < chars.len() {
                    if let Some(code) = match_digraph(chars[i], chars[i + 1]) {
                        codes.push(code);
                        i += 2;
                        continue;
                    }
                }
                if let Some(code) = match_single(chars[i]) {
                    codes.push(code);
                }
                i += 1;
            }
            if codes.len() > before {
                codes.push(PhonemeCode::Rest);
            }
        }
        codes
    }

    /// Attach onsets and durations to a code sequence.
    ///
    /// Without a known total duration each code gets its nominal per-class
    /// duration. With one (e.g. measured audio length), durations become
    /// `total / count` floored at `min_event_ms` — collapsing to a reduced
    /// key subset first when the audio is too short to fit every event —
    /// and a terminal return-to-neutral event is appended, timed to
    /// complete slightly before the total elapses, never after.
    pub fn assign_durations(
        &self,
        codes: &[PhonemeCode],
        total_duration_s: Option<f32>,
    ) -> Vec<PhonemeEvent> {
        if codes.is_empty() {
            return Vec::new();
        }
        match total_duration_s {
            None => {
                let mut events = Vec::with_capacity(codes.len());
                let mut offset = 0.0f32;
                for &code in codes {
                    let duration = self.nominal_duration_ms(code);
                    events.push(PhonemeEvent {
                        code,
                        viseme: viseme_for(code),
                        start_offset_ms: offset,
                        duration_ms: duration,
                        terminal: false,
                    });
                    offset += duration;
                }
                events
            }
            Some(total_s) => self.assign_known_duration(codes, total_s),
        }
    }

    fn assign_known_duration(&self, codes: &[PhonemeCode], total_s: f32) -> Vec<PhonemeEvent> {
        let total_ms = (total_s.max(0.0)) * 1000.0;
        if total_ms <= 0.0 {
            return Vec::new();
        }

        // Short audio cannot fit every code above the per-event floor;
        // collapse to an evenly strided key subset so each surviving event
        // stays visible.
        let fit = ((total_ms / self.cfg.min_event_ms).floor() as usize).max(1);
        let kept: Vec<PhonemeCode> =
            if total_s < self.cfg.short_audio_threshold_s || codes.len() > fit {
                let target = fit.min(codes.len()).max(1);
                stride_subset(codes, target)
            } else {
                codes.to_vec()
            };

        let per_event = (total_ms / kept.len() as f32).max(self.cfg.min_event_ms);
        let mut events: Vec<PhonemeEvent> = kept
            .iter()
            .enumerate()
            .map(|(i, &code)| PhonemeEvent {
                code,
                viseme: viseme_for(code),
                start_offset_ms: i as f32 * per_event,
                duration_ms: per_event,
                terminal: false,
            })
            .collect();

        // Terminal fade: onset before the audio ends, completion just shy
        // of it. Overlaying the tail of the last pulse is intentional.
        let tail_ms = (total_ms * 0.15).clamp(self.cfg.min_event_ms, 400.0);
        let start = (total_ms - tail_ms).max(0.0);
        events.push(PhonemeEvent {
            code: PhonemeCode::Rest,
            viseme: NEUTRAL_VISEME,
            start_offset_ms: start,
            duration_ms: (total_ms - start) * 0.95,
            terminal: true,
        });
        events
    }

    /// Clamp the event count into `[min_events, max_events]` for the text
    /// length. Too few events are padded by duplicating randomly chosen
    /// existing ones; too many are thinned by fixed-stride decimation so
    /// temporal coverage of the whole utterance survives (never truncation
    /// from one end). Offsets are recomputed afterwards.
    pub fn normalize_count(
        &self,
        mut events: Vec<PhonemeEvent>,
        text_len: usize,
    ) -> Vec<PhonemeEvent> {
        if events.is_empty() {
            return events;
        }
        let min = self.min_events(text_len);
        let max = self.max_events(text_len);

        if events.len() > max {
            let target = max.max(1);
            events = stride_subset(&events, target);
        } else if events.len() < min {
            let mut rng = rand::thread_rng();
            while events.len() < min {
                let idx = rng.gen_range(0..events.len());
                let dup = events[idx].clone();
                events.insert(idx + 1, dup);
            }
        }

        retime(&mut events);
        events
    }

    /// Lower event-count bound for a text of `text_len` characters.
    pub fn min_events(&self, text_len: usize) -> usize {
        let scaled = (text_len as f32 * self.cfg.min_events_per_char).round() as usize;
        scaled.max(self.cfg.min_events_floor)
    }

    /// Upper event-count bound for a text of `text_len` characters.
    pub fn max_events(&self, text_len: usize) -> usize {
        let scaled = (text_len as f32 * self.cfg.max_events_per_char).round() as usize;
        scaled.max(self.min_events(text_len))
    }

    fn nominal_duration_ms(&self, code: PhonemeCode) -> f32 {
        use PhonemeCode::*;
        match code {
            Rest => self.cfg.rest_ms,
            Ay | Oo => self.cfg.diphthong_ms,
            Aa | Ee | Ih | Oh | Uw => self.cfg.vowel_ms,
            Ss | Ff | Th | Sh | Ch => self.cfg.fricative_ms,
            Mbp | Dd | Kk => self.cfg.stop_ms,
            Nn | Ll | Rr | Ww | Ng => self.cfg.liquid_ms,
        }
    }
}

/// Keep `target` items from `items` at a fixed stride, always including the
/// first element, so the subset spans the whole sequence.
fn stride_subset<T: Clone>(items: &[T], target: usize) -> Vec<T> {
    if target >= items.len() {
        return items.to_vec();
    }
    let stride = (items.len() as f32 / target as f32).ceil() as usize;
    items
        .iter()
        .step_by(stride.max(1))
        .cloned()
        .collect()
}

/// Recompute onsets as the running sum of durations, preserving order.
fn retime(events: &mut [PhonemeEvent]) {
    let mut offset = 0.0f32;
    for ev in events.iter_mut() {
        ev.start_offset_ms = offset;
        offset += ev.duration_ms;
    }
}

fn match_digraph(a: char, b: char) -> Option<PhonemeCode> {
    use PhonemeCode::*;
    match (a, b) {
        ('t', 'h') => Some(Th),
        ('s', 'h') => Some(Sh),
        ('c', 'h') => Some(Ch),
        ('n', 'g') => Some(Ng),
        ('a', 'i') => Some(Ay),
        ('e', 'e') => Some(Ee),
        ('o', 'o') => Some(Oo),
        _ => None,
    }
}

fn match_single(c: char) -> Option<PhonemeCode> {
    use PhonemeCode::*;
    match c {
        'a' => Some(Aa),
        'e' => Some(Ee),
        'i' | 'y' => Some(Ih),
        'o' => Some(Oh),
        'u' => Some(Uw),
        'b' | 'p' | 'm' => Some(Mbp),
        'f' | 'v' => Some(Ff),
        's' | 'z' | 'x' => Some(Ss),
        't' | 'd' => Some(Dd),
        'c' | 'k' | 'g' | 'q' => Some(Kk),
        'n' => Some(Nn),
        'l' => Some(Ll),
        'r' => Some(Rr),
        'w' => Some(Ww),
        'j' => Some(Ch),
        // 'h' alone and anything non-alphabetic has no mouth shape.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::viseme::NEUTRAL_SHAPE;

    fn phonemizer() -> TextPhonemizer {
        TextPhonemizer::new(PhonemizerConfig::default())
    }

    #[test]
    fn digraph_wins_over_single_letters() {
        let codes = phonemizer().tokenize("she");
        assert_eq!(codes, vec![PhonemeCode::Sh, PhonemeCode::Ee, PhonemeCode::Rest]);
    }

    #[test]
    fn rests_separate_words() {
        let codes = phonemizer().tokenize("go on");
        let rests = codes.iter().filter(|c| **c == PhonemeCode::Rest).count();
        assert_eq!(rests, 2);
        assert_eq!(codes.last(), Some(&PhonemeCode::Rest));
    }

    #[test]
    fn unmatched_characters_are_skipped() {
        assert!(phonemizer().tokenize("h?!").is_empty());
        assert!(phonemizer().tokenize("").is_empty());
        // No stray rest when a word produced nothing.
        let codes = phonemizer().tokenize("h go");
        assert!(!codes.is_empty());
        assert_eq!(codes.iter().filter(|c| **c == PhonemeCode::Rest).count(), 1);
    }

    #[test]
    fn nominal_durations_favor_vowels() {
        let p = phonemizer();
        let events = p.assign_durations(&[PhonemeCode::Aa, PhonemeCode::Dd], None);
        assert!(events[0].duration_ms > events[1].duration_ms);
        // Sequential, non-overlapping.
        assert!(events[1].start_offset_ms >= events[0].start_offset_ms + events[0].duration_ms - 0.01);
    }

    #[test]
    fn known_duration_spreads_events_evenly() {
        let p = phonemizer();
        let codes = [
            PhonemeCode::Mbp,
            PhonemeCode::Aa,
            PhonemeCode::Mbp,
            PhonemeCode::Ih,
        ];
        let events = p.assign_durations(&codes, Some(2.0));
        // Four pulses plus the terminal fade.
        assert_eq!(events.len(), 5);
        let offsets: Vec<f32> = events[..4].iter().map(|e| e.start_offset_ms).collect();
        assert_eq!(offsets, vec![0.0, 500.0, 1000.0, 1500.0]);

        let terminal = events.last().unwrap();
        assert!(terminal.terminal);
        assert_eq!(terminal.viseme.primary, NEUTRAL_SHAPE);
        // Fires at or before 1.95 s and completes before the audio ends.
        assert!(terminal.start_offset_ms <= 1950.0);
        assert!(terminal.start_offset_ms + terminal.duration_ms < 2000.0);
    }

    #[test]
    fn short_audio_collapses_but_stays_visible() {
        let p = phonemizer();
        let codes: Vec<PhonemeCode> = std::iter::repeat(PhonemeCode::Aa).take(20).collect();
        let events = p.assign_durations(&codes, Some(0.3));
        // 300 ms at a 60 ms floor fits at most 5 pulses (plus terminal).
        let pulses = events.iter().filter(|e| !e.terminal).count();
        assert!(pulses <= 5);
        assert!(pulses >= 1);
        for ev in events.iter().filter(|e| !e.terminal) {
            assert!(ev.duration_ms >= p.cfg.min_event_ms - 0.01);
        }
    }

    #[test]
    fn normalize_pads_short_sequences() {
        let p = phonemizer();
        let events = p.assign_durations(&[PhonemeCode::Aa], None);
        let text_len = 30;
        let normalized = p.normalize_count(events, text_len);
        assert!(normalized.len() >= p.min_events(text_len));
        // Re-timed: strictly increasing offsets.
        for pair in normalized.windows(2) {
            assert!(pair[1].start_offset_ms > pair[0].start_offset_ms);
        }
    }

    #[test]
    fn normalize_decimates_long_sequences_with_coverage() {
        let p = phonemizer();
        let codes: Vec<PhonemeCode> = std::iter::repeat(PhonemeCode::Ee).take(40).collect();
        let events = p.assign_durations(&codes, None);
        let text_len = 10;
        let normalized = p.normalize_count(events, text_len);
        assert!(normalized.len() <= p.max_events(text_len));
        // First event survives decimation (coverage from the start).
        assert!(normalized[0].start_offset_ms.abs() < f32::EPSILON);
    }

    #[test]
    fn empty_input_yields_no_events() {
        let p = phonemizer();
        assert!(p.events_for("", None).is_empty());
        assert!(p.events_for("?!", Some(1.0)).is_empty());
    }
}
