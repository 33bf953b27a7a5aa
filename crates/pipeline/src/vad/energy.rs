//! Energy-based speech activity detector

use std::collections::VecDeque;
use tokio::time::Instant;

use parley_config::DetectorConfig;

/// Energy cap, as a multiple of the threshold, used for confidence
const ENERGY_RATIO_CAP: f32 = 3.0;
/// Share of confidence carried by loudness; the rest is consistency
const ENERGY_WEIGHT: f32 = 0.7;
const MIN_CONFIDENCE: f32 = 0.1;
const MAX_CONFIDENCE: f32 = 0.95;

/// One RMS measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergySample {
    pub energy: f32,
    pub at: Instant,
}

/// Result of observing one chunk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub triggered: bool,
    pub confidence: f32,
    pub energy: f32,
}

pub struct SpeechActivityDetector {
    config: DetectorConfig,
    history: VecDeque<EnergySample>,
    last_trigger: Option<Instant>,
}

impl SpeechActivityDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let capacity = config.history_capacity.max(1);
        Self {
            config,
            history: VecDeque::with_capacity(capacity),
            last_trigger: None,
        }
    }

    /// Record `energy` and decide whether sustained speech just started.
    ///
    /// Triggers only when the cooldown since the previous trigger has passed,
    /// `energy` reaches the threshold, and the last `min_sustained_chunks`
    /// samples (this one included) all reach it within one cooldown window.
    pub fn observe(&mut self, energy: f32, now: Instant) -> Observation {
        let capacity = self.config.history_capacity.max(1);
        while self.history.len() >= capacity {
            self.history.pop_front();
        }
        self.history.push_back(EnergySample { energy, at: now });

        let threshold = self.config.energy_threshold;
        let cooled_down = self
            .last_trigger
            .map_or(true, |t| now.saturating_duration_since(t) >= self.config.cooldown());

        let triggered = cooled_down && energy >= threshold && self.is_sustained(now);
        if triggered {
            self.last_trigger = Some(now);
        }

        Observation {
            triggered,
            confidence: self.confidence(energy),
            energy,
        }
    }

    /// Loud samples separated by a long gap in the stream are not one run
    fn is_sustained(&self, now: Instant) -> bool {
        let needed = self.config.min_sustained_chunks.max(1);
        let window = self.config.cooldown();
        self.history.len() >= needed
            && self.history.iter().rev().take(needed).all(|s| {
                s.energy >= self.config.energy_threshold
                    && now.saturating_duration_since(s.at) <= window
            })
    }

    /// Loudness relative to the threshold blended with how steady the
    /// sustained window is.
    fn confidence(&self, energy: f32) -> f32 {
        let ratio = (energy / self.config.energy_threshold).clamp(0.0, ENERGY_RATIO_CAP);
        let energy_score = ratio / ENERGY_RATIO_CAP * 0.9;

        let window: Vec<f32> = self
            .history
            .iter()
            .rev()
            .take(self.config.min_sustained_chunks.max(1))
            .map(|s| s.energy)
            .collect();
        let mean = window.iter().sum::<f32>() / window.len() as f32;
        let consistency = if mean > 0.0 {
            let variance =
                window.iter().map(|e| (e - mean).powi(2)).sum::<f32>() / window.len() as f32;
            (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0)
        } else {
            0.0
        };

        (ENERGY_WEIGHT * energy_score + (1.0 - ENERGY_WEIGHT) * consistency)
            .clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
    }

    /// Mean of the most recent `window` samples; 0.0 with no history
    pub fn recent_mean(&self, window: usize) -> f32 {
        let taken: Vec<f32> = self
            .history
            .iter()
            .rev()
            .take(window.max(1))
            .map(|s| s.energy)
            .collect();
        if taken.is_empty() {
            return 0.0;
        }
        taken.iter().sum::<f32>() / taken.len() as f32
    }

    pub fn threshold(&self) -> f32 {
        self.config.energy_threshold
    }

    /// Forget energy history so the next utterance has to sustain energy on
    /// its own. The cooldown survives so a reset cannot double-fire for the
    /// same utterance.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn detector() -> SpeechActivityDetector {
        SpeechActivityDetector::new(DetectorConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_needs_sustained_energy() {
        let mut vad = detector();
        let now = Instant::now();

        assert!(!vad.observe(800.0, now).triggered);
        assert!(!vad.observe(800.0, now).triggered);
        let third = vad.observe(800.0, now);
        assert!(third.triggered);
        assert!(third.confidence >= 0.1 && third.confidence <= 0.95);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_chunk_breaks_the_run() {
        let mut vad = detector();
        let now = Instant::now();

        vad.observe(800.0, now);
        vad.observe(800.0, now);
        assert!(!vad.observe(100.0, now).triggered);
        assert!(!vad.observe(800.0, now).triggered);
        assert!(!vad.observe(800.0, now).triggered);
        assert!(vad.observe(800.0, now).triggered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_debounces() {
        let mut vad = detector();
        let start = Instant::now();

        let mut triggers = 0;
        // 40 loud chunks, 100ms apart, spanning 3.9s
        for i in 0..40u64 {
            if vad.observe(900.0, start + Duration::from_millis(i * 100)).triggered {
                triggers += 1;
            }
        }
        // first at 200ms, second once 2s cooldown elapsed (2200ms)
        assert_eq!(triggers, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bursts_inside_cooldown_fire_once() {
        let mut vad = detector();
        let start = Instant::now();
        let at = |ms: u64| start + Duration::from_millis(ms);

        let mut triggered_at = Vec::new();
        // speech 0..300ms, silence, speech again 900..1200ms, silence, then
        // speech 2300..2600ms
        for ms in (0..2600).step_by(100) {
            let loud = ms < 300 || (900..1200).contains(&ms) || ms >= 2300;
            let energy = if loud { 900.0 } else { 50.0 };
            if vad.observe(energy, at(ms)).triggered {
                triggered_at.push(ms);
            }
        }
        // the second burst is sustained but lands inside the 2s cooldown
        assert_eq!(triggered_at, vec![200, 2500]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_out_spikes_are_not_a_run() {
        let mut vad = detector();
        let start = Instant::now();

        for i in 0..5u64 {
            let obs = vad.observe(900.0, start + Duration::from_secs(i * 3));
            assert!(!obs.triggered, "spike {} should not trigger", i);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_requires_a_fresh_run() {
        let mut vad = detector();
        let start = Instant::now();

        for i in 0..3u64 {
            vad.observe(900.0, start + Duration::from_millis(i * 100));
        }
        vad.reset();
        assert_eq!(vad.recent_mean(5), 0.0);

        let later = start + Duration::from_secs(10);
        assert!(!vad.observe(900.0, later).triggered, "a lone spike is not speech");
        assert!(!vad.observe(900.0, later + Duration::from_millis(100)).triggered);
        assert!(vad.observe(900.0, later + Duration::from_millis(200)).triggered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggers_spaced_by_cooldown() {
        let mut vad = detector();
        let start = Instant::now();
        let mut last: Option<Instant> = None;

        for i in 0..100u64 {
            let now = start + Duration::from_millis(i * 50);
            if vad.observe(2000.0, now).triggered {
                if let Some(prev) = last {
                    assert!(now - prev >= Duration::from_secs(2));
                }
                last = Some(now);
            }
        }
        assert!(last.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confidence_bounds() {
        let mut vad = detector();
        let now = Instant::now();

        let quiet = vad.observe(0.0, now);
        assert_eq!(quiet.confidence, 0.1);

        let mut loud = detector();
        for _ in 0..3 {
            loud.observe(10_000.0, now);
        }
        let obs = loud.observe(10_000.0, now);
        // capped energy (0.9 * 0.7) plus perfect consistency (0.3)
        assert!((obs.confidence - 0.93).abs() < 1e-4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_bounded() {
        let mut vad = detector();
        let now = Instant::now();
        for i in 0..25 {
            vad.observe(i as f32, now);
        }
        assert_eq!(vad.history.len(), 10);
        // last five samples: 20..=24
        assert!((vad.recent_mean(5) - 22.0).abs() < 1e-4);
    }

    #[test]
    fn test_recent_mean_empty() {
        assert_eq!(detector().recent_mean(5), 0.0);
    }
}
