//! Voice Activity Detection
//!
//! Sustained-energy heuristic over per-chunk RMS. No model is involved: a
//! trigger needs several consecutive loud chunks and is rate-limited by a
//! cooldown so one utterance produces one `speech_detected`.

mod energy;

pub use energy::{EnergySample, Observation, SpeechActivityDetector};
