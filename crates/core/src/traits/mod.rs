//! Capability traits for backend services
//!
//! The turn pipeline talks to three narrow seams:
//!
//! ```text
//!   Transcriber: PCM audio → optional transcript
//!   Generator:   conversation history → reply text
//!   Synthesizer: text → PCM frames
//! ```
//!
//! Concrete adapters are chosen at construction time and injected; the
//! pipeline never inspects which implementation it was given.

mod llm;
mod speech;

pub use llm::Generator;
pub use speech::{NoPartials, PartialSink, SynthesizedAudio, Synthesizer, Transcriber};
