//! Text-to-Speech adapters
//!
//! - `HttpSynthesizer`: sidecar returning raw PCM16
//! - `SilenceSynthesizer`: silent audio sized to the text, for development

mod http;
mod silence;

pub use http::{HttpSynthesizer, HttpTtsConfig};
pub use silence::SilenceSynthesizer;
