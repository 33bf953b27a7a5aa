//! Speech-to-Text adapters
//!
//! Transcription itself is delegated to a sidecar service; this module only
//! speaks its wire format.

mod http;

pub use http::{HttpSttConfig, HttpTranscriber};
