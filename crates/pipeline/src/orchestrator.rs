//! Turn Orchestrator
//!
//! Drives one conversational turn through transcription, generation and
//! per-chunk synthesis, each behind its own deadline. Every turn runs in its
//! own task holding a [`TurnTicket`]; once the ticket goes stale (forced
//! reset, teardown) the task stops moving state and stops emitting.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use parley_config::{StageTimeoutConfig, TurnConfig};
use parley_core::{
    encode_wav, AudioFormat, Generator, PartialSink, ServerEvent, Stage, Synthesizer, Transcriber,
};

use crate::chunker::ResponseChunker;
use crate::conversation::Conversation;
use crate::error::TurnError;
use crate::metrics;
use crate::state::{TurnState, TurnTicket};
use crate::timeout::with_timeout;

/// Forwards interim transcripts while the turn is current
struct PartialForwarder<'a> {
    conversation: &'a Conversation,
    ticket: TurnTicket,
}

impl PartialSink for PartialForwarder<'_> {
    fn partial(&self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.conversation.emit_for(
                self.ticket,
                ServerEvent::TranscriptionPartial {
                    text: text.to_string(),
                },
            );
        }
    }
}

pub struct TurnOrchestrator {
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn Generator>,
    synthesizer: Arc<dyn Synthesizer>,
    timeouts: StageTimeoutConfig,
    chunker: ResponseChunker,
    input_format: AudioFormat,
}

impl TurnOrchestrator {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn Generator>,
        synthesizer: Arc<dyn Synthesizer>,
        config: &TurnConfig,
    ) -> Self {
        Self {
            transcriber,
            generator,
            synthesizer,
            timeouts: config.timeouts.clone(),
            chunker: ResponseChunker::new(config.max_chunk_chars),
            input_format: AudioFormat::pcm16_mono(config.ingest.sample_rate),
        }
    }

    pub fn backend_names(&self) -> (&str, &str, &str) {
        (
            self.transcriber.name(),
            self.generator.name(),
            self.synthesizer.name(),
        )
    }

    /// Spawn the turn for an utterance handed over by ingestion
    pub fn spawn_audio_turn(
        self: &Arc<Self>,
        conversation: Arc<Conversation>,
        audio: Vec<u8>,
        ticket: TurnTicket,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let conv = Arc::clone(&conversation);
        Self::spawn_tracked(&conversation, ticket, async move {
            this.run_audio_turn(&conv, audio, ticket).await;
        })
    }

    /// Start a typed turn. Rejected while another turn holds the session.
    pub fn start_text_turn(
        self: &Arc<Self>,
        conversation: Arc<Conversation>,
        text: &str,
    ) -> Result<JoinHandle<()>, TurnError> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(TurnError::EmptyInput);
        }
        let ticket = conversation.machine().begin_turn().map_err(TurnError::Busy)?;

        let this = Arc::clone(self);
        let conv = Arc::clone(&conversation);
        Ok(Self::spawn_tracked(&conversation, ticket, async move {
            this.run_text_turn(&conv, text, ticket).await;
        }))
    }

    /// Speak `greeting` without counting a turn or touching history
    pub fn start_greeting(
        self: &Arc<Self>,
        conversation: Arc<Conversation>,
        greeting: &str,
    ) -> Result<JoinHandle<()>, TurnError> {
        let ticket = conversation.machine().begin_turn().map_err(TurnError::Busy)?;
        if !conversation.machine().advance(ticket, TurnState::Responding) {
            return Err(TurnError::Busy(conversation.state()));
        }

        let this = Arc::clone(self);
        let conv = Arc::clone(&conversation);
        let greeting = greeting.to_string();
        Ok(Self::spawn_tracked(&conversation, ticket, async move {
            this.speak(&conv, ticket, &greeting, None).await;
        }))
    }

    fn spawn_tracked<F>(conversation: &Conversation, ticket: TurnTicket, turn: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(turn);
        conversation.track(ticket, handle.abort_handle());
        handle
    }

    /// Transcribe, then respond. The session is already PROCESSING.
    pub async fn run_audio_turn(&self, conv: &Conversation, audio: Vec<u8>, ticket: TurnTicket) {
        let character = conv.character();
        conv.emit_for(ticket, ServerEvent::ProcessingStarted { character });

        tracing::debug!(
            session_id = %conv.id(),
            bytes = audio.len(),
            duration_ms = self.input_format.duration_of(audio.len()).as_millis() as u64,
            "Transcribing utterance"
        );

        let partials = PartialForwarder {
            conversation: conv,
            ticket,
        };
        let started = Instant::now();
        let result = with_timeout(
            Stage::Stt,
            self.timeouts.stt(),
            self.transcriber
                .transcribe(&audio, self.input_format, &partials),
        )
        .await;
        let stt_elapsed = started.elapsed();

        let transcript = match result {
            Ok(transcript) => {
                metrics::record_stage_latency(Stage::Stt, "ok", stt_elapsed);
                transcript
            }
            Err(e) => {
                metrics::record_stage_latency(Stage::Stt, e.reason(), stt_elapsed);
                self.abort(conv, ticket, None, e);
                return;
            }
        };

        let text = transcript
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            if conv.machine().advance(ticket, TurnState::Listening) {
                tracing::debug!(session_id = %conv.id(), "Empty transcript, back to listening");
                conv.emit(ServerEvent::TranscriptionComplete {
                    text: String::new(),
                });
                metrics::record_turn("empty");
            }
            return;
        }

        let turn = conv.begin_user_turn(&text);
        conv.update_turn(turn, |t| t.stage_timings.record(Stage::Stt, stt_elapsed));
        if !conv.machine().advance(ticket, TurnState::Responding) {
            return;
        }
        tracing::info!(session_id = %conv.id(), turn, transcript = %text, "User turn");
        conv.emit_for(ticket, ServerEvent::TranscriptionComplete { text });

        self.respond(conv, ticket, turn).await;
    }

    /// Typed input: same as an audio turn from the transcript onwards
    pub async fn run_text_turn(&self, conv: &Conversation, text: String, ticket: TurnTicket) {
        let character = conv.character();
        conv.emit_for(ticket, ServerEvent::ProcessingStarted { character });

        let turn = conv.begin_user_turn(&text);
        if !conv.machine().advance(ticket, TurnState::Responding) {
            return;
        }
        tracing::info!(session_id = %conv.id(), turn, "Text turn");
        conv.emit_for(ticket, ServerEvent::TranscriptionComplete { text });

        self.respond(conv, ticket, turn).await;
    }

    async fn respond(&self, conv: &Conversation, ticket: TurnTicket, turn: u64) {
        let character = conv.character();
        let history = conv.history_snapshot();

        let started = Instant::now();
        let result = with_timeout(
            Stage::Llm,
            self.timeouts.llm(),
            self.generator.generate(&character, &history),
        )
        .await;
        let elapsed = started.elapsed();
        conv.update_turn(turn, |t| t.stage_timings.record(Stage::Llm, elapsed));

        let reply = match result {
            Ok(reply) => {
                metrics::record_stage_latency(Stage::Llm, "ok", elapsed);
                reply
            }
            Err(e) => {
                metrics::record_stage_latency(Stage::Llm, e.reason(), elapsed);
                self.abort(conv, ticket, Some(turn), e);
                return;
            }
        };

        self.speak(conv, ticket, reply.trim(), Some(turn)).await;
    }

    /// Chunk `text`, synthesize and stream each chunk in order, then return
    /// to LISTENING. A failed chunk is skipped; the rest still play.
    async fn speak(&self, conv: &Conversation, ticket: TurnTicket, text: &str, turn: Option<u64>) {
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            self.abort(conv, ticket, turn, TurnError::EmptyResult);
            return;
        }

        let total = chunks.len();
        if !conv.emit_for(
            ticket,
            ServerEvent::ResponseStart {
                total_chunks: total,
                full_text: text.to_string(),
            },
        ) {
            return;
        }

        let mut sent = 0usize;
        for (index, chunk) in chunks.iter().enumerate() {
            if !conv.is_current(ticket) {
                return;
            }
            let chunk_id = index + 1;

            let started = Instant::now();
            let result = with_timeout(
                Stage::Tts,
                self.timeouts.tts(),
                self.synthesizer.synthesize(chunk),
            )
            .await;
            let elapsed = started.elapsed();
            if let Some(n) = turn {
                conv.update_turn(n, |t| t.stage_timings.record(Stage::Tts, elapsed));
            }

            let audio = match result {
                Ok(audio) if !audio.is_empty() => {
                    metrics::record_stage_latency(Stage::Tts, "ok", elapsed);
                    audio
                }
                Ok(_) => {
                    tracing::warn!(session_id = %conv.id(), chunk_id, "Synthesis returned no audio, skipping chunk");
                    metrics::record_skipped_chunk();
                    continue;
                }
                Err(e) => {
                    metrics::record_stage_latency(Stage::Tts, e.reason(), elapsed);
                    tracing::warn!(session_id = %conv.id(), chunk_id, error = %e, "Skipping chunk");
                    metrics::record_skipped_chunk();
                    continue;
                }
            };

            let wav = match encode_wav(&audio.pcm(), audio.format) {
                Ok(wav) => wav,
                Err(e) => {
                    tracing::warn!(session_id = %conv.id(), chunk_id, error = %e, "WAV encoding failed, skipping chunk");
                    metrics::record_skipped_chunk();
                    continue;
                }
            };

            if conv.emit_for(ticket, ServerEvent::audio_chunk(chunk_id, total, chunk, &wav)) {
                sent += 1;
            }
        }

        if !conv.machine().advance(ticket, TurnState::Listening) {
            return;
        }
        if let Some(n) = turn {
            conv.update_turn(n, |t| t.complete(text));
        }
        tracing::debug!(session_id = %conv.id(), chunks_sent = sent, total, "Response delivered");
        conv.emit(ServerEvent::ResponseComplete { chunks_sent: sent });
        if turn.is_some() {
            metrics::record_turn("completed");
        }
    }

    /// Abort the turn owned by `ticket`: back to LISTENING, mark the turn
    /// failed and tell the client. No-op when the turn was already superseded.
    fn abort(&self, conv: &Conversation, ticket: TurnTicket, turn: Option<u64>, error: TurnError) {
        let reason = error.reason();
        if !conv.machine().force_reset_turn(ticket, reason) {
            tracing::debug!(session_id = %conv.id(), reason, "Stale turn failed after reset");
            return;
        }
        if let Some(n) = turn {
            conv.update_turn(n, |t| t.fail(reason));
        }
        tracing::warn!(session_id = %conv.id(), reason, error = %error, "Turn aborted");
        conv.emit(ServerEvent::error(error.to_string(), reason));
        metrics::record_turn(reason);
    }
}
