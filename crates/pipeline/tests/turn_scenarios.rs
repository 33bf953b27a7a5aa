//! End-to-end turn scenarios against scripted backends

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use parley_config::TurnConfig;
use parley_core::{
    samples_to_pcm16, AudioFormat, GenerationError, Generator, PartialSink, ServerEvent,
    SynthesisError, SynthesizedAudio, Synthesizer, Transcriber, TranscriptionError, Turn,
};
use parley_pipeline::{
    Conversation, EventSink, IngestAction, ReliabilityWatchdog, SilenceSynthesizer, TurnError,
    TurnOrchestrator, TurnState, TurnTicket,
};

enum SttScript {
    Say(&'static str),
    SayWithPartials(&'static str, Vec<&'static str>),
    Hang,
    Fail,
}

struct ScriptedTranscriber {
    script: Mutex<VecDeque<SttScript>>,
}

impl ScriptedTranscriber {
    fn new(script: Vec<SttScript>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _format: AudioFormat,
        partials: &dyn PartialSink,
    ) -> Result<Option<String>, TranscriptionError> {
        let next = self.script.lock().pop_front();
        match next {
            Some(SttScript::Say(text)) => Ok(Some(text.to_string())),
            Some(SttScript::SayWithPartials(text, interim)) => {
                for p in interim {
                    partials.partial(p);
                }
                Ok(Some(text.to_string()))
            }
            Some(SttScript::Hang) => std::future::pending().await,
            Some(SttScript::Fail) => Err(TranscriptionError::Failed("decoder crashed".into())),
            None => Ok(None),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

enum LlmScript {
    Reply(&'static str),
    Hang,
    Fail,
}

struct ScriptedGenerator {
    script: LlmScript,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedGenerator {
    fn new(script: LlmScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn replying(reply: &'static str) -> Arc<Self> {
        Self::new(LlmScript::Reply(reply))
    }

    fn hanging() -> Arc<Self> {
        Self::new(LlmScript::Hang)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, _character: &str, history: &[Turn]) -> Result<String, GenerationError> {
        self.seen.lock().push(history.to_vec());
        match self.script {
            LlmScript::Reply(reply) => Ok(reply.to_string()),
            LlmScript::Hang => std::future::pending().await,
            LlmScript::Fail => Err(GenerationError::Unavailable("connection refused".into())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Silence for every chunk except those containing `fail_on`
struct FlakySynthesizer {
    inner: SilenceSynthesizer,
    fail_on: &'static str,
}

#[async_trait]
impl Synthesizer for FlakySynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        if text.contains(self.fail_on) {
            return Err(SynthesisError::Failed("voice model error".into()));
        }
        self.inner.synthesize(text).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Never finishes chunks containing `hang_on`
struct StallingSynthesizer {
    inner: SilenceSynthesizer,
    hang_on: &'static str,
}

#[async_trait]
impl Synthesizer for StallingSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        if text.contains(self.hang_on) {
            std::future::pending::<()>().await;
        }
        self.inner.synthesize(text).await
    }

    fn name(&self) -> &str {
        "stalling"
    }
}

/// Takes `delay` per chunk, inside the per-chunk deadline
struct SlowSynthesizer {
    inner: SilenceSynthesizer,
    delay: Duration,
}

#[async_trait]
impl Synthesizer for SlowSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        tokio::time::sleep(self.delay).await;
        self.inner.synthesize(text).await
    }

    fn name(&self) -> &str {
        "slow"
    }
}

fn silence() -> SilenceSynthesizer {
    SilenceSynthesizer::new(16_000, Duration::from_millis(100))
}

struct Harness {
    conv: Arc<Conversation>,
    orchestrator: Arc<TurnOrchestrator>,
    events: UnboundedReceiver<ServerEvent>,
}

impl Harness {
    fn new(
        config: TurnConfig,
        stt: Arc<dyn Transcriber>,
        llm: Arc<dyn Generator>,
        tts: Arc<dyn Synthesizer>,
    ) -> Self {
        let (sink, events) = EventSink::channel();
        let conv = Arc::new(Conversation::new("test-session", "ada", &config, sink));
        let orchestrator = Arc::new(TurnOrchestrator::new(stt, llm, tts, &config));
        Self {
            conv,
            orchestrator,
            events,
        }
    }

    /// Stream loud 100ms chunks until the buffer is handed over
    async fn speak_until_ready(&self) -> (Vec<u8>, TurnTicket) {
        let chunk = samples_to_pcm16(&[2500; 1600]);
        for _ in 0..60 {
            let action = self.conv.ingest(&chunk);
            tokio::time::advance(Duration::from_millis(100)).await;
            if let IngestAction::Ready { audio, ticket } = action {
                return (audio, ticket);
            }
        }
        panic!("utterance never became ready");
    }

    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

fn kinds(events: &[ServerEvent]) -> Vec<&'static str> {
    events.iter().map(ServerEvent::kind).collect()
}

fn chunk_ids(events: &[ServerEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::AudioChunk { chunk_id, .. } => Some(*chunk_id),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn happy_path_streams_reply_and_returns_to_listening() {
    let llm = ScriptedGenerator::replying("Hello there. How can I help you today?");
    let mut h = Harness::new(
        TurnConfig::default(),
        ScriptedTranscriber::new(vec![SttScript::SayWithPartials("hi", vec!["h"])]),
        llm.clone(),
        Arc::new(silence()),
    );

    let (audio, ticket) = h.speak_until_ready().await;
    assert_eq!(audio.len(), 32_000);
    assert_eq!(h.conv.state(), TurnState::Processing);

    h.orchestrator
        .spawn_audio_turn(h.conv.clone(), audio, ticket)
        .await
        .unwrap();

    let events = h.drain();
    assert_eq!(
        kinds(&events),
        vec![
            "speech_detected",
            "processing_started",
            "transcription_partial",
            "transcription_complete",
            "response_start",
            "audio_chunk",
            "response_complete",
        ]
    );
    assert_eq!(
        events[3],
        ServerEvent::TranscriptionComplete {
            text: "hi".to_string()
        }
    );

    match &events[5] {
        ServerEvent::AudioChunk {
            chunk_id,
            total_chunks,
            is_final,
            audio,
            ..
        } => {
            assert_eq!((*chunk_id, *total_chunks, *is_final), (1, 1, true));
            let wav = BASE64.decode(audio).unwrap();
            let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
            assert_eq!(reader.spec().sample_rate, 16_000);
            assert_eq!(reader.spec().channels, 1);
            // 8 words at 100ms each
            assert_eq!(reader.duration(), 12_800);
        }
        other => panic!("expected audio chunk, got {:?}", other),
    }
    assert_eq!(events[6], ServerEvent::ResponseComplete { chunks_sent: 1 });

    assert_eq!(h.conv.state(), TurnState::Listening);
    assert_eq!(h.conv.turn_count(), 1);
    let turn = h.conv.last_turn().unwrap();
    assert!(turn.success);
    assert_eq!(turn.user_text, "hi");
    assert_eq!(
        turn.agent_text.as_deref(),
        Some("Hello there. How can I help you today?")
    );

    let seen = llm.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].last().map(|t| t.user_text.as_str()), Some("hi"));
}

#[tokio::test(start_paused = true)]
async fn hung_transcriber_times_out_and_session_recovers() {
    let mut h = Harness::new(
        TurnConfig::default(),
        ScriptedTranscriber::new(vec![SttScript::Hang]),
        ScriptedGenerator::replying("unused"),
        Arc::new(silence()),
    );
    let watchdog = ReliabilityWatchdog::new(&TurnConfig::default().watchdog).spawn(h.conv.clone());

    let started = tokio::time::Instant::now();
    let (audio, ticket) = h.speak_until_ready().await;
    h.orchestrator
        .spawn_audio_turn(h.conv.clone(), audio, ticket)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(7));

    let events = h.drain();
    match events.last() {
        Some(ServerEvent::Error { reason, .. }) => assert_eq!(reason, "stt_timeout"),
        other => panic!("expected stt_timeout, got {:?}", other),
    }
    assert_eq!(h.conv.state(), TurnState::Listening);
    assert_eq!(h.conv.turn_count(), 0);

    // cooldown has long passed; new speech is detected again
    let chunk = samples_to_pcm16(&[2500; 1600]);
    for _ in 0..3 {
        h.conv.ingest(&chunk);
        tokio::time::advance(Duration::from_millis(100)).await;
    }
    assert_eq!(kinds(&h.drain()), vec!["speech_detected"]);

    watchdog.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failing_transcriber_reports_stt_error() {
    let mut h = Harness::new(
        TurnConfig::default(),
        ScriptedTranscriber::new(vec![SttScript::Fail]),
        ScriptedGenerator::replying("unused"),
        Arc::new(silence()),
    );
    let (audio, ticket) = h.speak_until_ready().await;
    h.orchestrator
        .spawn_audio_turn(h.conv.clone(), audio, ticket)
        .await
        .unwrap();

    match h.drain().last() {
        Some(ServerEvent::Error { reason, message }) => {
            assert_eq!(reason, "stt_error");
            assert!(message.contains("decoder crashed"));
        }
        other => panic!("expected stt_error, got {:?}", other),
    }
    assert_eq!(h.conv.state(), TurnState::Listening);
}

#[tokio::test(start_paused = true)]
async fn failed_chunk_is_skipped() {
    let config = TurnConfig {
        max_chunk_chars: 20,
        ..TurnConfig::default()
    };
    let mut h = Harness::new(
        config,
        ScriptedTranscriber::new(vec![]),
        ScriptedGenerator::replying("First part here. Second part here. Third part here."),
        Arc::new(FlakySynthesizer {
            inner: silence(),
            fail_on: "Second",
        }),
    );

    h.orchestrator
        .start_text_turn(h.conv.clone(), "tell me three things")
        .unwrap()
        .await
        .unwrap();

    let events = h.drain();
    assert!(events.contains(&ServerEvent::ResponseStart {
        total_chunks: 3,
        full_text: "First part here. Second part here. Third part here.".to_string(),
    }));
    assert_eq!(chunk_ids(&events), vec![1, 3]);
    let last_chunk_final = events.iter().any(|e| {
        matches!(
            e,
            ServerEvent::AudioChunk {
                chunk_id: 3,
                is_final: true,
                ..
            }
        )
    });
    assert!(last_chunk_final);
    assert_eq!(
        events.last(),
        Some(&ServerEvent::ResponseComplete { chunks_sent: 2 })
    );
    assert_eq!(h.conv.state(), TurnState::Listening);
    assert!(h.conv.last_turn().unwrap().success);
}

#[tokio::test(start_paused = true)]
async fn background_noise_never_starts_a_turn() {
    let mut h = Harness::new(
        TurnConfig::default(),
        ScriptedTranscriber::new(vec![]),
        ScriptedGenerator::replying("unused"),
        Arc::new(silence()),
    );

    let hum = samples_to_pcm16(&[150; 1600]);
    let mut discarded = 0;
    for _ in 0..100 {
        match h.conv.ingest(&hum) {
            IngestAction::Ready { .. } => panic!("noise reached transcription"),
            IngestAction::Discarded { .. } => discarded += 1,
            _ => {}
        }
        tokio::time::advance(Duration::from_millis(100)).await;
    }

    assert_eq!(discarded, 2);
    assert!(h.drain().is_empty());
    assert_eq!(h.conv.state(), TurnState::Listening);
    assert_eq!(h.conv.turn_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn empty_transcript_returns_to_listening_without_a_turn() {
    let mut h = Harness::new(
        TurnConfig::default(),
        ScriptedTranscriber::new(vec![SttScript::Say("   ")]),
        ScriptedGenerator::replying("unused"),
        Arc::new(silence()),
    );
    let (audio, ticket) = h.speak_until_ready().await;
    h.orchestrator
        .spawn_audio_turn(h.conv.clone(), audio, ticket)
        .await
        .unwrap();

    let events = h.drain();
    assert_eq!(
        events.last(),
        Some(&ServerEvent::TranscriptionComplete {
            text: String::new()
        })
    );
    assert_eq!(h.conv.state(), TurnState::Listening);
    assert_eq!(h.conv.turn_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn watchdog_recovers_from_hung_generator() {
    let mut config = TurnConfig::default();
    config.timeouts.llm_ms = 60_000;
    let mut h = Harness::new(
        config.clone(),
        ScriptedTranscriber::new(vec![]),
        ScriptedGenerator::hanging(),
        Arc::new(silence()),
    );
    let watchdog = ReliabilityWatchdog::new(&config.watchdog).spawn(h.conv.clone());

    let turn = h
        .orchestrator
        .start_text_turn(h.conv.clone(), "are you there?")
        .unwrap();
    let started = tokio::time::Instant::now();

    let joined = turn.await;
    assert!(joined.unwrap_err().is_cancelled());
    let elapsed = started.elapsed();
    assert!(elapsed > Duration::from_secs(7));
    assert!(elapsed <= Duration::from_millis(7_500));

    match h.drain().last() {
        Some(ServerEvent::Error { reason, .. }) => assert_eq!(reason, "watchdog_timeout"),
        other => panic!("expected watchdog_timeout, got {:?}", other),
    }
    assert_eq!(h.conv.state(), TurnState::Listening);
    // the transcript was accepted, so the turn still counts
    assert_eq!(h.conv.turn_count(), 1);
    let turn = h.conv.last_turn().unwrap();
    assert!(!turn.success);
    assert_eq!(turn.error_reason.as_deref(), Some("watchdog_timeout"));

    watchdog.stop().await;
}

#[tokio::test(start_paused = true)]
async fn one_turn_at_a_time() {
    let mut config = TurnConfig::default();
    config.timeouts.llm_ms = 60_000;
    let mut h = Harness::new(
        config,
        ScriptedTranscriber::new(vec![]),
        ScriptedGenerator::hanging(),
        Arc::new(silence()),
    );

    let first = h
        .orchestrator
        .start_text_turn(h.conv.clone(), "first")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = h.orchestrator.start_text_turn(h.conv.clone(), "second");
    assert!(matches!(second, Err(TurnError::Busy(_))));
    let greeting = h.orchestrator.start_greeting(h.conv.clone(), "Welcome!");
    assert!(matches!(greeting, Err(TurnError::Busy(_))));

    let chunk = samples_to_pcm16(&[2500; 1600]);
    assert!(matches!(
        h.conv.ingest(&chunk),
        IngestAction::Ignored(TurnState::Processing | TurnState::Responding)
    ));
    assert_eq!(h.conv.machine().buffered_bytes(), 0);

    assert!(matches!(
        h.orchestrator.start_text_turn(h.conv.clone(), "  "),
        Err(TurnError::EmptyInput)
    ));

    h.conv.shutdown();
    assert!(first.await.unwrap_err().is_cancelled());
    assert_eq!(h.conv.turn_count(), 1);
    let _ = h.drain();
}

#[tokio::test(start_paused = true)]
async fn greeting_is_spoken_without_a_turn() {
    let mut h = Harness::new(
        TurnConfig::default(),
        ScriptedTranscriber::new(vec![]),
        ScriptedGenerator::replying("unused"),
        Arc::new(silence()),
    );

    h.orchestrator
        .start_greeting(h.conv.clone(), "Hi there! What would you like to talk about?")
        .unwrap()
        .await
        .unwrap();

    let events = h.drain();
    assert_eq!(
        kinds(&events),
        vec!["response_start", "audio_chunk", "response_complete"]
    );
    assert_eq!(h.conv.turn_count(), 0);
    assert!(h.conv.history_snapshot().is_empty());
    assert_eq!(h.conv.state(), TurnState::Listening);
}

#[tokio::test(start_paused = true)]
async fn blank_reply_aborts_with_empty_chunks() {
    let mut h = Harness::new(
        TurnConfig::default(),
        ScriptedTranscriber::new(vec![]),
        ScriptedGenerator::replying("  "),
        Arc::new(silence()),
    );

    h.orchestrator
        .start_text_turn(h.conv.clone(), "say nothing")
        .unwrap()
        .await
        .unwrap();

    match h.drain().last() {
        Some(ServerEvent::Error { reason, .. }) => assert_eq!(reason, "empty_chunks"),
        other => panic!("expected empty_chunks, got {:?}", other),
    }
    let turn = h.conv.last_turn().unwrap();
    assert!(!turn.success);
    assert_eq!(turn.error_reason.as_deref(), Some("empty_chunks"));
}

#[tokio::test(start_paused = true)]
async fn hung_generator_hits_llm_deadline() {
    let mut h = Harness::new(
        TurnConfig::default(),
        ScriptedTranscriber::new(vec![]),
        ScriptedGenerator::hanging(),
        Arc::new(silence()),
    );

    let started = tokio::time::Instant::now();
    h.orchestrator
        .start_text_turn(h.conv.clone(), "are you there?")
        .unwrap()
        .await
        .unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(4));
    assert!(elapsed < Duration::from_secs(7));

    let events = h.drain();
    assert!(!kinds(&events).contains(&"response_start"));
    match events.last() {
        Some(ServerEvent::Error { reason, .. }) => assert_eq!(reason, "llm_timeout"),
        other => panic!("expected llm_timeout, got {:?}", other),
    }
    assert_eq!(h.conv.state(), TurnState::Listening);
    let turn = h.conv.last_turn().unwrap();
    assert!(!turn.success);
    assert_eq!(turn.error_reason.as_deref(), Some("llm_timeout"));
}

#[tokio::test(start_paused = true)]
async fn failing_generator_reports_llm_error() {
    let mut h = Harness::new(
        TurnConfig::default(),
        ScriptedTranscriber::new(vec![]),
        ScriptedGenerator::new(LlmScript::Fail),
        Arc::new(silence()),
    );

    h.orchestrator
        .start_text_turn(h.conv.clone(), "hello")
        .unwrap()
        .await
        .unwrap();

    match h.drain().last() {
        Some(ServerEvent::Error { reason, message }) => {
            assert_eq!(reason, "llm_error");
            assert!(message.contains("connection refused"));
        }
        other => panic!("expected llm_error, got {:?}", other),
    }
    assert_eq!(h.conv.state(), TurnState::Listening);
    assert_eq!(
        h.conv.last_turn().unwrap().error_reason.as_deref(),
        Some("llm_error")
    );

    // the session takes the next turn normally
    assert!(h.orchestrator.start_text_turn(h.conv.clone(), "again").is_ok());
}

#[tokio::test(start_paused = true)]
async fn stalled_chunk_is_skipped_after_tts_deadline() {
    let config = TurnConfig {
        max_chunk_chars: 20,
        ..TurnConfig::default()
    };
    let mut h = Harness::new(
        config,
        ScriptedTranscriber::new(vec![]),
        ScriptedGenerator::replying("First part here. Second part here. Third part here."),
        Arc::new(StallingSynthesizer {
            inner: silence(),
            hang_on: "Second",
        }),
    );

    let started = tokio::time::Instant::now();
    h.orchestrator
        .start_text_turn(h.conv.clone(), "tell me three things")
        .unwrap()
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));

    let events = h.drain();
    assert_eq!(chunk_ids(&events), vec![1, 3]);
    assert!(!kinds(&events).contains(&"error"));
    assert_eq!(
        events.last(),
        Some(&ServerEvent::ResponseComplete { chunks_sent: 2 })
    );
    assert_eq!(h.conv.state(), TurnState::Listening);
    assert!(h.conv.last_turn().unwrap().success);
}

#[tokio::test(start_paused = true)]
async fn long_reply_is_cut_off_at_max_state_duration() {
    let config = TurnConfig {
        max_chunk_chars: 10,
        ..TurnConfig::default()
    };
    let mut h = Harness::new(
        config.clone(),
        ScriptedTranscriber::new(vec![]),
        ScriptedGenerator::replying(
            "One one. Two two. Three 3. Four 4. Five 5. Six 6. Seven 7. Eight 8.",
        ),
        Arc::new(SlowSynthesizer {
            inner: silence(),
            delay: Duration::from_millis(2_900),
        }),
    );
    let watchdog = ReliabilityWatchdog::new(&config.watchdog).spawn(h.conv.clone());

    let started = tokio::time::Instant::now();
    let turn = h
        .orchestrator
        .start_text_turn(h.conv.clone(), "count to eight")
        .unwrap();
    assert!(turn.await.unwrap_err().is_cancelled());
    let elapsed = started.elapsed();
    // cut off on the first tick past 7s even though chunks kept arriving
    assert!(elapsed > Duration::from_secs(7));
    assert!(elapsed <= Duration::from_millis(7_500));

    let events = h.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::ResponseStart {
            total_chunks: 8,
            ..
        }
    )));
    assert_eq!(chunk_ids(&events), vec![1, 2]);
    assert!(!kinds(&events).contains(&"response_complete"));
    match events.last() {
        Some(ServerEvent::Error { reason, .. }) => assert_eq!(reason, "watchdog_timeout"),
        other => panic!("expected watchdog_timeout, got {:?}", other),
    }
    assert_eq!(h.conv.state(), TurnState::Listening);

    watchdog.stop().await;
}

#[tokio::test(start_paused = true)]
async fn lone_spike_after_a_turn_is_not_speech() {
    let mut h = Harness::new(
        TurnConfig::default(),
        ScriptedTranscriber::new(vec![SttScript::Say("hi")]),
        ScriptedGenerator::replying("Hello."),
        Arc::new(silence()),
    );

    let (audio, ticket) = h.speak_until_ready().await;
    h.orchestrator
        .spawn_audio_turn(h.conv.clone(), audio, ticket)
        .await
        .unwrap();
    assert_eq!(h.conv.state(), TurnState::Listening);
    let _ = h.drain();

    tokio::time::advance(Duration::from_secs(10)).await;
    let cough = samples_to_pcm16(&[2500; 1600]);
    assert_eq!(h.conv.ingest(&cough), IngestAction::Buffering);
    assert!(h.drain().is_empty());
}
