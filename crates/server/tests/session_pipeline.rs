//! End-to-end session tests against scripted engines
//!
//! The transcription engine is replaced by in-memory queues the test drives
//! directly; the reply and speech engines return canned output.

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use duplex_voice_config::Settings;
use duplex_voice_core::{
    decode_wav, AudioChunkStream, AudioFrame, Error, ReplyGenerator, Result, SpeechSynthesizer,
    SpeechTranscriber, TextDeltaStream, TranscriptEvent, TranscriptionChannel,
    TranscriptionConfig,
};
use duplex_voice_pipeline::TurnOrchestrator;
use duplex_voice_server::{ClientMessage, ServerMessage, SessionManager, SessionOutcome};

const WAIT: Duration = Duration::from_secs(5);

/// Test-side ends of one transcription connection
struct Upstream {
    audio_rx: mpsc::Receiver<AudioFrame>,
    events_tx: mpsc::Sender<Result<TranscriptEvent>>,
}

impl Upstream {
    async fn complete(&self, text: &str) {
        self.events_tx
            .send(Ok(TranscriptEvent::Completed(text.to_string())))
            .await
            .unwrap();
    }
}

#[derive(Default)]
struct ScriptedTranscriber {
    pending: Mutex<Vec<Upstream>>,
    connects: AtomicUsize,
}

impl ScriptedTranscriber {
    async fn take_upstream(&self) -> Upstream {
        tokio::time::timeout(WAIT, async {
            loop {
                if let Some(upstream) = self.pending.lock().pop() {
                    return upstream;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("no transcription connection opened")
    }
}

#[async_trait]
impl SpeechTranscriber for ScriptedTranscriber {
    async fn stream_transcribe(&self, config: &TranscriptionConfig) -> Result<TranscriptionChannel> {
        let (audio_tx, audio_rx) = mpsc::channel(config.queue_capacity);
        let (events_tx, events_rx) = mpsc::channel(config.queue_capacity);
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().push(Upstream { audio_rx, events_tx });
        Ok(TranscriptionChannel::new(audio_tx, events_rx, config.push_timeout()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Replies "hi", except: "fail" errors and "hang" is echoed back
#[derive(Default)]
struct ScriptedLlm {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ReplyGenerator for ScriptedLlm {
    async fn generate_reply(&self, prompt: &str) -> Result<TextDeltaStream> {
        self.prompts.lock().push(prompt.to_string());
        match prompt {
            "fail" => Err(Error::Llm("scripted failure".to_string())),
            "hang" => Ok(Box::pin(futures::stream::iter(vec![Ok("hang".to_string())]))),
            _ => Ok(Box::pin(futures::stream::iter(vec![
                Ok("h".to_string()),
                Ok("i".to_string()),
            ]))),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Speaks "hi" as two chunks; "hang" sends one chunk and never finishes
struct ScriptedTts;

#[async_trait]
impl SpeechSynthesizer for ScriptedTts {
    async fn synthesize_speech(&self, text: &str) -> Result<AudioChunkStream> {
        if text == "hang" {
            let first = futures::stream::iter(vec![Ok(Bytes::from_static(b"AA"))]);
            return Ok(Box::pin(first.chain(futures::stream::pending())));
        }
        Ok(Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"AA")),
            Ok(Bytes::from_static(b"BB")),
        ])))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct Harness {
    root: tempfile::TempDir,
    manager: Arc<SessionManager>,
    transcriber: Arc<ScriptedTranscriber>,
    llm: Arc<ScriptedLlm>,
}

impl Harness {
    fn new(max_sessions: usize) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.storage.base_dir = root.path().to_path_buf();
        settings.server.max_sessions = max_sessions;

        let transcriber = Arc::new(ScriptedTranscriber::default());
        let llm = Arc::new(ScriptedLlm::default());
        let orchestrator = TurnOrchestrator::new(llm.clone(), Arc::new(ScriptedTts));
        let manager = Arc::new(SessionManager::new(&settings, transcriber.clone(), orchestrator));

        Self {
            root,
            manager,
            transcriber,
            llm,
        }
    }

    fn connect(&self) -> Client {
        let (client_tx, incoming) = unbounded::<std::result::Result<ClientMessage, String>>();
        let (outgoing, server_rx) = unbounded::<ServerMessage>();
        let manager = self.manager.clone();
        let task = tokio::spawn(async move { manager.serve(incoming, outgoing).await });
        Client {
            tx: client_tx,
            rx: server_rx,
            task,
        }
    }

    fn session_dir(&self) -> PathBuf {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(self.root.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.is_dir())
            .collect();
        assert_eq!(dirs.len(), 1, "expected exactly one session directory");
        dirs.remove(0)
    }
}

struct Client {
    tx: UnboundedSender<std::result::Result<ClientMessage, String>>,
    rx: UnboundedReceiver<ServerMessage>,
    task: JoinHandle<SessionOutcome>,
}

impl Client {
    fn audio(&self, data: &'static [u8]) {
        self.tx
            .unbounded_send(Ok(ClientMessage::Audio(Bytes::from_static(data))))
            .unwrap();
    }

    fn end_turn(&self) {
        self.tx
            .unbounded_send(Ok(ClientMessage::Text(r#"{"event":"end"}"#.to_string())))
            .unwrap();
    }

    async fn recv(&mut self) -> ServerMessage {
        tokio::time::timeout(WAIT, self.rx.next())
            .await
            .expect("timed out waiting for server message")
            .expect("server side closed")
    }

    async fn finish(self) -> SessionOutcome {
        self.tx.close_channel();
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("session did not end")
            .unwrap()
    }
}

async fn wait_for_file(path: &Path, expected: &[u8]) {
    let result = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(contents) = std::fs::read(path) {
                if contents == expected {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "{} never reached expected contents", path.display());
}

async fn recv_audio(client: &mut Client) -> Bytes {
    match client.recv().await {
        ServerMessage::Audio(data) => data,
        other => panic!("expected audio, got {:?}", other),
    }
}

#[tokio::test]
async fn test_input_turns_numbered_in_order() {
    let harness = Harness::new(4);
    let client = harness.connect();
    let _upstream = harness.transcriber.take_upstream().await;

    client.audio(b"\x01\x00");
    client.end_turn();
    client.audio(b"\x02\x00");
    client.audio(b"\x03\x00");
    client.end_turn();
    client.end_turn();

    let outcome = client.finish().await;
    assert!(matches!(outcome, SessionOutcome::ClientClosed));

    let dir = harness.session_dir();
    let mut names: Vec<String> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["0_in.wav", "1_in.wav", "2_in.wav"]);

    let turn = |seq: u64| decode_wav(&std::fs::read(dir.join(format!("{}_in.wav", seq))).unwrap()).unwrap();
    assert_eq!(turn(0), vec![1, 0]);
    assert_eq!(turn(1), vec![2, 0, 3, 0]);
    assert!(turn(2).is_empty());
    assert_eq!(harness.manager.count(), 0);
}

#[tokio::test]
async fn test_audio_forwarded_to_transcription() {
    let harness = Harness::new(4);
    let client = harness.connect();
    let mut upstream = harness.transcriber.take_upstream().await;

    client.audio(b"\x01\x00");
    client.audio(b"");
    client.audio(b"\x02\x00");

    let first = upstream.audio_rx.recv().await.unwrap();
    let second = upstream.audio_rx.recv().await.unwrap();
    assert_eq!(first.data.as_ref(), b"\x01\x00");
    assert_eq!(second.data.as_ref(), b"\x02\x00");
    assert!(first.sequence < second.sequence);

    client.finish().await;
}

#[tokio::test]
async fn test_reply_streamed_and_persisted() {
    let harness = Harness::new(4);
    let mut client = harness.connect();
    let upstream = harness.transcriber.take_upstream().await;

    upstream.complete("hello").await;

    assert_eq!(recv_audio(&mut client).await.as_ref(), b"AA");
    assert_eq!(recv_audio(&mut client).await.as_ref(), b"BB");
    assert_eq!(*harness.llm.prompts.lock(), vec!["hello".to_string()]);

    let dir = harness.session_dir();
    wait_for_file(&dir.join("0_out.pcm"), b"AABB").await;

    client.finish().await;
}

#[tokio::test]
async fn test_blank_transcript_is_skipped() {
    let harness = Harness::new(4);
    let mut client = harness.connect();
    let upstream = harness.transcriber.take_upstream().await;

    upstream.complete("   ").await;
    upstream
        .events_tx
        .send(Ok(TranscriptEvent::Delta("hel".to_string())))
        .await
        .unwrap();
    upstream.complete("hello").await;

    assert_eq!(recv_audio(&mut client).await.as_ref(), b"AA");
    assert_eq!(*harness.llm.prompts.lock(), vec!["hello".to_string()]);

    client.finish().await;
}

#[tokio::test]
async fn test_failed_turn_keeps_session_alive() {
    let harness = Harness::new(4);
    let mut client = harness.connect();
    let upstream = harness.transcriber.take_upstream().await;

    upstream.complete("fail").await;
    upstream.complete("hello").await;

    assert_eq!(recv_audio(&mut client).await.as_ref(), b"AA");
    assert_eq!(recv_audio(&mut client).await.as_ref(), b"BB");

    let dir = harness.session_dir();
    wait_for_file(&dir.join("1_out.pcm"), b"AABB").await;
    assert!(!dir.join("0_out.pcm").exists());

    let outcome = client.finish().await;
    assert!(matches!(outcome, SessionOutcome::ClientClosed));
}

#[tokio::test]
async fn test_transcription_error_event_is_not_fatal() {
    let harness = Harness::new(4);
    let mut client = harness.connect();
    let upstream = harness.transcriber.take_upstream().await;

    upstream
        .events_tx
        .send(Err(Error::Transcription("bad audio".to_string())))
        .await
        .unwrap();
    upstream.complete("hello").await;

    assert_eq!(recv_audio(&mut client).await.as_ref(), b"AA");
    client.finish().await;
}

#[tokio::test]
async fn test_disconnect_mid_synthesis_releases_upstream() {
    let harness = Harness::new(4);
    let mut client = harness.connect();
    let upstream = harness.transcriber.take_upstream().await;

    upstream.complete("hang").await;
    assert_eq!(recv_audio(&mut client).await.as_ref(), b"AA");

    let outcome = client.finish().await;
    assert!(matches!(outcome, SessionOutcome::ClientClosed));
    assert!(upstream.events_tx.is_closed());
    assert_eq!(harness.manager.count(), 0);
}

#[tokio::test]
async fn test_interleaved_turns_use_separate_files() {
    let harness = Harness::new(4);
    let mut client = harness.connect();
    let upstream = harness.transcriber.take_upstream().await;

    client.audio(b"\x01\x00");
    client.end_turn();
    upstream.complete("hello").await;
    client.audio(b"\x02\x00");
    client.end_turn();

    assert_eq!(recv_audio(&mut client).await.as_ref(), b"AA");
    assert_eq!(recv_audio(&mut client).await.as_ref(), b"BB");

    upstream.complete("again").await;
    assert_eq!(recv_audio(&mut client).await.as_ref(), b"AA");
    assert_eq!(recv_audio(&mut client).await.as_ref(), b"BB");

    let dir = harness.session_dir();
    wait_for_file(&dir.join("0_out.pcm"), b"AABB").await;
    wait_for_file(&dir.join("1_out.pcm"), b"AABB").await;

    client.finish().await;

    let input = |seq: u64| decode_wav(&std::fs::read(dir.join(format!("{}_in.wav", seq))).unwrap()).unwrap();
    assert_eq!(input(0), vec![1, 0]);
    assert_eq!(input(1), vec![2, 0]);
}

#[tokio::test]
async fn test_upstream_end_closes_client_with_1011() {
    let harness = Harness::new(4);
    let mut client = harness.connect();
    let upstream = harness.transcriber.take_upstream().await;

    drop(upstream);

    match client.recv().await {
        ServerMessage::Close { code, reason } => {
            assert_eq!(code, 1011);
            assert!(reason.contains("transcription stream ended"), "reason: {}", reason);
        }
        other => panic!("expected close, got {:?}", other),
    }

    let outcome = client.finish().await;
    assert!(matches!(outcome, SessionOutcome::Failed(Error::UpstreamDisconnected(_))));
}

#[tokio::test]
async fn test_capacity_limit_rejects_new_session() {
    let harness = Harness::new(1);
    let first = harness.connect();
    let _upstream = harness.transcriber.take_upstream().await;
    assert_eq!(harness.manager.count(), 1);

    let mut second = harness.connect();
    match second.recv().await {
        ServerMessage::Close { code, .. } => assert_eq!(code, 1011),
        other => panic!("expected close, got {:?}", other),
    }
    let outcome = second.finish().await;
    assert!(matches!(outcome, SessionOutcome::Failed(Error::Capacity(_))));
    assert_eq!(harness.transcriber.connects.load(Ordering::SeqCst), 1);

    first.finish().await;
    assert_eq!(harness.manager.count(), 0);
}

#[tokio::test]
async fn test_odd_length_frame_still_yields_one_file_per_end() {
    let harness = Harness::new(4);
    let client = harness.connect();
    let _upstream = harness.transcriber.take_upstream().await;

    client.audio(b"\x01\x00\x02");
    client.end_turn();
    client.audio(b"\x03\x00");
    client.audio(b"\x05");
    client.end_turn();

    let outcome = client.finish().await;
    assert!(matches!(outcome, SessionOutcome::ClientClosed));

    let dir = harness.session_dir();
    let count = std::fs::read_dir(&dir)
        .unwrap()
        .filter(|entry| {
            entry
                .as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .ends_with("_in.wav")
        })
        .count();
    assert_eq!(count, 2);

    let input = |seq: u64| {
        decode_wav(&std::fs::read(dir.join(format!("{}_in.wav", seq))).unwrap()).unwrap()
    };
    assert!(input(0).is_empty());
    assert_eq!(input(1), vec![3, 0]);
}

#[tokio::test]
async fn test_client_send_failure_ends_session() {
    let harness = Harness::new(4);
    let Client { tx, rx, task } = harness.connect();
    let upstream = harness.transcriber.take_upstream().await;

    // Client stops reading while its inbound side stays open
    drop(rx);
    upstream.complete("hello").await;

    let outcome = tokio::time::timeout(WAIT, task)
        .await
        .expect("session did not end")
        .unwrap();
    assert!(matches!(outcome, SessionOutcome::Failed(Error::Client(_))));
    assert!(upstream.events_tx.is_closed());
    assert_eq!(harness.manager.count(), 0);
    drop(tx);
}
