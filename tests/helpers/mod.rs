//! Test helper utilities: scripted stages, persisters and an in-process server

#![allow(dead_code)]

use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;
use uuid::Uuid;

use sign_translate::app_state::AppState;
use sign_translate::config::AppConfig;
use sign_translate::models::job::JobRecord;
use sign_translate::models::stage::{BackendKind, PoseSequence, StageKind, StageResult};
use sign_translate::models::video::VideoRef;
use sign_translate::routes;
use sign_translate::services::persister::{PersistError, ResultPersister};
use sign_translate::services::stages::{ModelRegistry, Stage};

use crate::fixtures::FAKE_VIDEO_BYTES;

/// What a scripted stage does when invoked.
#[derive(Clone)]
pub enum Behaviour<O> {
    Succeed(O),
    Fail(String),
    Panic,
}

/// Canned stage behaviour with call accounting.
#[derive(Clone)]
pub struct Script<O> {
    behaviour: Behaviour<O>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl<O: Clone> Script<O> {
    fn with_behaviour(behaviour: Behaviour<O>) -> Self {
        Self {
            behaviour,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn ok(output: O) -> Self {
        Self::with_behaviour(Behaviour::Succeed(output))
    }

    pub fn fail(reason: &str) -> Self {
        Self::with_behaviour(Behaviour::Fail(reason.to_string()))
    }

    pub fn panic() -> Self {
        Self::with_behaviour(Behaviour::Panic)
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn play(&self, fail_anyway: Option<String>) -> StageResult<O> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let timing_ms = self.delay.as_secs_f64() * 1000.0;
        if let Some(reason) = fail_anyway {
            return StageResult::failed(reason, timing_ms, BackendKind::Model);
        }
        match &self.behaviour {
            Behaviour::Succeed(output) => {
                StageResult::succeeded(output.clone(), 0.9, timing_ms, BackendKind::Model)
            }
            Behaviour::Fail(reason) => StageResult::failed(reason.clone(), timing_ms, BackendKind::Model),
            Behaviour::Panic => panic!("scripted stage panic"),
        }
    }
}

/// Detector double; fails any video whose path contains `reject_marker`.
#[derive(Clone)]
pub struct FakeDetector {
    pub script: Script<PoseSequence>,
    pub reject_marker: Option<&'static str>,
}

impl FakeDetector {
    pub fn new(script: Script<PoseSequence>) -> Self {
        Self {
            script,
            reject_marker: None,
        }
    }
}

impl Stage for FakeDetector {
    type Input = VideoRef;
    type Output = PoseSequence;

    const KIND: StageKind = StageKind::Detection;

    async fn run(&self, video: &VideoRef) -> StageResult<PoseSequence> {
        let rejected = self
            .reject_marker
            .filter(|marker| video.path.to_string_lossy().contains(*marker))
            .map(|_| "corrupt file".to_string());
        self.script.play(rejected).await
    }
}

#[derive(Clone)]
pub struct FakeGloss(pub Script<String>);

impl Stage for FakeGloss {
    type Input = PoseSequence;
    type Output = String;

    const KIND: StageKind = StageKind::Gloss;

    async fn run(&self, _pose: &PoseSequence) -> StageResult<String> {
        self.0.play(None).await
    }
}

#[derive(Clone)]
pub struct FakeTranslator(pub Script<String>);

impl Stage for FakeTranslator {
    type Input = str;
    type Output = String;

    const KIND: StageKind = StageKind::Translation;

    async fn run(&self, _gloss: &str) -> StageResult<String> {
        self.0.play(None).await
    }
}

/// Persister that keeps every saved record in memory.
#[derive(Default)]
pub struct RecordingPersister {
    pub saved: Mutex<Vec<JobRecord>>,
}

impl RecordingPersister {
    pub fn saved(&self) -> Vec<JobRecord> {
        self.saved.lock().unwrap().clone()
    }
}

impl ResultPersister for RecordingPersister {
    fn save<'a>(&'a self, job_id: Uuid, record: &'a JobRecord) -> BoxFuture<'a, Result<String, PersistError>> {
        Box::pin(async move {
            self.saved.lock().unwrap().push(record.clone());
            Ok(format!("memory://{job_id}"))
        })
    }
}

/// Persister whose storage is always down.
pub struct FailingPersister;

impl ResultPersister for FailingPersister {
    fn save<'a>(&'a self, _job_id: Uuid, _record: &'a JobRecord) -> BoxFuture<'a, Result<String, PersistError>> {
        Box::pin(async { Err(PersistError::Other("disk full".to_string())) })
    }
}

/// Write a small non-empty video file and return its reference.
pub fn write_video(dir: &Path, name: &str) -> VideoRef {
    let path = dir.join(name);
    std::fs::write(&path, FAKE_VIDEO_BYTES).unwrap();
    VideoRef::new(path, FAKE_VIDEO_BYTES.len() as u64)
}

/// Running server bound to an ephemeral port.
pub struct TestApp {
    pub base_url: String,
    pub state: AppState,
    pub client: reqwest::Client,
    _dir: tempfile::TempDir,
}

/// Config pointing every directory into a fresh temp dir, with seeded stand-in stages.
pub fn test_config(dir: &Path) -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        upload_dir: dir.join("videos"),
        results_dir: dir.join("results"),
        stand_in_seed: Some(7),
        stand_in_gloss: Some(crate::fixtures::CLIP_GLOSS.to_string()),
        ..AppConfig::default()
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(customize: impl FnOnce(&mut AppConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    customize(&mut config);

    let state = AppState::from_config(config, ModelRegistry::default()).unwrap();
    let app = routes::router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base_url: format!("http://{addr}"),
        state,
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadBody {
    pub job_id: Uuid,
    pub filename: String,
    pub file_size: u64,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub job_id: Uuid,
    pub status: String,
    pub progress: u8,
    pub current_step: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TestApp {
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> reqwest::Response {
        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(bytes)
                .file_name(filename.to_string())
                .mime_str("video/mp4")
                .unwrap(),
        );
        self.client
            .post(format!("{}/api/upload-video", self.base_url))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    pub async fn process(&self, job_id: Uuid) -> reqwest::Response {
        self.client
            .post(format!("{}/api/process-video/{job_id}", self.base_url))
            .send()
            .await
            .unwrap()
    }

    pub async fn status(&self, job_id: Uuid) -> StatusBody {
        self.client
            .get(format!("{}/api/status/{job_id}", self.base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    pub async fn result(&self, job_id: Uuid) -> reqwest::Response {
        self.client
            .get(format!("{}/api/result/{job_id}", self.base_url))
            .send()
            .await
            .unwrap()
    }

    /// Upload `payload_len` bytes as a chunked multipart body (no Content-Length)
    /// over a raw connection and return the response status code.
    pub async fn upload_chunked(&self, filename: &str, payload_len: usize) -> u16 {
        const BOUNDARY: &str = "sign-translate-boundary";
        const CHUNK: usize = 64 * 1024;

        let addr = self.base_url.trim_start_matches("http://").to_string();
        let stream = TcpStream::connect(&addr).await.unwrap();
        let (mut reader, mut writer) = stream.into_split();

        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: video/mp4\r\n\r\n"
        )
        .into_bytes();
        body.extend(std::iter::repeat(0u8).take(payload_len));
        body.extend(format!("\r\n--{BOUNDARY}--\r\n").into_bytes());

        let head = format!(
            "POST /api/upload-video HTTP/1.1\r\nHost: {addr}\r\nContent-Type: multipart/form-data; boundary={BOUNDARY}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
        );

        // The server may answer and hang up before the body is fully sent.
        let send = tokio::spawn(async move {
            writer.write_all(head.as_bytes()).await?;
            for chunk in body.chunks(CHUNK) {
                writer.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await?;
                writer.write_all(chunk).await?;
                writer.write_all(b"\r\n").await?;
            }
            writer.write_all(b"0\r\n\r\n").await?;
            writer.flush().await
        });

        let mut response = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let read = tokio::time::timeout(Duration::from_secs(10), reader.read(&mut buf))
                .await
                .expect("no response to chunked upload");
            match read {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    response.extend_from_slice(&buf[..n]);
                    if response.windows(2).any(|w| w == b"\r\n") {
                        break;
                    }
                }
            }
        }
        send.abort();

        let status_line = String::from_utf8_lossy(&response);
        status_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap_or_else(|| panic!("malformed response: {status_line:?}"))
    }

    /// Poll status until the job is terminal, collecting every progress value seen.
    pub async fn wait_for_terminal(&self, job_id: Uuid) -> (StatusBody, Vec<u8>) {
        let mut seen = Vec::new();
        for _ in 0..200 {
            let status = self.status(job_id).await;
            seen.push(status.progress);
            if status.status == "completed" || status.status == "error" {
                return (status, seen);
            }
            sleep(Duration::from_millis(25)).await;
        }
        panic!("job {job_id} did not finish in time");
    }
}
