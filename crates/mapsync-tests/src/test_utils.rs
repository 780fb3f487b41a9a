//! Unified test utilities for mapsync end-to-end tests
//!
//! A [`SyncFixture`] owns a temporary directory with two halves: a repository
//! mirror laid out as `<branch>/UFO2MAP`, `<branch>/MAPS` and
//! `<branch>/<name>.bsp.gz`, and a game tree holding map sources, compiled
//! maps and the local tool description.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use mapsync_config::Config;
use mapsync_engine::Prompt;
use mapsync_network::{Payload, Transport};
use mapsync_sync::digest_bytes;
use mapsync_types::{ContentMode, Error, HashAlgorithm, Result, RetryConfig};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Branch every fixture publishes
pub const BRANCH: &str = "2.3";

/// Source digest of the fixture tool build
pub const TOOL_SOURCE: &str = "5f0e3c2a9b71";

/// Gzip-compress `data`
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

/// MD5 of raw bytes, as published for artifacts
pub fn md5_hex(data: &[u8]) -> String {
    digest_bytes(data, HashAlgorithm::Md5, ContentMode::Binary)
}

/// MD5 of text with normalized line endings, as published for sources
pub fn text_md5_hex(data: &[u8]) -> String {
    digest_bytes(data, HashAlgorithm::Md5, ContentMode::Text)
}

/// Catalog line for a source/artifact pair
pub fn catalog_line(name: &str, source: &[u8], artifact: &[u8]) -> String {
    format!("{} {} {}\n", name, text_md5_hex(source), md5_hex(artifact))
}

/// Tool description in the format the compiler prints
pub fn tool_description(version: &str, source_hash: &str) -> String {
    format!(
        "ufo2map version {}\nsource hash: {}\n",
        version, source_hash
    )
}

fn write_file(path: &Path, data: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture directory");
    }
    std::fs::write(path, data).expect("write fixture file");
}

/// Repository mirror plus game tree in one temporary directory
pub struct SyncFixture {
    _dir: TempDir,
    mirror: PathBuf,
    root: PathBuf,
}

impl SyncFixture {
    /// Fixture whose local and remote tools are the same build
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let mirror = dir.path().join("mirror");
        let root = dir.path().join("game");
        std::fs::create_dir_all(&root).expect("create game root");

        let fixture = Self {
            _dir: dir,
            mirror,
            root,
        };
        fixture.remote_tool(BRANCH, TOOL_SOURCE);
        fixture.local_tool(BRANCH, TOOL_SOURCE);
        fixture.catalog("");
        fixture
    }

    /// Mirror directory, usable as a repository base
    pub fn mirror(&self) -> &Path {
        &self.mirror
    }

    /// Game tree root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Publish the reference tool description
    pub fn remote_tool(&self, version: &str, source_hash: &str) {
        write_file(
            &self.mirror.join(BRANCH).join("UFO2MAP"),
            tool_description(version, source_hash).as_bytes(),
        );
    }

    /// Install the local tool description
    pub fn local_tool(&self, version: &str, source_hash: &str) {
        write_file(
            &self.root.join("ufo2map.txt"),
            tool_description(version, source_hash).as_bytes(),
        );
    }

    /// Publish the catalog text
    pub fn catalog(&self, text: &str) {
        write_file(&self.mirror.join(BRANCH).join("MAPS"), text.as_bytes());
    }

    /// Publish a gzip payload for `name`
    pub fn payload(&self, name: &str, artifact: &[u8]) {
        self.raw_payload(name, &gzip(artifact));
    }

    /// Publish payload bytes for `name` as they are
    pub fn raw_payload(&self, name: &str, bytes: &[u8]) {
        write_file(
            &self.mirror.join(BRANCH).join(format!("{}.bsp.gz", name)),
            bytes,
        );
    }

    /// Write a local map source
    pub fn source(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.root.join(format!("{}.map", name));
        write_file(&path, data);
        path
    }

    /// Write a local compiled map
    pub fn artifact(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.artifact_path(name);
        write_file(&path, data);
        path
    }

    /// Where the compiled map for `name` lives
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.bsp", name))
    }

    /// Configuration pointing at the mirror and the game tree
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.repository.base_url = self.mirror.display().to_string();
        config.sync.root = self.root.clone();
        config.tool.metadata_file = Some(self.root.join("ufo2map.txt"));
        config.network.retry = RetryConfig::disabled();
        config
    }

    /// Temporary install files left anywhere in the game tree
    pub fn leftover_temp_files(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir).expect("read game tree") {
                let path = entry.expect("read entry").path();
                if path.is_dir() {
                    pending.push(path);
                } else if path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(".mapsync-"))
                {
                    found.push(path);
                }
            }
        }
        found
    }
}

impl Default for SyncFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport wrapper that records every opened location
pub struct RecordingTransport {
    inner: Arc<dyn Transport>,
    requests: Mutex<Vec<String>>,
}

impl RecordingTransport {
    /// Wrap `inner`
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self {
            inner,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Locations opened so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Number of opened locations ending with `suffix`
    pub fn count_ending_with(&self, suffix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|url| url.ends_with(suffix))
            .count()
    }

    /// Forget recorded locations
    pub fn clear(&self) {
        self.requests.lock().expect("requests lock").clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn open(&self, url: &str) -> Result<Payload> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(url.to_string());
        self.inner.open(url).await
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Transport that never answers for locations ending with a suffix
pub struct StallingTransport {
    inner: Arc<dyn Transport>,
    suffix: String,
    stalled: Arc<Notify>,
}

impl StallingTransport {
    /// Stall on every location ending with `suffix`
    pub fn new(inner: Arc<dyn Transport>, suffix: impl Into<String>) -> Self {
        Self {
            inner,
            suffix: suffix.into(),
            stalled: Arc::new(Notify::new()),
        }
    }

    /// Notified once a request has stalled
    pub fn stalled(&self) -> Arc<Notify> {
        Arc::clone(&self.stalled)
    }
}

#[async_trait]
impl Transport for StallingTransport {
    async fn open(&self, url: &str) -> Result<Payload> {
        if url.ends_with(&self.suffix) {
            self.stalled.notify_one();
            futures::future::pending::<()>().await;
        }
        self.inner.open(url).await
    }

    fn name(&self) -> &'static str {
        "stalling"
    }
}

/// Prompt answering from a script and recording the questions
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<bool>>,
    questions: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    /// Prompt giving `answers` in order
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            questions: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far
    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().expect("questions lock").clone()
    }
}

impl Prompt for ScriptedPrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        self.questions
            .lock()
            .expect("questions lock")
            .push(question.to_string());
        self.answers
            .lock()
            .expect("answers lock")
            .pop_front()
            .ok_or_else(|| Error::io("no scripted answer left"))
    }
}

/// A request seen by [`HttpFixture`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request path
    pub path: String,
    /// `User-Agent` header, if sent
    pub user_agent: Option<String>,
}

#[derive(Default)]
struct ServerState {
    root: PathBuf,
    requests: Mutex<Vec<HttpRequest>>,
    forced: Mutex<HashMap<String, VecDeque<u16>>>,
}

/// Minimal HTTP/1.1 server exposing a directory
pub struct HttpFixture {
    addr: SocketAddr,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl HttpFixture {
    /// Serve files below `root` on a loopback port
    pub async fn serve(root: impl Into<PathBuf>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("server address");
        let state = Arc::new(ServerState {
            root: root.into(),
            ..ServerState::default()
        });

        let server_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let state = Arc::clone(&server_state);
                tokio::spawn(async move {
                    let _ = handle_connection(socket, &state).await;
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Base URL of the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer the next requests for `path` with `statuses` before serving the file
    pub fn fail_next(&self, path: &str, statuses: &[u16]) {
        self.state
            .forced
            .lock()
            .expect("forced lock")
            .entry(path.to_string())
            .or_default()
            .extend(statuses.iter().copied());
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.requests.lock().expect("requests lock").clone()
    }
}

impl Drop for HttpFixture {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(mut socket: TcpStream, state: &ServerState) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let read = socket.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        head.extend_from_slice(&chunk[..read]);
    }

    let text = String::from_utf8_lossy(&head);
    let mut lines = text.lines();
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let user_agent = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("user-agent")
            .then(|| value.trim().to_string())
    });
    state
        .requests
        .lock()
        .expect("requests lock")
        .push(HttpRequest {
            path: path.clone(),
            user_agent,
        });

    let forced = state
        .forced
        .lock()
        .expect("forced lock")
        .get_mut(&path)
        .and_then(VecDeque::pop_front);
    let (status, body) = match forced {
        Some(status) => (status, Vec::new()),
        None => match tokio::fs::read(state.root.join(path.trim_start_matches('/'))).await {
            Ok(body) => (200, body),
            Err(_) => (404, Vec::new()),
        },
    };
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Error",
    };

    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        body.len()
    );
    socket.write_all(header.as_bytes()).await?;
    socket.write_all(&body).await?;
    socket.shutdown().await
}
