//! Shared test utilities for the gsverify library crate.
//!
//! Fakes for the two external seams (the CLI executor and the remote store) and a
//! throwaway HTTP server for the probe and the safety validator.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::command::CommandExecutor;
use crate::config::Config;
use crate::storage::RemoteStoreTrait;
use crate::types::{ExecutionResult, ObjectPath};

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// A default [`Config`] with short waits, suitable for unit tests.
pub(crate) fn make_test_config() -> Config {
    Config {
        expiry_wait_milliseconds: 10,
        http_timeout_milliseconds: 5_000,
        ..Config::default()
    }
}

#[derive(Default)]
struct ScriptState {
    rules: Vec<(String, ExecutionResult)>,
    default: Option<ExecutionResult>,
    commands: Vec<String>,
}

/// Executor that answers from a script and records every command line.
///
/// The first rule whose pattern is a substring of the command line wins. Without a
/// matching rule the default result (empty success unless set) is returned.
#[derive(Clone, Default)]
pub(crate) struct ScriptedExecutor {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, pattern: &str, result: ExecutionResult) {
        self.state
            .lock()
            .unwrap()
            .rules
            .push((pattern.to_string(), result));
    }

    pub(crate) fn set_default(&self, result: ExecutionResult) {
        self.state.lock().unwrap().default = Some(result);
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command_line: &str) -> ExecutionResult {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command_line.to_string());

        state
            .rules
            .iter()
            .find(|(pattern, _)| command_line.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .or_else(|| state.default.clone())
            .unwrap_or_else(|| ExecutionResult::succeeded(""))
    }
}

#[derive(Default)]
struct StoreState {
    objects: HashSet<String>,
    // Paths whose existence probe answers "present" even when the object is gone.
    stale: HashSet<String>,
    denied: Vec<(String, String)>,
    actions: Vec<String>,
}

/// In-memory remote store keyed by URI.
///
/// Acting on a missing object fails with "404 ... not found", as the real CLI does.
/// Each operation yields first so that concurrent callers interleave.
#[derive(Clone, Default)]
pub(crate) struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_objects<I, S>(objects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        store
            .state
            .lock()
            .unwrap()
            .objects
            .extend(objects.into_iter().map(Into::into));
        store
    }

    pub(crate) fn objects(&self) -> HashSet<String> {
        self.state.lock().unwrap().objects.clone()
    }

    pub(crate) fn contains(&self, uri: &str) -> bool {
        self.state.lock().unwrap().objects.contains(uri)
    }

    pub(crate) fn remove(&self, uri: &str) {
        self.state.lock().unwrap().objects.remove(uri);
    }

    /// Make the existence probe for `uri` report "present" regardless of contents.
    pub(crate) fn mark_stale(&self, uri: &str) {
        self.state.lock().unwrap().stale.insert(uri.to_string());
    }

    /// Fail mutating operations on paths containing `pattern` with `message`.
    pub(crate) fn deny(&self, pattern: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .denied
            .push((pattern.to_string(), message.to_string()));
    }

    /// Mutating operations applied so far, as `"<op> <path>"` strings.
    pub(crate) fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    fn check_denied(state: &StoreState, uri: &str) -> Result<()> {
        match state.denied.iter().find(|(pattern, _)| uri.contains(pattern.as_str())) {
            Some((_, message)) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}

fn not_found(uri: &str) -> anyhow::Error {
    anyhow!("ERROR: 404 {uri} not found: No such object")
}

#[async_trait]
impl RemoteStoreTrait for InMemoryStore {
    async fn exists(&self, path: &ObjectPath) -> Result<bool> {
        tokio::task::yield_now().await;
        let uri = path.to_string();
        let state = self.state.lock().unwrap();
        Ok(state.objects.contains(&uri) || state.stale.contains(&uri))
    }

    async fn upload(&self, _local: &Path, remote: &ObjectPath) -> Result<()> {
        tokio::task::yield_now().await;
        let uri = remote.to_string();
        let mut state = self.state.lock().unwrap();
        Self::check_denied(&state, &uri)?;
        state.actions.push(format!("upload {uri}"));
        state.objects.insert(uri);
        Ok(())
    }

    async fn move_object(&self, from: &ObjectPath, to: &ObjectPath) -> Result<()> {
        tokio::task::yield_now().await;
        let (from, to) = (from.to_string(), to.to_string());
        let mut state = self.state.lock().unwrap();
        Self::check_denied(&state, &from)?;
        if !state.objects.remove(&from) {
            return Err(not_found(&from));
        }
        state.actions.push(format!("move {from} {to}"));
        state.objects.insert(to);
        Ok(())
    }

    async fn delete(&self, path: &ObjectPath) -> Result<()> {
        tokio::task::yield_now().await;
        let uri = path.to_string();
        let mut state = self.state.lock().unwrap();
        Self::check_denied(&state, &uri)?;
        if !state.objects.remove(&uri) {
            return Err(not_found(&uri));
        }
        state.actions.push(format!("delete {uri}"));
        Ok(())
    }
}

/// A local HTTP server answering every request with one fixed response.
pub(crate) struct TestHttpServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl TestHttpServer {
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Raw requests received so far (request line, headers and body).
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(crate) async fn spawn_http_server(status: u16, body: &str) -> TestHttpServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let body = body.to_string();

    let captured = requests.clone();
    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let captured = captured.clone();
            let body = body.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                captured.lock().unwrap().push(request);

                let response = format!(
                    "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    TestHttpServer {
        base_url,
        requests,
        handle,
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let Ok(read) = socket.read(&mut chunk).await else {
            break;
        };
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&buffer);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buffer).to_string()
}
