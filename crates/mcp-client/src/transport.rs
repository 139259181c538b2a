//! Line-delimited JSON-RPC transport over a child process's stdin/stdout.
//!
//! A session moves `Unstarted -> Ready -> Closed`. The child is spawned and
//! the `initialize` handshake performed on first use; `Closed` is terminal.
//! Every operation takes `&mut self`, so at most one request is in flight.

use std::collections::BTreeMap;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use nhi_domain::config::{AwsConfig, McpConfig};

use crate::error::{McpError, TransportError};
use crate::protocol::{
    initialize_params, ClientInfo, IncomingMessage, JsonRpcNotification, JsonRpcRequest,
};

/// Maximum number of consecutive non-JSON lines to skip before declaring the
/// server broken.
const MAX_SKIP_LINES: usize = 1000;

/// How long `close()` waits for the child to exit after stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A request/reply channel to an MCP server.
#[async_trait]
pub trait McpTransport: Send {
    /// Start the session if needed. Idempotent while the session is ready.
    async fn ensure_started(&mut self) -> Result<(), McpError>;

    /// Send one request and wait for its correlated reply's `result`.
    async fn send_request(&mut self, method: &str, params: Value) -> Result<Value, McpError>;

    /// Release the session. Idempotent.
    async fn close(&mut self);
}

#[async_trait]
impl<T: McpTransport + ?Sized> McpTransport for Box<T> {
    async fn ensure_started(&mut self) -> Result<(), McpError> {
        (**self).ensure_started().await
    }

    async fn send_request(&mut self, method: &str, params: Value) -> Result<Value, McpError> {
        (**self).send_request(method, params).await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Launch settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Command line and environment overlay for the server process.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerCommand {
    pub command: String,
    pub args: Vec<String>,
    /// Overlaid on the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl ServerCommand {
    pub fn from_config(mcp: &McpConfig, aws: &AwsConfig) -> Self {
        Self {
            command: mcp.command.clone(),
            args: mcp.args.clone(),
            env: mcp.process_env(aws),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    pub client: ClientInfo,
    /// Read deadline per request. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl TransportOptions {
    pub fn from_config(mcp: &McpConfig) -> Self {
        Self {
            client: ClientInfo {
                name: mcp.client_name.clone(),
                version: mcp.client_version.clone(),
            },
            request_timeout: mcp.request_timeout_ms.map(Duration::from_millis),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stdio transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type BoxReader = Box<dyn AsyncBufRead + Unpin + Send>;
type BoxWriter = Box<dyn AsyncWrite + Unpin + Send>;

enum Source {
    Spawn(ServerCommand),
    /// Pre-connected streams, consumed on first start.
    Streams(Option<(BoxReader, BoxWriter)>),
}

enum State {
    Unstarted,
    Ready(Connection),
    Closed,
}

/// Stdio transport: one child process, one JSON message per line.
pub struct StdioTransport {
    source: Source,
    options: TransportOptions,
    state: State,
    next_id: u64,
}

impl StdioTransport {
    /// A transport that spawns `command` on first use.
    pub fn spawn_lazy(command: ServerCommand, options: TransportOptions) -> Self {
        Self::with_source(Source::Spawn(command), options)
    }

    /// A transport over already-connected streams (no child process).
    pub fn from_streams<R, W>(reader: R, writer: W, options: TransportOptions) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let streams: (BoxReader, BoxWriter) = (Box::new(BufReader::new(reader)), Box::new(writer));
        Self::with_source(Source::Streams(Some(streams)), options)
    }

    fn with_source(source: Source, options: TransportOptions) -> Self {
        Self {
            source,
            options,
            state: State::Unstarted,
            next_id: 1,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn open(&mut self) -> Result<Connection, TransportError> {
        match &mut self.source {
            Source::Spawn(command) => spawn_child(command),
            Source::Streams(streams) => {
                let (reader, writer) = streams.take().ok_or(TransportError::Closed)?;
                Ok(Connection {
                    reader,
                    writer,
                    child: None,
                    stderr_drain: None,
                })
            }
        }
    }

    async fn handshake(&mut self, conn: &mut Connection) -> Result<(), McpError> {
        let id = self.next_request_id();
        let params = serde_json::to_value(initialize_params(&self.options.client))
            .map_err(TransportError::from)?;
        conn.write_message(&JsonRpcRequest::new(id, "initialize", params))
            .await?;

        // Exactly one line: the initialize reply.
        let line = with_deadline(self.options.request_timeout, conn.read_raw_line()).await?;
        let line = line.trim();
        if line.is_empty() {
            return Err(McpError::Handshake(
                "server closed its output before answering initialize".into(),
            ));
        }
        let reply: IncomingMessage = serde_json::from_str(line)
            .map_err(|e| McpError::Handshake(format!("initialize reply is not JSON: {e}")))?;
        if let Some(err) = reply.error() {
            return Err(McpError::Handshake(format!("initialize rejected: {err}")));
        }

        conn.write_message(&JsonRpcNotification::new("notifications/initialized"))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn ensure_started(&mut self) -> Result<(), McpError> {
        match self.state {
            State::Ready(_) => return Ok(()),
            State::Closed => return Err(TransportError::Closed.into()),
            State::Unstarted => {}
        }

        let mut conn = match self.open() {
            Ok(conn) => conn,
            Err(e) => {
                self.state = State::Closed;
                return Err(e.into());
            }
        };

        match self.handshake(&mut conn).await {
            Ok(()) => {
                tracing::debug!(client = %self.options.client.name, "MCP handshake complete");
                self.state = State::Ready(conn);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "MCP handshake failed");
                self.state = State::Closed;
                conn.shutdown().await;
                Err(e)
            }
        }
    }

    async fn send_request(&mut self, method: &str, params: Value) -> Result<Value, McpError> {
        self.ensure_started().await?;

        let id = self.next_request_id();
        let deadline = self.options.request_timeout;
        let State::Ready(conn) = &mut self.state else {
            return Err(TransportError::Closed.into());
        };

        tracing::debug!(id, method, "sending MCP request");
        let outcome = with_deadline(deadline, conn.exchange(id, method, params)).await;

        match outcome {
            Ok(reply) => match reply.error() {
                Some(err) => {
                    tracing::debug!(id, method, error = %err, "MCP request returned error");
                    Err(McpError::Protocol(err.clone()))
                }
                None => Ok(reply.into_result()),
            },
            Err(e) => {
                tracing::warn!(id, method, error = %e, "MCP transport failed, closing session");
                self.close().await;
                Err(e.into())
            }
        }
    }

    async fn close(&mut self) {
        if let State::Ready(conn) = std::mem::replace(&mut self.state, State::Closed) {
            tracing::debug!("closing MCP session");
            conn.shutdown().await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Connection {
    reader: BoxReader,
    writer: BoxWriter,
    child: Option<Child>,
    stderr_drain: Option<JoinHandle<()>>,
}

impl Connection {
    async fn write_message<T: Serialize>(&mut self, msg: &T) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(msg)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// One raw line; empty at end of stream.
    async fn read_raw_line(&mut self) -> Result<String, TransportError> {
        let mut line = String::new();
        self.reader.read_line(&mut line).await?;
        Ok(line)
    }

    /// Next line that looks like a JSON object, skipping blank lines and
    /// stray diagnostic output.
    async fn read_json_line(&mut self) -> Result<String, TransportError> {
        let mut skipped = 0usize;
        loop {
            let line = self.read_raw_line().await?;
            if line.is_empty() {
                return Err(TransportError::ProcessExited);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                return Err(TransportError::TooManyNonJsonLines);
            }
            tracing::debug!(line = %trimmed, "skipping non-JSON line from MCP server stdout");
        }
    }

    /// Write a request and read until its reply, dropping notifications.
    async fn exchange(
        &mut self,
        id: u64,
        method: &str,
        params: Value,
    ) -> Result<IncomingMessage, TransportError> {
        self.write_message(&JsonRpcRequest::new(id, method, params))
            .await?;

        loop {
            let line = self.read_json_line().await?;
            let msg: IncomingMessage = serde_json::from_str(&line)?;
            if msg.is_notification() {
                tracing::debug!(
                    method = msg.method.as_deref().unwrap_or_default(),
                    "skipping MCP notification"
                );
                continue;
            }
            // A null id answers a request the server could not parse.
            if let Some(got) = msg.id.as_ref().filter(|v| !v.is_null()) {
                if got.as_u64() != Some(id) {
                    return Err(TransportError::UnexpectedResponseId {
                        expected: id,
                        got: got.clone(),
                    });
                }
            }
            return Ok(msg);
        }
    }

    /// Close stdin, give the child a grace period, then kill it.
    async fn shutdown(self) {
        let Connection {
            reader,
            mut writer,
            child,
            stderr_drain,
        } = self;

        if let Err(e) = writer.shutdown().await {
            tracing::debug!(error = %e, "error closing MCP server stdin");
        }
        drop(writer);
        drop(reader);

        if let Some(mut child) = child {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(?status, "MCP server process exited");
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "error waiting for MCP server process");
                }
                Err(_) => {
                    tracing::warn!("MCP server process did not exit within grace period, killing");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "failed to kill MCP server process");
                    }
                }
            }
        }

        if let Some(task) = stderr_drain {
            task.abort();
        }
    }
}

fn spawn_child(server: &ServerCommand) -> Result<Connection, TransportError> {
    let mut cmd = Command::new(&server.command);
    cmd.args(&server.args)
        .envs(&server.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
        command: server.command.clone(),
        source,
    })?;

    let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let stderr_drain = child.stderr.take().map(|stderr| tokio::spawn(drain_stderr(stderr)));

    tracing::info!(command = %server.command, pid = ?child.id(), "spawned MCP server");

    Ok(Connection {
        reader: Box::new(BufReader::new(stdout)),
        writer: Box::new(stdin),
        child: Some(child),
        stderr_drain,
    })
}

fn missing_pipe(which: &str) -> TransportError {
    TransportError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        format!("failed to capture child {which}"),
    ))
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "mcp_server", line = %line, "stderr");
    }
}

async fn with_deadline<T, F>(deadline: Option<Duration>, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TransportError::Timeout)?,
        None => fut.await,
    }
}
