//! External-process agent backend.
//!
//! Invocation: `<program> [args...] [script] '<request json>'`. Stdout and
//! stderr are read concurrently line by line; the first JSON object/array on
//! stdout is the result. The child is killed when the deadline passes or when
//! the invoking future is dropped.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use tokio::process::Command;
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};

use crate::agent::{AgentBackend, AgentError, OutputCollector};
use crate::config::AgentConfig;
use crate::models::{SuggestionRequest, SuggestionResponse};

/// Longest single output line accepted from the agent (8 MiB).
pub const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// One unit read from an agent output stream.
#[derive(Debug, PartialEq, Eq)]
pub enum OutputLine {
    Text(String),
    /// A line longer than the limit. Its bytes were discarded up to the
    /// next newline and reading continues after it.
    Oversized,
}

/// `LinesCodec` that survives over-long lines.
///
/// `FramedRead` ends the stream after any decoder error, which would leave
/// the child blocked on a full pipe. Here the length error becomes an
/// `OutputLine::Oversized` item while the inner codec skips to the next
/// newline.
#[derive(Debug, Clone)]
pub struct AgentLineCodec {
    inner: LinesCodec,
}

impl AgentLineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
        }
    }

    pub fn max_length(&self) -> usize {
        self.inner.max_length()
    }

    fn map(result: Result<Option<String>, LinesCodecError>) -> Result<Option<OutputLine>, std::io::Error> {
        match result {
            Ok(line) => Ok(line.map(OutputLine::Text)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(OutputLine::Oversized)),
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for AgentLineCodec {
    type Item = OutputLine;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<OutputLine>, std::io::Error> {
        Self::map(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<OutputLine>, std::io::Error> {
        Self::map(self.inner.decode_eof(buf))
    }
}

#[derive(Debug, Clone)]
pub struct SubprocessAgent {
    program: String,
    args: Vec<String>,
    script: Option<PathBuf>,
    timeout: Duration,
    max_line_length: usize,
}

impl SubprocessAgent {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        script: Option<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            script,
            timeout,
            max_line_length: MAX_LINE_LENGTH,
        }
    }

    /// Override the per-line limit for agent output.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length.max(1);
        self
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        let script = config
            .script
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                PathBuf::from(
                    shellexpand::full(s).map_or_else(|_| s.to_string(), |e| e.into_owned()),
                )
            });
        Self::new(
            config.program.clone(),
            config.args.clone(),
            script,
            Duration::from_secs(config.timeout_seconds.max(1)),
        )
    }

    pub fn script(&self) -> Option<&PathBuf> {
        self.script.as_ref()
    }

    async fn run(&self, payload: String) -> Result<SuggestionResponse, AgentError> {
        if let Some(script) = &self.script {
            if !script.exists() {
                return Err(AgentError::ScriptNotFound {
                    path: script.display().to_string(),
                });
            }
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(script) = &self.script {
            cmd.arg(script);
        }
        cmd.arg(payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| AgentError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        tracing::info!(program = %self.program, pid = ?child.id(), "Agent process started");

        let stdout = child.stdout.take().ok_or_else(|| {
            AgentError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "agent stdout not captured",
            ))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            AgentError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "agent stderr not captured",
            ))
        })?;

        let codec = AgentLineCodec::new(self.max_line_length);
        let limit = codec.max_length();
        let mut out = FramedRead::new(stdout, codec.clone());
        let mut err = FramedRead::new(stderr, codec);
        let mut collector = OutputCollector::new();

        let drive = async {
            let mut out_done = false;
            let mut err_done = false;
            while !(out_done && err_done) {
                tokio::select! {
                    line = out.next(), if !out_done => match line {
                        Some(Ok(OutputLine::Text(line))) => {
                            tracing::debug!(stream = "stdout", "{}", line);
                            collector.push_stdout(&line);
                        }
                        Some(Ok(OutputLine::Oversized)) => {
                            tracing::warn!(stream = "stdout", limit, "Dropped oversized agent line");
                            collector.push_diagnostic(format!("stdout line exceeded {} bytes; dropped", limit));
                        }
                        Some(Err(e)) => {
                            collector.push_diagnostic(format!("stdout read error: {}", e));
                            out_done = true;
                        }
                        None => out_done = true,
                    },
                    line = err.next(), if !err_done => match line {
                        Some(Ok(OutputLine::Text(line))) => {
                            tracing::debug!(stream = "stderr", "{}", line);
                            collector.push_diagnostic(line);
                        }
                        Some(Ok(OutputLine::Oversized)) => {
                            tracing::warn!(stream = "stderr", limit, "Dropped oversized agent line");
                            collector.push_diagnostic(format!("stderr line exceeded {} bytes; dropped", limit));
                        }
                        Some(Err(e)) => {
                            collector.push_diagnostic(format!("stderr read error: {}", e));
                            err_done = true;
                        }
                        None => err_done = true,
                    },
                }
            }
            child.wait().await
        };

        let outcome = tokio::time::timeout(self.timeout, drive).await;

        match outcome {
            Ok(Ok(status)) if status.success() => collector.finish(),
            Ok(Ok(status)) => {
                let diagnostics = collector.diagnostics();
                tracing::error!(%status, diagnostics = %diagnostics, "Agent process failed");
                Err(AgentError::Exited {
                    status: status.to_string(),
                    diagnostics,
                })
            }
            Ok(Err(e)) => Err(AgentError::Io(e)),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill timed-out agent process");
                }
                let diagnostics = collector.diagnostics();
                tracing::error!(
                    timeout_secs = self.timeout.as_secs(),
                    diagnostics = %diagnostics,
                    "Agent process timed out"
                );
                Err(AgentError::Timeout {
                    seconds: self.timeout.as_secs(),
                    diagnostics,
                })
            }
        }
    }
}

#[async_trait]
impl AgentBackend for SubprocessAgent {
    async fn invoke(&self, request: &SuggestionRequest) -> Result<SuggestionResponse, AgentError> {
        let payload = serde_json::to_string(request)?;
        let start = Instant::now();
        let result = self.run(payload).await;
        tracing::info!(
            images = request.images.len(),
            ok = result.is_ok(),
            took_ms = start.elapsed().as_millis() as u64,
            "Agent invocation finished"
        );
        result
    }

    fn name(&self) -> &str {
        "subprocess"
    }
}
