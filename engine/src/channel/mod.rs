//! Target channels
//!
//! A channel is an open, resource-owning execution session against a
//! target. Loopback targets run commands in-process; everything else goes
//! through an SSH session. Both produce the same line-oriented
//! [`ExecStream`], so the runner and the OS detector never care which
//! transport they are on.

pub mod local;
pub mod ssh;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::errors::EngineError;
use crate::models::Target;

pub use local::LocalChannel;
pub use ssh::SshChannel;

/// Bounds on channel setup. The command body itself is not bounded; a hung
/// target keeps its operation in RUNNING until stopped.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// TCP connect / SSH handshake timeout
    pub connect_timeout: Duration,

    /// Timeout for each OS detection probe
    pub probe_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(15),
        }
    }
}

/// Output of one command execution: lines as they are produced, then a
/// final exit code once the stream is drained.
pub struct ExecStream {
    lines: mpsc::Receiver<String>,
    exit: oneshot::Receiver<Result<i32, EngineError>>,
}

impl ExecStream {
    /// Create a connected sink/stream pair. Transports (and test fakes)
    /// write into the sink; the runner reads from the stream.
    pub fn pair(buffer: usize) -> (ExecSink, ExecStream) {
        let (line_tx, line_rx) = mpsc::channel(buffer);
        let (exit_tx, exit_rx) = oneshot::channel();
        (
            ExecSink {
                lines: line_tx,
                exit: exit_tx,
            },
            ExecStream {
                lines: line_rx,
                exit: exit_rx,
            },
        )
    }

    /// Next output line, or `None` once the command has closed its output.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Final exit code. Call after `next_line` returns `None`.
    pub async fn wait(self) -> Result<i32, EngineError> {
        drop(self.lines);
        self.exit
            .await
            .map_err(|_| EngineError::ChannelError("command ended without an exit status".to_string()))?
    }
}

/// Producer half of an [`ExecStream`].
pub struct ExecSink {
    lines: mpsc::Sender<String>,
    exit: oneshot::Sender<Result<i32, EngineError>>,
}

impl ExecSink {
    /// Clone of the line sender, for readers running on separate tasks.
    pub fn line_sender(&self) -> mpsc::Sender<String> {
        self.lines.clone()
    }

    /// Send a line from blocking code. Returns false once the consumer is
    /// gone (stream dropped, e.g. on cancellation).
    pub fn blocking_line(&self, line: String) -> bool {
        self.lines.blocking_send(line).is_ok()
    }

    /// Finish the stream with the command result, closing the line side.
    pub fn finish(self, result: Result<i32, EngineError>) {
        let _ = self.exit.send(result);
    }
}

/// An open execution session against one target.
#[async_trait]
pub trait Channel: Send {
    /// Execute a command, streaming its merged output line by line.
    async fn run(&mut self, command: &str) -> Result<ExecStream, EngineError>;

    /// Release transport resources. Safe to call on every exit path.
    async fn close(&mut self);
}

/// Opens channels for targets. The seam the runner and tests plug into.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    async fn open(&self, target: &Target) -> Result<Box<dyn Channel>, EngineError>;
}

/// Default factory: in-process execution for loopback targets, SSH for
/// everything else.
pub struct TransportFactory {
    options: ChannelOptions,
}

impl TransportFactory {
    pub fn new(options: ChannelOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ChannelFactory for TransportFactory {
    async fn open(&self, target: &Target) -> Result<Box<dyn Channel>, EngineError> {
        if target.is_loopback() {
            Ok(Box::new(LocalChannel::new()))
        } else {
            let channel = SshChannel::connect(target, &self.options).await?;
            Ok(Box::new(channel))
        }
    }
}
