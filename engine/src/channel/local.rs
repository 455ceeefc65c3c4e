//! In-process command execution for loopback targets

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::{Channel, ExecStream};
use crate::errors::EngineError;

/// Runs commands through the local shell.
///
/// Commands get full shell interpretation (`sh -c` / `cmd /C`): catalog
/// entries rely on `&&` chaining and environment-variable prefixes, and
/// command text only ever originates from the trusted catalog.
pub struct LocalChannel;

impl LocalChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for LocalChannel {
    async fn run(&mut self, command: &str) -> Result<ExecStream, EngineError> {
        debug!("Spawning local command: {}", command);

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| EngineError::ConnectionError(format!("failed to spawn local command: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::ChannelError("child stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::ChannelError("child stderr not captured".to_string()))?;

        let (sink, stream) = ExecStream::pair(256);

        let out_task = tokio::spawn(forward_lines(stdout, sink.line_sender()));
        let err_task = tokio::spawn(forward_lines(stderr, sink.line_sender()));

        tokio::spawn(async move {
            let _ = out_task.await;
            let _ = err_task.await;

            let result = match child.wait().await {
                Ok(status) => Ok(status.code().unwrap_or(-1)),
                Err(e) => Err(EngineError::ChannelError(format!(
                    "failed to collect local command status: {e}"
                ))),
            };
            sink.finish(result);
        });

        Ok(stream)
    }

    async fn close(&mut self) {
        // Nothing held open between runs.
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            // Consumer is gone; stop reading.
            break;
        }
    }
}
