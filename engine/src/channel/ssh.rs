//! Remote command execution over SSH
//!
//! Built on `ssh2`, which is blocking; session setup and command reads run
//! on `spawn_blocking`. Commands execute on a pty channel so package
//! managers flush output line by line instead of buffering to completion,
//! and stderr arrives merged into the same stream.

use std::io::{BufRead, BufReader};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use async_trait::async_trait;
use ssh2::Session;
use tracing::debug;

use crate::channel::{Channel, ChannelOptions, ExecSink, ExecStream};
use crate::errors::EngineError;
use crate::models::Target;

/// An authenticated SSH session against one remote target.
pub struct SshChannel {
    session: Session,
}

impl SshChannel {
    /// Connect and authenticate. Key-based only: an identity file when the
    /// target carries one, the SSH agent otherwise. Password prompts are
    /// never handled here; key provisioning is an external flow.
    pub async fn connect(target: &Target, options: &ChannelOptions) -> Result<Self, EngineError> {
        let target = target.clone();
        let connect_timeout = options.connect_timeout;

        tokio::task::spawn_blocking(move || Self::connect_blocking(&target, connect_timeout))
            .await
            .map_err(|e| EngineError::ChannelError(format!("transport task failed: {e}")))?
    }

    fn connect_blocking(target: &Target, timeout: Duration) -> Result<Self, EngineError> {
        debug!("Connecting to {}...", target.socket_address());

        let addr = target
            .socket_address()
            .to_socket_addrs()
            .map_err(|e| {
                EngineError::ConnectionError(format!(
                    "could not resolve {}: {e}",
                    target.socket_address()
                ))
            })?
            .next()
            .ok_or_else(|| {
                EngineError::ConnectionError(format!(
                    "no address found for {}",
                    target.socket_address()
                ))
            })?;

        let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
            EngineError::ConnectionError(format!("connect to {}: {e}", target.socket_address()))
        })?;

        let mut session = Session::new()
            .map_err(|e| EngineError::ConnectionError(format!("ssh session init: {e}")))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout.as_millis() as u32);
        session
            .handshake()
            .map_err(|e| EngineError::ConnectionError(format!("ssh handshake: {e}")))?;

        match &target.identity_file {
            Some(key) => session
                .userauth_pubkey_file(&target.user, None, key, None)
                .map_err(|e| {
                    EngineError::AuthenticationError(format!(
                        "key auth for {}@{}: {e}",
                        target.user, target.address
                    ))
                })?,
            None => session.userauth_agent(&target.user).map_err(|e| {
                EngineError::AuthenticationError(format!(
                    "agent auth for {}@{}: {e}",
                    target.user, target.address
                ))
            })?,
        }

        if !session.authenticated() {
            return Err(EngineError::AuthenticationError(format!(
                "authentication rejected for {}@{}",
                target.user, target.address
            )));
        }

        // Update bodies run unboundedly long; only setup is bounded.
        session.set_timeout(0);

        Ok(Self { session })
    }
}

#[async_trait]
impl Channel for SshChannel {
    async fn run(&mut self, command: &str) -> Result<ExecStream, EngineError> {
        debug!("Executing remote command: {}", command);

        let session = self.session.clone();
        let command = command.to_string();
        let (sink, stream) = ExecStream::pair(256);

        tokio::task::spawn_blocking(move || exec_blocking(&session, &command, sink));

        Ok(stream)
    }

    async fn close(&mut self) {
        let session = self.session.clone();
        let _ = tokio::task::spawn_blocking(move || {
            let _ = session.disconnect(None, "closing channel", None);
        })
        .await;
    }
}

fn exec_blocking(session: &Session, command: &str, sink: ExecSink) {
    let result = run_on_pty(session, command, &sink);
    sink.finish(result);
}

fn run_on_pty(session: &Session, command: &str, sink: &ExecSink) -> Result<i32, EngineError> {
    let mut channel = session
        .channel_session()
        .map_err(|e| EngineError::ConnectionError(format!("open ssh channel: {e}")))?;

    channel
        .request_pty("xterm", None, None)
        .map_err(|e| EngineError::ChannelError(format!("request pty: {e}")))?;
    channel
        .exec(command)
        .map_err(|e| EngineError::ChannelError(format!("exec remote command: {e}")))?;

    {
        let reader = BufReader::new(&mut channel);
        for line in reader.lines() {
            let line =
                line.map_err(|e| EngineError::ChannelError(format!("read remote output: {e}")))?;
            // pty output carries trailing carriage returns
            if !sink.blocking_line(line.trim_end_matches('\r').to_string()) {
                break;
            }
        }
    }

    channel
        .wait_close()
        .map_err(|e| EngineError::ChannelError(format!("close ssh channel: {e}")))?;
    let code = channel
        .exit_status()
        .map_err(|e| EngineError::ChannelError(format!("collect exit status: {e}")))?;

    Ok(code)
}
