//! Operation runner
//!
//! Owns the full lifecycle of every submitted operation: creates the
//! store row, spawns the task that drives the command, streams output
//! into the subject's log buffer, and finalizes the row exactly once.
//! Submission never blocks on execution; callers get the operation id
//! back immediately and poll the store.

pub mod logbuf;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::catalog;
use crate::channel::{Channel, ChannelFactory, ChannelOptions};
use crate::disk::{self, DiskTask};
use crate::errors::EngineError;
use crate::models::{OpStatus, Operation, Target};
use crate::notify::FailureNotifier;
use crate::osdetect;
use crate::store::OperationStore;

pub use logbuf::LogRegistry;

/// How a run ended when no error was raised.
enum Outcome {
    /// Command ran to completion with exit code zero
    Completed,
    /// A stop request interrupted the run
    Stopped,
}

/// Handle to an in-flight operation task.
struct RunningOperation {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The operation engine. One instance per process; cheap to share.
pub struct Engine {
    store: Arc<OperationStore>,
    logs: Arc<LogRegistry>,
    channels: Arc<dyn ChannelFactory>,
    notifier: Arc<dyn FailureNotifier>,
    options: ChannelOptions,
    tasks: Mutex<HashMap<i64, RunningOperation>>,
}

impl Engine {
    pub fn new(
        store: Arc<OperationStore>,
        channels: Arc<dyn ChannelFactory>,
        notifier: Arc<dyn FailureNotifier>,
        options: ChannelOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            logs: Arc::new(LogRegistry::new()),
            channels,
            notifier,
            options,
            tasks: Mutex::new(HashMap::new()),
        })
    }

    /// Submit a system update for a target. Returns the operation id as
    /// soon as the row exists; the update runs on its own task.
    pub async fn submit_update(
        self: &Arc<Self>,
        target: Target,
        repo_only: bool,
    ) -> Result<i64, EngineError> {
        let kind = if repo_only { "update:repo" } else { "update:full" };
        let op_id = self.store.create(&target.subject, kind)?;
        info!("Submitted {} for {} as operation {}", kind, target.subject, op_id);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            engine.drive_update(op_id, target, repo_only, cancel_rx).await;
        });

        self.register_task(op_id, cancel_tx, handle).await;
        Ok(op_id)
    }

    /// Submit a local disk task. The device name must pass the allow-list
    /// before any row is created or process spawned.
    pub async fn submit_disk_task(
        self: &Arc<Self>,
        device: &str,
        task: DiskTask,
    ) -> Result<i64, EngineError> {
        disk::validate_device_name(device)?;

        let op_id = self.store.create(device, &task.kind())?;
        info!("Submitted {} for {} as operation {}", task.kind(), device, op_id);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let device = device.to_string();
        let handle = tokio::spawn(async move {
            engine.drive_disk_task(op_id, device, task, cancel_rx).await;
        });

        self.register_task(op_id, cancel_tx, handle).await;
        Ok(op_id)
    }

    /// Current (status, progress) of an operation.
    pub fn status(&self, op_id: i64) -> Result<Option<(OpStatus, i64)>, EngineError> {
        self.store.status(op_id)
    }

    /// Ordered log lines of the subject's current run.
    pub async fn log(&self, subject: &str) -> Vec<String> {
        self.logs.snapshot(subject).await
    }

    /// Operation history, most recent first.
    pub fn history(&self) -> Result<Vec<Operation>, EngineError> {
        self.store.history()
    }

    /// Delete all operation history.
    pub fn clear_history(&self) -> Result<(), EngineError> {
        self.store.clear_history()
    }

    /// Request a stop. Marks a RUNNING row as STOPPED and signals the
    /// owning task. Soft stop: the underlying process or remote command is
    /// not forcibly terminated and may run to completion on the target.
    pub async fn stop(&self, op_id: i64) -> Result<(), EngineError> {
        if self.store.status(op_id)?.is_none() {
            return Err(EngineError::NotFound(format!("operation {op_id}")));
        }

        if self.store.mark_stopped(op_id)? {
            info!("Operation {} stopped on request", op_id);
        }

        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.get(&op_id) {
            let _ = task.cancel.send(true);
        }
        tasks.retain(|_, task| !task.handle.is_finished());
        Ok(())
    }

    /// Abort all in-flight operation tasks. Rows left in RUNNING are
    /// resolved on the next explicit stop or history clear.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (op_id, task) in tasks.drain() {
            debug!("Aborting operation task {}", op_id);
            let _ = task.cancel.send(true);
            task.handle.abort();
        }
    }

    async fn register_task(&self, op_id: i64, cancel: watch::Sender<bool>, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, task| !task.handle.is_finished());
        tasks.insert(op_id, RunningOperation { cancel, handle });
    }

    // ============================== UPDATE RUN ============================== //

    async fn drive_update(
        &self,
        op_id: i64,
        target: Target,
        repo_only: bool,
        mut cancel: watch::Receiver<bool>,
    ) {
        self.logs.begin(&target.subject).await;
        let result = self.run_update(&target, repo_only, &mut cancel).await;
        self.finalize(op_id, &target.subject, result).await;
    }

    async fn run_update(
        &self,
        target: &Target,
        repo_only: bool,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Outcome, EngineError> {
        let subject = &target.subject;
        self.logs
            .append(subject, &format!("Connecting to {} ({})...", subject, target.address))
            .await;

        let mut channel = self.channels.open(target).await?;
        let result = self
            .run_update_on(channel.as_mut(), target, repo_only, cancel)
            .await;
        channel.close().await;
        result
    }

    async fn run_update_on(
        &self,
        channel: &mut dyn Channel,
        target: &Target,
        repo_only: bool,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Outcome, EngineError> {
        let subject = &target.subject;

        self.logs.append(subject, "Detecting operating system...").await;
        let identity = osdetect::detect(target, channel, self.options.probe_timeout).await;
        let family = match (identity.family, identity.raw_id.as_deref()) {
            (Some(family), _) => family,
            // The target told us what it is; we just cannot patch it.
            (None, Some(id)) => {
                return Err(EngineError::UnsupportedTarget(format!(
                    "unsupported distribution '{id}' on {subject}"
                )))
            }
            (None, None) => {
                return Err(EngineError::DetectionFailed(format!(
                    "could not determine the OS of {subject}"
                )))
            }
        };
        self.logs
            .append(subject, &format!("Detected: {}", identity))
            .await;

        let update = catalog::resolve(family, repo_only);
        self.logs.append(subject, update.description).await;

        self.stream_command(channel, subject, &update.command, cancel).await
    }

    // ============================= DISK TASK RUN ============================= //

    async fn drive_disk_task(
        &self,
        op_id: i64,
        device: String,
        task: DiskTask,
        mut cancel: watch::Receiver<bool>,
    ) {
        self.logs.begin(&device).await;

        let target = Target::local(device.clone());
        let result = async {
            self.logs
                .append(&device, &format!("Running {} on /dev/{}...", task.kind(), device))
                .await;
            let mut channel = self.channels.open(&target).await?;
            let result = self
                .stream_command(channel.as_mut(), &device, &task.command(&device), &mut cancel)
                .await;
            channel.close().await;
            result
        }
        .await;

        self.finalize(op_id, &device, result).await;
    }

    // ============================ SHARED PLUMBING ============================ //

    /// Execute one command on an open channel, streaming output into the
    /// subject's log buffer until the stream closes or a stop arrives.
    async fn stream_command(
        &self,
        channel: &mut dyn Channel,
        subject: &str,
        command: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Outcome, EngineError> {
        let mut stream = channel.run(command).await?;

        let mut stoppable = true;
        loop {
            tokio::select! {
                line = stream.next_line() => match line {
                    Some(line) => self.logs.append(subject, &line).await,
                    None => break,
                },
                changed = cancel.changed(), if stoppable => match changed {
                    Ok(()) if *cancel.borrow() => return Ok(Outcome::Stopped),
                    Ok(()) => {}
                    // Sender gone; no stop request can arrive anymore.
                    Err(_) => stoppable = false,
                }
            }
        }

        let code = stream.wait().await?;
        if code == 0 {
            Ok(Outcome::Completed)
        } else {
            Err(EngineError::CommandFailed {
                code,
                detail: format!("command exited with code {code}"),
            })
        }
    }

    /// Resolve the operation row exactly once and record the outcome in
    /// the subject's log. Errors never propagate past this point.
    async fn finalize(&self, op_id: i64, subject: &str, result: Result<Outcome, EngineError>) {
        match result {
            Ok(Outcome::Completed) => {
                self.logs
                    .append(subject, &format!("✓ Completed successfully for {subject}"))
                    .await;
                match self.store.finalize(op_id, OpStatus::Ok, 100) {
                    Ok(true) => {}
                    // A stop request won the race; its terminal state stands.
                    Ok(false) => info!("Operation {} was already stopped", op_id),
                    Err(e) => error!("Failed to finalize operation {}: {}", op_id, e),
                }
            }
            Ok(Outcome::Stopped) => {
                // stop() already marked the row STOPPED.
                self.logs.append(subject, "Stopped on request").await;
                info!("Operation {} halted after stop request", op_id);
            }
            Err(e) => {
                let detail = e.to_string();
                self.logs.append(subject, &format!("✗ {detail}")).await;
                match self.store.finalize(op_id, OpStatus::Fail, 0) {
                    Ok(true) => self.notifier.notify_failure(subject, &detail),
                    Ok(false) => info!("Operation {} was already stopped", op_id),
                    Err(store_err) => {
                        error!("Failed to finalize operation {}: {}", op_id, store_err);
                        self.notifier.notify_failure(subject, &detail);
                    }
                }
            }
        }
    }
}
