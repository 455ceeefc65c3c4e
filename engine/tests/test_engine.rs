//! Engine lifecycle tests
//!
//! All execution goes through fake channels, so these tests exercise the
//! full submit/run/finalize path without touching SSH or real processes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use fleetpatchd::channel::{Channel, ChannelFactory, ChannelOptions, ExecStream};
use fleetpatchd::disk::{DiskTask, Filesystem, SmartMode};
use fleetpatchd::errors::EngineError;
use fleetpatchd::models::{OpStatus, Target};
use fleetpatchd::notify::FailureNotifier;
use fleetpatchd::runner::Engine;
use fleetpatchd::store::OperationStore;

const UBUNTU_RELEASE: &str = "NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"22.04\"\n";

/// Channel that answers the OS probes from a canned release blob and every
/// other command with scripted output and exit code.
struct FakeChannel {
    release: String,
    output: Vec<String>,
    exit_code: i32,
}

#[async_trait]
impl Channel for FakeChannel {
    async fn run(&mut self, command: &str) -> Result<ExecStream, EngineError> {
        let (lines, code) = if command.contains("powershell") {
            (vec!["sh: powershell: not found".to_string()], 127)
        } else if command.contains("os-release") {
            (self.release.lines().map(String::from).collect(), 0)
        } else {
            (self.output.clone(), self.exit_code)
        };

        let (sink, stream) = ExecStream::pair(64);
        tokio::spawn(async move {
            let tx = sink.line_sender();
            for line in lines {
                let _ = tx.send(line).await;
            }
            drop(tx);
            sink.finish(Ok(code));
        });
        Ok(stream)
    }

    async fn close(&mut self) {}
}

/// Channel whose command never finishes, for stop tests.
struct HangingChannel;

#[async_trait]
impl Channel for HangingChannel {
    async fn run(&mut self, _command: &str) -> Result<ExecStream, EngineError> {
        let (sink, stream) = ExecStream::pair(8);
        tokio::spawn(async move {
            let tx = sink.line_sender();
            let _ = tx.send("still working...".to_string()).await;
            tokio::time::sleep(Duration::from_secs(300)).await;
            sink.finish(Ok(0));
        });
        Ok(stream)
    }

    async fn close(&mut self) {}
}

enum FactoryMode {
    Scripted {
        release: String,
        output: Vec<String>,
        exit_code: i32,
    },
    Hanging,
    Failing,
}

struct FakeFactory {
    mode: FactoryMode,
    opens: AtomicUsize,
}

impl FakeFactory {
    fn scripted(release: &str, output: &[&str], exit_code: i32) -> Arc<Self> {
        Arc::new(Self {
            mode: FactoryMode::Scripted {
                release: release.to_string(),
                output: output.iter().map(|s| s.to_string()).collect(),
                exit_code,
            },
            opens: AtomicUsize::new(0),
        })
    }

    fn hanging() -> Arc<Self> {
        Arc::new(Self {
            mode: FactoryMode::Hanging,
            opens: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            mode: FactoryMode::Failing,
            opens: AtomicUsize::new(0),
        })
    }

    fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelFactory for FakeFactory {
    async fn open(&self, _target: &Target) -> Result<Box<dyn Channel>, EngineError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            FactoryMode::Scripted {
                release,
                output,
                exit_code,
            } => Ok(Box::new(FakeChannel {
                release: release.clone(),
                output: output.clone(),
                exit_code: *exit_code,
            })),
            FactoryMode::Hanging => Ok(Box::new(HangingChannel)),
            FactoryMode::Failing => Err(EngineError::ConnectionError(
                "no route to target".to_string(),
            )),
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    failures: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    fn failures(&self) -> Vec<(String, String)> {
        self.failures.lock().unwrap().clone()
    }
}

impl FailureNotifier for RecordingNotifier {
    fn notify_failure(&self, subject: &str, detail: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((subject.to_string(), detail.to_string()));
    }
}

fn build_engine(
    factory: Arc<FakeFactory>,
) -> (Arc<Engine>, Arc<OperationStore>, Arc<RecordingNotifier>) {
    let store = Arc::new(OperationStore::open_in_memory().unwrap());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = Engine::new(
        store.clone(),
        factory,
        notifier.clone(),
        ChannelOptions::default(),
    );
    (engine, store, notifier)
}

async fn wait_terminal(engine: &Engine, op_id: i64) -> (OpStatus, i64) {
    for _ in 0..500 {
        if let Some((status, progress)) = engine.status(op_id).unwrap() {
            if status.is_terminal() {
                return (status, progress);
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("operation {op_id} never reached a terminal state");
}

#[tokio::test]
async fn test_successful_update_finishes_ok() {
    let factory = FakeFactory::scripted(UBUNTU_RELEASE, &["Reading package lists...", "Done"], 0);
    let (engine, _store, notifier) = build_engine(factory);

    let target = Target::remote("web01", "192.0.2.10", "root");
    let op_id = engine.submit_update(target, true).await.unwrap();

    let (status, progress) = wait_terminal(&engine, op_id).await;
    assert_eq!(status, OpStatus::Ok);
    assert_eq!(progress, 100);
    assert!(notifier.failures().is_empty());

    let log = engine.log("web01").await.join("\n");
    assert!(log.contains("Detected: ubuntu 22.04"), "log was:\n{log}");
    assert!(log.contains("Done"));
    assert!(log.contains("✓"));

    let op = engine.history().unwrap().remove(0);
    assert_eq!(op.kind, "update:repo");
    assert_eq!(op.subject, "web01");
}

#[tokio::test]
async fn test_nonzero_exit_finishes_fail() {
    let factory = FakeFactory::scripted(UBUNTU_RELEASE, &["E: broken packages"], 100);
    let (engine, _store, notifier) = build_engine(factory);

    let target = Target::remote("web02", "192.0.2.11", "root");
    let op_id = engine.submit_update(target, false).await.unwrap();

    let (status, progress) = wait_terminal(&engine, op_id).await;
    assert_eq!(status, OpStatus::Fail);
    assert_eq!(progress, 0);

    let failures = notifier.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "web02");
    assert!(failures[0].1.contains("100"));

    let log = engine.log("web02").await.join("\n");
    assert!(log.contains("E: broken packages"));
    assert!(log.contains("✗"));
}

#[tokio::test]
async fn test_connect_failure_resolves_the_row() {
    let factory = FakeFactory::failing();
    let (engine, _store, notifier) = build_engine(factory);

    let target = Target::remote("db01", "192.0.2.12", "root");
    let op_id = engine.submit_update(target, true).await.unwrap();

    let (status, _) = wait_terminal(&engine, op_id).await;
    assert_eq!(status, OpStatus::Fail);

    let failures = notifier.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].1.contains("no route to target"));
}

#[tokio::test]
async fn test_unsupported_distribution_is_named_in_the_failure() {
    let factory = FakeFactory::scripted("ID=gentoo\nVERSION_ID=2.14\n", &[], 0);
    let (engine, _store, notifier) = build_engine(factory);

    let target = Target::remote("mystery", "192.0.2.13", "root");
    let op_id = engine.submit_update(target, true).await.unwrap();

    let (status, _) = wait_terminal(&engine, op_id).await;
    assert_eq!(status, OpStatus::Fail);

    // The host answered; the failure must say what it is, not that
    // detection failed.
    let detail = &notifier.failures()[0].1;
    assert!(
        detail.contains("unsupported distribution 'gentoo'"),
        "detail was: {detail}"
    );
    assert!(!detail.contains("could not determine"));
}

#[tokio::test]
async fn test_undetectable_os_finishes_fail() {
    let factory = FakeFactory::scripted("PRETTY_NAME=\"Mystery OS\"\n", &[], 0);
    let (engine, _store, notifier) = build_engine(factory);

    let target = Target::remote("ghost", "192.0.2.14", "root");
    let op_id = engine.submit_update(target, true).await.unwrap();

    let (status, _) = wait_terminal(&engine, op_id).await;
    assert_eq!(status, OpStatus::Fail);
    assert!(notifier.failures()[0].1.contains("could not determine"));
}

#[tokio::test]
async fn test_disk_task_runs_locally() {
    let factory = FakeFactory::scripted("", &["mke2fs 1.47.0"], 0);
    let (engine, _store, _notifier) = build_engine(factory.clone());

    let op_id = engine
        .submit_disk_task("sdb", DiskTask::Format(Filesystem::Ext4))
        .await
        .unwrap();

    let (status, progress) = wait_terminal(&engine, op_id).await;
    assert_eq!(status, OpStatus::Ok);
    assert_eq!(progress, 100);
    assert_eq!(factory.open_count(), 1);

    let op = engine.history().unwrap().remove(0);
    assert_eq!(op.kind, "format:ext4");
    assert_eq!(op.subject, "sdb");
}

#[tokio::test]
async fn test_invalid_device_never_opens_a_channel() {
    let factory = FakeFactory::scripted("", &[], 0);
    let (engine, _store, _notifier) = build_engine(factory.clone());

    for device in ["../etc", "sda; rm -rf /", "", "/dev/sda"] {
        let result = engine
            .submit_disk_task(device, DiskTask::SmartTest(SmartMode::Short))
            .await;
        assert!(
            matches!(result, Err(EngineError::InvalidSubject(_))),
            "{device:?} should be rejected"
        );
    }

    assert_eq!(factory.open_count(), 0);
    assert!(engine.history().unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_marks_operation_stopped() {
    let factory = FakeFactory::hanging();
    let (engine, _store, notifier) = build_engine(factory);

    let op_id = engine
        .submit_disk_task("sdc", DiskTask::SmartTest(SmartMode::Long))
        .await
        .unwrap();

    // Let the command start streaming before stopping it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.stop(op_id).await.unwrap();

    let (status, _) = wait_terminal(&engine, op_id).await;
    assert_eq!(status, OpStatus::Stopped);
    assert!(notifier.failures().is_empty());

    // Stopping again is harmless.
    engine.stop(op_id).await.unwrap();
    let (status, _) = engine.status(op_id).unwrap().unwrap();
    assert_eq!(status, OpStatus::Stopped);
}

#[tokio::test]
async fn test_stop_unknown_operation_is_not_found() {
    let factory = FakeFactory::scripted("", &[], 0);
    let (engine, _store, _notifier) = build_engine(factory);

    assert!(matches!(
        engine.stop(999).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_clear_history_through_engine() {
    let factory = FakeFactory::scripted("", &["ok"], 0);
    let (engine, _store, _notifier) = build_engine(factory);

    let op_id = engine
        .submit_disk_task("sdd", DiskTask::Format(Filesystem::Xfs))
        .await
        .unwrap();
    wait_terminal(&engine, op_id).await;

    assert_eq!(engine.history().unwrap().len(), 1);
    engine.clear_history().unwrap();
    assert!(engine.history().unwrap().is_empty());
}
