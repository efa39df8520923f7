use super::process::should_retry_read_error;
use super::signal::grace_expired;
use super::*;
use crate::config::BridgeConfig;
use crossbeam_channel::unbounded;
#[cfg(unix)]
use crossbeam_channel::Receiver;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct CountingControl {
    terminations: Arc<AtomicUsize>,
}

impl WorkerControl for CountingControl {
    fn terminate(&mut self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_handle(generation: Generation) -> (WorkerHandle, Arc<AtomicUsize>) {
    let terminations = Arc::new(AtomicUsize::new(0));
    let control = CountingControl {
        terminations: Arc::clone(&terminations),
    };
    (
        WorkerHandle::new(generation, Box::new(control), 1024),
        terminations,
    )
}

#[test]
fn grace_expires_after_window() {
    let start = Instant::now();
    let grace = Duration::from_secs(2);
    assert!(!grace_expired(start, start, grace));
    assert!(!grace_expired(start, start + Duration::from_millis(1999), grace));
    assert!(grace_expired(start, start + grace, grace));
}

#[test]
fn only_interrupted_reads_are_retried() {
    assert!(should_retry_read_error(&std::io::Error::from(
        ErrorKind::Interrupted
    )));
    assert!(!should_retry_read_error(&std::io::Error::from(
        ErrorKind::BrokenPipe
    )));
}

#[test]
fn sink_tags_messages_with_generation() {
    let (tx, rx) = unbounded();
    let sink = WorkerSink::new(7, tx);
    assert!(sink.chunk(Channel::Control, b"CONNECTED\n".to_vec()));
    assert!(sink.exited(Some(0)));
    assert_eq!(
        rx.try_recv().unwrap(),
        WorkerMessage {
            generation: 7,
            output: WorkerOutput::Chunk {
                channel: Channel::Control,
                bytes: b"CONNECTED\n".to_vec()
            }
        }
    );
    assert_eq!(rx.try_recv().unwrap().output, WorkerOutput::Exited { code: Some(0) });
}

#[test]
fn sink_reports_closed_queue() {
    let (tx, rx) = unbounded();
    drop(rx);
    let sink = WorkerSink::new(1, tx);
    assert!(!sink.chunk(Channel::Data, b"{}\n".to_vec()));
}

#[test]
fn handle_terminate_is_idempotent_and_runs_on_drop() {
    let (mut handle, terminations) = counting_handle(1);
    handle.terminate();
    handle.terminate();
    drop(handle);
    assert_eq!(terminations.load(Ordering::SeqCst), 1);

    let (handle, terminations) = counting_handle(2);
    drop(handle);
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
}

#[test]
fn handle_keeps_channel_buffers_separate() {
    let (mut handle, _) = counting_handle(1);
    assert!(handle.lines(Channel::Data, b"{\"latitude\":").is_empty());
    assert_eq!(
        handle.lines(Channel::Control, b"CONNECTED\n"),
        vec![RawLine::Complete("CONNECTED".to_string())]
    );
    assert_eq!(
        handle.lines(Channel::Data, b"1}\n"),
        vec![RawLine::Complete("{\"latitude\":1}".to_string())]
    );
}

#[test]
fn handle_bounds_early_data() {
    let (mut handle, _) = counting_handle(1);
    for idx in 0..EARLY_DATA_CAPACITY {
        assert!(handle.hold_early_data(RawLine::Complete(format!("{idx}"))));
    }
    assert!(!handle.hold_early_data(RawLine::Complete("overflow".to_string())));
    let held = handle.take_early_data();
    assert_eq!(held.len(), EARLY_DATA_CAPACITY);
    assert_eq!(held[0], RawLine::Complete("0".to_string()));
    assert!(handle.take_early_data().is_empty());
}

#[test]
fn handle_detects_missing_python_module() {
    let (mut handle, _) = counting_handle(1);
    handle.note_control_text("Traceback (most recent call last):");
    assert!(!handle.missing_prerequisite());
    handle.note_control_text("ModuleNotFoundError: No module named 'bluetooth'");
    assert!(handle.missing_prerequisite());
}

#[test]
fn missing_binary_is_a_spawn_error() {
    let config = BridgeConfig {
        worker_cmd: "/nonexistent/fixbridge-worker".to_string(),
        worker_args: Vec::new(),
        ..BridgeConfig::default()
    };
    let mut launcher = ProcessLauncher::new(&config);
    let (tx, _rx) = unbounded();
    let err = match launcher.launch("AA:BB:CC:DD:EE:FF", WorkerSink::new(1, tx)) {
        Err(err) => err,
        Ok(_) => panic!("launching a missing binary should fail"),
    };
    assert_eq!(err.command, "/nonexistent/fixbridge-worker");
    assert!(err.to_string().contains("failed to start worker"));
}

// -------------------------------------------------------------------------
// Real processes (unix only)
// -------------------------------------------------------------------------

#[cfg(unix)]
fn write_stub_script(contents: &str) -> std::path::PathBuf {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{SystemTime, UNIX_EPOCH};

    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    path.push(format!("fixbridge_worker_stub_{nanos}.sh"));
    fs::write(&path, contents).expect("write stub");
    let mut perms = fs::metadata(&path).expect("stat stub").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod stub");
    path
}

#[cfg(unix)]
fn stub_launcher(script: &std::path::Path, grace: Duration) -> ProcessLauncher {
    let config = BridgeConfig {
        worker_cmd: "/bin/sh".to_string(),
        worker_args: vec![script.display().to_string()],
        terminate_grace: grace,
        ..BridgeConfig::default()
    };
    ProcessLauncher::new(&config)
}

/// Collect messages until the worker reports its exit.
#[cfg(unix)]
fn collect_until_exit(rx: &Receiver<WorkerMessage>, timeout: Duration) -> Vec<WorkerMessage> {
    let deadline = Instant::now() + timeout;
    let mut messages = Vec::new();
    while let Ok(message) = rx.recv_deadline(deadline) {
        let done = matches!(message.output, WorkerOutput::Exited { .. });
        messages.push(message);
        if done {
            break;
        }
    }
    messages
}

#[cfg(unix)]
fn channel_text(messages: &[WorkerMessage], wanted: Channel) -> String {
    let mut bytes = Vec::new();
    for message in messages {
        if let WorkerOutput::Chunk { channel, bytes: chunk } = &message.output {
            if *channel == wanted {
                bytes.extend_from_slice(chunk);
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(unix)]
#[test]
fn process_worker_streams_both_channels_before_exit() {
    let script = write_stub_script(
        "echo \"CONNECTING:$1\" >&2\n\
         echo CONNECTED >&2\n\
         echo '{\"latitude\":37.7749,\"longitude\":-122.4194}'\n\
         exit 3\n",
    );
    let mut launcher = stub_launcher(&script, Duration::from_secs(2));
    let (tx, rx) = unbounded();
    let control = launcher
        .launch("AA:BB:CC:DD:EE:FF", WorkerSink::new(4, tx))
        .expect("stub launches");
    assert!(control.pid().is_some());

    let messages = collect_until_exit(&rx, Duration::from_secs(5));
    let _ = std::fs::remove_file(&script);

    assert!(messages.iter().all(|message| message.generation == 4));
    assert_eq!(
        messages.last().map(|message| &message.output),
        Some(&WorkerOutput::Exited { code: Some(3) })
    );
    assert_eq!(
        channel_text(&messages, Channel::Control),
        "CONNECTING:AA:BB:CC:DD:EE:FF\nCONNECTED\n"
    );
    assert_eq!(
        channel_text(&messages, Channel::Data),
        "{\"latitude\":37.7749,\"longitude\":-122.4194}\n"
    );
}

#[cfg(unix)]
#[test]
fn process_worker_terminates_with_sigterm() {
    let script = write_stub_script("echo CONNECTED >&2\nexec sleep 30\n");
    let mut launcher = stub_launcher(&script, Duration::from_secs(2));
    let (tx, rx) = unbounded();
    let mut control = launcher
        .launch("AA:BB:CC:DD:EE:FF", WorkerSink::new(1, tx))
        .expect("stub launches");

    // Wait for the worker to be up before signalling it.
    let first = rx.recv_timeout(Duration::from_secs(5)).expect("first output");
    assert!(matches!(first.output, WorkerOutput::Chunk { .. }));

    let started = Instant::now();
    control.terminate();
    control.terminate();
    let messages = collect_until_exit(&rx, Duration::from_secs(5));
    let _ = std::fs::remove_file(&script);

    assert_eq!(
        messages.last().map(|message| &message.output),
        Some(&WorkerOutput::Exited { code: None })
    );
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[cfg(unix)]
#[test]
fn process_worker_escalates_to_sigkill_after_grace() {
    let script = write_stub_script(
        "trap '' TERM\n\
         echo READY >&2\n\
         while true; do sleep 1; done\n",
    );
    let mut launcher = stub_launcher(&script, Duration::from_millis(200));
    let (tx, rx) = unbounded();
    let mut control = launcher
        .launch("AA:BB:CC:DD:EE:FF", WorkerSink::new(1, tx))
        .expect("stub launches");
    let _ = rx.recv_timeout(Duration::from_secs(5)).expect("ready line");

    control.terminate();
    let messages = collect_until_exit(&rx, Duration::from_secs(5));
    let _ = std::fs::remove_file(&script);

    assert_eq!(
        messages.last().map(|message| &message.output),
        Some(&WorkerOutput::Exited { code: None })
    );
}

#[cfg(unix)]
#[test]
fn terminating_an_exited_worker_is_a_no_op() {
    let script = write_stub_script("exit 0\n");
    let mut launcher = stub_launcher(&script, Duration::from_secs(2));
    let (tx, rx) = unbounded();
    let mut control = launcher
        .launch("AA:BB:CC:DD:EE:FF", WorkerSink::new(1, tx))
        .expect("stub launches");
    let messages = collect_until_exit(&rx, Duration::from_secs(5));
    let _ = std::fs::remove_file(&script);
    assert_eq!(
        messages.last().map(|message| &message.output),
        Some(&WorkerOutput::Exited { code: Some(0) })
    );
    control.terminate();
}
