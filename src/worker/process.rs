use super::signal::{grace_expired, send_signal, Signal};
use super::{Channel, SpawnError, WorkerControl, WorkerLauncher, WorkerSink};
use crate::config::BridgeConfig;
use crate::log_debug;
use crate::telemetry::WORKER_TARGET;
use std::io::{self, ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const READ_CHUNK_BYTES: usize = 4096;
const GRACE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Launches the worker as a child process: `<command> <args...> <address>`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    command: String,
    args: Vec<String>,
    grace: Duration,
}

impl ProcessLauncher {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            command: config.worker_cmd.clone(),
            args: config.worker_args.clone(),
            grace: config.terminate_grace,
        }
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(
        &mut self,
        address: &str,
        sink: WorkerSink,
    ) -> Result<Box<dyn WorkerControl>, SpawnError> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|err| SpawnError::from_io(&self.command, &err))?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SpawnError::new(&self.command, "failed to capture worker output"));
            }
        };

        let pid = child.id();
        log_debug(&format!(
            "Worker: started pid {pid} (generation {}) for {address}",
            sink.generation()
        ));
        tracing::info!(
            target: WORKER_TARGET,
            pid,
            generation = sink.generation(),
            "worker started"
        );

        let readers = vec![
            spawn_reader(stdout, Channel::Data, sink.clone()),
            spawn_reader(stderr, Channel::Control, sink.clone()),
        ];
        let exited = Arc::new(AtomicBool::new(false));
        spawn_exit_watcher(child, readers, Arc::clone(&exited), sink);

        Ok(Box::new(ProcessWorker {
            pid,
            exited,
            terminate_requested: false,
            grace: self.grace,
        }))
    }
}

pub(super) fn should_retry_read_error(err: &io::Error) -> bool {
    err.kind() == ErrorKind::Interrupted
}

/// Forward raw chunks from one worker stream until EOF.
fn spawn_reader<R>(mut stream: R, channel: Channel, sink: WorkerSink) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = [0u8; READ_CHUNK_BYTES];
        loop {
            match stream.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    let data = buffer.get(..n).unwrap_or(&[]).to_vec();
                    if !sink.chunk(channel, data) {
                        break;
                    }
                }
                Err(err) if should_retry_read_error(&err) => continue,
                Err(err) => {
                    log_debug(&format!("Worker: {channel:?} read error: {err}"));
                    break;
                }
            }
        }
    })
}

/// Reap the child, drain both readers, then report the exit so it always
/// follows the worker's final output.
fn spawn_exit_watcher(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    exited: Arc<AtomicBool>,
    sink: WorkerSink,
) {
    thread::spawn(move || {
        let code = match child.wait() {
            Ok(status) => status.code(),
            Err(err) => {
                log_debug(&format!("Worker: wait failed: {err}"));
                None
            }
        };
        exited.store(true, Ordering::SeqCst);
        for reader in readers {
            let _ = reader.join();
        }
        log_debug(&format!(
            "Worker: generation {} exited with code {code:?}",
            sink.generation()
        ));
        tracing::info!(
            target: WORKER_TARGET,
            generation = sink.generation(),
            code,
            "worker exited"
        );
        let _ = sink.exited(code);
    });
}

struct ProcessWorker {
    pid: u32,
    exited: Arc<AtomicBool>,
    terminate_requested: bool,
    grace: Duration,
}

impl WorkerControl for ProcessWorker {
    fn terminate(&mut self) {
        if self.terminate_requested || self.exited.load(Ordering::SeqCst) {
            return;
        }
        self.terminate_requested = true;
        log_debug(&format!("Worker: sending SIGTERM to pid {}", self.pid));
        tracing::info!(target: WORKER_TARGET, pid = self.pid, "worker terminate requested");
        send_signal(self.pid, Signal::Term);

        let pid = self.pid;
        let grace = self.grace;
        let exited = Arc::clone(&self.exited);
        thread::spawn(move || escalate_after_grace(pid, &exited, grace));
    }

    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }
}

fn escalate_after_grace(pid: u32, exited: &AtomicBool, grace: Duration) {
    let requested_at = Instant::now();
    loop {
        if exited.load(Ordering::SeqCst) {
            return;
        }
        if grace_expired(requested_at, Instant::now(), grace) {
            log_debug(&format!("Worker: pid {pid} ignored SIGTERM; sending SIGKILL"));
            send_signal(pid, Signal::Kill);
            return;
        }
        thread::sleep(GRACE_POLL_INTERVAL);
    }
}
