use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::error::BridgeError;
use super::events::{spawn_dispatcher, BridgeEvent, BridgeObserver, ObserverRegistry};
use super::machine::{run_machine, Command, Machine};
use super::state::{ConnectionInfo, ConnectionState, Shared, StatsSnapshot};
use crate::address::is_valid_device_address;
use crate::config::BridgeConfig;
use crate::fix::{now_epoch_ms, Fix};
use crate::worker::{ProcessLauncher, WorkerLauncher};
use crate::{lock_or_recover, log_debug};

/// Public entry point: one bridge drives at most one device session at a time.
///
/// All mutation happens on an internal state-machine thread; methods here send
/// it a command or read the snapshot it publishes after every transition.
pub struct Bridge {
    commands: Sender<Command>,
    shared: Arc<Mutex<Shared>>,
    registry: Arc<Mutex<ObserverRegistry>>,
    machine_thread: Option<JoinHandle<()>>,
    dispatcher_thread: Option<JoinHandle<()>>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, launcher: Box<dyn WorkerLauncher>) -> Self {
        let (commands, command_rx) = unbounded();
        let (worker_tx, worker_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let shared = Arc::new(Mutex::new(Shared::default()));
        let registry = Arc::new(Mutex::new(ObserverRegistry::default()));

        let machine = Machine::new(config, launcher, worker_tx, event_tx, Arc::clone(&shared));
        let machine_thread = thread::spawn(move || run_machine(machine, command_rx, worker_rx));
        let dispatcher_thread = spawn_dispatcher(event_rx, Arc::clone(&registry));

        Self {
            commands,
            shared,
            registry,
            machine_thread: Some(machine_thread),
            dispatcher_thread: Some(dispatcher_thread),
        }
    }

    /// Bridge backed by real worker processes.
    pub fn with_process_worker(config: BridgeConfig) -> Self {
        let launcher = ProcessLauncher::new(&config);
        Self::new(config, Box::new(launcher))
    }

    /// Start a session and block until the first connection attempt resolves.
    ///
    /// Fails with `AlreadyConnected` while another session is active. A
    /// failed first attempt is reported here and never retried.
    pub fn start(&self, address: &str, auto_reconnect: bool) -> Result<(), BridgeError> {
        if !is_valid_device_address(address) {
            return Err(BridgeError::InvalidAddressFormat(address.to_string()));
        }
        let (reply, result) = bounded(1);
        self.send(Command::Start {
            address: address.to_string(),
            auto_reconnect,
            reply,
        })?;
        result.recv().map_err(|_| BridgeError::BridgeClosed)?
    }

    /// End the session. Safe to call repeatedly or with no session.
    pub fn stop(&self) -> Result<(), BridgeError> {
        let (reply, done) = bounded(1);
        self.send(Command::Stop { reply })?;
        done.recv().map_err(|_| BridgeError::BridgeClosed)
    }

    /// Zero the counters. `connection_time` restarts if the link is up.
    pub fn reset_stats(&self) -> Result<(), BridgeError> {
        let (reply, done) = bounded(1);
        self.send(Command::ResetStats { reply })?;
        done.recv().map_err(|_| BridgeError::BridgeClosed)
    }

    pub fn current_fix(&self) -> Option<Fix> {
        lock_or_recover(&self.shared, "bridge snapshot").current_fix
    }

    pub fn state(&self) -> ConnectionState {
        lock_or_recover(&self.shared, "bridge snapshot").state.clone()
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        lock_or_recover(&self.shared, "bridge snapshot").connection_info()
    }

    pub fn stats(&self) -> StatsSnapshot {
        lock_or_recover(&self.shared, "bridge snapshot").stats_snapshot(now_epoch_ms())
    }

    /// Register a callback run on the dispatcher thread for every event.
    pub fn add_observer(&self, observer: Arc<dyn BridgeObserver>) {
        lock_or_recover(&self.registry, "observer registry").add_observer(observer);
    }

    /// Receive events on a channel. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<BridgeEvent> {
        let (tx, rx) = unbounded();
        lock_or_recover(&self.registry, "observer registry").add_subscriber(tx);
        rx
    }

    fn send(&self, command: Command) -> Result<(), BridgeError> {
        self.commands
            .send(command)
            .map_err(|_| BridgeError::BridgeClosed)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        // The machine owns the event sender, so the dispatcher drains and exits after it.
        if let Some(handle) = self.machine_thread.take() {
            if handle.join().is_err() {
                log_debug("Bridge: state machine thread panicked");
            }
        }
        if let Some(handle) = self.dispatcher_thread.take() {
            if handle.join().is_err() {
                log_debug("Bridge: dispatcher thread panicked");
            }
        }
    }
}
