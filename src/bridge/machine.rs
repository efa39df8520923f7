//! Connection state machine: the single writer of bridge state.
//!
//! Every input (caller commands, worker output, worker exit, timer expiry) is
//! handled by one `&mut self` method call on the machine thread, so transitions
//! never interleave. After each input the machine publishes a snapshot into
//! [`Shared`] for the facade's accessors.

use crossbeam_channel::{select, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::backoff::ReconnectPolicy;
use super::error::BridgeError;
use super::events::BridgeEvent;
use super::state::{ConnectionState, DisconnectReason, Session, SessionStats, Shared};
use crate::config::BridgeConfig;
use crate::fix::{now_epoch_ms, validate_fix, Fix};
use crate::protocol::{decode_data_line, snippet, ControlToken, DataLine, RawLine};
use crate::worker::{
    Channel, Generation, SpawnError, WorkerHandle, WorkerLauncher, WorkerMessage, WorkerOutput,
    WorkerSink,
};
use crate::telemetry::{CONTROL_TARGET, TRANSITION_TARGET};
use crate::{lock_or_recover, log_debug, log_debug_content};

pub(crate) type StartReply = Sender<Result<(), BridgeError>>;

/// Requests from the facade.
pub(crate) enum Command {
    Start {
        address: String,
        auto_reconnect: bool,
        reply: StartReply,
    },
    Stop {
        reply: Sender<()>,
    },
    ResetStats {
        reply: Sender<()>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    ConnectTimeout,
    Reconnect,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    at: Instant,
    kind: TimerKind,
}

/// A connection attempt that never reached `Connected`.
#[derive(Debug)]
enum ConnectFailure {
    Spawn(SpawnError),
    Timeout,
    Refused(String),
    Exited(Option<i32>),
}

impl ConnectFailure {
    fn into_error(self) -> BridgeError {
        match self {
            ConnectFailure::Spawn(err) => BridgeError::Spawn(err),
            ConnectFailure::Timeout => BridgeError::ConnectTimeout,
            ConnectFailure::Refused(reason) => BridgeError::ConnectionFailed(reason),
            ConnectFailure::Exited(code) => BridgeError::WorkerExited(code),
        }
    }
}

pub(crate) struct Machine {
    config: BridgeConfig,
    policy: ReconnectPolicy,
    launcher: Box<dyn WorkerLauncher>,
    worker_tx: Sender<WorkerMessage>,
    events: Sender<BridgeEvent>,
    shared: Arc<Mutex<Shared>>,
    state: ConnectionState,
    session: Option<Session>,
    stats: SessionStats,
    current_fix: Option<Fix>,
    worker: Option<WorkerHandle>,
    timer: Option<Timer>,
    next_generation: Generation,
    pending_start: Option<StartReply>,
}

impl Machine {
    pub(crate) fn new(
        config: BridgeConfig,
        launcher: Box<dyn WorkerLauncher>,
        worker_tx: Sender<WorkerMessage>,
        events: Sender<BridgeEvent>,
        shared: Arc<Mutex<Shared>>,
    ) -> Self {
        let policy = ReconnectPolicy::from_config(&config);
        Self {
            config,
            policy,
            launcher,
            worker_tx,
            events,
            shared,
            state: ConnectionState::Idle,
            session: None,
            stats: SessionStats::default(),
            current_fix: None,
            worker: None,
            timer: None,
            next_generation: 1,
            pending_start: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &ConnectionState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn stats(&self) -> &SessionStats {
        &self.stats
    }

    #[cfg(test)]
    pub(crate) fn current_fix(&self) -> Option<Fix> {
        self.current_fix
    }

    #[cfg(test)]
    pub(crate) fn live_generation(&self) -> Option<Generation> {
        self.worker.as_ref().map(WorkerHandle::generation)
    }

    /// When the pending timer (connect timeout or reconnect delay) fires.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.timer.map(|timer| timer.at)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Returns false once the machine should exit.
    pub(crate) fn handle_command(&mut self, command: Command, now: Instant) -> bool {
        let keep_running = match command {
            Command::Start {
                address,
                auto_reconnect,
                reply,
            } => {
                self.start(address, auto_reconnect, reply, now);
                true
            }
            Command::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
                true
            }
            Command::ResetStats { reply } => {
                self.reset_stats();
                let _ = reply.send(());
                true
            }
            Command::Shutdown => {
                self.stop();
                false
            }
        };
        self.publish();
        keep_running
    }

    fn start(&mut self, address: String, auto_reconnect: bool, reply: StartReply, now: Instant) {
        if self.session.is_some() {
            let _ = reply.send(Err(BridgeError::AlreadyConnected));
            return;
        }
        log_debug(&format!(
            "Bridge: starting session for {address} (auto_reconnect: {auto_reconnect})"
        ));
        self.session = Some(Session::new(
            address,
            auto_reconnect,
            self.policy.max_attempts,
        ));
        self.stats = SessionStats::default();
        self.pending_start = Some(reply);
        self.connect(now);
    }

    fn stop(&mut self) {
        if let Some(reply) = self.pending_start.take() {
            let _ = reply.send(Err(BridgeError::Cancelled));
        }
        if self.session.is_some() {
            log_debug("Bridge: stopping session");
        }
        self.session = None;
        self.timer = None;
        self.release_worker();
        self.transition(ConnectionState::Idle);
    }

    fn reset_stats(&mut self) {
        let connection_time = if self.state.is_connected() {
            Some(now_epoch_ms())
        } else {
            None
        };
        self.stats = SessionStats {
            connection_time,
            ..SessionStats::default()
        };
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    pub(crate) fn handle_timer(&mut self, now: Instant) {
        let Some(timer) = self.timer else {
            return;
        };
        if now < timer.at {
            return;
        }
        self.timer = None;
        match timer.kind {
            TimerKind::ConnectTimeout => {
                if matches!(self.state, ConnectionState::Connecting) {
                    log_debug("Bridge: connect timeout elapsed");
                    self.connect_failed(ConnectFailure::Timeout, now);
                }
            }
            TimerKind::Reconnect => {
                if let ConnectionState::ReconnectWaiting { attempt, .. } = self.state {
                    if let Some(session) = self.session.as_mut() {
                        session.reconnect_attempts = attempt;
                    }
                    log_debug(&format!("Bridge: reconnect attempt {attempt}"));
                    self.connect(now);
                }
            }
        }
        self.publish();
    }

    // ------------------------------------------------------------------
    // Worker output
    // ------------------------------------------------------------------

    pub(crate) fn handle_worker(&mut self, message: WorkerMessage, now: Instant) {
        let live = self.worker.as_ref().map(WorkerHandle::generation);
        if live != Some(message.generation) {
            log_debug(&format!(
                "Bridge: discarding output from retired worker generation {}",
                message.generation
            ));
            return;
        }

        match message.output {
            WorkerOutput::Chunk { channel, bytes } => {
                let lines = match self.worker.as_mut() {
                    Some(worker) => worker.lines(channel, &bytes),
                    None => return,
                };
                for line in lines {
                    // A transition may retire this worker mid-chunk.
                    if self.worker.as_ref().map(WorkerHandle::generation) != live {
                        break;
                    }
                    match channel {
                        Channel::Data => self.on_data_line(line),
                        Channel::Control => self.on_control_line(line, now),
                    }
                }
            }
            WorkerOutput::Exited { code } => self.on_worker_exit(code, now),
        }
        self.publish();
    }

    fn on_data_line(&mut self, line: RawLine) {
        match self.state {
            ConnectionState::Connected => self.accept_data_line(line),
            ConnectionState::Connecting => {
                // stdout and stderr are read independently; a fix can beat CONNECTED.
                let held = self
                    .worker
                    .as_mut()
                    .is_some_and(|worker| worker.hold_early_data(line));
                if !held {
                    log_debug("Bridge: dropping data line received before connect");
                }
            }
            _ => {}
        }
    }

    fn accept_data_line(&mut self, line: RawLine) {
        let text = match line {
            RawLine::Complete(text) => text,
            RawLine::Overflow => {
                self.stats.parse_errors += 1;
                log_debug("Bridge: data line exceeded buffer limit");
                return;
            }
        };
        let record = match decode_data_line(&text) {
            DataLine::Record(record) => record,
            DataLine::Blank => return,
            DataLine::ParseError(bad) => {
                self.stats.parse_errors += 1;
                log_debug_content(&format!("Bridge: unparseable data line: {bad}"));
                return;
            }
        };
        let now_ms = now_epoch_ms();
        match validate_fix(&record, now_ms) {
            Ok(fix) => {
                self.current_fix = Some(fix);
                self.stats.total_updates += 1;
                self.stats.last_update_time = Some(now_ms);
                log_debug_content(&format!(
                    "Bridge: fix {:.6},{:.6}",
                    fix.latitude, fix.longitude
                ));
                self.emit(BridgeEvent::location(&fix));
            }
            Err(rejection) => {
                self.stats.parse_errors += 1;
                log_debug(&format!("Bridge: rejected fix: {rejection}"));
            }
        }
    }

    fn on_control_line(&mut self, line: RawLine, now: Instant) {
        let text = match line {
            RawLine::Complete(text) => text,
            RawLine::Overflow => {
                log_debug("Bridge: control line exceeded buffer limit; dropped");
                return;
            }
        };
        if text.trim().is_empty() {
            return;
        }
        if let Some(worker) = self.worker.as_mut() {
            worker.note_control_text(&text);
        }
        let token = ControlToken::parse(&text);
        tracing::debug!(
            target: CONTROL_TARGET,
            token = token.label(),
            state = self.state.label(),
            "control token"
        );

        match token {
            ControlToken::Connecting { address } => {
                let expected = self.session.as_ref().map(|s| s.device_address.as_str());
                if expected.is_some_and(|expected| !expected.eq_ignore_ascii_case(&address)) {
                    log_debug(&format!(
                        "Bridge: worker reports connecting to {address}, expected {expected:?}"
                    ));
                }
            }
            ControlToken::Connected { detail } => {
                if matches!(self.state, ConnectionState::Connecting) {
                    if let Some(detail) = detail {
                        log_debug(&format!("Bridge: connected ({detail})"));
                    }
                    self.on_connected();
                }
            }
            ControlToken::ConnectionLost { detail } => {
                self.link_ended(DisconnectReason::ConnectionLost(detail), now);
            }
            ControlToken::Disconnected => {
                self.link_ended(DisconnectReason::WorkerDisconnected, now);
            }
            ControlToken::ConnectionFailed { reason } => {
                self.link_ended(DisconnectReason::ConnectionFailed(reason), now);
            }
            ControlToken::ParseError { snippet } => {
                self.stats.parse_errors += 1;
                log_debug_content(&format!("Bridge: worker parse error: {snippet}"));
            }
            token if token.is_diagnostic() => {
                self.stats.errors += 1;
                log_debug(&format!("Bridge: worker diagnostic: {}", snippet(&text)));
            }
            ControlToken::Progress { tag, detail } => {
                log_debug(&format!(
                    "Bridge: worker progress {tag} {}",
                    detail.unwrap_or_default()
                ));
            }
            _ => {
                log_debug(&format!("Bridge: unrecognized control line: {}", snippet(&text)));
            }
        }
    }

    /// A link-ending token: fails a pending connect or drops a live link.
    fn link_ended(&mut self, reason: DisconnectReason, now: Instant) {
        match self.state {
            ConnectionState::Connecting => {
                let failure = match reason {
                    DisconnectReason::ConnectionFailed(reason) => ConnectFailure::Refused(reason),
                    other => ConnectFailure::Refused(other.to_string()),
                };
                self.connect_failed(failure, now);
            }
            ConnectionState::Connected => self.connection_dropped(reason, now),
            _ => {}
        }
    }

    fn on_worker_exit(&mut self, code: Option<i32>, now: Instant) {
        match self.state {
            ConnectionState::Connecting => {
                let missing = self
                    .worker
                    .as_ref()
                    .is_some_and(WorkerHandle::missing_prerequisite);
                let failure = if missing {
                    ConnectFailure::Spawn(SpawnError::new(
                        self.config.worker_cmd.clone(),
                        "worker is missing a required runtime module",
                    ))
                } else {
                    ConnectFailure::Exited(code)
                };
                self.connect_failed(failure, now);
            }
            ConnectionState::Connected => {
                self.connection_dropped(DisconnectReason::WorkerExited(code), now);
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn connect(&mut self, now: Instant) {
        let Some(address) = self.session.as_ref().map(|s| s.device_address.clone()) else {
            self.transition(ConnectionState::Idle);
            return;
        };
        self.release_worker();
        let generation = self.next_generation;
        self.next_generation += 1;
        self.transition(ConnectionState::Connecting);

        let sink = WorkerSink::new(generation, self.worker_tx.clone());
        match self.launcher.launch(&address, sink) {
            Ok(control) => {
                self.worker = Some(WorkerHandle::new(
                    generation,
                    control,
                    self.config.max_line_bytes,
                ));
                self.timer = Some(Timer {
                    at: now + self.config.connect_timeout,
                    kind: TimerKind::ConnectTimeout,
                });
            }
            Err(err) => {
                log_debug(&format!("Bridge: {err}"));
                self.connect_failed(ConnectFailure::Spawn(err), now);
            }
        }
    }

    fn on_connected(&mut self) {
        self.timer = None;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.reconnect_attempts = 0;
        let address = session.device_address.clone();
        self.stats.connection_time = Some(now_epoch_ms());
        self.transition(ConnectionState::Connected);
        self.emit(BridgeEvent::Connected {
            device_address: address,
        });
        if let Some(reply) = self.pending_start.take() {
            let _ = reply.send(Ok(()));
        }

        let early = self
            .worker
            .as_mut()
            .map(WorkerHandle::take_early_data)
            .unwrap_or_default();
        for line in early {
            self.accept_data_line(line);
        }
    }

    fn connect_failed(&mut self, failure: ConnectFailure, now: Instant) {
        self.timer = None;
        self.release_worker();

        if let Some(reply) = self.pending_start.take() {
            // First attempt: report to the caller and end the session unretried.
            let error = failure.into_error();
            log_debug(&format!("Bridge: initial connect failed: {error}"));
            let _ = reply.send(Err(error));
            self.end_session(ConnectionState::Failed { exhausted: false });
            return;
        }

        log_debug(&format!("Bridge: reconnect attempt failed: {failure:?}"));
        self.schedule_reconnect(now);
    }

    fn connection_dropped(&mut self, reason: DisconnectReason, now: Instant) {
        self.timer = None;
        self.release_worker();
        let Some(address) = self.session.as_ref().map(|s| s.device_address.clone()) else {
            self.transition(ConnectionState::Idle);
            return;
        };
        let stats = self
            .stats
            .snapshot(now_epoch_ms(), true, self.current_fix);
        self.transition(ConnectionState::Disconnected { reason });
        self.emit(BridgeEvent::Disconnected {
            device_address: address,
            stats,
        });
        self.schedule_reconnect(now);
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        let Some(session) = self.session.as_ref() else {
            self.transition(ConnectionState::Idle);
            return;
        };
        if !session.auto_reconnect {
            self.end_session(ConnectionState::Failed { exhausted: false });
            return;
        }
        let attempt = session.reconnect_attempts + 1;
        if !self.policy.allows(attempt) {
            let attempts = session.reconnect_attempts;
            log_debug(&format!("Bridge: giving up after {attempts} reconnect attempts"));
            self.end_session(ConnectionState::Failed { exhausted: true });
            self.emit(BridgeEvent::ReconnectFailed { attempts });
            return;
        }
        let delay = self.policy.delay_for(attempt);
        self.timer = Some(Timer {
            at: now + delay,
            kind: TimerKind::Reconnect,
        });
        self.transition(ConnectionState::ReconnectWaiting { attempt, delay });
    }

    fn end_session(&mut self, terminal: ConnectionState) {
        self.session = None;
        self.timer = None;
        self.release_worker();
        self.transition(terminal);
    }

    fn release_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            log_debug(&format!(
                "Bridge: releasing worker generation {} (pid {:?})",
                worker.generation(),
                worker.pid()
            ));
            worker.terminate();
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        tracing::info!(
            target: TRANSITION_TARGET,
            from = %self.state,
            to = %next,
            "bridge state transition"
        );
        log_debug(&format!("Bridge: {} -> {}", self.state, next));
        self.state = next;
    }

    fn emit(&self, event: BridgeEvent) {
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let mut shared = lock_or_recover(&self.shared, "bridge snapshot");
        shared.state = self.state.clone();
        shared.session = self.session.clone();
        shared.stats = self.stats.clone();
        shared.current_fix = self.current_fix;
    }
}

/// Drive the machine until shutdown or until the facade goes away.
pub(crate) fn run_machine(
    mut machine: Machine,
    commands: Receiver<Command>,
    worker_rx: Receiver<WorkerMessage>,
) {
    machine.publish();
    loop {
        let timer = match machine.next_deadline() {
            Some(at) => crossbeam_channel::at(at),
            None => crossbeam_channel::never(),
        };
        select! {
            recv(commands) -> command => match command {
                Ok(command) => {
                    if !machine.handle_command(command, Instant::now()) {
                        break;
                    }
                }
                Err(_) => {
                    machine.handle_command(Command::Shutdown, Instant::now());
                    break;
                }
            },
            recv(worker_rx) -> message => {
                if let Ok(message) = message {
                    machine.handle_worker(message, Instant::now());
                }
            },
            recv(timer) -> _ => machine.handle_timer(Instant::now()),
        }
    }
    log_debug("Bridge: state machine exiting");
}
