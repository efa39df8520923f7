//! Worker supervision: one external process per connection attempt.
//!
//! The bridge never talks to the radio itself. A [`WorkerLauncher`] starts a
//! worker for a device address and wires its stdout/stderr into the bridge's
//! inbound queue as [`WorkerMessage`]s tagged with a generation number. The
//! generation lets the state machine drop output that belongs to a worker it
//! has already let go of.

mod process;
mod signal;
#[cfg(test)]
mod tests;

use crossbeam_channel::Sender;
use std::collections::VecDeque;
use std::fmt;
use std::io;

use crate::protocol::{LineBuffer, RawLine};

pub use process::ProcessLauncher;

/// Monotonic identifier of one worker instance.
pub type Generation = u64;

/// Which worker stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// stdout: JSON fix records.
    Data,
    /// stderr: status/error tokens.
    Control,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutput {
    Chunk { channel: Channel, bytes: Vec<u8> },
    /// Process exited; `None` when it was killed by a signal.
    Exited { code: Option<i32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerMessage {
    pub generation: Generation,
    pub output: WorkerOutput,
}

/// Write side of the inbound queue handed to one worker instance.
#[derive(Clone)]
pub struct WorkerSink {
    generation: Generation,
    tx: Sender<WorkerMessage>,
}

impl WorkerSink {
    pub fn new(generation: Generation, tx: Sender<WorkerMessage>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Forward a raw chunk. Returns false once the bridge has gone away.
    pub fn chunk(&self, channel: Channel, bytes: Vec<u8>) -> bool {
        self.send(WorkerOutput::Chunk { channel, bytes })
    }

    pub fn exited(&self, code: Option<i32>) -> bool {
        self.send(WorkerOutput::Exited { code })
    }

    fn send(&self, output: WorkerOutput) -> bool {
        self.tx
            .send(WorkerMessage {
                generation: self.generation,
                output,
            })
            .is_ok()
    }
}

/// The worker executable could not be started.
#[derive(Debug)]
pub struct SpawnError {
    pub command: String,
    pub message: String,
}

impl SpawnError {
    pub fn new(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            message: message.into(),
        }
    }

    pub(crate) fn from_io(command: &str, err: &io::Error) -> Self {
        Self::new(command, err.to_string())
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to start worker '{}': {}", self.command, self.message)
    }
}

impl std::error::Error for SpawnError {}

/// Termination capability for one running worker.
pub trait WorkerControl: Send {
    /// Ask the worker to stop. Must be idempotent and must not block for long.
    fn terminate(&mut self);

    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Starts workers. Swap in a native radio binding or a test fake here.
pub trait WorkerLauncher: Send {
    fn launch(
        &mut self,
        address: &str,
        sink: WorkerSink,
    ) -> Result<Box<dyn WorkerControl>, SpawnError>;
}

/// Data lines held while a worker is still confirming its connection.
const EARLY_DATA_CAPACITY: usize = 64;

/// State machine's view of the live worker: its control plus per-channel buffers.
pub struct WorkerHandle {
    generation: Generation,
    control: Box<dyn WorkerControl>,
    data_lines: LineBuffer,
    control_lines: LineBuffer,
    early_data: VecDeque<RawLine>,
    missing_prerequisite: bool,
    terminated: bool,
}

impl WorkerHandle {
    pub fn new(generation: Generation, control: Box<dyn WorkerControl>, max_line_bytes: usize) -> Self {
        Self {
            generation,
            control,
            data_lines: LineBuffer::new(max_line_bytes),
            control_lines: LineBuffer::new(max_line_bytes),
            early_data: VecDeque::new(),
            missing_prerequisite: false,
            terminated: false,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn pid(&self) -> Option<u32> {
        self.control.pid()
    }

    /// Split a chunk into complete lines using this handle's channel buffer.
    pub fn lines(&mut self, channel: Channel, bytes: &[u8]) -> Vec<RawLine> {
        match channel {
            Channel::Data => self.data_lines.push(bytes),
            Channel::Control => self.control_lines.push(bytes),
        }
    }

    /// Hold a data line that arrived before the connection was confirmed.
    /// Returns false when the holding area is full and the line was dropped.
    pub fn hold_early_data(&mut self, line: RawLine) -> bool {
        if self.early_data.len() >= EARLY_DATA_CAPACITY {
            return false;
        }
        self.early_data.push_back(line);
        true
    }

    pub fn take_early_data(&mut self) -> Vec<RawLine> {
        self.early_data.drain(..).collect()
    }

    pub fn note_control_text(&mut self, text: &str) {
        if indicates_missing_prerequisite(text) {
            self.missing_prerequisite = true;
        }
    }

    /// The worker complained about a missing runtime module before connecting.
    pub fn missing_prerequisite(&self) -> bool {
        self.missing_prerequisite
    }

    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.control.terminate();
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Interpreter errors that mean the worker cannot run at all on this host.
pub(crate) fn indicates_missing_prerequisite(text: &str) -> bool {
    text.contains("ModuleNotFoundError")
        || text.contains("No module named")
        || text.contains("ImportError")
}
