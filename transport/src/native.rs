//! Boundary with the engine's native event representation
//!
//! The engine raises events as a bitmask whose meaning depends on the class of broadcaster that
//! raised it, plus an untyped payload. Those are converted into an [`EventKind`] exactly once,
//! here, and never travel further into the crate.
use eyre::{WrapErr, bail};

use crate::{
    bus::Broadcaster,
    events::{EventKind, Prompt, Source},
    types::{
        BreakpointEvent, BreakpointEventType, BreakpointId, BreakpointLocation, ProcessId,
        ProcessState,
    },
};

/// Bits raised by an IOChannel broadcaster
pub mod io_channel {
    pub const HAS_USER_INPUT: u32 = 1 << 0;
    pub const USER_INTERRUPT: u32 = 1 << 1;
    pub const THREAD_SHOULD_EXIT: u32 = 1 << 2;
    pub const THREAD_DID_START: u32 = 1 << 3;
    pub const THREAD_DID_EXIT: u32 = 1 << 4;
}

/// Bits raised by a driver broadcaster
pub mod driver {
    pub const THREAD_SHOULD_EXIT: u32 = 1 << 0;
    pub const THREAD_DID_START: u32 = 1 << 1;
    pub const READY_FOR_INPUT: u32 = 1 << 2;
}

/// Bits raised by the command interpreter broadcaster
pub mod interpreter {
    pub const THREAD_SHOULD_EXIT: u32 = 1 << 0;
    pub const RESET_PROMPT: u32 = 1 << 1;
    pub const QUIT_COMMAND_RECEIVED: u32 = 1 << 2;
    pub const ASYNC_OUTPUT_DATA: u32 = 1 << 3;
    pub const ASYNC_ERROR_DATA: u32 = 1 << 4;
}

/// Bits raised by process broadcasters
pub mod process {
    pub const STATE_CHANGED: u32 = 1 << 0;
    pub const INTERRUPT: u32 = 1 << 1;
    pub const STDOUT: u32 = 1 << 2;
    pub const STDERR: u32 = 1 << 3;
}

/// Bits raised by target broadcasters, and the breakpoint event types carried with them
pub mod target {
    pub const BREAKPOINT_CHANGED: u32 = 1 << 0;

    pub const BREAKPOINT_ADDED: u32 = 1 << 1;
    pub const BREAKPOINT_REMOVED: u32 = 1 << 2;
    pub const BREAKPOINT_LOCATIONS_ADDED: u32 = 1 << 3;
    pub const BREAKPOINT_LOCATIONS_REMOVED: u32 = 1 << 4;
    pub const BREAKPOINT_LOCATIONS_RESOLVED: u32 = 1 << 5;
    pub const BREAKPOINT_ENABLED: u32 = 1 << 6;
    pub const BREAKPOINT_DISABLED: u32 = 1 << 7;
    pub const BREAKPOINT_COMMAND_CHANGED: u32 = 1 << 8;
    pub const BREAKPOINT_CONDITION_CHANGED: u32 = 1 << 9;
    pub const BREAKPOINT_IGNORE_CHANGED: u32 = 1 << 10;
    pub const BREAKPOINT_THREAD_CHANGED: u32 = 1 << 11;
}

/// Untyped data attached to a native event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NativePayload {
    #[default]
    None,
    Text(String),
    Prompt(Prompt),
    Process {
        process: ProcessId,
        state: ProcessState,
        restarted: bool,
    },
    Breakpoint {
        breakpoint: BreakpointId,
        event_type: u32,
        locations: Vec<BreakpointLocation>,
        num_locations: usize,
    },
}

/// An event as the engine raised it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEvent {
    pub source: Source,
    pub bits: u32,
    pub payload: NativePayload,
}

impl NativeEvent {
    pub fn new(source: Source, bits: u32) -> Self {
        Self {
            source,
            bits,
            payload: NativePayload::None,
        }
    }

    pub fn with_payload(mut self, payload: NativePayload) -> Self {
        self.payload = payload;
        self
    }

    fn has(&self, bit: u32) -> bool {
        self.bits & bit != 0
    }

    fn text(self) -> String {
        match self.payload {
            NativePayload::Text(text) => text,
            // a missing string is an empty one
            _ => String::new(),
        }
    }

    fn process_id(&self) -> eyre::Result<ProcessId> {
        match &self.payload {
            NativePayload::Process { process, .. } => Ok(*process),
            other => bail!("process event without a process payload: {other:?}"),
        }
    }
}

impl TryFrom<NativeEvent> for EventKind {
    type Error = eyre::Report;

    fn try_from(native: NativeEvent) -> Result<Self, Self::Error> {
        let bits = native.bits;
        let source = native.source;
        let kind = match source {
            Source::IoChannel => io_channel_kind(native),
            Source::Driver => driver_kind(native),
            Source::Interpreter => interpreter_kind(native),
            Source::Process => process_kind(native),
            Source::Breakpoint => breakpoint_kind(native),
        };
        kind.wrap_err_with(|| format!("converting native {source} event with bits {bits:#x}"))
    }
}

fn io_channel_kind(native: NativeEvent) -> eyre::Result<EventKind> {
    use io_channel::*;

    if native.has(HAS_USER_INPUT) {
        Ok(EventKind::HasUserInput(native.text()))
    } else if native.has(USER_INTERRUPT) {
        Ok(EventKind::UserInterrupt)
    } else if native.has(THREAD_DID_EXIT) {
        Ok(EventKind::ThreadDidExit)
    } else if native.has(THREAD_SHOULD_EXIT) {
        Ok(EventKind::ThreadShouldExit)
    } else if native.has(THREAD_DID_START) {
        Ok(EventKind::ThreadDidStart)
    } else {
        bail!("no known event bit set")
    }
}

fn driver_kind(native: NativeEvent) -> eyre::Result<EventKind> {
    use driver::*;

    if native.has(THREAD_SHOULD_EXIT) {
        Ok(EventKind::ThreadShouldExit)
    } else if native.has(READY_FOR_INPUT) {
        match native.payload {
            NativePayload::Prompt(prompt) => Ok(EventKind::ReadyForInput(prompt)),
            other => bail!("ready for input without a prompt payload: {other:?}"),
        }
    } else if native.has(THREAD_DID_START) {
        Ok(EventKind::ThreadDidStart)
    } else {
        bail!("no known event bit set")
    }
}

fn interpreter_kind(native: NativeEvent) -> eyre::Result<EventKind> {
    use interpreter::*;

    if native.has(QUIT_COMMAND_RECEIVED) {
        Ok(EventKind::QuitCommandReceived)
    } else if native.has(THREAD_SHOULD_EXIT) {
        Ok(EventKind::ThreadShouldExit)
    } else if native.has(ASYNC_ERROR_DATA) {
        Ok(EventKind::AsyncError(native.text()))
    } else if native.has(ASYNC_OUTPUT_DATA) {
        Ok(EventKind::AsyncOutput(native.text()))
    } else if native.has(RESET_PROMPT) {
        Ok(EventKind::InputReaderReactivated)
    } else {
        bail!("no known event bit set")
    }
}

fn process_kind(native: NativeEvent) -> eyre::Result<EventKind> {
    use process::*;

    if native.has(STDOUT) {
        Ok(EventKind::ProcessStdout {
            process: native.process_id()?,
        })
    } else if native.has(STDERR) {
        Ok(EventKind::ProcessStderr {
            process: native.process_id()?,
        })
    } else if native.has(INTERRUPT) {
        Ok(EventKind::ProcessInterrupt {
            process: native.process_id()?,
        })
    } else if native.has(STATE_CHANGED) {
        match native.payload {
            NativePayload::Process {
                process,
                state,
                restarted,
            } => Ok(EventKind::ProcessStateChanged {
                process,
                state,
                restarted,
            }),
            other => bail!("state change without a process payload: {other:?}"),
        }
    } else {
        bail!("no known event bit set")
    }
}

fn breakpoint_kind(native: NativeEvent) -> eyre::Result<EventKind> {
    if !native.has(target::BREAKPOINT_CHANGED) {
        bail!("no known event bit set");
    }

    let NativePayload::Breakpoint {
        breakpoint,
        event_type,
        locations,
        num_locations,
    } = native.payload
    else {
        bail!("breakpoint event without a breakpoint payload");
    };

    Ok(EventKind::BreakpointChanged(BreakpointEvent {
        breakpoint,
        event_type: breakpoint_event_type(event_type)?,
        locations,
        num_locations,
    }))
}

/// Resolve the breakpoint event type bits, in the same priority the driver dispatches them
fn breakpoint_event_type(bits: u32) -> eyre::Result<BreakpointEventType> {
    use target::*;

    const ORDER: [(u32, BreakpointEventType); 11] = [
        (BREAKPOINT_COMMAND_CHANGED, BreakpointEventType::CommandChanged),
        (BREAKPOINT_IGNORE_CHANGED, BreakpointEventType::IgnoreChanged),
        (BREAKPOINT_CONDITION_CHANGED, BreakpointEventType::ConditionChanged),
        (BREAKPOINT_LOCATIONS_RESOLVED, BreakpointEventType::LocationsResolved),
        (BREAKPOINT_ADDED, BreakpointEventType::Added),
        (BREAKPOINT_ENABLED, BreakpointEventType::Enabled),
        (BREAKPOINT_DISABLED, BreakpointEventType::Disabled),
        (BREAKPOINT_REMOVED, BreakpointEventType::Removed),
        (BREAKPOINT_LOCATIONS_ADDED, BreakpointEventType::LocationsAdded),
        (BREAKPOINT_LOCATIONS_REMOVED, BreakpointEventType::LocationsRemoved),
        (BREAKPOINT_THREAD_CHANGED, BreakpointEventType::ThreadChanged),
    ];

    ORDER
        .iter()
        .find(|(bit, _)| bits & bit != 0)
        .map(|(_, event_type)| *event_type)
        .ok_or_else(|| eyre::eyre!("unknown breakpoint event type {bits:#x}"))
}

impl Broadcaster {
    /// Convert a native event and broadcast the result
    pub fn broadcast_native(&self, native: NativeEvent) -> eyre::Result<usize> {
        eyre::ensure!(
            native.source == self.source(),
            "native {} event raised on {} broadcaster {}",
            native.source,
            self.source(),
            self.name()
        );
        let kind = EventKind::try_from(native)?;
        Ok(self.broadcast(kind))
    }
}
