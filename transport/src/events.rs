//! Events raised on a [`crate::Broadcaster`]
use std::fmt;

use crate::types::{BreakpointEvent, ProcessId, ProcessState};

/// The closed set of components that raise events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// The driver's own broadcaster
    Driver,
    IoChannel,
    /// The engine's command interpreter
    Interpreter,
    /// Engine process notifications
    Process,
    /// Engine target notifications about breakpoints
    Breakpoint,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::Driver => "driver",
            Source::IoChannel => "io-channel",
            Source::Interpreter => "interpreter",
            Source::Process => "process",
            Source::Breakpoint => "breakpoint",
        };
        f.write_str(s)
    }
}

bitflags::bitflags! {
    /// Subscription mask over [`EventKind`]s
    ///
    /// Every kind owns a distinct bit, so a single mask type serves every source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        const HAS_USER_INPUT = 1 << 0;
        const USER_INTERRUPT = 1 << 1;
        const THREAD_SHOULD_EXIT = 1 << 2;
        const THREAD_DID_START = 1 << 3;
        const THREAD_DID_EXIT = 1 << 4;
        const READY_FOR_INPUT = 1 << 5;
        const QUIT_COMMAND_RECEIVED = 1 << 6;
        const ASYNC_OUTPUT = 1 << 7;
        const ASYNC_ERROR = 1 << 8;
        const INPUT_READER_REACTIVATED = 1 << 9;
        const PROCESS_STATE_CHANGED = 1 << 10;
        const PROCESS_STDOUT = 1 << 11;
        const PROCESS_STDERR = 1 << 12;
        const PROCESS_INTERRUPT = 1 << 13;
        const BREAKPOINT_CHANGED = 1 << 14;
    }
}

/// Context handed to the host when the driver is ready for a new command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub label: String,
    /// Another input reader sits on top of the engine's command reader
    pub nested: bool,
}

/// The semantic type of an event, with its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    HasUserInput(String),
    UserInterrupt,
    ThreadShouldExit,
    ThreadDidStart,
    ThreadDidExit,
    ReadyForInput(Prompt),
    QuitCommandReceived,
    AsyncOutput(String),
    AsyncError(String),
    InputReaderReactivated,
    ProcessStateChanged {
        process: ProcessId,
        state: ProcessState,
        restarted: bool,
    },
    ProcessStdout {
        process: ProcessId,
    },
    ProcessStderr {
        process: ProcessId,
    },
    ProcessInterrupt {
        process: ProcessId,
    },
    BreakpointChanged(BreakpointEvent),
}

impl EventKind {
    pub fn mask(&self) -> EventMask {
        match self {
            EventKind::HasUserInput(_) => EventMask::HAS_USER_INPUT,
            EventKind::UserInterrupt => EventMask::USER_INTERRUPT,
            EventKind::ThreadShouldExit => EventMask::THREAD_SHOULD_EXIT,
            EventKind::ThreadDidStart => EventMask::THREAD_DID_START,
            EventKind::ThreadDidExit => EventMask::THREAD_DID_EXIT,
            EventKind::ReadyForInput(_) => EventMask::READY_FOR_INPUT,
            EventKind::QuitCommandReceived => EventMask::QUIT_COMMAND_RECEIVED,
            EventKind::AsyncOutput(_) => EventMask::ASYNC_OUTPUT,
            EventKind::AsyncError(_) => EventMask::ASYNC_ERROR,
            EventKind::InputReaderReactivated => EventMask::INPUT_READER_REACTIVATED,
            EventKind::ProcessStateChanged { .. } => EventMask::PROCESS_STATE_CHANGED,
            EventKind::ProcessStdout { .. } => EventMask::PROCESS_STDOUT,
            EventKind::ProcessStderr { .. } => EventMask::PROCESS_STDERR,
            EventKind::ProcessInterrupt { .. } => EventMask::PROCESS_INTERRUPT,
            EventKind::BreakpointChanged(_) => EventMask::BREAKPOINT_CHANGED,
        }
    }
}

/// An immutable event, stamped with the source of the broadcaster that raised it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub source: Source,
    pub kind: EventKind,
}

impl Event {
    pub fn new(source: Source, kind: EventKind) -> Self {
        Self { source, kind }
    }

    pub fn mask(&self) -> EventMask {
        self.kind.mask()
    }

    /// True if the event was raised by `source` and its kind is in `mask`
    pub fn matches(&self, source: Source, mask: EventMask) -> bool {
        self.source == source && mask.intersects(self.mask())
    }
}
