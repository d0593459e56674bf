//! General types describing the debugger engine, shared by [`crate::events`] and the driver.
use std::{fmt, path::PathBuf};

pub type ProcessId = u64;
pub type ThreadId = u64;
pub type BreakpointId = u32;

/// State of a debugee process as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Invalid,
    Unloaded,
    Connected,
    Attaching,
    Launching,
    Stopped,
    Running,
    Stepping,
    Crashed,
    Detached,
    Exited,
    Suspended,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Invalid => "invalid",
            ProcessState::Unloaded => "unloaded",
            ProcessState::Connected => "connected",
            ProcessState::Attaching => "attaching",
            ProcessState::Launching => "launching",
            ProcessState::Stopped => "stopped",
            ProcessState::Running => "running",
            ProcessState::Stepping => "stepping",
            ProcessState::Crashed => "crashed",
            ProcessState::Detached => "detached",
            ProcessState::Exited => "exited",
            ProcessState::Suspended => "suspended",
        }
    }

    /// States that are only worth a one line status message
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProcessState::Unloaded
                | ProcessState::Connected
                | ProcessState::Attaching
                | ProcessState::Launching
                | ProcessState::Stepping
                | ProcessState::Detached
        )
    }

    /// States in which the debugee is halted and can be inspected
    pub fn is_stopped(&self) -> bool {
        matches!(
            self,
            ProcessState::Stopped | ProcessState::Crashed | ProcessState::Suspended
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a thread is currently stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    Invalid,
    None,
    Trace,
    Breakpoint,
    Watchpoint,
    Signal,
    Exception,
    Exec,
    PlanComplete,
    ThreadExiting,
}

impl StopReason {
    /// The thread was not involved in the stop
    pub fn is_unset(&self) -> bool {
        matches!(self, StopReason::Invalid | StopReason::None)
    }

    /// The thread stopped for a reason the user most likely cares about
    pub fn is_interesting(&self) -> bool {
        matches!(
            self,
            StopReason::Trace
                | StopReason::Breakpoint
                | StopReason::Watchpoint
                | StopReason::Signal
                | StopReason::Exception
                | StopReason::PlanComplete
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Invalid => "invalid",
            StopReason::None => "none",
            StopReason::Trace => "trace",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Watchpoint => "watchpoint",
            StopReason::Signal => "signal",
            StopReason::Exception => "exception",
            StopReason::Exec => "exec",
            StopReason::PlanComplete => "plan complete",
            StopReason::ThreadExiting => "thread exiting",
        };
        f.write_str(s)
    }
}

/// A snapshot of one thread of a stopped process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub stop_reason: StopReason,
    pub valid: bool,
}

impl ThreadInfo {
    pub fn new(id: ThreadId, stop_reason: StopReason) -> Self {
        Self {
            id,
            stop_reason,
            valid: true,
        }
    }
}

/// A resolved source location
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineEntry {
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
}

/// One location of a breakpoint, as seen when the breakpoint event was raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointLocation {
    pub line_entry: Option<LineEntry>,
    pub enabled: bool,
}

/// What happened to a breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointEventType {
    Added,
    Removed,
    LocationsAdded,
    LocationsRemoved,
    LocationsResolved,
    Enabled,
    Disabled,
    CommandChanged,
    ConditionChanged,
    IgnoreChanged,
    ThreadChanged,
}

/// Payload of a breakpoint changed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointEvent {
    pub breakpoint: BreakpointId,
    pub event_type: BreakpointEventType,
    pub locations: Vec<BreakpointLocation>,
    /// Number of locations the event added or removed
    pub num_locations: usize,
}

/// Raw command return status as handed back by the engine's interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReturnStatus(pub u32);

impl ReturnStatus {
    pub const INVALID: ReturnStatus = ReturnStatus(0);
    pub const SUCCESS_FINISH_NO_RESULT: ReturnStatus = ReturnStatus(1);
    pub const SUCCESS_FINISH_RESULT: ReturnStatus = ReturnStatus(2);
    pub const SUCCESS_CONTINUING_NO_RESULT: ReturnStatus = ReturnStatus(3);
    pub const SUCCESS_CONTINUING_RESULT: ReturnStatus = ReturnStatus(4);
    pub const STARTED: ReturnStatus = ReturnStatus(5);
    pub const FAILED: ReturnStatus = ReturnStatus(6);
    pub const QUIT: ReturnStatus = ReturnStatus(7);
}
