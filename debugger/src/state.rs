use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

/// Lifecycle of a [`crate::Driver`] as seen by its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    NotStarted = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

/// Where the driver thread is in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriverPhase {
    Idle = 0,
    Starting = 1,
    WaitingForIoChannel = 2,
    Dispatching = 3,
    Done = 4,
}

impl fmt::Display for DriverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriverPhase::Idle => "idle",
            DriverPhase::Starting => "starting",
            DriverPhase::WaitingForIoChannel => "waiting for io channel",
            DriverPhase::Dispatching => "dispatching",
            DriverPhase::Done => "done",
        };
        f.write_str(s)
    }
}

/// State shared between the driver thread and its handle
#[derive(Debug)]
pub(crate) struct SharedState {
    run_state: AtomicU8,
    phase: AtomicU8,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            run_state: AtomicU8::new(RunState::NotStarted as u8),
            phase: AtomicU8::new(DriverPhase::Idle as u8),
        }
    }

    pub(crate) fn run_state(&self) -> RunState {
        match self.run_state.load(Ordering::SeqCst) {
            0 => RunState::NotStarted,
            1 => RunState::Running,
            2 => RunState::Stopping,
            _ => RunState::Stopped,
        }
    }

    pub(crate) fn set_run_state(&self, state: RunState) {
        tracing::debug!(?state, "run state changed");
        self.run_state.store(state as u8, Ordering::SeqCst);
    }

    /// Move to `to` only if currently in `from`
    pub(crate) fn transition(&self, from: RunState, to: RunState) -> bool {
        self.run_state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn phase(&self) -> DriverPhase {
        match self.phase.load(Ordering::SeqCst) {
            0 => DriverPhase::Idle,
            1 => DriverPhase::Starting,
            2 => DriverPhase::WaitingForIoChannel,
            3 => DriverPhase::Dispatching,
            _ => DriverPhase::Done,
        }
    }

    pub(crate) fn set_phase(&self, phase: DriverPhase) {
        tracing::debug!(%phase, "driver phase changed");
        self.phase.store(phase as u8, Ordering::SeqCst);
    }
}
