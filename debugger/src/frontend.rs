//! The host side of the driver
//!
//! Callbacks are invoked from the driver and IO channel threads. Implementations are responsible
//! for marshalling onto their own UI thread.
use transport::{
    Prompt,
    types::{LineEntry, ProcessId, ProcessState, ThreadId},
};

use crate::{breakpoints::BreakpointUpdate, engine::Process};

pub trait Frontend: Send + Sync {
    /// Display text produced by the engine, a command or the debugee
    fn write(&self, text: &str);

    /// The driver is ready for a new command
    ///
    /// Returns whether a prompt was actually shown.
    fn prompt_for_input(&self, prompt: &Prompt) -> bool {
        let _ = prompt;
        false
    }

    fn on_process_stopped(&self, process: &dyn Process, state: ProcessState) {
        let _ = (process, state);
    }

    fn on_breakpoint_changed(&self, update: &BreakpointUpdate) {
        let _ = update;
    }

    /// The driver has torn down its session
    fn on_exit(&self) {}
}

/// Notifications queued by a [`ChannelFrontend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendEvent {
    Output(String),
    Prompt(Prompt),
    ProcessStopped {
        process: ProcessId,
        state: ProcessState,
        thread: Option<ThreadId>,
        location: Option<LineEntry>,
    },
    Breakpoint(BreakpointUpdate),
    Exited,
}

/// Frontend that queues every notification for a UI thread to drain
pub struct ChannelFrontend {
    tx: crossbeam_channel::Sender<FrontendEvent>,
}

impl ChannelFrontend {
    pub fn new() -> (Self, crossbeam_channel::Receiver<FrontendEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    fn emit(&self, event: FrontendEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(event = ?e.into_inner(), "frontend receiver dropped");
                false
            }
        }
    }
}

impl Frontend for ChannelFrontend {
    fn write(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.emit(FrontendEvent::Output(text.to_string()));
    }

    fn prompt_for_input(&self, prompt: &Prompt) -> bool {
        self.emit(FrontendEvent::Prompt(prompt.clone()))
    }

    fn on_process_stopped(&self, process: &dyn Process, state: ProcessState) {
        let (thread, location) = if state == ProcessState::Exited {
            (None, None)
        } else {
            (
                process.selected_thread().map(|t| t.id),
                process.selected_line_entry(),
            )
        };
        self.emit(FrontendEvent::ProcessStopped {
            process: process.id(),
            state,
            thread,
            location,
        });
    }

    fn on_breakpoint_changed(&self, update: &BreakpointUpdate) {
        self.emit(FrontendEvent::Breakpoint(update.clone()));
    }

    fn on_exit(&self) {
        self.emit(FrontendEvent::Exited);
    }
}
