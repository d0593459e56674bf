//! Abstraction over the debugger engine
//!
//! The driver never talks to a concrete engine. It is handed an [`Engine`] which it asks for a
//! [`Session`] on its own thread, and from then on the session is only ever touched by that
//! thread.
use std::{
    io::Read,
    ops::{Deref, DerefMut},
};

use transport::{
    Broadcaster, ListenerClosed, Source,
    types::{LineEntry, ProcessId, ProcessState, ReturnStatus, ThreadId, ThreadInfo},
};

use crate::io_channel::IoChannelJoined;

/// Creates sessions on the driver thread
pub trait Engine: Send + 'static {
    fn create_session(&mut self) -> eyre::Result<Box<dyn Session>>;
}

/// The broadcasters an engine session raises events on
#[derive(Debug, Clone)]
pub struct EngineBroadcasters {
    pub interpreter: Broadcaster,
    pub process: Broadcaster,
    pub breakpoint: Broadcaster,
}

impl EngineBroadcasters {
    pub fn new() -> Self {
        Self {
            interpreter: Broadcaster::new("lldb.command-interpreter", Source::Interpreter),
            process: Broadcaster::new("lldb.process", Source::Process),
            breakpoint: Broadcaster::new("lldb.target", Source::Breakpoint),
        }
    }

    pub fn for_source(&self, source: Source) -> Option<&Broadcaster> {
        match source {
            Source::Interpreter => Some(&self.interpreter),
            Source::Process => Some(&self.process),
            Source::Breakpoint => Some(&self.breakpoint),
            Source::Driver | Source::IoChannel => None,
        }
    }
}

impl Default for EngineBroadcasters {
    fn default() -> Self {
        Self::new()
    }
}

/// Location of an engine init file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitFile {
    Home,
    CurrentWorkingDirectory,
}

/// What the engine's interpreter hands back for a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommandReturn {
    pub output: String,
    pub error: String,
    pub status: ReturnStatus,
}

/// A live debugger session
pub trait Session {
    fn broadcasters(&self) -> &EngineBroadcasters;

    /// Run a command through the engine's command interpreter
    fn handle_command(&mut self, command: &str, add_to_history: bool) -> RawCommandReturn;

    fn source_init_file(&mut self, location: InitFile) -> RawCommandReturn;

    /// The command reader is still on the engine's input reader stack
    fn input_reader_active(&self) -> bool;

    /// The command reader is on top of the engine's input reader stack
    fn input_reader_is_top(&self) -> bool;

    /// Interrupt the running command or process
    fn interrupt(&mut self);

    /// Notify the engine that unsolicited output was written to the host
    fn async_output_written(&mut self) {}

    fn selected_process(&mut self) -> Option<&mut dyn Process>;

    /// Stream of the engine's own output, which closes when the session is destroyed
    fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        None
    }

    fn destroy(self: Box<Self>);
}

/// A debugee process
pub trait Process {
    fn id(&self) -> ProcessId;
    fn state(&self) -> ProcessState;

    /// Read at most `max` bytes of buffered stdout, empty when there is none
    fn read_stdout(&mut self, max: usize) -> String;

    /// Read at most `max` bytes of buffered stderr, empty when there is none
    fn read_stderr(&mut self, max: usize) -> String;

    fn threads(&self) -> Vec<ThreadInfo>;
    fn selected_thread(&self) -> Option<ThreadInfo>;
    fn set_selected_thread(&mut self, thread: ThreadId) -> bool;

    /// Source location of the selected frame of the selected thread
    fn selected_line_entry(&self) -> Option<LineEntry>;
}

/// Exclusive owner of the driver's session
///
/// The session can only be destroyed once both the driver's listener and the IO channel are
/// gone, since both hold subscriptions to the session's broadcasters.
pub struct OwnedSession {
    inner: Box<dyn Session>,
}

impl OwnedSession {
    pub(crate) fn new(inner: Box<dyn Session>) -> Self {
        Self { inner }
    }

    pub(crate) fn destroy(self, _listener: ListenerClosed, _io_channel: IoChannelJoined) {
        tracing::debug!("destroying session");
        self.inner.destroy();
    }
}

impl Deref for OwnedSession {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for OwnedSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}
