//! A scripted engine for driving the debugger without a real one
//!
//! Commands get canned responses, and events can be raised on the engine's broadcasters from
//! any thread. Everything the driver does to the engine is recorded for later inspection.
use std::{
    collections::HashMap,
    io::Read,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use transport::{
    EventKind, EventMask, Source,
    types::{LineEntry, ProcessId, ProcessState, ReturnStatus, ThreadId, ThreadInfo},
};

use crate::engine::{
    Engine, EngineBroadcasters, InitFile, Process, RawCommandReturn, Session,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Response {
    ret: RawCommandReturn,
    raise: Vec<(Source, EventKind)>,
}

struct Script {
    responses: HashMap<String, Response>,
    init_file_results: HashMap<InitFile, RawCommandReturn>,
    input_reader_active: bool,
    input_reader_top: bool,
    process: Option<ScriptedProcess>,
    output: Option<Box<dyn Read + Send>>,
    session_error: Option<String>,

    commands: Vec<(String, bool)>,
    init_files_sourced: Vec<InitFile>,
    interrupts: usize,
    async_notifications: usize,
    sessions_destroyed: usize,
    listeners_at_destroy: Vec<bool>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            responses: HashMap::new(),
            init_file_results: HashMap::new(),
            input_reader_active: true,
            input_reader_top: true,
            process: None,
            output: None,
            session_error: None,
            commands: Vec::new(),
            init_files_sourced: Vec::new(),
            interrupts: 0,
            async_notifications: 0,
            sessions_destroyed: 0,
            listeners_at_destroy: Vec::new(),
        }
    }
}

impl Script {
    fn response(&self, command: &str) -> (RawCommandReturn, Vec<(Source, EventKind)>) {
        if let Some(response) = self.responses.get(command) {
            return (response.ret.clone(), response.raise.clone());
        }

        if command.trim() == "quit" {
            let ret = RawCommandReturn {
                output: String::new(),
                error: String::new(),
                status: ReturnStatus::QUIT,
            };
            return (ret, vec![(Source::Interpreter, EventKind::QuitCommandReceived)]);
        }

        let name = command.split_whitespace().next().unwrap_or_default();
        let ret = RawCommandReturn {
            output: String::new(),
            error: format!("error: '{name}' is not a valid command.\n"),
            status: ReturnStatus::FAILED,
        };
        (ret, Vec::new())
    }
}

/// Engine with canned command responses
///
/// Clones share the same script, so a test can keep one to inspect what the driver did after
/// handing another to [`crate::Driver::start`].
#[derive(Clone)]
pub struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
    broadcasters: EngineBroadcasters,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            broadcasters: EngineBroadcasters::new(),
        }
    }

    pub fn broadcasters(&self) -> &EngineBroadcasters {
        &self.broadcasters
    }

    /// Answer `command` with the given output, error and status
    pub fn respond(
        &self,
        command: impl Into<String>,
        output: impl Into<String>,
        error: impl Into<String>,
        status: ReturnStatus,
    ) {
        self.respond_and_raise(command, output, error, status, Vec::new());
    }

    /// Answer `command`, then raise `events` as the engine would while running it
    pub fn respond_and_raise(
        &self,
        command: impl Into<String>,
        output: impl Into<String>,
        error: impl Into<String>,
        status: ReturnStatus,
        events: Vec<(Source, EventKind)>,
    ) {
        let response = Response {
            ret: RawCommandReturn {
                output: output.into(),
                error: error.into(),
                status,
            },
            raise: events,
        };
        lock(&self.script)
            .responses
            .insert(command.into(), response);
    }

    /// Raise an event on one of the engine's broadcasters
    pub fn raise(&self, source: Source, kind: EventKind) -> usize {
        raise(&self.broadcasters, source, kind)
    }

    pub fn set_input_reader(&self, active: bool, top: bool) {
        let mut script = lock(&self.script);
        script.input_reader_active = active;
        script.input_reader_top = top;
    }

    pub fn set_process(&self, process: Option<ScriptedProcess>) {
        lock(&self.script).process = process;
    }

    /// Stream handed to the driver as the engine's own output
    pub fn set_output(&self, output: impl Read + Send + 'static) {
        lock(&self.script).output = Some(Box::new(output));
    }

    /// Make session creation fail with `message`
    pub fn fail_session(&self, message: impl Into<String>) {
        lock(&self.script).session_error = Some(message.into());
    }

    pub fn set_init_file_result(&self, location: InitFile, ret: RawCommandReturn) {
        lock(&self.script).init_file_results.insert(location, ret);
    }

    pub fn session(&self) -> ScriptedSession {
        ScriptedSession {
            script: Arc::clone(&self.script),
            broadcasters: self.broadcasters.clone(),
            process: None,
        }
    }

    /// Every command run so far with its history flag
    pub fn commands(&self) -> Vec<(String, bool)> {
        lock(&self.script).commands.clone()
    }

    pub fn init_files_sourced(&self) -> Vec<InitFile> {
        lock(&self.script).init_files_sourced.clone()
    }

    pub fn interrupts(&self) -> usize {
        lock(&self.script).interrupts
    }

    pub fn async_notifications(&self) -> usize {
        lock(&self.script).async_notifications
    }

    pub fn sessions_destroyed(&self) -> usize {
        lock(&self.script).sessions_destroyed
    }

    /// For each destroyed session, whether any of its broadcasters still had listeners
    pub fn listeners_at_destroy(&self) -> Vec<bool> {
        lock(&self.script).listeners_at_destroy.clone()
    }
}

impl Engine for ScriptedEngine {
    fn create_session(&mut self) -> eyre::Result<Box<dyn Session>> {
        if let Some(message) = lock(&self.script).session_error.clone() {
            eyre::bail!(message);
        }
        Ok(Box::new(self.session()))
    }
}

fn raise(broadcasters: &EngineBroadcasters, source: Source, kind: EventKind) -> usize {
    match broadcasters.for_source(source) {
        Some(broadcaster) => broadcaster.broadcast(kind),
        None => {
            tracing::warn!(%source, "engine cannot raise events for this source");
            0
        }
    }
}

pub struct ScriptedSession {
    script: Arc<Mutex<Script>>,
    broadcasters: EngineBroadcasters,
    process: Option<ScriptedProcess>,
}

impl Session for ScriptedSession {
    fn broadcasters(&self) -> &EngineBroadcasters {
        &self.broadcasters
    }

    fn handle_command(&mut self, command: &str, add_to_history: bool) -> RawCommandReturn {
        let (ret, events) = {
            let mut script = lock(&self.script);
            script.commands.push((command.to_string(), add_to_history));
            script.response(command)
        };
        for (source, kind) in events {
            raise(&self.broadcasters, source, kind);
        }
        ret
    }

    fn source_init_file(&mut self, location: InitFile) -> RawCommandReturn {
        let mut script = lock(&self.script);
        script.init_files_sourced.push(location);
        script
            .init_file_results
            .get(&location)
            .cloned()
            .unwrap_or(RawCommandReturn {
                output: String::new(),
                error: String::new(),
                status: ReturnStatus::SUCCESS_FINISH_NO_RESULT,
            })
    }

    fn input_reader_active(&self) -> bool {
        lock(&self.script).input_reader_active
    }

    fn input_reader_is_top(&self) -> bool {
        lock(&self.script).input_reader_top
    }

    fn interrupt(&mut self) {
        lock(&self.script).interrupts += 1;
    }

    fn async_output_written(&mut self) {
        lock(&self.script).async_notifications += 1;
    }

    fn selected_process(&mut self) -> Option<&mut dyn Process> {
        self.process = lock(&self.script).process.clone();
        let process: &mut dyn Process = self.process.as_mut()?;
        Some(process)
    }

    fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        lock(&self.script).output.take()
    }

    fn destroy(self: Box<Self>) {
        let listening = [
            &self.broadcasters.interpreter,
            &self.broadcasters.process,
            &self.broadcasters.breakpoint,
        ]
        .iter()
        .any(|b| b.has_listeners(EventMask::all()));

        let mut script = lock(&self.script);
        script.sessions_destroyed += 1;
        script.listeners_at_destroy.push(listening);
    }
}

#[derive(Debug)]
struct ProcessScript {
    state: ProcessState,
    stdout: String,
    stderr: String,
    threads: Vec<ThreadInfo>,
    selected: Option<ThreadId>,
    line_entry: Option<LineEntry>,
}

/// Debugee handle whose clones share state
#[derive(Debug, Clone)]
pub struct ScriptedProcess {
    id: ProcessId,
    inner: Arc<Mutex<ProcessScript>>,
}

impl ScriptedProcess {
    pub fn new(id: ProcessId) -> Self {
        Self {
            id,
            inner: Arc::new(Mutex::new(ProcessScript {
                state: ProcessState::Stopped,
                stdout: String::new(),
                stderr: String::new(),
                threads: Vec::new(),
                selected: None,
                line_entry: None,
            })),
        }
    }

    pub fn with_state(self, state: ProcessState) -> Self {
        self.set_state(state);
        self
    }

    pub fn set_state(&self, state: ProcessState) {
        lock(&self.inner).state = state;
    }

    pub fn push_stdout(&self, text: &str) {
        lock(&self.inner).stdout.push_str(text);
    }

    pub fn push_stderr(&self, text: &str) {
        lock(&self.inner).stderr.push_str(text);
    }

    pub fn set_threads(&self, threads: Vec<ThreadInfo>, selected: Option<ThreadId>) {
        let mut inner = lock(&self.inner);
        inner.threads = threads;
        inner.selected = selected;
    }

    pub fn selected_thread_id(&self) -> Option<ThreadId> {
        lock(&self.inner).selected
    }

    pub fn set_line_entry(&self, line_entry: Option<LineEntry>) {
        lock(&self.inner).line_entry = line_entry;
    }
}

/// Remove at most `max` bytes from the front of `buf`, never splitting a character
fn take_chunk(buf: &mut String, max: usize) -> String {
    let mut end = buf.len().min(max);
    while !buf.is_char_boundary(end) {
        end -= 1;
    }
    if end == 0 {
        end = buf.chars().next().map_or(0, char::len_utf8);
    }
    buf.drain(..end).collect()
}

impl Process for ScriptedProcess {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn state(&self) -> ProcessState {
        lock(&self.inner).state
    }

    fn read_stdout(&mut self, max: usize) -> String {
        take_chunk(&mut lock(&self.inner).stdout, max)
    }

    fn read_stderr(&mut self, max: usize) -> String {
        take_chunk(&mut lock(&self.inner).stderr, max)
    }

    fn threads(&self) -> Vec<ThreadInfo> {
        lock(&self.inner).threads.clone()
    }

    fn selected_thread(&self) -> Option<ThreadInfo> {
        let inner = lock(&self.inner);
        let selected = inner.selected?;
        inner.threads.iter().find(|t| t.id == selected).cloned()
    }

    fn set_selected_thread(&mut self, thread: ThreadId) -> bool {
        let mut inner = lock(&self.inner);
        if inner.threads.iter().any(|t| t.id == thread) {
            inner.selected = Some(thread);
            true
        } else {
            false
        }
    }

    fn selected_line_entry(&self) -> Option<LineEntry> {
        lock(&self.inner).line_entry.clone()
    }
}
