use std::sync::Arc;

use transport::{
    Broadcaster, Event, EventKind, Prompt, Source,
    types::{BreakpointEvent, ProcessId, ProcessState},
};

use crate::{
    breakpoints,
    context::AppContext,
    engine::{OwnedSession, Process},
    frontend::Frontend,
    interpreter::{CommandStatus, interpret_command},
    io_channel::IoChannel,
    output::{Delivery, stderr_msg, stdout_msg},
    threads,
};

/// Where a command came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Read by the IO channel in answer to a ready announcement
    Input,
    /// Submitted by the host directly
    Host,
}

#[derive(Debug, Clone, Copy)]
enum Stdio {
    Stdout,
    Stderr,
}

/// State owned by the driver thread while it dispatches events
pub(crate) struct DriverInternals {
    ctx: AppContext,
    session: OwnedSession,
    io_channel: IoChannel,
    broadcaster: Broadcaster,

    waiting_for_command: bool,
    is_done: bool,
    io_channel_exited: bool,
}

impl DriverInternals {
    pub(crate) fn new(
        ctx: AppContext,
        session: OwnedSession,
        io_channel: IoChannel,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            ctx,
            session,
            io_channel,
            broadcaster,
            waiting_for_command: false,
            is_done: false,
            io_channel_exited: false,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.is_done
    }

    pub(crate) fn is_ready_for_command(&self) -> bool {
        self.waiting_for_command
    }

    /// Hand back the session and IO channel for teardown, along with whether the IO channel
    /// has already exited on its own
    pub(crate) fn into_parts(self) -> (OwnedSession, IoChannel, bool) {
        (self.session, self.io_channel, self.io_channel_exited)
    }

    /// Announce that the driver is ready for a new command
    ///
    /// Does nothing if the driver is already waiting for one. Returns whether the announcement
    /// was broadcast.
    pub(crate) fn ready_for_command(&mut self) -> bool {
        if self.waiting_for_command {
            tracing::trace!("already waiting for a command");
            return false;
        }

        self.waiting_for_command = true;
        let prompt = self.prompt();
        tracing::debug!(?prompt, "ready for command");
        self.broadcaster.broadcast(EventKind::ReadyForInput(prompt));
        true
    }

    fn prompt(&self) -> Prompt {
        let settings = self.ctx.settings();
        if self.session.input_reader_is_top() {
            Prompt {
                label: settings.prompt.clone(),
                nested: false,
            }
        } else {
            Prompt {
                label: settings.nested_prompt.clone(),
                nested: true,
            }
        }
    }

    pub(crate) fn on_event(&mut self, event: Event) {
        tracing::debug!(source = %event.source, mask = ?event.mask(), "handling event");

        match event.source {
            Source::IoChannel => self.on_io_event(event.kind),
            Source::Process => self.on_process_event(event.kind),
            Source::Breakpoint => self.on_breakpoint_event(event.kind),
            Source::Interpreter => self.on_interpreter_event(event.kind),
            Source::Driver => self.on_driver_event(event.kind),
        }
    }

    fn on_io_event(&mut self, kind: EventKind) {
        match kind {
            EventKind::HasUserInput(command) => self.execute(&command, Origin::Input),
            EventKind::UserInterrupt => {
                self.out_write("^C\n", Delivery::Sync);
                self.session.interrupt();
            }
            EventKind::ThreadShouldExit => {
                self.is_done = true;
            }
            EventKind::ThreadDidExit => {
                self.is_done = true;
                self.io_channel_exited = true;
            }
            EventKind::ThreadDidStart => {
                tracing::trace!("io channel start signal after startup");
            }
            other => tracing::warn!(kind = ?other, "unexpected io channel event"),
        }
    }

    #[tracing::instrument(skip(self))]
    fn execute(&mut self, command: &str, origin: Origin) {
        let add_to_history = self.ctx.settings().add_to_history;
        let result = interpret_command(&mut *self.session, command, add_to_history);

        self.out_write(&result.stdout, Delivery::Sync);
        self.err_write(&result.stderr, Delivery::Sync);

        // a host command leaves any outstanding read in place
        if origin == Origin::Input {
            self.waiting_for_command = false;
        }
        if result.status == CommandStatus::Quit {
            tracing::debug!("quit command executed");
            self.is_done = true;
            self.broadcaster.broadcast(EventKind::ThreadShouldExit);
            return;
        }

        if self.session.input_reader_active() {
            self.ready_for_command();
        }
    }

    fn on_process_event(&mut self, kind: EventKind) {
        match kind {
            EventKind::ProcessStdout { process } => {
                tracing::trace!(%process, "stdout available");
                self.drain(&[Stdio::Stdout]);
            }
            EventKind::ProcessStderr { process } => {
                tracing::trace!(%process, "stderr available");
                self.drain(&[Stdio::Stderr]);
            }
            EventKind::ProcessInterrupt { process } => {
                tracing::debug!(%process, "process interrupted");
                let frontend = Arc::clone(&self.ctx.frontend);
                match self.session.selected_process() {
                    Some(p) => {
                        let state = p.state();
                        frontend.on_process_stopped(&*p, state);
                    }
                    None => tracing::warn!(%process, "interrupt without a selected process"),
                }
            }
            EventKind::ProcessStateChanged {
                process,
                state,
                restarted,
            } => self.on_state_changed(process, state, restarted),
            other => tracing::warn!(kind = ?other, "unexpected process event"),
        }
    }

    #[tracing::instrument(skip(self))]
    fn on_state_changed(&mut self, pid: ProcessId, state: ProcessState, restarted: bool) {
        if state == ProcessState::Invalid {
            return;
        }

        // stdio goes out before any status text
        self.drain(&[Stdio::Stdout, Stdio::Stderr]);

        match state {
            s if s.is_transient() => {
                self.out_write(&format!("Process {pid} {state}\n"), Delivery::Sync);
            }
            ProcessState::Running => {}
            ProcessState::Exited => {
                let status = interpret_command(&mut *self.session, "process status", false);
                self.out_write(&status.stdout, Delivery::Sync);
                self.err_write(&status.stderr, Delivery::Sync);
                self.notify_stopped(pid, state);
            }
            s if s.is_stopped() => {
                if restarted {
                    self.out_write(
                        &format!("Process {pid} stopped and was programmatically restarted.\n"),
                        Delivery::Sync,
                    );
                    return;
                }

                match self.session.selected_process() {
                    Some(process) => {
                        threads::update_selected_thread(process);
                    }
                    None => tracing::warn!(process = %pid, "stop without a selected process"),
                }
                self.notify_stopped(pid, state);
            }
            other => tracing::debug!(state = %other, "ignoring process state"),
        }
    }

    fn notify_stopped(&mut self, pid: ProcessId, state: ProcessState) {
        let frontend = Arc::clone(&self.ctx.frontend);
        match self.session.selected_process() {
            Some(process) => frontend.on_process_stopped(&*process, state),
            None => tracing::warn!(process = %pid, "no selected process to report"),
        }
    }

    fn drain(&mut self, streams: &[Stdio]) {
        let chunk_size = self.ctx.settings().stdio_chunk_size;
        let frontend = Arc::clone(&self.ctx.frontend);
        let Some(process) = self.session.selected_process() else {
            return;
        };
        for stdio in streams {
            drain_stdio(&mut *process, *stdio, chunk_size, frontend.as_ref());
        }
    }

    fn on_breakpoint_event(&mut self, kind: EventKind) {
        match kind {
            EventKind::BreakpointChanged(event) => self.on_breakpoint_changed(&event),
            other => tracing::warn!(kind = ?other, "unexpected breakpoint event"),
        }
    }

    #[tracing::instrument(
        skip(self, event),
        fields(breakpoint = %event.breakpoint, event_type = ?event.event_type)
    )]
    fn on_breakpoint_changed(&mut self, event: &BreakpointEvent) {
        for update in breakpoints::updates(event) {
            self.ctx.frontend.on_breakpoint_changed(&update);
        }
        if let Some(notice) = breakpoints::locations_added_notice(event) {
            self.out_write(&notice, Delivery::Sync);
        }
    }

    fn on_interpreter_event(&mut self, kind: EventKind) {
        match kind {
            EventKind::QuitCommandReceived => {
                tracing::debug!("interpreter received quit");
                self.is_done = true;
            }
            EventKind::AsyncError(text) => self.err_write(&text, Delivery::Async),
            EventKind::AsyncOutput(text) => self.out_write(&text, Delivery::Async),
            EventKind::InputReaderReactivated => {
                self.ready_for_command();
            }
            other => tracing::warn!(kind = ?other, "unexpected interpreter event"),
        }
    }

    fn on_driver_event(&mut self, kind: EventKind) {
        match kind {
            EventKind::ThreadShouldExit => {
                tracing::debug!("driver asked to stop");
                self.is_done = true;
            }
            EventKind::HasUserInput(command) => self.execute(&command, Origin::Host),
            other => tracing::trace!(kind = ?other, "ignoring own event"),
        }
    }

    fn out_write(&mut self, text: &str, delivery: Delivery) {
        if text.is_empty() {
            return;
        }
        self.io_channel.out_write(text);
        if delivery == Delivery::Async {
            self.session.async_output_written();
        }
    }

    fn err_write(&mut self, text: &str, delivery: Delivery) {
        if text.is_empty() {
            return;
        }
        self.io_channel.err_write(text);
        if delivery == Delivery::Async {
            self.session.async_output_written();
        }
    }
}

fn drain_stdio(
    process: &mut dyn Process,
    stdio: Stdio,
    chunk_size: usize,
    frontend: &dyn Frontend,
) {
    loop {
        let text = match stdio {
            Stdio::Stdout => process.read_stdout(chunk_size),
            Stdio::Stderr => process.read_stderr(chunk_size),
        };
        if text.is_empty() {
            break;
        }
        match stdio {
            Stdio::Stdout => frontend.write(&stdout_msg(&text)),
            Stdio::Stderr => frontend.write(&stderr_msg(&text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use config::Config;
    use transport::{
        EventMask, Listener,
        types::{
            BreakpointEventType, BreakpointLocation, LineEntry, ReturnStatus, StopReason,
            ThreadInfo,
        },
    };

    use super::*;
    use crate::{
        breakpoints::{BreakpointChange, BreakpointUpdate},
        frontend::{ChannelFrontend, FrontendEvent},
        testing::{ScriptedEngine, ScriptedProcess},
    };

    const SHORT: Duration = Duration::from_millis(50);

    struct Fixture {
        internals: DriverInternals,
        engine: ScriptedEngine,
        frontend: crossbeam_channel::Receiver<FrontendEvent>,
        ready: Listener,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(Config::default())
        }

        fn with_config(config: Config) -> Self {
            let engine = ScriptedEngine::new();
            let (frontend, rx) = ChannelFrontend::new();
            let ctx = AppContext::new(config, frontend);
            let broadcaster = Broadcaster::new("driver", Source::Driver);
            let mut ready = Listener::new("test");
            ready.start_listening(&broadcaster, EventMask::READY_FOR_INPUT);

            let internals = DriverInternals::new(
                ctx.clone(),
                OwnedSession::new(Box::new(engine.session())),
                IoChannel::new(ctx),
                broadcaster,
            );
            Self {
                internals,
                engine,
                frontend: rx,
                ready,
            }
        }

        fn input(&mut self, command: &str) {
            self.internals.on_event(Event::new(
                Source::IoChannel,
                EventKind::HasUserInput(command.to_string()),
            ));
        }

        fn state_changed(&mut self, state: ProcessState, restarted: bool) {
            self.internals.on_event(Event::new(
                Source::Process,
                EventKind::ProcessStateChanged {
                    process: 42,
                    state,
                    restarted,
                },
            ));
        }

        fn ui(&self) -> Vec<FrontendEvent> {
            self.frontend.try_iter().collect()
        }

        fn output(&self) -> Vec<String> {
            self.ui()
                .into_iter()
                .filter_map(|e| match e {
                    FrontendEvent::Output(text) => Some(text),
                    _ => None,
                })
                .collect()
        }

        fn ready_count(&mut self) -> usize {
            let mut count = 0;
            while self.ready.wait_for_event(SHORT).is_some() {
                count += 1;
            }
            count
        }
    }

    fn stopped_process() -> ScriptedProcess {
        let process = ScriptedProcess::new(42).with_state(ProcessState::Stopped);
        process.set_threads(
            vec![
                ThreadInfo::new(1, StopReason::None),
                ThreadInfo::new(2, StopReason::Breakpoint),
            ],
            Some(1),
        );
        process
    }

    #[test]
    fn ready_signal_is_idempotent() {
        let mut f = Fixture::new();

        assert!(f.internals.ready_for_command());
        assert!(!f.internals.ready_for_command());
        assert_eq!(f.ready_count(), 1);

        f.input("help");
        assert!(f.internals.is_ready_for_command());
        assert_eq!(f.ready_count(), 1);
    }

    #[test]
    fn prompt_depends_on_the_input_reader() {
        let mut f = Fixture::new();
        f.engine.set_input_reader(true, false);
        f.internals.ready_for_command();

        let event = f.ready.wait_for_event(SHORT).unwrap();
        assert_eq!(
            event.kind,
            EventKind::ReadyForInput(Prompt {
                label: "?".to_string(),
                nested: true,
            })
        );
    }

    #[test]
    fn command_output_is_forwarded() {
        let mut f = Fixture::new();
        f.engine.respond(
            "breakpoint set -n main",
            "Breakpoint 1: where = a.out`main\n",
            "warning: pending\n",
            ReturnStatus::SUCCESS_FINISH_RESULT,
        );
        f.internals.ready_for_command();

        f.input("breakpoint set -n main");
        assert_eq!(
            f.output(),
            vec![
                "Breakpoint 1: where = a.out`main\n".to_string(),
                "err> warning: pending\n".to_string(),
            ]
        );
        assert!(!f.internals.is_done());
        assert_eq!(
            f.engine.commands(),
            vec![("breakpoint set -n main".to_string(), true)]
        );
    }

    #[test]
    fn quit_ends_dispatch() {
        let mut f = Fixture::new();
        let mut exit = Listener::new("io-channel");
        exit.start_listening(&f.internals.broadcaster, EventMask::THREAD_SHOULD_EXIT);
        f.internals.ready_for_command();
        assert_eq!(f.ready_count(), 1);

        f.input("quit");
        assert!(f.internals.is_done());
        assert!(!f.internals.is_ready_for_command());
        assert_eq!(f.ready_count(), 0);
        assert_eq!(
            exit.wait_for_event(SHORT).map(|e| e.kind),
            Some(EventKind::ThreadShouldExit)
        );
    }

    #[test]
    fn host_commands_leave_the_pending_read() {
        let mut f = Fixture::new();
        f.internals.ready_for_command();
        assert_eq!(f.ready_count(), 1);

        f.internals.on_event(Event::new(
            Source::Driver,
            EventKind::HasUserInput("version".to_string()),
        ));
        assert_eq!(f.engine.commands(), vec![("version".to_string(), true)]);
        assert!(f.internals.is_ready_for_command());
        assert_eq!(f.ready_count(), 0);

        f.input("help");
        assert_eq!(f.ready_count(), 1);
    }

    #[test]
    fn inactive_reader_waits_for_reactivation() {
        let mut f = Fixture::new();
        f.engine.respond("script", "", "", ReturnStatus::SUCCESS_FINISH_NO_RESULT);
        f.internals.ready_for_command();
        assert_eq!(f.ready_count(), 1);

        f.engine.set_input_reader(false, false);
        f.input("script");
        assert_eq!(f.ready_count(), 0);

        f.engine.set_input_reader(true, true);
        f.internals.on_event(Event::new(
            Source::Interpreter,
            EventKind::InputReaderReactivated,
        ));
        assert_eq!(f.ready_count(), 1);
    }

    #[test]
    fn restarted_stop_only_writes_a_notice() {
        let mut f = Fixture::new();
        let process = stopped_process();
        f.engine.set_process(Some(process.clone()));

        f.state_changed(ProcessState::Stopped, true);

        assert_eq!(
            f.ui(),
            vec![FrontendEvent::Output(
                "Process 42 stopped and was programmatically restarted.\n".to_string()
            )]
        );
        assert_eq!(process.selected_thread_id(), Some(1));
    }

    #[test]
    fn stop_reselects_and_reports() {
        let mut f = Fixture::new();
        let process = stopped_process();
        process.set_line_entry(Some(LineEntry {
            path: "/src/main.c".into(),
            line: 7,
            column: 3,
        }));
        f.engine.set_process(Some(process.clone()));

        f.state_changed(ProcessState::Stopped, false);

        assert_eq!(process.selected_thread_id(), Some(2));
        assert_eq!(
            f.ui(),
            vec![FrontendEvent::ProcessStopped {
                process: 42,
                state: ProcessState::Stopped,
                thread: Some(2),
                location: Some(LineEntry {
                    path: "/src/main.c".into(),
                    line: 7,
                    column: 3,
                }),
            }]
        );
    }

    #[test]
    fn stdio_is_drained_before_status() {
        let mut f = Fixture::with_config({
            let mut config = Config::default();
            config.driver.stdio_chunk_size = 4;
            config
        });
        let process = ScriptedProcess::new(42).with_state(ProcessState::Launching);
        process.push_stdout("hello\n");
        process.push_stderr("bad\n");
        f.engine.set_process(Some(process));

        f.state_changed(ProcessState::Launching, false);

        assert_eq!(
            f.output(),
            vec![
                "hell".to_string(),
                "o\n".to_string(),
                "err> bad\n".to_string(),
                "Process 42 launching\n".to_string(),
            ]
        );
    }

    #[test]
    fn running_is_quiet() {
        let mut f = Fixture::new();
        f.engine
            .set_process(Some(ScriptedProcess::new(42).with_state(ProcessState::Running)));
        f.state_changed(ProcessState::Running, false);
        assert!(f.ui().is_empty());
    }

    #[test]
    fn exit_reports_process_status() {
        let mut f = Fixture::new();
        f.engine.respond(
            "process status",
            "Process 42 exited with status = 0 (0x00000000)\n",
            "",
            ReturnStatus::SUCCESS_FINISH_RESULT,
        );
        f.engine
            .set_process(Some(ScriptedProcess::new(42).with_state(ProcessState::Exited)));

        f.state_changed(ProcessState::Exited, false);

        assert_eq!(
            f.ui(),
            vec![
                FrontendEvent::Output(
                    "Process 42 exited with status = 0 (0x00000000)\n".to_string()
                ),
                FrontendEvent::ProcessStopped {
                    process: 42,
                    state: ProcessState::Exited,
                    thread: None,
                    location: None,
                },
            ]
        );
        assert_eq!(
            f.engine.commands(),
            vec![("process status".to_string(), false)]
        );
    }

    #[test]
    fn stdout_event_drains_only_stdout() {
        let mut f = Fixture::new();
        let process = ScriptedProcess::new(42).with_state(ProcessState::Running);
        process.push_stdout("tick\n");
        process.push_stderr("later\n");
        f.engine.set_process(Some(process.clone()));

        f.internals.on_event(Event::new(
            Source::Process,
            EventKind::ProcessStdout { process: 42 },
        ));
        assert_eq!(f.output(), vec!["tick\n".to_string()]);

        f.internals.on_event(Event::new(
            Source::Process,
            EventKind::ProcessStderr { process: 42 },
        ));
        assert_eq!(f.output(), vec!["err> later\n".to_string()]);
    }

    #[test]
    fn interrupt_reports_the_live_process() {
        let mut f = Fixture::new();
        f.engine.set_process(Some(stopped_process()));

        f.internals.on_event(Event::new(
            Source::Process,
            EventKind::ProcessInterrupt { process: 42 },
        ));

        assert!(matches!(
            f.ui().as_slice(),
            [FrontendEvent::ProcessStopped {
                process: 42,
                state: ProcessState::Stopped,
                ..
            }]
        ));
    }

    #[test]
    fn user_interrupt() {
        let mut f = Fixture::new();
        f.internals
            .on_event(Event::new(Source::IoChannel, EventKind::UserInterrupt));

        assert_eq!(f.output(), vec!["^C\n".to_string()]);
        assert_eq!(f.engine.interrupts(), 1);
    }

    #[test]
    fn async_output_notifies_the_engine() {
        let mut f = Fixture::new();
        f.internals.on_event(Event::new(
            Source::Interpreter,
            EventKind::AsyncOutput("1 location added\n".to_string()),
        ));
        f.internals.on_event(Event::new(
            Source::Interpreter,
            EventKind::AsyncError("symbol not found\n".to_string()),
        ));

        assert_eq!(
            f.output(),
            vec![
                "1 location added\n".to_string(),
                "err> symbol not found\n".to_string(),
            ]
        );
        assert_eq!(f.engine.async_notifications(), 2);
    }

    #[test]
    fn breakpoint_changes_reach_the_frontend() {
        let mut f = Fixture::new();
        let location = BreakpointLocation {
            line_entry: Some(LineEntry {
                path: "/src/main.c".into(),
                line: 12,
                column: 0,
            }),
            enabled: true,
        };

        f.internals.on_event(Event::new(
            Source::Breakpoint,
            EventKind::BreakpointChanged(BreakpointEvent {
                breakpoint: 1,
                event_type: BreakpointEventType::LocationsAdded,
                locations: vec![location],
                num_locations: 1,
            }),
        ));

        assert_eq!(
            f.ui(),
            vec![
                FrontendEvent::Breakpoint(BreakpointUpdate {
                    breakpoint: 1,
                    file: "/src/main.c".into(),
                    line: 12,
                    enabled: true,
                    change: BreakpointChange::Added,
                }),
                FrontendEvent::Output("1 locations added to breakpoint 1\n".to_string()),
            ]
        );
    }

    #[test]
    fn io_channel_exit_is_recorded() {
        let mut f = Fixture::new();
        f.internals
            .on_event(Event::new(Source::IoChannel, EventKind::ThreadDidExit));
        assert!(f.internals.is_done());

        let (_session, _io, exited) = f.internals.into_parts();
        assert!(exited);
    }

    #[test]
    fn should_exit_does_not_count_as_exited() {
        let mut f = Fixture::new();
        f.internals
            .on_event(Event::new(Source::IoChannel, EventKind::ThreadShouldExit));
        assert!(f.internals.is_done());

        let (_session, _io, exited) = f.internals.into_parts();
        assert!(!exited);
    }

    #[test]
    fn interpreter_quit() {
        let mut f = Fixture::new();
        f.internals
            .on_event(Event::new(Source::Interpreter, EventKind::QuitCommandReceived));
        assert!(f.internals.is_done());
    }
}
