//! The driver worker and the handle its host holds
use std::{
    io::Write,
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use eyre::WrapErr;
use transport::{
    Broadcaster, EventKind, EventMask, Listener, PipeReader, PipeWriter, Source, Unmatched,
};

use crate::{
    context::AppContext,
    engine::{Engine, EngineBroadcasters, InitFile, OwnedSession},
    internals::DriverInternals,
    io_channel::IoChannel,
    monitor::OutputMonitor,
    output::stderr_msg,
    state::{DriverPhase, RunState, SharedState},
};

type SharedInput = Arc<Mutex<Option<PipeWriter>>>;

/// Handle to a running driver
///
/// The driver owns the engine session on its own thread. The host talks to it by writing lines
/// of input, or by broadcasting commands, and hears back through the [`crate::Frontend`] in the
/// [`AppContext`]. Dropping the handle stops the driver.
pub struct Driver {
    broadcaster: Broadcaster,
    io_broadcaster: Broadcaster,
    input: SharedInput,
    shared: Arc<SharedState>,
    handle: Option<JoinHandle<()>>,
}

impl Driver {
    /// Start a driver thread for a new session of `engine`
    ///
    /// Returns once the session exists and the IO channel has started, or with the reason it
    /// could not.
    #[tracing::instrument(skip_all)]
    pub fn start(ctx: AppContext, engine: impl Engine) -> eyre::Result<Self> {
        let broadcaster = Broadcaster::new("driver", Source::Driver);
        let io_channel = IoChannel::new(ctx.clone());
        let io_broadcaster = io_channel.broadcaster().clone();
        let (reader, writer) = transport::pipe();
        let input: SharedInput = Arc::new(Mutex::new(Some(writer)));
        let shared = Arc::new(SharedState::new());

        let (started_tx, started_rx) = oneshot::channel();
        let worker = Worker {
            ctx,
            engine,
            broadcaster: broadcaster.clone(),
            io_channel,
            reader,
            input: Arc::clone(&input),
            shared: Arc::clone(&shared),
        };
        let handle = thread::Builder::new()
            .name("editor-lldb.driver".to_string())
            .spawn(move || worker.run(started_tx))
            .wrap_err("spawning driver thread")?;

        let started = started_rx
            .recv()
            .map_err(|_| eyre::eyre!("driver thread exited during startup"));
        if let Err(e) = started.and_then(|r| r) {
            if handle.join().is_err() {
                tracing::error!("driver thread panicked");
            }
            return Err(e).wrap_err("starting driver");
        }

        tracing::debug!("driver started");
        Ok(Self {
            broadcaster,
            io_broadcaster,
            input,
            shared,
            handle: Some(handle),
        })
    }

    pub fn run_state(&self) -> RunState {
        self.shared.run_state()
    }

    pub fn phase(&self) -> DriverPhase {
        self.shared.phase()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn io_broadcaster(&self) -> &Broadcaster {
        &self.io_broadcaster
    }

    /// Type a line of input, which is read once the driver is ready for it
    pub fn send_input(&self, line: &str) -> eyre::Result<()> {
        let mut input = self
            .input
            .lock()
            .map_err(|_| eyre::eyre!("driver input lock poisoned"))?;
        let Some(writer) = input.as_mut() else {
            eyre::bail!("driver input is closed");
        };
        writer
            .write_all(format!("{line}\n").as_bytes())
            .wrap_err("writing driver input")
    }

    /// Run `command` without waiting for the driver to ask for input
    ///
    /// A line the IO channel is already waiting for is still read, and no further input is
    /// consumed on account of this command.
    pub fn send_command(&self, command: &str) -> eyre::Result<()> {
        let delivered = self
            .broadcaster
            .broadcast(EventKind::HasUserInput(command.to_string()));
        eyre::ensure!(delivered > 0, "driver is not accepting commands");
        Ok(())
    }

    /// Close the input, after which the IO channel exits at its next read
    pub fn close_input(&self) {
        close_input(&self.input);
    }

    /// Ask the driver to exit and wait for it to tear down its session
    #[tracing::instrument(skip(self))]
    pub fn stop(&mut self) -> eyre::Result<()> {
        if self.handle.is_none() {
            return Ok(());
        }

        self.shared.transition(RunState::Running, RunState::Stopping);
        self.close_input();
        self.broadcaster.broadcast(EventKind::ThreadShouldExit);
        self.join()
    }

    /// Wait for a driver that is exiting on its own
    pub fn join(&mut self) -> eyre::Result<()> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| eyre::eyre!("driver thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "stopping driver");
        }
    }
}

fn close_input(input: &SharedInput) {
    let writer = input
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if writer.is_some() {
        tracing::debug!("closing driver input");
    }
}

struct Worker<E> {
    ctx: AppContext,
    engine: E,
    broadcaster: Broadcaster,
    io_channel: IoChannel,
    reader: PipeReader,
    input: SharedInput,
    shared: Arc<SharedState>,
}

impl<E: Engine> Worker<E> {
    #[tracing::instrument(name = "driver", skip_all)]
    fn run(mut self, started: oneshot::Sender<eyre::Result<()>>) {
        self.shared.set_phase(DriverPhase::Starting);

        let session = match self
            .engine
            .create_session()
            .wrap_err("creating engine session")
        {
            Ok(session) => OwnedSession::new(session),
            Err(e) => {
                report_startup_failure(&self.ctx, &e);
                self.shared.set_phase(DriverPhase::Done);
                self.shared.set_run_state(RunState::Stopped);
                let _ = started.send(Err(e));
                return;
            }
        };

        let Worker {
            ctx,
            broadcaster,
            mut io_channel,
            reader,
            input,
            shared,
            ..
        } = self;
        let mut session = session;

        let unmatched = match ctx.settings().unmatched_events {
            config::UnmatchedEvents::Requeue => Unmatched::Requeue,
            config::UnmatchedEvents::Discard => Unmatched::Discard,
        };
        let mut listener = Listener::new("driver").with_unmatched(unmatched);
        subscribe(
            &mut listener,
            session.broadcasters(),
            io_channel.broadcaster(),
            &broadcaster,
        );

        shared.set_phase(DriverPhase::WaitingForIoChannel);
        let monitor = session.take_output().and_then(|output| {
            OutputMonitor::start(
                output,
                Arc::clone(&ctx.frontend),
                ctx.settings().stdio_chunk_size,
            )
            .inspect_err(|e| tracing::warn!(error = %e, "engine output will not be forwarded"))
            .ok()
        });

        let startup = io_channel
            .start(reader, &broadcaster, &session.broadcasters().interpreter)
            .wrap_err("starting io channel")
            .and_then(|()| {
                source_init_files(&ctx, &mut session, &io_channel);
                wait_for_io_channel(&ctx, &mut listener)
            });

        let teardown = Teardown {
            ctx: &ctx,
            shared: &shared,
            input: &input,
            monitor,
        };

        if let Err(e) = startup {
            report_startup_failure(&ctx, &e);
            let _ = started.send(Err(e));
            teardown.run(listener, session, io_channel, false);
            return;
        }

        shared.set_run_state(RunState::Running);
        let _ = started.send(Ok(()));

        shared.set_phase(DriverPhase::Dispatching);
        let mut internals =
            DriverInternals::new(ctx.clone(), session, io_channel, broadcaster.clone());
        internals.ready_for_command();

        let timeout = ctx.settings().event_timeout();
        while !internals.is_done() {
            if let Some(event) = listener.wait_for_event(timeout) {
                internals.on_event(event);
            }
        }
        tracing::debug!("dispatch finished");

        let (session, io_channel, io_channel_exited) = internals.into_parts();
        teardown.run(listener, session, io_channel, io_channel_exited);
    }
}

fn subscribe(
    listener: &mut Listener,
    engine: &EngineBroadcasters,
    io_channel: &Broadcaster,
    driver: &Broadcaster,
) {
    listener.start_listening(&engine.breakpoint, EventMask::BREAKPOINT_CHANGED);
    listener.start_listening(
        &engine.process,
        EventMask::PROCESS_STATE_CHANGED
            | EventMask::PROCESS_STDOUT
            | EventMask::PROCESS_STDERR
            | EventMask::PROCESS_INTERRUPT,
    );
    listener.start_listening(
        io_channel,
        EventMask::HAS_USER_INPUT
            | EventMask::USER_INTERRUPT
            | EventMask::THREAD_SHOULD_EXIT
            | EventMask::THREAD_DID_START
            | EventMask::THREAD_DID_EXIT,
    );
    listener.start_listening(
        &engine.interpreter,
        EventMask::QUIT_COMMAND_RECEIVED
            | EventMask::ASYNC_OUTPUT
            | EventMask::ASYNC_ERROR
            | EventMask::INPUT_READER_REACTIVATED,
    );
    listener.start_listening(
        driver,
        EventMask::THREAD_SHOULD_EXIT | EventMask::HAS_USER_INPUT,
    );
}

fn source_init_files(ctx: &AppContext, session: &mut OwnedSession, io_channel: &IoChannel) {
    let settings = ctx.settings();
    if !settings.source_init_files {
        return;
    }

    for location in [InitFile::Home, InitFile::CurrentWorkingDirectory] {
        let ret = session.source_init_file(location);
        tracing::debug!(?location, status = ?ret.status, "sourced init file");
        if settings.debug_mode {
            if !ret.error.is_empty() {
                io_channel.err_write(&ret.error);
            }
            if !ret.output.is_empty() {
                io_channel.out_write(&ret.output);
            }
        }
    }
}

fn wait_for_io_channel(ctx: &AppContext, listener: &mut Listener) -> eyre::Result<()> {
    let timeout = ctx.settings().startup_timeout();
    match listener.wait_for_event_from(timeout, Source::IoChannel, EventMask::THREAD_DID_START) {
        Some(_) => {
            tracing::debug!("io channel started");
            Ok(())
        }
        None => eyre::bail!("io channel did not start within {timeout:?}"),
    }
}

fn report_startup_failure(ctx: &AppContext, error: &eyre::Report) {
    tracing::error!(error = ?error, "driver failed to start");
    ctx.frontend.write(&stderr_msg(&format!("{error:#}\n")));
}

struct Teardown<'a> {
    ctx: &'a AppContext,
    shared: &'a SharedState,
    input: &'a SharedInput,
    monitor: Option<OutputMonitor>,
}

impl Teardown<'_> {
    /// Tear down in order: IO channel, listener, session, then the output monitor
    #[tracing::instrument(name = "teardown", skip(self, listener, session, io_channel))]
    fn run(
        self,
        mut listener: Listener,
        session: OwnedSession,
        io_channel: IoChannel,
        io_channel_exited: bool,
    ) {
        self.shared.transition(RunState::Running, RunState::Stopping);
        let timeout = self.ctx.settings().teardown_timeout();

        let joined = if io_channel_exited || !io_channel.is_running() {
            io_channel.join()
        } else if listener
            .next_event_from(Source::IoChannel, EventMask::THREAD_DID_EXIT)
            .or_else(|| {
                listener.wait_for_event_from(
                    timeout,
                    Source::IoChannel,
                    EventMask::THREAD_DID_EXIT,
                )
            })
            .is_some()
        {
            tracing::debug!("io channel exited");
            io_channel.join()
        } else {
            tracing::warn!(?timeout, "io channel still running, stopping it");
            close_input(self.input);
            io_channel.stop()
        };

        let closed = listener.close();
        session.destroy(closed, joined);

        if let Some(monitor) = self.monitor {
            monitor.join_timeout(timeout);
        }

        self.ctx.frontend.on_exit();
        self.shared.set_phase(DriverPhase::Done);
        self.shared.set_run_state(RunState::Stopped);
        tracing::debug!("driver stopped");
    }
}
