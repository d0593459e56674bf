//! The IO channel worker
//!
//! Turns a line oriented input stream into [`EventKind::HasUserInput`] events. A line is only
//! read once the driver has announced that it is ready for input, so lines typed ahead stay in
//! the stream until the driver asks for them.
use std::{
    io::BufRead,
    thread::{self, JoinHandle},
};

use eyre::WrapErr;
use transport::{Broadcaster, Event, EventKind, EventMask, Listener, Source};

use crate::{
    context::AppContext,
    output::{stderr_msg, stdout_msg},
};

/// Proof that the IO channel thread is no longer running
#[derive(Debug)]
pub struct IoChannelJoined {
    _private: (),
}

pub struct IoChannel {
    ctx: AppContext,
    broadcaster: Broadcaster,
    handle: Option<JoinHandle<()>>,
}

impl IoChannel {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            broadcaster: Broadcaster::new("io-channel", Source::IoChannel),
            handle: None,
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Start the worker thread
    ///
    /// The worker listens for ready and exit signals on `driver`, and for quit signals on
    /// `interpreter`, then announces itself with [`EventKind::ThreadDidStart`].
    pub fn start(
        &mut self,
        input: impl BufRead + Send + 'static,
        driver: &Broadcaster,
        interpreter: &Broadcaster,
    ) -> eyre::Result<()> {
        eyre::ensure!(self.handle.is_none(), "io channel already started");

        let worker = Worker {
            ctx: self.ctx.clone(),
            input: Box::new(input),
            broadcaster: self.broadcaster.clone(),
            driver: driver.clone(),
            interpreter: interpreter.clone(),
        };
        let handle = thread::Builder::new()
            .name("editor-lldb.io-channel".to_string())
            .spawn(move || worker.run())
            .wrap_err("spawning io channel thread")?;
        self.handle = Some(handle);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn out_write(&self, text: &str) {
        self.ctx.frontend.write(&stdout_msg(text));
    }

    pub fn err_write(&self, text: &str) {
        self.ctx.frontend.write(&stderr_msg(text));
    }

    /// Ask the worker to exit and wait until it has
    #[tracing::instrument(skip(self))]
    pub fn stop(self) -> IoChannelJoined {
        if self.is_running() {
            self.broadcaster.broadcast(EventKind::ThreadShouldExit);
        }
        self.join()
    }

    /// Wait for a worker that is already exiting on its own
    pub fn join(mut self) -> IoChannelJoined {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("io channel thread panicked");
            }
        }
        IoChannelJoined { _private: () }
    }
}

struct Worker {
    ctx: AppContext,
    input: Box<dyn BufRead + Send>,
    broadcaster: Broadcaster,
    driver: Broadcaster,
    interpreter: Broadcaster,
}

impl Worker {
    #[tracing::instrument(name = "io_channel", skip(self))]
    fn run(mut self) {
        let mut listener = Listener::new("io-channel");
        listener.start_listening(
            &self.interpreter,
            EventMask::THREAD_SHOULD_EXIT | EventMask::QUIT_COMMAND_RECEIVED,
        );
        listener.start_listening(&self.broadcaster, EventMask::THREAD_SHOULD_EXIT);
        listener.start_listening(
            &self.driver,
            EventMask::READY_FOR_INPUT | EventMask::THREAD_SHOULD_EXIT,
        );

        self.broadcaster.broadcast(EventKind::ThreadDidStart);
        tracing::debug!("io channel started");

        let timeout = self.ctx.settings().event_timeout();
        loop {
            let Some(event) = listener.wait_for_event(timeout) else {
                continue;
            };
            if !self.on_event(event) {
                break;
            }
        }

        drop(listener);
        self.broadcaster.broadcast(EventKind::ThreadDidExit);
        tracing::debug!("io channel exited");
    }

    /// Returns false once the worker should exit
    fn on_event(&mut self, event: Event) -> bool {
        match (event.source, event.kind) {
            (Source::Driver, EventKind::ReadyForInput(prompt)) => {
                let shown = self.ctx.frontend.prompt_for_input(&prompt);
                tracing::trace!(?prompt, %shown, "asked host for input");
                match self.read_line() {
                    Some(line) => {
                        self.broadcaster.broadcast(EventKind::HasUserInput(line));
                        true
                    }
                    None => false,
                }
            }
            (Source::Driver, EventKind::ThreadShouldExit)
            | (Source::IoChannel, EventKind::ThreadShouldExit)
            | (Source::Interpreter, EventKind::ThreadShouldExit)
            | (Source::Interpreter, EventKind::QuitCommandReceived) => {
                tracing::debug!(source = %event.source, "io channel asked to exit");
                false
            }
            (source, kind) => {
                tracing::warn!(%source, ?kind, "unexpected event");
                true
            }
        }
    }

    /// Read one line without its newline, `None` at end of input
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => {
                tracing::debug!("end of input");
                None
            }
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                }
                Some(line)
            }
            Err(e) => {
                tracing::warn!(error = %e, "reading input");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, time::Duration};

    use config::Config;
    use transport::Prompt;

    use super::*;
    use crate::frontend::{ChannelFrontend, FrontendEvent};

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        io: IoChannel,
        driver: Broadcaster,
        interpreter: Broadcaster,
        listener: Listener,
        frontend: crossbeam_channel::Receiver<FrontendEvent>,
    }

    fn harness() -> Harness {
        let (frontend, rx) = ChannelFrontend::new();
        let ctx = AppContext::new(Config::default(), frontend);
        let io = IoChannel::new(ctx);
        let mut listener = Listener::new("test");
        listener.start_listening(io.broadcaster(), EventMask::all());
        Harness {
            io,
            driver: Broadcaster::new("driver", Source::Driver),
            interpreter: Broadcaster::new("interpreter", Source::Interpreter),
            listener,
            frontend: rx,
        }
    }

    fn prompt() -> Prompt {
        Prompt {
            label: "lldb (driver)".to_string(),
            nested: false,
        }
    }

    fn expect(listener: &mut Listener, kind: EventKind) {
        let event = listener.wait_for_event(WAIT).unwrap();
        assert_eq!(event.source, Source::IoChannel);
        assert_eq!(event.kind, kind);
    }

    #[test]
    fn waits_for_a_complete_line() {
        let mut h = harness();
        let (reader, mut writer) = transport::pipe();
        h.io.start(reader, &h.driver, &h.interpreter).unwrap();
        expect(&mut h.listener, EventKind::ThreadDidStart);

        h.driver.broadcast(EventKind::ReadyForInput(prompt()));
        writer.write_all(b"help").unwrap();
        assert!(h.listener.wait_for_event(Duration::from_millis(100)).is_none());

        writer.write_all(b"\n").unwrap();
        expect(&mut h.listener, EventKind::HasUserInput("help".to_string()));
        assert_eq!(
            h.frontend.recv_timeout(WAIT).unwrap(),
            FrontendEvent::Prompt(prompt())
        );

        let _joined = h.io.stop();
        expect(&mut h.listener, EventKind::ThreadShouldExit);
        expect(&mut h.listener, EventKind::ThreadDidExit);
    }

    #[test]
    fn only_reads_when_ready() {
        let mut h = harness();
        let (reader, mut writer) = transport::pipe();
        writer.write_all(b"first\nsecond\n").unwrap();
        h.io.start(reader, &h.driver, &h.interpreter).unwrap();
        expect(&mut h.listener, EventKind::ThreadDidStart);

        assert!(h.listener.wait_for_event(Duration::from_millis(50)).is_none());

        h.driver.broadcast(EventKind::ReadyForInput(prompt()));
        expect(&mut h.listener, EventKind::HasUserInput("first".to_string()));
        h.driver.broadcast(EventKind::ReadyForInput(prompt()));
        expect(&mut h.listener, EventKind::HasUserInput("second".to_string()));

        let _joined = h.io.stop();
    }

    #[test]
    fn end_of_input_exits() {
        let mut h = harness();
        let (reader, writer) = transport::pipe();
        h.io.start(reader, &h.driver, &h.interpreter).unwrap();
        expect(&mut h.listener, EventKind::ThreadDidStart);

        drop(writer);
        h.driver.broadcast(EventKind::ReadyForInput(prompt()));
        expect(&mut h.listener, EventKind::ThreadDidExit);

        let _joined = h.io.join();
    }

    #[test]
    fn exits_on_quit_command() {
        let mut h = harness();
        let (reader, _writer) = transport::pipe();
        h.io.start(reader, &h.driver, &h.interpreter).unwrap();
        expect(&mut h.listener, EventKind::ThreadDidStart);

        h.interpreter.broadcast(EventKind::QuitCommandReceived);
        expect(&mut h.listener, EventKind::ThreadDidExit);
        let _joined = h.io.join();
    }

    #[test]
    fn stop_before_start() {
        let h = harness();
        assert!(!h.io.is_running());
        let _joined = h.io.stop();
    }

    #[test]
    fn writes_are_forwarded() {
        let h = harness();
        h.io.out_write("Process 1 launched\n");
        h.io.err_write("bad\n");

        assert_eq!(
            h.frontend.recv_timeout(WAIT).unwrap(),
            FrontendEvent::Output("Process 1 launched\n".to_string())
        );
        assert_eq!(
            h.frontend.recv_timeout(WAIT).unwrap(),
            FrontendEvent::Output("err> bad\n".to_string())
        );
    }
}
