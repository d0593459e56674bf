//! Forwards the engine's own output stream to the host
use std::{
    io::{ErrorKind, Read},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use eyre::WrapErr;

use crate::{frontend::Frontend, output::stdout_msg};

pub(crate) struct OutputMonitor {
    handle: JoinHandle<()>,
    done: crossbeam_channel::Receiver<()>,
}

impl OutputMonitor {
    pub(crate) fn start(
        mut stream: Box<dyn Read + Send>,
        frontend: Arc<dyn Frontend>,
        chunk_size: usize,
    ) -> eyre::Result<Self> {
        let (done_tx, done) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .name("editor-lldb.output-monitor".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; chunk_size];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => frontend.write(&stdout_msg(&String::from_utf8_lossy(&buf[..n]))),
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::warn!(error = %e, "reading engine output");
                            break;
                        }
                    }
                }
                tracing::debug!("engine output closed");
                let _ = done_tx.send(());
            })
            .wrap_err("spawning output monitor thread")?;

        Ok(Self { handle, done })
    }

    /// Wait up to `timeout` for the stream to close
    ///
    /// Returns false if the monitor was still running, in which case it is left detached.
    pub(crate) fn join_timeout(self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Ok(()) => {
                if self.handle.join().is_err() {
                    tracing::error!("output monitor thread panicked");
                }
                true
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                // the thread went away without signalling, so it panicked
                let _ = self.handle.join();
                true
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                tracing::warn!(?timeout, "engine output still open, detaching monitor");
                false
            }
        }
    }
}
