use std::io::{self, BufRead, Cursor, Read, Write};

use crossbeam_channel::{Receiver, Sender};

/// Create a connected in-memory pipe
///
/// Bytes written to the [`PipeWriter`] become readable from the [`PipeReader`] as soon as the
/// write returns. Reads block until data arrives, and report end of file once the writer has been
/// dropped and everything written has been consumed.
pub fn pipe() -> (PipeReader, PipeWriter) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (
        PipeReader {
            buffer: Cursor::new(Vec::new()),
            rx,
        },
        PipeWriter { tx },
    )
}

/// Reader half of a [`pipe`]
pub struct PipeReader {
    buffer: Cursor<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

/// Writer half of a [`pipe`]
pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
}

impl BufRead for PipeReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.buffer.position() >= self.buffer.get_ref().len() as u64 {
            match self.rx.recv() {
                Ok(data) => self.buffer = Cursor::new(data),
                // writer dropped
                Err(_) => return Ok(&[]),
            }
        }

        self.buffer.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.buffer.consume(amt)
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let len = std::cmp::min(available.len(), buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Ok(len)
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
