//! Line oriented input sources
//!
//! The IOChannel reads commands from a blocking [`BufRead`](std::io::BufRead). In-process hosts
//! feed it through a [`pipe`], whose writer half stays with whoever submits commands.
//!
//! ```
//! use std::io::{BufRead, Write};
//!
//! let (mut reader, mut writer) = transport::io::pipe();
//! writer.write_all(b"help\n")?;
//!
//! let mut line = String::new();
//! reader.read_line(&mut line)?;
//! assert_eq!(line, "help\n");
//! # Ok::<(), std::io::Error>(())
//! ```

mod pipe;

pub use pipe::{PipeReader, PipeWriter, pipe};
