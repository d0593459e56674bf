//! Event transport
//!
//! This crate contains the broadcaster/listener signal bus the driver is built on, the typed
//! events carried over it, and the engine vocabulary those events refer to.
pub mod bus;
pub mod events;
pub mod io;
pub mod native;
pub mod types;

pub use bus::{Broadcaster, Listener, ListenerClosed, ListenerId, Unmatched};
pub use events::{Event, EventKind, EventMask, Prompt, Source};
pub use io::{PipeReader, PipeWriter, pipe};
pub use native::{NativeEvent, NativePayload};
