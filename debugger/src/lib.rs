//! Editor-hosted debugger driver
//!
//! A [`Driver`] runs a debugger engine session on its own thread, feeding it commands read by an
//! [`IoChannel`] and reporting everything the engine does to a [`Frontend`].
pub mod breakpoints;
mod context;
mod driver;
mod engine;
mod frontend;
mod internals;
mod interpreter;
mod io_channel;
mod monitor;
pub mod output;
mod state;
pub mod testing;
pub mod threads;

pub use breakpoints::{BreakpointChange, BreakpointUpdate};
pub use context::AppContext;
pub use driver::Driver;
pub use engine::{
    Engine, EngineBroadcasters, InitFile, OwnedSession, Process, RawCommandReturn, Session,
};
pub use frontend::{ChannelFrontend, Frontend, FrontendEvent};
pub use interpreter::{CommandResult, CommandStatus, interpret_command};
pub use io_channel::{IoChannel, IoChannelJoined};
pub use state::{DriverPhase, RunState};
