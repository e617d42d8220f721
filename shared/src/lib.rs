//! # Ticknet Shared
//! Common functionality shared between ticknet-server & ticknet-client
//! crates: the transport contract, pipeline selection, the message dispatch
//! table, the per-tick command queue, and the scheduling contract.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod command_queue;
mod message;
mod pipeline;
mod scheduler;
mod types;

pub mod transport;

pub use command_queue::{Command, CommandQueue};
pub use message::{MessageError, MessageReader, MessageTable, MessageWriter};
pub use pipeline::{Pipeline, PipelineSet, SendMode};
pub use scheduler::{HookId, Scheduler, TickHooks};
pub use transport::{
    DisconnectReason, SendError, Socket, SocketEvent, TransportError, UpdateHandle,
};
pub use types::{ConnectionHandle, MessageId};
