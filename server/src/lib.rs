//! # Ticknet Server
//! Tick-synchronized session manager that accepts many client connections
//! and exchanges typed messages with them over a pluggable transport.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod shared {
    pub use ticknet_shared::{
        ConnectionHandle, MessageError, MessageId, MessageReader, MessageWriter, Pipeline,
        PipelineSet, Scheduler, SendMode, Socket, TickHooks,
    };
}

mod server;

pub use server::{Server, ServerContext, ServerMessageHandler};
