//! # Ticknet Client
//! Tick-synchronized client session that connects to a ticknet server and
//! exchanges typed messages with it over a pluggable transport.

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

mod client;

pub use client::{Client, ClientContext, ClientMessageHandler, ConnectionState};
