//! The abstract transport consumed by the session layer.
//!
//! The underlying unreliable/sequenced/reliable delivery implementation
//! (retransmission, ordering, congestion) lives behind [`Socket`]; the
//! session layer only drives accept/receive/send and the per-tick
//! asynchronous update. The in-process [`mem`] transport exists so the
//! session layer can be exercised end to end without a network.

pub mod mem;

use std::net::SocketAddr;

use thiserror::Error;

use crate::{pipeline::Pipeline, pipeline::PipelineSet, types::ConnectionHandle};

/// Reason code delivered alongside a remote disconnect event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ClosedByRemote,
    Timeout,
}

/// One event drained from the socket during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The handshake for this handle completed. Client-side only.
    Connect,
    /// An inbound payload arrived for this handle.
    Data(Vec<u8>),
    /// The remote end of this handle went away.
    Disconnect(DisconnectReason),
}

/// Token representing the in-flight asynchronous socket-update operation.
///
/// Deliberately neither `Clone` nor `Copy`: the token is surrendered by
/// value to [`Socket::complete_update`], so a handle is completed exactly
/// once and at most one can be outstanding per session.
#[derive(Debug, PartialEq, Eq)]
pub struct UpdateHandle(u64);

impl UpdateHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Error returned when a frame could not be submitted for delivery.
#[derive(Debug)]
pub struct SendError;

/// Setup failures while binding or connecting a socket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("address already in use: {0}")]
    AddressInUse(SocketAddr),
    #[error("socket is already attached to {0}")]
    AlreadyBound(SocketAddr),
}

/// Abstract point-to-point socket with three delivery channels.
///
/// A server socket is `listen`ed then `accept`ed from; a client socket is
/// `connect`ed. Both sides pump [`Socket::poll_event`] each tick and submit
/// frames with [`Socket::send`]. Outgoing sends are flushed and new events
/// gathered by the asynchronous update scheduled at the end of a tick; the
/// returned [`UpdateHandle`] must be completed before any other socket
/// operation on a later tick. Dispose is `Drop`.
pub trait Socket {
    /// Binds to `addr` and begins listening for incoming connections.
    fn listen(&mut self, addr: SocketAddr) -> Result<(), TransportError>;

    /// Issues a connect request toward `addr`, returning the local handle
    /// for the pending association.
    fn connect(&mut self, addr: SocketAddr) -> Result<ConnectionHandle, TransportError>;

    /// The three delivery channels created with this socket.
    fn pipelines(&self) -> PipelineSet;

    /// Accepts one pending incoming connection, if any.
    fn accept(&mut self) -> Option<ConnectionHandle>;

    /// Pops the next queued socket event, if any.
    fn poll_event(&mut self) -> Option<(ConnectionHandle, SocketEvent)>;

    /// Submits one framed message for `handle` on the given pipeline.
    fn send(
        &mut self,
        handle: ConnectionHandle,
        pipeline: Pipeline,
        frame: &[u8],
    ) -> Result<(), SendError>;

    /// Requests socket-level disconnect of `handle`.
    fn disconnect(&mut self, handle: ConnectionHandle);

    /// Schedules the asynchronous update that flushes outgoing sends and
    /// gathers new events.
    fn schedule_update(&mut self) -> UpdateHandle;

    /// Blocks until the update identified by `handle` has fully completed.
    fn complete_update(&mut self, handle: UpdateHandle);

    /// Synchronously flushes all outgoing sends.
    fn flush(&mut self);
}
