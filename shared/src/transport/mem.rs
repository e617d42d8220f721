//! In-process loopback transport.
//!
//! Sockets created from the same [`MemoryNetwork`] reach each other through
//! a shared hub keyed by socket address. All three pipelines deliver in
//! order without loss; the hub exists so sessions can be driven end to end
//! in tests, not to model a lossy link.

use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard},
};

use log::debug;

use crate::{
    pipeline::{Pipeline, PipelineSet},
    transport::{
        DisconnectReason, SendError, Socket, SocketEvent, TransportError, UpdateHandle,
    },
    types::ConnectionHandle,
};

const MEM_PIPELINES: PipelineSet =
    PipelineSet::new(Pipeline::NULL, Pipeline::new(1), Pipeline::new(2));

type SocketId = u64;

struct PeerLink {
    remote_socket: SocketId,
    remote_handle: ConnectionHandle,
}

#[derive(Default)]
struct SocketState {
    pending_accepts: VecDeque<ConnectionHandle>,
    events: VecDeque<(ConnectionHandle, SocketEvent)>,
    peers: HashMap<ConnectionHandle, PeerLink>,
    outbox: VecDeque<(ConnectionHandle, Vec<u8>)>,
}

#[derive(Default)]
struct NetworkInner {
    listeners: HashMap<SocketAddr, SocketId>,
    sockets: HashMap<SocketId, SocketState>,
    next_socket: SocketId,
    next_handle: u64,
    next_update: u64,
}

impl NetworkInner {
    fn mint_handle(&mut self) -> ConnectionHandle {
        let handle = ConnectionHandle::new(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn flush_outbox(&mut self, socket_id: SocketId) {
        let Some(socket) = self.sockets.get_mut(&socket_id) else {
            return;
        };
        let outbox = std::mem::take(&mut socket.outbox);
        for (local_handle, frame) in outbox {
            let Some(socket) = self.sockets.get(&socket_id) else {
                return;
            };
            let Some(link) = socket.peers.get(&local_handle) else {
                debug!("dropped {} queued bytes for stale {local_handle}", frame.len());
                continue;
            };
            let remote_handle = link.remote_handle;
            let remote_socket = link.remote_socket;
            if let Some(remote) = self.sockets.get_mut(&remote_socket) {
                if remote.peers.contains_key(&remote_handle) {
                    remote
                        .events
                        .push_back((remote_handle, SocketEvent::Data(frame)));
                }
            }
        }
    }

    /// Tears down one association, delivering a disconnect to the peer.
    fn sever(&mut self, socket_id: SocketId, handle: ConnectionHandle) {
        self.flush_outbox(socket_id);
        let Some(socket) = self.sockets.get_mut(&socket_id) else {
            return;
        };
        let Some(link) = socket.peers.remove(&handle) else {
            return;
        };
        if let Some(remote) = self.sockets.get_mut(&link.remote_socket) {
            remote
                .pending_accepts
                .retain(|pending| *pending != link.remote_handle);
            if remote.peers.remove(&link.remote_handle).is_some() {
                remote.events.push_back((
                    link.remote_handle,
                    SocketEvent::Disconnect(DisconnectReason::ClosedByRemote),
                ));
            }
        }
    }
}

/// Hub shared by every in-memory socket. Clone it to hand sockets to
/// multiple sessions within one process.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new unbound socket on this network.
    pub fn socket(&self) -> MemorySocket {
        let mut inner = self.lock();
        let id = inner.next_socket;
        inner.next_socket += 1;
        inner.sockets.insert(id, SocketState::default());
        MemorySocket {
            network: self.clone(),
            id,
            bound: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, NetworkInner> {
        self.inner.lock().expect("memory network lock poisoned")
    }
}

/// One endpoint on a [`MemoryNetwork`].
pub struct MemorySocket {
    network: MemoryNetwork,
    id: SocketId,
    bound: Option<SocketAddr>,
}

impl Socket for MemorySocket {
    fn listen(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        if let Some(bound) = self.bound {
            return Err(TransportError::AlreadyBound(bound));
        }
        let mut inner = self.network.lock();
        if inner.listeners.contains_key(&addr) {
            return Err(TransportError::AddressInUse(addr));
        }
        inner.listeners.insert(addr, self.id);
        self.bound = Some(addr);
        Ok(())
    }

    fn connect(&mut self, addr: SocketAddr) -> Result<ConnectionHandle, TransportError> {
        let mut inner = self.network.lock();
        let local_handle = inner.mint_handle();
        // a listener bound to the wildcard address answers for every IP on
        // its port
        let wildcard = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), addr.port());
        let listener = inner
            .listeners
            .get(&addr)
            .or_else(|| inner.listeners.get(&wildcard))
            .copied();
        let Some(listener) = listener else {
            // nobody listening; surfaced as a timeout on a later tick
            if let Some(socket) = inner.sockets.get_mut(&self.id) {
                socket.events.push_back((
                    local_handle,
                    SocketEvent::Disconnect(DisconnectReason::Timeout),
                ));
            }
            return Ok(local_handle);
        };
        let remote_handle = inner.mint_handle();
        if let Some(socket) = inner.sockets.get_mut(&self.id) {
            socket.peers.insert(
                local_handle,
                PeerLink {
                    remote_socket: listener,
                    remote_handle,
                },
            );
        }
        if let Some(remote) = inner.sockets.get_mut(&listener) {
            remote.peers.insert(
                remote_handle,
                PeerLink {
                    remote_socket: self.id,
                    remote_handle: local_handle,
                },
            );
            remote.pending_accepts.push_back(remote_handle);
        }
        Ok(local_handle)
    }

    fn pipelines(&self) -> PipelineSet {
        MEM_PIPELINES
    }

    fn accept(&mut self) -> Option<ConnectionHandle> {
        let mut inner = self.network.lock();
        loop {
            let handle = inner.sockets.get_mut(&self.id)?.pending_accepts.pop_front()?;
            let Some(link) = inner
                .sockets
                .get(&self.id)
                .and_then(|socket| socket.peers.get(&handle))
            else {
                // peer went away before we accepted it
                continue;
            };
            let remote_handle = link.remote_handle;
            let remote_socket = link.remote_socket;
            if let Some(remote) = inner.sockets.get_mut(&remote_socket) {
                remote
                    .events
                    .push_back((remote_handle, SocketEvent::Connect));
            }
            return Some(handle);
        }
    }

    fn poll_event(&mut self) -> Option<(ConnectionHandle, SocketEvent)> {
        let mut inner = self.network.lock();
        inner.sockets.get_mut(&self.id)?.events.pop_front()
    }

    fn send(
        &mut self,
        handle: ConnectionHandle,
        _pipeline: Pipeline,
        frame: &[u8],
    ) -> Result<(), SendError> {
        let mut inner = self.network.lock();
        let socket = inner.sockets.get_mut(&self.id).ok_or(SendError)?;
        if !socket.peers.contains_key(&handle) {
            return Err(SendError);
        }
        socket.outbox.push_back((handle, frame.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self, handle: ConnectionHandle) {
        let mut inner = self.network.lock();
        inner.sever(self.id, handle);
    }

    fn schedule_update(&mut self) -> UpdateHandle {
        let mut inner = self.network.lock();
        inner.flush_outbox(self.id);
        let update = UpdateHandle::new(inner.next_update);
        inner.next_update += 1;
        update
    }

    fn complete_update(&mut self, _handle: UpdateHandle) {
        // the update ran synchronously when it was scheduled
    }

    fn flush(&mut self) {
        let mut inner = self.network.lock();
        inner.flush_outbox(self.id);
    }
}

impl Drop for MemorySocket {
    fn drop(&mut self) {
        let mut inner = self.network.lock();
        if let Some(addr) = self.bound.take() {
            inner.listeners.remove(&addr);
        }
        let handles: Vec<ConnectionHandle> = inner
            .sockets
            .get(&self.id)
            .map(|socket| socket.peers.keys().copied().collect())
            .unwrap_or_default();
        for handle in handles {
            inner.sever(self.id, handle);
        }
        inner.sockets.remove(&self.id);
    }
}

impl From<MemorySocket> for Box<dyn Socket> {
    fn from(socket: MemorySocket) -> Self {
        Box::new(socket)
    }
}
