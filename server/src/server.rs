use std::{
    cell::RefCell,
    collections::HashSet,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    rc::Rc,
};

use log::{debug, info, warn};

use ticknet_shared::{
    CommandQueue, ConnectionHandle, DisconnectReason, MessageId, MessageReader, MessageTable,
    MessageWriter, PipelineSet, SendMode, Socket, SocketEvent, TickHooks, UpdateHandle,
};

/// Receive handler registered for one message id on the server. Receives the
/// session context (for replies and registry queries), the originating
/// connection, and the payload remaining after the id byte.
pub type ServerMessageHandler =
    Rc<RefCell<dyn FnMut(&mut ServerContext, ConnectionHandle, &mut MessageReader<'_>)>>;

/// Socket-facing half of the server session: the listening socket, its
/// pipeline set, the connection registry, and the pending update handle.
///
/// Queue commands and message handlers execute against this context; all
/// mutation funnels through the owning [`Server`]'s tick protocol, so no
/// locking is involved.
pub struct ServerContext {
    socket: Option<Box<dyn Socket>>,
    pipelines: PipelineSet,
    connections: HashSet<ConnectionHandle>,
    pending_update: Option<UpdateHandle>,
}

impl ServerContext {
    fn new() -> Self {
        Self {
            socket: None,
            pipelines: PipelineSet::default(),
            connections: HashSet::new(),
            pending_update: None,
        }
    }

    /// Returns whether the session has a live listening socket.
    pub fn is_running(&self) -> bool {
        self.socket.is_some()
    }

    /// Number of currently accepted connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Returns whether `handle` is currently registered.
    pub fn has_connection(&self, handle: ConnectionHandle) -> bool {
        self.connections.contains(&handle)
    }

    /// Snapshot of the currently accepted connections.
    pub fn connection_handles(&self) -> Vec<ConnectionHandle> {
        self.connections.iter().copied().collect()
    }

    /// Immediately removes `handle` from the registry and requests a
    /// socket-level disconnect. No-op if the handle is not registered.
    pub fn disconnect(&mut self, handle: ConnectionHandle) {
        if !self.connections.remove(&handle) {
            return;
        }
        if let Some(socket) = self.socket.as_mut() {
            socket.disconnect(handle);
        }
        info!("server disconnected {handle}");
    }

    /// Immediately composes `[id][payload]` and submits it to `handle` on
    /// the channel selected by `mode`. Drops silently if the handle is no
    /// longer valid.
    pub fn send_to(
        &mut self,
        handle: ConnectionHandle,
        id: MessageId,
        write: impl FnOnce(&mut MessageWriter),
        mode: SendMode,
    ) {
        if !self.connections.contains(&handle) {
            return;
        }
        let frame = MessageWriter::frame(id, write);
        self.submit(handle, &frame, mode);
    }

    /// Immediate broadcast to every registered connection.
    pub fn send_to_all(
        &mut self,
        id: MessageId,
        write: impl FnOnce(&mut MessageWriter),
        mode: SendMode,
    ) {
        self.send_to_filtered(id, write, |_| true, mode);
    }

    /// Immediate broadcast to every registered connection the predicate
    /// accepts. The registry is snapshotted here, at execution time, and the
    /// frame is composed once for all targets.
    pub fn send_to_filtered(
        &mut self,
        id: MessageId,
        write: impl FnOnce(&mut MessageWriter),
        filter: impl Fn(ConnectionHandle) -> bool,
        mode: SendMode,
    ) {
        if !self.is_running() {
            return;
        }
        let frame = MessageWriter::frame(id, write);
        let mut targets: Vec<ConnectionHandle> = self
            .connections
            .iter()
            .copied()
            .filter(|handle| filter(*handle))
            .collect();
        // shuffle send order to avoid priority among connections
        fastrand::shuffle(&mut targets);
        for handle in targets {
            self.submit(handle, &frame, mode);
        }
    }

    fn submit(&mut self, handle: ConnectionHandle, frame: &[u8], mode: SendMode) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        let pipeline = self.pipelines.select(mode);
        if socket.send(handle, pipeline, frame).is_err() {
            debug!("dropped send to stale {handle}");
        }
    }

    fn start(&mut self, mut socket: Box<dyn Socket>, port: u16) {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        if let Err(error) = socket.listen(addr) {
            // non-fatal: the partially-created socket is dropped here and
            // the session stays stopped so the caller may retry
            warn!("server failed to listen on port {port}: {error}");
            return;
        }
        self.pipelines = socket.pipelines();
        self.socket = Some(socket);
        info!("server listening on port {port}");
    }

    fn stop(&mut self) {
        let Some(mut socket) = self.socket.take() else {
            return;
        };
        for handle in self.connections.drain() {
            socket.disconnect(handle);
        }
        socket.flush();
        info!("server stopped");
        // socket is disposed here
    }

    fn accept(&mut self) -> Option<ConnectionHandle> {
        let socket = self.socket.as_mut()?;
        let handle = socket.accept()?;
        self.connections.insert(handle);
        info!("server accepted {handle}");
        Some(handle)
    }

    fn poll_event(&mut self) -> Option<(ConnectionHandle, SocketEvent)> {
        self.socket.as_mut()?.poll_event()
    }

    fn drop_connection(&mut self, handle: ConnectionHandle, reason: DisconnectReason) {
        // duplicate disconnect delivery leaves the registry untouched
        if self.connections.remove(&handle) {
            info!("{handle} disconnected ({reason:?})");
        }
    }

    fn complete_pending_update(&mut self) {
        if let (Some(update), Some(socket)) = (self.pending_update.take(), self.socket.as_mut()) {
            socket.complete_update(update);
        }
    }

    fn schedule_update(&mut self) {
        if let Some(socket) = self.socket.as_mut() {
            self.pending_update = Some(socket.schedule_update());
        }
    }
}

/// Tick-synchronized server session.
///
/// Owns the listening socket, the connection registry, the message dispatch
/// table, and the command queue. The host scheduler must call
/// [`Server::begin_tick`] immediately before its fixed-step body and
/// [`Server::end_tick`] immediately after; `send_*` and `disconnect` may be
/// called at any time and are deferred to the next tick boundary when the
/// caller is not already inside the tick.
pub struct Server {
    context: ServerContext,
    queue: CommandQueue<ServerContext>,
    messages: MessageTable<ServerMessageHandler>,
    in_tick: bool,
}

impl Server {
    /// Creates a new stopped Server.
    pub fn new() -> Self {
        Self {
            context: ServerContext::new(),
            queue: CommandQueue::new(),
            messages: MessageTable::new(),
            in_tick: false,
        }
    }

    /// Returns whether the Server is listening for clients.
    pub fn is_running(&self) -> bool {
        self.context.is_running()
    }

    /// Number of currently accepted connections.
    pub fn connection_count(&self) -> usize {
        self.context.connection_count()
    }

    /// Returns whether `handle` is currently registered.
    pub fn has_connection(&self, handle: ConnectionHandle) -> bool {
        self.context.has_connection(handle)
    }

    /// Snapshot of the currently accepted connections.
    pub fn connection_handles(&self) -> Vec<ConnectionHandle> {
        self.context.connection_handles()
    }

    /// Returns whether the caller is currently inside the tick's
    /// command-processing window.
    pub fn is_on_tick(&self) -> bool {
        self.in_tick
    }

    /// Binds `socket` to the given port on all interfaces and starts
    /// listening. No-op if already running. On failure the socket is
    /// disposed, the failure is logged, and the session remains stopped.
    pub fn start(&mut self, socket: impl Into<Box<dyn Socket>>, port: u16) {
        if self.context.is_running() {
            return;
        }
        self.context.start(socket.into(), port);
        if self.context.is_running() {
            self.queue.clear();
        }
    }

    /// Disconnects every registered connection, flushes outgoing sends,
    /// disposes the socket, and clears the command queue. No-op if not
    /// running.
    pub fn stop(&mut self) {
        if !self.context.is_running() {
            return;
        }
        self.context.complete_pending_update();
        self.context.stop();
        self.queue.clear();
    }

    /// Disconnects `handle`: immediately when called on-tick, at the next
    /// tick boundary otherwise. No-op if the handle is not registered at
    /// execution time.
    pub fn disconnect(&mut self, handle: ConnectionHandle) {
        self.dispatch_or_enqueue(move |context| context.disconnect(handle));
    }

    /// Sends `[id][payload]` to `handle` on the channel selected by `mode`.
    /// Deferred to the next tick boundary when called off-tick; drops
    /// silently if the handle is no longer valid at execution time.
    pub fn send_to(
        &mut self,
        handle: ConnectionHandle,
        id: MessageId,
        write: impl FnOnce(&mut MessageWriter) + 'static,
        mode: SendMode,
    ) {
        self.dispatch_or_enqueue(move |context| context.send_to(handle, id, write, mode));
    }

    /// Broadcasts `[id][payload]` to every connection registered at
    /// execution time. Best-effort, not a transactional multicast.
    pub fn send_to_all(
        &mut self,
        id: MessageId,
        write: impl FnOnce(&mut MessageWriter) + 'static,
        mode: SendMode,
    ) {
        self.dispatch_or_enqueue(move |context| context.send_to_all(id, write, mode));
    }

    /// Broadcasts `[id][payload]` to every connection the predicate accepts.
    /// The registry is snapshotted at execution time, not at call time.
    pub fn send_to_filtered(
        &mut self,
        id: MessageId,
        write: impl FnOnce(&mut MessageWriter) + 'static,
        filter: impl Fn(ConnectionHandle) -> bool + 'static,
        mode: SendMode,
    ) {
        self.dispatch_or_enqueue(move |context| context.send_to_filtered(id, write, filter, mode));
    }

    /// Registers `handler` for `id`, replacing any previous registration.
    pub fn register_message(
        &mut self,
        id: MessageId,
        handler: impl FnMut(&mut ServerContext, ConnectionHandle, &mut MessageReader<'_>) + 'static,
    ) {
        self.messages.register(id, Rc::new(RefCell::new(handler)));
    }

    /// Removes the handler for `id` if present.
    pub fn unregister_message(&mut self, id: MessageId) {
        self.messages.unregister(id);
    }

    /// Awaits the pending socket update, drains the command queue, accepts
    /// new connections, and pumps all pending socket events into dispatch.
    /// Call immediately before the fixed-step simulation body.
    pub fn begin_tick(&mut self) {
        self.context.complete_pending_update();
        self.in_tick = true;
        if !self.context.is_running() {
            return;
        }

        self.queue.drain(&mut self.context);

        while self.context.accept().is_some() {}

        while let Some((handle, event)) = self.context.poll_event() {
            match event {
                // connect events are a client-side concern
                SocketEvent::Connect => {}
                SocketEvent::Data(payload) => self.dispatch(handle, &payload),
                SocketEvent::Disconnect(reason) => self.context.drop_connection(handle, reason),
            }
        }
    }

    /// Issues the asynchronous socket-update request that will be awaited at
    /// the start of the following tick. Call immediately after the
    /// fixed-step simulation body.
    pub fn end_tick(&mut self) {
        if self.context.is_running() {
            self.context.schedule_update();
        }
        self.in_tick = false;
    }

    fn dispatch_or_enqueue(&mut self, command: impl FnOnce(&mut ServerContext) + 'static) {
        if self.in_tick {
            command(&mut self.context);
        } else {
            self.queue.enqueue(command);
        }
    }

    fn dispatch(&mut self, handle: ConnectionHandle, payload: &[u8]) {
        if payload.is_empty() {
            return;
        }
        // the handle may have been invalidated earlier this tick, e.g. by a
        // queued disconnect; skip its remaining events silently
        if !self.context.has_connection(handle) {
            return;
        }
        let id = payload[0];
        let Some(handler) = self.messages.get(id).cloned() else {
            debug!("no handler registered for message id {id}, dropping");
            return;
        };
        let mut reader = MessageReader::new(&payload[1..]);
        let mut callback = handler.borrow_mut();
        (*callback)(&mut self.context, handle, &mut reader);
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl TickHooks for Server {
    fn begin_tick(&mut self) {
        Server::begin_tick(self);
    }

    fn end_tick(&mut self) {
        Server::end_tick(self);
    }
}
