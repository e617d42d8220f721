use std::{
    cell::RefCell,
    net::{IpAddr, SocketAddr},
    rc::Rc,
};

use log::{debug, info, warn};

use ticknet_shared::{
    CommandQueue, ConnectionHandle, MessageId, MessageReader, MessageTable, MessageWriter,
    PipelineSet, SendMode, Socket, SocketEvent, TickHooks, UpdateHandle,
};

/// Receive handler registered for one message id on the client. Receives the
/// session context (for replies) and the payload remaining after the id byte.
pub type ClientMessageHandler = Rc<RefCell<dyn FnMut(&mut ClientContext, &mut MessageReader<'_>)>>;

/// Connection progress of the client session, derived from handle validity
/// plus the handshake flag. Transitions are strictly forward except on
/// disconnect, which resets to `Disconnected` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection handle exists.
    Disconnected,
    /// A handle exists but the handshake has not been acknowledged.
    Connecting,
    /// The handshake has been acknowledged.
    Connected,
}

/// Socket-facing half of the client session: the outbound socket, its
/// pipeline set, the server handle, the handshake flag, and the pending
/// update handle. Queue commands and message handlers execute against this
/// context.
pub struct ClientContext {
    socket: Option<Box<dyn Socket>>,
    pipelines: PipelineSet,
    server: Option<ConnectionHandle>,
    handshaken: bool,
    pending_update: Option<UpdateHandle>,
}

impl ClientContext {
    fn new() -> Self {
        Self {
            socket: None,
            pipelines: PipelineSet::default(),
            server: None,
            handshaken: false,
            pending_update: None,
        }
    }

    /// Current state, derived purely from (handle validity, handshake flag).
    pub fn connection_state(&self) -> ConnectionState {
        match (&self.server, self.handshaken) {
            (None, _) => ConnectionState::Disconnected,
            (Some(_), false) => ConnectionState::Connecting,
            (Some(_), true) => ConnectionState::Connected,
        }
    }

    /// Immediately composes `[id][payload]` and submits it to the server on
    /// the channel selected by `mode`. Drops silently unless the state is
    /// `Connected`.
    pub fn send_message(
        &mut self,
        id: MessageId,
        write: impl FnOnce(&mut MessageWriter),
        mode: SendMode,
    ) {
        if self.connection_state() != ConnectionState::Connected {
            return;
        }
        let (Some(socket), Some(server)) = (self.socket.as_mut(), self.server) else {
            return;
        };
        let frame = MessageWriter::frame(id, write);
        let pipeline = self.pipelines.select(mode);
        if socket.send(server, pipeline, &frame).is_err() {
            debug!("dropped message {id}: connection no longer valid");
        }
    }

    fn connect(&mut self, mut socket: Box<dyn Socket>, host: &str, port: u16) {
        let Ok(ip) = host.parse::<IpAddr>() else {
            warn!("cannot parse server address: {host}");
            return;
        };
        let addr = SocketAddr::new(ip, port);
        match socket.connect(addr) {
            Ok(handle) => {
                self.pipelines = socket.pipelines();
                self.socket = Some(socket);
                self.server = Some(handle);
                self.handshaken = false;
                info!("connecting to {addr} as {handle}");
            }
            Err(error) => {
                // the partially-created socket is dropped here
                warn!("connect request to {addr} failed: {error}");
            }
        }
    }

    fn disconnect(&mut self) {
        let Some(mut socket) = self.socket.take() else {
            return;
        };
        if let Some(server) = self.server.take() {
            socket.disconnect(server);
        }
        socket.flush();
        self.handshaken = false;
        self.pending_update = None;
        info!("disconnected from server");
        // socket is disposed here
    }

    /// Remote-forced teardown: invalidates the handle and disposes the
    /// socket without a flush, since the remote end is already gone.
    fn reset(&mut self) {
        self.socket = None;
        self.server = None;
        self.handshaken = false;
        self.pending_update = None;
    }

    fn mark_connected(&mut self) {
        self.handshaken = true;
    }

    fn poll_event(&mut self) -> Option<(ConnectionHandle, SocketEvent)> {
        self.socket.as_mut()?.poll_event()
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

/// Tick-synchronized client session.
///
/// Owns the single outbound socket, its connection state machine, its
/// message dispatch table, and its command queue. The host scheduler must
/// call [`Client::begin_tick`] immediately before its fixed-step body and
/// [`Client::end_tick`] immediately after; `send_message` may be called at
/// any time and is deferred to the next tick boundary when the caller is
/// not already inside the tick.
pub struct Client {
    context: ClientContext,
    queue: CommandQueue<ClientContext>,
    messages: MessageTable<ClientMessageHandler>,
    in_tick: bool,
}

impl Client {
    /// Creates a new disconnected Client.
    pub fn new() -> Self {
        Self {
            context: ClientContext::new(),
            queue: CommandQueue::new(),
            messages: MessageTable::new(),
            in_tick: false,
        }
    }

    /// Current state of the connection state machine.
    pub fn connection_state(&self) -> ConnectionState {
        self.context.connection_state()
    }

    /// Returns whether the caller is currently inside the tick's
    /// command-processing window.
    pub fn is_on_tick(&self) -> bool {
        self.in_tick
    }

    /// Issues a connect request toward `host:port` over `socket`. No-op
    /// unless currently `Disconnected`; an unparseable `host` is logged and
    /// leaves the session disconnected.
    pub fn connect(&mut self, socket: impl Into<Box<dyn Socket>>, host: &str, port: u16) {
        if self.context.connection_state() != ConnectionState::Disconnected {
            return;
        }
        self.queue.clear();
        self.context.connect(socket.into(), host, port);
    }

    /// Disconnects from the server, flushing outgoing sends before the
    /// socket is disposed. No-op if already `Disconnected`.
    pub fn disconnect(&mut self) {
        if self.context.connection_state() == ConnectionState::Disconnected {
            return;
        }
        self.context.complete_pending_update();
        self.context.disconnect();
        self.queue.clear();
    }

    /// Sends `[id][payload]` to the server on the channel selected by
    /// `mode`. Deferred to the next tick boundary when called off-tick;
    /// drops silently unless the state is `Connected` at execution time.
    pub fn send_message(
        &mut self,
        id: MessageId,
        write: impl FnOnce(&mut MessageWriter) + 'static,
        mode: SendMode,
    ) {
        self.dispatch_or_enqueue(move |context| context.send_message(id, write, mode));
    }

    /// Registers `handler` for `id`, replacing any previous registration.
    pub fn register_message(
        &mut self,
        id: MessageId,
        handler: impl FnMut(&mut ClientContext, &mut MessageReader<'_>) + 'static,
    ) {
        self.messages.register(id, Rc::new(RefCell::new(handler)));
    }

    /// Removes the handler for `id` if present.
    pub fn unregister_message(&mut self, id: MessageId) {
        self.messages.unregister(id);
    }

    /// Awaits the pending socket update, drains the command queue, and pumps
    /// all pending socket events into dispatch. Call immediately before the
    /// fixed-step simulation body.
    pub fn begin_tick(&mut self) {
        self.context.complete_pending_update();
        self.in_tick = true;
        if self.context.connection_state() == ConnectionState::Disconnected {
            return;
        }

        self.queue.drain(&mut self.context);

        while let Some((handle, event)) = self.context.poll_event() {
            match event {
                SocketEvent::Connect => {
                    self.context.mark_connected();
                    info!("connected to server as {handle}");
                }
                SocketEvent::Data(payload) => self.dispatch(&payload),
                SocketEvent::Disconnect(reason) => {
                    warn!("server closed the connection ({reason:?})");
                    self.context.reset();
                    self.queue.clear();
                    // the socket is gone; no further events this tick
                }
            }
        }
    }

    /// Issues the asynchronous socket-update request that will be awaited at
    /// the start of the following tick. Call immediately after the
    /// fixed-step simulation body.
    pub fn end_tick(&mut self) {
        if self.context.connection_state() != ConnectionState::Disconnected {
            self.context.schedule_update();
        }
        self.in_tick = false;
    }

    fn dispatch_or_enqueue(&mut self, command: impl FnOnce(&mut ClientContext) + 'static) {
        if self.in_tick {
            command(&mut self.context);
        } else {
            self.queue.enqueue(command);
        }
    }

    fn dispatch(&mut self, payload: &[u8]) {
        if payload.is_empty() {
            return;
        }
        let id = payload[0];
        let Some(handler) = self.messages.get(id).cloned() else {
            debug!("no handler registered for message id {id}, dropping");
            return;
        };
        let mut reader = MessageReader::new(&payload[1..]);
        let mut callback = handler.borrow_mut();
        (*callback)(&mut self.context, &mut reader);
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl TickHooks for Client {
    fn begin_tick(&mut self) {
        Client::begin_tick(self);
    }

    fn end_tick(&mut self) {
        Client::end_tick(self);
    }
}
