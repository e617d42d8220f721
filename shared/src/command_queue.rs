use std::collections::VecDeque;

/// A deferred zero-argument operation, executed against the owning session's
/// context at the next tick boundary.
pub type Command<Ctx> = Box<dyn FnOnce(&mut Ctx)>;

/// Ordered sequence of deferred operations.
///
/// Operations enqueued off-tick are drained, in enqueue order, at the start
/// of the next tick. The queue is cleared without executing anything on
/// session stop/disconnect so no stale operation runs against a torn-down
/// socket.
pub struct CommandQueue<Ctx> {
    commands: VecDeque<Command<Ctx>>,
}

impl<Ctx> CommandQueue<Ctx> {
    pub fn new() -> Self {
        Self {
            commands: VecDeque::new(),
        }
    }

    /// Appends `command` to the tail.
    pub fn enqueue(&mut self, command: impl FnOnce(&mut Ctx) + 'static) {
        self.commands.push_back(Box::new(command));
    }

    /// Pops and executes the head until the queue is empty.
    pub fn drain(&mut self, ctx: &mut Ctx) {
        while let Some(command) = self.commands.pop_front() {
            command(ctx);
        }
    }

    /// Discards all pending commands without executing them.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<Ctx> Default for CommandQueue<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}
