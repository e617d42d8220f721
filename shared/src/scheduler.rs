use std::{cell::RefCell, rc::Rc};

/// Per-tick hooks a session manager exposes to the host's fixed-rate
/// scheduler. The host must call `begin_tick` immediately before its
/// fixed-step body and `end_tick` immediately after, every fixed step.
pub trait TickHooks {
    /// Runs immediately before the fixed-step simulation body.
    fn begin_tick(&mut self);
    /// Runs immediately after the fixed-step simulation body.
    fn end_tick(&mut self);
}

/// Identifies one registered hook for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Host-side driver for the scheduling contract.
///
/// Stands in for whatever frame-loop integration the host engine provides:
/// sessions register here and the host calls [`Scheduler::run_tick`] once
/// per fixed step. Hooks run in registration order, before and after the
/// step body.
pub struct Scheduler {
    hooks: Vec<(HookId, Rc<RefCell<dyn TickHooks>>)>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            hooks: Vec::new(),
            next_id: 0,
        }
    }

    /// Registers a session's hooks for every subsequent tick.
    pub fn register(&mut self, hooks: Rc<RefCell<dyn TickHooks>>) -> HookId {
        let id = HookId(self.next_id);
        self.next_id += 1;
        self.hooks.push((id, hooks));
        id
    }

    /// Stops calling the hooks registered under `id`. No-op if already
    /// unregistered.
    pub fn unregister(&mut self, id: HookId) {
        self.hooks.retain(|(hook_id, _)| *hook_id != id);
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Runs one fixed step: all begin hooks, then `body`, then all end hooks.
    pub fn run_tick(&mut self, body: impl FnOnce()) {
        for (_, hooks) in &self.hooks {
            hooks.borrow_mut().begin_tick();
        }
        body();
        for (_, hooks) in &self.hooks {
            hooks.borrow_mut().end_tick();
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
