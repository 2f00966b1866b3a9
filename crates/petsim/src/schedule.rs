use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use crate::registry::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Re-roll direction or enter a pause.
    Wander,
    PauseExpiry,
}

new_key_type! {
    /// Generational handle into the scheduler. A handle whose transition was
    /// cancelled or fired is inert, even after its slot is reused.
    pub struct TransitionHandle;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DueTransition {
    pub agent: AgentId,
    pub kind: TransitionKind,
    pub due_at: f64,
}

#[derive(Debug, Clone, Copy)]
struct PendingTransition {
    agent: AgentId,
    kind: TransitionKind,
    due_at: f64,
}

/// At most one pending transition per agent.
#[derive(Debug, Default)]
pub struct TransitionScheduler {
    pending: SlotMap<TransitionHandle, PendingTransition>,
    handle_by_agent: HashMap<AgentId, TransitionHandle>,
    fired: Vec<TransitionHandle>,
}

impl TransitionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any transition already pending for `agent`.
    pub fn schedule(&mut self, agent: AgentId, due_at: f64, kind: TransitionKind) -> TransitionHandle {
        self.cancel(agent);
        let handle = self.pending.insert(PendingTransition {
            agent,
            kind,
            due_at,
        });
        self.handle_by_agent.insert(agent, handle);
        handle
    }

    pub fn cancel(&mut self, agent: AgentId) -> bool {
        let Some(handle) = self.handle_by_agent.remove(&agent) else {
            return false;
        };
        self.pending.remove(handle).is_some()
    }

    pub fn is_live(&self, handle: TransitionHandle) -> bool {
        self.pending.contains_key(handle)
    }

    pub fn handle_for(&self, agent: AgentId) -> Option<TransitionHandle> {
        self.handle_by_agent.get(&agent).copied()
    }

    pub fn pending_for(&self, agent: AgentId) -> Option<(f64, TransitionKind)> {
        let handle = self.handle_by_agent.get(&agent)?;
        self.pending
            .get(*handle)
            .map(|pending| (pending.due_at, pending.kind))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fires every transition due at or before `now`, in slot order. Fired
    /// handles become inert; callers reschedule as needed.
    pub fn take_due(&mut self, now: f64, out: &mut Vec<DueTransition>) {
        out.clear();
        self.fired.clear();
        for (handle, pending) in &self.pending {
            if pending.due_at > now {
                continue;
            }
            out.push(DueTransition {
                agent: pending.agent,
                kind: pending.kind,
                due_at: pending.due_at,
            });
            self.fired.push(handle);
        }
        for handle in self.fired.drain(..) {
            if let Some(pending) = self.pending.remove(handle) {
                self.handle_by_agent.remove(&pending.agent);
            }
        }
    }
}
