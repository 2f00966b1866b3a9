use std::ops::AddAssign;

use serde::Serialize;

use crate::registry::{AgentId, Facing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Paused and Idle both report `walking: false`.
    StateChanged { agent: AgentId, walking: bool },
    DirectionChanged { agent: AgentId, facing: Facing },
}

impl Notification {
    pub fn agent(&self) -> AgentId {
        match self {
            Self::StateChanged { agent, .. } | Self::DirectionChanged { agent, .. } => *agent,
        }
    }
}

/// Per-kind totals for the notifications of one tick (or a sum of ticks).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotificationCounts {
    pub state_changed: u32,
    pub direction_changed: u32,
}

impl NotificationCounts {
    pub fn total(&self) -> u32 {
        self.state_changed.saturating_add(self.direction_changed)
    }
}

impl AddAssign for NotificationCounts {
    fn add_assign(&mut self, other: Self) {
        self.state_changed = self.state_changed.saturating_add(other.state_changed);
        self.direction_changed = self.direction_changed.saturating_add(other.direction_changed);
    }
}

/// Notifications emitted since the host last drained them.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: Vec<Notification>,
    last_tick_counts: NotificationCounts,
    current_tick_counts: NotificationCounts,
}

impl NotificationQueue {
    pub fn emit(&mut self, notification: Notification) {
        match notification {
            Notification::StateChanged { .. } => {
                self.current_tick_counts.state_changed =
                    self.current_tick_counts.state_changed.saturating_add(1);
            }
            Notification::DirectionChanged { .. } => {
                self.current_tick_counts.direction_changed =
                    self.current_tick_counts.direction_changed.saturating_add(1);
            }
        }
        self.pending.push(notification);
    }

    pub fn pending(&self) -> &[Notification] {
        &self.pending
    }

    pub fn drain(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }

    pub fn finish_tick_rollover(&mut self) {
        self.last_tick_counts = self.current_tick_counts;
        self.current_tick_counts = NotificationCounts::default();
    }

    pub fn last_tick_counts(&self) -> NotificationCounts {
        self.last_tick_counts
    }
}
