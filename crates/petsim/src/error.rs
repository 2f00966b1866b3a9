use thiserror::Error;

use crate::registry::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("agent {0} is already registered; unregister it first")]
    DuplicateAgent(AgentId),
    #[error("no simulation container has been bound")]
    NoContainer,
    #[error("agent {0} has no usable movement bounds in the current container")]
    DegenerateBounds(AgentId),
    #[error("agent {0} is not registered")]
    UnknownAgent(AgentId),
}
