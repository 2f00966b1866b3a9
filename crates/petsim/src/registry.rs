use std::collections::HashMap;
use std::fmt;

use rand::Rng;

use crate::geometry::{Bounds, Size, Vec2};
use crate::profile::{PetKind, PetProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AgentState {
    #[default]
    Idle,
    Walking,
    Paused,
}

impl AgentState {
    pub fn is_walking(self) -> bool {
        matches!(self, Self::Walking)
    }
}

/// Coarse compass heading; each axis is always -1 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Direction {
    dx: i8,
    dy: i8,
}

impl Direction {
    pub fn new(dx: i8, dy: i8) -> Self {
        Self {
            dx: if dx < 0 { -1 } else { 1 },
            dy: if dy < 0 { -1 } else { 1 },
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let dx = if rng.gen_bool(0.5) { 1 } else { -1 };
        let dy = if rng.gen_bool(0.5) { 1 } else { -1 };
        Self { dx, dy }
    }

    pub fn dx(self) -> i8 {
        self.dx
    }

    pub fn dy(self) -> i8 {
        self.dy
    }

    pub(crate) fn flip_x(&mut self) {
        self.dx = -self.dx;
    }

    pub(crate) fn flip_y(&mut self) {
        self.dy = -self.dy;
    }

    pub fn facing(self) -> Facing {
        if self.dx > 0 {
            Facing::Right
        } else {
            Facing::Left
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Left,
    Right,
}

impl Facing {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Agent {
    id: AgentId,
    kind: PetKind,
    profile: PetProfile,
    pub(crate) position: Vec2,
    pub(crate) direction: Direction,
    pub(crate) facing: Facing,
    pub(crate) speed: f32,
    pub(crate) state: AgentState,
    /// Walking flag last announced through `StateChanged`.
    pub(crate) reported_walking: bool,
    pub(crate) next_transition_at: f64,
    pub(crate) bounds: Option<Bounds>,
    pub(crate) dimensions: Option<Size>,
    pub(crate) layer_value: Option<i32>,
    pub(crate) shadow_enabled: bool,
}

impl Agent {
    pub(crate) fn new(
        id: AgentId,
        kind: PetKind,
        profile: PetProfile,
        position: Vec2,
        direction: Direction,
        speed: f32,
    ) -> Self {
        Self {
            id,
            kind,
            profile,
            position,
            direction,
            facing: direction.facing(),
            speed,
            state: AgentState::Idle,
            reported_walking: false,
            next_transition_at: 0.0,
            bounds: None,
            dimensions: None,
            layer_value: None,
            shadow_enabled: profile.casts_shadow,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn kind(&self) -> &PetKind {
        &self.kind
    }

    pub fn profile(&self) -> &PetProfile {
        &self.profile
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn next_transition_at(&self) -> f64 {
        self.next_transition_at
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn dimensions(&self) -> Option<Size> {
        self.dimensions
    }

    /// Size used for geometry; unmeasured agents count as zero-sized.
    pub fn extent(&self) -> Size {
        self.dimensions.unwrap_or_default()
    }

    pub fn layer_value(&self) -> Option<i32> {
        self.layer_value
    }

    pub fn shadow_enabled(&self) -> bool {
        self.shadow_enabled
    }

    /// Vertical coordinate where the pet's feet meet the ground.
    pub fn foot_position(&self) -> f32 {
        self.position.y + self.extent().height * self.profile.foot_ratio
    }
}

/// Authoritative set of simulated agents, kept in registration order.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
    index_by_id: HashMap<AgentId, usize>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.index_by_id.contains_key(&id)
    }

    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.index_by_id
            .get(&id)
            .and_then(|index| self.agents.get(*index))
    }

    pub(crate) fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        let index = *self.index_by_id.get(&id)?;
        self.agents.get_mut(index)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub(crate) fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.agents.iter().map(Agent::id)
    }

    /// Returns `false` when the id is already present.
    pub(crate) fn insert(&mut self, agent: Agent) -> bool {
        if self.index_by_id.contains_key(&agent.id) {
            return false;
        }
        self.index_by_id.insert(agent.id, self.agents.len());
        self.agents.push(agent);
        true
    }

    pub(crate) fn remove(&mut self, id: AgentId) -> Option<Agent> {
        let index = self.index_by_id.remove(&id)?;
        let agent = self.agents.remove(index);
        for later in &self.agents[index..] {
            if let Some(slot) = self.index_by_id.get_mut(&later.id) {
                *slot -= 1;
            }
        }
        Some(agent)
    }

    pub(crate) fn set_dimensions(&mut self, id: AgentId, dimensions: Size) -> bool {
        match self.get_mut(id) {
            Some(agent) => {
                agent.dimensions = Some(dimensions);
                true
            }
            None => false,
        }
    }
}
