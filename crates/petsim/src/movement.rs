use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::MovementConfig;
use crate::error::SimError;
use crate::events::{Notification, NotificationQueue};
use crate::geometry::{Bounds, Size, Vec2};
use crate::profile::{PetKind, PetProfile};
use crate::registry::{Agent, AgentId, AgentRegistry, AgentState, Direction};
use crate::schedule::{DueTransition, TransitionKind, TransitionScheduler};

/// Per-registration overrides supplied by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegisterOptions {
    pub speed: Option<f32>,
    pub direction: Option<Direction>,
    /// Overrides the profile's `casts_shadow`.
    pub shadow: Option<bool>,
    pub dimensions: Option<Size>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionStats {
    pub wander_evaluations: u64,
    pub pauses_entered: u64,
}

impl TransitionStats {
    pub fn pause_fraction(&self) -> f64 {
        if self.wander_evaluations == 0 {
            return 0.0;
        }
        self.pauses_entered as f64 / self.wander_evaluations as f64
    }
}

pub struct MovementEngine {
    config: MovementConfig,
    rng: ChaCha8Rng,
    scheduler: TransitionScheduler,
    now: f64,
    due_scratch: Vec<DueTransition>,
    stats: TransitionStats,
}

impl MovementEngine {
    pub fn new(config: MovementConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            config,
            rng,
            scheduler: TransitionScheduler::new(),
            now: 0.0,
            due_scratch: Vec::new(),
            stats: TransitionStats::default(),
        }
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    /// Simulation time in seconds, advanced by `tick`.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn scheduler(&self) -> &TransitionScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> TransitionStats {
        self.stats
    }

    pub fn has_pending_transition(&self, id: AgentId) -> bool {
        self.scheduler.pending_for(id).is_some()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register_agent<'r>(
        &mut self,
        registry: &'r mut AgentRegistry,
        container: Option<Size>,
        id: AgentId,
        kind: PetKind,
        profile: PetProfile,
        initial_position: Vec2,
        options: RegisterOptions,
    ) -> Result<&'r Agent, SimError> {
        if registry.contains(id) {
            return Err(SimError::DuplicateAgent(id));
        }
        let Some(container) = container else {
            return Err(SimError::NoContainer);
        };

        let direction = options
            .direction
            .unwrap_or_else(|| Direction::random(&mut self.rng));
        let speed = match options.speed {
            Some(speed) if speed.is_finite() && speed >= 0.0 => speed,
            requested => {
                if let Some(speed) = requested {
                    warn!(agent = id.0, speed, "register_speed_rejected");
                }
                profile
                    .speed_range
                    .unwrap_or(self.config.speed_range)
                    .sample(&mut self.rng)
            }
        };

        let mut agent = Agent::new(id, kind, profile, initial_position, direction, speed);
        agent.dimensions = options.dimensions;
        agent.shadow_enabled = options.shadow.unwrap_or(profile.casts_shadow);
        agent.bounds = self.bounds_for(container, &agent);
        match agent.bounds {
            Some(bounds) if !bounds.contains(agent.position) => {
                agent.position = self.relocate_inside(agent.position, bounds);
            }
            Some(_) => {}
            None => {
                debug!(agent = id.0, "register_with_degenerate_bounds");
            }
        }
        self.start_walking(&mut agent);

        info!(
            agent = id.0,
            kind = %agent.kind(),
            x = agent.position.x,
            y = agent.position.y,
            speed = agent.speed,
            "agent_registered"
        );
        registry.insert(agent);
        registry.get(id).ok_or(SimError::UnknownAgent(id))
    }

    pub fn unregister_agent(&mut self, registry: &mut AgentRegistry, id: AgentId) -> bool {
        let cancelled = self.scheduler.cancel(id);
        match registry.remove(id) {
            Some(_) => {
                info!(agent = id.0, cancelled, "agent_unregistered");
                true
            }
            None => {
                warn!(agent = id.0, "unregister_unknown_agent");
                false
            }
        }
    }

    pub fn override_speed(&mut self, registry: &mut AgentRegistry, id: AgentId, speed: f32) -> bool {
        if !speed.is_finite() || speed < 0.0 {
            warn!(agent = id.0, speed, "speed_override_rejected");
            return false;
        }
        match registry.get_mut(id) {
            Some(agent) => {
                agent.speed = speed;
                true
            }
            None => {
                warn!(agent = id.0, "speed_override_unknown_agent");
                false
            }
        }
    }

    /// Advances every agent by `dt` seconds: integrate positions, then run
    /// due state-machine transitions, then emit notifications.
    pub fn tick(&mut self, registry: &mut AgentRegistry, dt: f32, events: &mut NotificationQueue) {
        if !dt.is_finite() || dt < 0.0 {
            warn!(dt, "tick_rejected_invalid_dt");
            return;
        }
        self.now += dt as f64;

        let normalization = self.config.frame_normalization;
        for agent in registry.agents_mut() {
            if agent.state == AgentState::Walking {
                integrate_position(agent, dt, normalization);
            }
        }

        let mut due = std::mem::take(&mut self.due_scratch);
        self.scheduler.take_due(self.now, &mut due);
        for transition in &due {
            let Some(agent) = registry.get_mut(transition.agent) else {
                warn!(agent = transition.agent.0, "transition_for_missing_agent");
                continue;
            };
            self.evaluate_transition(agent, transition.kind);
        }
        self.due_scratch = due;

        for agent in registry.agents_mut() {
            let facing = agent.direction.facing();
            if facing != agent.facing {
                agent.facing = facing;
                events.emit(Notification::DirectionChanged {
                    agent: agent.id(),
                    facing,
                });
            }
            let walking = agent.state.is_walking();
            if walking != agent.reported_walking {
                agent.reported_walking = walking;
                events.emit(Notification::StateChanged {
                    agent: agent.id(),
                    walking,
                });
            }
        }
        events.finish_tick_rollover();
    }

    pub fn update_bounds_for(
        &mut self,
        registry: &mut AgentRegistry,
        container: Option<Size>,
        id: AgentId,
    ) -> Result<(), SimError> {
        let Some(agent) = registry.get_mut(id) else {
            return Err(SimError::UnknownAgent(id));
        };
        let Some(container) = container else {
            agent.bounds = None;
            return Err(SimError::NoContainer);
        };
        let Some(bounds) = self.bounds_for(container, agent) else {
            agent.bounds = None;
            return Err(SimError::DegenerateBounds(id));
        };
        agent.bounds = Some(bounds);
        if !bounds.contains(agent.position) {
            let relocated = self.relocate_inside(agent.position, bounds);
            debug!(
                agent = id.0,
                from_x = agent.position.x,
                from_y = agent.position.y,
                to_x = relocated.x,
                to_y = relocated.y,
                "agent_relocated_inside_bounds"
            );
            agent.position = relocated;
        }
        Ok(())
    }

    /// Returns how many agents were left without usable bounds. Without a
    /// container nothing is touched and every agent counts.
    pub fn update_all_bounds(&mut self, registry: &mut AgentRegistry, container: Option<Size>) -> usize {
        if container.is_none() {
            warn!(agents = registry.len(), "update_bounds_without_container");
            return registry.len();
        }
        let ids = registry.ids().collect::<Vec<_>>();
        let mut degenerate = 0usize;
        for id in ids {
            match self.update_bounds_for(registry, container, id) {
                Ok(()) => {}
                Err(error) => {
                    debug!(agent = id.0, error = %error, "update_bounds_skipped");
                    degenerate += 1;
                }
            }
        }
        if degenerate > 0 {
            warn!(degenerate, "agents_without_usable_bounds");
        }
        degenerate
    }

    fn bounds_for(&self, container: Size, agent: &Agent) -> Option<Bounds> {
        let profile = agent.profile();
        Bounds::for_agent(
            container,
            agent.extent(),
            self.config.margin,
            profile.band_top,
            profile.band_bottom,
        )
    }

    fn start_walking(&mut self, agent: &mut Agent) {
        agent.state = AgentState::Walking;
        agent.reported_walking = true;
        let delay = self.config.direction_interval.sample(&mut self.rng);
        self.schedule(agent, delay, TransitionKind::Wander);
    }

    fn evaluate_transition(&mut self, agent: &mut Agent, kind: TransitionKind) {
        match kind {
            TransitionKind::Wander => {
                if agent.state != AgentState::Walking {
                    debug!(agent = agent.id().0, state = ?agent.state, "wander_while_not_walking");
                }
                self.stats.wander_evaluations = self.stats.wander_evaluations.saturating_add(1);
                if self.rng.gen_bool(f64::from(self.config.random_walk_chance)) {
                    agent.state = AgentState::Walking;
                    agent.direction = Direction::random(&mut self.rng);
                    let delay = self.config.direction_interval.sample(&mut self.rng);
                    self.schedule(agent, delay, TransitionKind::Wander);
                } else {
                    self.stats.pauses_entered = self.stats.pauses_entered.saturating_add(1);
                    agent.state = AgentState::Paused;
                    let delay = self.config.pause_duration.sample(&mut self.rng);
                    self.schedule(agent, delay, TransitionKind::PauseExpiry);
                }
            }
            TransitionKind::PauseExpiry => {
                agent.state = AgentState::Walking;
                agent.direction = Direction::random(&mut self.rng);
                let delay = self.config.direction_interval.sample(&mut self.rng);
                self.schedule(agent, delay, TransitionKind::Wander);
            }
        }
    }

    fn schedule(&mut self, agent: &mut Agent, delay_seconds: f32, kind: TransitionKind) {
        let due_at = self.now + f64::from(delay_seconds);
        agent.next_transition_at = due_at;
        self.scheduler.schedule(agent.id(), due_at, kind);
    }

    /// Picks a point just inside each violated edge rather than on it, so
    /// relocated pets do not stack up along the border.
    fn relocate_inside(&mut self, position: Vec2, bounds: Bounds) -> Vec2 {
        let jitter = self.config.relocation_jitter;
        let mut relocated = position;
        if !position.x.is_finite() {
            relocated.x = bounds.left + bounds.width() * 0.5;
        } else if position.x < bounds.left {
            relocated.x = bounds.left + self.inset(jitter, bounds.width());
        } else if position.x > bounds.right {
            relocated.x = bounds.right - self.inset(jitter, bounds.width());
        }
        if !position.y.is_finite() {
            relocated.y = bounds.top + bounds.height() * 0.5;
        } else if position.y < bounds.top {
            relocated.y = bounds.top + self.inset(jitter, bounds.height());
        } else if position.y > bounds.bottom {
            relocated.y = bounds.bottom - self.inset(jitter, bounds.height());
        }
        Vec2 {
            x: relocated.x.clamp(bounds.left, bounds.right),
            y: relocated.y.clamp(bounds.top, bounds.bottom),
        }
    }

    fn inset(&mut self, jitter: f32, span: f32) -> f32 {
        let max = jitter.min(span);
        if max <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range((max * 0.5)..=max)
    }
}

fn integrate_position(agent: &mut Agent, dt: f32, normalization: f32) {
    let Some(bounds) = agent.bounds else {
        return;
    };
    let step = agent.speed * dt * normalization;
    let mut x = agent.position.x + f32::from(agent.direction.dx()) * step;
    let mut y = agent.position.y + f32::from(agent.direction.dy()) * step;

    if x > bounds.right {
        x = bounds.right;
        if agent.direction.dx() > 0 {
            agent.direction.flip_x();
        }
    } else if x < bounds.left {
        x = bounds.left;
        if agent.direction.dx() < 0 {
            agent.direction.flip_x();
        }
    }
    if y > bounds.bottom {
        y = bounds.bottom;
        if agent.direction.dy() > 0 {
            agent.direction.flip_y();
        }
    } else if y < bounds.top {
        y = bounds.top;
        if agent.direction.dy() < 0 {
            agent.direction.flip_y();
        }
    }
    agent.position = Vec2 { x, y };
}
