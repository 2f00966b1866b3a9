use tracing::{debug, info, warn};

use crate::config::{ConfigError, SimConfig};
use crate::depth::{DepthPass, DepthSorter};
use crate::error::SimError;
use crate::events::{Notification, NotificationCounts, NotificationQueue};
use crate::geometry::{Size, Vec2};
use crate::movement::{MovementEngine, RegisterOptions};
use crate::profile::{PetKind, ProfileTable};
use crate::registry::{Agent, AgentId, AgentRegistry};
use crate::shadow::{ShadowAttachment, ShadowId, ShadowTable, SweepReport};
use crate::surface::{SurfaceCommand, SurfaceOutbox};

/// What one `advance` call did beyond moving agents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub notifications: NotificationCounts,
    pub shadows_updated: usize,
    pub depth: Option<DepthPass>,
    pub sweep: Option<SweepReport>,
}

/// Owns all simulation state; the host drives it from a single thread.
pub struct Simulation {
    config: SimConfig,
    profiles: ProfileTable,
    container: Option<Size>,
    registry: AgentRegistry,
    shadow_table: ShadowTable,
    movement: MovementEngine,
    depth: DepthSorter,
    shadows: ShadowAttachment,
    notifications: NotificationQueue,
    outbox: SurfaceOutbox,
    last_sweep_at: f64,
}

impl Simulation {
    pub fn new(config: SimConfig, profiles: ProfileTable) -> Result<Self, ConfigError> {
        config.validate()?;
        let movement = MovementEngine::new(config.movement.clone(), config.seed);
        let depth = DepthSorter::new(config.depth.clone());
        let shadows = ShadowAttachment::new(config.shadow.clone(), config.depth.shadow_layer);
        Ok(Self {
            config,
            profiles,
            container: None,
            registry: AgentRegistry::new(),
            shadow_table: ShadowTable::new(),
            movement,
            depth,
            shadows,
            notifications: NotificationQueue::default(),
            outbox: SurfaceOutbox::default(),
            last_sweep_at: 0.0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    pub fn container(&self) -> Option<Size> {
        self.container
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.registry.get(id)
    }

    pub fn shadow_table(&self) -> &ShadowTable {
        &self.shadow_table
    }

    pub fn movement(&self) -> &MovementEngine {
        &self.movement
    }

    pub fn now(&self) -> f64 {
        self.movement.now()
    }

    pub fn bind_container(&mut self, size: Size) {
        info!(width = size.width, height = size.height, "container_bound");
        self.apply_container(size);
    }

    pub fn resize_container(&mut self, size: Size) {
        if self.container.is_none() {
            warn!("resize_before_bind");
        }
        debug!(width = size.width, height = size.height, "container_resized");
        self.apply_container(size);
    }

    fn apply_container(&mut self, size: Size) {
        if size.is_degenerate() {
            warn!(
                width = size.width,
                height = size.height,
                "container_degenerate; movement paused until resize"
            );
        }
        self.container = Some(size);
        self.update_all_bounds();
        self.shadows
            .update_all(&mut self.shadow_table, &self.registry, &mut self.outbox);
        self.depth.mark_dirty();
    }

    /// Host callback for a newly created pet element.
    pub fn on_agent_mounted(
        &mut self,
        id: AgentId,
        kind: PetKind,
        position: Vec2,
        options: RegisterOptions,
    ) -> Result<&Agent, SimError> {
        if !self.profiles.contains(&kind) {
            debug!(agent = id.0, kind = %kind, "unknown_kind_uses_default_profile");
        }
        let profile = *self.profiles.resolve(&kind);
        self.movement.register_agent(
            &mut self.registry,
            self.container,
            id,
            kind,
            profile,
            position,
            options,
        )?;
        self.shadows
            .attach(&mut self.shadow_table, &self.registry, &mut self.outbox, id);
        self.depth.mark_dirty();
        self.registry.get(id).ok_or(SimError::UnknownAgent(id))
    }

    /// Host callback for a destroyed pet element.
    pub fn on_agent_unmounted(&mut self, id: AgentId) -> bool {
        let removed = self.movement.unregister_agent(&mut self.registry, id);
        self.shadows
            .detach(&mut self.shadow_table, &mut self.outbox, id);
        if removed {
            self.depth.mark_dirty();
        }
        removed
    }

    pub fn set_agent_dimensions(&mut self, id: AgentId, dimensions: Size) -> bool {
        if !self.registry.set_dimensions(id, dimensions) {
            warn!(agent = id.0, "dimensions_for_unknown_agent");
            return false;
        }
        if let Err(error) = self.update_bounds_for(id) {
            debug!(agent = id.0, error = %error, "dimensions_left_agent_without_bounds");
        }
        if self.shadow_table.get(id).is_some() {
            self.shadows
                .update(&mut self.shadow_table, &self.registry, &mut self.outbox, id);
        } else {
            self.shadows
                .attach(&mut self.shadow_table, &self.registry, &mut self.outbox, id);
        }
        self.depth.mark_dirty();
        true
    }

    pub fn set_shadow_enabled(&mut self, id: AgentId, enabled: bool) -> bool {
        let Some(agent) = self.registry.get_mut(id) else {
            warn!(agent = id.0, "shadow_toggle_unknown_agent");
            return false;
        };
        agent.shadow_enabled = enabled;
        if enabled {
            self.shadows
                .attach(&mut self.shadow_table, &self.registry, &mut self.outbox, id);
        } else {
            self.shadows
                .detach(&mut self.shadow_table, &mut self.outbox, id);
        }
        true
    }

    pub fn override_speed(&mut self, id: AgentId, speed: f32) -> bool {
        self.movement.override_speed(&mut self.registry, id, speed)
    }

    pub fn update_bounds_for(&mut self, id: AgentId) -> Result<(), SimError> {
        self.movement
            .update_bounds_for(&mut self.registry, self.container, id)
    }

    pub fn update_all_bounds(&mut self) -> usize {
        self.movement
            .update_all_bounds(&mut self.registry, self.container)
    }

    /// One host frame: move, refresh shadows, then depth and sweeps on
    /// their own cadences.
    pub fn advance(&mut self, dt: f32) -> FrameReport {
        let before = self.notifications.pending().len();
        self.movement
            .tick(&mut self.registry, dt, &mut self.notifications);
        let fresh = &self.notifications.pending()[before..];
        self.shadows.observe(&mut self.shadow_table, fresh);
        let notifications = self.notifications.last_tick_counts();

        let shadows_updated =
            self.shadows
                .update_all(&mut self.shadow_table, &self.registry, &mut self.outbox);

        let now = self.movement.now();
        let depth = self
            .depth
            .maybe_recompute(now, &mut self.registry, &mut self.outbox);

        let sweep = if now - self.last_sweep_at >= f64::from(self.config.sweep_interval_seconds) {
            self.last_sweep_at = now;
            Some(self.sweep_orphans(&[]))
        } else {
            None
        };

        FrameReport {
            notifications,
            shadows_updated,
            depth,
            sweep,
        }
    }

    pub fn recompute_depth(&mut self) -> DepthPass {
        self.depth.recompute(&mut self.registry, &mut self.outbox)
    }

    pub fn attach_shadow(&mut self, id: AgentId) -> Option<ShadowId> {
        self.shadows
            .attach(&mut self.shadow_table, &self.registry, &mut self.outbox, id)
    }

    pub fn update_shadow(&mut self, id: AgentId) -> bool {
        self.shadows
            .update(&mut self.shadow_table, &self.registry, &mut self.outbox, id)
    }

    pub fn detach_shadow(&mut self, id: AgentId) -> bool {
        self.shadows
            .detach(&mut self.shadow_table, &mut self.outbox, id)
    }

    /// `surface_shadows` lists the shadow elements currently on the host's
    /// surface; pass an empty slice when the host cannot enumerate them.
    pub fn sweep_orphans(&mut self, surface_shadows: &[ShadowId]) -> SweepReport {
        self.shadows.sweep_orphans(
            &mut self.shadow_table,
            &self.registry,
            &mut self.outbox,
            surface_shadows,
        )
    }

    pub fn pending_notifications(&self) -> &[Notification] {
        self.notifications.pending()
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain()
    }

    pub fn drain_surface_commands(&mut self) -> Vec<SurfaceCommand> {
        self.outbox.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Direction;
    use crate::surface::ShadowCommand;

    fn simulation() -> Simulation {
        let config = SimConfig {
            seed: Some(11),
            ..SimConfig::default()
        };
        Simulation::new(config, ProfileTable::builtin()).expect("simulation")
    }

    fn mount(sim: &mut Simulation, id: u64, kind: &str, position: Vec2) {
        sim.on_agent_mounted(
            AgentId(id),
            PetKind::new(kind),
            position,
            RegisterOptions {
                dimensions: Some(Size::new(48.0, 48.0)),
                ..RegisterOptions::default()
            },
        )
        .expect("mount");
    }

    #[test]
    fn mounting_before_container_fails() {
        let mut sim = simulation();
        let error = sim
            .on_agent_mounted(
                AgentId(1),
                PetKind::default(),
                Vec2::default(),
                RegisterOptions::default(),
            )
            .expect_err("no container");
        assert_eq!(error, SimError::NoContainer);
    }

    #[test]
    fn mounting_attaches_shadow_and_marks_depth() {
        let mut sim = simulation();
        sim.bind_container(Size::new(400.0, 300.0));
        mount(&mut sim, 1, "cat", Vec2::new(100.0, 100.0));

        assert_eq!(sim.shadow_table().count_for(AgentId(1)), 1);
        let report = sim.advance(1.0 / 60.0);
        assert!(report.depth.is_some());
        assert!(sim.agent(AgentId(1)).and_then(Agent::layer_value).is_some());
    }

    #[test]
    fn unknown_kind_falls_back_to_default_profile() {
        let mut sim = simulation();
        sim.bind_container(Size::new(400.0, 300.0));
        mount(&mut sim, 1, "griffin", Vec2::new(100.0, 100.0));
        let agent = sim.agent(AgentId(1)).expect("agent");
        assert_eq!(agent.profile().foot_ratio, 0.95);
        assert_eq!(agent.kind().as_str(), "griffin");
    }

    #[test]
    fn unmount_removes_agent_shadow_and_transition() {
        let mut sim = simulation();
        sim.bind_container(Size::new(400.0, 300.0));
        mount(&mut sim, 1, "dog", Vec2::new(100.0, 100.0));
        let shadow = sim.shadow_table().get(AgentId(1)).expect("shadow").id();
        sim.drain_surface_commands();

        assert!(sim.on_agent_unmounted(AgentId(1)));

        assert!(sim.agent(AgentId(1)).is_none());
        assert!(!sim.movement().has_pending_transition(AgentId(1)));
        assert_eq!(sim.shadow_table().count_for(AgentId(1)), 0);
        assert!(sim
            .drain_surface_commands()
            .contains(&SurfaceCommand::Shadow(ShadowCommand::Remove { shadow })));
        assert!(!sim.on_agent_unmounted(AgentId(1)));
    }

    #[test]
    fn late_dimensions_attach_shadow() {
        let mut sim = simulation();
        sim.bind_container(Size::new(400.0, 300.0));
        sim.on_agent_mounted(
            AgentId(1),
            PetKind::default(),
            Vec2::new(100.0, 100.0),
            RegisterOptions::default(),
        )
        .expect("mount");
        assert_eq!(sim.shadow_table().count_for(AgentId(1)), 0);

        assert!(sim.set_agent_dimensions(AgentId(1), Size::new(40.0, 40.0)));
        assert_eq!(sim.shadow_table().count_for(AgentId(1)), 1);
        assert!(!sim.set_agent_dimensions(AgentId(9), Size::new(40.0, 40.0)));
    }

    #[test]
    fn disabling_shadow_removes_it() {
        let mut sim = simulation();
        sim.bind_container(Size::new(400.0, 300.0));
        mount(&mut sim, 1, "cat", Vec2::new(100.0, 100.0));
        assert!(sim.set_shadow_enabled(AgentId(1), false));
        assert_eq!(sim.shadow_table().count_for(AgentId(1)), 0);
        assert!(sim.set_shadow_enabled(AgentId(1), true));
        assert_eq!(sim.shadow_table().count_for(AgentId(1)), 1);
    }

    #[test]
    fn resize_relocates_agents_inside_new_bounds() {
        let mut sim = simulation();
        sim.bind_container(Size::new(800.0, 600.0));
        mount(&mut sim, 1, "default", Vec2::new(700.0, 500.0));
        sim.resize_container(Size::new(300.0, 200.0));
        let agent = sim.agent(AgentId(1)).expect("agent");
        assert!(agent.bounds().expect("bounds").contains(agent.position()));
    }

    #[test]
    fn direction_notifications_reach_host() {
        let mut sim = simulation();
        sim.bind_container(Size::new(400.0, 300.0));
        let right = 400.0 - 20.0 - 48.0;
        sim.on_agent_mounted(
            AgentId(1),
            PetKind::default(),
            Vec2::new(right, 100.0),
            RegisterOptions {
                speed: Some(1.0),
                direction: Some(Direction::new(1, 1)),
                dimensions: Some(Size::new(48.0, 48.0)),
                ..RegisterOptions::default()
            },
        )
        .expect("mount");

        let report = sim.advance(1.0 / 60.0);
        assert_eq!(
            report.notifications,
            NotificationCounts {
                state_changed: 0,
                direction_changed: 1,
            }
        );
        let notifications = sim.drain_notifications();
        assert!(matches!(
            notifications.as_slice(),
            [Notification::DirectionChanged { agent: AgentId(1), .. }]
        ));
    }
}
