use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, warn};

use crate::config::ShadowConfig;
use crate::events::Notification;
use crate::geometry::Vec2;
use crate::registry::{Agent, AgentId, AgentRegistry};
use crate::surface::{ShadowCommand, ShadowGeometry, SurfaceOutbox};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShadowId(pub u64);

impl fmt::Display for ShadowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    id: ShadowId,
    owner: AgentId,
    geometry: ShadowGeometry,
    layer: i32,
    walking: bool,
}

impl Shadow {
    pub fn id(&self) -> ShadowId {
        self.id
    }

    pub fn owner(&self) -> AgentId {
        self.owner
    }

    pub fn geometry(&self) -> ShadowGeometry {
        self.geometry
    }

    pub fn layer(&self) -> i32 {
        self.layer
    }

    pub fn walking(&self) -> bool {
        self.walking
    }
}

/// Tracking table of live shadows, keyed by owner.
#[derive(Debug, Default)]
pub struct ShadowTable {
    next_id: u64,
    shadows_by_owner: HashMap<AgentId, Shadow>,
}

impl ShadowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shadows_by_owner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shadows_by_owner.is_empty()
    }

    pub fn get(&self, owner: AgentId) -> Option<&Shadow> {
        self.shadows_by_owner.get(&owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shadow> {
        self.shadows_by_owner.values()
    }

    pub fn count_for(&self, owner: AgentId) -> usize {
        usize::from(self.shadows_by_owner.contains_key(&owner))
    }

    fn allocate_id(&mut self) -> ShadowId {
        let id = ShadowId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    fn owners(&self) -> Vec<AgentId> {
        let mut owners = self.shadows_by_owner.keys().copied().collect::<Vec<_>>();
        owners.sort();
        owners
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Shadows whose owner is gone (or no longer casts a shadow).
    pub orphaned: Vec<AgentId>,
    /// Surface shadows unknown to the tracking table.
    pub untracked: Vec<ShadowId>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned.is_empty() && self.untracked.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ShadowAttachment {
    config: ShadowConfig,
    layer: i32,
}

impl ShadowAttachment {
    pub fn new(config: ShadowConfig, layer: i32) -> Self {
        Self { config, layer }
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Creates the single shadow for `owner`, replacing any existing one.
    pub fn attach(
        &self,
        table: &mut ShadowTable,
        registry: &AgentRegistry,
        outbox: &mut SurfaceOutbox,
        owner: AgentId,
    ) -> Option<ShadowId> {
        let Some(agent) = registry.get(owner) else {
            warn!(agent = owner.0, "shadow_attach_unknown_agent");
            return None;
        };
        if !agent.shadow_enabled() {
            debug!(agent = owner.0, "shadow_attach_disabled");
            return None;
        }
        if agent.dimensions().is_none() {
            debug!(agent = owner.0, "shadow_attach_unmeasured_agent");
            return None;
        }

        self.detach(table, outbox, owner);
        let walking = agent.state().is_walking();
        let geometry = self.geometry_for(agent, walking);
        let id = table.allocate_id();
        table.shadows_by_owner.insert(
            owner,
            Shadow {
                id,
                owner,
                geometry,
                layer: self.layer,
                walking,
            },
        );
        outbox.push_shadow(ShadowCommand::Create {
            shadow: id,
            owner,
            geometry,
            layer: self.layer,
        });
        debug!(agent = owner.0, shadow = id.0, "shadow_attached");
        Some(id)
    }

    /// Re-derives size and placement from the owner's current bounding box.
    pub fn update(
        &self,
        table: &mut ShadowTable,
        registry: &AgentRegistry,
        outbox: &mut SurfaceOutbox,
        owner: AgentId,
    ) -> bool {
        let Some(shadow) = table.shadows_by_owner.get_mut(&owner) else {
            return false;
        };
        // Ownerless shadows are left for the next sweep.
        let Some(agent) = registry.get(owner) else {
            return false;
        };
        if agent.dimensions().is_none() {
            return false;
        }
        let geometry = self.geometry_for(agent, shadow.walking);
        if geometry == shadow.geometry {
            return false;
        }
        shadow.geometry = geometry;
        outbox.push_shadow(ShadowCommand::Update {
            shadow: shadow.id,
            geometry,
        });
        true
    }

    pub fn update_all(
        &self,
        table: &mut ShadowTable,
        registry: &AgentRegistry,
        outbox: &mut SurfaceOutbox,
    ) -> usize {
        table
            .owners()
            .into_iter()
            .filter(|owner| self.update(table, registry, outbox, *owner))
            .count()
    }

    /// Tracks walking/not-walking from `StateChanged` notifications.
    pub fn observe(&self, table: &mut ShadowTable, notifications: &[Notification]) {
        for notification in notifications {
            if let Notification::StateChanged { agent, walking } = *notification {
                if let Some(shadow) = table.shadows_by_owner.get_mut(&agent) {
                    shadow.walking = walking;
                }
            }
        }
    }

    pub fn detach(&self, table: &mut ShadowTable, outbox: &mut SurfaceOutbox, owner: AgentId) -> bool {
        match table.shadows_by_owner.remove(&owner) {
            Some(shadow) => {
                outbox.push_shadow(ShadowCommand::Remove { shadow: shadow.id });
                debug!(agent = owner.0, shadow = shadow.id.0, "shadow_detached");
                true
            }
            None => false,
        }
    }

    /// Purges shadows without a live owner and queues removal of surface
    /// shadows the table does not track. Safe to call at any time.
    pub fn sweep_orphans(
        &self,
        table: &mut ShadowTable,
        registry: &AgentRegistry,
        outbox: &mut SurfaceOutbox,
        surface_shadows: &[ShadowId],
    ) -> SweepReport {
        let mut report = SweepReport::default();
        for owner in table.owners() {
            let owner_live = registry
                .get(owner)
                .is_some_and(|agent| agent.shadow_enabled());
            if !owner_live && self.detach(table, outbox, owner) {
                report.orphaned.push(owner);
            }
        }

        let tracked = table
            .shadows_by_owner
            .values()
            .map(|shadow| shadow.id)
            .collect::<HashSet<_>>();
        let mut seen = HashSet::new();
        for shadow in surface_shadows {
            if tracked.contains(shadow) || !seen.insert(*shadow) {
                continue;
            }
            outbox.push_shadow(ShadowCommand::Remove { shadow: *shadow });
            report.untracked.push(*shadow);
        }

        if !report.is_clean() {
            warn!(
                orphaned = report.orphaned.len(),
                untracked = report.untracked.len(),
                "shadow_sweep_corrected"
            );
        }
        report
    }

    fn geometry_for(&self, agent: &Agent, walking: bool) -> ShadowGeometry {
        let extent = agent.extent();
        let position = agent.position();
        let width = extent.width * agent.profile().shadow_ratio;
        let height = width * self.config.height_ratio;
        ShadowGeometry {
            position: Vec2 {
                x: position.x + (extent.width - width) * 0.5,
                y: position.y + extent.height + self.config.vertical_offset - height * 0.5,
            },
            width,
            height,
            scale: if walking { self.config.contact_scale } else { 1.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MovementConfig, UniformRange, DEFAULT_SHADOW_LAYER};
    use crate::events::NotificationQueue;
    use crate::geometry::Size;
    use crate::movement::{MovementEngine, RegisterOptions};
    use crate::profile::{PetKind, PetProfile};
    use crate::registry::Direction;

    struct Fixture {
        engine: MovementEngine,
        registry: AgentRegistry,
        table: ShadowTable,
        outbox: SurfaceOutbox,
        shadows: ShadowAttachment,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: MovementEngine::new(
                    MovementConfig {
                        direction_interval: UniformRange::new(100.0, 100.0),
                        ..MovementConfig::default()
                    },
                    Some(9),
                ),
                registry: AgentRegistry::new(),
                table: ShadowTable::new(),
                outbox: SurfaceOutbox::default(),
                shadows: ShadowAttachment::new(ShadowConfig::default(), DEFAULT_SHADOW_LAYER),
            }
        }

        fn register(&mut self, id: u64, dimensions: Option<Size>) {
            self.engine
                .register_agent(
                    &mut self.registry,
                    Some(Size::new(400.0, 300.0)),
                    AgentId(id),
                    PetKind::default(),
                    PetProfile::default(),
                    Vec2::new(200.0, 150.0),
                    RegisterOptions {
                        speed: Some(0.5),
                        direction: Some(Direction::new(1, 1)),
                        dimensions,
                        ..RegisterOptions::default()
                    },
                )
                .expect("register");
        }

        fn attach(&mut self, id: u64) -> Option<ShadowId> {
            self.shadows
                .attach(&mut self.table, &self.registry, &mut self.outbox, AgentId(id))
        }
    }

    #[test]
    fn shadow_width_follows_shadow_ratio() {
        let mut fixture = Fixture::new();
        fixture.register(1, Some(Size::new(50.0, 60.0)));
        fixture.attach(1).expect("shadow");

        let geometry = fixture.table.get(AgentId(1)).expect("shadow").geometry();
        assert!((geometry.width - 40.0).abs() < 1e-4);
        assert!((geometry.height - 16.0).abs() < 1e-4);
        assert!((geometry.position.x - 205.0).abs() < 1e-4);
        assert!((geometry.position.y - 204.0).abs() < 1e-4);
        assert_eq!(fixture.table.get(AgentId(1)).expect("shadow").layer(), DEFAULT_SHADOW_LAYER);
    }

    #[test]
    fn reattach_keeps_exactly_one_shadow() {
        let mut fixture = Fixture::new();
        fixture.register(1, Some(Size::new(50.0, 60.0)));
        let first = fixture.attach(1).expect("first");
        let second = fixture.attach(1).expect("second");

        assert_ne!(first, second);
        assert_eq!(fixture.table.count_for(AgentId(1)), 1);
        assert!(fixture
            .outbox
            .pending()
            .contains(&crate::surface::SurfaceCommand::Shadow(ShadowCommand::Remove {
                shadow: first
            })));
    }

    #[test]
    fn attach_skips_unknown_or_unmeasured_agents() {
        let mut fixture = Fixture::new();
        assert!(fixture.attach(42).is_none());
        fixture.register(1, None);
        assert!(fixture.attach(1).is_none());
        assert!(fixture.table.is_empty());
    }

    #[test]
    fn update_tracks_movement_and_walking_scale() {
        let mut fixture = Fixture::new();
        let mut events = NotificationQueue::default();
        fixture.register(1, Some(Size::new(50.0, 60.0)));
        fixture.attach(1).expect("shadow");
        let before = fixture.table.get(AgentId(1)).expect("shadow").geometry();
        assert!((before.scale - 0.9).abs() < 1e-6);

        fixture
            .engine
            .tick(&mut fixture.registry, 1.0 / 60.0, &mut events);
        assert!(fixture.shadows.update(
            &mut fixture.table,
            &fixture.registry,
            &mut fixture.outbox,
            AgentId(1)
        ));
        let moved = fixture.table.get(AgentId(1)).expect("shadow").geometry();
        assert!(moved.position.x > before.position.x);

        fixture.shadows.observe(
            &mut fixture.table,
            &[Notification::StateChanged {
                agent: AgentId(1),
                walking: false,
            }],
        );
        fixture
            .shadows
            .update(&mut fixture.table, &fixture.registry, &mut fixture.outbox, AgentId(1));
        assert_eq!(fixture.table.get(AgentId(1)).expect("shadow").geometry().scale, 1.0);
    }

    #[test]
    fn detach_is_noop_when_absent() {
        let mut fixture = Fixture::new();
        assert!(!fixture
            .shadows
            .detach(&mut fixture.table, &mut fixture.outbox, AgentId(3)));
        assert!(fixture.outbox.is_empty());
    }

    #[test]
    fn sweep_removes_orphans_and_untracked_surface_shadows() {
        let mut fixture = Fixture::new();
        fixture.register(1, Some(Size::new(50.0, 60.0)));
        fixture.register(2, Some(Size::new(50.0, 60.0)));
        let kept = fixture.attach(1).expect("shadow");
        fixture.attach(2).expect("shadow");
        fixture.engine.unregister_agent(&mut fixture.registry, AgentId(2));
        fixture.outbox.drain();

        let stray = ShadowId(999);
        let report = fixture.shadows.sweep_orphans(
            &mut fixture.table,
            &fixture.registry,
            &mut fixture.outbox,
            &[kept, stray],
        );

        assert_eq!(report.orphaned, vec![AgentId(2)]);
        assert_eq!(report.untracked, vec![stray]);
        assert_eq!(fixture.table.count_for(AgentId(2)), 0);
        assert_eq!(fixture.table.count_for(AgentId(1)), 1);

        let again = fixture.shadows.sweep_orphans(
            &mut fixture.table,
            &fixture.registry,
            &mut fixture.outbox,
            &[kept],
        );
        assert!(again.is_clean());
    }
}
