use tracing::debug;

use crate::config::DepthConfig;
use crate::registry::{AgentId, AgentRegistry};
use crate::surface::{LayerTarget, LayerWrite, SurfaceOutbox};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepthPass {
    /// Agents nearest the viewer first.
    pub ranked: Vec<AgentId>,
    pub changed: usize,
}

/// Ranks agents by foot position and hands out layer values; the only
/// writer of `Agent::layer_value`.
#[derive(Debug)]
pub struct DepthSorter {
    config: DepthConfig,
    last_pass_at: Option<f64>,
    dirty: bool,
    order: Vec<(usize, f32)>,
}

impl DepthSorter {
    pub fn new(config: DepthConfig) -> Self {
        Self {
            config,
            last_pass_at: None,
            dirty: true,
            order: Vec::new(),
        }
    }

    pub fn config(&self) -> &DepthConfig {
        &self.config
    }

    /// Forces a pass at the next opportunity, e.g. after the agent set changed.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_due(&self, now: f64) -> bool {
        if self.dirty {
            return true;
        }
        match self.last_pass_at {
            Some(last) => now - last >= f64::from(self.config.interval_seconds),
            None => true,
        }
    }

    pub fn maybe_recompute(
        &mut self,
        now: f64,
        registry: &mut AgentRegistry,
        outbox: &mut SurfaceOutbox,
    ) -> Option<DepthPass> {
        if !self.is_due(now) {
            return None;
        }
        let pass = self.recompute(registry, outbox);
        self.last_pass_at = Some(now);
        Some(pass)
    }

    pub fn recompute(&mut self, registry: &mut AgentRegistry, outbox: &mut SurfaceOutbox) -> DepthPass {
        self.dirty = false;
        self.order.clear();
        self.order.extend(
            registry
                .agents()
                .iter()
                .enumerate()
                .map(|(index, agent)| (index, agent.foot_position())),
        );
        // Stable: equal feet keep registration order.
        self.order.sort_by(|left, right| right.1.total_cmp(&left.1));

        let count = self.order.len();
        let mut pass = DepthPass {
            ranked: Vec::with_capacity(count),
            changed: 0,
        };
        let agents = registry.agents_mut();
        for (rank, (index, _)) in self.order.iter().enumerate() {
            let agent = &mut agents[*index];
            pass.ranked.push(agent.id());
            let value = self.layer_for_rank(rank, count);
            if agent.layer_value == Some(value) {
                continue;
            }
            agent.layer_value = Some(value);
            pass.changed += 1;
            outbox.push_layer(LayerWrite {
                target: LayerTarget::Agent(agent.id()),
                value,
            });
            outbox.push_layer(LayerWrite {
                target: LayerTarget::SpriteContainer(agent.id()),
                value: value.saturating_add(self.config.sprite_offset),
            });
            if agent.shadow_enabled() {
                outbox.push_layer(LayerWrite {
                    target: LayerTarget::Shadow(agent.id()),
                    value: self.config.shadow_layer,
                });
            }
        }
        if pass.changed > 0 {
            debug!(agents = count, changed = pass.changed, "depth_recomputed");
        }
        pass
    }

    /// `base + floor(range * (count - rank) / count)`; rank 0 is nearest.
    pub fn layer_for_rank(&self, rank: usize, count: usize) -> i32 {
        if count == 0 {
            return self.config.base;
        }
        let span = i64::from(self.config.range) * (count.saturating_sub(rank)) as i64;
        let offset = span.div_euclid(count as i64);
        (i64::from(self.config.base) + offset).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MovementConfig, UniformRange};
    use crate::geometry::{Size, Vec2};
    use crate::movement::{MovementEngine, RegisterOptions};
    use crate::profile::{PetKind, PetProfile};
    use crate::registry::Direction;

    fn populate(positions: &[(u64, f32)]) -> AgentRegistry {
        let mut engine = MovementEngine::new(
            MovementConfig {
                direction_interval: UniformRange::new(100.0, 100.0),
                ..MovementConfig::default()
            },
            Some(1),
        );
        let mut registry = AgentRegistry::new();
        for (id, y) in positions {
            engine
                .register_agent(
                    &mut registry,
                    Some(Size::new(800.0, 600.0)),
                    AgentId(*id),
                    PetKind::default(),
                    PetProfile::default(),
                    Vec2::new(100.0, *y),
                    RegisterOptions {
                        direction: Some(Direction::new(1, 1)),
                        dimensions: Some(Size::new(40.0, 40.0)),
                        ..RegisterOptions::default()
                    },
                )
                .expect("register");
        }
        registry
    }

    #[test]
    fn lower_feet_get_higher_layers() {
        let mut registry = populate(&[(1, 50.0), (2, 300.0), (3, 120.0)]);
        let mut sorter = DepthSorter::new(DepthConfig::default());
        let mut outbox = SurfaceOutbox::default();

        let pass = sorter.recompute(&mut registry, &mut outbox);

        assert_eq!(pass.ranked, vec![AgentId(2), AgentId(3), AgentId(1)]);
        let layer = |id| registry.get(AgentId(id)).and_then(|agent| agent.layer_value());
        assert!(layer(2) > layer(3));
        assert!(layer(3) > layer(1));
        assert_eq!(layer(2), Some(1100));
    }

    #[test]
    fn unchanged_layers_are_not_rewritten() {
        let mut registry = populate(&[(1, 50.0), (2, 300.0)]);
        let mut sorter = DepthSorter::new(DepthConfig::default());
        let mut outbox = SurfaceOutbox::default();

        let first = sorter.recompute(&mut registry, &mut outbox);
        assert_eq!(first.changed, 2);
        // agent, sprite container, shadow for each of two agents
        assert_eq!(outbox.drain().len(), 6);

        let second = sorter.recompute(&mut registry, &mut outbox);
        assert_eq!(second.changed, 0);
        assert!(outbox.is_empty());
    }

    #[test]
    fn changed_layer_pushes_sprite_offset_and_fixed_shadow_layer() {
        let mut registry = populate(&[(1, 50.0)]);
        let config = DepthConfig::default();
        let mut sorter = DepthSorter::new(config.clone());
        let mut outbox = SurfaceOutbox::default();

        sorter.recompute(&mut registry, &mut outbox);

        let writes = outbox.drain();
        let value = registry.get(AgentId(1)).and_then(|agent| agent.layer_value()).expect("layer");
        assert!(writes.contains(&crate::surface::SurfaceCommand::Layer(LayerWrite {
            target: LayerTarget::SpriteContainer(AgentId(1)),
            value: value + 1,
        })));
        assert!(writes.contains(&crate::surface::SurfaceCommand::Layer(LayerWrite {
            target: LayerTarget::Shadow(AgentId(1)),
            value: config.shadow_layer,
        })));
    }

    #[test]
    fn equal_feet_keep_registration_order() {
        let mut registry = populate(&[(5, 100.0), (3, 100.0), (9, 100.0)]);
        let mut sorter = DepthSorter::new(DepthConfig::default());
        let mut outbox = SurfaceOutbox::default();

        let pass = sorter.recompute(&mut registry, &mut outbox);
        assert_eq!(pass.ranked, vec![AgentId(5), AgentId(3), AgentId(9)]);
    }

    #[test]
    fn layer_values_decrease_with_rank() {
        let sorter = DepthSorter::new(DepthConfig::default());
        let count = 7;
        let values = (0..count)
            .map(|rank| sorter.layer_for_rank(rank, count))
            .collect::<Vec<_>>();
        assert!(values.windows(2).all(|pair| pair[0] > pair[1]));
        assert_eq!(values[0], 1100);
    }

    #[test]
    fn cadence_waits_for_interval_unless_dirty() {
        let mut registry = populate(&[(1, 50.0)]);
        let mut sorter = DepthSorter::new(DepthConfig::default());
        let mut outbox = SurfaceOutbox::default();

        assert!(sorter.maybe_recompute(0.0, &mut registry, &mut outbox).is_some());
        assert!(sorter.maybe_recompute(0.05, &mut registry, &mut outbox).is_none());
        assert!(sorter.maybe_recompute(0.2, &mut registry, &mut outbox).is_some());
        sorter.mark_dirty();
        assert!(sorter.maybe_recompute(0.21, &mut registry, &mut outbox).is_some());
    }
}
