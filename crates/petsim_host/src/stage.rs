use std::collections::BTreeMap;

use petsim::{
    AgentId, Facing, LayerTarget, Notification, ShadowCommand, ShadowGeometry, ShadowId, Size,
    SurfaceCommand,
};
use serde::Serialize;
use tracing::{debug, warn};

/// Stand-in for the page renderer: holds what would be mounted on screen.
#[derive(Debug, Default)]
pub struct StageSurface {
    sprites: BTreeMap<AgentId, StageSprite>,
    shadows: BTreeMap<ShadowId, StageShadow>,
    applied: AppliedCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSprite {
    pub kind: String,
    pub size: Size,
    pub layer: Option<i32>,
    pub container_layer: Option<i32>,
    pub facing: &'static str,
    pub walking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageShadow {
    pub owner: u64,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
    pub layer: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppliedCounts {
    pub layer_writes: u64,
    pub shadows_created: u64,
    pub shadows_updated: u64,
    pub shadows_removed: u64,
    pub stale_commands: u64,
}

impl StageShadow {
    fn new(owner: AgentId, geometry: ShadowGeometry, layer: i32) -> Self {
        let mut shadow = Self {
            owner: owner.0,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            scale: 1.0,
            layer,
        };
        shadow.place(geometry);
        shadow
    }

    fn place(&mut self, geometry: ShadowGeometry) {
        self.x = geometry.position.x;
        self.y = geometry.position.y;
        self.width = geometry.width;
        self.height = geometry.height;
        self.scale = geometry.scale;
    }
}

impl StageSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts a sprite element; its measured size is reported back to the
    /// simulation separately.
    pub fn mount_sprite(&mut self, id: AgentId, kind: &str, size: Size, facing: Facing) {
        self.sprites.insert(
            id,
            StageSprite {
                kind: kind.to_string(),
                size,
                layer: None,
                container_layer: None,
                facing: facing.as_str(),
                walking: true,
            },
        );
    }

    pub fn unmount_sprite(&mut self, id: AgentId) -> bool {
        self.sprites.remove(&id).is_some()
    }

    #[cfg(test)]
    pub fn sprite(&self, id: AgentId) -> Option<&StageSprite> {
        self.sprites.get(&id)
    }

    pub fn sprites(&self) -> &BTreeMap<AgentId, StageSprite> {
        &self.sprites
    }

    pub fn shadows(&self) -> &BTreeMap<ShadowId, StageShadow> {
        &self.shadows
    }

    pub fn shadow_ids(&self) -> Vec<ShadowId> {
        self.shadows.keys().copied().collect()
    }

    pub fn applied(&self) -> AppliedCounts {
        self.applied
    }

    /// Leaves a shadow element behind with no simulation record.
    #[cfg(test)]
    pub fn leak_shadow(&mut self, id: ShadowId, owner: AgentId, geometry: ShadowGeometry) {
        self.shadows.insert(id, StageShadow::new(owner, geometry, 0));
    }

    pub fn apply_commands(&mut self, commands: Vec<SurfaceCommand>) {
        for command in commands {
            match command {
                SurfaceCommand::Layer(write) => self.apply_layer(write.target, write.value),
                SurfaceCommand::Shadow(shadow) => self.apply_shadow(shadow),
            }
        }
    }

    pub fn apply_notifications(&mut self, notifications: &[Notification]) {
        for notification in notifications {
            let Some(sprite) = self.sprites.get_mut(&notification.agent()) else {
                self.applied.stale_commands += 1;
                continue;
            };
            match *notification {
                Notification::StateChanged { walking, .. } => sprite.walking = walking,
                Notification::DirectionChanged { facing, .. } => sprite.facing = facing.as_str(),
            }
        }
    }

    fn apply_layer(&mut self, target: LayerTarget, value: i32) {
        self.applied.layer_writes += 1;
        let applied = match target {
            LayerTarget::Agent(id) => match self.sprites.get_mut(&id) {
                Some(sprite) => {
                    sprite.layer = Some(value);
                    true
                }
                None => false,
            },
            LayerTarget::SpriteContainer(id) => match self.sprites.get_mut(&id) {
                Some(sprite) => {
                    sprite.container_layer = Some(value);
                    true
                }
                None => false,
            },
            LayerTarget::Shadow(id) => {
                let mut found = false;
                for shadow in self.shadows.values_mut().filter(|shadow| shadow.owner == id.0) {
                    shadow.layer = value;
                    found = true;
                }
                found
            }
        };
        if !applied {
            self.applied.stale_commands += 1;
            debug!(element = ?target, value, "layer_write_for_missing_element");
        }
    }

    fn apply_shadow(&mut self, command: ShadowCommand) {
        match command {
            ShadowCommand::Create {
                shadow,
                owner,
                geometry,
                layer,
            } => {
                self.applied.shadows_created += 1;
                if self
                    .shadows
                    .insert(shadow, StageShadow::new(owner, geometry, layer))
                    .is_some()
                {
                    warn!(shadow = shadow.0, "shadow_created_twice");
                }
            }
            ShadowCommand::Update { shadow, geometry } => match self.shadows.get_mut(&shadow) {
                Some(mounted) => {
                    self.applied.shadows_updated += 1;
                    mounted.place(geometry);
                }
                None => {
                    self.applied.stale_commands += 1;
                    debug!(shadow = shadow.0, "shadow_update_for_missing_element");
                }
            },
            ShadowCommand::Remove { shadow } => {
                if self.shadows.remove(&shadow).is_some() {
                    self.applied.shadows_removed += 1;
                } else {
                    self.applied.stale_commands += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use petsim::{LayerWrite, Vec2};

    use super::*;

    fn geometry(x: f32) -> ShadowGeometry {
        ShadowGeometry {
            position: Vec2::new(x, 10.0),
            width: 20.0,
            height: 8.0,
            scale: 1.0,
        }
    }

    #[test]
    fn applies_layers_to_sprite_and_shadow() {
        let mut stage = StageSurface::new();
        stage.mount_sprite(AgentId(1), "cat", Size::new(64.0, 64.0), Facing::Right);
        stage.apply_commands(vec![
            SurfaceCommand::Shadow(ShadowCommand::Create {
                shadow: ShadowId(4),
                owner: AgentId(1),
                geometry: geometry(1.0),
                layer: 0,
            }),
            SurfaceCommand::Layer(LayerWrite {
                target: LayerTarget::Agent(AgentId(1)),
                value: 600,
            }),
            SurfaceCommand::Layer(LayerWrite {
                target: LayerTarget::SpriteContainer(AgentId(1)),
                value: 601,
            }),
            SurfaceCommand::Layer(LayerWrite {
                target: LayerTarget::Shadow(AgentId(1)),
                value: -10_000,
            }),
        ]);

        let sprite = stage.sprite(AgentId(1)).expect("sprite");
        assert_eq!(sprite.layer, Some(600));
        assert_eq!(sprite.container_layer, Some(601));
        assert_eq!(stage.shadows()[&ShadowId(4)].layer, -10_000);
        assert_eq!(stage.applied().stale_commands, 0);
    }

    #[test]
    fn shadow_lifecycle_tracks_ids() {
        let mut stage = StageSurface::new();
        stage.apply_commands(vec![SurfaceCommand::Shadow(ShadowCommand::Create {
            shadow: ShadowId(1),
            owner: AgentId(1),
            geometry: geometry(1.0),
            layer: -10_000,
        })]);
        stage.apply_commands(vec![SurfaceCommand::Shadow(ShadowCommand::Update {
            shadow: ShadowId(1),
            geometry: geometry(5.0),
        })]);
        assert_eq!(stage.shadows()[&ShadowId(1)].x, 5.0);

        stage.apply_commands(vec![
            SurfaceCommand::Shadow(ShadowCommand::Remove {
                shadow: ShadowId(1),
            }),
            SurfaceCommand::Shadow(ShadowCommand::Remove {
                shadow: ShadowId(1),
            }),
        ]);
        assert!(stage.shadow_ids().is_empty());
        assert_eq!(stage.applied().shadows_removed, 1);
        assert_eq!(stage.applied().stale_commands, 1);
    }

    #[test]
    fn notifications_update_sprite_flags() {
        let mut stage = StageSurface::new();
        stage.mount_sprite(AgentId(2), "dog", Size::new(64.0, 64.0), Facing::Right);
        stage.apply_notifications(&[
            Notification::StateChanged {
                agent: AgentId(2),
                walking: false,
            },
            Notification::DirectionChanged {
                agent: AgentId(2),
                facing: Facing::Left,
            },
            Notification::StateChanged {
                agent: AgentId(9),
                walking: true,
            },
        ]);
        let sprite = stage.sprite(AgentId(2)).expect("sprite");
        assert!(!sprite.walking);
        assert_eq!(sprite.facing, "left");
        assert_eq!(stage.applied().stale_commands, 1);
    }
}
