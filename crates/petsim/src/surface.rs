use crate::geometry::Vec2;
use crate::registry::AgentId;
use crate::shadow::ShadowId;

/// Element on the host's rendering surface that receives a layer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerTarget {
    Agent(AgentId),
    /// Sprite sub-elements that must draw above the agent's base layer.
    SpriteContainer(AgentId),
    Shadow(AgentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerWrite {
    pub target: LayerTarget,
    pub value: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowGeometry {
    pub position: Vec2,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShadowCommand {
    Create {
        shadow: ShadowId,
        owner: AgentId,
        geometry: ShadowGeometry,
        layer: i32,
    },
    Update {
        shadow: ShadowId,
        geometry: ShadowGeometry,
    },
    Remove {
        shadow: ShadowId,
    },
}

/// Instructions for the renderer; the core never touches the render tree itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceCommand {
    Layer(LayerWrite),
    Shadow(ShadowCommand),
}

#[derive(Debug, Default)]
pub struct SurfaceOutbox {
    commands: Vec<SurfaceCommand>,
}

impl SurfaceOutbox {
    pub fn push_layer(&mut self, write: LayerWrite) {
        self.commands.push(SurfaceCommand::Layer(write));
    }

    pub fn push_shadow(&mut self, command: ShadowCommand) {
        self.commands.push(SurfaceCommand::Shadow(command));
    }

    pub fn pending(&self) -> &[SurfaceCommand] {
        &self.commands
    }

    pub fn drain(&mut self) -> Vec<SurfaceCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
