pub mod config;
pub mod depth;
mod error;
pub mod events;
pub mod geometry;
pub mod movement;
pub mod profile;
pub mod profile_defs;
pub mod registry;
pub mod schedule;
pub mod shadow;
mod sim;
pub mod surface;

pub use config::{
    ConfigError, DepthConfig, MovementConfig, ShadowConfig, SimConfig, UniformRange,
    DEFAULT_SHADOW_LAYER,
};
pub use depth::{DepthPass, DepthSorter};
pub use error::SimError;
pub use events::{Notification, NotificationCounts, NotificationQueue};
pub use geometry::{Bounds, Size, Vec2};
pub use movement::{MovementEngine, RegisterOptions, TransitionStats};
pub use profile::{PetKind, PetProfile, ProfileTable, DEFAULT_PROFILE_NAME};
pub use profile_defs::{
    load_profile_defs, parse_profile_defs, ProfileDef, ProfileDefError, ProfileDefErrorCode,
    SourceLocation,
};
pub use registry::{Agent, AgentId, AgentRegistry, AgentState, Direction, Facing};
pub use schedule::{DueTransition, TransitionHandle, TransitionKind, TransitionScheduler};
pub use shadow::{Shadow, ShadowAttachment, ShadowId, ShadowTable, SweepReport};
pub use sim::{FrameReport, Simulation};
pub use surface::{
    LayerTarget, LayerWrite, ShadowCommand, ShadowGeometry, SurfaceCommand, SurfaceOutbox,
};
