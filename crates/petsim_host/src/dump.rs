use std::fs;
use std::path::Path;

use petsim::{AgentState, Simulation, Size, Vec2};
use serde::Serialize;

use crate::host_config::HostError;
use crate::loop_runner::RunSummary;
use crate::stage::{StageShadow, StageSurface};

#[derive(Debug, Serialize)]
pub struct StageDump {
    pub container: Option<Size>,
    pub summary: RunSummary,
    pub pets: Vec<PetDump>,
}

#[derive(Debug, Serialize)]
pub struct PetDump {
    pub id: u64,
    pub kind: String,
    pub position: Vec2,
    pub state: &'static str,
    pub facing: &'static str,
    pub layer: Option<i32>,
    pub shadow: Option<StageShadow>,
}

impl StageDump {
    pub fn capture(sim: &Simulation, stage: &StageSurface, summary: RunSummary) -> Self {
        let pets = sim
            .registry()
            .agents()
            .iter()
            .map(|agent| PetDump {
                id: agent.id().0,
                kind: agent.kind().as_str().to_string(),
                position: agent.position(),
                state: state_name(agent.state()),
                facing: agent.facing().as_str(),
                layer: agent.layer_value(),
                shadow: stage
                    .shadows()
                    .values()
                    .find(|shadow| shadow.owner == agent.id().0)
                    .copied(),
            })
            .collect();
        Self {
            container: sim.container(),
            summary,
            pets,
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), HostError> {
        let encoded = serde_json::to_string_pretty(self).map_err(HostError::EncodeDump)?;
        fs::write(path, encoded).map_err(|source| HostError::WriteDump {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn state_name(state: AgentState) -> &'static str {
    match state {
        AgentState::Idle => "idle",
        AgentState::Walking => "walking",
        AgentState::Paused => "paused",
    }
}
