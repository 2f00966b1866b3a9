use std::collections::VecDeque;
use std::ops::AddAssign;
use std::thread;
use std::time::{Duration, Instant};

use petsim::{
    AgentId, ConfigError, FrameReport, NotificationCounts, PetKind, RegisterOptions, Simulation,
    Size, Vec2,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::host_config::{HostConfig, HostError};
use crate::metrics::{StageMetrics, StageMetricsSnapshot};
use crate::stage::{AppliedCounts, StageSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

/// What the ticks of one host frame produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    pub ticks: u32,
    pub depth_passes: u32,
    pub layer_changes: u32,
    pub notifications: NotificationCounts,
    pub shadow_updates: u32,
    pub sweep_corrections: u32,
}

impl FrameOutcome {
    fn record_tick(&mut self, report: &FrameReport) {
        self.ticks += 1;
        if let Some(pass) = &report.depth {
            self.depth_passes += 1;
            self.layer_changes = self.layer_changes.saturating_add(pass.changed as u32);
        }
        self.notifications += report.notifications;
        self.shadow_updates = self
            .shadow_updates
            .saturating_add(report.shadows_updated as u32);
        if let Some(sweep) = &report.sweep {
            self.sweep_corrections = self
                .sweep_corrections
                .saturating_add((sweep.orphaned.len() + sweep.untracked.len()) as u32);
        }
    }
}

impl AddAssign for FrameOutcome {
    fn add_assign(&mut self, other: Self) {
        self.ticks = self.ticks.saturating_add(other.ticks);
        self.depth_passes = self.depth_passes.saturating_add(other.depth_passes);
        self.layer_changes = self.layer_changes.saturating_add(other.layer_changes);
        self.notifications += other.notifications;
        self.shadow_updates = self.shadow_updates.saturating_add(other.shadow_updates);
        self.sweep_corrections = self.sweep_corrections.saturating_add(other.sweep_corrections);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub ticks: u64,
    pub sim_seconds: f64,
    pub pets: usize,
    pub shadows: usize,
    pub notifications: u64,
    pub depth_passes: u64,
    pub shadow_updates: u64,
    pub sweep_corrections: u64,
    pub respawns: u64,
    pub applied: AppliedCounts,
    pub last_metrics: Option<StageMetricsSnapshot>,
}

/// Drives a `Simulation` with a fixed-step accumulator and mirrors its
/// output onto a `StageSurface`.
pub struct StageRunner {
    config: HostConfig,
    sim: Simulation,
    stage: StageSurface,
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_frame: u32,
    sweep_interval: Duration,
    accumulator: Duration,
    sim_elapsed: Duration,
    last_sweep: Duration,
    last_respawn: Duration,
    resize_pending: Option<(Duration, Size)>,
    next_pet_index: u64,
    mounted: VecDeque<AgentId>,
    summary: RunSummary,
}

impl StageRunner {
    pub fn new(config: HostConfig, mut sim: Simulation) -> Result<Self, HostError> {
        let target_tps = config.target_tps.max(1);
        let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
        let max_frame_delta =
            normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
        let sweep_seconds = sim.config().sweep_interval_seconds;
        let sweep_interval = Duration::try_from_secs_f32(sweep_seconds).map_err(|_| {
            ConfigError::Invalid(format!(
                "sweep_interval_seconds {sweep_seconds} is not a usable duration"
            ))
        })?;
        sim.bind_container(config.container);

        let mut runner = Self {
            fixed_dt,
            max_frame_delta,
            max_ticks_per_frame: config.max_ticks_per_frame.max(1),
            sweep_interval,
            resize_pending: config.resize,
            config,
            sim,
            stage: StageSurface::new(),
            accumulator: Duration::ZERO,
            sim_elapsed: Duration::ZERO,
            last_sweep: Duration::ZERO,
            last_respawn: Duration::ZERO,
            next_pet_index: 0,
            mounted: VecDeque::new(),
            summary: RunSummary::default(),
        };
        for _ in 0..runner.config.pet_count {
            runner.spawn_pet()?;
        }
        runner.flush_to_stage();
        info!(
            target_tps,
            max_frame_delta_ms = max_frame_delta.as_millis() as u64,
            max_ticks_per_frame = runner.max_ticks_per_frame,
            pets = runner.mounted.len(),
            width = runner.config.container.width,
            height = runner.config.container.height,
            "stage_ready"
        );
        Ok(runner)
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn stage(&self) -> &StageSurface {
        &self.stage
    }

    #[cfg(test)]
    pub fn stage_mut(&mut self) -> &mut StageSurface {
        &mut self.stage
    }

    pub fn fixed_dt(&self) -> Duration {
        self.fixed_dt
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            sim_seconds: self.sim.now(),
            pets: self.sim.registry().len(),
            shadows: self.sim.shadow_table().len(),
            applied: self.stage.applied(),
            ..self.summary
        }
    }

    /// Runs until `run_for` of simulated time has elapsed.
    pub fn run(&mut self) -> RunSummary {
        let metrics_log_interval =
            normalize_non_zero_duration(self.config.metrics_log_interval, Duration::from_secs(1));
        let start = Instant::now();
        let mut last_frame_instant = start;
        let mut last_present_instant = start;
        let mut metrics = StageMetrics::new(metrics_log_interval, start);

        while self.sim_elapsed < self.config.run_for {
            let pacing_sleep = compute_pacing_sleep(
                Instant::now().saturating_duration_since(last_present_instant),
                self.config.frame_pacing,
            );
            if pacing_sleep > Duration::ZERO {
                thread::sleep(pacing_sleep);
            }

            let now = Instant::now();
            let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
            last_frame_instant = now;
            // Unpaced runs advance exactly one fixed step per frame.
            let frame_dt = match self.config.frame_pacing {
                Some(_) => raw_frame_dt,
                None => self.fixed_dt,
            };

            let outcome = self.step_frame(frame_dt);
            metrics.record_frame(raw_frame_dt, &outcome);
            last_present_instant = Instant::now();

            if let Some(snapshot) = metrics.take_if_due(now) {
                self.summary.last_metrics = Some(snapshot);
                info!(
                    fps = snapshot.fps,
                    tps = snapshot.tps,
                    frame_time_ms = snapshot.frame_time_ms,
                    depth_passes_per_sec = snapshot.depth_passes_per_sec,
                    layer_changes = snapshot.layer_changes,
                    state_changes = snapshot.notifications.state_changed,
                    direction_changes = snapshot.notifications.direction_changed,
                    shadow_updates = snapshot.shadow_updates,
                    sweep_corrections = snapshot.sweep_corrections,
                    pets = self.sim.registry().len(),
                    shadows = self.stage.shadows().len(),
                    "loop_metrics"
                );
            }
        }

        let summary = self.summary();
        info!(
            frames = summary.frames,
            ticks = summary.ticks,
            sim_seconds = summary.sim_seconds,
            depth_passes = summary.depth_passes,
            sweep_corrections = summary.sweep_corrections,
            "run_finished"
        );
        summary
    }

    /// Feeds one frame's worth of wall time through the fixed-step loop.
    pub fn step_frame(&mut self, frame_dt: Duration) -> FrameOutcome {
        let clamped_frame_dt = clamp_frame_delta(frame_dt, self.max_frame_delta);
        self.accumulator = self.accumulator.saturating_add(clamped_frame_dt);

        let step_plan = plan_sim_steps(self.accumulator, self.fixed_dt, self.max_ticks_per_frame);
        let fixed_dt_seconds = self.fixed_dt.as_secs_f32();
        let mut outcome = FrameOutcome::default();
        for _ in 0..step_plan.ticks_to_run {
            let report = self.sim.advance(fixed_dt_seconds);
            self.sim_elapsed = self.sim_elapsed.saturating_add(self.fixed_dt);
            outcome.record_tick(&report);
            self.apply_scheduled_resize();
            self.maybe_respawn();
        }
        self.accumulator = step_plan.remaining_accumulator;
        self.summary.ticks += u64::from(outcome.ticks);
        self.summary.notifications += u64::from(outcome.notifications.total());
        self.summary.shadow_updates += u64::from(outcome.shadow_updates);
        self.summary.depth_passes += u64::from(outcome.depth_passes);
        self.summary.sweep_corrections += u64::from(outcome.sweep_corrections);

        if step_plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame = self.max_ticks_per_frame,
                "sim_clamp_triggered"
            );
        }

        self.flush_to_stage();
        self.maybe_sweep_stage();
        self.summary.frames += 1;

        outcome
    }

    fn spawn_pet(&mut self) -> Result<AgentId, HostError> {
        let index = self.next_pet_index;
        self.next_pet_index += 1;
        let id = AgentId(index + 1);
        let kind_name = self
            .config
            .pet_kinds
            .get(index as usize % self.config.pet_kinds.len().max(1))
            .cloned()
            .unwrap_or_else(|| petsim::DEFAULT_PROFILE_NAME.to_string());
        let position = spawn_position(index, self.config.pet_count, self.config.container);

        let agent = self.sim.on_agent_mounted(
            id,
            PetKind::new(kind_name.as_str()),
            position,
            RegisterOptions::default(),
        )?;
        let scale = agent.profile().scale;
        let facing = agent.facing();
        let measured = Size::new(
            self.config.sprite_size.width * scale,
            self.config.sprite_size.height * scale,
        );
        self.stage.mount_sprite(id, &kind_name, measured, facing);
        self.sim.set_agent_dimensions(id, measured);
        self.mounted.push_back(id);
        debug!(agent = id.0, kind = %kind_name, "pet_spawned");
        Ok(id)
    }

    fn despawn_oldest(&mut self) -> Option<AgentId> {
        let id = self.mounted.pop_front()?;
        self.sim.on_agent_unmounted(id);
        self.stage.unmount_sprite(id);
        Some(id)
    }

    fn maybe_respawn(&mut self) {
        let Some(interval) = self.config.respawn_interval else {
            return;
        };
        if interval.is_zero() || self.sim_elapsed.saturating_sub(self.last_respawn) < interval {
            return;
        }
        self.last_respawn = self.sim_elapsed;
        let removed = self.despawn_oldest();
        match self.spawn_pet() {
            Ok(added) => {
                self.summary.respawns += 1;
                debug!(removed = ?removed.map(|id| id.0), added = added.0, "pet_respawned");
            }
            Err(error) => warn!(error = %error, "pet_respawn_failed"),
        }
    }

    fn apply_scheduled_resize(&mut self) {
        let Some((at, size)) = self.resize_pending else {
            return;
        };
        if self.sim_elapsed < at {
            return;
        }
        self.resize_pending = None;
        self.sim.resize_container(size);
        info!(width = size.width, height = size.height, "stage_resized");
    }

    fn flush_to_stage(&mut self) {
        let notifications = self.sim.drain_notifications();
        self.stage.apply_notifications(&notifications);
        self.stage.apply_commands(self.sim.drain_surface_commands());
    }

    fn maybe_sweep_stage(&mut self) {
        if self.sim_elapsed.saturating_sub(self.last_sweep) < self.sweep_interval {
            return;
        }
        self.last_sweep = self.sim_elapsed;
        let mounted = self.stage.shadow_ids();
        let report = self.sim.sweep_orphans(&mounted);
        if !report.is_clean() {
            self.summary.sweep_corrections += (report.orphaned.len() + report.untracked.len()) as u64;
            self.stage.apply_commands(self.sim.drain_surface_commands());
        }
    }
}

/// Spreads pets across the stage; the simulation relocates any that land
/// outside their movement band.
fn spawn_position(index: u64, count: u32, container: Size) -> Vec2 {
    let slots = u64::from(count.max(1));
    let column = (index % slots) as f32 + 1.0;
    let row = ((index * 7) % slots) as f32 / slots as f32;
    Vec2::new(
        container.width * column / (slots as f32 + 1.0),
        container.height * (0.3 + 0.4 * row),
    )
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn compute_pacing_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use petsim::{ProfileTable, ShadowGeometry, ShadowId, SimConfig};

    use super::*;

    fn runner(config: HostConfig) -> StageRunner {
        let sim = Simulation::new(
            SimConfig {
                seed: Some(42),
                ..SimConfig::default()
            },
            ProfileTable::builtin(),
        )
        .expect("simulation");
        StageRunner::new(config, sim).expect("runner")
    }

    fn run_frames(runner: &mut StageRunner, frames: u32) {
        let dt = runner.fixed_dt();
        for _ in 0..frames {
            runner.step_frame(dt);
        }
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(600), max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let result = plan_sim_steps(Duration::from_millis(50), Duration::from_millis(16), 5);
        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::from_millis(2));
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let result = plan_sim_steps(Duration::from_millis(120), Duration::from_millis(16), 3);
        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn pacing_sleep_only_when_ahead_of_target() {
        let target = Some(Duration::from_millis(16));
        assert_eq!(
            compute_pacing_sleep(Duration::from_millis(10), target),
            Duration::from_millis(6)
        );
        assert_eq!(compute_pacing_sleep(Duration::from_millis(20), target), Duration::ZERO);
        assert_eq!(compute_pacing_sleep(Duration::ZERO, None), Duration::ZERO);
    }

    #[test]
    fn stage_mirrors_simulation_after_frames() {
        let mut runner = runner(HostConfig {
            pet_count: 6,
            frame_pacing: None,
            ..HostConfig::default()
        });
        run_frames(&mut runner, 180);

        let stage = runner.stage();
        assert_eq!(stage.sprites().len(), 6);
        assert_eq!(stage.shadows().len(), 6);
        for (id, sprite) in stage.sprites() {
            let agent = runner.simulation().agent(*id).expect("agent");
            assert_eq!(sprite.layer, agent.layer_value());
            assert_eq!(sprite.facing, agent.facing().as_str());
            assert!(agent.bounds().expect("bounds").contains(agent.position()));
        }
        let summary = runner.summary();
        assert_eq!(summary.ticks, 180);
        assert!(summary.depth_passes >= 18);
    }

    #[test]
    fn frame_outcomes_add_up_to_run_summary() {
        let mut runner = runner(HostConfig {
            pet_count: 6,
            frame_pacing: None,
            ..HostConfig::default()
        });
        let dt = runner.fixed_dt();
        let mut totals = FrameOutcome::default();
        for _ in 0..900 {
            totals += runner.step_frame(dt);
        }

        let summary = runner.summary();
        assert_eq!(u64::from(totals.ticks), summary.ticks);
        assert_eq!(u64::from(totals.depth_passes), summary.depth_passes);
        assert_eq!(u64::from(totals.shadow_updates), summary.shadow_updates);
        assert_eq!(u64::from(totals.notifications.total()), summary.notifications);
        assert!(totals.notifications.total() > 0);
        assert!(totals.layer_changes > 0);
    }

    #[test]
    fn sprite_size_follows_profile_scale() {
        let runner = runner(HostConfig {
            pet_count: 3,
            pet_kinds: vec!["egg".to_string(), "dog".to_string(), "griffin".to_string()],
            sprite_size: Size::new(100.0, 100.0),
            ..HostConfig::default()
        });
        let sizes = runner
            .stage()
            .sprites()
            .values()
            .map(|sprite| sprite.size.width)
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![80.0, 110.0, 100.0]);
    }

    #[test]
    fn respawning_keeps_one_shadow_per_pet() {
        let mut runner = runner(HostConfig {
            pet_count: 4,
            respawn_interval: Some(Duration::from_millis(500)),
            ..HostConfig::default()
        });
        run_frames(&mut runner, 240);

        let summary = runner.summary();
        assert!(summary.respawns >= 7);
        assert_eq!(runner.stage().sprites().len(), 4);
        assert_eq!(runner.stage().shadows().len(), 4);
        for id in runner.stage().sprites().keys() {
            assert_eq!(runner.simulation().shadow_table().count_for(*id), 1);
        }
    }

    #[test]
    fn host_sweep_removes_leaked_stage_shadow() {
        let mut runner = runner(HostConfig {
            pet_count: 2,
            ..HostConfig::default()
        });
        runner.stage_mut().leak_shadow(
            ShadowId(5_000),
            AgentId(99),
            ShadowGeometry {
                position: Vec2::new(0.0, 0.0),
                width: 10.0,
                height: 4.0,
                scale: 1.0,
            },
        );
        run_frames(&mut runner, 70);

        assert!(!runner.stage().shadows().contains_key(&ShadowId(5_000)));
        assert_eq!(runner.stage().shadows().len(), 2);
        assert!(runner.summary().sweep_corrections >= 1);
    }

    #[test]
    fn scheduled_resize_keeps_pets_inside() {
        let mut runner = runner(HostConfig {
            pet_count: 5,
            resize: Some((Duration::from_secs(1), Size::new(400.0, 300.0))),
            ..HostConfig::default()
        });
        run_frames(&mut runner, 120);

        assert_eq!(runner.simulation().container(), Some(Size::new(400.0, 300.0)));
        for agent in runner.simulation().registry().agents() {
            assert!(agent.bounds().expect("bounds").contains(agent.position()));
        }
    }
}
