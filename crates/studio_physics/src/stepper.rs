//! Per-frame driver of the simulation.
//!
//! [`SimulationStepper::on_frame`] is the only per-frame entry point. Each
//! call turns the frame timestamp into a delta, advances the physics world,
//! then copies the new state of every synced body into the render list. The
//! first frame after initialization (or after [`SimulationStepper::reset_clock`])
//! only records its timestamp.
//!
//! ```text
//! Uninitialized --initialize--> Ready --on_frame--> Stepping --> Ready
//!                                 |
//!                                 +--teardown--> TornDown
//! ```

use std::fmt;

use bevy::prelude::*;
use studio_core::{
    BodyShape, FrameClock, GridSpec, RenderList, SimError, SimResult, VisualTransform,
    WorldConfig, CEILING_BOUNDARY, FLOOR_BOUNDARY,
};

use crate::registry::BodyRegistry;
use crate::rigid_body::{build_rigid_body, RigidBodyDesc, RigidBodyRecord};
use crate::soft_body::{build_soft_body, SoftBodyParams, SoftBodyRecord};
use crate::world::{PhysicsWorld, RigidHandle, StepReport};

/// How far below the floor a body may fall before it counts as lost.
const FLOOR_MARGIN: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepperState {
    Uninitialized,
    Ready,
    /// Inside `on_frame`, between the world step and the end of syncing.
    Stepping,
    TornDown,
}

impl fmt::Display for StepperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepperState::Uninitialized => "uninitialized",
            StepperState::Ready => "ready",
            StepperState::Stepping => "stepping",
            StepperState::TornDown => "torn down",
        };
        f.write_str(name)
    }
}

/// What one frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameOutcome {
    /// False for a warm-up frame.
    pub stepped: bool,
    pub dt: f32,
    pub report: StepReport,
    pub synced_rigid: usize,
    pub synced_soft: usize,
    /// Synced rigid bodies that had no readable transform.
    pub missing_motion_states: usize,
}

impl FrameOutcome {
    fn warm_up() -> Self {
        Self::default()
    }
}

/// Owns the physics world, the body records and the render list.
pub struct SimulationStepper<W: PhysicsWorld> {
    world: W,
    config: WorldConfig,
    clock: FrameClock,
    registry: BodyRegistry,
    renderables: RenderList,
    state: StepperState,
    ground: Option<RigidBodyRecord>,
    simulated_time: f64,
    frames_stepped: u64,
}

impl<W: PhysicsWorld> SimulationStepper<W> {
    /// # Errors
    /// `InvalidParameter` if `config` fails validation.
    pub fn new(world: W, config: WorldConfig) -> SimResult<Self> {
        config.validate()?;
        let clock = FrameClock::new(config.fixed_step(), config.max_sub_steps)?;
        Ok(Self {
            world,
            config,
            clock,
            registry: BodyRegistry::new(),
            renderables: RenderList::new(),
            state: StepperState::Uninitialized,
            ground: None,
            simulated_time: 0.0,
            frames_stepped: 0,
        })
    }

    /// Create the ground plane (when enabled) and become `Ready`.
    pub fn initialize(&mut self) -> SimResult<()> {
        if self.state != StepperState::Uninitialized {
            return Err(SimError::NotReady(self.state.to_string()));
        }

        if self.config.ground_enabled {
            let desc = RigidBodyDesc::new(
                BodyShape::plane(Vec3::Y),
                0.0,
                Vec3::new(0.0, self.config.ground_height, 0.0),
                Quat::IDENTITY,
            );
            let record = build_rigid_body(
                &mut self.world,
                &mut self.registry,
                &mut self.renderables,
                &desc,
            )?;
            self.ground = Some(record);
        }

        self.clock.reset();
        self.state = StepperState::Ready;
        info!(
            "Simulation initialized: gravity {}, fixed step {:.4}s, max {} sub-steps, ground {}",
            self.config.gravity(),
            self.clock.fixed_step(),
            self.clock.max_sub_steps(),
            if self.ground.is_some() { "on" } else { "off" }
        );
        Ok(())
    }

    fn ensure_open(&self) -> SimResult<()> {
        match self.state {
            StepperState::Uninitialized | StepperState::Ready => Ok(()),
            other => Err(SimError::NotReady(other.to_string())),
        }
    }

    pub fn add_rigid_body(&mut self, desc: &RigidBodyDesc) -> SimResult<RigidBodyRecord> {
        self.ensure_open()?;
        build_rigid_body(&mut self.world, &mut self.registry, &mut self.renderables, desc)
    }

    pub fn add_soft_body(
        &mut self,
        spec: &GridSpec,
        params: &SoftBodyParams,
    ) -> SimResult<SoftBodyRecord> {
        self.ensure_open()?;
        build_soft_body(
            &mut self.world,
            &mut self.registry,
            &mut self.renderables,
            spec,
            params,
        )
    }

    /// Advance the simulation to `timestamp_ms` and sync every visual.
    ///
    /// # Errors
    /// `NotReady` outside the `Ready` state, `WorldStepFailure` when the world
    /// step fails. A failed step is not retried; the timestamp is still
    /// recorded so the next frame does not integrate the same time again.
    pub fn on_frame(&mut self, timestamp_ms: f64) -> SimResult<FrameOutcome> {
        if self.state != StepperState::Ready {
            return Err(SimError::NotReady(self.state.to_string()));
        }

        let Some(dt) = self.clock.delta_seconds(timestamp_ms) else {
            debug!("Warm-up frame at {:.1} ms, no step", timestamp_ms);
            self.clock.record(timestamp_ms);
            return Ok(FrameOutcome::warm_up());
        };

        self.state = StepperState::Stepping;
        let step = self
            .world
            .step(dt, self.clock.fixed_step(), self.clock.max_sub_steps());
        self.clock.record(timestamp_ms);

        let report = match step {
            Ok(report) => report,
            Err(e) => {
                self.state = StepperState::Ready;
                error!("Physics step failed at {:.1} ms: {}", timestamp_ms, e);
                return Err(e);
            }
        };
        if dt > self.clock.max_frame_time() {
            debug!(
                "Frame delta {:.3}s exceeds {:.3}s, dropping {:.3}s",
                dt,
                self.clock.max_frame_time(),
                dt - report.simulated
            );
        }

        let (synced_rigid, missing_motion_states) = self.sync_rigid_bodies();
        let synced_soft = self.sync_soft_bodies();

        self.simulated_time += report.simulated as f64;
        self.frames_stepped += 1;
        self.state = StepperState::Ready;

        Ok(FrameOutcome {
            stepped: true,
            dt,
            report,
            synced_rigid,
            synced_soft,
            missing_motion_states,
        })
    }

    /// Returns `(synced, missing)`.
    fn sync_rigid_bodies(&mut self) -> (usize, usize) {
        let mut synced = 0;
        let mut missing = 0;
        for record in self.registry.needs_sync() {
            let Some((translation, rotation)) = self.world.read_transform(record.handle) else {
                warn!("{}", SimError::MissingMotionState(record.handle.id()));
                missing += 1;
                continue;
            };
            if let Some(visual) = self.renderables.rigid_mut(record.renderable) {
                visual.set_transform(VisualTransform::new(translation, rotation));
                synced += 1;
            }
        }
        (synced, missing)
    }

    fn sync_soft_bodies(&mut self) -> usize {
        let mut synced = 0;
        for record in self.registry.soft_bodies() {
            let Some(visual) = self.renderables.soft_mut(record.renderable) else {
                continue;
            };
            for node in 0..record.node_count {
                if let Some((position, normal)) =
                    self.world.read_soft_node_state(record.handle, node as u32)
                {
                    visual.write_vertex(node, position, normal);
                }
            }
            visual.mark_dirty();
            synced += 1;
        }
        synced
    }

    /// Forget the last timestamp; the next frame is a warm-up frame.
    pub fn reset_clock(&mut self) {
        self.clock.reset();
    }

    /// Stop accepting frames and drop every record.
    pub fn teardown(&mut self) {
        if self.state == StepperState::TornDown {
            return;
        }
        info!(
            "Simulation torn down after {} frames ({:.2}s simulated)",
            self.frames_stepped, self.simulated_time
        );
        self.registry.clear();
        self.renderables = RenderList::new();
        self.ground = None;
        self.state = StepperState::TornDown;
    }

    /// Dynamic bodies below the floor margin or above the ceiling.
    pub fn out_of_bounds_bodies(&self) -> Vec<RigidHandle> {
        self.registry
            .needs_sync()
            .filter_map(|record| {
                let (position, _) = self.world.read_transform(record.handle)?;
                let outside =
                    position.y < FLOOR_BOUNDARY - FLOOR_MARGIN || position.y > CEILING_BOUNDARY;
                outside.then_some(record.handle)
            })
            .collect()
    }

    pub fn state(&self) -> StepperState {
        self.state
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn registry(&self) -> &BodyRegistry {
        &self.registry
    }

    pub fn renderables(&self) -> &RenderList {
        &self.renderables
    }

    /// The renderer clears dirty flags through this.
    pub fn renderables_mut(&mut self) -> &mut RenderList {
        &mut self.renderables
    }

    pub fn ground(&self) -> Option<&RigidBodyRecord> {
        self.ground.as_ref()
    }

    /// Simulated seconds since initialization.
    pub fn simulated_time(&self) -> f64 {
        self.simulated_time
    }

    pub fn frames_stepped(&self) -> u64 {
        self.frames_stepped
    }
}
