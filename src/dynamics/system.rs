//! The multibody system: topology plus the stage-by-stage solver.

use super::aba::{
    articulated_inertias, constrained_accelerations, equivalent_joint_forces, ArticulatedInertia,
    DynamicsCache, ReactionCache,
};
use super::forces::AppliedForces;
use super::kinematics::{self, ConfigurationCache, ModelLayout, MotionCache};
use crate::config::SolverConfig;
use crate::core::articulations::Topology;
use crate::core::constraints::Constraint;
use crate::core::joints::JointKind;
use crate::core::stage::Stage;
use crate::core::state::{CacheEntryIndex, DiscreteVariableIndex, State};
use crate::core::types::{MassProperties, Transform};
use crate::error::{Result, SimError};
use crate::utils::logging::PassTimer;
use crate::utils::spatial::SpatialVec;
use glam::DVec3;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

static NEXT_SYSTEM_ID: AtomicUsize = AtomicUsize::new(1);

/// Indices of the state resources owned by one system.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeResources {
    pub forces: DiscreteVariableIndex,
    pub model: CacheEntryIndex,
    pub configuration: CacheEntryIndex,
    pub motion: CacheEntryIndex,
    pub dynamics: CacheEntryIndex,
    pub reaction: CacheEntryIndex,
}

#[derive(Debug, Clone, Copy)]
struct TreeStateIndices {
    owner: usize,
    use_euler_angles: DiscreteVariableIndex,
    resources: Option<TreeResources>,
}

/// A tree of rigid bodies with constraints, realized against a [`State`].
///
/// Bodies and constraints can be added until the first
/// `realize(state, Stage::Built)`, which seals the topology. After that the
/// system is read-only and can be shared between threads, each driving its
/// own `State`.
pub struct MultibodySystem {
    id: usize,
    topology: Topology,
    sealed: AtomicBool,
    config: SolverConfig,
    parallel_enabled: bool,
}

impl Default for MultibodySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MultibodySystem {
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    pub fn with_config(config: SolverConfig) -> Self {
        Self {
            id: NEXT_SYSTEM_ID.fetch_add(1, AtomicOrdering::Relaxed),
            topology: Topology::new(),
            sealed: AtomicBool::new(false),
            config,
            parallel_enabled: cfg!(feature = "parallel"),
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    /// Enables or disables parallel per-body passes.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.parallel_enabled = enabled;
    }

    /// Returns whether per-body passes run on the rayon pool.
    pub fn parallel_enabled(&self) -> bool {
        self.parallel_enabled && cfg!(feature = "parallel")
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// True once a state has been realized to Built.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(AtomicOrdering::Acquire)
    }

    fn ensure_unsealed(&self, what: &str) -> Result<()> {
        if self.is_sealed() {
            return Err(SimError::ordering(format!(
                "cannot add {what}: topology is sealed"
            )));
        }
        Ok(())
    }

    /// Adds a body connected to `parent` by a joint of the given kind.
    ///
    /// `joint_frame` places the child-side joint frame in the new body;
    /// `parent_frame` places the parent-side joint frame in the parent body.
    pub fn add_rigid_body(
        &mut self,
        mass_properties: MassProperties,
        joint_frame: Transform,
        parent: usize,
        parent_frame: Transform,
        kind: JointKind,
    ) -> Result<usize> {
        self.ensure_unsealed("a body")?;
        self.topology
            .add_rigid_body(mass_properties, joint_frame, parent, parent_frame, kind)
    }

    /// Requires `station_a` on `body_a` and `station_b` on `body_b` to coincide.
    pub fn add_coincident_stations_constraint(
        &mut self,
        body_a: usize,
        station_a: DVec3,
        body_b: usize,
        station_b: DVec3,
    ) -> Result<usize> {
        self.ensure_unsealed("a constraint")?;
        self.topology.add_constraint(Constraint::CoincidentStations {
            body_a,
            station_a,
            body_b,
            station_b,
        })
    }

    /// Requires `frame_a` on `body_a` and `frame_b` on `body_b` to coincide.
    pub fn add_weld_constraint(
        &mut self,
        body_a: usize,
        frame_a: Transform,
        body_b: usize,
        frame_b: Transform,
    ) -> Result<usize> {
        self.ensure_unsealed("a constraint")?;
        self.topology.add_constraint(Constraint::Weld {
            body_a,
            frame_a,
            body_b,
            frame_b,
        })
    }

    /// Requires two stations to stay `distance` apart.
    pub fn add_constant_distance_constraint(
        &mut self,
        body_a: usize,
        station_a: DVec3,
        body_b: usize,
        station_b: DVec3,
        distance: f64,
    ) -> Result<usize> {
        self.ensure_unsealed("a constraint")?;
        if !(distance.is_finite() && distance >= 0.0) {
            return Err(SimError::invalid_argument(format!(
                "constraint distance must be finite and non-negative, got {distance}"
            )));
        }
        self.topology.add_constraint(Constraint::ConstantDistance {
            body_a,
            station_a,
            body_b,
            station_b,
            distance,
        })
    }

    /// Number of bodies, ground included.
    pub fn n_bodies(&self) -> usize {
        self.topology.n_bodies()
    }

    pub fn n_constraints(&self) -> usize {
        self.topology.n_constraints()
    }

    pub fn mass_properties(&self, body: usize) -> Result<&MassProperties> {
        self.topology
            .body(body)
            .map(|b| &b.mass_properties)
            .ok_or_else(|| SimError::invalid_argument(format!("no body {body}")))
    }

    pub(crate) fn check_body(&self, body: usize) -> Result<()> {
        if body >= self.topology.n_bodies() {
            return Err(SimError::invalid_argument(format!(
                "no body {body} ({} bodies)",
                self.topology.n_bodies()
            )));
        }
        Ok(())
    }

    pub(crate) fn require_stage(&self, state: &State, required: Stage, what: &str) -> Result<()> {
        if state.stage() < required {
            return Err(SimError::not_realized(what, required, state.stage()));
        }
        Ok(())
    }

    fn indices(&self, state: &State) -> Result<TreeStateIndices> {
        match state.extension::<TreeStateIndices>() {
            Some(indices) if indices.owner == self.id => Ok(*indices),
            Some(_) => Err(SimError::ordering(
                "state was built by a different multibody system",
            )),
            None => Err(SimError::not_realized(
                "multibody state",
                Stage::Built,
                state.stage(),
            )),
        }
    }

    pub(crate) fn resources(&self, state: &State) -> Result<TreeResources> {
        self.indices(state)?.resources.ok_or_else(|| {
            SimError::not_realized("multibody state variables", Stage::Modeled, state.stage())
        })
    }

    fn layout<'s>(&self, state: &'s State) -> Result<&'s ModelLayout> {
        let resources = self.resources(state)?;
        state.cache_entry::<ModelLayout>(resources.model)
    }

    fn configuration<'s>(&self, state: &'s State) -> Result<&'s ConfigurationCache> {
        let resources = self.resources(state)?;
        state.cache_entry::<ConfigurationCache>(resources.configuration)
    }

    fn motion<'s>(&self, state: &'s State) -> Result<&'s MotionCache> {
        let resources = self.resources(state)?;
        state.cache_entry::<MotionCache>(resources.motion)
    }

    fn reaction<'s>(&self, state: &'s State) -> Result<&'s ReactionCache> {
        let resources = self.resources(state)?;
        state.cache_entry::<ReactionCache>(resources.reaction)
    }

    // ---------------------------------------------------------------------
    // Stage ladder
    // ---------------------------------------------------------------------

    /// Computes everything owed up to and including `target`.
    ///
    /// Stages are realized one at a time from the state's current stage; a
    /// target at or below the current stage is a no-op. On error the state
    /// stays at the last stage that completed.
    pub fn realize(&self, state: &mut State, target: Stage) -> Result<()> {
        while state.stage() < target {
            let Some(next) = state.stage().next() else {
                break;
            };
            let _timer = PassTimer::new(next.name(), self.topology.n_bodies());
            match next {
                Stage::Empty => {}
                Stage::Built => self.realize_built(state)?,
                Stage::Modeled => self.realize_modeled(state)?,
                Stage::Configured => self.realize_configured(state)?,
                Stage::Moving => self.realize_moving(state)?,
                Stage::Dynamics => self.realize_dynamics(state)?,
                Stage::Reacting => self.realize_reacting(state)?,
            }
            state.advance_realized(next)?;
        }
        Ok(())
    }

    fn realize_built(&self, state: &mut State) -> Result<()> {
        if !self.sealed.swap(true, AtomicOrdering::AcqRel) {
            info!(
                "topology sealed: {} bodies, {} constraints ({} equations)",
                self.topology.n_bodies(),
                self.topology.n_constraints(),
                self.topology.n_multipliers()
            );
        }
        match state.extension::<TreeStateIndices>() {
            Some(indices) if indices.owner == self.id => Ok(()),
            Some(_) => Err(SimError::ordering(
                "state was built by a different multibody system",
            )),
            None => {
                let use_euler_angles = state.allocate_discrete_variable(Stage::Modeled, false)?;
                state.insert_extension(TreeStateIndices {
                    owner: self.id,
                    use_euler_angles,
                    resources: None,
                });
                Ok(())
            }
        }
    }

    fn realize_modeled(&self, state: &mut State) -> Result<()> {
        let indices = self.indices(state)?;
        let use_euler_angles = *state.discrete_variable::<bool>(indices.use_euler_angles)?;

        if let Some(resources) = indices.resources {
            let layout = state.upd_cache_entry::<ModelLayout>(resources.model)?;
            if layout.use_euler_angles != use_euler_angles {
                return Err(SimError::ordering(
                    "rotation parametrization changed after Q was allocated",
                ));
            }
            return Ok(());
        }

        let n = self.topology.n_bodies();
        let mut layout = ModelLayout::new(&self.topology, use_euler_angles);
        let mut q = vec![0.0; layout.nq];
        for body in self.topology.bodies() {
            if let Some(joint) = &body.joint {
                joint
                    .kind
                    .default_q(use_euler_angles, &mut q[layout.q_range(body.index)]);
            }
        }
        layout.q_start = state.allocate_q(&q)?;
        layout.u_start = state.allocate_u(&vec![0.0; layout.nu])?;
        debug!(
            "allocated {} q and {} u ({})",
            layout.nq,
            layout.nu,
            if use_euler_angles { "euler angles" } else { "quaternions" }
        );

        let forces =
            state.allocate_discrete_variable(Stage::Dynamics, AppliedForces::new(n, layout.nu))?;
        let model = state.allocate_cache_entry(Stage::Modeled, layout)?;
        let configuration =
            state.allocate_cache_entry(Stage::Configured, ConfigurationCache::default())?;
        let motion = state.allocate_cache_entry(Stage::Moving, MotionCache::default())?;
        let dynamics = state.allocate_cache_entry(Stage::Dynamics, DynamicsCache::default())?;
        let reaction = state.allocate_cache_entry(Stage::Reacting, ReactionCache::default())?;

        if let Some(indices) = state.extension_mut::<TreeStateIndices>() {
            indices.resources = Some(TreeResources {
                forces,
                model,
                configuration,
                motion,
                dynamics,
                reaction,
            });
        }
        Ok(())
    }

    fn realize_configured(&self, state: &mut State) -> Result<()> {
        let resources = self.resources(state)?;
        let cache = {
            let layout = state.cache_entry::<ModelLayout>(resources.model)?;
            let q = &state.q()[layout.q_block()];
            kinematics::configure(&self.topology, layout, q, self.parallel_enabled())
        };
        *state.upd_cache_entry::<ConfigurationCache>(resources.configuration)? = cache;
        Ok(())
    }

    fn realize_moving(&self, state: &mut State) -> Result<()> {
        let resources = self.resources(state)?;
        let cache = {
            let layout = state.cache_entry::<ModelLayout>(resources.model)?;
            let config = state.cache_entry::<ConfigurationCache>(resources.configuration)?;
            let q = &state.q()[layout.q_block()];
            let u = &state.u()[layout.u_block()];
            kinematics::motion(&self.topology, layout, config, q, u)
        };
        *state.upd_cache_entry::<MotionCache>(resources.motion)? = cache;
        Ok(())
    }

    fn realize_dynamics(&self, state: &mut State) -> Result<()> {
        let resources = self.resources(state)?;
        let articulated = {
            let config = state.cache_entry::<ConfigurationCache>(resources.configuration)?;
            articulated_inertias(&self.topology, config)?
        };
        state
            .upd_cache_entry::<DynamicsCache>(resources.dynamics)?
            .articulated = articulated;
        Ok(())
    }

    fn realize_reacting(&self, state: &mut State) -> Result<()> {
        let resources = self.resources(state)?;
        let reaction = {
            let layout = state.cache_entry::<ModelLayout>(resources.model)?;
            let config = state.cache_entry::<ConfigurationCache>(resources.configuration)?;
            let motion = state.cache_entry::<MotionCache>(resources.motion)?;
            let dynamics = state.cache_entry::<DynamicsCache>(resources.dynamics)?;
            let forces = state.discrete_variable::<AppliedForces>(resources.forces)?;
            constrained_accelerations(
                &self.topology,
                layout,
                config,
                motion,
                &dynamics.articulated,
                &forces.joint_forces,
                &forces.body_forces,
                self.config.singular_value_epsilon,
            )?
        };
        *state.upd_cache_entry::<ReactionCache>(resources.reaction)? = reaction;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Modeling options
    // ---------------------------------------------------------------------

    /// Chooses Euler angles (true) or quaternions (false) for ball and free
    /// joints. Only legal between Built and Modeled.
    pub fn set_use_euler_angles(&self, state: &mut State, use_euler_angles: bool) -> Result<()> {
        let indices = self.indices(state)?;
        if state.stage() >= Stage::Modeled {
            return Err(SimError::ordering(
                "rotation parametrization is fixed once the state is Modeled",
            ));
        }
        *state.upd_discrete_variable::<bool>(indices.use_euler_angles)? = use_euler_angles;
        Ok(())
    }

    pub fn use_euler_angles(&self, state: &State) -> Result<bool> {
        let indices = self.indices(state)?;
        state
            .discrete_variable::<bool>(indices.use_euler_angles)
            .copied()
    }

    // ---------------------------------------------------------------------
    // State variables
    // ---------------------------------------------------------------------

    pub fn n_q(&self, state: &State) -> Result<usize> {
        Ok(self.layout(state)?.nq)
    }

    pub fn n_u(&self, state: &State) -> Result<usize> {
        Ok(self.layout(state)?.nu)
    }

    /// This system's generalized coordinates.
    pub fn q<'s>(&self, state: &'s State) -> Result<&'s [f64]> {
        let block = self.layout(state)?.q_block();
        Ok(&state.q()[block])
    }

    /// This system's generalized speeds.
    pub fn u<'s>(&self, state: &'s State) -> Result<&'s [f64]> {
        let block = self.layout(state)?.u_block();
        Ok(&state.u()[block])
    }

    /// Mutable Q; the state drops back to Modeled.
    pub fn upd_q<'s>(&self, state: &'s mut State) -> Result<&'s mut [f64]> {
        let block = self.layout(state)?.q_block();
        Ok(&mut state.upd_q()[block])
    }

    /// Mutable U; the state drops back to Configured.
    pub fn upd_u<'s>(&self, state: &'s mut State) -> Result<&'s mut [f64]> {
        let block = self.layout(state)?.u_block();
        Ok(&mut state.upd_u()[block])
    }

    fn joint_slot(&self, state: &State, body: usize, slot: usize, speeds: bool) -> Result<usize> {
        self.check_body(body)?;
        let layout = self.layout(state)?;
        let range = if speeds {
            layout.u_range(body)
        } else {
            layout.q_range(body)
        };
        if slot >= range.len() {
            return Err(SimError::invalid_argument(format!(
                "body {body} has {} {}, got slot {slot}",
                range.len(),
                if speeds { "speeds" } else { "coordinates" }
            )));
        }
        Ok(range.start + slot)
    }

    pub fn joint_q(&self, state: &State, body: usize, slot: usize) -> Result<f64> {
        let index = self.joint_slot(state, body, slot, false)?;
        Ok(self.q(state)?[index])
    }

    pub fn set_joint_q(&self, state: &mut State, body: usize, slot: usize, value: f64) -> Result<()> {
        let index = self.joint_slot(state, body, slot, false)?;
        self.upd_q(state)?[index] = value;
        Ok(())
    }

    pub fn joint_u(&self, state: &State, body: usize, slot: usize) -> Result<f64> {
        let index = self.joint_slot(state, body, slot, true)?;
        Ok(self.u(state)?[index])
    }

    pub fn set_joint_u(&self, state: &mut State, body: usize, slot: usize, value: f64) -> Result<()> {
        let index = self.joint_slot(state, body, slot, true)?;
        self.upd_u(state)?[index] = value;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Realized outputs
    // ---------------------------------------------------------------------

    /// Ground placement of `body`'s frame. Requires Configured.
    pub fn body_configuration(&self, state: &State, body: usize) -> Result<Transform> {
        self.check_body(body)?;
        self.configuration(state)?
            .body_transforms
            .get(body)
            .copied()
            .ok_or_else(|| SimError::not_realized("body configuration", Stage::Configured, state.stage()))
    }

    /// Spatial velocity of `body` about its origin, in ground. Requires Moving.
    pub fn body_velocity(&self, state: &State, body: usize) -> Result<SpatialVec> {
        self.check_body(body)?;
        self.motion(state)?
            .body_velocities
            .get(body)
            .copied()
            .ok_or_else(|| SimError::not_realized("body velocity", Stage::Moving, state.stage()))
    }

    /// Spatial acceleration of `body` about its origin, in ground. Requires Reacting.
    pub fn body_acceleration(&self, state: &State, body: usize) -> Result<SpatialVec> {
        self.check_body(body)?;
        self.reaction(state)?
            .body_accelerations
            .get(body)
            .copied()
            .ok_or_else(|| SimError::not_realized("body acceleration", Stage::Reacting, state.stage()))
    }

    /// Coordinate rates. Requires Moving.
    pub fn qdot<'s>(&self, state: &'s State) -> Result<&'s [f64]> {
        Ok(&self.motion(state)?.qdot)
    }

    /// Generalized accelerations. Requires Reacting.
    pub fn udot<'s>(&self, state: &'s State) -> Result<&'s [f64]> {
        Ok(&self.reaction(state)?.udot)
    }

    /// Constraint multipliers in declaration order. Requires Reacting.
    pub fn multipliers<'s>(&self, state: &'s State) -> Result<&'s [f64]> {
        Ok(&self.reaction(state)?.multipliers)
    }

    /// Scalar position errors in declaration order. Requires Configured.
    pub fn constraint_position_errors<'s>(&self, state: &'s State) -> Result<&'s [f64]> {
        Ok(&self.configuration(state)?.position_errors)
    }

    /// Scalar velocity errors in declaration order. Requires Moving.
    pub fn constraint_velocity_errors<'s>(&self, state: &'s State) -> Result<&'s [f64]> {
        Ok(&self.motion(state)?.velocity_errors)
    }

    // ---------------------------------------------------------------------
    // Operators
    // ---------------------------------------------------------------------

    fn check_body_forces(&self, body_forces: &[SpatialVec]) -> Result<()> {
        if body_forces.len() != self.topology.n_bodies() {
            return Err(SimError::invalid_argument(format!(
                "expected {} body forces, got {}",
                self.topology.n_bodies(),
                body_forces.len()
            )));
        }
        Ok(())
    }

    /// Generalized accelerations produced by the given forces, with every
    /// constraint enforced. Requires Moving; the state is not modified.
    pub fn calc_tree_udot(
        &self,
        state: &State,
        joint_forces: &[f64],
        body_forces: &[SpatialVec],
    ) -> Result<Vec<f64>> {
        self.require_stage(state, Stage::Moving, "tree accelerations")?;
        self.check_body_forces(body_forces)?;
        let resources = self.resources(state)?;
        let layout = state.cache_entry::<ModelLayout>(resources.model)?;
        if joint_forces.len() != layout.nu {
            return Err(SimError::invalid_argument(format!(
                "expected {} joint forces, got {}",
                layout.nu,
                joint_forces.len()
            )));
        }
        let config = state.cache_entry::<ConfigurationCache>(resources.configuration)?;
        let motion = state.cache_entry::<MotionCache>(resources.motion)?;

        let computed: Vec<ArticulatedInertia>;
        let articulated = if state.stage() >= Stage::Dynamics {
            &state
                .cache_entry::<DynamicsCache>(resources.dynamics)?
                .articulated
        } else {
            computed = articulated_inertias(&self.topology, config)?;
            &computed
        };

        let reaction = constrained_accelerations(
            &self.topology,
            layout,
            config,
            motion,
            articulated,
            joint_forces,
            body_forces,
            self.config.singular_value_epsilon,
        )?;
        Ok(reaction.udot)
    }

    /// Generalized forces equivalent to spatial forces applied about each
    /// body origin. Requires Moving.
    pub fn calc_tree_equivalent_joint_forces(
        &self,
        state: &State,
        body_forces: &[SpatialVec],
    ) -> Result<Vec<f64>> {
        self.require_stage(state, Stage::Moving, "equivalent joint forces")?;
        self.check_body_forces(body_forces)?;
        let layout = self.layout(state)?;
        let config = self.configuration(state)?;
        Ok(equivalent_joint_forces(
            &self.topology,
            layout,
            config,
            body_forces,
        ))
    }

    /// Gradient of a scalar function with respect to U's mobilities, given
    /// its gradient with respect to each body's spatial placement. Same
    /// projection as [`calc_tree_equivalent_joint_forces`](Self::calc_tree_equivalent_joint_forces).
    pub fn calc_internal_gradient_from_spatial(
        &self,
        state: &State,
        d_e_d_r: &[SpatialVec],
    ) -> Result<Vec<f64>> {
        self.calc_tree_equivalent_joint_forces(state, d_e_d_r)
    }
}
