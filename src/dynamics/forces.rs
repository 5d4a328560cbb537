//! Per-state accumulator of applied forces.

use super::kinematics::{ConfigurationCache, ModelLayout};
use super::parallel::map_indexed;
use super::system::MultibodySystem;
use crate::core::articulations::{Topology, GROUND};
use crate::core::stage::Stage;
use crate::core::state::State;
use crate::error::{Result, SimError};
use crate::utils::spatial::SpatialVec;
use glam::DVec3;

/// Forces applied to the system for the next dynamics realization.
///
/// Body forces are taken about each body origin and expressed in ground.
/// Joint forces are indexed like the system's U block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedForces {
    pub body_forces: Vec<SpatialVec>,
    pub joint_forces: Vec<f64>,
}

impl AppliedForces {
    pub fn new(n_bodies: usize, n_mobilities: usize) -> Self {
        Self {
            body_forces: vec![SpatialVec::ZERO; n_bodies],
            joint_forces: vec![0.0; n_mobilities],
        }
    }

    pub fn clear(&mut self) {
        self.body_forces.fill(SpatialVec::ZERO);
        self.joint_forces.fill(0.0);
    }
}

/// Weight of each body as a force plus moment about its origin.
pub(crate) fn gravity_forces(
    topology: &Topology,
    config: &ConfigurationCache,
    gravity: DVec3,
    parallel: bool,
) -> Vec<SpatialVec> {
    let bodies = topology.bodies();
    map_indexed(topology.n_bodies(), parallel, |k| {
        if k == GROUND {
            return SpatialVec::ZERO;
        }
        let weight = gravity * bodies[k].mass_properties.mass;
        SpatialVec::new(config.com_offsets[k].cross(weight), weight)
    })
}

impl MultibodySystem {
    fn upd_applied_forces<'s>(&self, state: &'s mut State) -> Result<&'s mut AppliedForces> {
        let resources = self.resources(state)?;
        state.upd_discrete_variable::<AppliedForces>(resources.forces)
    }

    /// Currently accumulated body forces, ground included at index 0.
    pub fn applied_body_forces<'s>(&self, state: &'s State) -> Result<&'s [SpatialVec]> {
        let resources = self.resources(state)?;
        let forces = state.discrete_variable::<AppliedForces>(resources.forces)?;
        Ok(&forces.body_forces)
    }

    /// Currently accumulated generalized forces.
    pub fn applied_joint_forces<'s>(&self, state: &'s State) -> Result<&'s [f64]> {
        let resources = self.resources(state)?;
        let forces = state.discrete_variable::<AppliedForces>(resources.forces)?;
        Ok(&forces.joint_forces)
    }

    /// Zeroes every accumulated force.
    pub fn clear_applied_forces(&self, state: &mut State) -> Result<()> {
        self.upd_applied_forces(state)?.clear();
        Ok(())
    }

    /// Adds the weight of every body, applied at its center of mass.
    pub fn apply_gravity(&self, state: &mut State, gravity: DVec3) -> Result<()> {
        let resources = self.resources(state)?;
        let weights = {
            let config = state.cache_entry::<ConfigurationCache>(resources.configuration)?;
            gravity_forces(self.topology(), config, gravity, self.parallel_enabled())
        };
        let forces = self.upd_applied_forces(state)?;
        for (acc, weight) in forces.body_forces.iter_mut().zip(weights) {
            *acc += weight;
        }
        Ok(())
    }

    /// Adds a scalar generalized force to one mobility of `body`'s joint.
    pub fn apply_joint_force(
        &self,
        state: &mut State,
        body: usize,
        mobility: usize,
        force: f64,
    ) -> Result<()> {
        self.check_body(body)?;
        let resources = self.resources(state)?;
        let index = {
            let layout = state.cache_entry::<ModelLayout>(resources.model)?;
            let range = layout.u_range(body);
            if mobility >= range.len() {
                return Err(SimError::invalid_argument(format!(
                    "body {body} has {} mobilities, got mobility {mobility}",
                    range.len()
                )));
            }
            range.start + mobility
        };
        self.upd_applied_forces(state)?.joint_forces[index] += force;
        Ok(())
    }

    /// Adds a force (ground frame) acting at a station fixed on `body`.
    pub fn apply_point_force(
        &self,
        state: &mut State,
        body: usize,
        station: DVec3,
        force: DVec3,
    ) -> Result<()> {
        self.check_body(body)?;
        let resources = self.resources(state)?;
        let spatial = {
            let config = state.cache_entry::<ConfigurationCache>(resources.configuration)?;
            let offset = config.body_transforms[body].rotation * station;
            SpatialVec::new(offset.cross(force), force)
        };
        self.upd_applied_forces(state)?.body_forces[body] += spatial;
        Ok(())
    }

    /// Adds a spatial force about `body`'s origin, in ground.
    pub fn apply_body_force(&self, state: &mut State, body: usize, force: SpatialVec) -> Result<()> {
        self.check_body(body)?;
        self.require_stage(state, Stage::Modeled, "applied forces")?;
        self.upd_applied_forces(state)?.body_forces[body] += force;
        Ok(())
    }
}
