//! Constraint engine: constraint equations, assembly and velocity projection.

use super::aba::equivalent_joint_forces;
use super::kinematics::{ConfigurationCache, ModelLayout};
use super::system::MultibodySystem;
use crate::core::articulations::Topology;
use crate::core::constraints::Constraint;
use crate::core::stage::Stage;
use crate::core::state::State;
use crate::core::types::Transform;
use crate::error::{Result, SimError};
use crate::utils::logging::PassTimer;
use crate::utils::math::{min_norm_solve, rotation_error};
use crate::utils::spatial::SpatialVec;
use glam::DVec3;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RowKind {
    /// Component of a station separation along a fixed ground axis.
    Station {
        axis: DVec3,
        offset_a: DVec3,
        offset_b: DVec3,
    },
    /// Distance between two stations.
    Distance {
        axis: DVec3,
        offset_a: DVec3,
        offset_b: DVec3,
        length: f64,
    },
    /// Component of the relative rotation vector.
    Orientation,
}

/// One scalar constraint equation, linearized at the current configuration.
///
/// The error rate is `w_b . V_b - w_a . V_a` for body spatial velocities
/// `V` about the body origins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ConstraintRow {
    pub body_a: usize,
    pub body_b: usize,
    pub w_a: SpatialVec,
    pub w_b: SpatialVec,
    pub kind: RowKind,
}

impl ConstraintRow {
    fn station(body_a: usize, offset_a: DVec3, body_b: usize, offset_b: DVec3, axis: DVec3) -> Self {
        Self {
            body_a,
            body_b,
            w_a: SpatialVec::new(offset_a.cross(axis), axis),
            w_b: SpatialVec::new(offset_b.cross(axis), axis),
            kind: RowKind::Station {
                axis,
                offset_a,
                offset_b,
            },
        }
    }

    /// Applies the row to per-body velocities or accelerations.
    pub fn rate(&self, motions: &[SpatialVec]) -> f64 {
        self.w_b.dot(&motions[self.body_b]) - self.w_a.dot(&motions[self.body_a])
    }

    /// Part of the error's second derivative not captured by `rate` applied
    /// to the body accelerations.
    pub fn acceleration_bias(&self, velocities: &[SpatialVec]) -> f64 {
        let va = velocities[self.body_a];
        let vb = velocities[self.body_b];
        let centripetal = |w: DVec3, r: DVec3| w.cross(w.cross(r));
        match self.kind {
            RowKind::Station {
                axis,
                offset_a,
                offset_b,
            } => axis.dot(centripetal(vb.ang, offset_b) - centripetal(va.ang, offset_a)),
            RowKind::Distance {
                axis,
                offset_a,
                offset_b,
                length,
            } => {
                let mut bias =
                    axis.dot(centripetal(vb.ang, offset_b) - centripetal(va.ang, offset_a));
                if length > f64::EPSILON {
                    let separation_rate =
                        (vb.lin + vb.ang.cross(offset_b)) - (va.lin + va.ang.cross(offset_a));
                    let along = axis.dot(separation_rate);
                    bias += (separation_rate.length_squared() - along * along) / length;
                }
                bias
            }
            RowKind::Orientation => 0.0,
        }
    }

    /// Adds the body forces produced by multiplier `lambda`.
    pub fn apply_multiplier(&self, lambda: f64, forces: &mut [SpatialVec]) {
        forces[self.body_b] -= self.w_b * lambda;
        forces[self.body_a] += self.w_a * lambda;
    }
}

/// Builds the constraint rows and position errors, in declaration order.
pub(crate) fn evaluate_constraints(
    topology: &Topology,
    transforms: &[Transform],
) -> (Vec<ConstraintRow>, Vec<f64>) {
    let mut rows = Vec::with_capacity(topology.n_multipliers());
    let mut errors = Vec::with_capacity(topology.n_multipliers());

    for constraint in topology.constraints() {
        match *constraint {
            Constraint::CoincidentStations {
                body_a,
                station_a,
                body_b,
                station_b,
            } => {
                let offset_a = transforms[body_a].rotation * station_a;
                let offset_b = transforms[body_b].rotation * station_b;
                let separation = (transforms[body_b].position + offset_b)
                    - (transforms[body_a].position + offset_a);
                for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
                    rows.push(ConstraintRow::station(body_a, offset_a, body_b, offset_b, axis));
                    errors.push(separation.dot(axis));
                }
            }
            Constraint::Weld {
                body_a,
                frame_a,
                body_b,
                frame_b,
            } => {
                let x_ga = transforms[body_a].combine(&frame_a);
                let x_gb = transforms[body_b].combine(&frame_b);
                let offset_a = x_ga.position - transforms[body_a].position;
                let offset_b = x_gb.position - transforms[body_b].position;
                let separation = x_gb.position - x_ga.position;
                for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
                    rows.push(ConstraintRow::station(body_a, offset_a, body_b, offset_b, axis));
                    errors.push(separation.dot(axis));
                }
                let twist = rotation_error(x_ga.rotation, x_gb.rotation);
                for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
                    rows.push(ConstraintRow {
                        body_a,
                        body_b,
                        w_a: SpatialVec::new(axis, DVec3::ZERO),
                        w_b: SpatialVec::new(axis, DVec3::ZERO),
                        kind: RowKind::Orientation,
                    });
                    errors.push(twist.dot(axis));
                }
            }
            Constraint::ConstantDistance {
                body_a,
                station_a,
                body_b,
                station_b,
                distance,
            } => {
                let offset_a = transforms[body_a].rotation * station_a;
                let offset_b = transforms[body_b].rotation * station_b;
                let separation = (transforms[body_b].position + offset_b)
                    - (transforms[body_a].position + offset_a);
                let length = separation.length();
                // Coincident stations have no direction; any axis will do.
                let axis = if length > f64::EPSILON {
                    separation / length
                } else {
                    DVec3::X
                };
                let mut row = ConstraintRow::station(body_a, offset_a, body_b, offset_b, axis);
                row.kind = RowKind::Distance {
                    axis,
                    offset_a,
                    offset_b,
                    length,
                };
                rows.push(row);
                errors.push(length - distance);
            }
        }
    }
    (rows, errors)
}

/// Velocity constraint Jacobian `G`, one row per constraint equation.
pub(crate) fn constraint_jacobian(
    topology: &Topology,
    layout: &ModelLayout,
    config: &ConfigurationCache,
) -> DMatrix<f64> {
    let rows = &config.constraint_rows;
    let mut jacobian = DMatrix::zeros(rows.len(), layout.nu);
    let mut forces = vec![SpatialVec::ZERO; topology.n_bodies()];
    for (i, row) in rows.iter().enumerate() {
        forces.fill(SpatialVec::ZERO);
        forces[row.body_b] += row.w_b;
        forces[row.body_a] -= row.w_a;
        let generalized = equivalent_joint_forces(topology, layout, config, &forces);
        for (j, value) in generalized.into_iter().enumerate() {
            jacobian[(i, j)] = value;
        }
    }
    jacobian
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
}

impl MultibodySystem {
    /// Moves Q onto the position constraint manifold.
    ///
    /// Quaternions are normalized first, then Newton iterations apply the
    /// minimum-norm correction of the linearized constraint errors until
    /// every error is within the configured tolerance. Q is left untouched
    /// when the constraints already hold.
    ///
    /// On failure Q is restored to its value on entry.
    pub fn enforce_configuration_constraints(&self, state: &mut State) -> Result<()> {
        let _timer = PassTimer::new("assembly", self.n_bodies());
        self.require_stage(state, Stage::Modeled, "configuration constraints")?;
        let initial_q = self.q(state)?.to_vec();
        let result = self.assemble(state);
        if result.is_err() && self.q(state)? != initial_q.as_slice() {
            self.upd_q(state)?.copy_from_slice(&initial_q);
        }
        result
    }

    fn assemble(&self, state: &mut State) -> Result<()> {
        self.normalize_quaternions(state)?;

        let tolerance = self.config().constraint_tolerance;
        let max_iterations = self.config().max_assembly_iterations;
        let epsilon = self.config().singular_value_epsilon;
        let mut max_error = f64::INFINITY;

        for iteration in 0..=max_iterations {
            self.realize(state, Stage::Configured)?;
            let resources = self.resources(state)?;
            let correction = {
                let layout = state.cache_entry::<ModelLayout>(resources.model)?;
                let config = state.cache_entry::<ConfigurationCache>(resources.configuration)?;
                max_error = max_abs(&config.position_errors);
                if max_error <= tolerance {
                    debug!("assembly converged after {iteration} iteration(s), max error {max_error:e}");
                    return Ok(());
                }
                if !max_error.is_finite() || iteration == max_iterations {
                    break;
                }

                let jacobian = constraint_jacobian(self.topology(), layout, config);
                let rhs = -DVector::from_column_slice(&config.position_errors);
                let du = min_norm_solve(jacobian, &rhs, epsilon)?;

                let q = &state.q()[layout.q_block()];
                let mut dq = vec![0.0; layout.nq];
                for body in self.topology().bodies() {
                    if let Some(joint) = &body.joint {
                        let q_range = layout.q_range(body.index);
                        joint.kind.qdot(
                            &q[q_range.clone()],
                            &du.as_slice()[layout.u_range(body.index)],
                            layout.use_euler_angles,
                            &mut dq[q_range],
                        );
                    }
                }
                dq
            };

            for (qi, dqi) in self.upd_q(state)?.iter_mut().zip(correction) {
                *qi += dqi;
            }
            self.normalize_quaternions(state)?;
        }

        warn!("assembly failed: max error {max_error:e} after {max_iterations} iterations");
        Err(SimError::Convergence {
            iterations: max_iterations,
            max_error,
            tolerance,
        })
    }

    /// Projects U onto the velocity constraint manifold `G u = 0` with the
    /// smallest change to U. Requires the state to be Configured.
    pub fn enforce_motion_constraints(&self, state: &mut State) -> Result<()> {
        self.require_stage(state, Stage::Configured, "motion constraints")?;
        let resources = self.resources(state)?;
        let correction = {
            let layout = state.cache_entry::<ModelLayout>(resources.model)?;
            let config = state.cache_entry::<ConfigurationCache>(resources.configuration)?;
            if config.constraint_rows.is_empty() {
                return Ok(());
            }
            let jacobian = constraint_jacobian(self.topology(), layout, config);
            let u = DVector::from_column_slice(&state.u()[layout.u_block()]);
            let residual = &jacobian * u;
            if max_abs(residual.as_slice()) <= self.config().constraint_tolerance {
                return Ok(());
            }
            min_norm_solve(jacobian, &(-residual), self.config().singular_value_epsilon)?
        };
        for (ui, dui) in self.upd_u(state)?.iter_mut().zip(correction.iter()) {
            *ui += dui;
        }
        Ok(())
    }

    fn normalize_quaternions(&self, state: &mut State) -> Result<()> {
        let resources = self.resources(state)?;
        let normalized = {
            let layout = state.cache_entry::<ModelLayout>(resources.model)?;
            if layout.use_euler_angles {
                return Ok(());
            }
            let mut q = state.q()[layout.q_block()].to_vec();
            let mut changed = false;
            for body in self.topology().bodies() {
                if let Some(joint) = &body.joint {
                    changed |= joint
                        .kind
                        .normalize_q(&mut q[layout.q_range(body.index)], false);
                }
            }
            if !changed {
                return Ok(());
            }
            q
        };
        self.upd_q(state)?.copy_from_slice(&normalized);
        Ok(())
    }
}
