use super::kinematics::{ConfigurationCache, ModelLayout, MotionCache};
use crate::core::articulations::{Topology, GROUND};
use crate::error::{Result, SimError};
use crate::utils::math::min_norm_solve;
use crate::utils::spatial::{SpatialMat, SpatialVec};
use nalgebra::{DMatrix, DVector};

/// Articulated-body quantities of one joint, valid for a configuration.
#[derive(Debug, Clone)]
pub(crate) struct ArticulatedInertia {
    /// Articulated inertia with the joint's mobilities projected out, as
    /// seen by the parent (before the shift to the parent origin).
    pub projected: SpatialMat,
    /// Inverse of `H^T P H`.
    pub d_inv: DMatrix<f64>,
    /// Columns of `P H (H^T P H)^-1`.
    pub gain: Vec<SpatialVec>,
}

impl Default for ArticulatedInertia {
    fn default() -> Self {
        Self {
            projected: SpatialMat::ZERO,
            d_inv: DMatrix::zeros(0, 0),
            gain: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DynamicsCache {
    pub articulated: Vec<ArticulatedInertia>,
}

/// Outputs of a forward dynamics solve.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReactionCache {
    pub udot: Vec<f64>,
    pub body_accelerations: Vec<SpatialVec>,
    pub multipliers: Vec<f64>,
}

/// Inward pass accumulating articulated inertias, tip to base.
pub(crate) fn articulated_inertias(
    topology: &Topology,
    config: &ConfigurationCache,
) -> Result<Vec<ArticulatedInertia>> {
    let n = topology.n_bodies();
    let mut inertia = config.spatial_inertias.clone();
    let mut out = vec![ArticulatedInertia::default(); n];

    for body in topology.bodies().iter().rev() {
        let Some(joint) = &body.joint else {
            continue;
        };
        let k = body.index;
        let hinge = &config.hinges[k];
        let nu = hinge.len();

        let ph: Vec<SpatialVec> = hinge.iter().map(|h| inertia[k].mul_vec(*h)).collect();
        let d_inv = if nu == 0 {
            DMatrix::zeros(0, 0)
        } else {
            let d = DMatrix::from_fn(nu, nu, |i, j| hinge[i].dot(&ph[j]));
            d.cholesky()
                .ok_or(SimError::SingularMassMatrix { body: k })?
                .inverse()
        };

        let gain: Vec<SpatialVec> = (0..nu)
            .map(|j| {
                (0..nu).fold(SpatialVec::ZERO, |acc, i| acc + ph[i] * d_inv[(i, j)])
            })
            .collect();
        let projected = gain
            .iter()
            .zip(&ph)
            .fold(inertia[k], |acc, (g, p)| acc - SpatialMat::outer(*g, *p));

        if joint.parent != GROUND {
            let shifted = projected.shift(config.parent_offsets[k]);
            inertia[joint.parent] += shifted;
        }
        out[k] = ArticulatedInertia {
            projected,
            d_inv,
            gain,
        };
    }
    Ok(out)
}

/// Tree forward dynamics for given articulated inertias.
///
/// With `motion` set this is the full articulated-body solve including
/// velocity-product terms. Without it the result is `M^-1 (tau + J^T F)`.
/// Returns generalized accelerations and body spatial accelerations.
pub(crate) fn solve_tree(
    topology: &Topology,
    layout: &ModelLayout,
    config: &ConfigurationCache,
    articulated: &[ArticulatedInertia],
    motion: Option<&MotionCache>,
    joint_forces: &[f64],
    body_forces: &[SpatialVec],
) -> (Vec<f64>, Vec<SpatialVec>) {
    let n = topology.n_bodies();
    let mut bias = vec![SpatialVec::ZERO; n];
    let mut residual = vec![0.0; layout.nu];

    // --- Inward: articulated bias forces ---
    for body in topology.bodies().iter().rev() {
        let Some(joint) = &body.joint else {
            continue;
        };
        let k = body.index;
        let mut z = bias[k] - body_forces[k];
        if let Some(m) = motion {
            z += m.gyroscopic[k];
        }
        let range = layout.u_range(k);
        let mut z_plus = z;
        for (j, h) in config.hinges[k].iter().enumerate() {
            let i = range.start + j;
            residual[i] = joint_forces[i] - h.dot(&z);
            z_plus += articulated[k].gain[j] * residual[i];
        }
        if let Some(m) = motion {
            z_plus += articulated[k].projected.mul_vec(m.coriolis[k]);
        }
        if joint.parent != GROUND {
            bias[joint.parent] += z_plus.shift_force(config.parent_offsets[k]);
        }
    }

    // --- Outward: accelerations ---
    let mut accelerations = vec![SpatialVec::ZERO; n];
    let mut udot = vec![0.0; layout.nu];
    for body in topology.bodies() {
        let Some(joint) = &body.joint else {
            continue;
        };
        let k = body.index;
        let mut y = accelerations[joint.parent].shift_motion(config.parent_offsets[k]);
        if let Some(m) = motion {
            y += m.coriolis[k];
        }
        let range = layout.u_range(k);
        let art = &articulated[k];
        let mut a = y;
        for (i, h) in config.hinges[k].iter().enumerate() {
            let projected: f64 = (0..range.len())
                .map(|j| art.d_inv[(i, j)] * residual[range.start + j])
                .sum();
            let value = projected - art.gain[i].dot(&y);
            udot[range.start + i] = value;
            a += *h * value;
        }
        accelerations[k] = a;
    }
    (udot, accelerations)
}

/// Generalized forces equivalent to spatial body forces: `J^T F`.
pub(crate) fn equivalent_joint_forces(
    topology: &Topology,
    layout: &ModelLayout,
    config: &ConfigurationCache,
    body_forces: &[SpatialVec],
) -> Vec<f64> {
    let mut accumulated = body_forces.to_vec();
    let mut tau = vec![0.0; layout.nu];
    for body in topology.bodies().iter().rev() {
        let Some(joint) = &body.joint else {
            continue;
        };
        let k = body.index;
        let start = layout.u_range(k).start;
        for (j, h) in config.hinges[k].iter().enumerate() {
            tau[start + j] = h.dot(&accumulated[k]);
        }
        if joint.parent != GROUND {
            let transmitted = accumulated[k].shift_force(config.parent_offsets[k]);
            accumulated[joint.parent] += transmitted;
        }
    }
    tau
}

/// Forward dynamics with every constraint enforced at the acceleration level.
///
/// Multipliers solve `(G M^-1 G^T) lambda = G udot_free + bias` with a
/// minimum-norm SVD solve, one unit-multiplier tree solve per equation.
#[allow(clippy::too_many_arguments)]
pub(crate) fn constrained_accelerations(
    topology: &Topology,
    layout: &ModelLayout,
    config: &ConfigurationCache,
    motion: &MotionCache,
    articulated: &[ArticulatedInertia],
    joint_forces: &[f64],
    body_forces: &[SpatialVec],
    epsilon: f64,
) -> Result<ReactionCache> {
    let (udot, body_accelerations) = solve_tree(
        topology,
        layout,
        config,
        articulated,
        Some(motion),
        joint_forces,
        body_forces,
    );
    let rows = &config.constraint_rows;
    if rows.is_empty() {
        return Ok(ReactionCache {
            udot,
            body_accelerations,
            multipliers: Vec::new(),
        });
    }

    let m = rows.len();
    let rhs = DVector::from_iterator(
        m,
        rows.iter().map(|row| {
            -(row.rate(&body_accelerations) + row.acceleration_bias(&motion.body_velocities))
        }),
    );

    let no_joint_forces = vec![0.0; layout.nu];
    let mut unit_forces = vec![SpatialVec::ZERO; topology.n_bodies()];
    let mut response = DMatrix::zeros(m, m);
    for (i, row) in rows.iter().enumerate() {
        unit_forces.fill(SpatialVec::ZERO);
        row.apply_multiplier(1.0, &mut unit_forces);
        let (_, delta) = solve_tree(
            topology,
            layout,
            config,
            articulated,
            None,
            &no_joint_forces,
            &unit_forces,
        );
        for (j, other) in rows.iter().enumerate() {
            response[(j, i)] = other.rate(&delta);
        }
    }

    let multipliers = min_norm_solve(response, &rhs, epsilon)?;
    let mut total = body_forces.to_vec();
    for (row, lambda) in rows.iter().zip(multipliers.iter()) {
        row.apply_multiplier(*lambda, &mut total);
    }
    let (udot, body_accelerations) = solve_tree(
        topology,
        layout,
        config,
        articulated,
        Some(motion),
        joint_forces,
        &total,
    );
    Ok(ReactionCache {
        udot,
        body_accelerations,
        multipliers: multipliers.iter().copied().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::joints::JointKind;
    use crate::core::types::{MassProperties, Transform};
    use crate::dynamics::kinematics::{configure, motion};
    use glam::{DMat3, DVec3};

    fn pin_pendulum(length: f64, mass: f64) -> Topology {
        let mut topo = Topology::new();
        topo.add_rigid_body(
            MassProperties::new(mass, DVec3::ZERO, DMat3::ZERO),
            Transform::from_translation(DVec3::new(-length, 0.0, 0.0)),
            GROUND,
            Transform::IDENTITY,
            JointKind::Pin,
        )
        .unwrap();
        topo
    }

    #[test]
    fn test_pin_pendulum_matches_closed_form() {
        let (length, mass, g) = (2.0, 1.5, 9.8);
        let topo = pin_pendulum(length, mass);
        let layout = ModelLayout::new(&topo, false);
        let theta: f64 = -0.4;
        let q = [theta];
        let u = [0.0];
        let config = configure(&topo, &layout, &q, false);
        let moving = motion(&topo, &layout, &config, &q, &u);
        let art = articulated_inertias(&topo, &config).unwrap();

        let forces = vec![
            SpatialVec::ZERO,
            SpatialVec::new(DVec3::ZERO, DVec3::new(0.0, -g * mass, 0.0)),
        ];
        let (udot, _) = solve_tree(&topo, &layout, &config, &art, Some(&moving), &[0.0], &forces);
        assert!((udot[0] - (-g / length * theta.cos())).abs() < 1e-12);
    }

    #[test]
    fn test_centripetal_acceleration() {
        let topo = pin_pendulum(2.0, 1.0);
        let layout = ModelLayout::new(&topo, false);
        let q = [0.0];
        let u = [3.0];
        let config = configure(&topo, &layout, &q, false);
        let moving = motion(&topo, &layout, &config, &q, &u);
        let art = articulated_inertias(&topo, &config).unwrap();
        let forces = vec![SpatialVec::ZERO; 2];
        let (udot, acc) = solve_tree(&topo, &layout, &config, &art, Some(&moving), &[0.0], &forces);
        assert!(udot[0].abs() < 1e-12);
        // w^2 * L toward the pivot.
        assert!((acc[1].lin - DVec3::new(-18.0, 0.0, 0.0)).length() < 1e-9);
    }

    #[test]
    fn test_massless_body_is_singular() {
        let mut topo = Topology::new();
        topo.add_rigid_body(
            MassProperties::new(0.0, DVec3::ZERO, DMat3::ZERO),
            Transform::IDENTITY,
            GROUND,
            Transform::IDENTITY,
            JointKind::Sliding,
        )
        .unwrap();
        let layout = ModelLayout::new(&topo, false);
        let config = configure(&topo, &layout, &[0.0], false);
        let err = articulated_inertias(&topo, &config).unwrap_err();
        assert_eq!(err, SimError::SingularMassMatrix { body: 1 });
    }
}
