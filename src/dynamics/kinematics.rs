//! Position and velocity passes over the body tree.

use super::assembly::{evaluate_constraints, ConstraintRow};
use super::parallel::map_indexed;
use crate::core::articulations::Topology;
use crate::core::types::Transform;
use crate::utils::spatial::{SpatialMat, SpatialVec};
use glam::DVec3;
use std::ops::Range;

/// Per-state partition of Q and U among the joints, fixed at Modeled.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ModelLayout {
    pub use_euler_angles: bool,
    /// Offset of this system's block inside the state's Q.
    pub q_start: usize,
    /// Offset of this system's block inside the state's U.
    pub u_start: usize,
    pub nq: usize,
    pub nu: usize,
    /// Prefix sums over bodies: body `k` owns `q_offsets[k]..q_offsets[k + 1]`.
    q_offsets: Vec<usize>,
    u_offsets: Vec<usize>,
}

impl ModelLayout {
    pub fn new(topology: &Topology, use_euler_angles: bool) -> Self {
        let mut q_offsets = vec![0];
        let mut u_offsets = vec![0];
        for body in topology.bodies() {
            let (nq, nu) = body
                .joint
                .as_ref()
                .map(|joint| (joint.kind.nq(use_euler_angles), joint.kind.nu()))
                .unwrap_or((0, 0));
            q_offsets.push(q_offsets[body.index] + nq);
            u_offsets.push(u_offsets[body.index] + nu);
        }
        let nq = q_offsets.last().copied().unwrap_or(0);
        let nu = u_offsets.last().copied().unwrap_or(0);
        Self {
            use_euler_angles,
            q_start: 0,
            u_start: 0,
            nq,
            nu,
            q_offsets,
            u_offsets,
        }
    }

    /// Range of `body`'s coordinates within this system's Q block.
    pub fn q_range(&self, body: usize) -> Range<usize> {
        self.q_offsets[body]..self.q_offsets[body + 1]
    }

    /// Range of `body`'s mobilities within this system's U block.
    pub fn u_range(&self, body: usize) -> Range<usize> {
        self.u_offsets[body]..self.u_offsets[body + 1]
    }

    pub fn q_block(&self) -> Range<usize> {
        self.q_start..self.q_start + self.nq
    }

    pub fn u_block(&self) -> Range<usize> {
        self.u_start..self.u_start + self.nu
    }
}

/// Quantities that depend on Q only.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConfigurationCache {
    /// Ground placement of every body frame.
    pub body_transforms: Vec<Transform>,
    /// Hinge matrix columns, ground frame, about each body origin.
    pub hinges: Vec<Vec<SpatialVec>>,
    /// Parent origin to body origin, in ground.
    pub parent_offsets: Vec<DVec3>,
    /// Child-side joint frame origin to body origin, in ground.
    pub joint_offsets: Vec<DVec3>,
    /// Body origin to center of mass, in ground.
    pub com_offsets: Vec<DVec3>,
    /// Spatial inertia about each body origin, ground axes.
    pub spatial_inertias: Vec<SpatialMat>,
    pub constraint_rows: Vec<ConstraintRow>,
    pub position_errors: Vec<f64>,
}

/// Quantities that depend on Q and U.
#[derive(Debug, Clone, Default)]
pub(crate) struct MotionCache {
    pub body_velocities: Vec<SpatialVec>,
    /// Velocity-product acceleration each joint adds on top of its parent's.
    pub coriolis: Vec<SpatialVec>,
    /// Gyroscopic force about each body origin.
    pub gyroscopic: Vec<SpatialVec>,
    pub qdot: Vec<f64>,
    pub velocity_errors: Vec<f64>,
}

/// Forward position kinematics, base to tip.
pub(crate) fn configure(
    topology: &Topology,
    layout: &ModelLayout,
    q: &[f64],
    parallel: bool,
) -> ConfigurationCache {
    let n = topology.n_bodies();
    let mut body_transforms = vec![Transform::IDENTITY; n];
    let mut hinges = vec![Vec::new(); n];
    let mut parent_offsets = vec![DVec3::ZERO; n];
    let mut joint_offsets = vec![DVec3::ZERO; n];

    for body in topology.bodies() {
        let Some(joint) = &body.joint else {
            continue;
        };
        let k = body.index;
        let x_gp = body_transforms[joint.parent];
        let x_gjb = x_gp.combine(&joint.frame_on_parent);
        let x_jbj = joint
            .kind
            .transform(&q[layout.q_range(k)], layout.use_euler_angles);
        let x_gj = x_gjb.combine(&x_jbj);
        let x_gb = x_gj.combine(&joint.frame_on_child.inverse());

        joint_offsets[k] = x_gb.position - x_gj.position;
        parent_offsets[k] = x_gb.position - x_gp.position;
        hinges[k] = joint.kind.hinge_columns(x_gjb.rotation, joint_offsets[k]);
        body_transforms[k] = x_gb;
    }

    let bodies = topology.bodies();
    let com_offsets = map_indexed(n, parallel, |k| {
        body_transforms[k].rotation * bodies[k].mass_properties.com
    });
    let spatial_inertias = map_indexed(n, parallel, |k| {
        bodies[k]
            .mass_properties
            .spatial_inertia(body_transforms[k].rotation)
    });

    let (constraint_rows, position_errors) = evaluate_constraints(topology, &body_transforms);

    ConfigurationCache {
        body_transforms,
        hinges,
        parent_offsets,
        joint_offsets,
        com_offsets,
        spatial_inertias,
        constraint_rows,
        position_errors,
    }
}

/// Forward velocity kinematics, base to tip.
pub(crate) fn motion(
    topology: &Topology,
    layout: &ModelLayout,
    config: &ConfigurationCache,
    q: &[f64],
    u: &[f64],
) -> MotionCache {
    let n = topology.n_bodies();
    let mut body_velocities = vec![SpatialVec::ZERO; n];
    let mut coriolis = vec![SpatialVec::ZERO; n];
    let mut gyroscopic = vec![SpatialVec::ZERO; n];
    let mut qdot = vec![0.0; layout.nq];

    for body in topology.bodies() {
        let Some(joint) = &body.joint else {
            continue;
        };
        let k = body.index;
        let u_k = &u[layout.u_range(k)];
        let relative = config.hinges[k]
            .iter()
            .zip(u_k)
            .fold(SpatialVec::ZERO, |acc, (h, &rate)| acc + *h * rate);

        let parent = body_velocities[joint.parent];
        let w_p = parent.ang;
        let l = config.parent_offsets[k];
        let r = config.joint_offsets[k];
        body_velocities[k] = parent.shift_motion(l) + relative;
        coriolis[k] = SpatialVec::new(
            w_p.cross(relative.ang),
            w_p.cross(w_p.cross(l))
                + 2.0 * w_p.cross(relative.lin)
                + relative.ang.cross(relative.ang.cross(r)),
        );

        let w = body_velocities[k].ang;
        let c = config.com_offsets[k];
        let inertia = config.spatial_inertias[k].m00;
        gyroscopic[k] = SpatialVec::new(
            w.cross(inertia * w),
            body.mass_properties.mass * w.cross(w.cross(c)),
        );

        let q_range = layout.q_range(k);
        joint.kind.qdot(
            &q[q_range.clone()],
            u_k,
            layout.use_euler_angles,
            &mut qdot[q_range],
        );
    }

    let velocity_errors = config
        .constraint_rows
        .iter()
        .map(|row| row.rate(&body_velocities))
        .collect();

    MotionCache {
        body_velocities,
        coriolis,
        gyroscopic,
        qdot,
        velocity_errors,
    }
}
