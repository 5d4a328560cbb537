use super::types::Transform;
use crate::utils::math::{
    euler_xyz_rates, euler_xyz_to_mat3, normalize_quat_slice, quat_from_slice, quat_rates,
};
use crate::utils::spatial::SpatialVec;
use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

const PIN: [SpatialVec; 1] = [SpatialVec::new(DVec3::Z, DVec3::ZERO)];
const SLIDING: [SpatialVec; 1] = [SpatialVec::new(DVec3::ZERO, DVec3::X)];
const CARTESIAN: [SpatialVec; 3] = [
    SpatialVec::new(DVec3::ZERO, DVec3::X),
    SpatialVec::new(DVec3::ZERO, DVec3::Y),
    SpatialVec::new(DVec3::ZERO, DVec3::Z),
];
const BALL: [SpatialVec; 3] = [
    SpatialVec::new(DVec3::X, DVec3::ZERO),
    SpatialVec::new(DVec3::Y, DVec3::ZERO),
    SpatialVec::new(DVec3::Z, DVec3::ZERO),
];
const FREE: [SpatialVec; 6] = [
    SpatialVec::new(DVec3::X, DVec3::ZERO),
    SpatialVec::new(DVec3::Y, DVec3::ZERO),
    SpatialVec::new(DVec3::Z, DVec3::ZERO),
    SpatialVec::new(DVec3::ZERO, DVec3::X),
    SpatialVec::new(DVec3::ZERO, DVec3::Y),
    SpatialVec::new(DVec3::ZERO, DVec3::Z),
];

/// Mobilizer connecting a body to its parent.
///
/// Motion is described in the parent-side joint frame `Jb`: the joint moves
/// the child-side frame `J` relative to `Jb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointKind {
    /// 0-DOF rigid connection.
    Weld,
    /// 1-DOF rotation about the z axis.
    Pin,
    /// 1-DOF translation along the x axis.
    Sliding,
    /// 3-DOF translation.
    Cartesian,
    /// 3-DOF rotation, as a quaternion or as body-fixed X-Y-Z angles.
    Ball,
    /// 6-DOF: ball rotation followed by cartesian translation.
    Free,
}

impl JointKind {
    /// Number of generalized speeds (mobilities).
    pub fn nu(self) -> usize {
        self.spatial_subspace().len()
    }

    /// Number of generalized coordinates.
    pub fn nq(self, use_euler_angles: bool) -> usize {
        match self {
            JointKind::Ball if !use_euler_angles => 4,
            JointKind::Free if !use_euler_angles => 7,
            _ => self.nu(),
        }
    }

    /// Local motion subspace: the relative spatial velocity of `J` in `Jb`,
    /// expressed in `Jb` at the origin of `J`, per unit mobility.
    pub fn spatial_subspace(self) -> &'static [SpatialVec] {
        match self {
            JointKind::Weld => &[],
            JointKind::Pin => &PIN,
            JointKind::Sliding => &SLIDING,
            JointKind::Cartesian => &CARTESIAN,
            JointKind::Ball => &BALL,
            JointKind::Free => &FREE,
        }
    }

    /// Writes the reference configuration into `q`.
    pub fn default_q(self, use_euler_angles: bool, q: &mut [f64]) {
        q.fill(0.0);
        if !use_euler_angles && matches!(self, JointKind::Ball | JointKind::Free) {
            q[0] = 1.0;
        }
    }

    fn rotation(self, q: &[f64], use_euler_angles: bool) -> DQuat {
        if use_euler_angles {
            DQuat::from_mat3(&euler_xyz_to_mat3(DVec3::new(q[0], q[1], q[2])))
        } else {
            quat_from_slice(q).normalize()
        }
    }

    /// Relative transform `X_JbJ(q)` across the joint.
    pub fn transform(self, q: &[f64], use_euler_angles: bool) -> Transform {
        match self {
            JointKind::Weld => Transform::IDENTITY,
            JointKind::Pin => Transform::from_rotation(DQuat::from_rotation_z(q[0])),
            JointKind::Sliding => Transform::from_translation(DVec3::X * q[0]),
            JointKind::Cartesian => Transform::from_translation(DVec3::new(q[0], q[1], q[2])),
            JointKind::Ball => Transform::from_rotation(self.rotation(q, use_euler_angles)),
            JointKind::Free => {
                let t = if use_euler_angles { 3 } else { 4 };
                Transform::new(
                    self.rotation(q, use_euler_angles),
                    DVec3::new(q[t], q[t + 1], q[t + 2]),
                )
            }
        }
    }

    /// Coordinate rates `qdot = N(q) u`.
    pub fn qdot(self, q: &[f64], u: &[f64], use_euler_angles: bool, qdot: &mut [f64]) {
        match self {
            JointKind::Weld => {}
            JointKind::Pin | JointKind::Sliding | JointKind::Cartesian => qdot.copy_from_slice(u),
            JointKind::Ball | JointKind::Free => {
                let omega = DVec3::new(u[0], u[1], u[2]);
                let t = if use_euler_angles {
                    let rates = euler_xyz_rates(DVec3::new(q[0], q[1], q[2]), omega);
                    qdot[..3].copy_from_slice(&rates.to_array());
                    3
                } else {
                    qdot[..4].copy_from_slice(&quat_rates(q, omega));
                    4
                };
                if self == JointKind::Free {
                    qdot[t..t + 3].copy_from_slice(&u[3..6]);
                }
            }
        }
    }

    /// Projects quaternion coordinates back to unit length. Returns whether `q` changed.
    pub fn normalize_q(self, q: &mut [f64], use_euler_angles: bool) -> bool {
        match self {
            JointKind::Ball | JointKind::Free if !use_euler_angles => normalize_quat_slice(q),
            _ => false,
        }
    }

    /// Hinge matrix columns in the ground frame, about the child body origin.
    ///
    /// `frame` is the ground orientation of `Jb`; `offset` runs from the
    /// origin of `J` to the origin of the child body, in ground.
    pub fn hinge_columns(self, frame: DQuat, offset: DVec3) -> Vec<SpatialVec> {
        self.spatial_subspace()
            .iter()
            .map(|s| {
                let ang = frame * s.ang;
                SpatialVec::new(ang, frame * s.lin + ang.cross(offset))
            })
            .collect()
    }
}
