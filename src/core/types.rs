use crate::utils::math::point_mass_inertia;
use crate::utils::spatial::{skew, SpatialMat};
use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rigid placement of one frame in another: orientation plus origin position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: DVec3,
    pub rotation: DQuat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
    };

    pub fn new(rotation: DQuat, position: DVec3) -> Self {
        Self { position, rotation }
    }

    pub fn from_translation(position: DVec3) -> Self {
        Self {
            position,
            rotation: DQuat::IDENTITY,
        }
    }

    pub fn from_rotation(rotation: DQuat) -> Self {
        Self {
            position: DVec3::ZERO,
            rotation,
        }
    }

    /// Applies another transform on top of this one, returning the composition.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * other.position,
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    pub fn inverse(&self) -> Transform {
        let rotation = self.rotation.inverse();
        Transform {
            position: -(rotation * self.position),
            rotation,
        }
    }

    /// Maps a point given in the local frame into the parent frame.
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.position + self.rotation * point
    }

    pub fn rotation_matrix(&self) -> DMat3 {
        DMat3::from_quat(self.rotation)
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.rotation_matrix().transpose();
        for (i, row) in [r.x_axis, r.y_axis, r.z_axis].iter().enumerate() {
            let p = self.position[i];
            writeln!(f, "[{:10.6} {:10.6} {:10.6} | {:10.6}]", row.x, row.y, row.z, p)?;
        }
        Ok(())
    }
}

/// Mass, center of mass and inertia of a rigid body.
///
/// Both `com` and `inertia` are given in the body frame; `inertia` is taken
/// about the body origin, not about the center of mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f64,
    pub com: DVec3,
    pub inertia: DMat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            com: DVec3::ZERO,
            inertia: DMat3::IDENTITY,
        }
    }
}

impl MassProperties {
    pub fn new(mass: f64, com: DVec3, inertia: DMat3) -> Self {
        Self { mass, com, inertia }
    }

    /// Builds properties from an inertia about the center of mass.
    pub fn from_central_inertia(mass: f64, com: DVec3, central: DMat3) -> Self {
        Self {
            mass,
            com,
            inertia: central + point_mass_inertia(com, mass),
        }
    }

    /// Inertia about the center of mass (parallel axis theorem, reversed).
    pub fn central_inertia(&self) -> DMat3 {
        self.inertia - point_mass_inertia(self.com, self.mass)
    }

    /// Spatial inertia about the body origin, with axes rotated by `rotation`.
    pub fn spatial_inertia(&self, rotation: DQuat) -> SpatialMat {
        let r = DMat3::from_quat(rotation);
        let c = r * self.com;
        let mc_skew = skew(c) * self.mass;
        SpatialMat {
            m00: r * self.inertia * r.transpose(),
            m01: mc_skew,
            m10: mc_skew.transpose(),
            m11: DMat3::IDENTITY * self.mass,
        }
    }
}
