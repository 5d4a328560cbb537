use glam::{DMat3, DVec3};
use std::fmt;

/// A 6D spatial vector combining angular and linear components.
/// In motion space, angular is angular velocity and linear is the velocity
/// of the reference point. In force space, angular is the moment about the
/// reference point and linear is force.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpatialVec {
    pub ang: DVec3,
    pub lin: DVec3,
}

impl SpatialVec {
    pub const ZERO: Self = Self::new(DVec3::ZERO, DVec3::ZERO);

    pub const fn new(ang: DVec3, lin: DVec3) -> Self {
        Self { ang, lin }
    }

    pub fn dot(&self, other: &SpatialVec) -> f64 {
        self.ang.dot(other.ang) + self.lin.dot(other.lin)
    }

    /// Re-expresses a motion vector at a point displaced by `offset`.
    pub fn shift_motion(&self, offset: DVec3) -> SpatialVec {
        SpatialVec {
            ang: self.ang,
            lin: self.lin + self.ang.cross(offset),
        }
    }

    /// Moves a force applied at a point displaced by `offset` back to the
    /// original point, adding the moment it produces there.
    pub fn shift_force(&self, offset: DVec3) -> SpatialVec {
        SpatialVec {
            ang: self.ang + offset.cross(self.lin),
            lin: self.lin,
        }
    }
}

impl std::ops::Add for SpatialVec {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            ang: self.ang + other.ang,
            lin: self.lin + other.lin,
        }
    }
}

impl std::ops::AddAssign for SpatialVec {
    fn add_assign(&mut self, other: Self) {
        self.ang += other.ang;
        self.lin += other.lin;
    }
}

impl std::ops::Sub for SpatialVec {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            ang: self.ang - other.ang,
            lin: self.lin - other.lin,
        }
    }
}

impl std::ops::SubAssign for SpatialVec {
    fn sub_assign(&mut self, other: Self) {
        self.ang -= other.ang;
        self.lin -= other.lin;
    }
}

impl std::ops::Mul<f64> for SpatialVec {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            ang: self.ang * rhs,
            lin: self.lin * rhs,
        }
    }
}

impl fmt::Display for SpatialVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.ang, self.lin)
    }
}

/// A 6x6 spatial matrix represented as 4 3x3 blocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialMat {
    pub m00: DMat3,
    pub m01: DMat3,
    pub m10: DMat3,
    pub m11: DMat3,
}

impl Default for SpatialMat {
    fn default() -> Self {
        Self::ZERO
    }
}

impl SpatialMat {
    pub const ZERO: Self = Self {
        m00: DMat3::ZERO,
        m01: DMat3::ZERO,
        m10: DMat3::ZERO,
        m11: DMat3::ZERO,
    };

    pub fn new(m00: DMat3, m01: DMat3, m10: DMat3, m11: DMat3) -> Self {
        Self { m00, m01, m10, m11 }
    }

    pub fn mul_vec(&self, v: SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.m00 * v.ang + self.m01 * v.lin,
            lin: self.m10 * v.ang + self.m11 * v.lin,
        }
    }

    /// Computes the outer product (a * b.T) as a 6x6 matrix.
    pub fn outer(a: SpatialVec, b: SpatialVec) -> Self {
        Self {
            m00: outer_vec3(a.ang, b.ang),
            m01: outer_vec3(a.ang, b.lin),
            m10: outer_vec3(a.lin, b.ang),
            m11: outer_vec3(a.lin, b.lin),
        }
    }

    /// Congruence `phi * self * phi^T` with the rigid shift `phi` by `offset`.
    ///
    /// Takes an inertia-like matrix acting on motions at a point displaced by
    /// `offset` and returns the same operator acting on motions at the
    /// original point.
    pub fn shift(&self, offset: DVec3) -> Self {
        let l = skew(offset);
        let top_left = self.m00 + l * self.m10;
        let top_right = self.m01 + l * self.m11;
        Self {
            m00: top_left - top_right * l,
            m01: top_right,
            m10: self.m10 - self.m11 * l,
            m11: self.m11,
        }
    }
}

/// Cross-product matrix: `skew(a) * b == a.cross(b)`.
pub fn skew(v: DVec3) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, v.z, -v.y),
        DVec3::new(-v.z, 0.0, v.x),
        DVec3::new(v.y, -v.x, 0.0),
    )
}

fn outer_vec3(a: DVec3, b: DVec3) -> DMat3 {
    DMat3::from_cols(a * b.x, a * b.y, a * b.z)
}

impl std::ops::Add for SpatialMat {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            m00: self.m00 + other.m00,
            m01: self.m01 + other.m01,
            m10: self.m10 + other.m10,
            m11: self.m11 + other.m11,
        }
    }
}

impl std::ops::AddAssign for SpatialMat {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl std::ops::Sub for SpatialMat {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            m00: self.m00 - other.m00,
            m01: self.m01 - other.m01,
            m10: self.m10 - other.m10,
            m11: self.m11 - other.m11,
        }
    }
}
