//! Additional math helpers layered on top of `glam` and `nalgebra`.

use crate::error::{Result, SimError};
use glam::{DMat3, DQuat, DVec3};
use nalgebra::{DMatrix, DVector};

/// Inertia of a point mass `mass` located at `position`, about the origin.
pub fn point_mass_inertia(position: DVec3, mass: f64) -> DMat3 {
    let d2 = position.length_squared();
    (DMat3::from_diagonal(DVec3::splat(d2))
        - DMat3::from_cols(position * position.x, position * position.y, position * position.z))
        * mass
}

/// Body-fixed X-Y-Z rotation `Rx(a) * Ry(b) * Rz(c)`.
pub fn euler_xyz_to_mat3(angles: DVec3) -> DMat3 {
    DMat3::from_rotation_x(angles.x) * DMat3::from_rotation_y(angles.y) * DMat3::from_rotation_z(angles.z)
}

/// Angle rates for body-fixed X-Y-Z angles given the angular velocity
/// expressed in the parent frame. Singular at `b = ±pi/2`.
pub fn euler_xyz_rates(angles: DVec3, angular_velocity: DVec3) -> DVec3 {
    let rx = DMat3::from_rotation_x(angles.x);
    let e2 = rx * DVec3::Y;
    let e3 = rx * DMat3::from_rotation_y(angles.y) * DVec3::Z;
    DMat3::from_cols(DVec3::X, e2, e3).inverse() * angular_velocity
}

/// Reads a quaternion stored as `[w, x, y, z]`.
pub fn quat_from_slice(q: &[f64]) -> DQuat {
    DQuat::from_xyzw(q[1], q[2], q[3], q[0])
}

/// Time derivative of a `[w, x, y, z]` quaternion rotating with angular
/// velocity `omega` expressed in the parent frame.
pub fn quat_rates(q: &[f64], omega: DVec3) -> [f64; 4] {
    let w = q[0];
    let v = DVec3::new(q[1], q[2], q[3]);
    let dv = 0.5 * (w * omega + omega.cross(v));
    [-0.5 * omega.dot(v), dv.x, dv.y, dv.z]
}

/// Scales a `[w, x, y, z]` quaternion to unit length. Returns whether it changed.
pub fn normalize_quat_slice(q: &mut [f64]) -> bool {
    let norm = q[..4].iter().map(|c| c * c).sum::<f64>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        q[..4].copy_from_slice(&[1.0, 0.0, 0.0, 0.0]);
        return true;
    }
    if (norm - 1.0).abs() <= f64::EPSILON {
        return false;
    }
    for c in &mut q[..4] {
        *c /= norm;
    }
    true
}

/// Rotation vector (axis times angle) of the shortest rotation taking
/// `from` onto `to`, expressed in the common frame.
pub fn rotation_error(from: DQuat, to: DQuat) -> DVec3 {
    let mut delta = to * from.inverse();
    if delta.w < 0.0 {
        delta = -delta;
    }
    delta.to_scaled_axis()
}

/// Minimum-norm least-squares solution of `a * x = b` through the SVD.
///
/// Singular values at or below `epsilon` are dropped, so rank-deficient
/// systems still produce the smallest correction that best fits `b`.
pub fn min_norm_solve(a: DMatrix<f64>, b: &DVector<f64>, epsilon: f64) -> Result<DVector<f64>> {
    if a.nrows() == 0 || a.ncols() == 0 {
        return Ok(DVector::zeros(a.ncols()));
    }
    a.svd(true, true)
        .solve(b, epsilon)
        .map_err(|msg| SimError::invalid_argument(format!("SVD solve failed: {msg}")))
}
