use super::types::Transform;
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Kinematic constraints between two bodies of the tree.
///
/// Stations and frames are fixed in the body they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// A point on `body_a` and a point on `body_b` must coincide.
    CoincidentStations {
        body_a: usize,
        station_a: DVec3,
        body_b: usize,
        station_b: DVec3,
    },
    /// A frame on `body_a` and a frame on `body_b` must coincide.
    Weld {
        body_a: usize,
        frame_a: Transform,
        body_b: usize,
        frame_b: Transform,
    },
    /// Two points must stay `distance` apart.
    ConstantDistance {
        body_a: usize,
        station_a: DVec3,
        body_b: usize,
        station_b: DVec3,
        distance: f64,
    },
}

impl Constraint {
    pub fn bodies(&self) -> (usize, usize) {
        match *self {
            Constraint::CoincidentStations { body_a, body_b, .. }
            | Constraint::Weld { body_a, body_b, .. }
            | Constraint::ConstantDistance { body_a, body_b, .. } => (body_a, body_b),
        }
    }

    /// Number of scalar equations this constraint contributes.
    pub fn n_multipliers(&self) -> usize {
        match self {
            Constraint::CoincidentStations { .. } => 3,
            Constraint::Weld { .. } => 6,
            Constraint::ConstantDistance { .. } => 1,
        }
    }
}
