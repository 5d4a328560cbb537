use super::constraints::Constraint;
use super::joints::JointKind;
use super::types::{MassProperties, Transform};
use crate::error::{Result, SimError};

/// Index of the immovable ground body.
pub const GROUND: usize = 0;

/// Joint connecting a body to its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub kind: JointKind,
    /// Index of the parent body. Always lower than the child's index.
    pub parent: usize,
    /// Placement of the parent-side joint frame `Jb` in the parent body frame.
    pub frame_on_parent: Transform,
    /// Placement of the child-side joint frame `J` in the child body frame.
    pub frame_on_child: Transform,
}

/// A single node in the body tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub index: usize,
    pub mass_properties: MassProperties,
    /// None for ground.
    pub joint: Option<Joint>,
}

impl Body {
    pub fn parent(&self) -> Option<usize> {
        self.joint.as_ref().map(|joint| joint.parent)
    }

    pub fn is_ground(&self) -> bool {
        self.joint.is_none()
    }
}

/// Bodies, joints and constraints of a multibody system.
///
/// Bodies form a tree rooted at ground (index 0). Every body names a parent
/// that already exists, so index order is a valid base-to-tip ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    bodies: Vec<Body>,
    constraints: Vec<Constraint>,
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology {
    pub fn new() -> Self {
        Self {
            bodies: vec![Body {
                index: GROUND,
                mass_properties: MassProperties::new(0.0, glam::DVec3::ZERO, glam::DMat3::ZERO),
                joint: None,
            }],
            constraints: Vec::new(),
        }
    }

    /// Adds a body attached to `parent` and returns its index.
    pub fn add_rigid_body(
        &mut self,
        mass_properties: MassProperties,
        frame_on_child: Transform,
        parent: usize,
        frame_on_parent: Transform,
        kind: JointKind,
    ) -> Result<usize> {
        if parent >= self.bodies.len() {
            return Err(SimError::topology(format!(
                "parent body {parent} does not exist ({} bodies)",
                self.bodies.len()
            )));
        }
        if !(mass_properties.mass.is_finite() && mass_properties.mass >= 0.0) {
            return Err(SimError::invalid_argument(format!(
                "body mass must be finite and non-negative, got {}",
                mass_properties.mass
            )));
        }
        let index = self.bodies.len();
        self.bodies.push(Body {
            index,
            mass_properties,
            joint: Some(Joint {
                kind,
                parent,
                frame_on_parent,
                frame_on_child,
            }),
        });
        Ok(index)
    }

    /// Adds a constraint between two existing, distinct bodies.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<usize> {
        let (a, b) = constraint.bodies();
        for body in [a, b] {
            if body >= self.bodies.len() {
                return Err(SimError::topology(format!(
                    "constraint refers to missing body {body}"
                )));
            }
        }
        if a == b {
            return Err(SimError::topology(format!(
                "constraint must connect two distinct bodies, got {a} twice"
            )));
        }
        self.constraints.push(constraint);
        Ok(self.constraints.len() - 1)
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn body(&self, index: usize) -> Option<&Body> {
        self.bodies.get(index)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Number of bodies including ground.
    pub fn n_bodies(&self) -> usize {
        self.bodies.len()
    }

    pub fn n_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Total number of scalar constraint equations.
    pub fn n_multipliers(&self) -> usize {
        self.constraints.iter().map(Constraint::n_multipliers).sum()
    }
}
