//! Stagebody – staged-state rigid multibody dynamics for Rust.
//!
//! A [`MultibodySystem`] describes a tree of rigid bodies connected by
//! joints, optionally closed by constraints. Everything that changes during
//! a simulation lives in a [`State`], which is realized one [`Stage`] at a
//! time: built, modeled, configured, moving, dynamics, reacting. Writing
//! `Q`, `U` or a discrete variable lowers the stage so stale results can
//! never be read.
//!
//! ```no_run
//! use stagebody::{JointKind, MassProperties, MultibodySystem, Stage, State, Transform, GROUND};
//! use stagebody::DVec3;
//!
//! # fn main() -> stagebody::Result<()> {
//! let mut system = MultibodySystem::new();
//! let body = system.add_rigid_body(
//!     MassProperties::new(1.0, DVec3::new(1.0, 0.0, 0.0), stagebody::DMat3::IDENTITY),
//!     Transform::IDENTITY,
//!     GROUND,
//!     Transform::IDENTITY,
//!     JointKind::Pin,
//! )?;
//!
//! let mut state = State::new();
//! system.realize(&mut state, Stage::Configured)?;
//! system.apply_gravity(&mut state, DVec3::new(0.0, -9.81, 0.0))?;
//! system.realize(&mut state, Stage::Reacting)?;
//! println!("udot = {:?}", system.udot(&state)?);
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;

pub use glam::{DMat3, DQuat, DVec3};

pub use config::SolverConfig;
pub use core::{
    articulations::{Body, Joint, Topology, GROUND},
    constraints::Constraint,
    joints::JointKind,
    stage::Stage,
    state::{CacheEntryIndex, DiscreteVariableIndex, State},
    types::{MassProperties, Transform},
};
pub use dynamics::{AppliedForces, MultibodySystem};
pub use error::{Result, SimError};
pub use utils::spatial::{SpatialMat, SpatialVec};
