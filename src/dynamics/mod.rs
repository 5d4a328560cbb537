//! Multibody dynamics: kinematics, articulated-body solves, constraints and forces.

pub mod aba;
pub mod assembly;
pub mod forces;
pub mod kinematics;
pub mod parallel;
pub mod system;

pub use forces::AppliedForces;
pub use system::MultibodySystem;
