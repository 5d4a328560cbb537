//! Core types describing bodies, joints, constraints, stages and state.

pub mod articulations;
pub mod constraints;
pub mod joints;
pub mod stage;
pub mod state;
pub mod types;

pub use articulations::{Body, Joint, Topology, GROUND};
pub use constraints::Constraint;
pub use joints::JointKind;
pub use stage::Stage;
pub use state::{CacheEntryIndex, DiscreteVariableIndex, State};
pub use types::{MassProperties, Transform};
