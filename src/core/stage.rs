use serde::{Deserialize, Serialize};
use std::fmt;

/// Computation stages, in the order a [`State`](super::state::State) is realized.
///
/// A quantity computed at a given stage depends only on quantities valid at
/// that stage or earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Nothing allocated yet.
    Empty,
    /// Topology is sealed.
    Built,
    /// Modeling options are fixed and Q/U are allocated.
    Modeled,
    /// Positions are known: body frames and position errors.
    Configured,
    /// Velocities are known.
    Moving,
    /// Forces and articulated inertias are known.
    Dynamics,
    /// Accelerations and constraint multipliers are known.
    Reacting,
}

impl Stage {
    /// Every stage, lowest first.
    pub const ALL: [Stage; 7] = [
        Stage::Empty,
        Stage::Built,
        Stage::Modeled,
        Stage::Configured,
        Stage::Moving,
        Stage::Dynamics,
        Stage::Reacting,
    ];

    /// The stage immediately above this one.
    pub fn next(self) -> Option<Stage> {
        Self::ALL.get(self as usize + 1).copied()
    }

    /// The stage immediately below this one.
    pub fn prev(self) -> Option<Stage> {
        (self as usize).checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Empty => "Empty",
            Stage::Built => "Built",
            Stage::Modeled => "Modeled",
            Stage::Configured => "Configured",
            Stage::Moving => "Moving",
            Stage::Dynamics => "Dynamics",
            Stage::Reacting => "Reacting",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        for pair in Stage::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].next(), Some(pair[1]));
            assert_eq!(pair[1].prev(), Some(pair[0]));
        }
        assert_eq!(Stage::Empty.prev(), None);
        assert_eq!(Stage::Reacting.next(), None);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Configured.to_string(), "Configured");
    }
}
