//! Stage-gated storage for everything that varies during a simulation.
//!
//! A [`State`] owns the generalized coordinates `Q`, the generalized speeds
//! `U`, typed discrete variables and cached solver outputs. Each discrete
//! variable and cache entry carries the [`Stage`] it belongs to. Writing an
//! input lowers the state's stage so that dependent cache entries read as
//! stale until they are realized again.

use super::stage::Stage;
use crate::error::{Result, SimError};
use log::debug;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Handle to a discrete variable allocated in a [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiscreteVariableIndex(usize);

/// Handle to a cache entry allocated in a [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheEntryIndex(usize);

impl DiscreteVariableIndex {
    pub fn index(self) -> usize {
        self.0
    }
}

impl CacheEntryIndex {
    pub fn index(self) -> usize {
        self.0
    }
}

struct Slot {
    stage: Stage,
    value: Box<dyn Any + Send + Sync>,
}

/// Container for simulation variables and their derived quantities.
pub struct State {
    stage: Stage,
    q: Vec<f64>,
    u: Vec<f64>,
    discrete: Vec<Slot>,
    cache: Vec<Slot>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    /// Set once a solver has attached its bookkeeping. From then on only
    /// the solver may advance past Built.
    managed: bool,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub fn new() -> Self {
        Self {
            stage: Stage::Empty,
            q: Vec::new(),
            u: Vec::new(),
            discrete: Vec::new(),
            cache: Vec::new(),
            extensions: HashMap::new(),
            managed: false,
        }
    }

    /// Highest stage whose outputs are currently valid.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Moves the state to `target`.
    ///
    /// Advancing is only legal one stage at a time. Asking for a stage at or
    /// below the current one is a no-op. Once a solver manages the state,
    /// stages above Built can only be reached through its `realize`, since
    /// their cache entries would otherwise never be filled.
    pub fn advance_to_stage(&mut self, target: Stage) -> Result<()> {
        if self.managed && target > Stage::Built && target > self.stage {
            return Err(SimError::ordering(format!(
                "stage {target} must be realized by the owning system (state is at {})",
                self.stage
            )));
        }
        self.advance_realized(target)
    }

    /// Stage bump used by a solver after it has filled the caches of `target`.
    pub(crate) fn advance_realized(&mut self, target: Stage) -> Result<()> {
        if target <= self.stage {
            return Ok(());
        }
        if self.stage.next() != Some(target) {
            return Err(SimError::Stage {
                current: self.stage,
                requested: target,
            });
        }
        debug!("state advanced {} -> {}", self.stage, target);
        self.stage = target;
        Ok(())
    }

    /// Marks `stage` and everything above it as stale.
    pub fn invalidate(&mut self, stage: Stage) {
        if self.stage >= stage {
            let lowered = stage.prev().unwrap_or(Stage::Empty);
            debug!("state invalidated {} -> {}", self.stage, lowered);
            self.stage = lowered;
        }
    }

    /// Appends a block of generalized coordinates and returns its offset.
    pub fn allocate_q(&mut self, initial: &[f64]) -> Result<usize> {
        if self.stage > Stage::Built {
            return Err(SimError::ordering(format!(
                "Q can only be allocated up to stage Built (state is at {})",
                self.stage
            )));
        }
        let offset = self.q.len();
        self.q.extend_from_slice(initial);
        Ok(offset)
    }

    /// Appends a block of generalized speeds and returns its offset.
    pub fn allocate_u(&mut self, initial: &[f64]) -> Result<usize> {
        if self.stage > Stage::Built {
            return Err(SimError::ordering(format!(
                "U can only be allocated up to stage Built (state is at {})",
                self.stage
            )));
        }
        let offset = self.u.len();
        self.u.extend_from_slice(initial);
        Ok(offset)
    }

    pub fn q(&self) -> &[f64] {
        &self.q
    }

    pub fn u(&self) -> &[f64] {
        &self.u
    }

    /// Mutable access to Q. Everything from Configured up becomes stale.
    pub fn upd_q(&mut self) -> &mut [f64] {
        self.invalidate(Stage::Configured);
        &mut self.q
    }

    /// Mutable access to U. Everything from Moving up becomes stale.
    pub fn upd_u(&mut self) -> &mut [f64] {
        self.invalidate(Stage::Moving);
        &mut self.u
    }

    /// Allocates a discrete variable that affects computations at `stage`.
    pub fn allocate_discrete_variable<T: Any + Send + Sync>(
        &mut self,
        stage: Stage,
        value: T,
    ) -> Result<DiscreteVariableIndex> {
        if self.stage >= stage {
            return Err(SimError::ordering(format!(
                "discrete variable for stage {stage} allocated while state is at {}",
                self.stage
            )));
        }
        self.discrete.push(Slot {
            stage,
            value: Box::new(value),
        });
        Ok(DiscreteVariableIndex(self.discrete.len() - 1))
    }

    pub fn discrete_variable<T: Any>(&self, index: DiscreteVariableIndex) -> Result<&T> {
        let slot = self
            .discrete
            .get(index.0)
            .ok_or_else(|| SimError::invalid_argument(format!("no discrete variable {}", index.0)))?;
        slot.value.downcast_ref::<T>().ok_or_else(|| {
            SimError::invalid_argument(format!(
                "discrete variable {} is not a {}",
                index.0,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Mutable access to a discrete variable; its stage and above become stale.
    pub fn upd_discrete_variable<T: Any>(&mut self, index: DiscreteVariableIndex) -> Result<&mut T> {
        let stage = self
            .discrete_variable_stage(index)
            .ok_or_else(|| SimError::invalid_argument(format!("no discrete variable {}", index.0)))?;
        if !self.discrete[index.0].value.is::<T>() {
            return Err(SimError::invalid_argument(format!(
                "discrete variable {} is not a {}",
                index.0,
                std::any::type_name::<T>()
            )));
        }
        self.invalidate(stage);
        self.discrete[index.0]
            .value
            .downcast_mut::<T>()
            .ok_or_else(|| SimError::invalid_argument(format!("discrete variable {}", index.0)))
    }

    /// Stage invalidated by writes to the variable at `index`.
    pub fn discrete_variable_stage(&self, index: DiscreteVariableIndex) -> Option<Stage> {
        self.discrete.get(index.0).map(|slot| slot.stage)
    }

    /// Allocates a cache entry that becomes valid once `stage` is reached.
    pub(crate) fn allocate_cache_entry<T: Any + Send + Sync>(
        &mut self,
        stage: Stage,
        value: T,
    ) -> Result<CacheEntryIndex> {
        if self.stage >= stage {
            return Err(SimError::ordering(format!(
                "cache entry for stage {stage} allocated while state is at {}",
                self.stage
            )));
        }
        self.cache.push(Slot {
            stage,
            value: Box::new(value),
        });
        Ok(CacheEntryIndex(self.cache.len() - 1))
    }

    /// Reads a cache entry; fails if its stage has not been realized.
    pub fn cache_entry<T: Any>(&self, index: CacheEntryIndex) -> Result<&T> {
        let slot = self
            .cache
            .get(index.0)
            .ok_or_else(|| SimError::invalid_argument(format!("no cache entry {}", index.0)))?;
        if self.stage < slot.stage {
            return Err(SimError::not_realized(
                std::any::type_name::<T>(),
                slot.stage,
                self.stage,
            ));
        }
        slot.value.downcast_ref::<T>().ok_or_else(|| {
            SimError::invalid_argument(format!(
                "cache entry {} is not a {}",
                index.0,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Solver-side write access; no stage check and no invalidation.
    pub(crate) fn upd_cache_entry<T: Any>(&mut self, index: CacheEntryIndex) -> Result<&mut T> {
        let slot = self
            .cache
            .get_mut(index.0)
            .ok_or_else(|| SimError::invalid_argument(format!("no cache entry {}", index.0)))?;
        slot.value.downcast_mut::<T>().ok_or_else(|| {
            SimError::invalid_argument(format!(
                "cache entry {} is not a {}",
                index.0,
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn n_discrete_variables(&self) -> usize {
        self.discrete.len()
    }

    pub fn n_cache_entries(&self) -> usize {
        self.cache.len()
    }

    /// Per-owner bookkeeping, keyed by type.
    pub(crate) fn extension<T: Any>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub(crate) fn extension_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.extensions
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub(crate) fn insert_extension<T: Any + Send + Sync>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
        self.managed = true;
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("stage", &self.stage)
            .field("q", &self.q)
            .field("u", &self.u)
            .field("discrete_variables", &self.n_discrete_variables())
            .field("cache_entries", &self.n_cache_entries())
            .finish()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "State @ {}", self.stage)?;
        writeln!(f, "  q = {:?}", self.q)?;
        writeln!(f, "  u = {:?}", self.u)?;
        write!(
            f,
            "  {} discrete variable(s), {} cache entr{}",
            self.n_discrete_variables(),
            self.n_cache_entries(),
            if self.n_cache_entries() == 1 { "y" } else { "ies" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_one_stage_at_a_time() {
        let mut state = State::new();
        assert!(state.advance_to_stage(Stage::Modeled).is_err());
        state.advance_to_stage(Stage::Built).unwrap();
        state.advance_to_stage(Stage::Modeled).unwrap();
        // Re-validation of a lower stage leaves the state alone.
        state.advance_to_stage(Stage::Built).unwrap();
        assert_eq!(state.stage(), Stage::Modeled);
    }

    #[test]
    fn test_q_allocation_window() {
        let mut state = State::new();
        state.advance_to_stage(Stage::Built).unwrap();
        assert_eq!(state.allocate_q(&[1.0, 2.0, 3.0]).unwrap(), 0);
        assert_eq!(state.allocate_q(&[4.0, 5.0]).unwrap(), 3);
        state.advance_to_stage(Stage::Modeled).unwrap();
        assert!(matches!(
            state.allocate_q(&[0.0]),
            Err(SimError::Ordering(_))
        ));
        assert_eq!(state.q(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_discrete_variable_invalidates_its_stage() {
        let mut state = State::new();
        state.advance_to_stage(Stage::Built).unwrap();
        let dv = state.allocate_discrete_variable(Stage::Dynamics, 5_i32).unwrap();
        for stage in [Stage::Modeled, Stage::Configured, Stage::Moving, Stage::Dynamics] {
            state.advance_to_stage(stage).unwrap();
        }
        *state.upd_discrete_variable::<i32>(dv).unwrap() = 71;
        assert_eq!(*state.discrete_variable::<i32>(dv).unwrap(), 71);
        assert_eq!(state.stage(), Stage::Moving);
    }

    #[test]
    fn test_discrete_variable_wrong_type() {
        let mut state = State::new();
        let dv = state.allocate_discrete_variable(Stage::Modeled, true).unwrap();
        assert!(state.discrete_variable::<i32>(dv).is_err());
        assert!(state.upd_discrete_variable::<f64>(dv).is_err());
        assert_eq!(state.stage(), Stage::Empty);
    }

    #[test]
    fn test_cache_entry_requires_stage() {
        let mut state = State::new();
        let entry = state
            .allocate_cache_entry(Stage::Built, vec![1.0_f64])
            .unwrap();
        assert!(matches!(
            state.cache_entry::<Vec<f64>>(entry),
            Err(SimError::NotRealized { .. })
        ));
        state.advance_to_stage(Stage::Built).unwrap();
        assert_eq!(state.cache_entry::<Vec<f64>>(entry).unwrap(), &vec![1.0]);
    }

    #[test]
    fn test_writes_demote_stage() {
        let mut state = State::new();
        state.advance_to_stage(Stage::Built).unwrap();
        state.allocate_q(&[0.0]).unwrap();
        state.allocate_u(&[0.0]).unwrap();
        for stage in &Stage::ALL[2..] {
            state.advance_to_stage(*stage).unwrap();
        }
        state.upd_u()[0] = 1.0;
        assert_eq!(state.stage(), Stage::Configured);
        state.upd_q()[0] = 1.0;
        assert_eq!(state.stage(), Stage::Modeled);
        state.upd_u()[0] = 2.0;
        assert_eq!(state.stage(), Stage::Modeled);
    }

    #[test]
    fn test_managed_state_only_advances_through_solver() {
        struct Owner;
        let mut state = State::new();
        state.advance_to_stage(Stage::Built).unwrap();
        state.insert_extension(Owner);
        assert!(matches!(
            state.advance_to_stage(Stage::Modeled),
            Err(SimError::Ordering(_))
        ));
        assert_eq!(state.stage(), Stage::Built);
        state.advance_realized(Stage::Modeled).unwrap();
        // Lower targets stay a no-op.
        state.advance_to_stage(Stage::Built).unwrap();
        assert_eq!(state.stage(), Stage::Modeled);
    }
}
