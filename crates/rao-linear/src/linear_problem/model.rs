//! Keyed view of the solver model handed to fillers.

use std::collections::HashMap;

use crate::error::{LinearProblemError, LinearProblemResult};
use crate::solver::{ConstraintId, MilpSolver, VariableId};

use super::keys::{ConstraintKey, Family, VariableKey};

/// [`MilpSolver`] plus the key → handle maps of the current generation.
#[derive(Debug, Clone)]
pub struct LinearModel {
    solver: MilpSolver,
    variables: HashMap<VariableKey, VariableId>,
    constraints: HashMap<ConstraintKey, ConstraintId>,
}

impl LinearModel {
    pub fn new(solver: MilpSolver) -> Self {
        Self {
            solver,
            variables: HashMap::new(),
            constraints: HashMap::new(),
        }
    }

    pub fn solver(&self) -> &MilpSolver {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut MilpSolver {
        &mut self.solver
    }

    /// Drop all variables and constraints; previous handles become stale.
    pub fn reset(&mut self) {
        self.solver.reset();
        self.variables.clear();
        self.constraints.clear();
    }

    // --- creation ---

    pub fn add_continuous_variable(&mut self, key: VariableKey, lb: f64, ub: f64) -> LinearProblemResult<VariableId> {
        let id = self.solver.make_continuous_variable(lb, ub, &key.name())?;
        self.variables.insert(key, id);
        Ok(id)
    }

    pub fn add_integer_variable(&mut self, key: VariableKey, lb: f64, ub: f64) -> LinearProblemResult<VariableId> {
        let id = self.solver.make_integer_variable(lb, ub, &key.name())?;
        self.variables.insert(key, id);
        Ok(id)
    }

    pub fn add_binary_variable(&mut self, key: VariableKey) -> LinearProblemResult<VariableId> {
        let id = self.solver.make_binary_variable(&key.name())?;
        self.variables.insert(key, id);
        Ok(id)
    }

    pub fn add_constraint(&mut self, key: ConstraintKey, lb: f64, ub: f64) -> LinearProblemResult<ConstraintId> {
        let id = self.solver.make_constraint(lb, ub, &key.name())?;
        self.constraints.insert(key, id);
        Ok(id)
    }

    // --- lookup ---

    pub fn variable(&self, key: &VariableKey) -> LinearProblemResult<VariableId> {
        self.find_variable(key)
            .ok_or_else(|| LinearProblemError::VariableNotFound(key.name()))
    }

    pub fn find_variable(&self, key: &VariableKey) -> Option<VariableId> {
        self.variables.get(key).copied()
    }

    pub fn constraint(&self, key: &ConstraintKey) -> LinearProblemResult<ConstraintId> {
        self.find_constraint(key)
            .ok_or_else(|| LinearProblemError::ConstraintNotFound(key.name()))
    }

    pub fn find_constraint(&self, key: &ConstraintKey) -> Option<ConstraintId> {
        self.constraints.get(key).copied()
    }

    /// Variables of `family` with their handles.
    pub fn variables_of(&self, family: Family) -> impl Iterator<Item = (&VariableKey, VariableId)> {
        self.variables
            .iter()
            .filter(move |(key, _)| key.family() == family)
            .map(|(key, id)| (key, *id))
    }

    pub fn num_variables(&self) -> usize {
        self.solver.num_variables()
    }

    pub fn num_constraints(&self) -> usize {
        self.solver.num_constraints()
    }

    // --- coefficients and bounds ---

    pub fn set_coefficient(&mut self, constraint: ConstraintId, variable: VariableId, coefficient: f64) -> LinearProblemResult<()> {
        self.solver.set_coefficient(constraint, variable, coefficient)
    }

    pub fn coefficient(&self, constraint: ConstraintId, variable: VariableId) -> LinearProblemResult<f64> {
        self.solver.coefficient(constraint, variable)
    }

    pub fn set_objective_coefficient(&mut self, variable: VariableId, coefficient: f64) -> LinearProblemResult<()> {
        self.solver.set_objective_coefficient(variable, coefficient)
    }

    pub fn objective_coefficient(&self, variable: VariableId) -> LinearProblemResult<f64> {
        self.solver.objective_coefficient(variable)
    }

    pub fn set_variable_bounds(&mut self, variable: VariableId, lb: f64, ub: f64) -> LinearProblemResult<()> {
        self.solver.set_variable_bounds(variable, lb, ub)
    }

    pub fn variable_lb(&self, variable: VariableId) -> LinearProblemResult<f64> {
        self.solver.variable_lb(variable)
    }

    pub fn variable_ub(&self, variable: VariableId) -> LinearProblemResult<f64> {
        self.solver.variable_ub(variable)
    }

    pub fn set_constraint_bounds(&mut self, constraint: ConstraintId, lb: f64, ub: f64) -> LinearProblemResult<()> {
        self.solver.set_constraint_bounds(constraint, lb, ub)
    }

    pub fn set_constraint_lb(&mut self, constraint: ConstraintId, lb: f64) -> LinearProblemResult<()> {
        self.solver.set_constraint_lb(constraint, lb)
    }

    pub fn set_constraint_ub(&mut self, constraint: ConstraintId, ub: f64) -> LinearProblemResult<()> {
        self.solver.set_constraint_ub(constraint, ub)
    }

    pub fn constraint_lb(&self, constraint: ConstraintId) -> LinearProblemResult<f64> {
        self.solver.constraint_lb(constraint)
    }

    pub fn constraint_ub(&self, constraint: ConstraintId) -> LinearProblemResult<f64> {
        self.solver.constraint_ub(constraint)
    }

    /// Solved value of `variable`.
    pub fn value(&self, variable: VariableId) -> LinearProblemResult<f64> {
        self.solver.value(variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{SolverBackend, DEFAULT_ROUNDING_BITS};
    use rao_core::{Instant, State};

    fn model() -> LinearModel {
        let backend = SolverBackend::available()[0]
            .parse::<SolverBackend>()
            .unwrap();
        LinearModel::new(MilpSolver::new(backend, DEFAULT_ROUNDING_BITS))
    }

    #[test]
    fn test_lookup_by_key() {
        let mut model = model();
        let key = VariableKey::MinimumMargin { timestamp: None };
        let id = model
            .add_continuous_variable(key.clone(), f64::NEG_INFINITY, f64::INFINITY)
            .unwrap();
        assert_eq!(model.variable(&key).unwrap(), id);
        assert_eq!(model.solver().variable("minmargin_variable").unwrap(), id);
    }

    #[test]
    fn test_missing_key_reports_name() {
        let model = model();
        let state = State::preventive(Instant::preventive());
        let err = model
            .constraint(&ConstraintKey::MaxRa { state })
            .unwrap_err();
        assert!(matches!(
            err,
            LinearProblemError::ConstraintNotFound(ref name) if name == "preventive_maxra_constraint"
        ));
    }

    #[test]
    fn test_reset_forgets_keys() {
        let mut model = model();
        let key = VariableKey::MinimumMargin { timestamp: None };
        let id = model.add_continuous_variable(key.clone(), 0.0, 1.0).unwrap();
        model.reset();
        assert!(model.find_variable(&key).is_none());
        assert!(matches!(
            model.variable_lb(id),
            Err(LinearProblemError::StaleHandle { .. })
        ));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut model = model();
        let key = VariableKey::MinimumMargin { timestamp: None };
        model.add_continuous_variable(key.clone(), 0.0, 1.0).unwrap();
        assert!(matches!(
            model.add_binary_variable(key),
            Err(LinearProblemError::DuplicateVariable(_))
        ));
    }
}
