//! Backend-independent MILP model.
//!
//! Variables and constraints live in arenas addressed by generational
//! handles. Names are kept for lookups and diagnostics; they are unique per
//! generation. [`MilpSolver::reset`] drops everything and bumps the
//! generation, so a handle obtained before a reset is rejected afterwards
//! instead of silently pointing at a new variable.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::time::Instant;

use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};
use tracing::{debug, info, warn};

use super::backend::{self, BackendModel, SolveOptions, SolverBackend};
use super::rounding::round_to_precision;
use super::status::LinearProblemStatus;
use crate::error::{LinearProblemError, LinearProblemResult};

/// Handle of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId {
    index: u32,
    generation: u32,
}

/// Handle of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId {
    index: u32,
    generation: u32,
}

impl VariableId {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl ConstraintId {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Continuous,
    Integer,
    Binary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ObjectiveSense {
    #[default]
    Minimize,
    Maximize,
}

#[derive(Debug, Clone)]
struct VariableData {
    name: String,
    kind: VariableKind,
    lb: f64,
    ub: f64,
    value: Option<f64>,
}

#[derive(Debug, Clone)]
struct ConstraintData {
    name: String,
    lb: f64,
    ub: f64,
    coefficients: BTreeMap<u32, f64>,
}

/// MILP model with deterministic rounding, solved by a [`SolverBackend`].
#[derive(Debug, Clone)]
pub struct MilpSolver {
    backend: SolverBackend,
    rounding_bits: u32,
    max_time_seconds: Option<f64>,
    generation: u32,
    variables: Vec<VariableData>,
    constraints: Vec<ConstraintData>,
    variable_index: HashMap<String, VariableId>,
    constraint_index: HashMap<String, ConstraintId>,
    objective: BTreeMap<u32, f64>,
    sense: ObjectiveSense,
    status: LinearProblemStatus,
    objective_value: Option<f64>,
}

impl MilpSolver {
    pub fn new(backend: SolverBackend, rounding_bits: u32) -> Self {
        Self {
            backend,
            rounding_bits,
            max_time_seconds: None,
            generation: 0,
            variables: Vec::new(),
            constraints: Vec::new(),
            variable_index: HashMap::new(),
            constraint_index: HashMap::new(),
            objective: BTreeMap::new(),
            sense: ObjectiveSense::Minimize,
            status: LinearProblemStatus::NotSolved,
            objective_value: None,
        }
    }

    pub fn with_time_limit(mut self, max_time_seconds: Option<f64>) -> Self {
        self.max_time_seconds = max_time_seconds;
        self
    }

    pub fn backend(&self) -> SolverBackend {
        self.backend
    }

    pub fn rounding_bits(&self) -> u32 {
        self.rounding_bits
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    fn round(&self, value: f64) -> f64 {
        round_to_precision(value, self.rounding_bits)
    }

    // --- variables ---

    pub fn make_continuous_variable(
        &mut self,
        lb: f64,
        ub: f64,
        name: &str,
    ) -> LinearProblemResult<VariableId> {
        self.make_variable(VariableKind::Continuous, lb, ub, name)
    }

    pub fn make_integer_variable(
        &mut self,
        lb: f64,
        ub: f64,
        name: &str,
    ) -> LinearProblemResult<VariableId> {
        self.make_variable(VariableKind::Integer, lb, ub, name)
    }

    pub fn make_binary_variable(&mut self, name: &str) -> LinearProblemResult<VariableId> {
        self.make_variable(VariableKind::Binary, 0.0, 1.0, name)
    }

    fn make_variable(
        &mut self,
        kind: VariableKind,
        lb: f64,
        ub: f64,
        name: &str,
    ) -> LinearProblemResult<VariableId> {
        if self.variable_index.contains_key(name) {
            return Err(LinearProblemError::DuplicateVariable(name.to_string()));
        }
        check_number(lb, name)?;
        check_number(ub, name)?;
        let id = VariableId {
            index: self.variables.len() as u32,
            generation: self.generation,
        };
        self.variables.push(VariableData {
            name: name.to_string(),
            kind,
            lb: self.round(lb),
            ub: self.round(ub),
            value: None,
        });
        self.variable_index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Variable created under `name` in the current generation.
    pub fn variable(&self, name: &str) -> LinearProblemResult<VariableId> {
        self.variable_index
            .get(name)
            .copied()
            .ok_or_else(|| LinearProblemError::VariableNotFound(name.to_string()))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variable_index.contains_key(name)
    }

    fn variable_data(&self, id: VariableId) -> LinearProblemResult<&VariableData> {
        self.check_generation("variable", id.generation)?;
        self.variables
            .get(id.index())
            .ok_or(LinearProblemError::StaleHandle {
                kind: "variable",
                handle_generation: id.generation,
                model_generation: self.generation,
            })
    }

    fn variable_data_mut(&mut self, id: VariableId) -> LinearProblemResult<&mut VariableData> {
        self.variable_data(id)?;
        Ok(&mut self.variables[id.index()])
    }

    pub fn variable_name(&self, id: VariableId) -> LinearProblemResult<&str> {
        Ok(&self.variable_data(id)?.name)
    }

    pub fn variable_kind(&self, id: VariableId) -> LinearProblemResult<VariableKind> {
        Ok(self.variable_data(id)?.kind)
    }

    pub fn variable_lb(&self, id: VariableId) -> LinearProblemResult<f64> {
        Ok(self.variable_data(id)?.lb)
    }

    pub fn variable_ub(&self, id: VariableId) -> LinearProblemResult<f64> {
        Ok(self.variable_data(id)?.ub)
    }

    pub fn set_variable_bounds(&mut self, id: VariableId, lb: f64, ub: f64) -> LinearProblemResult<()> {
        let (lb, ub) = (self.round(lb), self.round(ub));
        let data = self.variable_data_mut(id)?;
        check_number(lb, &data.name)?;
        check_number(ub, &data.name)?;
        data.lb = lb;
        data.ub = ub;
        Ok(())
    }

    /// Solved value of `id`.
    pub fn value(&self, id: VariableId) -> LinearProblemResult<f64> {
        self.variable_data(id)?
            .value
            .ok_or(LinearProblemError::NoSolution(self.status))
    }

    // --- constraints ---

    pub fn make_constraint(
        &mut self,
        lb: f64,
        ub: f64,
        name: &str,
    ) -> LinearProblemResult<ConstraintId> {
        if self.constraint_index.contains_key(name) {
            return Err(LinearProblemError::DuplicateConstraint(name.to_string()));
        }
        check_number(lb, name)?;
        check_number(ub, name)?;
        let id = ConstraintId {
            index: self.constraints.len() as u32,
            generation: self.generation,
        };
        self.constraints.push(ConstraintData {
            name: name.to_string(),
            lb: self.round(lb),
            ub: self.round(ub),
            coefficients: BTreeMap::new(),
        });
        self.constraint_index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Constraint without bounds yet; callers set them once the
    /// coefficients are known.
    pub fn make_free_constraint(&mut self, name: &str) -> LinearProblemResult<ConstraintId> {
        self.make_constraint(f64::NEG_INFINITY, f64::INFINITY, name)
    }

    pub fn constraint(&self, name: &str) -> LinearProblemResult<ConstraintId> {
        self.constraint_index
            .get(name)
            .copied()
            .ok_or_else(|| LinearProblemError::ConstraintNotFound(name.to_string()))
    }

    pub fn has_constraint(&self, name: &str) -> bool {
        self.constraint_index.contains_key(name)
    }

    fn constraint_data(&self, id: ConstraintId) -> LinearProblemResult<&ConstraintData> {
        self.check_generation("constraint", id.generation)?;
        self.constraints
            .get(id.index())
            .ok_or(LinearProblemError::StaleHandle {
                kind: "constraint",
                handle_generation: id.generation,
                model_generation: self.generation,
            })
    }

    fn constraint_data_mut(&mut self, id: ConstraintId) -> LinearProblemResult<&mut ConstraintData> {
        self.constraint_data(id)?;
        Ok(&mut self.constraints[id.index()])
    }

    pub fn constraint_name(&self, id: ConstraintId) -> LinearProblemResult<&str> {
        Ok(&self.constraint_data(id)?.name)
    }

    pub fn constraint_lb(&self, id: ConstraintId) -> LinearProblemResult<f64> {
        Ok(self.constraint_data(id)?.lb)
    }

    pub fn constraint_ub(&self, id: ConstraintId) -> LinearProblemResult<f64> {
        Ok(self.constraint_data(id)?.ub)
    }

    pub fn set_constraint_bounds(&mut self, id: ConstraintId, lb: f64, ub: f64) -> LinearProblemResult<()> {
        let (lb, ub) = (self.round(lb), self.round(ub));
        let data = self.constraint_data_mut(id)?;
        check_number(lb, &data.name)?;
        check_number(ub, &data.name)?;
        data.lb = lb;
        data.ub = ub;
        Ok(())
    }

    pub fn set_constraint_lb(&mut self, id: ConstraintId, lb: f64) -> LinearProblemResult<()> {
        let ub = self.constraint_ub(id)?;
        self.set_constraint_bounds(id, lb, ub)
    }

    pub fn set_constraint_ub(&mut self, id: ConstraintId, ub: f64) -> LinearProblemResult<()> {
        let lb = self.constraint_lb(id)?;
        self.set_constraint_bounds(id, lb, ub)
    }

    /// Set the coefficient of `variable` in `constraint`; zero removes it.
    pub fn set_coefficient(
        &mut self,
        constraint: ConstraintId,
        variable: VariableId,
        coefficient: f64,
    ) -> LinearProblemResult<()> {
        self.variable_data(variable)?;
        let coefficient = self.round(coefficient);
        let data = self.constraint_data_mut(constraint)?;
        if !coefficient.is_finite() {
            return Err(LinearProblemError::InvalidInput(format!(
                "coefficient {} in constraint {}",
                coefficient, data.name
            )));
        }
        if coefficient == 0.0 {
            data.coefficients.remove(&variable.index);
        } else {
            data.coefficients.insert(variable.index, coefficient);
        }
        Ok(())
    }

    pub fn coefficient(&self, constraint: ConstraintId, variable: VariableId) -> LinearProblemResult<f64> {
        self.variable_data(variable)?;
        Ok(self
            .constraint_data(constraint)?
            .coefficients
            .get(&variable.index)
            .copied()
            .unwrap_or(0.0))
    }

    // --- objective ---

    pub fn set_objective_coefficient(&mut self, variable: VariableId, coefficient: f64) -> LinearProblemResult<()> {
        let name = &self.variable_data(variable)?.name;
        if !coefficient.is_finite() {
            return Err(LinearProblemError::InvalidInput(format!(
                "objective coefficient {coefficient} on {name}"
            )));
        }
        let coefficient = self.round(coefficient);
        if coefficient == 0.0 {
            self.objective.remove(&variable.index);
        } else {
            self.objective.insert(variable.index, coefficient);
        }
        Ok(())
    }

    pub fn objective_coefficient(&self, variable: VariableId) -> LinearProblemResult<f64> {
        self.variable_data(variable)?;
        Ok(self.objective.get(&variable.index).copied().unwrap_or(0.0))
    }

    pub fn set_sense(&mut self, sense: ObjectiveSense) {
        self.sense = sense;
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    // --- model ---

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn has_integer_variables(&self) -> bool {
        self.variables
            .iter()
            .any(|v| v.kind != VariableKind::Continuous)
    }

    /// Variables with a non-zero objective coefficient.
    pub fn objective_terms(&self) -> impl Iterator<Item = (VariableId, f64)> + '_ {
        let generation = self.generation;
        self.objective.iter().map(move |(&index, &coefficient)| {
            (VariableId { index, generation }, coefficient)
        })
    }

    /// Drop every variable, constraint and objective term. Handles from
    /// before the reset become stale.
    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.variables.clear();
        self.constraints.clear();
        self.variable_index.clear();
        self.constraint_index.clear();
        self.objective.clear();
        self.status = LinearProblemStatus::NotSolved;
        self.objective_value = None;
    }

    pub fn status(&self) -> LinearProblemStatus {
        self.status
    }

    pub fn objective_value(&self) -> Option<f64> {
        self.objective_value
    }

    fn check_generation(&self, kind: &'static str, generation: u32) -> LinearProblemResult<()> {
        if generation == self.generation {
            Ok(())
        } else {
            Err(LinearProblemError::StaleHandle {
                kind,
                handle_generation: generation,
                model_generation: self.generation,
            })
        }
    }

    /// Solve the model. Numerical outcomes are reported through the
    /// returned status, never as errors.
    pub fn solve(&mut self, relative_mip_gap: f64, tuning: &str) -> LinearProblemResult<LinearProblemStatus> {
        for variable in &mut self.variables {
            variable.value = None;
        }
        self.objective_value = None;

        if self.has_integer_variables() && !self.backend.supports_integers() {
            warn!(
                "Backend {} cannot solve a model with integer variables",
                self.backend
            );
            self.status = LinearProblemStatus::NotSolved;
            return Ok(self.status);
        }

        let start = Instant::now();
        let options = SolveOptions {
            relative_mip_gap,
            tuning,
            max_time_seconds: self.max_time_seconds,
        };
        let outcome = backend::run(self.backend, self.to_backend_model(), &options);
        let elapsed = start.elapsed();

        self.status = match outcome {
            Ok(values) => {
                for (variable, value) in self.variables.iter_mut().zip(values) {
                    variable.value = Some(value);
                }
                self.objective_value = Some(self.evaluate_objective());
                let hit_time_limit = self.backend.honours_time_limit()
                    && self
                        .max_time_seconds
                        .is_some_and(|limit| elapsed.as_secs_f64() >= limit);
                LinearProblemStatus::solved(hit_time_limit)
            }
            Err(err) => {
                debug!("Backend {} returned: {}", self.backend, err);
                LinearProblemStatus::from(&err)
            }
        };

        info!(
            "Solved with {}: status={}, {} variables, {} constraints, {:.1} ms",
            self.backend,
            self.status,
            self.variables.len(),
            self.constraints.len(),
            elapsed.as_secs_f64() * 1e3
        );
        Ok(self.status)
    }

    fn evaluate_objective(&self) -> f64 {
        self.objective
            .iter()
            .map(|(&index, &coefficient)| {
                coefficient * self.variables[index as usize].value.unwrap_or(0.0)
            })
            .sum()
    }

    fn to_backend_model(&self) -> BackendModel {
        let mut variables = ProblemVariables::new();
        let handles: Vec<Variable> = self
            .variables
            .iter()
            .map(|data| {
                let mut definition = variable();
                match data.kind {
                    VariableKind::Continuous => {}
                    VariableKind::Integer => definition = definition.integer(),
                    VariableKind::Binary => definition = definition.binary(),
                }
                if data.lb.is_finite() {
                    definition = definition.min(data.lb);
                }
                if data.ub.is_finite() {
                    definition = definition.max(data.ub);
                }
                variables.add(definition)
            })
            .collect();

        let mut objective = Expression::from(0.0);
        for (&index, &coefficient) in &self.objective {
            objective += coefficient * handles[index as usize];
        }

        let mut constraints: Vec<Constraint> = Vec::with_capacity(self.constraints.len());
        for data in &self.constraints {
            if data.lb == f64::NEG_INFINITY && data.ub == f64::INFINITY {
                continue;
            }
            let mut expression = Expression::from(0.0);
            for (&index, &coefficient) in &data.coefficients {
                expression += coefficient * handles[index as usize];
            }
            if data.lb == data.ub {
                constraints.push(constraint!(expression == data.lb));
                continue;
            }
            if data.lb.is_finite() {
                constraints.push(constraint!(expression.clone() >= data.lb));
            }
            if data.ub.is_finite() {
                constraints.push(constraint!(expression <= data.ub));
            }
        }

        BackendModel {
            variables,
            handles,
            objective,
            maximise: self.sense == ObjectiveSense::Maximize,
            constraints,
        }
    }

    /// Human-readable dump of the model in an LP-like format, names
    /// included. Meant for debugging, not for backends.
    pub fn to_lp_string(&self) -> String {
        let mut out = String::new();
        let sense = match self.sense {
            ObjectiveSense::Minimize => "minimize",
            ObjectiveSense::Maximize => "maximize",
        };
        let _ = writeln!(out, "{sense}");
        let _ = writeln!(out, "  obj: {}", self.format_terms(&self.objective));
        let _ = writeln!(out, "subject to");
        for data in &self.constraints {
            let _ = writeln!(
                out,
                "  {}: {} <= {} <= {}",
                data.name,
                data.lb,
                self.format_terms(&data.coefficients),
                data.ub
            );
        }
        let _ = writeln!(out, "bounds");
        for data in &self.variables {
            let kind = match data.kind {
                VariableKind::Continuous => "",
                VariableKind::Integer => " integer",
                VariableKind::Binary => " binary",
            };
            let _ = writeln!(out, "  {} <= {} <= {}{}", data.lb, data.name, data.ub, kind);
        }
        out
    }

    fn format_terms(&self, terms: &BTreeMap<u32, f64>) -> String {
        if terms.is_empty() {
            return "0".to_string();
        }
        terms
            .iter()
            .map(|(&index, coefficient)| format!("{} {}", coefficient, self.variables[index as usize].name))
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

fn check_number(value: f64, name: &str) -> LinearProblemResult<()> {
    if value.is_nan() {
        Err(LinearProblemError::InvalidInput(format!("NaN bound on {name}")))
    } else {
        Ok(())
    }
}
