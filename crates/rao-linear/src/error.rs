//! Errors of the linear problem.
//!
//! Configuration and contract violations are errors; numerical outcomes of
//! a solve are not, they come back as a [`LinearProblemStatus`].
//!
//! [`LinearProblemStatus`]: crate::solver::LinearProblemStatus

use rao_core::RaoError;
use thiserror::Error;

use crate::linear_problem::Family;

#[derive(Error, Debug)]
pub enum LinearProblemError {
    /// Backend name not recognised or not compiled in
    #[error("Unknown solver backend '{name}' (available: {available})")]
    UnknownSolver { name: String, available: String },

    /// Parameter combination the problem cannot be built with
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Variable {0} has not been created yet")]
    VariableNotFound(String),

    #[error("Constraint {0} has not been created yet")]
    ConstraintNotFound(String),

    #[error("Variable {0} already exists")]
    DuplicateVariable(String),

    #[error("Constraint {0} already exists")]
    DuplicateConstraint(String),

    /// Handle created before the last reset of the model
    #[error("Stale {kind} handle (generation {handle_generation}, model generation {model_generation})")]
    StaleHandle {
        kind: &'static str,
        handle_generation: u32,
        model_generation: u32,
    },

    /// Solved values requested while no solution is available
    #[error("No solution available (status {0})")]
    NoSolution(crate::solver::LinearProblemStatus),

    /// Lifecycle operation called before `fill`
    #[error("Cannot {operation}: the linear problem has not been filled")]
    NotFilled { operation: &'static str },

    #[error("Filler dependency cycle between: {}", .fillers.join(", "))]
    DependencyCycle { fillers: Vec<String> },

    #[error("Filler {filler} consumes {family:?} but no filler produces it")]
    MissingProducer { filler: String, family: Family },

    /// Input data inconsistent with the perimeter or parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Core(#[from] RaoError),
}

pub type LinearProblemResult<T> = Result<T, LinearProblemError>;

impl From<LinearProblemError> for RaoError {
    fn from(err: LinearProblemError) -> Self {
        match err {
            LinearProblemError::Core(inner) => inner,
            LinearProblemError::UnknownSolver { .. }
            | LinearProblemError::Config(_)
            | LinearProblemError::DependencyCycle { .. }
            | LinearProblemError::MissingProducer { .. } => RaoError::Config(err.to_string()),
            LinearProblemError::InvalidInput(_) => RaoError::Validation(err.to_string()),
            other => RaoError::Solver(other.to_string()),
        }
    }
}
