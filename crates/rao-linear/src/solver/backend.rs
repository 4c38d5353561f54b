//! Interchangeable MILP backends behind `good_lp`.
//!
//! | Backend | Feature | Integers | Options |
//! |---------|---------|----------|---------|
//! | `microlp` | `solver-microlp` (default) | yes | none |
//! | `clarabel` | `solver-clarabel` (default) | no | none |
//! | `highs` | `solver-highs` | yes | MIP gap, time limit, tuning string |

use std::str::FromStr;

use good_lp::solvers::ResolutionError;
use good_lp::{Constraint, Expression, ProblemVariables, Solution, SolverModel, Variable};
use tracing::{debug, warn};

use crate::error::LinearProblemError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverBackend {
    #[cfg(feature = "solver-microlp")]
    Microlp,
    #[cfg(feature = "solver-clarabel")]
    Clarabel,
    #[cfg(feature = "solver-highs")]
    Highs,
}

const AVAILABLE_BACKENDS: &[&str] = &[
    #[cfg(feature = "solver-microlp")]
    "microlp",
    #[cfg(feature = "solver-clarabel")]
    "clarabel",
    #[cfg(feature = "solver-highs")]
    "highs",
];

impl SolverBackend {
    pub fn available() -> &'static [&'static str] {
        AVAILABLE_BACKENDS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            #[cfg(feature = "solver-microlp")]
            SolverBackend::Microlp => "microlp",
            #[cfg(feature = "solver-clarabel")]
            SolverBackend::Clarabel => "clarabel",
            #[cfg(feature = "solver-highs")]
            SolverBackend::Highs => "highs",
        }
    }

    /// Whether the backend handles integer and binary variables.
    pub fn supports_integers(&self) -> bool {
        match self {
            #[cfg(feature = "solver-microlp")]
            SolverBackend::Microlp => true,
            #[cfg(feature = "solver-clarabel")]
            SolverBackend::Clarabel => false,
            #[cfg(feature = "solver-highs")]
            SolverBackend::Highs => true,
        }
    }

    /// Whether the backend stops on the configured time limit.
    pub fn honours_time_limit(&self) -> bool {
        match self {
            #[cfg(feature = "solver-highs")]
            SolverBackend::Highs => true,
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }
}

fn unknown_backend_error(name: &str) -> LinearProblemError {
    LinearProblemError::UnknownSolver {
        name: name.to_string(),
        available: SolverBackend::available().join(", "),
    }
}

impl FromStr for SolverBackend {
    type Err = LinearProblemError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "microlp" => {
                #[cfg(feature = "solver-microlp")]
                {
                    Ok(SolverBackend::Microlp)
                }
                #[cfg(not(feature = "solver-microlp"))]
                {
                    Err(unknown_backend_error(&normalized))
                }
            }
            "clarabel" => {
                #[cfg(feature = "solver-clarabel")]
                {
                    Ok(SolverBackend::Clarabel)
                }
                #[cfg(not(feature = "solver-clarabel"))]
                {
                    Err(unknown_backend_error(&normalized))
                }
            }
            "highs" => {
                #[cfg(feature = "solver-highs")]
                {
                    Ok(SolverBackend::Highs)
                }
                #[cfg(not(feature = "solver-highs"))]
                {
                    Err(unknown_backend_error(&normalized))
                }
            }
            other => Err(unknown_backend_error(other)),
        }
    }
}

impl std::fmt::Display for SolverBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options applied to one solve.
#[derive(Debug, Clone, Default)]
pub(crate) struct SolveOptions<'a> {
    pub relative_mip_gap: f64,
    pub tuning: &'a str,
    pub max_time_seconds: Option<f64>,
}

/// Split a tuning string into `(key, value)` pairs. Tokens without `=` are
/// skipped with a warning.
pub(crate) fn parse_tuning(tuning: &str) -> Vec<(&str, &str)> {
    tuning
        .split_whitespace()
        .filter_map(|token| match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => Some((key, value)),
            _ => {
                warn!("Ignoring malformed solver tuning option '{}'", token);
                None
            }
        })
        .collect()
}

/// A model translated for `good_lp`, ready to hand to a backend.
pub(crate) struct BackendModel {
    pub variables: ProblemVariables,
    pub handles: Vec<Variable>,
    pub objective: Expression,
    pub maximise: bool,
    pub constraints: Vec<Constraint>,
}

/// Run `model` on `backend` and return the value of every variable, in
/// handle order.
pub(crate) fn run(
    backend: SolverBackend,
    model: BackendModel,
    options: &SolveOptions<'_>,
) -> Result<Vec<f64>, ResolutionError> {
    let BackendModel {
        variables,
        handles,
        objective,
        maximise,
        constraints,
    } = model;
    let unsolved = if maximise {
        variables.maximise(objective)
    } else {
        variables.minimise(objective)
    };

    match backend {
        #[cfg(feature = "solver-microlp")]
        SolverBackend::Microlp => {
            ignore_options(backend, options);
            solve_with(unsolved.using(good_lp::solvers::microlp::microlp), constraints, &handles)
        }
        #[cfg(feature = "solver-clarabel")]
        SolverBackend::Clarabel => {
            ignore_options(backend, options);
            solve_with(unsolved.using(good_lp::solvers::clarabel::clarabel), constraints, &handles)
        }
        #[cfg(feature = "solver-highs")]
        SolverBackend::Highs => {
            let mut problem = unsolved
                .using(good_lp::solvers::highs::highs)
                .set_option("mip_rel_gap", options.relative_mip_gap);
            if let Some(limit) = options.max_time_seconds {
                problem = problem.set_option("time_limit", limit);
            }
            for (key, value) in parse_tuning(options.tuning) {
                debug!("HiGHS option {} = {}", key, value);
                problem = if let Ok(flag) = value.parse::<bool>() {
                    problem.set_option(key, flag)
                } else if let Ok(int) = value.parse::<i32>() {
                    problem.set_option(key, int)
                } else if let Ok(float) = value.parse::<f64>() {
                    problem.set_option(key, float)
                } else {
                    problem.set_option(key, value)
                };
            }
            solve_with(problem, constraints, &handles)
        }
    }
}

fn solve_with<M>(
    mut problem: M,
    constraints: Vec<Constraint>,
    handles: &[Variable],
) -> Result<Vec<f64>, ResolutionError>
where
    M: SolverModel<Error = ResolutionError>,
{
    for constraint in constraints {
        problem.add_constraint(constraint);
    }
    let solution = problem.solve()?;
    Ok(handles.iter().map(|v| solution.value(*v)).collect())
}

#[cfg(any(feature = "solver-microlp", feature = "solver-clarabel"))]
fn ignore_options(backend: SolverBackend, options: &SolveOptions<'_>) {
    for (key, value) in parse_tuning(options.tuning) {
        debug!("Backend {} takes no options, ignoring {}={}", backend, key, value);
    }
    if options.relative_mip_gap > 0.0 {
        debug!(
            "Backend {} uses its own gap, ignoring {}",
            backend, options.relative_mip_gap
        );
    }
    if options.max_time_seconds.is_some() {
        warn!("Backend {} does not honour time limits", backend);
    }
}
