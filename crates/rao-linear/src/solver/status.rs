//! Solve statuses.

use good_lp::solvers::ResolutionError;
use serde::{Deserialize, Serialize};

/// Outcome of a solve, whatever the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinearProblemStatus {
    /// Proven optimal within the MIP gap.
    Optimal,
    /// A solution was found but the time limit stopped the search.
    Feasible,
    Infeasible,
    Unbounded,
    /// The backend failed for another reason.
    Abnormal,
    /// No solve was attempted, or the backend refused the model.
    #[default]
    NotSolved,
}

impl LinearProblemStatus {
    /// Whether solved values can be read.
    pub fn has_solution(&self) -> bool {
        matches!(self, LinearProblemStatus::Optimal | LinearProblemStatus::Feasible)
    }

    /// Status of a successful backend run.
    pub(crate) fn solved(hit_time_limit: bool) -> Self {
        if hit_time_limit {
            LinearProblemStatus::Feasible
        } else {
            LinearProblemStatus::Optimal
        }
    }
}

impl From<&ResolutionError> for LinearProblemStatus {
    fn from(err: &ResolutionError) -> Self {
        match err {
            ResolutionError::Unbounded => LinearProblemStatus::Unbounded,
            ResolutionError::Infeasible => LinearProblemStatus::Infeasible,
            ResolutionError::Other(_) | ResolutionError::Str(_) => LinearProblemStatus::Abnormal,
        }
    }
}

impl std::fmt::Display for LinearProblemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinearProblemStatus::Optimal => write!(f, "OPTIMAL"),
            LinearProblemStatus::Feasible => write!(f, "FEASIBLE"),
            LinearProblemStatus::Infeasible => write!(f, "INFEASIBLE"),
            LinearProblemStatus::Unbounded => write!(f, "UNBOUNDED"),
            LinearProblemStatus::Abnormal => write!(f, "ABNORMAL"),
            LinearProblemStatus::NotSolved => write!(f, "NOT_SOLVED"),
        }
    }
}
