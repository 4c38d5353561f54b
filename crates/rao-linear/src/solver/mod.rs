//! Solver adapter: a backend-independent MILP model with deterministic
//! rounding, generational handles and a closed status vocabulary.

mod backend;
mod model;
mod rounding;
mod status;

pub use backend::SolverBackend;
pub use model::{ConstraintId, MilpSolver, ObjectiveSense, VariableId, VariableKind};
pub use rounding::{round_to_precision, DEFAULT_ROUNDING_BITS};
pub use status::LinearProblemStatus;
