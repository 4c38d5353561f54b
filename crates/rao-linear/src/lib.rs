//! # rao-linear: iterative MILP engine for remedial-action optimization
//!
//! Builds, refreshes and solves the mixed-integer linear problem that picks
//! range-action setpoints (PST taps, HVDC and injection setpoints) to
//! maximise the flow margin of monitored network elements.
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`solver`] | Backend-independent MILP model with rounding and generational handles |
//! | [`ids`] | Deterministic names of variables and constraints |
//! | [`linear_problem`] | Typed keys, the keyed model, the builder and the lifecycle |
//! | [`fillers`] | Units that write one concern of the problem into the model |
//! | [`iterating`] | Sensitivity / MILP iterations around an external flow engine |
//!
//! ## Solver backends
//!
//! | Feature | Backend | Integers |
//! |---------|---------|----------|
//! | `solver-microlp` (default) | microlp, pure Rust | yes |
//! | `solver-clarabel` (default) | Clarabel interior point, pure Rust | no |
//! | `solver-highs` | HiGHS, native | yes |
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rao_core::{FlowTable, LinearOptimizerParameters, SensitivityTable};
//! use rao_linear::LinearProblem;
//!
//! let mut problem = LinearProblem::builder(LinearOptimizerParameters::default())
//!     .with_perimeter(perimeter)
//!     .build()?;
//! problem.fill(&flows, &sensitivities)?;
//! let status = problem.solve()?;
//! println!("{status}: margin {:?}", problem.objective_value().map(|v| -v));
//! ```

#[cfg(not(any(feature = "solver-microlp", feature = "solver-clarabel", feature = "solver-highs")))]
compile_error!("rao-linear needs at least one solver backend feature (solver-microlp, solver-clarabel or solver-highs)");

pub mod error;
pub mod fillers;
pub mod ids;
pub mod iterating;
pub mod linear_problem;
pub mod solver;

pub use error::{LinearProblemError, LinearProblemResult};
pub use fillers::{FillInput, ProblemFiller};
pub use iterating::{
    IteratingLinearOptimizer, IterationOutcome, MinMarginEvaluator, ObjectiveEvaluator, SensitivityEngine,
    SensitivityOutcome, StopReason,
};
pub use linear_problem::{
    ConstraintKey, Family, LinearModel, LinearProblem, LinearProblemBuilder, LinearProblemState, VariableKey,
};
pub use solver::{LinearProblemStatus, MilpSolver, SolverBackend};
