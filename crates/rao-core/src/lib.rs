//! # rao-core: domain model of the remedial-action optimizer
//!
//! Types shared by everything that builds or consumes a linear remedial-action
//! optimization:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`state`] | [`Instant`], [`State`] (instant + optional contingency + optional timestamp) |
//! | [`cnec`] | [`FlowCnec`], [`Side`]: monitored branch sides and their limits |
//! | [`range_action`] | [`RangeAction`]: PST, HVDC, injection and standard actuators |
//! | [`tap`] | [`TapTable`]: tap → angle conversion |
//! | [`perimeter`] | [`OptimizationPerimeter`]: what one optimization covers |
//! | [`results`] | Flow / sensitivity / activation provider traits and in-memory tables |
//! | [`parameters`] | [`LinearOptimizerParameters`], loaded from TOML |
//! | [`error`] | [`RaoError`], [`RaoResult`] |
//!
//! Flows are in MW, PST setpoints in degrees and PST ranges in taps.

pub mod cnec;
pub mod error;
pub mod parameters;
pub mod perimeter;
pub mod range_action;
pub mod results;
pub mod state;
pub mod tap;

pub use cnec::{FlowBounds, FlowCnec, Side};
pub use error::{RaoError, RaoResult};
pub use parameters::{
    LinearOptimizerParameters, LoopFlowParameters, MnecParameters, ObjectiveFunctionType,
    ObjectiveParameters, PstModel, RaUsageLimits, RangeActionsParameters, SolverParameters,
    UnoptimizedCnecParameters,
};
pub use perimeter::OptimizationPerimeter;
pub use range_action::{Range, RangeAction, RangeActionKind, RangeType, SetpointBounds};
pub use results::{
    ComputationStatus, FlowResult, FlowTable, RangeActionActivation, RangeActionActivationResult,
    SensitivityResult, SensitivityTable, SetpointTable,
};
pub use state::{Instant, InstantKind, State};
pub use tap::TapTable;
