//! Problem fillers: the units that write variables, constraints and
//! objective terms into a [`LinearModel`].
//!
//! Each filler declares the [`Family`]s it produces and consumes; the
//! builder orders fillers from those declarations. Fillers are rebuilt from
//! scratch on every sensitivity refresh (`fill` is called again on an empty
//! model), then get their refresh hook. Between MIP iterations only bounds
//! and coefficients change.

mod between_timestamps;
mod continuous_group;
mod core;
mod discrete_pst_group;
mod discrete_pst_tap;
mod loop_flow;
mod max_min_margin;
mod max_min_relative_margin;
mod mnec;
mod ra_usage_limits;
mod sensitivity_failure;
mod unoptimized_cnec;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use rao_core::{ComputationStatus, FlowCnec, FlowResult, RangeActionActivationResult, SensitivityResult};

use crate::error::LinearProblemResult;
use crate::linear_problem::{Family, LinearModel};

pub use self::between_timestamps::BetweenTimestampsFiller;
pub use self::continuous_group::ContinuousGroupFiller;
pub use self::core::CoreProblemFiller;
pub use self::discrete_pst_group::DiscretePstGroupFiller;
pub use self::discrete_pst_tap::DiscretePstTapFiller;
pub use self::loop_flow::MaxLoopFlowFiller;
pub use self::max_min_margin::MaxMinMarginFiller;
pub use self::max_min_relative_margin::MaxMinRelativeMarginFiller;
pub use self::mnec::MnecFiller;
pub use self::ra_usage_limits::RaUsageLimitsFiller;
pub use self::sensitivity_failure::SensitivityFailureFiller;
pub use self::unoptimized_cnec::UnoptimizedCnecFiller;

/// Data a filler reads while filling or refreshing.
#[derive(Clone, Copy)]
pub struct FillInput<'a> {
    /// Reference flows of the current iteration
    pub flow: &'a dyn FlowResult,
    pub sensitivity: &'a dyn SensitivityResult,
    /// Setpoints the flows and sensitivities were computed with
    pub activation: &'a dyn RangeActionActivationResult,
}

pub trait ProblemFiller: Send {
    /// Unique, human-readable id used in logs and assembly errors.
    fn id(&self) -> &str;

    fn produces(&self) -> Vec<Family>;

    fn consumes(&self) -> Vec<Family>;

    /// Whether the filler creates integer or binary variables.
    fn requires_integers(&self) -> bool {
        false
    }

    fn fill(&mut self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<()>;

    /// Called after the model was rebuilt with new flows and sensitivities.
    fn refresh_between_sensitivity_iteration(
        &mut self,
        _model: &mut LinearModel,
        _input: &FillInput<'_>,
    ) -> LinearProblemResult<()> {
        Ok(())
    }

    /// Bound and coefficient updates between two solves of the same model.
    fn update_between_mip_iteration(
        &mut self,
        _model: &mut LinearModel,
        _activation: &dyn RangeActionActivationResult,
    ) -> LinearProblemResult<()> {
        Ok(())
    }
}

/// CNECs whose state has usable sensitivities.
pub(crate) fn valid_cnecs<'a>(
    cnecs: &'a [Arc<FlowCnec>],
    sensitivity: &'a dyn SensitivityResult,
) -> impl Iterator<Item = &'a Arc<FlowCnec>> + 'a {
    cnecs
        .iter()
        .filter(move |cnec| sensitivity.status(cnec.state()) != ComputationStatus::Failure)
}

/// Largest finite threshold over `cnecs`, used to size big-M constants.
pub(crate) fn largest_threshold(cnecs: &[Arc<FlowCnec>]) -> f64 {
    cnecs
        .iter()
        .map(|cnec| cnec.largest_threshold())
        .filter(|t| t.is_finite())
        .fold(0.0, f64::max)
}
