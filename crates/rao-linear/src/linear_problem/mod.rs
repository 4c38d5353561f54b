//! The linear problem: an ordered list of fillers over one [`LinearModel`],
//! with the fill / refresh / solve lifecycle and the read-back of solved
//! setpoints.
//!
//! ```text
//! Empty --fill--> Filled --solve--> Solved
//!                   |                 |
//!                   +--refresh--> Refreshed --solve--> Solved
//! ```
//!
//! A refresh drops the whole model and fills it again with new flows and
//! sensitivities. `update_between_mip_iteration` only touches bounds and
//! coefficients.

mod builder;
mod keys;
mod model;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rao_core::{
    FlowResult, OptimizationPerimeter, RangeAction, RangeActionActivation, RangeActionActivationResult,
    SensitivityResult, SetpointTable, State,
};
use tracing::{debug, info};

use crate::error::{LinearProblemError, LinearProblemResult};
use crate::fillers::{FillInput, ProblemFiller};
use crate::solver::{ConstraintId, LinearProblemStatus, VariableId};

pub use builder::LinearProblemBuilder;
pub use keys::{ConstraintKey, Family, VariableKey};
pub use model::LinearModel;

/// Absolute variation under which an action without usage binary counts as
/// not activated.
const ACTIVATION_EPSILON: f64 = 1e-6;

/// Objective families that make up the virtual cost.
const VIRTUAL_COST_FAMILIES: [Family; 3] = [
    Family::MnecViolation,
    Family::LoopFlowViolation,
    Family::SensitivityFailure,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearProblemState {
    Empty,
    Filled,
    Refreshed,
    Solved,
}

pub struct LinearProblem {
    model: LinearModel,
    fillers: Vec<Box<dyn ProblemFiller>>,
    perimeters: Vec<Arc<OptimizationPerimeter>>,
    pre_perimeter_setpoints: Arc<SetpointTable>,
    relative_mip_gap: f64,
    tuning: String,
    approximated_integers: bool,
    state: LinearProblemState,
}

impl LinearProblem {
    pub fn builder(parameters: rao_core::LinearOptimizerParameters) -> LinearProblemBuilder {
        LinearProblemBuilder::new(parameters)
    }

    fn fill_all(&mut self, input: &FillInput<'_>) -> LinearProblemResult<()> {
        for filler in &mut self.fillers {
            filler.fill(&mut self.model, input)?;
            debug!(
                "Filled {}: {} variables, {} constraints",
                filler.id(),
                self.model.num_variables(),
                self.model.num_constraints()
            );
        }
        Ok(())
    }

    fn ensure_filled(&self, operation: &'static str) -> LinearProblemResult<()> {
        if self.state == LinearProblemState::Empty {
            return Err(LinearProblemError::NotFilled { operation });
        }
        Ok(())
    }

    /// Run every filler once, with the pre-perimeter setpoints as current
    /// activation. A second call without refresh fails on duplicate names.
    pub fn fill(&mut self, flow: &dyn FlowResult, sensitivity: &dyn SensitivityResult) -> LinearProblemResult<()> {
        let activation = RangeActionActivation::new(self.pre_perimeter_setpoints.clone());
        let input = FillInput {
            flow,
            sensitivity,
            activation: &activation,
        };
        self.fill_all(&input)?;
        self.state = LinearProblemState::Filled;
        info!(
            "Linear problem filled by {} fillers: {} variables, {} constraints",
            self.fillers.len(),
            self.model.num_variables(),
            self.model.num_constraints()
        );
        Ok(())
    }

    /// Rebuild the model from scratch with new flows and sensitivities,
    /// computed with `activation`.
    pub fn refresh_between_sensitivity_iteration(
        &mut self,
        flow: &dyn FlowResult,
        sensitivity: &dyn SensitivityResult,
        activation: &dyn RangeActionActivationResult,
    ) -> LinearProblemResult<()> {
        self.ensure_filled("refresh between sensitivity iterations")?;
        self.model.reset();
        let input = FillInput {
            flow,
            sensitivity,
            activation,
        };
        self.fill_all(&input)?;
        for filler in &mut self.fillers {
            filler.refresh_between_sensitivity_iteration(&mut self.model, &input)?;
        }
        self.state = LinearProblemState::Refreshed;
        debug!(
            "Linear problem refreshed: {} variables, {} constraints",
            self.model.num_variables(),
            self.model.num_constraints()
        );
        Ok(())
    }

    /// Adjust bounds and coefficients around `activation` without
    /// rebuilding.
    pub fn update_between_mip_iteration(
        &mut self,
        activation: &dyn RangeActionActivationResult,
    ) -> LinearProblemResult<()> {
        self.ensure_filled("update between MIP iterations")?;
        for filler in &mut self.fillers {
            filler.update_between_mip_iteration(&mut self.model, activation)?;
        }
        Ok(())
    }

    pub fn solve(&mut self) -> LinearProblemResult<LinearProblemStatus> {
        self.ensure_filled("solve")?;
        let status = self
            .model
            .solver_mut()
            .solve(self.relative_mip_gap, &self.tuning)?;
        self.state = LinearProblemState::Solved;
        Ok(status)
    }

    // --- read-back ---

    pub fn state(&self) -> LinearProblemState {
        self.state
    }

    pub fn status(&self) -> LinearProblemStatus {
        self.model.solver().status()
    }

    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    pub fn perimeters(&self) -> &[Arc<OptimizationPerimeter>] {
        &self.perimeters
    }

    pub fn pre_perimeter_setpoints(&self) -> &Arc<SetpointTable> {
        &self.pre_perimeter_setpoints
    }

    /// Filler ids in fill order.
    pub fn filler_ids(&self) -> Vec<&str> {
        self.fillers.iter().map(|f| f.id()).collect()
    }

    pub fn objective_value(&self) -> Option<f64> {
        self.model.solver().objective_value()
    }

    /// Part of the objective carried by the variables of `family`.
    pub fn objective_contribution(&self, family: Family) -> LinearProblemResult<f64> {
        let mut total = 0.0;
        for (_, variable) in self.model.variables_of(family) {
            let coefficient = self.model.objective_coefficient(variable)?;
            if coefficient != 0.0 {
                total += coefficient * self.model.value(variable)?;
            }
        }
        Ok(total)
    }

    /// Penalties of soft violations and failed sensitivity computations.
    pub fn virtual_cost(&self) -> LinearProblemResult<f64> {
        VIRTUAL_COST_FAMILIES
            .iter()
            .map(|family| self.objective_contribution(*family))
            .sum()
    }

    pub fn setpoint(&self, action: &RangeAction, state: &State) -> LinearProblemResult<f64> {
        let variable = self.model.variable(&VariableKey::setpoint(action, state))?;
        self.model.value(variable)
    }

    /// Solved tap of a PST: the tap variable in the integer tap model, the
    /// tap closest to the solved angle otherwise.
    pub fn tap(&self, action: &RangeAction, state: &State) -> LinearProblemResult<i32> {
        let table = action.tap_table().ok_or_else(|| {
            LinearProblemError::InvalidInput(format!("range action {} has no taps", action.id()))
        })?;
        if let Some(variable) = self.model.find_variable(&VariableKey::pst_tap(action, state)) {
            return Ok(self.model.value(variable)?.round() as i32);
        }
        Ok(table.closest_tap(self.setpoint(action, state)?))
    }

    pub fn is_activated(&self, action: &RangeAction, state: &State) -> LinearProblemResult<bool> {
        let binary = VariableKey::range_action_variation_binary(action, state);
        if let Some(variable) = self.model.find_variable(&binary) {
            return Ok(self.model.value(variable)? > 0.5);
        }
        let variable = self.model.variable(&VariableKey::absolute_variation(action, state))?;
        Ok(self.model.value(variable)? > ACTIVATION_EPSILON)
    }

    /// Snapshot of every solved setpoint. PSTs are stored by tap, so
    /// continuous angles land on the closest tap.
    pub fn activation(&self) -> LinearProblemResult<RangeActionActivation> {
        let mut activation = RangeActionActivation::new(self.pre_perimeter_setpoints.clone());
        for perimeter in &self.perimeters {
            for (state, actions) in perimeter.range_actions_per_state() {
                for ra in actions {
                    if ra.is_pst() {
                        activation.set_tap(ra, state, self.tap(ra, state)?);
                    } else {
                        activation.set_setpoint(ra, state, self.setpoint(ra, state)?);
                    }
                }
            }
        }
        Ok(activation)
    }

    pub fn approximated_integers(&self) -> bool {
        self.approximated_integers
    }

    pub fn variable_by_name(&self, name: &str) -> LinearProblemResult<VariableId> {
        self.model.solver().variable(name)
    }

    pub fn constraint_by_name(&self, name: &str) -> LinearProblemResult<ConstraintId> {
        self.model.solver().constraint(name)
    }

    /// Write the model in a readable LP-like format, for debugging.
    pub fn write_lp(&self, path: &Path) -> LinearProblemResult<()> {
        std::fs::write(path, self.model.solver().to_lp_string()).map_err(rao_core::RaoError::from)?;
        debug!("Wrote linear problem to {}", path.display());
        Ok(())
    }
}

impl fmt::Debug for LinearProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearProblem")
            .field("state", &self.state)
            .field("fillers", &self.filler_ids())
            .field("variables", &self.model.num_variables())
            .field("constraints", &self.model.num_constraints())
            .field("status", &self.status())
            .finish()
    }
}
