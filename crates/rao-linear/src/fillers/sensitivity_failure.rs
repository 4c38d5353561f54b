//! Fixed objective cost for every state whose sensitivity computation
//! failed, so a solution relying on such states never looks better than it
//! is.

use rao_core::{ComputationStatus, State};
use tracing::warn;

use crate::error::LinearProblemResult;
use crate::linear_problem::{Family, LinearModel, VariableKey};

use super::{FillInput, ProblemFiller};

pub struct SensitivityFailureFiller {
    states: Vec<State>,
    overcost: f64,
}

impl SensitivityFailureFiller {
    pub fn new(states: Vec<State>, overcost: f64) -> Self {
        Self { states, overcost }
    }
}

impl ProblemFiller for SensitivityFailureFiller {
    fn id(&self) -> &str {
        "sensitivity failure"
    }

    fn produces(&self) -> Vec<Family> {
        vec![Family::SensitivityFailure]
    }

    fn consumes(&self) -> Vec<Family> {
        Vec::new()
    }

    fn fill(&mut self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<()> {
        for state in &self.states {
            if input.sensitivity.status(state) != ComputationStatus::Failure {
                continue;
            }
            warn!("Sensitivity computation failed for state {}, adding {} to the cost", state, self.overcost);
            let variable = model.add_continuous_variable(
                VariableKey::SensitivityFailure { state: state.clone() },
                1.0,
                1.0,
            )?;
            model.set_objective_coefficient(variable, self.overcost)?;
        }
        Ok(())
    }
}
