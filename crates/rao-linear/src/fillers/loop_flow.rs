//! Loop-flow limitation.
//!
//! The loop flow of a CNEC side (flow minus commercial flow) must stay
//! within `max(threshold, |initial loop flow| + acceptable increase)`. The
//! commercial flow is taken from the current iteration, so the constraint
//! becomes a band around it; a penalised violation variable keeps the
//! problem feasible.

use std::sync::Arc;

use rao_core::{FlowCnec, FlowResult, LoopFlowParameters, OptimizationPerimeter};
use tracing::{debug, warn};

use crate::error::LinearProblemResult;
use crate::ids::BoundExtension;
use crate::linear_problem::{ConstraintKey, Family, LinearModel, VariableKey};

use super::{valid_cnecs, FillInput, ProblemFiller};

pub struct MaxLoopFlowFiller {
    id: String,
    cnecs: Vec<Arc<FlowCnec>>,
    initial_flows: Arc<dyn FlowResult>,
    parameters: LoopFlowParameters,
}

impl MaxLoopFlowFiller {
    pub fn new(
        perimeter: &OptimizationPerimeter,
        initial_flows: Arc<dyn FlowResult>,
        parameters: LoopFlowParameters,
    ) -> Self {
        Self {
            id: format!("loop flow {}", perimeter.main_state()),
            cnecs: perimeter.loop_flow_cnecs().cloned().collect(),
            initial_flows,
            parameters,
        }
    }
}

impl ProblemFiller for MaxLoopFlowFiller {
    fn id(&self) -> &str {
        &self.id
    }

    fn produces(&self) -> Vec<Family> {
        vec![Family::LoopFlowViolation]
    }

    fn consumes(&self) -> Vec<Family> {
        vec![Family::Flow]
    }

    fn fill(&mut self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<()> {
        for cnec in valid_cnecs(&self.cnecs, input.sensitivity) {
            let Some(threshold) = cnec.loop_flow_threshold() else {
                continue;
            };
            for side in cnec.sides() {
                let initial_loop_flow = self.initial_flows.loop_flow(cnec, side);
                let commercial = input.flow.commercial_flow(cnec, side);
                if !initial_loop_flow.is_finite() || !commercial.is_finite() {
                    warn!("No loop flow available for cnec {} on side {}, not limited", cnec.id(), side);
                    continue;
                }
                let bound = threshold.max(initial_loop_flow.abs() + self.parameters.acceptable_increase)
                    - self.parameters.constraint_adjustment_coefficient;

                let flow = model.variable(&VariableKey::flow(cnec, side))?;
                let violation =
                    model.add_continuous_variable(VariableKey::loop_flow_violation(cnec, side), 0.0, f64::INFINITY)?;

                // F - v <= commercial + bound
                let c = model.add_constraint(
                    ConstraintKey::max_loop_flow(cnec, side, BoundExtension::UpperBound),
                    f64::NEG_INFINITY,
                    commercial + bound,
                )?;
                model.set_coefficient(c, flow, 1.0)?;
                model.set_coefficient(c, violation, -1.0)?;

                // F + v >= commercial - bound
                let c = model.add_constraint(
                    ConstraintKey::max_loop_flow(cnec, side, BoundExtension::LowerBound),
                    commercial - bound,
                    f64::INFINITY,
                )?;
                model.set_coefficient(c, flow, 1.0)?;
                model.set_coefficient(c, violation, 1.0)?;

                model.set_objective_coefficient(violation, self.parameters.violation_cost)?;
            }
        }
        debug!("{}: {} loop-flow cnecs", self.id, self.cnecs.len());
        Ok(())
    }
}
