//! Soft protection of monitored-only elements (MNECs).
//!
//! An MNEC may lose up to `acceptable_margin_decrease` MW of its initial
//! margin, or use its threshold if that is looser. Beyond that a violation
//! variable absorbs the excess and is penalised in the objective.

use std::sync::Arc;

use rao_core::{FlowCnec, FlowResult, MnecParameters, OptimizationPerimeter};
use tracing::debug;

use crate::error::LinearProblemResult;
use crate::ids::MarginExtension;
use crate::linear_problem::{ConstraintKey, Family, LinearModel, VariableKey};

use super::{valid_cnecs, FillInput, ProblemFiller};

pub struct MnecFiller {
    id: String,
    cnecs: Vec<Arc<FlowCnec>>,
    initial_flows: Arc<dyn FlowResult>,
    parameters: MnecParameters,
}

impl MnecFiller {
    pub fn new(
        perimeter: &OptimizationPerimeter,
        initial_flows: Arc<dyn FlowResult>,
        parameters: MnecParameters,
    ) -> Self {
        Self {
            id: format!("mnec {}", perimeter.main_state()),
            cnecs: perimeter.monitored_cnecs().cloned().collect(),
            initial_flows,
            parameters,
        }
    }
}

impl ProblemFiller for MnecFiller {
    fn id(&self) -> &str {
        &self.id
    }

    fn produces(&self) -> Vec<Family> {
        vec![Family::MnecViolation]
    }

    fn consumes(&self) -> Vec<Family> {
        vec![Family::Flow]
    }

    fn fill(&mut self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<()> {
        let adjustment = self.parameters.constraint_adjustment_coefficient;
        let mut count = 0;
        for cnec in valid_cnecs(&self.cnecs, input.sensitivity) {
            let sides: Vec<_> = cnec
                .sides()
                .filter(|side| !self.initial_flows.flow(cnec, *side).is_nan())
                .collect();
            for &side in &sides {
                let initial = self.initial_flows.flow(cnec, side);
                let flow = model.variable(&VariableKey::flow(cnec, side))?;
                let violation = model.add_continuous_variable(VariableKey::mnec_violation(cnec, side), 0.0, f64::INFINITY)?;

                if let Some(ub) = cnec.upper_bound(side) {
                    let threshold = ub.max(initial + self.parameters.acceptable_margin_decrease) - adjustment;
                    let c = model.add_constraint(
                        ConstraintKey::mnec_flow(cnec, side, MarginExtension::AboveThreshold),
                        f64::NEG_INFINITY,
                        threshold,
                    )?;
                    model.set_coefficient(c, flow, 1.0)?;
                    model.set_coefficient(c, violation, -1.0)?;
                }
                if let Some(lb) = cnec.lower_bound(side) {
                    let threshold = lb.min(initial - self.parameters.acceptable_margin_decrease) + adjustment;
                    let c = model.add_constraint(
                        ConstraintKey::mnec_flow(cnec, side, MarginExtension::BelowThreshold),
                        threshold,
                        f64::INFINITY,
                    )?;
                    model.set_coefficient(c, flow, 1.0)?;
                    model.set_coefficient(c, violation, 1.0)?;
                }
                model.set_objective_coefficient(violation, self.parameters.violation_cost / sides.len() as f64)?;
                count += 1;
            }
        }
        debug!("{}: {} monitored sides", self.id, count);
        Ok(())
    }
}
