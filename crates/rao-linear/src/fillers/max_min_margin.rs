//! Max-min margin objective: maximise `m` with `m <= margin` on every side
//! of every optimized CNEC.

use std::sync::Arc;

use rao_core::FlowCnec;
use tracing::debug;

use crate::error::LinearProblemResult;
use crate::ids::MarginExtension;
use crate::linear_problem::{ConstraintKey, Family, LinearModel, VariableKey};

use super::{valid_cnecs, FillInput, ProblemFiller};

pub struct MaxMinMarginFiller {
    cnecs: Vec<Arc<FlowCnec>>,
}

impl MaxMinMarginFiller {
    /// `cnecs` are the optimized CNECs of every perimeter.
    pub fn new(cnecs: Vec<Arc<FlowCnec>>) -> Self {
        Self { cnecs }
    }
}

impl ProblemFiller for MaxMinMarginFiller {
    fn id(&self) -> &str {
        "max min margin"
    }

    fn produces(&self) -> Vec<Family> {
        vec![Family::MinimumMargin]
    }

    fn consumes(&self) -> Vec<Family> {
        vec![Family::Flow]
    }

    fn fill(&mut self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<()> {
        let cnecs: Vec<_> = valid_cnecs(&self.cnecs, input.sensitivity).collect();
        // Without CNECs the margin is capped at zero to keep the problem bounded
        let ub = if cnecs.is_empty() { 0.0 } else { f64::INFINITY };
        let margin = model.add_continuous_variable(
            VariableKey::MinimumMargin { timestamp: None },
            f64::NEG_INFINITY,
            ub,
        )?;

        for cnec in &cnecs {
            for side in cnec.sides() {
                let flow = model.variable(&VariableKey::flow(cnec, side))?;
                if let Some(lb) = cnec.lower_bound(side) {
                    // m <= F - lb
                    let c = model.add_constraint(
                        ConstraintKey::minimum_margin(cnec, side, MarginExtension::BelowThreshold),
                        f64::NEG_INFINITY,
                        -lb,
                    )?;
                    model.set_coefficient(c, margin, 1.0)?;
                    model.set_coefficient(c, flow, -1.0)?;
                }
                if let Some(ub) = cnec.upper_bound(side) {
                    // m <= ub - F
                    let c = model.add_constraint(
                        ConstraintKey::minimum_margin(cnec, side, MarginExtension::AboveThreshold),
                        f64::NEG_INFINITY,
                        ub,
                    )?;
                    model.set_coefficient(c, margin, 1.0)?;
                    model.set_coefficient(c, flow, 1.0)?;
                }
            }
        }
        model.set_objective_coefficient(margin, -1.0)?;
        debug!("Minimum margin over {} cnecs", cnecs.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::testing::{model, Inputs};
    use rao_core::{Instant, SetpointTable, Side, State};

    fn cnec(id: &str, state: State) -> Arc<FlowCnec> {
        FlowCnec::new(id, "line", state)
            .with_bounds(Side::One, Some(-100.0), Some(120.0))
            .into_arc()
    }

    fn add_flow(model: &mut LinearModel, cnec: &FlowCnec) {
        model
            .add_continuous_variable(VariableKey::flow(cnec, Side::One), f64::NEG_INFINITY, f64::INFINITY)
            .unwrap();
    }

    #[test]
    fn test_margin_constraints() {
        let cnec = cnec("cnec1", State::preventive(Instant::preventive()));
        let inputs = Inputs::new(Arc::new(SetpointTable::new()));
        let mut model = model();
        add_flow(&mut model, &cnec);

        let mut filler = MaxMinMarginFiller::new(vec![cnec.clone()]);
        filler.fill(&mut model, &inputs.input()).unwrap();

        let m = model.variable(&VariableKey::MinimumMargin { timestamp: None }).unwrap();
        let f = model.variable(&VariableKey::flow(&cnec, Side::One)).unwrap();
        let below = model
            .constraint(&ConstraintKey::minimum_margin(&cnec, Side::One, MarginExtension::BelowThreshold))
            .unwrap();
        let above = model
            .constraint(&ConstraintKey::minimum_margin(&cnec, Side::One, MarginExtension::AboveThreshold))
            .unwrap();

        assert_eq!(model.constraint_ub(below).unwrap(), 100.0);
        assert_eq!(model.coefficient(below, f).unwrap(), -1.0);
        assert_eq!(model.constraint_ub(above).unwrap(), 120.0);
        assert_eq!(model.coefficient(above, f).unwrap(), 1.0);
        assert_eq!(model.coefficient(above, m).unwrap(), 1.0);
        assert_eq!(model.objective_coefficient(m).unwrap(), -1.0);
        assert_eq!(model.variable_ub(m).unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_failed_state_is_skipped_and_margin_capped() {
        let outage = State::after_contingency(Instant::outage(), "co1");
        let cnec = cnec("cnec1", outage.clone());
        let mut inputs = Inputs::new(Arc::new(SetpointTable::new()));
        inputs.sensitivities = inputs.sensitivities.clone().with_failed_state(outage);
        let mut model = model();

        let mut filler = MaxMinMarginFiller::new(vec![cnec]);
        filler.fill(&mut model, &inputs.input()).unwrap();

        let m = model.variable(&VariableKey::MinimumMargin { timestamp: None }).unwrap();
        assert_eq!(model.num_constraints(), 0);
        assert_eq!(model.variable_ub(m).unwrap(), 0.0);
    }
}
