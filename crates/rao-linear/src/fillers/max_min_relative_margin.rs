//! Max-min relative margin objective.
//!
//! The absolute minimum margin `m` is kept but capped at zero; the relative
//! margin `r` (margin divided by the CNEC's zonal PTDF sum) only counts once
//! every margin is non-negative. A binary `b` switches between the two
//! regimes:
//!
//! ```text
//! m >= -M_abs (1 - b)             b = 1 forces m = 0
//! r <= M_rel b                    b = 0 forces r = 0
//! ptdf r <= margin + M_c (1 - b)  per CNEC side
//! ```
//!
//! Maximising `m + r` then gives the most negative margin while the network
//! is insecure and the smallest relative margin once it is secure.

use std::sync::Arc;

use rao_core::{FlowCnec, FlowResult, Side};
use tracing::debug;

use crate::error::LinearProblemResult;
use crate::ids::MarginExtension;
use crate::linear_problem::{ConstraintKey, Family, LinearModel, VariableKey};

use super::{largest_threshold, valid_cnecs, FillInput, ProblemFiller};

/// Big-M constants are this multiple of the largest threshold.
const BIG_M_FACTOR: f64 = 20.0;

pub struct MaxMinRelativeMarginFiller {
    cnecs: Vec<Arc<FlowCnec>>,
    initial_flows: Arc<dyn FlowResult>,
    ptdf_sum_lower_bound: f64,
}

impl MaxMinRelativeMarginFiller {
    /// PTDF sums are read from `initial_flows` and kept for every iteration.
    pub fn new(cnecs: Vec<Arc<FlowCnec>>, initial_flows: Arc<dyn FlowResult>, ptdf_sum_lower_bound: f64) -> Self {
        Self {
            cnecs,
            initial_flows,
            ptdf_sum_lower_bound,
        }
    }

    fn ptdf_sum(&self, cnec: &FlowCnec, side: Side) -> f64 {
        let sum = self.initial_flows.ptdf_zonal_sum(cnec, side);
        if sum.is_nan() {
            self.ptdf_sum_lower_bound
        } else {
            sum.max(self.ptdf_sum_lower_bound)
        }
    }
}

impl ProblemFiller for MaxMinRelativeMarginFiller {
    fn id(&self) -> &str {
        "max min relative margin"
    }

    fn produces(&self) -> Vec<Family> {
        vec![Family::MinimumMargin, Family::MinimumRelativeMargin]
    }

    fn consumes(&self) -> Vec<Family> {
        vec![Family::Flow]
    }

    fn requires_integers(&self) -> bool {
        true
    }

    fn fill(&mut self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<()> {
        let cnecs: Vec<_> = valid_cnecs(&self.cnecs, input.sensitivity).collect();
        let highest_threshold = largest_threshold(&self.cnecs).max(1.0);
        let big_m = BIG_M_FACTOR * highest_threshold;
        let max_relative_margin = big_m / self.ptdf_sum_lower_bound;

        let margin =
            model.add_continuous_variable(VariableKey::MinimumMargin { timestamp: None }, f64::NEG_INFINITY, 0.0)?;
        let relative = model.add_continuous_variable(
            VariableKey::MinimumRelativeMargin { timestamp: None },
            0.0,
            max_relative_margin,
        )?;
        let positive = model.add_binary_variable(VariableKey::MinimumRelativeMarginSign { timestamp: None })?;

        // m - M_abs b >= -M_abs
        let c = model.add_constraint(
            ConstraintKey::MinimumRelativeMarginSign { timestamp: None },
            -big_m,
            f64::INFINITY,
        )?;
        model.set_coefficient(c, margin, 1.0)?;
        model.set_coefficient(c, positive, -big_m)?;

        // r - M_rel b <= 0
        let c = model.add_constraint(
            ConstraintKey::MinimumRelativeMarginSetToZero { timestamp: None },
            f64::NEG_INFINITY,
            0.0,
        )?;
        model.set_coefficient(c, relative, 1.0)?;
        model.set_coefficient(c, positive, -max_relative_margin)?;

        for cnec in &cnecs {
            for side in cnec.sides() {
                let flow = model.variable(&VariableKey::flow(cnec, side))?;
                let ptdf = self.ptdf_sum(cnec, side);
                if let Some(lb) = cnec.lower_bound(side) {
                    let c = model.add_constraint(
                        ConstraintKey::minimum_margin(cnec, side, MarginExtension::BelowThreshold),
                        f64::NEG_INFINITY,
                        -lb,
                    )?;
                    model.set_coefficient(c, margin, 1.0)?;
                    model.set_coefficient(c, flow, -1.0)?;

                    let c = model.add_constraint(
                        ConstraintKey::minimum_relative_margin(cnec, side, MarginExtension::BelowThreshold),
                        f64::NEG_INFINITY,
                        -lb + big_m,
                    )?;
                    model.set_coefficient(c, relative, ptdf)?;
                    model.set_coefficient(c, flow, -1.0)?;
                    model.set_coefficient(c, positive, big_m)?;
                }
                if let Some(ub) = cnec.upper_bound(side) {
                    let c = model.add_constraint(
                        ConstraintKey::minimum_margin(cnec, side, MarginExtension::AboveThreshold),
                        f64::NEG_INFINITY,
                        ub,
                    )?;
                    model.set_coefficient(c, margin, 1.0)?;
                    model.set_coefficient(c, flow, 1.0)?;

                    let c = model.add_constraint(
                        ConstraintKey::minimum_relative_margin(cnec, side, MarginExtension::AboveThreshold),
                        f64::NEG_INFINITY,
                        ub + big_m,
                    )?;
                    model.set_coefficient(c, relative, ptdf)?;
                    model.set_coefficient(c, flow, 1.0)?;
                    model.set_coefficient(c, positive, big_m)?;
                }
            }
        }

        model.set_objective_coefficient(margin, -1.0)?;
        model.set_objective_coefficient(relative, -1.0)?;
        debug!("Minimum relative margin over {} cnecs (big M {})", cnecs.len(), big_m);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::testing::{model, Inputs};
    use rao_core::{FlowTable, Instant, SetpointTable, State};

    #[test]
    fn test_relative_margin_constraints() {
        let cnec = FlowCnec::new("cnec1", "line", State::preventive(Instant::preventive()))
            .with_bounds(Side::One, Some(-100.0), Some(100.0))
            .into_arc();
        let initial = FlowTable::new()
            .with_flow("cnec1", Side::One, 50.0)
            .with_ptdf_zonal_sum("cnec1", Side::One, 0.5);
        let inputs = Inputs::new(Arc::new(SetpointTable::new()));
        let mut model = model();
        let f = model
            .add_continuous_variable(VariableKey::flow(&cnec, Side::One), f64::NEG_INFINITY, f64::INFINITY)
            .unwrap();

        let mut filler = MaxMinRelativeMarginFiller::new(vec![cnec.clone()], Arc::new(initial), 0.01);
        filler.fill(&mut model, &inputs.input()).unwrap();

        let m = model.variable(&VariableKey::MinimumMargin { timestamp: None }).unwrap();
        let r = model
            .variable(&VariableKey::MinimumRelativeMargin { timestamp: None })
            .unwrap();
        assert_eq!(model.variable_ub(m).unwrap(), 0.0);
        assert_eq!(model.objective_coefficient(m).unwrap(), -1.0);
        assert_eq!(model.objective_coefficient(r).unwrap(), -1.0);

        let above = model
            .constraint(&ConstraintKey::minimum_relative_margin(
                &cnec,
                Side::One,
                MarginExtension::AboveThreshold,
            ))
            .unwrap();
        assert_eq!(model.coefficient(above, r).unwrap(), 0.5);
        assert_eq!(model.coefficient(above, f).unwrap(), 1.0);
        let below = model
            .constraint(&ConstraintKey::minimum_relative_margin(
                &cnec,
                Side::One,
                MarginExtension::BelowThreshold,
            ))
            .unwrap();
        assert_eq!(model.coefficient(below, f).unwrap(), -1.0);
        // m, r, sign binary on top of the flow
        assert_eq!(model.num_variables(), 4);
        // sign, set-to-zero, two absolute and two relative margins
        assert_eq!(model.num_constraints(), 6);
    }

    #[test]
    fn test_ptdf_sum_falls_back_to_lower_bound() {
        let cnec = FlowCnec::new("cnec1", "line", State::preventive(Instant::preventive()))
            .with_bounds(Side::One, None, Some(100.0))
            .into_arc();
        let initial = FlowTable::new()
            .with_ptdf_zonal_sum("cnec1", Side::One, f64::NAN)
            .with_ptdf_zonal_sum("cnec1", Side::Two, 0.001);
        let filler = MaxMinRelativeMarginFiller::new(vec![cnec.clone()], Arc::new(initial), 0.02);
        assert_eq!(filler.ptdf_sum(&cnec, Side::One), 0.02);
        assert_eq!(filler.ptdf_sum(&cnec, Side::Two), 0.02);
    }
}
