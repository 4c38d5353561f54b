//! CNECs left out of the margin objective.
//!
//! Two rules, one per configuration:
//!
//! * operators not to optimize: in a curative perimeter, a CNEC of such an
//!   operator only has to keep its pre-perimeter margin. A binary `b` marks CNECs that stay in the
//!   objective; with `b = 0` the margin may not decrease.
//! * CNECs secured by a PST: the CNEC leaves the objective (`b = 0`) only if
//!   moving its PST to the favourable end of its range would secure it.
//!
//! In both cases the min-margin constraints of the CNEC are relaxed when
//! `b = 0`.

use std::sync::Arc;

use rao_core::{
    FlowCnec, FlowResult, OptimizationPerimeter, RangeAction, RangeActionsParameters, Side, State,
    UnoptimizedCnecParameters,
};
use tracing::{debug, warn};

use crate::error::{LinearProblemError, LinearProblemResult};
use crate::ids::MarginExtension;
use crate::linear_problem::{ConstraintKey, Family, LinearModel, VariableKey};
use crate::solver::VariableId;

use super::{largest_threshold, valid_cnecs, FillInput, ProblemFiller};

const BIG_M_FACTOR: f64 = 20.0;

/// Relaxation of the margin constraints of a CNEC out of the objective.
const MARGIN_RELAXATION_FACTOR: f64 = 2.0;

pub struct UnoptimizedCnecFiller {
    id: String,
    perimeter: Arc<OptimizationPerimeter>,
    initial_flows: Arc<dyn FlowResult>,
    parameters: UnoptimizedCnecParameters,
    range_actions: RangeActionsParameters,
    highest_threshold: f64,
}

impl UnoptimizedCnecFiller {
    pub fn new(
        perimeter: Arc<OptimizationPerimeter>,
        initial_flows: Arc<dyn FlowResult>,
        parameters: UnoptimizedCnecParameters,
        range_actions: RangeActionsParameters,
    ) -> Self {
        let highest_threshold = largest_threshold(perimeter.flow_cnecs()).max(1.0);
        Self {
            id: format!("unoptimized cnecs {}", perimeter.main_state()),
            perimeter,
            initial_flows,
            parameters,
            range_actions,
            highest_threshold,
        }
    }

    fn big_m(&self) -> f64 {
        BIG_M_FACTOR * self.highest_threshold
    }

    /// Margin decrease rule for CNECs of operators not to optimize.
    fn fill_margin_decrease(&self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<Vec<Arc<FlowCnec>>> {
        if !self.parameters.relaxes_operators(self.perimeter.main_state()) {
            return Ok(Vec::new());
        }
        let cnecs: Vec<_> = valid_cnecs(self.perimeter.flow_cnecs(), input.sensitivity)
            .filter(|cnec| cnec.is_optimized())
            .filter(|cnec| {
                cnec.operator()
                    .is_some_and(|op| self.parameters.operators_not_to_optimize.contains(op))
            })
            .filter(|cnec| cnec.sides().all(|side| !self.initial_flows.flow(cnec, side).is_nan()))
            .cloned()
            .collect();

        for cnec in &cnecs {
            for side in cnec.sides() {
                let flow = model.variable(&VariableKey::flow(cnec, side))?;
                let optimize = model.add_binary_variable(VariableKey::optimize_cnec(cnec, side))?;
                let pre_margin = self.initial_flows.margin(cnec, side);
                if let Some(lb) = cnec.lower_bound(side) {
                    // F + M b >= pre_margin + lb
                    let c = model.add_constraint(
                        ConstraintKey::dont_optimize_cnec(cnec, side, MarginExtension::BelowThreshold),
                        pre_margin + lb,
                        f64::INFINITY,
                    )?;
                    model.set_coefficient(c, flow, 1.0)?;
                    model.set_coefficient(c, optimize, self.big_m())?;
                }
                if let Some(ub) = cnec.upper_bound(side) {
                    // -F + M b >= pre_margin - ub
                    let c = model.add_constraint(
                        ConstraintKey::dont_optimize_cnec(cnec, side, MarginExtension::AboveThreshold),
                        pre_margin - ub,
                        f64::INFINITY,
                    )?;
                    model.set_coefficient(c, flow, -1.0)?;
                    model.set_coefficient(c, optimize, self.big_m())?;
                }
            }
        }
        Ok(cnecs)
    }

    /// Latest state in which `pst` acts on `cnec`.
    fn pst_in_scope<'a>(&'a self, pst: &'a Arc<RangeAction>, cnec: &'a FlowCnec) -> Option<&'a State> {
        let per_state = self.perimeter.range_actions_per_state();
        self.perimeter.states_up_to(cnec.state()).find(|state| {
            per_state
                .get(*state)
                .is_some_and(|actions| actions.iter().any(|ra| ra.id() == pst.id()))
        })
    }

    /// PST limitation rule for CNECs secured by a PST.
    fn fill_pst_limitation(&self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<Vec<Arc<FlowCnec>>> {
        let actions = self.perimeter.range_actions();
        let mut cnecs = Vec::new();
        for cnec in valid_cnecs(self.perimeter.flow_cnecs(), input.sensitivity) {
            let Some(pst_id) = self.parameters.cnecs_secured_by_pst.get(cnec.id()) else {
                continue;
            };
            let Some(pst) = actions.iter().find(|ra| ra.id() == pst_id) else {
                warn!("PST {} securing cnec {} is not in the perimeter", pst_id, cnec.id());
                continue;
            };
            let Some(state) = self.pst_in_scope(pst, cnec) else {
                warn!("PST {} is not available for cnec {}", pst_id, cnec.id());
                continue;
            };
            let setpoint = model.variable(&VariableKey::setpoint(pst, state))?;
            let min_setpoint = model.variable_lb(setpoint)?;
            let max_setpoint = model.variable_ub(setpoint)?;
            if !min_setpoint.is_finite() || !max_setpoint.is_finite() {
                return Err(LinearProblemError::InvalidInput(format!(
                    "PST {} securing cnec {} has an unbounded setpoint",
                    pst_id,
                    cnec.id()
                )));
            }
            for side in cnec.sides() {
                self.add_pst_limitation(model, input, cnec, side, pst, setpoint, (min_setpoint, max_setpoint))?;
            }
            cnecs.push(cnec.clone());
        }
        Ok(cnecs)
    }

    #[allow(clippy::too_many_arguments)]
    fn add_pst_limitation(
        &self,
        model: &mut LinearModel,
        input: &FillInput<'_>,
        cnec: &FlowCnec,
        side: Side,
        pst: &RangeAction,
        setpoint: VariableId,
        (min_setpoint, max_setpoint): (f64, f64),
    ) -> LinearProblemResult<()> {
        let flow = model.variable(&VariableKey::flow(cnec, side))?;
        let optimize = model.add_binary_variable(VariableKey::optimize_cnec(cnec, side))?;
        let mut sensitivity = input.sensitivity.sensitivity(cnec, side, pst);
        if sensitivity.abs() < self.range_actions.sensitivity_threshold(pst) {
            sensitivity = 0.0;
        }
        // Flow reached when the PST is pushed to the end that helps this bound
        if let Some(lb) = cnec.lower_bound(side) {
            let best = if sensitivity >= 0.0 { max_setpoint } else { min_setpoint };
            let c = model.add_constraint(
                ConstraintKey::dont_optimize_cnec(cnec, side, MarginExtension::BelowThreshold),
                lb - sensitivity * best,
                f64::INFINITY,
            )?;
            model.set_coefficient(c, flow, 1.0)?;
            model.set_coefficient(c, setpoint, -sensitivity)?;
            model.set_coefficient(c, optimize, self.big_m())?;
        }
        if let Some(ub) = cnec.upper_bound(side) {
            let best = if sensitivity >= 0.0 { min_setpoint } else { max_setpoint };
            let c = model.add_constraint(
                ConstraintKey::dont_optimize_cnec(cnec, side, MarginExtension::AboveThreshold),
                -ub + sensitivity * best,
                f64::INFINITY,
            )?;
            model.set_coefficient(c, flow, -1.0)?;
            model.set_coefficient(c, setpoint, sensitivity)?;
            model.set_coefficient(c, optimize, self.big_m())?;
        }
        Ok(())
    }

    /// Add `2H b` to the margin constraints of `cnecs` and loosen their
    /// upper bound by `2H`, so they only bind when `b = 1`.
    fn relax_margin_constraints(&self, model: &mut LinearModel, cnecs: &[Arc<FlowCnec>]) -> LinearProblemResult<()> {
        let relaxation = MARGIN_RELAXATION_FACTOR * self.highest_threshold;
        for cnec in cnecs {
            for side in cnec.sides() {
                let Some(optimize) = model.find_variable(&VariableKey::optimize_cnec(cnec, side)) else {
                    continue;
                };
                for margin in [MarginExtension::BelowThreshold, MarginExtension::AboveThreshold] {
                    let keys = [
                        ConstraintKey::minimum_margin(cnec, side, margin),
                        ConstraintKey::minimum_relative_margin(cnec, side, margin),
                    ];
                    for key in keys {
                        if let Some(c) = model.find_constraint(&key) {
                            model.set_coefficient(c, optimize, relaxation)?;
                            let ub = model.constraint_ub(c)?;
                            model.set_constraint_ub(c, ub + relaxation)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl ProblemFiller for UnoptimizedCnecFiller {
    fn id(&self) -> &str {
        &self.id
    }

    fn produces(&self) -> Vec<Family> {
        vec![Family::OptimizeCnec]
    }

    fn consumes(&self) -> Vec<Family> {
        vec![Family::Flow, Family::MinimumMargin, Family::RangeActionSetpoint]
    }

    fn requires_integers(&self) -> bool {
        true
    }

    fn fill(&mut self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<()> {
        let cnecs = if self.parameters.cnecs_secured_by_pst.is_empty() {
            self.fill_margin_decrease(model, input)?
        } else {
            self.fill_pst_limitation(model, input)?
        };
        self.relax_margin_constraints(model, &cnecs)?;
        debug!("{}: {} cnecs may leave the objective", self.id, cnecs.len());
        Ok(())
    }
}
