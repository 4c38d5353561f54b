//! Core filler: flow variables, setpoint variables and the linearised flow
//! equations of one optimization perimeter.
//!
//! For every CNEC side with usable sensitivities:
//!
//! ```text
//! F = F_ref + Σ s · (S - S_cur)
//! ```
//!
//! where the sum runs over the actions available in the CNEC's state or a
//! state before it, one action per network element (the latest one).
//! Every (action, state) gets a setpoint `S`, an absolute variation `AV`
//! and its signed split `S - S_prev = up - down`, with `AV = up + down`
//! penalised in the objective.

use std::sync::Arc;

use rao_core::{OptimizationPerimeter, RangeAction, RangeActionsParameters, SetpointTable, State};
use tracing::debug;

use crate::error::{LinearProblemError, LinearProblemResult};
use crate::ids::{RangeShrinking, VariationDirection};
use crate::linear_problem::{ConstraintKey, Family, LinearModel, VariableKey};

use super::{valid_cnecs, FillInput, ProblemFiller};

/// Slack added around admissible setpoints so rounding never makes the
/// current setpoint infeasible.
const SETPOINT_BOUND_EPSILON: f64 = 1e-5;

/// Ratio by which shrunk setpoint ranges narrow at each iteration.
const RANGE_SHRINK_RATE: f64 = 0.667;

pub struct CoreProblemFiller {
    id: String,
    perimeter: Arc<OptimizationPerimeter>,
    pre_perimeter_setpoints: Arc<SetpointTable>,
    parameters: RangeActionsParameters,
    iteration: i32,
}

impl CoreProblemFiller {
    pub fn new(
        perimeter: Arc<OptimizationPerimeter>,
        pre_perimeter_setpoints: Arc<SetpointTable>,
        parameters: RangeActionsParameters,
    ) -> Self {
        Self {
            id: format!("core {}", perimeter.main_state()),
            perimeter,
            pre_perimeter_setpoints,
            parameters,
            iteration: 0,
        }
    }

    fn actions(&self) -> impl Iterator<Item = (&State, &Arc<RangeAction>)> {
        self.perimeter
            .range_actions_per_state()
            .iter()
            .flat_map(|(state, actions)| actions.iter().map(move |ra| (state, ra)))
    }

    fn build_flow_variables(&self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<()> {
        for cnec in valid_cnecs(self.perimeter.flow_cnecs(), input.sensitivity) {
            for side in cnec.sides() {
                model.add_continuous_variable(VariableKey::flow(cnec, side), f64::NEG_INFINITY, f64::INFINITY)?;
            }
        }
        Ok(())
    }

    fn build_range_action_variables(&self, model: &mut LinearModel) -> LinearProblemResult<()> {
        for (state, ra) in self.actions() {
            model.add_continuous_variable(VariableKey::setpoint(ra, state), f64::NEG_INFINITY, f64::INFINITY)?;
            model.add_continuous_variable(VariableKey::absolute_variation(ra, state), 0.0, f64::INFINITY)?;
            for direction in [VariationDirection::Upward, VariationDirection::Downward] {
                model.add_continuous_variable(
                    VariableKey::setpoint_variation(ra, state, direction),
                    0.0,
                    f64::INFINITY,
                )?;
            }
        }
        Ok(())
    }

    fn build_flow_constraints(&self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<()> {
        let per_state = self.perimeter.range_actions_per_state();
        for cnec in valid_cnecs(self.perimeter.flow_cnecs(), input.sensitivity) {
            for side in cnec.sides() {
                let reference = input.flow.flow(cnec, side);
                if !reference.is_finite() {
                    return Err(LinearProblemError::InvalidInput(format!(
                        "no reference flow for cnec {} on side {}",
                        cnec.id(),
                        side
                    )));
                }
                let flow = model.variable(&VariableKey::flow(cnec, side))?;
                let constraint = model.add_constraint(ConstraintKey::flow(cnec, side), reference, reference)?;
                model.set_coefficient(constraint, flow, 1.0)?;

                let mut rhs = reference;
                let mut handled: Vec<&RangeAction> = Vec::new();
                for state in self.perimeter.states_up_to(cnec.state()) {
                    let Some(actions) = per_state.get(state) else {
                        continue;
                    };
                    for ra in actions {
                        // A later action on the element shadows earlier ones
                        if handled.iter().any(|h| h.same_element_as(ra)) {
                            continue;
                        }
                        handled.push(ra);

                        let sensitivity = input.sensitivity.sensitivity(cnec, side, ra);
                        if !sensitivity.is_finite() {
                            return Err(LinearProblemError::InvalidInput(format!(
                                "sensitivity of cnec {} to {} is not finite",
                                cnec.id(),
                                ra.id()
                            )));
                        }
                        if sensitivity == 0.0 || sensitivity.abs() < self.parameters.sensitivity_threshold(ra) {
                            continue;
                        }
                        let setpoint = model.variable(&VariableKey::setpoint(ra, state))?;
                        rhs -= sensitivity * input.activation.optimized_setpoint(ra, state);
                        model.set_coefficient(constraint, setpoint, -sensitivity)?;
                    }
                }
                model.set_constraint_bounds(constraint, rhs, rhs)?;
            }
        }
        Ok(())
    }

    fn build_range_action_constraints(&self, model: &mut LinearModel) -> LinearProblemResult<()> {
        let approximated = self.parameters.approximated_integers();
        for (state, ra) in self.actions() {
            let setpoint = model.variable(&VariableKey::setpoint(ra, state))?;
            let absolute = model.variable(&VariableKey::absolute_variation(ra, state))?;
            let up = model.variable(&VariableKey::setpoint_variation(ra, state, VariationDirection::Upward))?;
            let down = model.variable(&VariableKey::setpoint_variation(ra, state, VariationDirection::Downward))?;

            // AV = up + down
            let c = model.add_constraint(ConstraintKey::absolute_variation(ra, state), 0.0, 0.0)?;
            model.set_coefficient(c, absolute, 1.0)?;
            model.set_coefficient(c, up, -1.0)?;
            model.set_coefficient(c, down, -1.0)?;

            let variation = match self.perimeter.last_available_range_action(ra, state) {
                None => {
                    // First appearance: variation from the pre-perimeter setpoint
                    let pre = self.pre_perimeter_setpoints.setpoint(ra);
                    model.set_variable_bounds(
                        setpoint,
                        ra.min_admissible_setpoint(pre) - SETPOINT_BOUND_EPSILON,
                        ra.max_admissible_setpoint(pre) + SETPOINT_BOUND_EPSILON,
                    )?;
                    model.add_constraint(ConstraintKey::setpoint_variation(ra, state), pre, pre)?
                }
                Some((previous_ra, previous_state)) => {
                    let previous = model.variable(&VariableKey::setpoint(previous_ra, previous_state))?;
                    let bounds = ra.setpoint_bounds();
                    model.set_variable_bounds(
                        setpoint,
                        bounds.min_absolute - SETPOINT_BOUND_EPSILON,
                        bounds.max_absolute + SETPOINT_BOUND_EPSILON,
                    )?;
                    // Discrete PSTs get their relative limit on taps instead
                    let relative_limited = bounds.min_relative.is_finite() || bounds.max_relative.is_finite();
                    if relative_limited && (!ra.is_pst() || !approximated) {
                        let c = model.add_constraint(
                            ConstraintKey::relative_setpoint(ra, state, RangeShrinking::Disabled),
                            bounds.min_relative,
                            bounds.max_relative,
                        )?;
                        model.set_coefficient(c, setpoint, 1.0)?;
                        model.set_coefficient(c, previous, -1.0)?;
                    }
                    let c = model.add_constraint(ConstraintKey::setpoint_variation(ra, state), 0.0, 0.0)?;
                    model.set_coefficient(c, previous, -1.0)?;
                    c
                }
            };
            // S - S_prev - up + down = 0 (S_prev is a constant on first appearance)
            model.set_coefficient(variation, setpoint, 1.0)?;
            model.set_coefficient(variation, up, -1.0)?;
            model.set_coefficient(variation, down, 1.0)?;
        }
        Ok(())
    }

    /// Injection shifts of one state must sum to zero over their keys.
    fn build_injection_balance(&self, model: &mut LinearModel) -> LinearProblemResult<()> {
        for (state, actions) in self.perimeter.range_actions_per_state() {
            let injections: Vec<_> = actions.iter().filter(|ra| ra.is_injection()).collect();
            if injections.is_empty() {
                continue;
            }
            let c = model.add_constraint(ConstraintKey::InjectionBalance { state: state.clone() }, 0.0, 0.0)?;
            for ra in injections {
                let key_sum = ra.distribution_key_sum();
                let up = model.variable(&VariableKey::setpoint_variation(ra, state, VariationDirection::Upward))?;
                let down =
                    model.variable(&VariableKey::setpoint_variation(ra, state, VariationDirection::Downward))?;
                model.set_coefficient(c, up, key_sum)?;
                model.set_coefficient(c, down, -key_sum)?;
            }
        }
        Ok(())
    }

    fn fill_objective(&self, model: &mut LinearModel) -> LinearProblemResult<()> {
        for (state, ra) in self.actions() {
            let absolute = model.variable(&VariableKey::absolute_variation(ra, state))?;
            model.set_objective_coefficient(absolute, self.parameters.penalty_cost(ra))?;
        }
        Ok(())
    }

    /// Restrict every setpoint to a window around the last solution that
    /// narrows geometrically with the iteration count.
    fn shrink_ranges(&self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<()> {
        let factor = RANGE_SHRINK_RATE.powi(self.iteration);
        for (state, ra) in self.actions() {
            let bounds = ra.setpoint_bounds();
            let width = bounds.max_absolute - bounds.min_absolute;
            if !width.is_finite() {
                continue;
            }
            let previous = input.activation.optimized_setpoint(ra, state);
            let setpoint = model.variable(&VariableKey::setpoint(ra, state))?;
            let c = model.add_constraint(
                ConstraintKey::relative_setpoint(ra, state, RangeShrinking::Enabled),
                previous - width * factor,
                previous + width * factor,
            )?;
            model.set_coefficient(c, setpoint, 1.0)?;
        }
        Ok(())
    }
}

impl ProblemFiller for CoreProblemFiller {
    fn id(&self) -> &str {
        &self.id
    }

    fn produces(&self) -> Vec<Family> {
        vec![
            Family::Flow,
            Family::RangeActionSetpoint,
            Family::RangeActionVariation,
            Family::InjectionBalance,
        ]
    }

    fn consumes(&self) -> Vec<Family> {
        Vec::new()
    }

    fn fill(&mut self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<()> {
        self.build_flow_variables(model, input)?;
        self.build_range_action_variables(model)?;
        self.build_flow_constraints(model, input)?;
        self.build_range_action_constraints(model)?;
        self.build_injection_balance(model)?;
        self.fill_objective(model)?;
        debug!(
            "{}: {} variables, {} constraints after fill",
            self.id,
            model.num_variables(),
            model.num_constraints()
        );
        Ok(())
    }

    fn refresh_between_sensitivity_iteration(
        &mut self,
        model: &mut LinearModel,
        input: &FillInput<'_>,
    ) -> LinearProblemResult<()> {
        self.iteration += 1;
        if self.parameters.range_shrinking {
            self.shrink_ranges(model, input)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::testing::{model, pst};
    use crate::solver::{round_to_precision, DEFAULT_ROUNDING_BITS};
    use rao_core::{
        FlowCnec, FlowTable, Instant, RangeActionActivation, RangeType, SensitivityTable, Side,
    };
    use std::collections::BTreeMap;

    fn preventive() -> State {
        State::preventive(Instant::preventive())
    }

    fn curative() -> State {
        State::after_contingency(Instant::curative(), "co1")
    }

    #[test]
    fn test_flow_constraint_linearisation() {
        let state = preventive();
        let cnec = FlowCnec::new("cnec1", "line1", state.clone())
            .with_bounds(Side::One, Some(-100.0), Some(100.0))
            .into_arc();
        let ra = pst("pst1", "pst-ne").into_arc();
        let perimeter = OptimizationPerimeter::new(state.clone())
            .with_cnec(cnec.clone())
            .with_range_action(state.clone(), ra.clone());

        let setpoints = Arc::new(SetpointTable::new().with_setpoint("pst1", 1.0));
        let flows = FlowTable::new().with_flow("cnec1", Side::One, 40.0);
        let sensitivities = SensitivityTable::new().with_sensitivity("cnec1", Side::One, "pst1", 3.0);
        let activation = RangeActionActivation::new(setpoints.clone());
        let input = FillInput {
            flow: &flows,
            sensitivity: &sensitivities,
            activation: &activation,
        };

        let mut filler = CoreProblemFiller::new(Arc::new(perimeter), setpoints, RangeActionsParameters::default());
        let mut model = model();
        filler.fill(&mut model, &input).unwrap();

        // F, S, AV, up, down
        assert_eq!(model.num_variables(), 5);
        // flow, absolute variation, setpoint variation
        assert_eq!(model.num_constraints(), 3);

        let c = model.constraint(&ConstraintKey::flow(&cnec, Side::One)).unwrap();
        let f = model.variable(&VariableKey::flow(&cnec, Side::One)).unwrap();
        let s = model.variable(&VariableKey::setpoint(&ra, &state)).unwrap();
        assert_eq!(model.coefficient(c, f).unwrap(), 1.0);
        assert_eq!(model.coefficient(c, s).unwrap(), -3.0);
        assert_eq!(model.constraint_lb(c).unwrap(), 37.0);
        assert_eq!(model.constraint_ub(c).unwrap(), 37.0);

        let sv = model.constraint(&ConstraintKey::setpoint_variation(&ra, &state)).unwrap();
        assert_eq!(model.constraint_lb(sv).unwrap(), 1.0);
        let av = model.variable(&VariableKey::absolute_variation(&ra, &state)).unwrap();
        assert!((model.objective_coefficient(av).unwrap() - 0.01).abs() < 1e-9);
        // Whole linear table, padded
        assert!(model.variable_lb(s).unwrap() < -8.0);
        assert!(model.variable_ub(s).unwrap() > 8.0);
    }

    #[test]
    fn test_latest_action_on_element_shadows_earlier_one() {
        let cnec = FlowCnec::new("cnec1", "line1", curative())
            .with_bounds(Side::One, Some(-100.0), Some(100.0))
            .into_arc();
        let ra = pst("pst1", "pst-ne").into_arc();
        let perimeter = OptimizationPerimeter::new(preventive())
            .with_cnec(cnec.clone())
            .with_range_action(preventive(), ra.clone())
            .with_range_action(curative(), ra.clone());

        let setpoints = Arc::new(SetpointTable::new());
        let flows = FlowTable::new().with_flow("cnec1", Side::One, 0.0);
        let sensitivities = SensitivityTable::new().with_sensitivity("cnec1", Side::One, "pst1", 2.0);
        let activation = RangeActionActivation::new(setpoints.clone());
        let input = FillInput {
            flow: &flows,
            sensitivity: &sensitivities,
            activation: &activation,
        };

        let mut filler = CoreProblemFiller::new(Arc::new(perimeter), setpoints, RangeActionsParameters::default());
        let mut model = model();
        filler.fill(&mut model, &input).unwrap();

        let c = model.constraint(&ConstraintKey::flow(&cnec, Side::One)).unwrap();
        let s_prev = model.variable(&VariableKey::setpoint(&ra, &preventive())).unwrap();
        let s_cur = model.variable(&VariableKey::setpoint(&ra, &curative())).unwrap();
        assert_eq!(model.coefficient(c, s_cur).unwrap(), -2.0);
        assert_eq!(model.coefficient(c, s_prev).unwrap(), 0.0);

        // The curative variation is measured from the preventive setpoint
        let sv = model.constraint(&ConstraintKey::setpoint_variation(&ra, &curative())).unwrap();
        assert_eq!(model.coefficient(sv, s_prev).unwrap(), -1.0);
        assert_eq!(model.constraint_lb(sv).unwrap(), 0.0);
    }

    #[test]
    fn test_sensitivity_below_threshold_is_ignored() {
        let state = preventive();
        let cnec = FlowCnec::new("cnec1", "line1", state.clone())
            .with_bounds(Side::One, None, Some(100.0))
            .into_arc();
        let ra = RangeAction::hvdc("hvdc1", "hvdc-ne", 0.0)
            .with_range(RangeType::Absolute, -500.0, 500.0)
            .into_arc();
        let perimeter = OptimizationPerimeter::new(state.clone())
            .with_cnec(cnec.clone())
            .with_range_action(state.clone(), ra.clone());

        let setpoints = Arc::new(SetpointTable::new().with_setpoint("hvdc1", 100.0));
        let flows = FlowTable::new().with_flow("cnec1", Side::One, 50.0);
        let sensitivities = SensitivityTable::new().with_sensitivity("cnec1", Side::One, "hvdc1", 0.05);
        let activation = RangeActionActivation::new(setpoints.clone());
        let input = FillInput {
            flow: &flows,
            sensitivity: &sensitivities,
            activation: &activation,
        };

        let parameters = RangeActionsParameters {
            hvdc_sensitivity_threshold: 0.1,
            ..Default::default()
        };
        let mut filler = CoreProblemFiller::new(Arc::new(perimeter), setpoints, parameters);
        let mut model = model();
        filler.fill(&mut model, &input).unwrap();

        let c = model.constraint(&ConstraintKey::flow(&cnec, Side::One)).unwrap();
        let s = model.variable(&VariableKey::setpoint(&ra, &state)).unwrap();
        assert_eq!(model.coefficient(c, s).unwrap(), 0.0);
        assert_eq!(model.constraint_lb(c).unwrap(), 50.0);
    }

    #[test]
    fn test_injection_balance() {
        let state = preventive();
        let keys = |a: &str, b: &str| BTreeMap::from([(a.to_string(), 1.0), (b.to_string(), 0.5)]);
        let inj1 = RangeAction::injection("inj1", keys("g1", "g2"), 0.0)
            .with_range(RangeType::Absolute, -100.0, 100.0)
            .into_arc();
        let inj2 = RangeAction::injection("inj2", keys("g3", "g4"), 0.0)
            .with_range(RangeType::Absolute, -100.0, 100.0)
            .into_arc();
        let perimeter = OptimizationPerimeter::new(state.clone())
            .with_range_action(state.clone(), inj1.clone())
            .with_range_action(state.clone(), inj2);

        let setpoints = Arc::new(SetpointTable::new());
        let flows = FlowTable::new();
        let sensitivities = SensitivityTable::new();
        let activation = RangeActionActivation::new(setpoints.clone());
        let input = FillInput {
            flow: &flows,
            sensitivity: &sensitivities,
            activation: &activation,
        };

        let mut filler = CoreProblemFiller::new(Arc::new(perimeter), setpoints, RangeActionsParameters::default());
        let mut model = model();
        filler.fill(&mut model, &input).unwrap();

        let c = model
            .constraint(&ConstraintKey::InjectionBalance { state: state.clone() })
            .unwrap();
        let up = model
            .variable(&VariableKey::setpoint_variation(&inj1, &state, VariationDirection::Upward))
            .unwrap();
        let down = model
            .variable(&VariableKey::setpoint_variation(&inj1, &state, VariationDirection::Downward))
            .unwrap();
        assert_eq!(model.coefficient(c, up).unwrap(), 1.5);
        assert_eq!(model.coefficient(c, down).unwrap(), -1.5);
    }

    #[test]
    fn test_range_shrinking_on_refresh() {
        let state = preventive();
        let ra = RangeAction::hvdc("hvdc1", "hvdc-ne", 0.0)
            .with_range(RangeType::Absolute, -100.0, 100.0)
            .into_arc();
        let perimeter = OptimizationPerimeter::new(state.clone()).with_range_action(state.clone(), ra.clone());

        let setpoints = Arc::new(SetpointTable::new());
        let flows = FlowTable::new();
        let sensitivities = SensitivityTable::new();
        let mut activation = RangeActionActivation::new(setpoints.clone());
        activation.set_setpoint(&ra, &state, 20.0);
        let input = FillInput {
            flow: &flows,
            sensitivity: &sensitivities,
            activation: &activation,
        };

        let parameters = RangeActionsParameters {
            range_shrinking: true,
            ..Default::default()
        };
        let mut filler = CoreProblemFiller::new(Arc::new(perimeter), setpoints, parameters);
        let mut model = model();
        filler.fill(&mut model, &input).unwrap();
        let key = ConstraintKey::relative_setpoint(&ra, &state, RangeShrinking::Enabled);
        assert!(model.find_constraint(&key).is_none());

        model.reset();
        filler.fill(&mut model, &input).unwrap();
        filler.refresh_between_sensitivity_iteration(&mut model, &input).unwrap();
        let c = model.constraint(&key).unwrap();
        let half_width = 200.0 * RANGE_SHRINK_RATE;
        assert_eq!(
            model.constraint_lb(c).unwrap(),
            round_to_precision(20.0 - half_width, DEFAULT_ROUNDING_BITS)
        );
        assert_eq!(
            model.constraint_ub(c).unwrap(),
            round_to_precision(20.0 + half_width, DEFAULT_ROUNDING_BITS)
        );
    }
}
