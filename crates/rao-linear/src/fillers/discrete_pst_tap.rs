//! Integer tap model of PSTs.
//!
//! Each (PST, state) gets integer upward and downward tap variations from
//! the current tap, a binary per direction (at most one active), an integer
//! tap variable and a linear conversion from tap variations to the angle
//! setpoint of the core filler:
//!
//! ```text
//! S + f_down · down - f_up · up = angle(current tap)
//! T - up + down = current tap
//! ```
//!
//! On the first fill the factors are the average angle steps towards each
//! end of the admissible tap range; after every iteration they become the
//! one-tap steps around the new current tap.

use std::sync::Arc;

use rao_core::{
    OptimizationPerimeter, RangeAction, RangeActionActivationResult, SetpointTable, State, TapTable,
};
use tracing::debug;

use crate::error::LinearProblemResult;
use crate::ids::{VariationDirection, VariationReference};
use crate::linear_problem::{ConstraintKey, Family, LinearModel, VariableKey};

use super::{FillInput, ProblemFiller};

const DIRECTIONS: [VariationDirection; 2] = [VariationDirection::Upward, VariationDirection::Downward];

pub struct DiscretePstTapFiller {
    id: String,
    perimeter: Arc<OptimizationPerimeter>,
    pre_perimeter_setpoints: Arc<SetpointTable>,
}

impl DiscretePstTapFiller {
    pub fn new(perimeter: Arc<OptimizationPerimeter>, pre_perimeter_setpoints: Arc<SetpointTable>) -> Self {
        Self {
            id: format!("discrete pst taps {}", perimeter.main_state()),
            perimeter,
            pre_perimeter_setpoints,
        }
    }

    fn psts(&self) -> impl Iterator<Item = (&State, &Arc<RangeAction>, &TapTable)> {
        self.perimeter
            .range_actions_per_state()
            .iter()
            .flat_map(|(state, actions)| {
                actions
                    .iter()
                    .filter_map(move |ra| ra.tap_table().map(|table| (state, ra, table)))
            })
    }

    /// Taps the PST may reach in `state`. On its first appearance the range
    /// follows the admissible setpoints from the pre-perimeter setpoint;
    /// later states rely on the relative tap constraint instead.
    fn tap_range(&self, ra: &RangeAction, state: &State, table: &TapTable) -> (i32, i32) {
        match self.perimeter.last_available_range_action(ra, state) {
            None => {
                let pre = self.pre_perimeter_setpoints.setpoint(ra);
                let a = table.closest_tap(ra.min_admissible_setpoint(pre));
                let b = table.closest_tap(ra.max_admissible_setpoint(pre));
                (a.min(b), a.max(b))
            }
            Some(_) => (table.lowest_tap(), table.highest_tap()),
        }
    }

    fn build_variables(
        &self,
        model: &mut LinearModel,
        ra: &RangeAction,
        state: &State,
        table: &TapTable,
        max_variation: i32,
    ) -> LinearProblemResult<()> {
        for direction in DIRECTIONS {
            model.add_integer_variable(
                VariableKey::pst_tap_variation(ra, state, direction),
                0.0,
                max_variation as f64,
            )?;
            model.add_binary_variable(VariableKey::pst_tap_variation_binary(ra, state, direction))?;
        }
        model.add_integer_variable(
            VariableKey::pst_tap(ra, state),
            table.lowest_tap() as f64,
            table.highest_tap() as f64,
        )?;
        Ok(())
    }

    fn fill_pst(
        &self,
        model: &mut LinearModel,
        activation: &dyn RangeActionActivationResult,
        state: &State,
        ra: &RangeAction,
        table: &TapTable,
    ) -> LinearProblemResult<()> {
        let current_tap = activation.optimized_tap(ra, state);
        let current_angle = activation.optimized_setpoint(ra, state);
        let (min_tap, max_tap) = self.tap_range(ra, state, table);
        let max_down = (current_tap - min_tap).max(0);
        let max_up = (max_tap - current_tap).max(0);

        self.build_variables(model, ra, state, table, max_down + max_up)?;
        let setpoint = model.variable(&VariableKey::setpoint(ra, state))?;
        let up = model.variable(&VariableKey::pst_tap_variation(ra, state, VariationDirection::Upward))?;
        let down = model.variable(&VariableKey::pst_tap_variation(ra, state, VariationDirection::Downward))?;
        let up_binary =
            model.variable(&VariableKey::pst_tap_variation_binary(ra, state, VariationDirection::Upward))?;
        let down_binary =
            model.variable(&VariableKey::pst_tap_variation_binary(ra, state, VariationDirection::Downward))?;
        let tap = model.variable(&VariableKey::pst_tap(ra, state))?;

        // Angle conversion, averaged towards each end of the range
        let c = model.add_constraint(
            ConstraintKey::tap_to_angle_conversion(ra, state),
            current_angle,
            current_angle,
        )?;
        model.set_coefficient(c, setpoint, 1.0)?;
        let anchor = table.clamped_angle(current_tap);
        if max_down > 0 {
            let factor = (anchor - table.clamped_angle(min_tap)) / max_down as f64;
            model.set_coefficient(c, down, factor)?;
        }
        if max_up > 0 {
            let factor = (table.clamped_angle(max_tap) - anchor) / max_up as f64;
            model.set_coefficient(c, up, -factor)?;
        }

        // At most one direction
        let c = model.add_constraint(
            ConstraintKey::UpOrDownPstVariation {
                action: ra.id().to_string(),
                state: state.clone(),
            },
            f64::NEG_INFINITY,
            1.0,
        )?;
        model.set_coefficient(c, up_binary, 1.0)?;
        model.set_coefficient(c, down_binary, 1.0)?;

        // variation <= max · binary
        for (direction, variable, binary, max) in [
            (VariationDirection::Upward, up, up_binary, max_up),
            (VariationDirection::Downward, down, down_binary, max_down),
        ] {
            let c = model.add_constraint(
                ConstraintKey::is_variation_in_direction(ra, state, VariationReference::PreviousIteration, direction),
                f64::NEG_INFINITY,
                0.0,
            )?;
            model.set_coefficient(c, variable, 1.0)?;
            model.set_coefficient(c, binary, -(max as f64))?;
        }

        // T = current tap + up - down
        let c = model.add_constraint(ConstraintKey::pst_tap(ra, state), current_tap as f64, current_tap as f64)?;
        model.set_coefficient(c, tap, 1.0)?;
        model.set_coefficient(c, up, -1.0)?;
        model.set_coefficient(c, down, 1.0)?;

        // Tap change allowed since the previous instant
        if let (Some((previous_ra, previous_state)), Some((min, max))) = (
            self.perimeter.last_available_range_action(ra, state),
            ra.relative_tap_bounds(),
        ) {
            let previous_tap = model.variable(&VariableKey::pst_tap(previous_ra, previous_state))?;
            let c = model.add_constraint(
                ConstraintKey::pst_relative_tap(ra, state),
                min.min(0) as f64,
                max.max(0) as f64,
            )?;
            model.set_coefficient(c, tap, 1.0)?;
            model.set_coefficient(c, previous_tap, -1.0)?;
        }
        Ok(())
    }

    /// Move the conversion to the one-tap steps around the new current tap.
    fn update(&self, model: &mut LinearModel, activation: &dyn RangeActionActivationResult) -> LinearProblemResult<()> {
        for (state, ra, table) in self.psts() {
            let current_tap = activation.optimized_tap(ra, state);
            let current_angle = activation.optimized_setpoint(ra, state);
            let (min_tap, max_tap) = self.tap_range(ra, state, table);
            let max_down = (current_tap - min_tap).max(0);
            let max_up = (max_tap - current_tap).max(0);

            let up = model.variable(&VariableKey::pst_tap_variation(ra, state, VariationDirection::Upward))?;
            let down = model.variable(&VariableKey::pst_tap_variation(ra, state, VariationDirection::Downward))?;
            let anchor = table.clamped_angle(current_tap);

            let c = model.constraint(&ConstraintKey::tap_to_angle_conversion(ra, state))?;
            model.set_constraint_bounds(c, current_angle, current_angle)?;
            if let Some(next) = table.angle(current_tap + 1) {
                model.set_coefficient(c, up, -(next - anchor))?;
            }
            if let Some(previous) = table.angle(current_tap - 1) {
                model.set_coefficient(c, down, anchor - previous)?;
            }

            for (direction, max) in [
                (VariationDirection::Upward, max_up),
                (VariationDirection::Downward, max_down),
            ] {
                let binary = model.variable(&VariableKey::pst_tap_variation_binary(ra, state, direction))?;
                let c = model.constraint(&ConstraintKey::is_variation_in_direction(
                    ra,
                    state,
                    VariationReference::PreviousIteration,
                    direction,
                ))?;
                model.set_coefficient(c, binary, -(max as f64))?;
            }

            let c = model.constraint(&ConstraintKey::pst_tap(ra, state))?;
            model.set_constraint_bounds(c, current_tap as f64, current_tap as f64)?;
        }
        Ok(())
    }
}

impl ProblemFiller for DiscretePstTapFiller {
    fn id(&self) -> &str {
        &self.id
    }

    fn produces(&self) -> Vec<Family> {
        vec![Family::PstTap]
    }

    fn consumes(&self) -> Vec<Family> {
        vec![Family::RangeActionSetpoint]
    }

    fn requires_integers(&self) -> bool {
        true
    }

    fn fill(&mut self, model: &mut LinearModel, input: &FillInput<'_>) -> LinearProblemResult<()> {
        let mut count = 0;
        for (state, ra, table) in self.psts() {
            self.fill_pst(model, input.activation, state, ra, table)?;
            count += 1;
        }
        debug!("{}: {} PSTs modelled with integer taps", self.id, count);
        Ok(())
    }

    fn refresh_between_sensitivity_iteration(
        &mut self,
        model: &mut LinearModel,
        input: &FillInput<'_>,
    ) -> LinearProblemResult<()> {
        self.update(model, input.activation)
    }

    fn update_between_mip_iteration(
        &mut self,
        model: &mut LinearModel,
        activation: &dyn RangeActionActivationResult,
    ) -> LinearProblemResult<()> {
        self.update(model, activation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::testing::{integer_model, pst, Inputs};
    use crate::fillers::CoreProblemFiller;
    use rao_core::{
        Instant, PstModel, RangeActionActivation, RangeActionsParameters, RangeType,
    };

    fn parameters() -> RangeActionsParameters {
        RangeActionsParameters {
            pst_model: PstModel::ApproximatedIntegers,
            ..Default::default()
        }
    }

    #[test]
    fn test_conversion_uses_range_ends_then_one_tap_steps() {
        let state = State::preventive(Instant::preventive());
        let ra = pst("pst1", "pst-ne").into_arc();
        let perimeter = Arc::new(OptimizationPerimeter::new(state.clone()).with_range_action(state.clone(), ra.clone()));
        let setpoints = Arc::new(SetpointTable::new());
        let inputs = Inputs::new(setpoints.clone());

        let mut model = integer_model();
        CoreProblemFiller::new(perimeter.clone(), setpoints.clone(), parameters())
            .fill(&mut model, &inputs.input())
            .unwrap();
        let mut filler = DiscretePstTapFiller::new(perimeter, setpoints.clone());
        filler.fill(&mut model, &inputs.input()).unwrap();

        let c = model.constraint(&ConstraintKey::tap_to_angle_conversion(&ra, &state)).unwrap();
        let up = model
            .variable(&VariableKey::pst_tap_variation(&ra, &state, VariationDirection::Upward))
            .unwrap();
        let down = model
            .variable(&VariableKey::pst_tap_variation(&ra, &state, VariationDirection::Downward))
            .unwrap();
        assert_eq!(model.coefficient(c, up).unwrap(), -0.5);
        assert_eq!(model.coefficient(c, down).unwrap(), 0.5);
        assert_eq!(model.variable_ub(up).unwrap(), 32.0);

        // Solution moved to the top tap: no room left upwards
        let mut activation = RangeActionActivation::new(setpoints);
        activation.set_tap(&ra, &state, 16);
        filler.update_between_mip_iteration(&mut model, &activation).unwrap();

        assert_eq!(model.constraint_lb(c).unwrap(), 8.0);
        let up_binary = model
            .variable(&VariableKey::pst_tap_variation_binary(&ra, &state, VariationDirection::Upward))
            .unwrap();
        let authorization = model
            .constraint(&ConstraintKey::is_variation_in_direction(
                &ra,
                &state,
                VariationReference::PreviousIteration,
                VariationDirection::Upward,
            ))
            .unwrap();
        assert_eq!(model.coefficient(authorization, up_binary).unwrap(), 0.0);
        let tap = model.constraint(&ConstraintKey::pst_tap(&ra, &state)).unwrap();
        assert_eq!(model.constraint_lb(tap).unwrap(), 16.0);
    }

    #[test]
    fn test_relative_tap_limit_between_instants() {
        let preventive = State::preventive(Instant::preventive());
        let curative = State::after_contingency(Instant::curative(), "co1");
        let ra = pst("pst1", "pst-ne")
            .with_range(RangeType::RelativeToPreviousInstant, -3.0, 3.0)
            .into_arc();
        let perimeter = Arc::new(
            OptimizationPerimeter::new(preventive.clone())
                .with_range_action(preventive.clone(), ra.clone())
                .with_range_action(curative.clone(), ra.clone()),
        );
        let setpoints = Arc::new(SetpointTable::new());
        let inputs = Inputs::new(setpoints.clone());

        let mut model = integer_model();
        CoreProblemFiller::new(perimeter.clone(), setpoints.clone(), parameters())
            .fill(&mut model, &inputs.input())
            .unwrap();
        DiscretePstTapFiller::new(perimeter, setpoints)
            .fill(&mut model, &inputs.input())
            .unwrap();

        let c = model.constraint(&ConstraintKey::pst_relative_tap(&ra, &curative)).unwrap();
        let t_cur = model.variable(&VariableKey::pst_tap(&ra, &curative)).unwrap();
        let t_prev = model.variable(&VariableKey::pst_tap(&ra, &preventive)).unwrap();
        assert_eq!(model.coefficient(c, t_cur).unwrap(), 1.0);
        assert_eq!(model.coefficient(c, t_prev).unwrap(), -1.0);
        assert_eq!(model.constraint_lb(c).unwrap(), -3.0);
        assert_eq!(model.constraint_ub(c).unwrap(), 3.0);
        // Discrete PSTs carry no relative setpoint constraint
        assert!(model
            .find_constraint(&ConstraintKey::relative_setpoint(
                &ra,
                &curative,
                crate::ids::RangeShrinking::Disabled
            ))
            .is_none());
    }
}
