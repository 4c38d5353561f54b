//! Coupling of consecutive timestamps in multi-period runs.
//!
//! An action whose network element is also actionable in the main state of
//! the previous period may only move by its timestamp gradient between the
//! two periods. In the integer tap model the gradient applies to tap
//! variables, otherwise to setpoints (converted with the smallest angle
//! step for PSTs).

use std::sync::Arc;

use rao_core::{OptimizationPerimeter, RangeAction, State};
use tracing::debug;

use crate::error::LinearProblemResult;
use crate::linear_problem::{ConstraintKey, Family, LinearModel, VariableKey};

use super::{FillInput, ProblemFiller};

pub struct BetweenTimestampsFiller {
    /// Perimeters sorted by timestamp
    perimeters: Vec<Arc<OptimizationPerimeter>>,
    approximated_integers: bool,
}

impl BetweenTimestampsFiller {
    pub fn new(perimeters: Vec<Arc<OptimizationPerimeter>>, approximated_integers: bool) -> Self {
        Self {
            perimeters,
            approximated_integers,
        }
    }

    fn main_state_actions(perimeter: &OptimizationPerimeter) -> impl Iterator<Item = &Arc<RangeAction>> {
        perimeter
            .range_actions_per_state()
            .get(perimeter.main_state())
            .into_iter()
            .flatten()
    }

    fn couple(
        &self,
        model: &mut LinearModel,
        ra: &RangeAction,
        state: &State,
        previous_ra: &RangeAction,
        previous_state: &State,
        (min, max): (f64, f64),
    ) -> LinearProblemResult<()> {
        let (current, previous, lb, ub) = match ra.tap_table() {
            Some(_) if self.approximated_integers => (
                model.variable(&VariableKey::pst_tap(ra, state))?,
                model.variable(&VariableKey::pst_tap(previous_ra, previous_state))?,
                min,
                max,
            ),
            Some(table) => {
                let step = table.smallest_angle_step();
                (
                    model.variable(&VariableKey::setpoint(ra, state))?,
                    model.variable(&VariableKey::setpoint(previous_ra, previous_state))?,
                    min * step,
                    max * step,
                )
            }
            None => (
                model.variable(&VariableKey::setpoint(ra, state))?,
                model.variable(&VariableKey::setpoint(previous_ra, previous_state))?,
                min,
                max,
            ),
        };
        let c = model.add_constraint(
            ConstraintKey::TimestampGradient {
                action: ra.id().to_string(),
                state: state.clone(),
            },
            lb,
            ub,
        )?;
        model.set_coefficient(c, current, 1.0)?;
        model.set_coefficient(c, previous, -1.0)?;
        Ok(())
    }
}

impl ProblemFiller for BetweenTimestampsFiller {
    fn id(&self) -> &str {
        "between timestamps"
    }

    fn produces(&self) -> Vec<Family> {
        vec![Family::TimestampCoupling]
    }

    fn consumes(&self) -> Vec<Family> {
        if self.approximated_integers {
            vec![Family::RangeActionSetpoint, Family::PstTap]
        } else {
            vec![Family::RangeActionSetpoint]
        }
    }

    fn fill(&mut self, model: &mut LinearModel, _input: &FillInput<'_>) -> LinearProblemResult<()> {
        let mut count = 0;
        for pair in self.perimeters.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);
            for ra in Self::main_state_actions(current) {
                let Some(gradient) = ra.timestamp_gradient() else {
                    continue;
                };
                let Some(previous_ra) = Self::main_state_actions(previous).find(|p| p.same_element_as(ra)) else {
                    continue;
                };
                self.couple(model, ra, current.main_state(), previous_ra, previous.main_state(), gradient)?;
                count += 1;
            }
        }
        debug!("{} timestamp gradient constraints over {} periods", count, self.perimeters.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::testing::{model, pst, Inputs};
    use chrono::{TimeZone, Utc};
    use rao_core::{Instant, RangeType, SetpointTable};

    fn state(hour: u32) -> State {
        State::preventive(Instant::preventive()).with_timestamp(Utc.with_ymd_and_hms(2025, 3, 9, hour, 0, 0).unwrap())
    }

    #[test]
    fn test_setpoint_gradient_between_periods() {
        let ra = pst("pst1", "pst-ne")
            .with_range(RangeType::RelativeToPreviousTimestamp, -2.0, 2.0)
            .into_arc();
        let (s1, s2) = (state(0), state(1));
        let perimeters = vec![
            Arc::new(OptimizationPerimeter::new(s1.clone()).with_range_action(s1.clone(), ra.clone())),
            Arc::new(OptimizationPerimeter::new(s2.clone()).with_range_action(s2.clone(), ra.clone())),
        ];
        let inputs = Inputs::new(Arc::new(SetpointTable::new()));
        let mut model = model();
        for s in [&s1, &s2] {
            model
                .add_continuous_variable(VariableKey::setpoint(&ra, s), -8.0, 8.0)
                .unwrap();
        }

        BetweenTimestampsFiller::new(perimeters, false)
            .fill(&mut model, &inputs.input())
            .unwrap();

        let c = model
            .constraint(&ConstraintKey::TimestampGradient {
                action: "pst1".into(),
                state: s2.clone(),
            })
            .unwrap();
        // Two taps of 0.5 degree
        assert_eq!(model.constraint_lb(c).unwrap(), -1.0);
        assert_eq!(model.constraint_ub(c).unwrap(), 1.0);
        let previous = model.variable(&VariableKey::setpoint(&ra, &s1)).unwrap();
        assert_eq!(model.coefficient(c, previous).unwrap(), -1.0);
        assert!(model.solver().constraint_name(c).unwrap().contains("202503090100"));
    }

    #[test]
    fn test_action_without_gradient_is_free() {
        let ra = pst("pst1", "pst-ne").into_arc();
        let (s1, s2) = (state(0), state(1));
        let perimeters = vec![
            Arc::new(OptimizationPerimeter::new(s1.clone()).with_range_action(s1, ra.clone())),
            Arc::new(OptimizationPerimeter::new(s2.clone()).with_range_action(s2, ra)),
        ];
        let inputs = Inputs::new(Arc::new(SetpointTable::new()));
        let mut model = model();
        BetweenTimestampsFiller::new(perimeters, false)
            .fill(&mut model, &inputs.input())
            .unwrap();
        assert_eq!(model.num_constraints(), 0);
    }
}
