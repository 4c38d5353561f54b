//! Synchronisation of grouped PSTs in the integer tap model: every member
//! of a group takes the group's virtual tap.

use std::collections::BTreeMap;
use std::sync::Arc;

use rao_core::{OptimizationPerimeter, RangeAction};
use tracing::debug;

use crate::error::LinearProblemResult;
use crate::linear_problem::{ConstraintKey, Family, LinearModel, VariableKey};

use super::{FillInput, ProblemFiller};

pub struct DiscretePstGroupFiller {
    id: String,
    perimeter: Arc<OptimizationPerimeter>,
}

impl DiscretePstGroupFiller {
    pub fn new(perimeter: Arc<OptimizationPerimeter>) -> Self {
        Self {
            id: format!("discrete pst groups {}", perimeter.main_state()),
            perimeter,
        }
    }
}

impl ProblemFiller for DiscretePstGroupFiller {
    fn id(&self) -> &str {
        &self.id
    }

    fn produces(&self) -> Vec<Family> {
        vec![Family::VirtualTap]
    }

    fn consumes(&self) -> Vec<Family> {
        vec![Family::PstTap]
    }

    fn requires_integers(&self) -> bool {
        true
    }

    fn fill(&mut self, model: &mut LinearModel, _input: &FillInput<'_>) -> LinearProblemResult<()> {
        for (state, actions) in self.perimeter.range_actions_per_state() {
            let mut groups: BTreeMap<&str, Vec<&Arc<RangeAction>>> = BTreeMap::new();
            for ra in actions.iter().filter(|ra| ra.is_pst()) {
                if let Some(group) = ra.group_id() {
                    groups.entry(group).or_default().push(ra);
                }
            }

            for (group, members) in groups {
                // Common taps of all members
                let (lb, ub) = members
                    .iter()
                    .filter_map(|ra| ra.tap_table())
                    .fold((f64::NEG_INFINITY, f64::INFINITY), |(lb, ub), table| {
                        (lb.max(table.lowest_tap() as f64), ub.min(table.highest_tap() as f64))
                    });
                let virtual_tap = model.add_integer_variable(
                    VariableKey::VirtualTap {
                        group: group.to_string(),
                        state: state.clone(),
                    },
                    lb,
                    ub,
                )?;
                for ra in &members {
                    let tap = model.variable(&VariableKey::pst_tap(ra, state))?;
                    let c = model.add_constraint(
                        ConstraintKey::VirtualTap {
                            action: ra.id().to_string(),
                            group: group.to_string(),
                            state: state.clone(),
                        },
                        0.0,
                        0.0,
                    )?;
                    model.set_coefficient(c, tap, 1.0)?;
                    model.set_coefficient(c, virtual_tap, -1.0)?;
                }
                debug!("Group {} in state {}: {} PSTs share one tap", group, state, members.len());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::testing::{integer_model, pst, Inputs};
    use rao_core::{Instant, SetpointTable, State};

    #[test]
    fn test_group_members_share_virtual_tap() {
        let state = State::preventive(Instant::preventive());
        let a = pst("pstA", "ne-a").with_group("g1").into_arc();
        let b = pst("pstB", "ne-b").with_group("g1").into_arc();
        let lone = pst("pstC", "ne-c").into_arc();
        let perimeter = Arc::new(
            OptimizationPerimeter::new(state.clone())
                .with_range_action(state.clone(), a.clone())
                .with_range_action(state.clone(), b.clone())
                .with_range_action(state.clone(), lone.clone()),
        );
        let inputs = Inputs::new(Arc::new(SetpointTable::new()));
        let mut model = integer_model();
        for ra in [&a, &b, &lone] {
            model
                .add_integer_variable(VariableKey::pst_tap(ra, &state), -16.0, 16.0)
                .unwrap();
        }

        DiscretePstGroupFiller::new(perimeter)
            .fill(&mut model, &inputs.input())
            .unwrap();

        let vt = model
            .variable(&VariableKey::VirtualTap {
                group: "g1".into(),
                state: state.clone(),
            })
            .unwrap();
        assert_eq!(model.variable_lb(vt).unwrap(), -16.0);
        // One constraint per grouped PST
        assert_eq!(model.num_constraints(), 2);
        let c = model
            .constraint(&ConstraintKey::VirtualTap {
                action: "pstB".into(),
                group: "g1".into(),
                state,
            })
            .unwrap();
        assert_eq!(model.coefficient(c, vt).unwrap(), -1.0);
    }
}
