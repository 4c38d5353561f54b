//! Synchronisation of grouped actions with continuous setpoints: every
//! member of a group takes the group's virtual setpoint.
//!
//! With integer PST taps, PST groups are synchronised on taps instead and
//! this filler only covers the other grouped actions.

use std::collections::BTreeMap;
use std::sync::Arc;

use rao_core::{OptimizationPerimeter, RangeAction};
use tracing::debug;

use crate::error::LinearProblemResult;
use crate::linear_problem::{ConstraintKey, Family, LinearModel, VariableKey};

use super::{FillInput, ProblemFiller};

pub struct ContinuousGroupFiller {
    id: String,
    perimeter: Arc<OptimizationPerimeter>,
    skip_psts: bool,
}

impl ContinuousGroupFiller {
    pub fn new(perimeter: Arc<OptimizationPerimeter>) -> Self {
        Self {
            id: format!("continuous groups {}", perimeter.main_state()),
            perimeter,
            skip_psts: false,
        }
    }

    /// Leave PST groups to the tap synchronisation.
    pub fn without_psts(mut self) -> Self {
        self.skip_psts = true;
        self
    }
}

impl ProblemFiller for ContinuousGroupFiller {
    fn id(&self) -> &str {
        &self.id
    }

    fn produces(&self) -> Vec<Family> {
        vec![Family::VirtualSetpoint]
    }

    fn consumes(&self) -> Vec<Family> {
        vec![Family::RangeActionSetpoint]
    }

    fn fill(&mut self, model: &mut LinearModel, _input: &FillInput<'_>) -> LinearProblemResult<()> {
        for (state, actions) in self.perimeter.range_actions_per_state() {
            let mut groups: BTreeMap<&str, Vec<&Arc<RangeAction>>> = BTreeMap::new();
            for ra in actions.iter().filter(|ra| !(self.skip_psts && ra.is_pst())) {
                if let Some(group) = ra.group_id() {
                    groups.entry(group).or_default().push(ra);
                }
            }
            for (group, members) in groups {
                let virtual_setpoint = model.add_continuous_variable(
                    VariableKey::VirtualSetpoint {
                        group: group.to_string(),
                        state: state.clone(),
                    },
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                )?;
                for ra in &members {
                    let setpoint = model.variable(&VariableKey::setpoint(ra, state))?;
                    let c = model.add_constraint(
                        ConstraintKey::VirtualSetpoint {
                            action: ra.id().to_string(),
                            group: group.to_string(),
                            state: state.clone(),
                        },
                        0.0,
                        0.0,
                    )?;
                    model.set_coefficient(c, setpoint, 1.0)?;
                    model.set_coefficient(c, virtual_setpoint, -1.0)?;
                }
                debug!("Group {} in state {}: {} actions share one setpoint", group, state, members.len());
            }
        }
        Ok(())
    }
}
