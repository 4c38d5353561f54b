//! Limits on how many actions, operators and PST taps an optimization may
//! use per instant.
//!
//! Every action in a limited scope gets an "is used" binary `b` with
//!
//! ```text
//! up + down - M · b <= relaxation
//! ```
//!
//! where `M` is the width of its admissible setpoint range. Counts are
//! cumulative: a curative state also counts the actions of earlier curative
//! instants after the same contingency.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rao_core::{OptimizationPerimeter, RaUsageLimits, RangeAction, SetpointTable, State};
use tracing::{debug, warn};

use crate::error::{LinearProblemError, LinearProblemResult};
use crate::ids::{AbsExtension, VariationDirection};
use crate::linear_problem::{ConstraintKey, Family, LinearModel, VariableKey};
use crate::solver::VariableId;

use super::{FillInput, ProblemFiller};

const SETPOINT_EPSILON: f64 = 1e-4;

/// Share of the average angle step a PST may drift without counting as used.
const PST_RELAXATION_FACTOR: f64 = 0.3;

pub struct RaUsageLimitsFiller {
    id: String,
    perimeter: Arc<OptimizationPerimeter>,
    pre_perimeter_setpoints: Arc<SetpointTable>,
    /// Limits per instant id
    limits: BTreeMap<String, RaUsageLimits>,
    approximated_integers: bool,
}

impl RaUsageLimitsFiller {
    pub fn new(
        perimeter: Arc<OptimizationPerimeter>,
        pre_perimeter_setpoints: Arc<SetpointTable>,
        limits: BTreeMap<String, RaUsageLimits>,
        approximated_integers: bool,
    ) -> Self {
        Self {
            id: format!("ra usage limits {}", perimeter.main_state()),
            perimeter,
            pre_perimeter_setpoints,
            limits: limits.into_iter().filter(|(_, l)| l.is_limiting()).collect(),
            approximated_integers,
        }
    }

    fn limits_for(&self, state: &State) -> Option<&RaUsageLimits> {
        self.limits.get(state.instant().id())
    }

    fn limited_states(&self) -> impl Iterator<Item = (&State, &RaUsageLimits)> {
        self.perimeter
            .range_actions_per_state()
            .keys()
            .filter_map(|state| self.limits_for(state).map(|limits| (state, limits)))
    }

    /// States whose actions count towards the limits of `state`.
    fn scope<'a>(&'a self, state: &'a State) -> Vec<&'a State> {
        let same_period = |s: &State| s.timestamp() == state.timestamp();
        let states = self.perimeter.range_actions_per_state().keys();
        if state.instant().is_curative() {
            states
                .filter(|s| {
                    s.instant().is_curative()
                        && s.contingency() == state.contingency()
                        && s.instant().order() <= state.instant().order()
                        && same_period(s)
                })
                .collect()
        } else if state.is_preventive() {
            states.filter(|s| s.is_preventive() && same_period(s)).collect()
        } else {
            vec![state]
        }
    }

    fn scoped_actions<'a>(&'a self, scope: &[&'a State]) -> Vec<(&'a State, &'a Arc<RangeAction>)> {
        scope
            .iter()
            .flat_map(|state| {
                self.perimeter
                    .range_actions_per_state()
                    .get(*state)
                    .into_iter()
                    .flatten()
                    .map(move |ra| (*state, ra))
            })
            .collect()
    }

    fn build_is_variation(&self, model: &mut LinearModel, ra: &RangeAction, state: &State) -> LinearProblemResult<()> {
        let binary = model.add_binary_variable(VariableKey::range_action_variation_binary(ra, state))?;
        let up = model.variable(&VariableKey::setpoint_variation(ra, state, VariationDirection::Upward))?;
        let down = model.variable(&VariableKey::setpoint_variation(ra, state, VariationDirection::Downward))?;

        let pre = self.pre_perimeter_setpoints.setpoint(ra);
        let big_m = ra.max_admissible_setpoint(pre) + SETPOINT_EPSILON - ra.min_admissible_setpoint(pre);
        if !big_m.is_finite() {
            return Err(LinearProblemError::InvalidInput(format!(
                "range action {} has an unbounded setpoint range and cannot be counted in usage limits",
                ra.id()
            )));
        }
        let relaxation = match ra.tap_table() {
            Some(table) if self.approximated_integers => PST_RELAXATION_FACTOR * table.average_angle_step(),
            _ => SETPOINT_EPSILON,
        };

        let c = model.add_constraint(
            ConstraintKey::IsVariation {
                action: ra.id().to_string(),
                state: state.clone(),
            },
            f64::NEG_INFINITY,
            relaxation,
        )?;
        model.set_coefficient(c, up, 1.0)?;
        model.set_coefficient(c, down, 1.0)?;
        model.set_coefficient(c, binary, -big_m)?;
        Ok(())
    }

    /// sum(b) <= max over `actions`, skipped when the limit cannot bind.
    fn add_count_limit(
        model: &mut LinearModel,
        key: ConstraintKey,
        actions: &[(&State, &Arc<RangeAction>)],
        max: usize,
    ) -> LinearProblemResult<()> {
        if max >= actions.len() {
            return Ok(());
        }
        let c = model.add_constraint(key, 0.0, max as f64)?;
        for (state, ra) in actions {
            let binary = model.variable(&VariableKey::range_action_variation_binary(ra, state))?;
            model.set_coefficient(c, binary, 1.0)?;
        }
        Ok(())
    }

    /// Variable set to 1 as soon as one action of `operator` is used in
    /// `state`.
    fn tso_ra_used(
        model: &mut LinearModel,
        operator: &str,
        state: &State,
        actions: &[&Arc<RangeAction>],
    ) -> LinearProblemResult<VariableId> {
        let key = VariableKey::TsoRaUsed {
            operator: operator.to_string(),
            state: state.clone(),
        };
        if let Some(existing) = model.find_variable(&key) {
            return Ok(existing);
        }
        let used = model.add_continuous_variable(key, 0.0, 1.0)?;
        for ra in actions {
            let binary = model.variable(&VariableKey::range_action_variation_binary(ra, state))?;
            let c = model.add_constraint(
                ConstraintKey::TsoRaUsed {
                    operator: operator.to_string(),
                    action: ra.id().to_string(),
                    state: state.clone(),
                },
                0.0,
                f64::INFINITY,
            )?;
            model.set_coefficient(c, used, 1.0)?;
            model.set_coefficient(c, binary, -1.0)?;
        }
        Ok(used)
    }

    fn add_max_tso(
        &self,
        model: &mut LinearModel,
        state: &State,
        actions: &[(&State, &Arc<RangeAction>)],
        max_tso: usize,
        exclusions: &BTreeSet<String>,
    ) -> LinearProblemResult<()> {
        let mut per_operator: BTreeMap<&str, BTreeMap<&State, Vec<&Arc<RangeAction>>>> = BTreeMap::new();
        for (s, ra) in actions {
            match ra.operator() {
                Some(operator) if !exclusions.contains(operator) => {
                    per_operator.entry(operator).or_default().entry(*s).or_default().push(*ra);
                }
                _ => {}
            }
        }
        if max_tso >= per_operator.len() {
            return Ok(());
        }

        let max = model.add_constraint(ConstraintKey::MaxTso { state: state.clone() }, 0.0, max_tso as f64)?;
        for (operator, states) in per_operator {
            let cumulative = model.add_continuous_variable(
                VariableKey::TsoRaUsedCumulative {
                    operator: operator.to_string(),
                    state: state.clone(),
                },
                0.0,
                1.0,
            )?;
            model.set_coefficient(max, cumulative, 1.0)?;
            let c = model.add_constraint(
                ConstraintKey::TsoRaUsedCumulative {
                    operator: operator.to_string(),
                    state: state.clone(),
                },
                0.0,
                f64::INFINITY,
            )?;
            model.set_coefficient(c, cumulative, 1.0)?;
            for (s, operator_actions) in states {
                let used = Self::tso_ra_used(model, operator, s, &operator_actions)?;
                model.set_coefficient(c, used, -1.0)?;
            }
        }
        Ok(())
    }

    /// Sum over the operator's PSTs of |T - initial tap| <= max.
    fn add_max_elementary_actions(
        &self,
        model: &mut LinearModel,
        state: &State,
        operator: &str,
        max: usize,
    ) -> LinearProblemResult<()> {
        let psts: Vec<_> = self
            .perimeter
            .range_actions_per_state()
            .get(state)
            .into_iter()
            .flatten()
            .filter(|ra| ra.is_pst() && ra.operator() == Some(operator))
            .collect();
        if psts.is_empty() {
            return Ok(());
        }
        let limit = model.add_constraint(
            ConstraintKey::MaxElementaryActionsPerTso {
                operator: operator.to_string(),
                state: state.clone(),
            },
            0.0,
            max as f64,
        )?;
        for ra in psts {
            let tap = model.variable(&VariableKey::pst_tap(ra, state))?;
            let initial = self.pre_perimeter_setpoints.tap(ra) as f64;
            let absolute = model.add_continuous_variable(
                VariableKey::pst_absolute_variation_from_initial_tap(ra, state),
                0.0,
                f64::INFINITY,
            )?;
            model.set_coefficient(limit, absolute, 1.0)?;

            // a >= T - initial and a >= initial - T
            let positive = model.add_constraint(
                ConstraintKey::pst_absolute_variation_from_initial_tap(ra, state, AbsExtension::Positive),
                -initial,
                f64::INFINITY,
            )?;
            model.set_coefficient(positive, absolute, 1.0)?;
            model.set_coefficient(positive, tap, -1.0)?;
            let negative = model.add_constraint(
                ConstraintKey::pst_absolute_variation_from_initial_tap(ra, state, AbsExtension::Negative),
                initial,
                f64::INFINITY,
            )?;
            model.set_coefficient(negative, absolute, 1.0)?;
            model.set_coefficient(negative, tap, 1.0)?;
        }
        Ok(())
    }
}

impl ProblemFiller for RaUsageLimitsFiller {
    fn id(&self) -> &str {
        &self.id
    }

    fn produces(&self) -> Vec<Family> {
        vec![Family::RangeActionVariationBinary, Family::UsageLimit]
    }

    fn consumes(&self) -> Vec<Family> {
        let elementary = self
            .limits
            .values()
            .any(|l| !l.max_elementary_actions_per_tso.is_empty());
        if elementary && self.approximated_integers {
            vec![Family::RangeActionVariation, Family::PstTap]
        } else {
            vec![Family::RangeActionVariation]
        }
    }

    fn requires_integers(&self) -> bool {
        true
    }

    fn fill(&mut self, model: &mut LinearModel, _input: &FillInput<'_>) -> LinearProblemResult<()> {
        let limited: Vec<_> = self.limited_states().collect();
        let counted: BTreeSet<&State> = limited.iter().flat_map(|(state, _)| self.scope(state)).collect();
        for state in &counted {
            for ra in self.perimeter.range_actions_per_state().get(*state).into_iter().flatten() {
                self.build_is_variation(model, ra, state)?;
            }
        }

        for (state, limits) in limited {
            let scope = self.scope(state);
            let actions = self.scoped_actions(&scope);

            if let Some(max_ra) = limits.max_ra {
                Self::add_count_limit(model, ConstraintKey::MaxRa { state: state.clone() }, &actions, max_ra)?;
            }
            if let Some(max_tso) = limits.max_tso {
                self.add_max_tso(model, state, &actions, max_tso, &limits.max_tso_exclusion)?;
            }
            for (operator, max) in &limits.max_ra_per_tso {
                let own: Vec<_> = actions
                    .iter()
                    .filter(|(_, ra)| ra.operator() == Some(operator.as_str()))
                    .copied()
                    .collect();
                let key = ConstraintKey::MaxRaPerTso {
                    operator: operator.clone(),
                    state: state.clone(),
                };
                Self::add_count_limit(model, key, &own, *max)?;
            }
            for (operator, max) in &limits.max_pst_per_tso {
                let own: Vec<_> = actions
                    .iter()
                    .filter(|(_, ra)| ra.is_pst() && ra.operator() == Some(operator.as_str()))
                    .copied()
                    .collect();
                let key = ConstraintKey::MaxPstPerTso {
                    operator: operator.clone(),
                    state: state.clone(),
                };
                Self::add_count_limit(model, key, &own, *max)?;
            }
            if !limits.max_elementary_actions_per_tso.is_empty() {
                if self.approximated_integers {
                    for (operator, max) in &limits.max_elementary_actions_per_tso {
                        self.add_max_elementary_actions(model, state, operator, *max)?;
                    }
                } else {
                    warn!(
                        "Elementary action limits of state {} ignored: they need the integer tap model",
                        state
                    );
                }
            }
            debug!("Usage limits of state {} cover {} actions", state, actions.len());
        }
        Ok(())
    }
}
