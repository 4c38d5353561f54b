//! Optimization perimeter: the states, monitored elements and candidate
//! actuators one linear problem covers (one perimeter per timestamp in
//! multi-period runs).

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::cnec::FlowCnec;
use crate::error::{RaoError, RaoResult};
use crate::range_action::RangeAction;
use crate::state::State;

#[derive(Debug, Clone)]
pub struct OptimizationPerimeter {
    main_state: State,
    flow_cnecs: Vec<Arc<FlowCnec>>,
    range_actions: BTreeMap<State, Vec<Arc<RangeAction>>>,
}

impl OptimizationPerimeter {
    pub fn new(main_state: State) -> Self {
        Self {
            main_state,
            flow_cnecs: Vec::new(),
            range_actions: BTreeMap::new(),
        }
    }

    pub fn with_cnec(mut self, cnec: Arc<FlowCnec>) -> Self {
        self.flow_cnecs.push(cnec);
        self.flow_cnecs.sort_by(|a, b| a.id().cmp(b.id()));
        self
    }

    /// Make `action` available in `state`.
    pub fn with_range_action(mut self, state: State, action: Arc<RangeAction>) -> Self {
        let actions = self.range_actions.entry(state).or_default();
        actions.push(action);
        actions.sort_by(|a, b| a.id().cmp(b.id()));
        self
    }

    pub fn main_state(&self) -> &State {
        &self.main_state
    }

    /// All flow CNECs, sorted by id.
    pub fn flow_cnecs(&self) -> &[Arc<FlowCnec>] {
        &self.flow_cnecs
    }

    pub fn optimized_cnecs(&self) -> impl Iterator<Item = &Arc<FlowCnec>> {
        self.flow_cnecs.iter().filter(|c| c.is_optimized())
    }

    pub fn monitored_cnecs(&self) -> impl Iterator<Item = &Arc<FlowCnec>> {
        self.flow_cnecs.iter().filter(|c| c.is_monitored())
    }

    pub fn loop_flow_cnecs(&self) -> impl Iterator<Item = &Arc<FlowCnec>> {
        self.flow_cnecs
            .iter()
            .filter(|c| c.loop_flow_threshold().is_some())
    }

    /// Actions per state, states in chronological order and actions by id.
    pub fn range_actions_per_state(&self) -> &BTreeMap<State, Vec<Arc<RangeAction>>> {
        &self.range_actions
    }

    /// Distinct actions over all states, by id.
    pub fn range_actions(&self) -> Vec<Arc<RangeAction>> {
        let mut seen = HashSet::new();
        let mut actions: Vec<_> = self
            .range_actions
            .values()
            .flatten()
            .filter(|ra| seen.insert(ra.id().to_string()))
            .cloned()
            .collect();
        actions.sort_by(|a, b| a.id().cmp(b.id()));
        actions
    }

    /// States of CNECs and actions, in chronological order.
    pub fn states(&self) -> BTreeSet<State> {
        self.flow_cnecs
            .iter()
            .map(|c| c.state().clone())
            .chain(self.range_actions.keys().cloned())
            .collect()
    }

    /// Action states that are `state` itself or precede it, latest first.
    pub fn states_up_to<'a>(&'a self, state: &'a State) -> impl Iterator<Item = &'a State> + 'a {
        self.range_actions
            .keys()
            .rev()
            .filter(move |s| *s == state || s.precedes(state))
    }

    /// Latest action on the same network element as `action`, available in
    /// a state strictly before `state`.
    pub fn last_available_range_action(
        &self,
        action: &RangeAction,
        state: &State,
    ) -> Option<(&Arc<RangeAction>, &State)> {
        self.range_actions
            .iter()
            .rev()
            .filter(|(s, _)| s.precedes(state))
            .find_map(|(s, actions)| {
                actions
                    .iter()
                    .find(|ra| ra.same_element_as(action))
                    .map(|ra| (ra, s))
            })
    }

    /// Reject duplicate CNEC ids and duplicate actions within a state.
    pub fn validate(&self) -> RaoResult<()> {
        let mut ids = HashSet::new();
        for cnec in &self.flow_cnecs {
            if !ids.insert(cnec.id()) {
                return Err(RaoError::Validation(format!(
                    "flow cnec {} is defined twice",
                    cnec.id()
                )));
            }
        }
        for (state, actions) in &self.range_actions {
            let mut ids = HashSet::new();
            for ra in actions {
                if !ids.insert(ra.id()) {
                    return Err(RaoError::Validation(format!(
                        "range action {} is available twice in state {}",
                        ra.id(),
                        state
                    )));
                }
            }
        }
        Ok(())
    }
}
