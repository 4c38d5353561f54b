//! Result providers consumed by the linear optimizer.
//!
//! Flows and sensitivities come from an external power-flow engine; the
//! traits here are the narrow read-only views the optimizer needs. The
//! in-memory tables implement them for tests and for callers that already
//! hold the numbers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cnec::{FlowCnec, Side};
use crate::range_action::RangeAction;
use crate::state::State;

/// Outcome of the sensitivity computation for one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationStatus {
    Default,
    Failure,
}

/// Flows on monitored elements, in MW.
pub trait FlowResult: Send + Sync {
    /// Flow on `side`; NaN when unknown.
    fn flow(&self, cnec: &FlowCnec, side: Side) -> f64;

    fn margin(&self, cnec: &FlowCnec, side: Side) -> f64 {
        cnec.margin(side, self.flow(cnec, side))
    }

    /// Commercial flow on `side`; NaN when unknown.
    fn commercial_flow(&self, cnec: &FlowCnec, side: Side) -> f64;

    /// Sum of absolute zonal PTDFs, used to normalise relative margins.
    fn ptdf_zonal_sum(&self, cnec: &FlowCnec, side: Side) -> f64;

    fn loop_flow(&self, cnec: &FlowCnec, side: Side) -> f64 {
        self.flow(cnec, side) - self.commercial_flow(cnec, side)
    }
}

/// Sensitivities of flows to actuator setpoints.
pub trait SensitivityResult: Send + Sync {
    /// d(flow on `side`) / d(setpoint of `action`), in MW per setpoint unit.
    fn sensitivity(&self, cnec: &FlowCnec, side: Side, action: &RangeAction) -> f64;

    fn status(&self, state: &State) -> ComputationStatus;
}

/// Setpoints and taps chosen so far, per action and state.
pub trait RangeActionActivationResult: Send + Sync {
    fn optimized_setpoint(&self, action: &RangeAction, state: &State) -> f64;

    fn optimized_tap(&self, action: &RangeAction, state: &State) -> i32;
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FlowEntry {
    flow: f64,
    commercial_flow: f64,
    ptdf_zonal_sum: f64,
}

impl Default for FlowEntry {
    fn default() -> Self {
        Self {
            flow: f64::NAN,
            commercial_flow: f64::NAN,
            ptdf_zonal_sum: 1.0,
        }
    }
}

/// In-memory [`FlowResult`] keyed by CNEC id and side.
#[derive(Debug, Clone, Default)]
pub struct FlowTable {
    entries: HashMap<(String, Side), FlowEntry>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, cnec_id: &str, side: Side) -> &mut FlowEntry {
        self.entries.entry((cnec_id.to_string(), side)).or_default()
    }

    pub fn with_flow(mut self, cnec_id: &str, side: Side, flow: f64) -> Self {
        self.entry(cnec_id, side).flow = flow;
        self
    }

    pub fn with_commercial_flow(mut self, cnec_id: &str, side: Side, flow: f64) -> Self {
        self.entry(cnec_id, side).commercial_flow = flow;
        self
    }

    pub fn with_ptdf_zonal_sum(mut self, cnec_id: &str, side: Side, sum: f64) -> Self {
        self.entry(cnec_id, side).ptdf_zonal_sum = sum;
        self
    }

    pub fn set_flow(&mut self, cnec_id: &str, side: Side, flow: f64) {
        self.entry(cnec_id, side).flow = flow;
    }

    fn get(&self, cnec: &FlowCnec, side: Side) -> FlowEntry {
        self.entries
            .get(&(cnec.id().to_string(), side))
            .copied()
            .unwrap_or_default()
    }
}

impl FlowResult for FlowTable {
    fn flow(&self, cnec: &FlowCnec, side: Side) -> f64 {
        self.get(cnec, side).flow
    }

    fn commercial_flow(&self, cnec: &FlowCnec, side: Side) -> f64 {
        self.get(cnec, side).commercial_flow
    }

    fn ptdf_zonal_sum(&self, cnec: &FlowCnec, side: Side) -> f64 {
        self.get(cnec, side).ptdf_zonal_sum
    }
}

/// In-memory [`SensitivityResult`]. Missing sensitivities are zero.
#[derive(Debug, Clone, Default)]
pub struct SensitivityTable {
    values: HashMap<(String, Side, String), f64>,
    failed_states: HashSet<State>,
}

impl SensitivityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sensitivity(mut self, cnec_id: &str, side: Side, action_id: &str, value: f64) -> Self {
        self.set_sensitivity(cnec_id, side, action_id, value);
        self
    }

    pub fn set_sensitivity(&mut self, cnec_id: &str, side: Side, action_id: &str, value: f64) {
        self.values
            .insert((cnec_id.to_string(), side, action_id.to_string()), value);
    }

    pub fn with_failed_state(mut self, state: State) -> Self {
        self.failed_states.insert(state);
        self
    }
}

impl SensitivityResult for SensitivityTable {
    fn sensitivity(&self, cnec: &FlowCnec, side: Side, action: &RangeAction) -> f64 {
        self.values
            .get(&(cnec.id().to_string(), side, action.id().to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    fn status(&self, state: &State) -> ComputationStatus {
        if self.failed_states.contains(state) {
            ComputationStatus::Failure
        } else {
            ComputationStatus::Default
        }
    }
}

/// Setpoints and taps of the network the optimization starts from
/// ("pre-perimeter"). Actions without an entry use their initial setpoint.
#[derive(Debug, Clone, Default)]
pub struct SetpointTable {
    setpoints: HashMap<String, f64>,
}

impl SetpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setpoint(mut self, action_id: &str, setpoint: f64) -> Self {
        self.setpoints.insert(action_id.to_string(), setpoint);
        self
    }

    pub fn setpoint(&self, action: &RangeAction) -> f64 {
        self.setpoints
            .get(action.id())
            .copied()
            .unwrap_or_else(|| action.initial_setpoint())
    }

    /// Tap closest to the setpoint, or 0 for non-PST actions.
    pub fn tap(&self, action: &RangeAction) -> i32 {
        action
            .tap_table()
            .map_or(0, |table| table.closest_tap(self.setpoint(action)))
    }
}

/// Activation chosen by an optimization, on top of a reference
/// [`SetpointTable`].
///
/// A state without its own value inherits the latest value set in a state
/// that precedes it, then the reference setpoint.
#[derive(Debug, Clone)]
pub struct RangeActionActivation {
    reference: Arc<SetpointTable>,
    setpoints: HashMap<(String, State), f64>,
    taps: HashMap<(String, State), i32>,
}

impl RangeActionActivation {
    pub fn new(reference: Arc<SetpointTable>) -> Self {
        Self {
            reference,
            setpoints: HashMap::new(),
            taps: HashMap::new(),
        }
    }

    pub fn reference(&self) -> &Arc<SetpointTable> {
        &self.reference
    }

    pub fn set_setpoint(&mut self, action: &RangeAction, state: &State, setpoint: f64) {
        self.setpoints
            .insert((action.id().to_string(), state.clone()), setpoint);
    }

    /// Record a tap; the setpoint becomes the tap's angle.
    pub fn set_tap(&mut self, action: &RangeAction, state: &State, tap: i32) {
        if let Some(table) = action.tap_table() {
            self.set_setpoint(action, state, table.clamped_angle(tap));
        }
        self.taps.insert((action.id().to_string(), state.clone()), tap);
    }

    /// Whether `action` has its own value in `state`.
    pub fn is_set(&self, action: &RangeAction, state: &State) -> bool {
        self.setpoints
            .contains_key(&(action.id().to_string(), state.clone()))
    }

    /// Largest setpoint difference with `other` over every recorded entry
    /// of either activation.
    pub fn max_setpoint_difference(&self, other: &RangeActionActivation) -> f64 {
        self.setpoints
            .iter()
            .map(|(key, value)| (value, other.setpoints.get(key)))
            .chain(
                other
                    .setpoints
                    .iter()
                    .map(|(key, value)| (value, self.setpoints.get(key))),
            )
            .map(|(value, counterpart)| match counterpart {
                Some(c) => (value - c).abs(),
                None => f64::INFINITY,
            })
            .fold(0.0, f64::max)
    }

    fn inherited<T: Copy>(
        map: &HashMap<(String, State), T>,
        action: &RangeAction,
        state: &State,
    ) -> Option<T> {
        if let Some(value) = map.get(&(action.id().to_string(), state.clone())) {
            return Some(*value);
        }
        map.iter()
            .filter(|((id, s), _)| id == action.id() && s.precedes(state))
            .max_by(|((_, a), _), ((_, b), _)| a.cmp(b))
            .map(|(_, value)| *value)
    }
}

impl RangeActionActivationResult for RangeActionActivation {
    fn optimized_setpoint(&self, action: &RangeAction, state: &State) -> f64 {
        Self::inherited(&self.setpoints, action, state)
            .unwrap_or_else(|| self.reference.setpoint(action))
    }

    fn optimized_tap(&self, action: &RangeAction, state: &State) -> i32 {
        if let Some(tap) = Self::inherited(&self.taps, action, state) {
            return tap;
        }
        match action.tap_table() {
            Some(table) => table.closest_tap(self.optimized_setpoint(action, state)),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Instant;
    use crate::tap::TapTable;

    #[test]
    fn test_flow_table_defaults() {
        let cnec = FlowCnec::new("c", "ne", State::preventive(Instant::preventive()))
            .with_bounds(Side::One, Some(-100.0), Some(100.0));
        let flows = FlowTable::new().with_flow("c", Side::One, 40.0);
        assert_eq!(flows.flow(&cnec, Side::One), 40.0);
        assert_eq!(flows.margin(&cnec, Side::One), 60.0);
        assert!(flows.flow(&cnec, Side::Two).is_nan());
        assert!(flows.commercial_flow(&cnec, Side::One).is_nan());
        assert_eq!(flows.ptdf_zonal_sum(&cnec, Side::One), 1.0);
    }

    #[test]
    fn test_sensitivity_status() {
        let failed = State::after_contingency(Instant::curative(), "co");
        let table = SensitivityTable::new().with_failed_state(failed.clone());
        assert_eq!(table.status(&failed), ComputationStatus::Failure);
        assert_eq!(
            table.status(&State::preventive(Instant::preventive())),
            ComputationStatus::Default
        );
    }

    #[test]
    fn test_activation_inherits_from_previous_state() {
        let preventive = State::preventive(Instant::preventive());
        let curative = State::after_contingency(Instant::curative(), "co");
        let pst = RangeAction::pst("pst", "ne", TapTable::linear(-5, 5, 1.0, 0).unwrap());
        let mut activation = RangeActionActivation::new(Arc::new(SetpointTable::new()));

        assert_eq!(activation.optimized_setpoint(&pst, &curative), 0.0);
        activation.set_tap(&pst, &preventive, 3);
        assert_eq!(activation.optimized_setpoint(&pst, &curative), 3.0);
        assert_eq!(activation.optimized_tap(&pst, &curative), 3);
        assert!(!activation.is_set(&pst, &curative));
    }

    #[test]
    fn test_max_setpoint_difference() {
        let state = State::preventive(Instant::preventive());
        let ra = RangeAction::hvdc("hvdc", "line", 0.0);
        let reference = Arc::new(SetpointTable::new());
        let mut a = RangeActionActivation::new(reference.clone());
        let mut b = RangeActionActivation::new(reference);
        assert_eq!(a.max_setpoint_difference(&b), 0.0);
        a.set_setpoint(&ra, &state, 10.0);
        assert!(a.max_setpoint_difference(&b).is_infinite());
        b.set_setpoint(&ra, &state, 12.5);
        assert_eq!(a.max_setpoint_difference(&b), 2.5);
    }
}
