//! Monitored network elements ("flow CNECs").

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::state::State;

/// One of the two measurement points of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    One,
    Two,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::One => "one",
            Side::Two => "two",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flow limits on one side, in MW. A missing bound is unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// A monitored branch side in a given state.
///
/// Optimized CNECs enter the margin objective; monitored ones (MNECs) are
/// only protected against large margin decreases through a soft penalty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowCnec {
    id: String,
    network_element_id: String,
    state: State,
    bounds: BTreeMap<Side, FlowBounds>,
    optimized: bool,
    monitored: bool,
    operator: Option<String>,
    loop_flow_threshold: Option<f64>,
}

impl FlowCnec {
    pub fn new(id: impl Into<String>, network_element_id: impl Into<String>, state: State) -> Self {
        Self {
            id: id.into(),
            network_element_id: network_element_id.into(),
            state,
            bounds: BTreeMap::new(),
            optimized: true,
            monitored: false,
            operator: None,
            loop_flow_threshold: None,
        }
    }

    /// Monitor `side` with the given limits.
    pub fn with_bounds(mut self, side: Side, min: Option<f64>, max: Option<f64>) -> Self {
        self.bounds.insert(side, FlowBounds { min, max });
        self
    }

    pub fn with_optimized(mut self, optimized: bool) -> Self {
        self.optimized = optimized;
        self
    }

    pub fn with_monitored(mut self, monitored: bool) -> Self {
        self.monitored = monitored;
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Enable loop-flow limitation with a threshold in MW.
    pub fn with_loop_flow_threshold(mut self, threshold: f64) -> Self {
        self.loop_flow_threshold = Some(threshold);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn network_element_id(&self) -> &str {
        &self.network_element_id
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized
    }

    pub fn is_monitored(&self) -> bool {
        self.monitored
    }

    pub fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    pub fn loop_flow_threshold(&self) -> Option<f64> {
        self.loop_flow_threshold
    }

    /// Monitored sides, in order.
    pub fn sides(&self) -> impl Iterator<Item = Side> + '_ {
        self.bounds.keys().copied()
    }

    pub fn lower_bound(&self, side: Side) -> Option<f64> {
        self.bounds.get(&side).and_then(|b| b.min)
    }

    pub fn upper_bound(&self, side: Side) -> Option<f64> {
        self.bounds.get(&side).and_then(|b| b.max)
    }

    /// Distance from `flow` to the closest limit of `side`; infinite when
    /// the side is unbounded.
    pub fn margin(&self, side: Side, flow: f64) -> f64 {
        let below = self.lower_bound(side).map_or(f64::INFINITY, |lb| flow - lb);
        let above = self.upper_bound(side).map_or(f64::INFINITY, |ub| ub - flow);
        below.min(above)
    }

    /// Largest absolute finite limit over all sides, or 0 without limits.
    pub fn largest_threshold(&self) -> f64 {
        self.bounds
            .values()
            .flat_map(|b| [b.min, b.max])
            .flatten()
            .filter(|v| v.is_finite())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }
}

impl PartialEq for FlowCnec {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FlowCnec {}
