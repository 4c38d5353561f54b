//! Identifier scheme for variables and constraints.
//!
//! Every name is a pure function of the entity ids, the state, the side and
//! the extension tags, joined with `_` and closed by `variable` or
//! `constraint`. Side and tag tokens are lower-case single words; entity
//! and state ids are kept verbatim. States of multi-period runs add their
//! timestamp (`yyyyMMddHHmm`) just before the suffix.
//!
//! Each logical quantity has its own kind token, so two quantities never
//! share a name through bounds or coefficients alone. The scheme does not
//! escape `_` inside entity ids: ids are expected not to end or start with
//! a separator-delimited kind token.
//!
//! Names serve lookups by name and diagnostics; the linear problem itself
//! addresses variables through typed keys and handles.

use chrono::{DateTime, Utc};
use rao_core::{Side, State};

pub const SEPARATOR: &str = "_";
const VARIABLE_SUFFIX: &str = "variable";
const CONSTRAINT_SUFFIX: &str = "constraint";

/// Part of an absolute-value split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbsExtension {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariationDirection {
    Upward,
    Downward,
}

/// Point a variation is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariationReference {
    PreviousIteration,
    PrePerimeter,
}

/// Side of a threshold a margin constraint protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarginExtension {
    BelowThreshold,
    AboveThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoundExtension {
    LowerBound,
    UpperBound,
}

/// Whether a relative setpoint constraint comes from iterative range
/// shrinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RangeShrinking {
    Enabled,
    Disabled,
}

impl AbsExtension {
    pub fn token(&self) -> &'static str {
        match self {
            AbsExtension::Positive => "positive",
            AbsExtension::Negative => "negative",
        }
    }
}

impl VariationDirection {
    pub fn token(&self) -> &'static str {
        match self {
            VariationDirection::Upward => "upward",
            VariationDirection::Downward => "downward",
        }
    }
}

impl VariationReference {
    pub fn token(&self) -> &'static str {
        match self {
            VariationReference::PreviousIteration => "previousiteration",
            VariationReference::PrePerimeter => "preperimeter",
        }
    }
}

impl MarginExtension {
    pub fn token(&self) -> &'static str {
        match self {
            MarginExtension::BelowThreshold => "belowthreshold",
            MarginExtension::AboveThreshold => "abovethreshold",
        }
    }
}

impl BoundExtension {
    pub fn token(&self) -> &'static str {
        match self {
            BoundExtension::LowerBound => "lowerbound",
            BoundExtension::UpperBound => "upperbound",
        }
    }
}

impl RangeShrinking {
    fn token(&self) -> Option<&'static str> {
        match self {
            RangeShrinking::Enabled => Some("iterativeshrink"),
            RangeShrinking::Disabled => None,
        }
    }
}

fn join(parts: &[&str], timestamp: Option<DateTime<Utc>>, suffix: &str) -> String {
    let mut name = parts.join(SEPARATOR);
    if let Some(ts) = timestamp {
        name.push_str(SEPARATOR);
        name.push_str(&ts.format("%Y%m%d%H%M").to_string());
    }
    name.push_str(SEPARATOR);
    name.push_str(suffix);
    name
}

fn variable(parts: &[&str], timestamp: Option<DateTime<Utc>>) -> String {
    join(parts, timestamp, VARIABLE_SUFFIX)
}

fn constraint(parts: &[&str], timestamp: Option<DateTime<Utc>>) -> String {
    join(parts, timestamp, CONSTRAINT_SUFFIX)
}

// --- variables ---

pub fn flow_variable(cnec_id: &str, side: Side, timestamp: Option<DateTime<Utc>>) -> String {
    variable(&[cnec_id, side.as_str(), "flow"], timestamp)
}

pub fn setpoint_variable(range_action_id: &str, state: &State) -> String {
    variable(&[range_action_id, state.id(), "setpoint"], state.timestamp())
}

pub fn absolute_variation_variable(range_action_id: &str, state: &State) -> String {
    variable(&[range_action_id, state.id(), "absolutevariation"], state.timestamp())
}

pub fn setpoint_variation_variable(
    range_action_id: &str,
    state: &State,
    direction: VariationDirection,
) -> String {
    variable(
        &[range_action_id, state.id(), "setpointvariation", direction.token()],
        state.timestamp(),
    )
}

pub fn pst_tap_variation_variable(
    range_action_id: &str,
    state: &State,
    direction: VariationDirection,
) -> String {
    variable(
        &[range_action_id, state.id(), "tapvariation", direction.token()],
        state.timestamp(),
    )
}

pub fn pst_tap_variation_binary(
    range_action_id: &str,
    state: &State,
    direction: VariationDirection,
) -> String {
    variable(
        &[range_action_id, state.id(), "isvariation", direction.token()],
        state.timestamp(),
    )
}

pub fn pst_tap_variable(range_action_id: &str, state: &State) -> String {
    variable(&[range_action_id, state.id(), "tap"], state.timestamp())
}

pub fn virtual_setpoint_variable(group_id: &str, state: &State) -> String {
    variable(&[group_id, state.id(), "virtualsetpoint"], state.timestamp())
}

pub fn virtual_tap_variable(group_id: &str, state: &State) -> String {
    variable(&[group_id, state.id(), "virtualtap"], state.timestamp())
}

pub fn min_margin_variable(timestamp: Option<DateTime<Utc>>) -> String {
    variable(&["minmargin"], timestamp)
}

pub fn min_relative_margin_variable(timestamp: Option<DateTime<Utc>>) -> String {
    variable(&["minrelmargin"], timestamp)
}

pub fn min_relative_margin_sign_binary(timestamp: Option<DateTime<Utc>>) -> String {
    variable(&["minrelmarginispositive"], timestamp)
}

pub fn mnec_violation_variable(cnec_id: &str, side: Side, timestamp: Option<DateTime<Utc>>) -> String {
    variable(&[cnec_id, side.as_str(), "mnecviolation"], timestamp)
}

pub fn loop_flow_violation_variable(
    cnec_id: &str,
    side: Side,
    timestamp: Option<DateTime<Utc>>,
) -> String {
    variable(&[cnec_id, side.as_str(), "loopflowviolation"], timestamp)
}

pub fn optimize_cnec_binary(cnec_id: &str, side: Side, timestamp: Option<DateTime<Utc>>) -> String {
    variable(&[cnec_id, side.as_str(), "optimizecnec"], timestamp)
}

pub fn range_action_variation_binary(range_action_id: &str, state: &State) -> String {
    variable(&[range_action_id, state.id(), "isvariation"], state.timestamp())
}

pub fn tso_ra_used_variable(operator: &str, state: &State) -> String {
    variable(&[operator, state.id(), "tsoraused"], state.timestamp())
}

pub fn tso_ra_used_cumulative_variable(operator: &str, state: &State) -> String {
    variable(&[operator, state.id(), "tsorausedcumulative"], state.timestamp())
}

pub fn pst_absolute_variation_from_initial_tap_variable(range_action_id: &str, state: &State) -> String {
    variable(
        &[range_action_id, state.id(), "pstabsolutevariationfrominitialtap"],
        state.timestamp(),
    )
}

pub fn sensitivity_failure_variable(state: &State) -> String {
    variable(&[state.id(), "sensitivityfailure"], state.timestamp())
}

// --- constraints ---

pub fn flow_constraint(cnec_id: &str, side: Side, timestamp: Option<DateTime<Utc>>) -> String {
    constraint(&[cnec_id, side.as_str(), "flow"], timestamp)
}

pub fn absolute_variation_constraint(range_action_id: &str, state: &State) -> String {
    constraint(&[range_action_id, state.id(), "absolutevariation"], state.timestamp())
}

pub fn setpoint_variation_constraint(range_action_id: &str, state: &State) -> String {
    constraint(&[range_action_id, state.id(), "setpointvariation"], state.timestamp())
}

pub fn relative_setpoint_constraint(
    range_action_id: &str,
    state: &State,
    shrinking: RangeShrinking,
) -> String {
    let mut parts = vec![range_action_id, state.id(), "relativesetpoint"];
    parts.extend(shrinking.token());
    constraint(&parts, state.timestamp())
}

pub fn injection_balance_constraint(state: &State) -> String {
    constraint(&[state.id(), "injectionbalance"], state.timestamp())
}

pub fn min_margin_constraint(
    cnec_id: &str,
    side: Side,
    timestamp: Option<DateTime<Utc>>,
    margin: MarginExtension,
) -> String {
    constraint(&[cnec_id, side.as_str(), "minmargin", margin.token()], timestamp)
}

pub fn min_relative_margin_constraint(
    cnec_id: &str,
    side: Side,
    timestamp: Option<DateTime<Utc>>,
    margin: MarginExtension,
) -> String {
    constraint(&[cnec_id, side.as_str(), "minrelmargin", margin.token()], timestamp)
}

pub fn min_relative_margin_sign_constraint(timestamp: Option<DateTime<Utc>>) -> String {
    constraint(&["minrelmarginispositive"], timestamp)
}

pub fn min_relative_margin_set_to_zero_constraint(timestamp: Option<DateTime<Utc>>) -> String {
    constraint(&["minrelmarginsettozero"], timestamp)
}

pub fn mnec_flow_constraint(
    cnec_id: &str,
    side: Side,
    timestamp: Option<DateTime<Utc>>,
    margin: MarginExtension,
) -> String {
    constraint(&[cnec_id, side.as_str(), "mnecflow", margin.token()], timestamp)
}

pub fn max_loop_flow_constraint(
    cnec_id: &str,
    side: Side,
    timestamp: Option<DateTime<Utc>>,
    bound: BoundExtension,
) -> String {
    constraint(&[cnec_id, side.as_str(), "maxloopflow", bound.token()], timestamp)
}

pub fn dont_optimize_cnec_constraint(
    cnec_id: &str,
    side: Side,
    timestamp: Option<DateTime<Utc>>,
    margin: MarginExtension,
) -> String {
    constraint(&[cnec_id, side.as_str(), "dontoptimizecnec", margin.token()], timestamp)
}

pub fn tap_to_angle_conversion_constraint(range_action_id: &str, state: &State) -> String {
    constraint(&[range_action_id, state.id(), "taptoangleconversion"], state.timestamp())
}

pub fn up_or_down_variation_constraint(range_action_id: &str, state: &State) -> String {
    constraint(&[range_action_id, state.id(), "upordownvariation"], state.timestamp())
}

pub fn is_variation_in_direction_constraint(
    range_action_id: &str,
    state: &State,
    reference: VariationReference,
    direction: VariationDirection,
) -> String {
    constraint(
        &[
            range_action_id,
            state.id(),
            "isvariation",
            reference.token(),
            direction.token(),
        ],
        state.timestamp(),
    )
}

pub fn pst_tap_constraint(range_action_id: &str, state: &State) -> String {
    constraint(&[range_action_id, state.id(), "tap"], state.timestamp())
}

pub fn pst_relative_tap_constraint(range_action_id: &str, state: &State) -> String {
    constraint(&[range_action_id, state.id(), "relativetap"], state.timestamp())
}

pub fn virtual_setpoint_constraint(range_action_id: &str, group_id: &str, state: &State) -> String {
    constraint(
        &[range_action_id, group_id, state.id(), "virtualsetpoint"],
        state.timestamp(),
    )
}

pub fn virtual_tap_constraint(range_action_id: &str, group_id: &str, state: &State) -> String {
    constraint(
        &[range_action_id, group_id, state.id(), "virtualtap"],
        state.timestamp(),
    )
}

pub fn is_variation_constraint(range_action_id: &str, state: &State) -> String {
    constraint(&[range_action_id, state.id(), "isvariation"], state.timestamp())
}

pub fn max_ra_constraint(state: &State) -> String {
    constraint(&[state.id(), "maxra"], state.timestamp())
}

pub fn max_tso_constraint(state: &State) -> String {
    constraint(&[state.id(), "maxtso"], state.timestamp())
}

pub fn max_ra_per_tso_constraint(operator: &str, state: &State) -> String {
    constraint(&[operator, state.id(), "maxrapertso"], state.timestamp())
}

pub fn max_pst_per_tso_constraint(operator: &str, state: &State) -> String {
    constraint(&[operator, state.id(), "maxpstpertso"], state.timestamp())
}

pub fn tso_ra_used_constraint(operator: &str, range_action_id: &str, state: &State) -> String {
    constraint(
        &[operator, range_action_id, state.id(), "tsoraused"],
        state.timestamp(),
    )
}

pub fn tso_ra_used_cumulative_constraint(operator: &str, state: &State) -> String {
    constraint(&[operator, state.id(), "tsorausedcumulative"], state.timestamp())
}

pub fn pst_absolute_variation_from_initial_tap_constraint(
    range_action_id: &str,
    state: &State,
    part: AbsExtension,
) -> String {
    constraint(
        &[
            range_action_id,
            state.id(),
            "pstabsolutevariationfrominitialtap",
            part.token(),
        ],
        state.timestamp(),
    )
}

pub fn max_elementary_actions_per_tso_constraint(operator: &str, state: &State) -> String {
    constraint(
        &[operator, state.id(), "maxelementaryactionspertso"],
        state.timestamp(),
    )
}

pub fn timestamp_gradient_constraint(range_action_id: &str, state: &State) -> String {
    constraint(&[range_action_id, state.id(), "timestampgradient"], state.timestamp())
}
