//! Candidate actuators ("range actions"): PSTs, HVDC setpoints, injection
//! shifts and generic setpoint actions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tap::TapTable;

/// Reference a [`Range`] is expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeType {
    Absolute,
    RelativeToInitialNetwork,
    RelativeToPreviousInstant,
    RelativeToPreviousTimestamp,
}

/// Admissible range. PST ranges are expressed in taps, all others in the
/// action's setpoint unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub range_type: RangeType,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeActionKind {
    Pst(TapTable),
    Hvdc,
    /// Shift of several injections; the setpoint is split across them with
    /// the given distribution keys.
    Injection {
        distribution_keys: BTreeMap<String, f64>,
    },
    Standard,
}

/// Absolute and relative setpoint bounds of an action, independent of any
/// previous setpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointBounds {
    pub min_absolute: f64,
    pub max_absolute: f64,
    pub min_relative: f64,
    pub max_relative: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeAction {
    id: String,
    network_element_id: String,
    operator: Option<String>,
    group_id: Option<String>,
    kind: RangeActionKind,
    ranges: Vec<Range>,
    initial_setpoint: f64,
}

impl RangeAction {
    fn new(
        id: impl Into<String>,
        network_element_id: impl Into<String>,
        kind: RangeActionKind,
        initial_setpoint: f64,
    ) -> Self {
        Self {
            id: id.into(),
            network_element_id: network_element_id.into(),
            operator: None,
            group_id: None,
            kind,
            ranges: Vec::new(),
            initial_setpoint,
        }
    }

    pub fn pst(id: impl Into<String>, network_element_id: impl Into<String>, table: TapTable) -> Self {
        let initial = table.initial_angle();
        Self::new(id, network_element_id, RangeActionKind::Pst(table), initial)
    }

    pub fn hvdc(id: impl Into<String>, network_element_id: impl Into<String>, initial: f64) -> Self {
        Self::new(id, network_element_id, RangeActionKind::Hvdc, initial)
    }

    pub fn injection(
        id: impl Into<String>,
        distribution_keys: BTreeMap<String, f64>,
        initial: f64,
    ) -> Self {
        let id = id.into();
        let element = distribution_keys.keys().cloned().collect::<Vec<_>>().join("+");
        Self::new(id, element, RangeActionKind::Injection { distribution_keys }, initial)
    }

    pub fn standard(id: impl Into<String>, network_element_id: impl Into<String>, initial: f64) -> Self {
        Self::new(id, network_element_id, RangeActionKind::Standard, initial)
    }

    pub fn with_range(mut self, range_type: RangeType, min: f64, max: f64) -> Self {
        self.ranges.push(Range {
            range_type,
            min,
            max,
        });
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
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

    pub fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn kind(&self) -> &RangeActionKind {
        &self.kind
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn initial_setpoint(&self) -> f64 {
        self.initial_setpoint
    }

    pub fn is_pst(&self) -> bool {
        matches!(self.kind, RangeActionKind::Pst(_))
    }

    pub fn is_injection(&self) -> bool {
        matches!(self.kind, RangeActionKind::Injection { .. })
    }

    pub fn tap_table(&self) -> Option<&TapTable> {
        match &self.kind {
            RangeActionKind::Pst(table) => Some(table),
            _ => None,
        }
    }

    /// Sum of the distribution keys of an injection action, 0 otherwise.
    pub fn distribution_key_sum(&self) -> f64 {
        match &self.kind {
            RangeActionKind::Injection { distribution_keys } => distribution_keys.values().sum(),
            _ => 0.0,
        }
    }

    /// Whether both actions act on the same network element.
    pub fn same_element_as(&self, other: &RangeAction) -> bool {
        self.id == other.id || self.network_element_id == other.network_element_id
    }

    /// Admissible tap interval given the tap of the previous instant.
    pub fn admissible_taps(&self, previous_tap: i32) -> Option<(i32, i32)> {
        self.tap_interval(Some(previous_tap))
    }

    fn tap_interval(&self, previous_tap: Option<i32>) -> Option<(i32, i32)> {
        let table = self.tap_table()?;
        let mut min = table.lowest_tap();
        let mut max = table.highest_tap();
        for range in &self.ranges {
            let reference = match (range.range_type, previous_tap) {
                (RangeType::Absolute, _) => 0,
                (RangeType::RelativeToInitialNetwork, _) => table.initial_tap(),
                (RangeType::RelativeToPreviousInstant, Some(previous)) => previous,
                _ => continue,
            };
            min = min.max(reference + range.min.round() as i32);
            max = max.min(reference + range.max.round() as i32);
        }
        Some((min, max))
    }

    /// Lowest reachable setpoint when the previous instant ended at
    /// `previous_setpoint`.
    pub fn min_admissible_setpoint(&self, previous_setpoint: f64) -> f64 {
        self.admissible_setpoints(previous_setpoint).0
    }

    /// Highest reachable setpoint when the previous instant ended at
    /// `previous_setpoint`.
    pub fn max_admissible_setpoint(&self, previous_setpoint: f64) -> f64 {
        self.admissible_setpoints(previous_setpoint).1
    }

    fn admissible_setpoints(&self, previous_setpoint: f64) -> (f64, f64) {
        if let Some(table) = self.tap_table() {
            let previous_tap = table.closest_tap(previous_setpoint);
            let (min_tap, max_tap) = self
                .admissible_taps(previous_tap)
                .unwrap_or((table.lowest_tap(), table.highest_tap()));
            let a = table.clamped_angle(min_tap);
            let b = table.clamped_angle(max_tap);
            return (a.min(b), a.max(b));
        }
        let mut min = f64::NEG_INFINITY;
        let mut max = f64::INFINITY;
        for range in &self.ranges {
            let reference = match range.range_type {
                RangeType::Absolute => 0.0,
                RangeType::RelativeToInitialNetwork => self.initial_setpoint,
                RangeType::RelativeToPreviousInstant => previous_setpoint,
                RangeType::RelativeToPreviousTimestamp => continue,
            };
            min = min.max(reference + range.min);
            max = max.min(reference + range.max);
        }
        (min, max)
    }

    /// Bounds independent of any previous setpoint: absolute ranges (and
    /// ranges relative to the initial network) give the absolute interval,
    /// ranges relative to the previous instant give the relative one.
    pub fn setpoint_bounds(&self) -> SetpointBounds {
        let mut bounds = SetpointBounds {
            min_absolute: f64::NEG_INFINITY,
            max_absolute: f64::INFINITY,
            min_relative: f64::NEG_INFINITY,
            max_relative: f64::INFINITY,
        };
        if let Some(table) = self.tap_table() {
            let (min_tap, max_tap) = self
                .tap_interval(None)
                .unwrap_or((table.lowest_tap(), table.highest_tap()));
            let a = table.clamped_angle(min_tap);
            let b = table.clamped_angle(max_tap);
            bounds.min_absolute = a.min(b);
            bounds.max_absolute = a.max(b);
            if let Some((min, max)) = self.relative_tap_bounds() {
                let step = table.smallest_angle_step();
                bounds.min_relative = min as f64 * step;
                bounds.max_relative = max as f64 * step;
            }
            return bounds;
        }
        for range in &self.ranges {
            match range.range_type {
                RangeType::Absolute => {
                    bounds.min_absolute = bounds.min_absolute.max(range.min);
                    bounds.max_absolute = bounds.max_absolute.min(range.max);
                }
                RangeType::RelativeToInitialNetwork => {
                    bounds.min_absolute = bounds.min_absolute.max(self.initial_setpoint + range.min);
                    bounds.max_absolute = bounds.max_absolute.min(self.initial_setpoint + range.max);
                }
                RangeType::RelativeToPreviousInstant => {
                    bounds.min_relative = bounds.min_relative.max(range.min);
                    bounds.max_relative = bounds.max_relative.min(range.max);
                }
                RangeType::RelativeToPreviousTimestamp => {}
            }
        }
        bounds
    }

    /// Tap variation allowed between two instants, if restricted.
    pub fn relative_tap_bounds(&self) -> Option<(i32, i32)> {
        self.tap_table()?;
        self.tightest(RangeType::RelativeToPreviousInstant)
            .map(|(min, max)| (min.round() as i32, max.round() as i32))
    }

    /// Variation allowed between two consecutive timestamps, in the range
    /// unit (taps for PSTs).
    pub fn timestamp_gradient(&self) -> Option<(f64, f64)> {
        self.tightest(RangeType::RelativeToPreviousTimestamp)
    }

    fn tightest(&self, range_type: RangeType) -> Option<(f64, f64)> {
        self.ranges
            .iter()
            .filter(|r| r.range_type == range_type)
            .fold(None, |acc, r| match acc {
                None => Some((r.min, r.max)),
                Some((min, max)) => Some((f64::max(min, r.min), f64::min(max, r.max))),
            })
    }
}

impl PartialEq for RangeAction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RangeAction {}

#[cfg(test)]
mod tests {
    use super::*;

    fn pst() -> RangeAction {
        RangeAction::pst("pst", "ne-pst", TapTable::linear(-16, 16, 0.5, 0).unwrap())
    }

    #[test]
    fn test_pst_admissible_setpoints_follow_table() {
        let pst = pst().with_range(RangeType::Absolute, -10.0, 10.0);
        assert_eq!(pst.min_admissible_setpoint(0.0), -5.0);
        assert_eq!(pst.max_admissible_setpoint(0.0), 5.0);
    }

    #[test]
    fn test_pst_relative_to_previous_instant() {
        let pst = pst().with_range(RangeType::RelativeToPreviousInstant, -2.0, 2.0);
        assert_eq!(pst.admissible_taps(4), Some((2, 6)));
        assert_eq!(pst.max_admissible_setpoint(2.0), 3.0);
        let bounds = pst.setpoint_bounds();
        assert_eq!(bounds.min_relative, -1.0);
        assert_eq!(bounds.max_relative, 1.0);
        assert_eq!(bounds.min_absolute, -8.0);
    }

    #[test]
    fn test_standard_bounds() {
        let ra = RangeAction::hvdc("hvdc", "line", 100.0)
            .with_range(RangeType::Absolute, -500.0, 500.0)
            .with_range(RangeType::RelativeToInitialNetwork, -50.0, 300.0);
        assert_eq!(ra.min_admissible_setpoint(0.0), 50.0);
        assert_eq!(ra.max_admissible_setpoint(0.0), 400.0);
        let bounds = ra.setpoint_bounds();
        assert_eq!(bounds.min_absolute, 50.0);
        assert!(bounds.max_relative.is_infinite());
    }

    #[test]
    fn test_injection_key_sum() {
        let keys = BTreeMap::from([("gen-a".to_string(), 0.6), ("gen-b".to_string(), -1.0)]);
        let ra = RangeAction::injection("inj", keys, 0.0);
        assert!((ra.distribution_key_sum() + 0.4).abs() < 1e-12);
        assert_eq!(ra.network_element_id(), "gen-a+gen-b");
    }

    #[test]
    fn test_timestamp_gradient() {
        let ra = pst().with_range(RangeType::RelativeToPreviousTimestamp, -3.0, 3.0);
        assert_eq!(ra.timestamp_gradient(), Some((-3.0, 3.0)));
        assert_eq!(pst().timestamp_gradient(), None);
    }
}
