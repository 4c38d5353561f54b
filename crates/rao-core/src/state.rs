//! Operating states: an instant, an optional contingency and an optional
//! timestamp for multi-period runs.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of an instant, in chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstantKind {
    Preventive,
    Outage,
    Auto,
    Curative,
}

/// A named instant of the optimization, ordered by `order`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instant {
    id: String,
    kind: InstantKind,
    order: u32,
}

impl Instant {
    pub fn new(id: impl Into<String>, kind: InstantKind, order: u32) -> Self {
        Self {
            id: id.into(),
            kind,
            order,
        }
    }

    pub fn preventive() -> Self {
        Self::new("preventive", InstantKind::Preventive, 0)
    }

    pub fn outage() -> Self {
        Self::new("outage", InstantKind::Outage, 1)
    }

    pub fn auto() -> Self {
        Self::new("auto", InstantKind::Auto, 2)
    }

    pub fn curative() -> Self {
        Self::new("curative", InstantKind::Curative, 3)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> InstantKind {
        self.kind
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn is_preventive(&self) -> bool {
        self.kind == InstantKind::Preventive
    }

    pub fn is_curative(&self) -> bool {
        self.kind == InstantKind::Curative
    }

    pub fn comes_before(&self, other: &Instant) -> bool {
        self.order < other.order
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Operating state of the network.
///
/// Identity is the state id plus the timestamp, not a structural comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    id: String,
    instant: Instant,
    contingency: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl State {
    /// The preventive (basecase) state.
    pub fn preventive(instant: Instant) -> Self {
        Self {
            id: instant.id().to_string(),
            instant,
            contingency: None,
            timestamp: None,
        }
    }

    /// A post-contingency state at the given instant.
    pub fn after_contingency(instant: Instant, contingency: impl Into<String>) -> Self {
        let contingency = contingency.into();
        Self {
            id: format!("{} - {}", contingency, instant.id()),
            instant,
            contingency: Some(contingency),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn instant(&self) -> &Instant {
        &self.instant
    }

    pub fn contingency(&self) -> Option<&str> {
        self.contingency.as_deref()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn is_preventive(&self) -> bool {
        self.contingency.is_none()
    }

    /// Whether `self` happens strictly before `other` on the same branch of
    /// the state tree (preventive, or the same contingency) and period.
    pub fn precedes(&self, other: &State) -> bool {
        self.timestamp == other.timestamp
            && self.instant.comes_before(&other.instant)
            && (self.contingency.is_none() || self.contingency == other.contingency)
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.timestamp == other.timestamp
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.timestamp.hash(state);
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.instant.order.cmp(&other.instant.order))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp {
            Some(ts) => write!(f, "{} @ {}", self.id, ts.format("%Y-%m-%dT%H:%M")),
            None => write!(f, "{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_state_ids() {
        let preventive = State::preventive(Instant::preventive());
        let curative = State::after_contingency(Instant::curative(), "co1");
        assert_eq!(preventive.id(), "preventive");
        assert_eq!(curative.id(), "co1 - curative");
        assert_eq!(curative.contingency(), Some("co1"));
    }

    #[test]
    fn test_equality_uses_id_and_timestamp() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let a = State::preventive(Instant::preventive());
        let b = State::preventive(Instant::preventive());
        assert_eq!(a, b);
        assert_ne!(a, a.clone().with_timestamp(ts));
    }

    #[test]
    fn test_precedes() {
        let preventive = State::preventive(Instant::preventive());
        let outage = State::after_contingency(Instant::outage(), "co1");
        let curative = State::after_contingency(Instant::curative(), "co1");
        let other = State::after_contingency(Instant::curative(), "co2");

        assert!(preventive.precedes(&curative));
        assert!(outage.precedes(&curative));
        assert!(!outage.precedes(&other));
        assert!(!curative.precedes(&outage));
    }

    #[test]
    fn test_ordering_is_chronological() {
        let mut states = vec![
            State::after_contingency(Instant::curative(), "co1"),
            State::preventive(Instant::preventive()),
            State::after_contingency(Instant::outage(), "co1"),
        ];
        states.sort();
        let ids: Vec<_> = states.iter().map(State::id).collect();
        assert_eq!(ids, vec!["preventive", "co1 - outage", "co1 - curative"]);
    }
}
