//! Parameters of the linear optimizer.
//!
//! Stored as TOML; every section is `#[serde(default)]` so partial files
//! parse and unspecified values use the defaults below. Penalty magnitudes
//! are plain parameters: tune them per deployment and check them against
//! the golden scenarios rather than treating the defaults as optimal.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RaoError, RaoResult};
use crate::range_action::{RangeAction, RangeActionKind};
use crate::state::State;

/// What the margin objective maximises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveFunctionType {
    #[default]
    MaxMinMargin,
    MaxMinRelativeMargin,
}

/// How PST setpoints are modelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PstModel {
    /// Continuous angle, rounded to the closest tap afterwards.
    #[default]
    Continuous,
    /// Integer tap variables linked to the angle by the tap table.
    ApproximatedIntegers,
}

/// Main parameter bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearOptimizerParameters {
    /// Objective cost added per state whose sensitivity computation failed.
    /// Zero disables the penalty.
    pub sensitivity_failure_overcost: f64,

    /// Maximum number of sensitivity/MILP iterations.
    pub max_iterations: usize,

    /// Couple consecutive timestamps when several perimeters are optimized
    /// together.
    pub multi_timestep: bool,

    pub objective: ObjectiveParameters,

    pub range_actions: RangeActionsParameters,

    pub solver: SolverParameters,

    /// Soft protection of monitored-only elements.
    pub mnec: Option<MnecParameters>,

    /// Loop-flow limitation.
    pub loop_flow: Option<LoopFlowParameters>,

    /// Elements left out of the margin objective.
    pub unoptimized_cnecs: Option<UnoptimizedCnecParameters>,

    /// Usage limits keyed by instant id.
    pub ra_usage_limits: BTreeMap<String, RaUsageLimits>,
}

impl Default for LinearOptimizerParameters {
    fn default() -> Self {
        Self {
            sensitivity_failure_overcost: 10_000.0,
            max_iterations: 10,
            multi_timestep: false,
            objective: ObjectiveParameters::default(),
            range_actions: RangeActionsParameters::default(),
            solver: SolverParameters::default(),
            mnec: None,
            loop_flow: None,
            unoptimized_cnecs: None,
            ra_usage_limits: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveParameters {
    pub kind: ObjectiveFunctionType,

    /// Lower bound applied to zonal PTDF sums in relative margins.
    pub ptdf_sum_lower_bound: f64,
}

impl Default for ObjectiveParameters {
    fn default() -> Self {
        Self {
            kind: ObjectiveFunctionType::MaxMinMargin,
            ptdf_sum_lower_bound: 0.01,
        }
    }
}

/// Penalties and sensitivity filters per action kind. Standard setpoint
/// actions use the HVDC values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeActionsParameters {
    pub pst_model: PstModel,
    pub pst_penalty_cost: f64,
    pub hvdc_penalty_cost: f64,
    pub injection_penalty_cost: f64,
    pub pst_sensitivity_threshold: f64,
    pub hvdc_sensitivity_threshold: f64,
    pub injection_sensitivity_threshold: f64,

    /// Shrink setpoint ranges around the previous solution at each
    /// sensitivity iteration.
    pub range_shrinking: bool,
}

impl Default for RangeActionsParameters {
    fn default() -> Self {
        Self {
            pst_model: PstModel::Continuous,
            pst_penalty_cost: 0.01,
            hvdc_penalty_cost: 0.001,
            injection_penalty_cost: 0.001,
            pst_sensitivity_threshold: 0.0,
            hvdc_sensitivity_threshold: 0.0,
            injection_sensitivity_threshold: 0.0,
            range_shrinking: false,
        }
    }
}

impl RangeActionsParameters {
    pub fn penalty_cost(&self, action: &RangeAction) -> f64 {
        match action.kind() {
            RangeActionKind::Pst(_) => self.pst_penalty_cost,
            RangeActionKind::Injection { .. } => self.injection_penalty_cost,
            RangeActionKind::Hvdc | RangeActionKind::Standard => self.hvdc_penalty_cost,
        }
    }

    pub fn sensitivity_threshold(&self, action: &RangeAction) -> f64 {
        match action.kind() {
            RangeActionKind::Pst(_) => self.pst_sensitivity_threshold,
            RangeActionKind::Injection { .. } => self.injection_sensitivity_threshold,
            RangeActionKind::Hvdc | RangeActionKind::Standard => self.hvdc_sensitivity_threshold,
        }
    }

    pub fn approximated_integers(&self) -> bool {
        self.pst_model == PstModel::ApproximatedIntegers
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MnecParameters {
    /// Margin decrease (MW) tolerated before the violation is penalised.
    pub acceptable_margin_decrease: f64,
    pub violation_cost: f64,
    pub constraint_adjustment_coefficient: f64,
}

impl Default for MnecParameters {
    fn default() -> Self {
        Self {
            acceptable_margin_decrease: 50.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopFlowParameters {
    /// Loop-flow increase (MW) tolerated above the initial loop flow.
    pub acceptable_increase: f64,
    pub violation_cost: f64,
    pub constraint_adjustment_coefficient: f64,
}

impl Default for LoopFlowParameters {
    fn default() -> Self {
        Self {
            acceptable_increase: 0.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnoptimizedCnecParameters {
    /// Operators whose CNECs only need their margin not to decrease.
    pub operators_not_to_optimize: BTreeSet<String>,

    /// CNEC id → id of the PST that secures it.
    pub cnecs_secured_by_pst: BTreeMap<String, String>,
}

impl UnoptimizedCnecParameters {
    /// The margin-decrease rule only relaxes curative perimeters.
    pub fn relaxes_operators(&self, state: &State) -> bool {
        !self.operators_not_to_optimize.is_empty() && state.instant().is_curative()
    }

    /// Whether any rule has CNECs to relax in a perimeter on `state`.
    pub fn applies_to(&self, state: &State) -> bool {
        !self.cnecs_secured_by_pst.is_empty() || self.relaxes_operators(state)
    }
}

/// Limits on how many actions may be used in one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaUsageLimits {
    pub max_ra: Option<usize>,
    pub max_tso: Option<usize>,
    /// Operators that do not count towards `max_tso`.
    pub max_tso_exclusion: BTreeSet<String>,
    pub max_ra_per_tso: BTreeMap<String, usize>,
    pub max_pst_per_tso: BTreeMap<String, usize>,
    /// Maximum sum of PST tap changes per operator.
    pub max_elementary_actions_per_tso: BTreeMap<String, usize>,
}

impl RaUsageLimits {
    pub fn is_limiting(&self) -> bool {
        self.max_ra.is_some()
            || self.max_tso.is_some()
            || !self.max_ra_per_tso.is_empty()
            || !self.max_pst_per_tso.is_empty()
            || !self.max_elementary_actions_per_tso.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParameters {
    /// Backend name, see the solver backends of the linear crate.
    pub backend: String,

    pub relative_mip_gap: f64,

    /// Whitespace-separated `key=value` options forwarded to the backend.
    pub tuning: String,

    /// Mantissa bits zeroed on every bound and coefficient.
    pub rounding_bits: u32,

    /// Time limit for one solve, in seconds.
    pub max_time_seconds: Option<f64>,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            backend: "microlp".to_string(),
            relative_mip_gap: 1e-4,
            tuning: String::new(),
            rounding_bits: 30,
            max_time_seconds: None,
        }
    }
}

impl LinearOptimizerParameters {
    pub fn from_toml_str(contents: &str) -> RaoResult<Self> {
        let parameters: Self = toml::from_str(contents)?;
        Ok(parameters)
    }

    pub fn load_from(path: &Path) -> RaoResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let parameters = Self::from_toml_str(&contents)?;
        debug!("Loaded optimizer parameters from {}", path.display());
        Ok(parameters)
    }

    pub fn save_to(&self, path: &Path) -> RaoResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Limits configured for `instant_id` that actually restrict something.
    pub fn usage_limits(&self, instant_id: &str) -> Option<&RaUsageLimits> {
        self.ra_usage_limits
            .get(instant_id)
            .filter(|limits| limits.is_limiting())
    }

    /// Reject parameter combinations the optimizer cannot honour.
    pub fn validate(&self) -> RaoResult<()> {
        let solver = &self.solver;
        if !(solver.relative_mip_gap >= 0.0) {
            return Err(RaoError::Config(format!(
                "relative MIP gap must be non-negative, got {}",
                solver.relative_mip_gap
            )));
        }
        if solver.rounding_bits > 52 {
            return Err(RaoError::Config(format!(
                "cannot round away {} mantissa bits, f64 has 52",
                solver.rounding_bits
            )));
        }
        if let Some(limit) = solver.max_time_seconds {
            if !(limit > 0.0) {
                return Err(RaoError::Config(format!(
                    "time limit must be positive, got {limit}"
                )));
            }
        }
        if !(self.objective.ptdf_sum_lower_bound > 0.0) {
            return Err(RaoError::Config(
                "ptdf_sum_lower_bound must be strictly positive".into(),
            ));
        }

        let ra = &self.range_actions;
        let mut penalties = vec![
            ("pst_penalty_cost", ra.pst_penalty_cost),
            ("hvdc_penalty_cost", ra.hvdc_penalty_cost),
            ("injection_penalty_cost", ra.injection_penalty_cost),
            ("sensitivity_failure_overcost", self.sensitivity_failure_overcost),
        ];
        if let Some(mnec) = &self.mnec {
            penalties.push(("mnec.violation_cost", mnec.violation_cost));
        }
        if let Some(loop_flow) = &self.loop_flow {
            penalties.push(("loop_flow.violation_cost", loop_flow.violation_cost));
        }
        if let Some((name, value)) = penalties.iter().find(|(_, v)| !(*v >= 0.0)) {
            return Err(RaoError::Config(format!(
                "{name} must be non-negative, got {value}"
            )));
        }

        if let Some(unoptimized) = &self.unoptimized_cnecs {
            if unoptimized.operators_not_to_optimize.is_empty()
                && unoptimized.cnecs_secured_by_pst.is_empty()
            {
                return Err(RaoError::Config(
                    "unoptimized_cnecs needs operators_not_to_optimize or cnecs_secured_by_pst"
                        .into(),
                ));
            }
        }
        if self.max_iterations == 0 {
            return Err(RaoError::Config("max_iterations must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_parameters() {
        let parameters = LinearOptimizerParameters::default();
        assert_eq!(parameters.objective.kind, ObjectiveFunctionType::MaxMinMargin);
        assert_eq!(parameters.solver.rounding_bits, 30);
        assert_eq!(parameters.solver.backend, "microlp");
        assert!(parameters.mnec.is_none());
        assert!(parameters.validate().is_ok());
    }

    #[test]
    fn test_partial_config_parsing() {
        let toml = r#"
            max_iterations = 3

            [range_actions]
            pst_model = "approximated_integers"

            [mnec]
            violation_cost = 25.0

            [ra_usage_limits.curative]
            max_ra = 2
            max_pst_per_tso = { FR = 1 }
        "#;
        let parameters = LinearOptimizerParameters::from_toml_str(toml).unwrap();
        assert_eq!(parameters.max_iterations, 3);
        assert!(parameters.range_actions.approximated_integers());
        assert_eq!(parameters.range_actions.pst_penalty_cost, 0.01);
        let mnec = parameters.mnec.as_ref().unwrap();
        assert_eq!(mnec.violation_cost, 25.0);
        assert_eq!(mnec.acceptable_margin_decrease, 50.0);
        let limits = parameters.usage_limits("curative").unwrap();
        assert_eq!(limits.max_ra, Some(2));
        assert_eq!(limits.max_pst_per_tso["FR"], 1);
        assert!(parameters.usage_limits("preventive").is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("rao.toml");

        let mut parameters = LinearOptimizerParameters::default();
        parameters.solver.tuning = "presolve=off".to_string();
        parameters.loop_flow = Some(LoopFlowParameters::default());
        parameters.save_to(&path).unwrap();

        let loaded = LinearOptimizerParameters::load_from(&path).unwrap();
        assert_eq!(loaded, parameters);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut parameters = LinearOptimizerParameters::default();
        parameters.solver.rounding_bits = 60;
        assert!(matches!(parameters.validate(), Err(RaoError::Config(_))));

        let mut parameters = LinearOptimizerParameters::default();
        parameters.mnec = Some(MnecParameters {
            violation_cost: -1.0,
            ..MnecParameters::default()
        });
        assert!(parameters.validate().is_err());

        let mut parameters = LinearOptimizerParameters::default();
        parameters.unoptimized_cnecs = Some(UnoptimizedCnecParameters::default());
        assert!(parameters.validate().is_err());
    }

    #[test]
    fn test_unoptimized_rules_per_instant() {
        use crate::state::Instant;

        let preventive = State::preventive(Instant::preventive());
        let curative = State::after_contingency(Instant::curative(), "co1");
        let operators = UnoptimizedCnecParameters {
            operators_not_to_optimize: BTreeSet::from(["tsoX".to_string()]),
            cnecs_secured_by_pst: BTreeMap::new(),
        };
        assert!(!operators.applies_to(&preventive));
        assert!(operators.applies_to(&curative));

        let psts = UnoptimizedCnecParameters {
            operators_not_to_optimize: BTreeSet::new(),
            cnecs_secured_by_pst: BTreeMap::from([("cnec1".to_string(), "pst1".to_string())]),
        };
        assert!(psts.applies_to(&preventive));
        assert!(!psts.relaxes_operators(&curative));
    }

    #[test]
    fn test_unknown_field_values_fail_to_parse() {
        let toml = r#"
            [objective]
            kind = "max_min_cost"
        "#;
        assert!(matches!(
            LinearOptimizerParameters::from_toml_str(toml),
            Err(RaoError::Parse(_))
        ));
    }
}
