//! End-to-end scenarios: build, fill and solve small problems on the
//! default MILP backend and check the optimum.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rao_core::{
    FlowCnec, FlowTable, Instant, LinearOptimizerParameters, MnecParameters, OptimizationPerimeter, PstModel,
    RaUsageLimits, RangeAction, RangeActionActivationResult, RangeType, SensitivityTable, Side, State, TapTable,
    UnoptimizedCnecParameters,
};
use rao_linear::{Family, LinearProblem, LinearProblemStatus, VariableKey};

fn preventive() -> State {
    State::preventive(Instant::preventive())
}

fn parameters() -> LinearOptimizerParameters {
    let mut parameters = LinearOptimizerParameters::default();
    parameters.solver.backend = "microlp".into();
    parameters
}

fn approximated_parameters() -> LinearOptimizerParameters {
    let mut parameters = parameters();
    parameters.range_actions.pst_model = PstModel::ApproximatedIntegers;
    parameters
}

fn pst(id: &str) -> RangeAction {
    RangeAction::pst(id, format!("ne-{id}"), TapTable::linear(-16, 16, 0.5, 0).unwrap())
}

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}

/// One CNEC with margin 50 and nothing to act with: the minimum margin is
/// the CNEC's margin.
#[test]
fn margin_without_actuators() {
    let state = preventive();
    let cnec = FlowCnec::new("cnec", "ne", state.clone())
        .with_bounds(Side::One, Some(-100.0), Some(100.0))
        .into_arc();
    let perimeter = Arc::new(OptimizationPerimeter::new(state).with_cnec(cnec));
    let flows = FlowTable::new().with_flow("cnec", Side::One, 50.0);

    let mut problem = LinearProblem::builder(parameters())
        .with_perimeter(perimeter)
        .build()
        .unwrap();
    problem.fill(&flows, &SensitivityTable::new()).unwrap();
    let status = problem.solve().unwrap();

    assert_eq!(status, LinearProblemStatus::Optimal);
    let margin = problem
        .model()
        .variable(&VariableKey::MinimumMargin { timestamp: None })
        .unwrap();
    assert_close(problem.model().value(margin).unwrap(), 50.0, 1e-6);
    assert_close(problem.objective_value().unwrap(), -50.0, 1e-6);
}

/// A continuous actuator moving the flow away from the binding limit is
/// pushed to its bound.
#[test]
fn continuous_actuator_reaches_its_bound() {
    let state = preventive();
    let cnec = FlowCnec::new("cnec", "ne", state.clone())
        .with_bounds(Side::One, Some(-100.0), None)
        .into_arc();
    let hvdc = RangeAction::hvdc("hvdc", "ne-hvdc", 0.0)
        .with_range(RangeType::Absolute, -10.0, 10.0)
        .into_arc();
    let perimeter = Arc::new(
        OptimizationPerimeter::new(state.clone())
            .with_cnec(cnec)
            .with_range_action(state.clone(), hvdc.clone()),
    );
    let flows = FlowTable::new().with_flow("cnec", Side::One, -20.0);
    let sensitivities = SensitivityTable::new().with_sensitivity("cnec", Side::One, "hvdc", 2.0);

    let mut problem = LinearProblem::builder(parameters())
        .with_perimeter(perimeter)
        .build()
        .unwrap();
    problem.fill(&flows, &sensitivities).unwrap();

    assert_eq!(problem.solve().unwrap(), LinearProblemStatus::Optimal);
    assert_close(problem.setpoint(&hvdc, &state).unwrap(), 10.0, 1e-3);
    assert!(problem.is_activated(&hvdc, &state).unwrap());
    let margin = problem
        .model()
        .variable(&VariableKey::MinimumMargin { timestamp: None })
        .unwrap();
    assert_close(problem.model().value(margin).unwrap(), 100.0, 1e-3);
}

/// An MNEC 5 MW beyond its tolerated flow costs 5 × 10 in virtual cost and
/// keeps the problem feasible.
#[test]
fn mnec_violation_is_a_virtual_cost() {
    let state = preventive();
    let cnec = FlowCnec::new("cnec", "ne", state.clone())
        .with_bounds(Side::One, Some(-100.0), Some(100.0))
        .into_arc();
    let mnec = FlowCnec::new("mnec", "ne-mnec", state.clone())
        .with_bounds(Side::One, None, Some(100.0))
        .with_optimized(false)
        .with_monitored(true)
        .into_arc();
    let perimeter = Arc::new(OptimizationPerimeter::new(state).with_cnec(cnec).with_cnec(mnec));
    let initial = FlowTable::new()
        .with_flow("cnec", Side::One, 50.0)
        .with_flow("mnec", Side::One, 0.0);
    let flows = FlowTable::new()
        .with_flow("cnec", Side::One, 50.0)
        .with_flow("mnec", Side::One, 1005.0);

    let mut parameters = parameters();
    parameters.mnec = Some(MnecParameters {
        acceptable_margin_decrease: 1000.0,
        violation_cost: 10.0,
        constraint_adjustment_coefficient: 0.0,
    });
    let mut problem = LinearProblem::builder(parameters)
        .with_perimeter(perimeter)
        .with_initial_flows(Arc::new(initial))
        .build()
        .unwrap();
    problem.fill(&flows, &SensitivityTable::new()).unwrap();

    assert_eq!(problem.solve().unwrap(), LinearProblemStatus::Optimal);
    assert_close(problem.objective_contribution(Family::MnecViolation).unwrap(), 50.0, 1e-6);
    assert_close(problem.virtual_cost().unwrap(), 50.0, 1e-6);
    // -50 of margin plus 50 of virtual cost
    assert_close(problem.objective_value().unwrap(), 0.0, 1e-6);
}

/// In the integer tap model, a move of five taps lands exactly on the
/// table angle of tap 5.
#[test]
fn discrete_tap_lands_on_table_angle() {
    let state = preventive();
    let cnec = FlowCnec::new("cnec", "ne", state.clone())
        .with_bounds(Side::One, Some(-100.0), Some(100.0))
        .into_arc();
    let pst = pst("pst").into_arc();
    let perimeter = Arc::new(
        OptimizationPerimeter::new(state.clone())
            .with_cnec(cnec)
            .with_range_action(state.clone(), pst.clone()),
    );
    let flows = FlowTable::new().with_flow("cnec", Side::One, -25.0);
    let sensitivities = SensitivityTable::new().with_sensitivity("cnec", Side::One, "pst", 10.0);

    let mut problem = LinearProblem::builder(approximated_parameters())
        .with_perimeter(perimeter)
        .build()
        .unwrap();
    problem.fill(&flows, &sensitivities).unwrap();

    assert_eq!(problem.solve().unwrap(), LinearProblemStatus::Optimal);
    assert_eq!(problem.tap(&pst, &state).unwrap(), 5);
    assert_close(problem.setpoint(&pst, &state).unwrap(), 2.5, 1e-6);
    let activation = problem.activation().unwrap();
    assert_eq!(activation.optimized_tap(&pst, &state), 5);
    assert_eq!(activation.optimized_setpoint(&pst, &state), 2.5);
}

/// Two grouped PSTs pulling in opposite directions settle on one shared
/// tap that balances both CNECs.
#[test]
fn grouped_psts_share_one_tap() {
    let state = preventive();
    let cnec1 = FlowCnec::new("cnec1", "ne1", state.clone())
        .with_bounds(Side::One, Some(-100.0), Some(100.0))
        .into_arc();
    let cnec2 = FlowCnec::new("cnec2", "ne2", state.clone())
        .with_bounds(Side::One, Some(-100.0), Some(100.0))
        .into_arc();
    let pst_a = pst("pstA").with_group("g").into_arc();
    let pst_b = pst("pstB").with_group("g").into_arc();
    let perimeter = Arc::new(
        OptimizationPerimeter::new(state.clone())
            .with_cnec(cnec1)
            .with_cnec(cnec2)
            .with_range_action(state.clone(), pst_a.clone())
            .with_range_action(state.clone(), pst_b.clone()),
    );
    let flows = FlowTable::new()
        .with_flow("cnec1", Side::One, -25.0)
        .with_flow("cnec2", Side::One, 15.0);
    // Alone, A would go to tap 5 and B to tap -3
    let sensitivities = SensitivityTable::new()
        .with_sensitivity("cnec1", Side::One, "pstA", 10.0)
        .with_sensitivity("cnec2", Side::One, "pstB", 10.0);

    let mut problem = LinearProblem::builder(approximated_parameters())
        .with_perimeter(perimeter)
        .build()
        .unwrap();
    problem.fill(&flows, &sensitivities).unwrap();

    assert_eq!(problem.solve().unwrap(), LinearProblemStatus::Optimal);
    let virtual_tap = problem
        .model()
        .variable(&VariableKey::VirtualTap {
            group: "g".into(),
            state: state.clone(),
        })
        .unwrap();
    assert_close(problem.model().value(virtual_tap).unwrap(), 1.0, 1e-6);
    assert_eq!(problem.tap(&pst_a, &state).unwrap(), 1);
    assert_eq!(problem.tap(&pst_b, &state).unwrap(), 1);
}

/// Grouped HVDCs stay synchronised when PSTs are modelled with integer
/// taps. Apart, A would go to 10 and B to -10 for a margin of 15; together
/// they stay at 0 for a margin of 5.
#[test]
fn grouped_hvdcs_share_one_setpoint_with_integer_taps() {
    let state = preventive();
    let cnec1 = FlowCnec::new("cnec1", "ne1", state.clone())
        .with_bounds(Side::One, Some(-100.0), Some(100.0))
        .into_arc();
    let cnec2 = FlowCnec::new("cnec2", "ne2", state.clone())
        .with_bounds(Side::One, Some(-100.0), Some(100.0))
        .into_arc();
    let hvdc = |id: &str| {
        RangeAction::hvdc(id, format!("ne-{id}"), 0.0)
            .with_range(RangeType::Absolute, -10.0, 10.0)
            .with_group("g")
            .into_arc()
    };
    let (hvdc_a, hvdc_b) = (hvdc("hvdcA"), hvdc("hvdcB"));
    let perimeter = Arc::new(
        OptimizationPerimeter::new(state.clone())
            .with_cnec(cnec1)
            .with_cnec(cnec2)
            .with_range_action(state.clone(), hvdc_a.clone())
            .with_range_action(state.clone(), hvdc_b.clone()),
    );
    let flows = FlowTable::new()
        .with_flow("cnec1", Side::One, -95.0)
        .with_flow("cnec2", Side::One, 95.0);
    let sensitivities = SensitivityTable::new()
        .with_sensitivity("cnec1", Side::One, "hvdcA", 1.0)
        .with_sensitivity("cnec2", Side::One, "hvdcB", 1.0);

    let mut problem = LinearProblem::builder(approximated_parameters())
        .with_perimeter(perimeter)
        .build()
        .unwrap();
    assert!(problem.filler_ids().contains(&"continuous groups preventive"));
    problem.fill(&flows, &sensitivities).unwrap();

    assert_eq!(problem.solve().unwrap(), LinearProblemStatus::Optimal);
    let a = problem.setpoint(&hvdc_a, &state).unwrap();
    let b = problem.setpoint(&hvdc_b, &state).unwrap();
    assert_close(a, b, 1e-6);
    assert_close(a, 0.0, 1e-3);
    let margin = problem
        .model()
        .variable(&VariableKey::MinimumMargin { timestamp: None })
        .unwrap();
    assert_close(problem.model().value(margin).unwrap(), 5.0, 1e-3);
}

/// Operators not to optimize are only relaxed after a contingency: in a
/// preventive perimeter the overloaded CNEC of "tsoX" still sets the
/// minimum margin at -10.
#[test]
fn operators_not_to_optimize_stay_in_preventive_objective() {
    let state = preventive();
    let cnec = FlowCnec::new("cnec", "ne", state.clone())
        .with_bounds(Side::One, Some(-100.0), Some(100.0))
        .with_operator("tsoX")
        .into_arc();
    let perimeter = Arc::new(OptimizationPerimeter::new(state).with_cnec(cnec));
    let flows = FlowTable::new().with_flow("cnec", Side::One, 110.0);

    let mut parameters = parameters();
    parameters.unoptimized_cnecs = Some(UnoptimizedCnecParameters {
        operators_not_to_optimize: BTreeSet::from(["tsoX".to_string()]),
        cnecs_secured_by_pst: BTreeMap::new(),
    });
    let mut problem = LinearProblem::builder(parameters)
        .with_perimeter(perimeter)
        .with_initial_flows(Arc::new(flows.clone()))
        .build()
        .unwrap();
    assert!(!problem.filler_ids().iter().any(|id| id.starts_with("unoptimized cnecs")));
    problem.fill(&flows, &SensitivityTable::new()).unwrap();

    assert_eq!(problem.solve().unwrap(), LinearProblemStatus::Optimal);
    assert_close(problem.objective_value().unwrap(), 10.0, 1e-6);
}

/// With at most one action allowed, only the more effective one moves.
#[test]
fn usage_limit_keeps_the_better_actuator() {
    let state = preventive();
    let cnec = FlowCnec::new("cnec", "ne", state.clone())
        .with_bounds(Side::One, Some(-100.0), None)
        .into_arc();
    let ra1 = RangeAction::hvdc("ra1", "ne-ra1", 0.0)
        .with_range(RangeType::Absolute, -10.0, 10.0)
        .into_arc();
    let ra2 = RangeAction::standard("ra2", "ne-ra2", 0.0)
        .with_range(RangeType::Absolute, -10.0, 10.0)
        .into_arc();
    let perimeter = Arc::new(
        OptimizationPerimeter::new(state.clone())
            .with_cnec(cnec)
            .with_range_action(state.clone(), ra1.clone())
            .with_range_action(state.clone(), ra2.clone()),
    );
    let flows = FlowTable::new().with_flow("cnec", Side::One, -50.0);
    let sensitivities = SensitivityTable::new()
        .with_sensitivity("cnec", Side::One, "ra1", 2.0)
        .with_sensitivity("cnec", Side::One, "ra2", 1.0);

    let mut parameters = parameters();
    parameters.ra_usage_limits = BTreeMap::from([(
        "preventive".to_string(),
        RaUsageLimits {
            max_ra: Some(1),
            ..Default::default()
        },
    )]);
    let mut problem = LinearProblem::builder(parameters)
        .with_perimeter(perimeter)
        .build()
        .unwrap();
    problem.fill(&flows, &sensitivities).unwrap();

    assert_eq!(problem.solve().unwrap(), LinearProblemStatus::Optimal);
    assert_close(problem.setpoint(&ra1, &state).unwrap(), 10.0, 1e-3);
    assert!(problem.setpoint(&ra2, &state).unwrap().abs() < 1e-3);
    assert!(problem.is_activated(&ra1, &state).unwrap());
    assert!(!problem.is_activated(&ra2, &state).unwrap());
}
