//! Fill / refresh / update / solve ordering of the linear problem.

use std::sync::Arc;

use rao_core::{
    FlowCnec, FlowTable, Instant, LinearOptimizerParameters, OptimizationPerimeter, RangeAction,
    RangeActionActivation, RangeType, SensitivityTable, SetpointTable, Side, State,
};
use rao_linear::{
    ConstraintKey, LinearProblem, LinearProblemError, LinearProblemState, LinearProblemStatus, VariableKey,
};

fn problem() -> (LinearProblem, Arc<RangeAction>, State) {
    let state = State::preventive(Instant::preventive());
    let cnec = FlowCnec::new("cnec", "ne", state.clone())
        .with_bounds(Side::One, Some(-100.0), Some(100.0))
        .into_arc();
    let hvdc = RangeAction::hvdc("hvdc", "ne-hvdc", 0.0)
        .with_range(RangeType::Absolute, -10.0, 10.0)
        .into_arc();
    let perimeter = Arc::new(
        OptimizationPerimeter::new(state.clone())
            .with_cnec(cnec)
            .with_range_action(state.clone(), hvdc.clone()),
    );
    let problem = LinearProblem::builder(LinearOptimizerParameters::default())
        .with_perimeter(perimeter)
        .build()
        .unwrap();
    (problem, hvdc, state)
}

fn inputs(flow: f64) -> (FlowTable, SensitivityTable) {
    (
        FlowTable::new().with_flow("cnec", Side::One, flow),
        SensitivityTable::new().with_sensitivity("cnec", Side::One, "hvdc", 1.0),
    )
}

#[test]
fn operations_on_empty_problem_fail() {
    let (mut problem, _, _) = problem();
    let (flows, sensitivities) = inputs(90.0);
    let activation = RangeActionActivation::new(Arc::new(SetpointTable::new()));

    assert!(matches!(
        problem.solve(),
        Err(LinearProblemError::NotFilled { .. })
    ));
    assert!(matches!(
        problem.update_between_mip_iteration(&activation),
        Err(LinearProblemError::NotFilled { .. })
    ));
    assert!(matches!(
        problem.refresh_between_sensitivity_iteration(&flows, &sensitivities, &activation),
        Err(LinearProblemError::NotFilled { .. })
    ));
    assert_eq!(problem.state(), LinearProblemState::Empty);
    assert_eq!(problem.status(), LinearProblemStatus::NotSolved);
}

#[test]
fn second_fill_fails_on_duplicate_names() {
    let (mut problem, _, _) = problem();
    let (flows, sensitivities) = inputs(90.0);
    problem.fill(&flows, &sensitivities).unwrap();
    assert!(matches!(
        problem.fill(&flows, &sensitivities),
        Err(LinearProblemError::DuplicateVariable(_))
    ));
}

#[test]
fn refresh_rebuilds_the_model() {
    let (mut problem, hvdc, state) = problem();
    let (flows, sensitivities) = inputs(90.0);
    problem.fill(&flows, &sensitivities).unwrap();
    assert_eq!(problem.state(), LinearProblemState::Filled);

    let before = problem
        .model()
        .variable(&VariableKey::setpoint(&hvdc, &state))
        .unwrap();
    let variables = problem.model().num_variables();
    let constraints = problem.model().num_constraints();

    assert_eq!(problem.solve().unwrap(), LinearProblemStatus::Optimal);
    assert_eq!(problem.state(), LinearProblemState::Solved);
    // Flow 90 with sensitivity 1: the action brings the flow to 80
    let setpoint = problem.setpoint(&hvdc, &state).unwrap();
    assert!((setpoint + 10.0).abs() < 1e-3, "setpoint {setpoint}");

    let activation = problem.activation().unwrap();
    let (flows, sensitivities) = inputs(80.0);
    problem
        .refresh_between_sensitivity_iteration(&flows, &sensitivities, &activation)
        .unwrap();
    assert_eq!(problem.state(), LinearProblemState::Refreshed);
    assert_eq!(problem.status(), LinearProblemStatus::NotSolved);
    assert_eq!(problem.model().num_variables(), variables);
    assert_eq!(problem.model().num_constraints(), constraints);

    // Handles from before the refresh are stale, names resolve again
    assert!(matches!(
        problem.model().variable_lb(before),
        Err(LinearProblemError::StaleHandle { .. })
    ));
    let after = problem
        .variable_by_name("hvdc_preventive_setpoint_variable")
        .unwrap();
    assert_ne!(before, after);

    // The flow constraint is now linearised around the new setpoint
    let flow_constraint = problem
        .model()
        .constraint(&ConstraintKey::flow(
            &FlowCnec::new("cnec", "ne", state.clone()),
            Side::One,
        ))
        .unwrap();
    let rhs = problem.model().constraint_lb(flow_constraint).unwrap();
    assert!((rhs - (80.0 - activation_setpoint(&activation, &hvdc, &state))).abs() < 1e-3);
}

fn activation_setpoint(activation: &RangeActionActivation, ra: &RangeAction, state: &State) -> f64 {
    use rao_core::RangeActionActivationResult;
    activation.optimized_setpoint(ra, state)
}

#[test]
fn lookups_by_unknown_name_fail_fast() {
    let (mut problem, _, _) = problem();
    let (flows, sensitivities) = inputs(90.0);
    problem.fill(&flows, &sensitivities).unwrap();
    assert!(matches!(
        problem.variable_by_name("nothing_variable"),
        Err(LinearProblemError::VariableNotFound(_))
    ));
    assert!(matches!(
        problem.constraint_by_name("nothing_constraint"),
        Err(LinearProblemError::ConstraintNotFound(_))
    ));
    assert!(problem.constraint_by_name("cnec_one_flow_constraint").is_ok());
}

#[test]
fn values_need_a_solution() {
    let (mut problem, hvdc, state) = problem();
    let (flows, sensitivities) = inputs(90.0);
    problem.fill(&flows, &sensitivities).unwrap();
    assert!(matches!(
        problem.setpoint(&hvdc, &state),
        Err(LinearProblemError::NoSolution(LinearProblemStatus::NotSolved))
    ));
}

#[test]
fn lp_dump_names_every_quantity() {
    let (mut problem, _, _) = problem();
    let (flows, sensitivities) = inputs(90.0);
    problem.fill(&flows, &sensitivities).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("problem.lp");
    problem.write_lp(&path).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("cnec_one_flow_constraint"));
    assert!(contents.contains("hvdc_preventive_setpoint_variable"));
}
