//! Sensitivity / MILP iterations.
//!
//! The linear problem is only valid around the setpoints its sensitivities
//! were computed with. [`IteratingLinearOptimizer`] alternates solving the
//! problem with recomputing flows and sensitivities at the solution, keeps
//! the best activation seen, and stops when the solution no longer moves,
//! gets worse, or the iteration budget is spent.

use std::fmt;
use std::sync::Arc;

use rao_core::{
    ComputationStatus, FlowCnec, FlowResult, LinearOptimizerParameters, OptimizationPerimeter, RangeActionActivation,
    SensitivityResult, State,
};
use tracing::{debug, info, warn};

use crate::error::LinearProblemResult;
use crate::linear_problem::{LinearProblem, LinearProblemState};
use crate::solver::LinearProblemStatus;

/// Largest setpoint change still considered "the same solution".
const CONVERGENCE_TOLERANCE: f64 = 1e-6;

/// Flows and sensitivities computed for one activation.
#[derive(Clone)]
pub struct SensitivityOutcome {
    pub flows: Arc<dyn FlowResult>,
    pub sensitivities: Arc<dyn SensitivityResult>,
}

/// External power-flow engine.
pub trait SensitivityEngine {
    fn compute(&mut self, activation: &RangeActionActivation) -> anyhow::Result<SensitivityOutcome>;
}

/// Cost of a network situation; lower is better.
pub trait ObjectiveEvaluator {
    fn evaluate(&self, outcome: &SensitivityOutcome) -> f64;
}

/// Negated minimum margin over the optimized CNECs, plus an overcost per
/// state whose sensitivities failed.
pub struct MinMarginEvaluator {
    cnecs: Vec<Arc<FlowCnec>>,
    sensitivity_failure_overcost: f64,
}

impl MinMarginEvaluator {
    pub fn new(perimeters: &[Arc<OptimizationPerimeter>], sensitivity_failure_overcost: f64) -> Self {
        Self {
            cnecs: perimeters
                .iter()
                .flat_map(|p| p.optimized_cnecs().cloned())
                .collect(),
            sensitivity_failure_overcost,
        }
    }
}

impl ObjectiveEvaluator for MinMarginEvaluator {
    fn evaluate(&self, outcome: &SensitivityOutcome) -> f64 {
        let mut failed: Vec<&State> = Vec::new();
        let mut min_margin = f64::INFINITY;
        for cnec in &self.cnecs {
            if outcome.sensitivities.status(cnec.state()) == ComputationStatus::Failure {
                if !failed.contains(&cnec.state()) {
                    failed.push(cnec.state());
                }
                continue;
            }
            for side in cnec.sides() {
                let margin = outcome.flows.margin(cnec, side);
                if margin.is_finite() {
                    min_margin = min_margin.min(margin);
                }
            }
        }
        let functional = if min_margin.is_finite() { -min_margin } else { 0.0 };
        functional + self.sensitivity_failure_overcost * failed.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The solution did not move since the previous iteration
    Converged,
    MaxIterations,
    /// The new solution evaluated worse than the best one
    WorseResult,
    /// The solver returned no solution
    SolverFailure,
    /// The sensitivity engine failed on the new solution
    SensitivityFailure,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::Converged => "converged",
            StopReason::MaxIterations => "max iterations",
            StopReason::WorseResult => "worse result",
            StopReason::SolverFailure => "solver failure",
            StopReason::SensitivityFailure => "sensitivity failure",
        };
        f.write_str(text)
    }
}

/// Best activation found and why the iterations stopped.
pub struct IterationOutcome {
    pub activation: RangeActionActivation,
    pub cost: f64,
    /// Flows and sensitivities at `activation`
    pub sensitivity: SensitivityOutcome,
    /// Status of the last solve
    pub status: LinearProblemStatus,
    /// Number of solves performed
    pub iterations: usize,
    pub stop_reason: StopReason,
}

pub struct IteratingLinearOptimizer {
    max_iterations: usize,
    range_shrinking: bool,
}

impl IteratingLinearOptimizer {
    pub fn new(parameters: &LinearOptimizerParameters) -> Self {
        Self {
            max_iterations: parameters.max_iterations,
            range_shrinking: parameters.range_actions.range_shrinking,
        }
    }

    /// Pre-perimeter setpoints of every action of the problem, as an
    /// explicit activation comparable with solved ones.
    fn reference_activation(problem: &LinearProblem) -> RangeActionActivation {
        let reference = problem.pre_perimeter_setpoints();
        let mut activation = RangeActionActivation::new(reference.clone());
        for perimeter in problem.perimeters() {
            for (state, actions) in perimeter.range_actions_per_state() {
                for ra in actions {
                    if ra.is_pst() {
                        activation.set_tap(ra, state, reference.tap(ra));
                    } else {
                        activation.set_setpoint(ra, state, reference.setpoint(ra));
                    }
                }
            }
        }
        activation
    }

    /// Solve, and in the integer tap model solve again once the tap
    /// conversion is linearised around the first solution.
    fn solve(problem: &mut LinearProblem) -> LinearProblemResult<LinearProblemStatus> {
        let status = problem.solve()?;
        if !problem.approximated_integers() || !status.has_solution() {
            return Ok(status);
        }
        let activation = problem.activation()?;
        problem.update_between_mip_iteration(&activation)?;
        problem.solve()
    }

    pub fn optimize(
        &self,
        problem: &mut LinearProblem,
        initial: SensitivityOutcome,
        engine: &mut dyn SensitivityEngine,
        evaluator: &dyn ObjectiveEvaluator,
    ) -> LinearProblemResult<IterationOutcome> {
        let mut previous = Self::reference_activation(problem);
        let mut best = IterationOutcome {
            activation: previous.clone(),
            cost: evaluator.evaluate(&initial),
            sensitivity: initial.clone(),
            status: LinearProblemStatus::NotSolved,
            iterations: 0,
            stop_reason: StopReason::MaxIterations,
        };
        info!("Initial cost {:.4}", best.cost);

        if problem.state() == LinearProblemState::Empty {
            problem.fill(initial.flows.as_ref(), initial.sensitivities.as_ref())?;
        } else {
            problem.refresh_between_sensitivity_iteration(
                initial.flows.as_ref(),
                initial.sensitivities.as_ref(),
                &previous,
            )?;
        }

        for iteration in 1..=self.max_iterations {
            best.iterations = iteration;
            best.status = Self::solve(problem)?;
            if !best.status.has_solution() {
                warn!("Iteration {}: no solution ({})", iteration, best.status);
                best.stop_reason = StopReason::SolverFailure;
                return Ok(best);
            }

            let candidate = problem.activation()?;
            if candidate.max_setpoint_difference(&previous) < CONVERGENCE_TOLERANCE {
                debug!("Iteration {}: same setpoints as the previous iteration", iteration);
                best.stop_reason = StopReason::Converged;
                return Ok(best);
            }

            let outcome = match engine.compute(&candidate) {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!("Iteration {}: sensitivity computation failed: {:#}", iteration, err);
                    best.stop_reason = StopReason::SensitivityFailure;
                    return Ok(best);
                }
            };
            let cost = evaluator.evaluate(&outcome);
            if cost < best.cost {
                info!("Iteration {}: cost improved from {:.4} to {:.4}", iteration, best.cost, cost);
                best.activation = candidate.clone();
                best.cost = cost;
                best.sensitivity = outcome.clone();
            } else {
                info!("Iteration {}: cost {:.4} not better than {:.4}", iteration, cost, best.cost);
                if !self.range_shrinking {
                    best.stop_reason = StopReason::WorseResult;
                    return Ok(best);
                }
            }

            if iteration < self.max_iterations {
                problem.refresh_between_sensitivity_iteration(
                    outcome.flows.as_ref(),
                    outcome.sensitivities.as_ref(),
                    &candidate,
                )?;
            }
            previous = candidate;
        }

        info!("Stopped after {} iterations, cost {:.4}", best.iterations, best.cost);
        best.stop_reason = StopReason::MaxIterations;
        Ok(best)
    }
}
