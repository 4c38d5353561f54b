//! Assembly of a [`LinearProblem`] from parameters and perimeters.
//!
//! The parameters decide which fillers exist; the families each filler
//! produces and consumes decide their order. Fillers are sorted
//! topologically, insertion order breaking ties, so the natural order
//! below is kept whenever it is legal.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rao_core::{
    FlowCnec, FlowResult, LinearOptimizerParameters, ObjectiveFunctionType, OptimizationPerimeter, SetpointTable,
    State,
};
use tracing::{debug, info};

use crate::error::{LinearProblemError, LinearProblemResult};
use crate::fillers::{
    BetweenTimestampsFiller, ContinuousGroupFiller, CoreProblemFiller, DiscretePstGroupFiller, DiscretePstTapFiller,
    MaxLoopFlowFiller, MaxMinMarginFiller, MaxMinRelativeMarginFiller, MnecFiller, ProblemFiller, RaUsageLimitsFiller,
    SensitivityFailureFiller, UnoptimizedCnecFiller,
};
use crate::solver::{MilpSolver, SolverBackend};

use super::{LinearModel, LinearProblem, LinearProblemState};

/// Builder for [`LinearProblem`].
pub struct LinearProblemBuilder {
    parameters: LinearOptimizerParameters,
    perimeters: Vec<Arc<OptimizationPerimeter>>,
    initial_flows: Option<Arc<dyn FlowResult>>,
    pre_perimeter_setpoints: Arc<SetpointTable>,
    extra_fillers: Vec<Box<dyn ProblemFiller>>,
}

impl LinearProblemBuilder {
    pub fn new(parameters: LinearOptimizerParameters) -> Self {
        Self {
            parameters,
            perimeters: Vec::new(),
            initial_flows: None,
            pre_perimeter_setpoints: Arc::new(SetpointTable::new()),
            extra_fillers: Vec::new(),
        }
    }

    /// Add an optimization perimeter. Several perimeters need
    /// `multi_timestep`; they are ordered by timestamp.
    pub fn with_perimeter(mut self, perimeter: Arc<OptimizationPerimeter>) -> Self {
        self.perimeters.push(perimeter);
        self
    }

    /// Flows before any optimization, the reference of MNEC, loop-flow,
    /// unoptimized-CNEC and relative-margin fillers.
    pub fn with_initial_flows(mut self, flows: Arc<dyn FlowResult>) -> Self {
        self.initial_flows = Some(flows);
        self
    }

    /// Setpoints at the start of the perimeter. Missing actions use their
    /// initial setpoint.
    pub fn with_pre_perimeter_setpoints(mut self, setpoints: Arc<SetpointTable>) -> Self {
        self.pre_perimeter_setpoints = setpoints;
        self
    }

    /// Add a filler after the built-in ones; it is ordered with them.
    pub fn with_filler(mut self, filler: Box<dyn ProblemFiller>) -> Self {
        self.extra_fillers.push(filler);
        self
    }

    fn initial_flows(&self, purpose: &str) -> LinearProblemResult<Arc<dyn FlowResult>> {
        self.initial_flows.clone().ok_or_else(|| {
            LinearProblemError::Config(format!("{purpose} needs initial flows, see with_initial_flows"))
        })
    }

    fn ordered_perimeters(&self) -> LinearProblemResult<Vec<Arc<OptimizationPerimeter>>> {
        if self.perimeters.is_empty() {
            return Err(LinearProblemError::Config("no optimization perimeter given".into()));
        }
        if self.perimeters.len() > 1 && !self.parameters.multi_timestep {
            return Err(LinearProblemError::Config(format!(
                "{} perimeters given but multi_timestep is disabled",
                self.perimeters.len()
            )));
        }
        let mut perimeters = self.perimeters.clone();
        perimeters.sort_by_key(|p| p.main_state().timestamp());
        for pair in perimeters.windows(2) {
            if pair[0].main_state().timestamp() == pair[1].main_state().timestamp() {
                return Err(LinearProblemError::Config(format!(
                    "perimeters {} and {} share a timestamp",
                    pair[0].main_state(),
                    pair[1].main_state()
                )));
            }
        }
        for perimeter in &perimeters {
            perimeter.validate()?;
        }
        Ok(perimeters)
    }

    fn built_in_fillers(&self, perimeters: &[Arc<OptimizationPerimeter>]) -> LinearProblemResult<Vec<Box<dyn ProblemFiller>>> {
        let parameters = &self.parameters;
        let pre = &self.pre_perimeter_setpoints;
        let approximated = parameters.range_actions.approximated_integers();
        let mut fillers: Vec<Box<dyn ProblemFiller>> = Vec::new();

        for perimeter in perimeters {
            fillers.push(Box::new(CoreProblemFiller::new(
                perimeter.clone(),
                pre.clone(),
                parameters.range_actions.clone(),
            )));
        }

        let optimized: Vec<Arc<FlowCnec>> = perimeters
            .iter()
            .flat_map(|p| p.optimized_cnecs().cloned())
            .collect();
        match parameters.objective.kind {
            ObjectiveFunctionType::MaxMinMargin => fillers.push(Box::new(MaxMinMarginFiller::new(optimized))),
            ObjectiveFunctionType::MaxMinRelativeMargin => fillers.push(Box::new(MaxMinRelativeMarginFiller::new(
                optimized,
                self.initial_flows("relative margin objective")?,
                parameters.objective.ptdf_sum_lower_bound,
            ))),
        }

        for perimeter in perimeters {
            if let Some(mnec) = &parameters.mnec {
                if perimeter.monitored_cnecs().next().is_some() {
                    fillers.push(Box::new(MnecFiller::new(
                        perimeter,
                        self.initial_flows("MNEC limitation")?,
                        mnec.clone(),
                    )));
                }
            }
            if let Some(loop_flow) = &parameters.loop_flow {
                if perimeter.loop_flow_cnecs().next().is_some() {
                    fillers.push(Box::new(MaxLoopFlowFiller::new(
                        perimeter,
                        self.initial_flows("loop-flow limitation")?,
                        loop_flow.clone(),
                    )));
                }
            }
            if let Some(unoptimized) = parameters
                .unoptimized_cnecs
                .as_ref()
                .filter(|u| u.applies_to(perimeter.main_state()))
            {
                fillers.push(Box::new(UnoptimizedCnecFiller::new(
                    perimeter.clone(),
                    self.initial_flows("unoptimized CNECs")?,
                    unoptimized.clone(),
                    parameters.range_actions.clone(),
                )));
            }
        }

        let has_group = |p: &OptimizationPerimeter, psts_only: bool| {
            p.range_actions_per_state()
                .values()
                .flatten()
                .any(|ra| ra.group_id().is_some() && (!psts_only || ra.is_pst()))
        };
        let has_non_pst_group = |p: &OptimizationPerimeter| {
            p.range_actions_per_state()
                .values()
                .flatten()
                .any(|ra| ra.group_id().is_some() && !ra.is_pst())
        };
        for perimeter in perimeters {
            if approximated {
                fillers.push(Box::new(DiscretePstTapFiller::new(perimeter.clone(), pre.clone())));
                if has_group(perimeter, true) {
                    fillers.push(Box::new(DiscretePstGroupFiller::new(perimeter.clone())));
                }
                if has_non_pst_group(perimeter) {
                    fillers.push(Box::new(ContinuousGroupFiller::new(perimeter.clone()).without_psts()));
                }
            } else if has_group(perimeter, false) {
                fillers.push(Box::new(ContinuousGroupFiller::new(perimeter.clone())));
            }
        }

        if parameters.multi_timestep && perimeters.len() > 1 {
            fillers.push(Box::new(BetweenTimestampsFiller::new(perimeters.to_vec(), approximated)));
        }

        if parameters.sensitivity_failure_overcost > 0.0 {
            let states: BTreeSet<State> = perimeters.iter().flat_map(|p| p.states()).collect();
            fillers.push(Box::new(SensitivityFailureFiller::new(
                states.into_iter().collect(),
                parameters.sensitivity_failure_overcost,
            )));
        }

        for perimeter in perimeters {
            let limited = perimeter
                .range_actions_per_state()
                .keys()
                .any(|state| parameters.usage_limits(state.instant().id()).is_some());
            if limited {
                fillers.push(Box::new(RaUsageLimitsFiller::new(
                    perimeter.clone(),
                    pre.clone(),
                    parameters.ra_usage_limits.clone(),
                    approximated,
                )));
            }
        }
        Ok(fillers)
    }

    pub fn build(self) -> LinearProblemResult<LinearProblem> {
        self.parameters.validate()?;
        let backend: SolverBackend = self.parameters.solver.backend.parse()?;
        let perimeters = self.ordered_perimeters()?;

        let mut fillers = self.built_in_fillers(&perimeters)?;
        fillers.extend(self.extra_fillers);

        if !backend.supports_integers() {
            if let Some(filler) = fillers.iter().find(|f| f.requires_integers()) {
                return Err(LinearProblemError::Config(format!(
                    "filler {} needs integer variables, which backend {} does not support",
                    filler.id(),
                    backend
                )));
            }
        }

        let fillers = order_fillers(fillers)?;
        debug!(
            "Filler order: {}",
            fillers.iter().map(|f| f.id()).collect::<Vec<_>>().join(", ")
        );

        let solver_parameters = &self.parameters.solver;
        let solver = MilpSolver::new(backend, solver_parameters.rounding_bits)
            .with_time_limit(solver_parameters.max_time_seconds);
        info!(
            "Linear problem built: {} fillers, {} perimeters, backend {}",
            fillers.len(),
            perimeters.len(),
            backend
        );
        Ok(LinearProblem {
            model: LinearModel::new(solver),
            fillers,
            perimeters,
            pre_perimeter_setpoints: self.pre_perimeter_setpoints,
            relative_mip_gap: solver_parameters.relative_mip_gap,
            tuning: solver_parameters.tuning.clone(),
            approximated_integers: self.parameters.range_actions.approximated_integers(),
            state: LinearProblemState::Empty,
        })
    }
}

/// Stable topological order of `fillers`: an edge goes from every producer
/// of a family to every consumer of it.
fn order_fillers(fillers: Vec<Box<dyn ProblemFiller>>) -> LinearProblemResult<Vec<Box<dyn ProblemFiller>>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(fillers.len(), 0);
    let nodes: Vec<NodeIndex> = (0..fillers.len()).map(|i| graph.add_node(i)).collect();

    let mut producers: BTreeMap<_, Vec<usize>> = BTreeMap::new();
    for (i, filler) in fillers.iter().enumerate() {
        for family in filler.produces() {
            producers.entry(family).or_default().push(i);
        }
    }
    for (i, filler) in fillers.iter().enumerate() {
        for family in filler.consumes() {
            let Some(sources) = producers.get(&family) else {
                return Err(LinearProblemError::MissingProducer {
                    filler: filler.id().to_string(),
                    family,
                });
            };
            for &source in sources.iter().filter(|&&source| source != i) {
                graph.update_edge(nodes[source], nodes[i], ());
            }
        }
    }

    // Kahn's algorithm, lowest insertion index first
    let mut in_degree: Vec<usize> = nodes
        .iter()
        .map(|&node| graph.neighbors_directed(node, Direction::Incoming).count())
        .collect();
    let mut ready: BTreeSet<usize> = (0..fillers.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(fillers.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for next in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
            let j = graph[next];
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if order.len() < fillers.len() {
        let mut cycle: Vec<String> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .flatten()
            .map(|node| fillers[graph[node]].id().to_string())
            .collect();
        cycle.sort();
        return Err(LinearProblemError::DependencyCycle { fillers: cycle });
    }

    let mut slots: Vec<Option<Box<dyn ProblemFiller>>> = fillers.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
