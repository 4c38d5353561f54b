//! Shared fixtures for filler unit tests.

use std::sync::Arc;

use rao_core::{FlowTable, RangeAction, RangeActionActivation, SensitivityTable, SetpointTable, TapTable};

use super::FillInput;
use crate::linear_problem::LinearModel;
use crate::solver::{MilpSolver, SolverBackend, DEFAULT_ROUNDING_BITS};

/// Empty model on the first compiled-in backend.
pub(crate) fn model() -> LinearModel {
    let backend = SolverBackend::available()[0]
        .parse::<SolverBackend>()
        .unwrap();
    LinearModel::new(MilpSolver::new(backend, DEFAULT_ROUNDING_BITS))
}

/// Model on a backend that handles integer variables.
pub(crate) fn integer_model() -> LinearModel {
    let backend = SolverBackend::available()
        .iter()
        .filter_map(|name| name.parse::<SolverBackend>().ok())
        .find(|b| b.supports_integers())
        .expect("no integer-capable backend compiled in");
    LinearModel::new(MilpSolver::new(backend, DEFAULT_ROUNDING_BITS))
}

/// PST with taps [-16, 16], 0.5 degree per tap, starting at tap 0.
pub(crate) fn pst(id: &str, network_element: &str) -> RangeAction {
    RangeAction::pst(id, network_element, TapTable::linear(-16, 16, 0.5, 0).unwrap())
}

/// Owned flow, sensitivity and activation tables a [`FillInput`] borrows.
pub(crate) struct Inputs {
    pub flows: FlowTable,
    pub sensitivities: SensitivityTable,
    pub activation: RangeActionActivation,
}

impl Inputs {
    pub fn new(setpoints: Arc<SetpointTable>) -> Self {
        Self {
            flows: FlowTable::new(),
            sensitivities: SensitivityTable::new(),
            activation: RangeActionActivation::new(setpoints),
        }
    }

    pub fn input(&self) -> FillInput<'_> {
        FillInput {
            flow: &self.flows,
            sensitivity: &self.sensitivities,
            activation: &self.activation,
        }
    }
}
