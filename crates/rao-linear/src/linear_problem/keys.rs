//! Typed identities of the quantities in the linear problem.
//!
//! Fillers address variables and constraints through these keys and get
//! handles back; the string names of [`crate::ids`] only serve
//! diagnostics and lookups by name.

use chrono::{DateTime, Utc};
use rao_core::{FlowCnec, RangeAction, Side, State};

use crate::ids::{
    self, AbsExtension, BoundExtension, MarginExtension, RangeShrinking, VariationDirection,
    VariationReference,
};

/// Group of quantities a filler produces or consumes. The assembler orders
/// fillers so that every consumed family is produced first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    /// Flow variables and flow constraints
    Flow,
    /// Setpoint variable of each (action, state)
    RangeActionSetpoint,
    /// Absolute and signed variations of the setpoints
    RangeActionVariation,
    InjectionBalance,
    MinimumMargin,
    MinimumRelativeMargin,
    MnecViolation,
    LoopFlowViolation,
    OptimizeCnec,
    /// Integer tap variables and the tap-to-angle conversion
    PstTap,
    VirtualSetpoint,
    VirtualTap,
    /// "Action used" binaries
    RangeActionVariationBinary,
    UsageLimit,
    TimestampCoupling,
    SensitivityFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariableKey {
    Flow {
        cnec: String,
        side: Side,
        timestamp: Option<DateTime<Utc>>,
    },
    Setpoint {
        action: String,
        state: State,
    },
    AbsoluteVariation {
        action: String,
        state: State,
    },
    SetpointVariation {
        action: String,
        state: State,
        direction: VariationDirection,
    },
    PstTapVariation {
        action: String,
        state: State,
        direction: VariationDirection,
    },
    PstTapVariationBinary {
        action: String,
        state: State,
        direction: VariationDirection,
    },
    PstTap {
        action: String,
        state: State,
    },
    VirtualSetpoint {
        group: String,
        state: State,
    },
    VirtualTap {
        group: String,
        state: State,
    },
    MinimumMargin {
        timestamp: Option<DateTime<Utc>>,
    },
    MinimumRelativeMargin {
        timestamp: Option<DateTime<Utc>>,
    },
    /// 1 when every margin is non-negative
    MinimumRelativeMarginSign {
        timestamp: Option<DateTime<Utc>>,
    },
    MnecViolation {
        cnec: String,
        side: Side,
        timestamp: Option<DateTime<Utc>>,
    },
    LoopFlowViolation {
        cnec: String,
        side: Side,
        timestamp: Option<DateTime<Utc>>,
    },
    OptimizeCnec {
        cnec: String,
        side: Side,
        timestamp: Option<DateTime<Utc>>,
    },
    RangeActionVariationBinary {
        action: String,
        state: State,
    },
    TsoRaUsed {
        operator: String,
        state: State,
    },
    TsoRaUsedCumulative {
        operator: String,
        state: State,
    },
    PstAbsoluteVariationFromInitialTap {
        action: String,
        state: State,
    },
    SensitivityFailure {
        state: State,
    },
}

impl VariableKey {
    pub fn flow(cnec: &FlowCnec, side: Side) -> Self {
        VariableKey::Flow {
            cnec: cnec.id().to_string(),
            side,
            timestamp: cnec.state().timestamp(),
        }
    }

    pub fn setpoint(action: &RangeAction, state: &State) -> Self {
        VariableKey::Setpoint {
            action: action.id().to_string(),
            state: state.clone(),
        }
    }

    pub fn absolute_variation(action: &RangeAction, state: &State) -> Self {
        VariableKey::AbsoluteVariation {
            action: action.id().to_string(),
            state: state.clone(),
        }
    }

    pub fn setpoint_variation(action: &RangeAction, state: &State, direction: VariationDirection) -> Self {
        VariableKey::SetpointVariation {
            action: action.id().to_string(),
            state: state.clone(),
            direction,
        }
    }

    pub fn pst_tap_variation(action: &RangeAction, state: &State, direction: VariationDirection) -> Self {
        VariableKey::PstTapVariation {
            action: action.id().to_string(),
            state: state.clone(),
            direction,
        }
    }

    pub fn pst_tap_variation_binary(
        action: &RangeAction,
        state: &State,
        direction: VariationDirection,
    ) -> Self {
        VariableKey::PstTapVariationBinary {
            action: action.id().to_string(),
            state: state.clone(),
            direction,
        }
    }

    pub fn pst_tap(action: &RangeAction, state: &State) -> Self {
        VariableKey::PstTap {
            action: action.id().to_string(),
            state: state.clone(),
        }
    }

    pub fn mnec_violation(cnec: &FlowCnec, side: Side) -> Self {
        VariableKey::MnecViolation {
            cnec: cnec.id().to_string(),
            side,
            timestamp: cnec.state().timestamp(),
        }
    }

    pub fn loop_flow_violation(cnec: &FlowCnec, side: Side) -> Self {
        VariableKey::LoopFlowViolation {
            cnec: cnec.id().to_string(),
            side,
            timestamp: cnec.state().timestamp(),
        }
    }

    pub fn optimize_cnec(cnec: &FlowCnec, side: Side) -> Self {
        VariableKey::OptimizeCnec {
            cnec: cnec.id().to_string(),
            side,
            timestamp: cnec.state().timestamp(),
        }
    }

    pub fn range_action_variation_binary(action: &RangeAction, state: &State) -> Self {
        VariableKey::RangeActionVariationBinary {
            action: action.id().to_string(),
            state: state.clone(),
        }
    }

    pub fn pst_absolute_variation_from_initial_tap(action: &RangeAction, state: &State) -> Self {
        VariableKey::PstAbsoluteVariationFromInitialTap {
            action: action.id().to_string(),
            state: state.clone(),
        }
    }

    /// Diagnostic name, see [`crate::ids`].
    pub fn name(&self) -> String {
        match self {
            VariableKey::Flow { cnec, side, timestamp } => ids::flow_variable(cnec, *side, *timestamp),
            VariableKey::Setpoint { action, state } => ids::setpoint_variable(action, state),
            VariableKey::AbsoluteVariation { action, state } => {
                ids::absolute_variation_variable(action, state)
            }
            VariableKey::SetpointVariation { action, state, direction } => {
                ids::setpoint_variation_variable(action, state, *direction)
            }
            VariableKey::PstTapVariation { action, state, direction } => {
                ids::pst_tap_variation_variable(action, state, *direction)
            }
            VariableKey::PstTapVariationBinary { action, state, direction } => {
                ids::pst_tap_variation_binary(action, state, *direction)
            }
            VariableKey::PstTap { action, state } => ids::pst_tap_variable(action, state),
            VariableKey::VirtualSetpoint { group, state } => ids::virtual_setpoint_variable(group, state),
            VariableKey::VirtualTap { group, state } => ids::virtual_tap_variable(group, state),
            VariableKey::MinimumMargin { timestamp } => ids::min_margin_variable(*timestamp),
            VariableKey::MinimumRelativeMargin { timestamp } => {
                ids::min_relative_margin_variable(*timestamp)
            }
            VariableKey::MinimumRelativeMarginSign { timestamp } => {
                ids::min_relative_margin_sign_binary(*timestamp)
            }
            VariableKey::MnecViolation { cnec, side, timestamp } => {
                ids::mnec_violation_variable(cnec, *side, *timestamp)
            }
            VariableKey::LoopFlowViolation { cnec, side, timestamp } => {
                ids::loop_flow_violation_variable(cnec, *side, *timestamp)
            }
            VariableKey::OptimizeCnec { cnec, side, timestamp } => {
                ids::optimize_cnec_binary(cnec, *side, *timestamp)
            }
            VariableKey::RangeActionVariationBinary { action, state } => {
                ids::range_action_variation_binary(action, state)
            }
            VariableKey::TsoRaUsed { operator, state } => ids::tso_ra_used_variable(operator, state),
            VariableKey::TsoRaUsedCumulative { operator, state } => {
                ids::tso_ra_used_cumulative_variable(operator, state)
            }
            VariableKey::PstAbsoluteVariationFromInitialTap { action, state } => {
                ids::pst_absolute_variation_from_initial_tap_variable(action, state)
            }
            VariableKey::SensitivityFailure { state } => ids::sensitivity_failure_variable(state),
        }
    }

    pub fn family(&self) -> Family {
        match self {
            VariableKey::Flow { .. } => Family::Flow,
            VariableKey::Setpoint { .. } => Family::RangeActionSetpoint,
            VariableKey::AbsoluteVariation { .. } | VariableKey::SetpointVariation { .. } => {
                Family::RangeActionVariation
            }
            VariableKey::PstTapVariation { .. }
            | VariableKey::PstTapVariationBinary { .. }
            | VariableKey::PstTap { .. } => Family::PstTap,
            VariableKey::VirtualSetpoint { .. } => Family::VirtualSetpoint,
            VariableKey::VirtualTap { .. } => Family::VirtualTap,
            VariableKey::MinimumMargin { .. } => Family::MinimumMargin,
            VariableKey::MinimumRelativeMargin { .. } | VariableKey::MinimumRelativeMarginSign { .. } => {
                Family::MinimumRelativeMargin
            }
            VariableKey::MnecViolation { .. } => Family::MnecViolation,
            VariableKey::LoopFlowViolation { .. } => Family::LoopFlowViolation,
            VariableKey::OptimizeCnec { .. } => Family::OptimizeCnec,
            VariableKey::RangeActionVariationBinary { .. } => Family::RangeActionVariationBinary,
            VariableKey::TsoRaUsed { .. }
            | VariableKey::TsoRaUsedCumulative { .. }
            | VariableKey::PstAbsoluteVariationFromInitialTap { .. } => Family::UsageLimit,
            VariableKey::SensitivityFailure { .. } => Family::SensitivityFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstraintKey {
    Flow {
        cnec: String,
        side: Side,
        timestamp: Option<DateTime<Utc>>,
    },
    AbsoluteVariation {
        action: String,
        state: State,
    },
    SetpointVariation {
        action: String,
        state: State,
    },
    RelativeSetpoint {
        action: String,
        state: State,
        shrinking: RangeShrinking,
    },
    InjectionBalance {
        state: State,
    },
    MinimumMargin {
        cnec: String,
        side: Side,
        timestamp: Option<DateTime<Utc>>,
        margin: MarginExtension,
    },
    MinimumRelativeMargin {
        cnec: String,
        side: Side,
        timestamp: Option<DateTime<Utc>>,
        margin: MarginExtension,
    },
    MinimumRelativeMarginSign {
        timestamp: Option<DateTime<Utc>>,
    },
    MinimumRelativeMarginSetToZero {
        timestamp: Option<DateTime<Utc>>,
    },
    MnecFlow {
        cnec: String,
        side: Side,
        timestamp: Option<DateTime<Utc>>,
        margin: MarginExtension,
    },
    MaxLoopFlow {
        cnec: String,
        side: Side,
        timestamp: Option<DateTime<Utc>>,
        bound: BoundExtension,
    },
    DontOptimizeCnec {
        cnec: String,
        side: Side,
        timestamp: Option<DateTime<Utc>>,
        margin: MarginExtension,
    },
    TapToAngleConversion {
        action: String,
        state: State,
    },
    UpOrDownPstVariation {
        action: String,
        state: State,
    },
    IsVariationInDirection {
        action: String,
        state: State,
        reference: VariationReference,
        direction: VariationDirection,
    },
    PstTap {
        action: String,
        state: State,
    },
    PstRelativeTap {
        action: String,
        state: State,
    },
    VirtualSetpoint {
        action: String,
        group: String,
        state: State,
    },
    VirtualTap {
        action: String,
        group: String,
        state: State,
    },
    IsVariation {
        action: String,
        state: State,
    },
    MaxRa {
        state: State,
    },
    MaxTso {
        state: State,
    },
    MaxRaPerTso {
        operator: String,
        state: State,
    },
    MaxPstPerTso {
        operator: String,
        state: State,
    },
    TsoRaUsed {
        operator: String,
        action: String,
        state: State,
    },
    TsoRaUsedCumulative {
        operator: String,
        state: State,
    },
    PstAbsoluteVariationFromInitialTap {
        action: String,
        state: State,
        part: AbsExtension,
    },
    MaxElementaryActionsPerTso {
        operator: String,
        state: State,
    },
    TimestampGradient {
        action: String,
        state: State,
    },
}

impl ConstraintKey {
    pub fn flow(cnec: &FlowCnec, side: Side) -> Self {
        ConstraintKey::Flow {
            cnec: cnec.id().to_string(),
            side,
            timestamp: cnec.state().timestamp(),
        }
    }

    pub fn absolute_variation(action: &RangeAction, state: &State) -> Self {
        ConstraintKey::AbsoluteVariation {
            action: action.id().to_string(),
            state: state.clone(),
        }
    }

    pub fn setpoint_variation(action: &RangeAction, state: &State) -> Self {
        ConstraintKey::SetpointVariation {
            action: action.id().to_string(),
            state: state.clone(),
        }
    }

    pub fn relative_setpoint(action: &RangeAction, state: &State, shrinking: RangeShrinking) -> Self {
        ConstraintKey::RelativeSetpoint {
            action: action.id().to_string(),
            state: state.clone(),
            shrinking,
        }
    }

    pub fn minimum_margin(cnec: &FlowCnec, side: Side, margin: MarginExtension) -> Self {
        ConstraintKey::MinimumMargin {
            cnec: cnec.id().to_string(),
            side,
            timestamp: cnec.state().timestamp(),
            margin,
        }
    }

    pub fn minimum_relative_margin(cnec: &FlowCnec, side: Side, margin: MarginExtension) -> Self {
        ConstraintKey::MinimumRelativeMargin {
            cnec: cnec.id().to_string(),
            side,
            timestamp: cnec.state().timestamp(),
            margin,
        }
    }

    pub fn mnec_flow(cnec: &FlowCnec, side: Side, margin: MarginExtension) -> Self {
        ConstraintKey::MnecFlow {
            cnec: cnec.id().to_string(),
            side,
            timestamp: cnec.state().timestamp(),
            margin,
        }
    }

    pub fn max_loop_flow(cnec: &FlowCnec, side: Side, bound: BoundExtension) -> Self {
        ConstraintKey::MaxLoopFlow {
            cnec: cnec.id().to_string(),
            side,
            timestamp: cnec.state().timestamp(),
            bound,
        }
    }

    pub fn dont_optimize_cnec(cnec: &FlowCnec, side: Side, margin: MarginExtension) -> Self {
        ConstraintKey::DontOptimizeCnec {
            cnec: cnec.id().to_string(),
            side,
            timestamp: cnec.state().timestamp(),
            margin,
        }
    }

    pub fn tap_to_angle_conversion(action: &RangeAction, state: &State) -> Self {
        ConstraintKey::TapToAngleConversion {
            action: action.id().to_string(),
            state: state.clone(),
        }
    }

    pub fn is_variation_in_direction(
        action: &RangeAction,
        state: &State,
        reference: VariationReference,
        direction: VariationDirection,
    ) -> Self {
        ConstraintKey::IsVariationInDirection {
            action: action.id().to_string(),
            state: state.clone(),
            reference,
            direction,
        }
    }

    pub fn pst_tap(action: &RangeAction, state: &State) -> Self {
        ConstraintKey::PstTap {
            action: action.id().to_string(),
            state: state.clone(),
        }
    }

    pub fn pst_relative_tap(action: &RangeAction, state: &State) -> Self {
        ConstraintKey::PstRelativeTap {
            action: action.id().to_string(),
            state: state.clone(),
        }
    }

    pub fn pst_absolute_variation_from_initial_tap(
        action: &RangeAction,
        state: &State,
        part: AbsExtension,
    ) -> Self {
        ConstraintKey::PstAbsoluteVariationFromInitialTap {
            action: action.id().to_string(),
            state: state.clone(),
            part,
        }
    }

    /// Diagnostic name, see [`crate::ids`].
    pub fn name(&self) -> String {
        match self {
            ConstraintKey::Flow { cnec, side, timestamp } => ids::flow_constraint(cnec, *side, *timestamp),
            ConstraintKey::AbsoluteVariation { action, state } => {
                ids::absolute_variation_constraint(action, state)
            }
            ConstraintKey::SetpointVariation { action, state } => {
                ids::setpoint_variation_constraint(action, state)
            }
            ConstraintKey::RelativeSetpoint { action, state, shrinking } => {
                ids::relative_setpoint_constraint(action, state, *shrinking)
            }
            ConstraintKey::InjectionBalance { state } => ids::injection_balance_constraint(state),
            ConstraintKey::MinimumMargin { cnec, side, timestamp, margin } => {
                ids::min_margin_constraint(cnec, *side, *timestamp, *margin)
            }
            ConstraintKey::MinimumRelativeMargin { cnec, side, timestamp, margin } => {
                ids::min_relative_margin_constraint(cnec, *side, *timestamp, *margin)
            }
            ConstraintKey::MinimumRelativeMarginSign { timestamp } => {
                ids::min_relative_margin_sign_constraint(*timestamp)
            }
            ConstraintKey::MinimumRelativeMarginSetToZero { timestamp } => {
                ids::min_relative_margin_set_to_zero_constraint(*timestamp)
            }
            ConstraintKey::MnecFlow { cnec, side, timestamp, margin } => {
                ids::mnec_flow_constraint(cnec, *side, *timestamp, *margin)
            }
            ConstraintKey::MaxLoopFlow { cnec, side, timestamp, bound } => {
                ids::max_loop_flow_constraint(cnec, *side, *timestamp, *bound)
            }
            ConstraintKey::DontOptimizeCnec { cnec, side, timestamp, margin } => {
                ids::dont_optimize_cnec_constraint(cnec, *side, *timestamp, *margin)
            }
            ConstraintKey::TapToAngleConversion { action, state } => {
                ids::tap_to_angle_conversion_constraint(action, state)
            }
            ConstraintKey::UpOrDownPstVariation { action, state } => {
                ids::up_or_down_variation_constraint(action, state)
            }
            ConstraintKey::IsVariationInDirection { action, state, reference, direction } => {
                ids::is_variation_in_direction_constraint(action, state, *reference, *direction)
            }
            ConstraintKey::PstTap { action, state } => ids::pst_tap_constraint(action, state),
            ConstraintKey::PstRelativeTap { action, state } => ids::pst_relative_tap_constraint(action, state),
            ConstraintKey::VirtualSetpoint { action, group, state } => {
                ids::virtual_setpoint_constraint(action, group, state)
            }
            ConstraintKey::VirtualTap { action, group, state } => {
                ids::virtual_tap_constraint(action, group, state)
            }
            ConstraintKey::IsVariation { action, state } => ids::is_variation_constraint(action, state),
            ConstraintKey::MaxRa { state } => ids::max_ra_constraint(state),
            ConstraintKey::MaxTso { state } => ids::max_tso_constraint(state),
            ConstraintKey::MaxRaPerTso { operator, state } => ids::max_ra_per_tso_constraint(operator, state),
            ConstraintKey::MaxPstPerTso { operator, state } => ids::max_pst_per_tso_constraint(operator, state),
            ConstraintKey::TsoRaUsed { operator, action, state } => {
                ids::tso_ra_used_constraint(operator, action, state)
            }
            ConstraintKey::TsoRaUsedCumulative { operator, state } => {
                ids::tso_ra_used_cumulative_constraint(operator, state)
            }
            ConstraintKey::PstAbsoluteVariationFromInitialTap { action, state, part } => {
                ids::pst_absolute_variation_from_initial_tap_constraint(action, state, *part)
            }
            ConstraintKey::MaxElementaryActionsPerTso { operator, state } => {
                ids::max_elementary_actions_per_tso_constraint(operator, state)
            }
            ConstraintKey::TimestampGradient { action, state } => {
                ids::timestamp_gradient_constraint(action, state)
            }
        }
    }

    pub fn family(&self) -> Family {
        match self {
            ConstraintKey::Flow { .. } => Family::Flow,
            ConstraintKey::AbsoluteVariation { .. }
            | ConstraintKey::SetpointVariation { .. }
            | ConstraintKey::RelativeSetpoint { .. } => Family::RangeActionVariation,
            ConstraintKey::InjectionBalance { .. } => Family::InjectionBalance,
            ConstraintKey::MinimumMargin { .. } => Family::MinimumMargin,
            ConstraintKey::MinimumRelativeMargin { .. }
            | ConstraintKey::MinimumRelativeMarginSign { .. }
            | ConstraintKey::MinimumRelativeMarginSetToZero { .. } => Family::MinimumRelativeMargin,
            ConstraintKey::MnecFlow { .. } => Family::MnecViolation,
            ConstraintKey::MaxLoopFlow { .. } => Family::LoopFlowViolation,
            ConstraintKey::DontOptimizeCnec { .. } => Family::OptimizeCnec,
            ConstraintKey::TapToAngleConversion { .. }
            | ConstraintKey::UpOrDownPstVariation { .. }
            | ConstraintKey::IsVariationInDirection { .. }
            | ConstraintKey::PstTap { .. }
            | ConstraintKey::PstRelativeTap { .. } => Family::PstTap,
            ConstraintKey::VirtualSetpoint { .. } => Family::VirtualSetpoint,
            ConstraintKey::VirtualTap { .. } => Family::VirtualTap,
            ConstraintKey::IsVariation { .. } => Family::RangeActionVariationBinary,
            ConstraintKey::MaxRa { .. }
            | ConstraintKey::MaxTso { .. }
            | ConstraintKey::MaxRaPerTso { .. }
            | ConstraintKey::MaxPstPerTso { .. }
            | ConstraintKey::TsoRaUsed { .. }
            | ConstraintKey::TsoRaUsedCumulative { .. }
            | ConstraintKey::PstAbsoluteVariationFromInitialTap { .. }
            | ConstraintKey::MaxElementaryActionsPerTso { .. } => Family::UsageLimit,
            ConstraintKey::TimestampGradient { .. } => Family::TimestampCoupling,
        }
    }
}
