pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, PaymentFlow};
pub use states::{
    FlowAction, FlowContext, FlowType, PaymentEvent, PaymentState, TransitionOutcome,
};
