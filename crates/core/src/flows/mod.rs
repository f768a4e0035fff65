pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, FulfillmentFlow};
pub use states::{FlowContext, PipelineAction, PipelineEvent, PipelineState, TransitionOutcome};
