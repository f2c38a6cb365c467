//! Model routing - task to candidate resolution

mod candidate;
mod corrections;
mod resolver;

pub use candidate::{EXTENDED_THINKING_VARIANT, ModelCandidate, ModelSpec, Provider};
pub use corrections::corrected_model_name;
pub use resolver::{
    AgentTask, DEFAULT_REPEAT_ATTEMPTS, ModelResolver, ResolverConfig, TaskResolutionRequest,
};
