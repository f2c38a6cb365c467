//! Resilient invocation: classification, transcript repair, and the
//! candidate loop.

mod classify;
mod options;
mod orchestrator;
mod sanitize;

pub use classify::{FailureClass, InvocationOutcome, classify, classify_text};
pub use options::InvokeOptions;
pub use orchestrator::{DEFAULT_INVOKE_TIMEOUT, Invocation, Orchestrator};
pub use sanitize::{INTERRUPTED_TOOL_RESULT, repair_pending_tool_calls};
