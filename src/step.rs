//! The minimal executable workflow unit.

use crate::agent::Agent;
use crate::error::WorkflowError;
use crate::output::{Content, StepOutput};
use crate::state::SharedState;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Type-safe step name wrapper.
///
/// # Examples
///
/// ```
/// use kumihimo::StepName;
///
/// let name = StepName::new("draft_report");
/// assert_eq!(name.as_str(), "draft_report");
///
/// let name: StepName = "review".into();
/// assert_eq!(name.as_str(), "review");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What a step does when its underlying agent call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Convert the failure into `StepOutput { success: false, error }` and
    /// let the workflow keep moving. This is the default.
    #[default]
    Capture,
    /// Propagate the failure as a [`WorkflowError`], aborting a sequential
    /// run at this step.
    Propagate,
}

/// A workflow step: consumes the previous output plus shared state,
/// produces an output payload.
///
/// Steps are immutable once constructed and may be invoked many times
/// (once per loop pass). A step must not assume any specific step ran
/// immediately before it except via documented state keys.
///
/// Most callers never implement this directly; they wrap an agent with
/// [`AgentStep`] or a function with [`FnStep`].
#[async_trait]
pub trait Step: Send + Sync {
    /// Executes the step against the previous step's output and the shared
    /// run state.
    async fn execute(
        &self,
        input: &StepOutput,
        state: &SharedState,
    ) -> Result<StepOutput, WorkflowError>;

    /// Returns the step name.
    fn name(&self) -> StepName;
}

/// A step wrapping a black-box agent call.
///
/// The previous output's content becomes the agent's prompt; the agent also
/// receives a point-in-time state snapshot. Under the default
/// [`ErrorPolicy::Capture`], an agent failure becomes a failed output
/// rather than an engine error.
///
/// # Examples
///
/// ```rust,ignore
/// let step = AgentStep::new("draft_report", planner_agent);
/// let strict = AgentStep::new("final_report", planner_agent).strict();
/// ```
pub struct AgentStep {
    name: StepName,
    agent: Arc<dyn Agent>,
    policy: ErrorPolicy,
}

impl AgentStep {
    /// Wraps an agent as a workflow step.
    pub fn new(name: impl Into<StepName>, agent: Arc<dyn Agent>) -> Self {
        Self {
            name: name.into(),
            agent,
            policy: ErrorPolicy::Capture,
        }
    }

    /// Opts into strict error propagation: an agent failure aborts a
    /// sequential run instead of flowing onward as a failed output.
    pub fn strict(mut self) -> Self {
        self.policy = ErrorPolicy::Propagate;
        self
    }

    /// Returns the configured error policy.
    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }
}

impl fmt::Debug for AgentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentStep")
            .field("name", &self.name)
            .field("agent", &self.agent.name())
            .field("policy", &self.policy)
            .finish()
    }
}

#[async_trait]
impl Step for AgentStep {
    async fn execute(
        &self,
        input: &StepOutput,
        state: &SharedState,
    ) -> Result<StepOutput, WorkflowError> {
        let prompt = input.content.as_text();
        let snapshot = state.snapshot().await;

        match self.agent.call(&prompt, &snapshot).await {
            Ok(reply) => {
                let content = match reply.as_structured() {
                    Some(v) => Content::Structured(v.clone()),
                    None => Content::Text(reply.as_text()),
                };
                Ok(StepOutput::ok(content))
            }
            Err(e) => match self.policy {
                ErrorPolicy::Capture => Ok(StepOutput::failure(e.to_string())),
                ErrorPolicy::Propagate => Err(WorkflowError::AgentError {
                    agent: self.agent.name().to_string(),
                    details: e.to_string(),
                }),
            },
        }
    }

    fn name(&self) -> StepName {
        self.name.clone()
    }
}

/// A step wrapping a custom async function.
///
/// The function receives an owned copy of the previous output and a clone
/// of the shared state handle, so it can hold them across await points.
///
/// # Examples
///
/// ```rust,ignore
/// let step = FnStep::new("stamp", |input, state| async move {
///     state.set("stamped", true).await;
///     Ok(input)
/// });
/// ```
pub struct FnStep<F> {
    name: StepName,
    func: F,
}

impl<F, Fut> FnStep<F>
where
    F: Fn(StepOutput, SharedState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, WorkflowError>> + Send,
{
    /// Wraps a function as a workflow step.
    pub fn new(name: impl Into<StepName>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnStep<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Step for FnStep<F>
where
    F: Fn(StepOutput, SharedState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, WorkflowError>> + Send,
{
    async fn execute(
        &self,
        input: &StepOutput,
        state: &SharedState,
    ) -> Result<StepOutput, WorkflowError> {
        (self.func)(input.clone(), state.clone()).await
    }

    fn name(&self) -> StepName {
        self.name.clone()
    }
}
