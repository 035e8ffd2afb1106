//! Workflow definition and the top-level runner.

use crate::error::WorkflowError;
use crate::middleware::StepMiddleware;
use crate::node::{Loop, Node, ParallelGroup};
use crate::output::{Content, StepOutput};
use crate::state::{SessionState, SharedState, Value};
use crate::step::Step;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// The final result of a workflow run.
///
/// `content` is whatever the last executed step produced. `success` is
/// false either when a required sequential step aborted the run or when
/// the last output was a captured failure; `error` carries the message in
/// both cases. `state` is a snapshot of session state at the moment the
/// run ended, for callers that consume side effects rather than content.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Content produced by the last executed step.
    pub content: Content,
    /// Whether the run completed successfully.
    pub success: bool,
    /// Failure details when `success` is false.
    pub error: Option<String>,
    /// Final session state snapshot.
    pub state: SessionState,
}

/// An ordered sequence of steps, parallel groups, and loops, executed
/// start to finish against one session state.
///
/// Structure is immutable once built; the only mutability during a run is
/// the state threaded through the nodes.
///
/// # Examples
///
/// ```rust,ignore
/// let workflow = Workflow::builder()
///     .name("travel planning")
///     .parallel(research_group)
///     .repeat(revision_loop)
///     .step(final_report)
///     .build()?;
///
/// let result = workflow.run("3 days in Lisbon on a budget").await;
/// ```
pub struct Workflow {
    name: String,
    nodes: Vec<Node>,
    middlewares: Vec<Arc<dyn StepMiddleware>>,
    initial_state: SessionState,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("nodes", &self.nodes.iter().map(Node::name).collect::<Vec<_>>())
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

impl Workflow {
    /// Creates a new workflow builder.
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::new()
    }

    /// Returns the workflow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of top-level nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Runs the workflow against an initial input.
    ///
    /// Top-level nodes execute strictly in order; the output of node *i*
    /// becomes the input of node *i+1*, and session state persists across
    /// all of them. A node returning an error aborts the run and surfaces
    /// the failure in the result; the engine attempts no retry.
    pub async fn run(&self, input: impl Into<String>) -> RunResult {
        let state = SharedState::new(self.initial_state.clone());
        let mut current = StepOutput::seed(input.into());

        info!(workflow = %self.name, nodes = self.nodes.len(), "run starting");

        for node in &self.nodes {
            match node.run(&current, &state, &self.middlewares).await {
                Ok(output) => current = output,
                Err(e) => {
                    warn!(workflow = %self.name, node = %node.name(), error = %e, "run aborted");
                    return RunResult {
                        content: Content::default(),
                        success: false,
                        error: Some(e.to_string()),
                        state: state.snapshot().await,
                    };
                }
            }
        }

        info!(workflow = %self.name, success = current.success, "run finished");

        RunResult {
            content: current.content,
            success: current.success,
            error: current.error,
            state: state.snapshot().await,
        }
    }
}

/// Builder for [`Workflow`] instances.
pub struct WorkflowBuilder {
    name: String,
    nodes: Vec<Node>,
    middlewares: Vec<Arc<dyn StepMiddleware>>,
    initial_state: SessionState,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowBuilder {
    /// Creates an empty builder with revision-loop state defaults.
    pub fn new() -> Self {
        Self {
            name: "workflow".to_string(),
            nodes: Vec::new(),
            middlewares: Vec::new(),
            initial_state: SessionState::with_revision_defaults(),
        }
    }

    /// Sets the workflow name (used in logs).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Appends a single step.
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.nodes.push(Node::Step(Arc::new(step)));
        self
    }

    /// Appends a parallel group.
    pub fn parallel(mut self, group: ParallelGroup) -> Self {
        self.nodes.push(Node::Parallel(group));
        self
    }

    /// Appends a bounded loop.
    pub fn repeat(mut self, l: Loop) -> Self {
        self.nodes.push(Node::Loop(l));
        self
    }

    /// Attaches a middleware to every step invocation in the workflow.
    pub fn middleware(mut self, mw: impl StepMiddleware + 'static) -> Self {
        self.middlewares.push(Arc::new(mw));
        self
    }

    /// Replaces the initial session state wholesale.
    pub fn initial_state(mut self, state: SessionState) -> Self {
        self.initial_state = state;
        self
    }

    /// Seeds one initial state entry on top of the defaults.
    pub fn state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.initial_state.set(key, value);
        self
    }

    /// Builds the workflow, validating its structure.
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        if self.nodes.is_empty() {
            return Err(WorkflowError::Configuration(
                "workflow has no nodes".to_string(),
            ));
        }

        for node in &self.nodes {
            match node {
                Node::Parallel(group) if group.is_empty() => {
                    return Err(WorkflowError::Configuration(format!(
                        "parallel group '{}' has no children",
                        group.name()
                    )));
                }
                Node::Loop(l) if l.is_empty() => {
                    return Err(WorkflowError::Configuration(format!(
                        "loop '{}' has no children",
                        l.name()
                    )));
                }
                Node::Loop(l) if l.max_iterations() == 0 => {
                    return Err(WorkflowError::Configuration(format!(
                        "loop '{}' has a zero iteration cap",
                        l.name()
                    )));
                }
                _ => {}
            }
        }

        Ok(Workflow {
            name: self.name,
            nodes: self.nodes,
            middlewares: self.middlewares,
            initial_state: self.initial_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::keys;
    use crate::step::{FnStep, StepName};

    #[tokio::test]
    async fn test_sequential_output_threading() {
        let workflow = Workflow::builder()
            .step(FnStep::new("first", |_input, _state| async move {
                Ok(StepOutput::ok("one"))
            }))
            .step(FnStep::new("second", |input: StepOutput, _state| async move {
                Ok(StepOutput::ok(format!("{} two", input.content.as_text())))
            }))
            .build()
            .unwrap();

        let result = workflow.run("seed").await;
        assert!(result.success);
        assert_eq!(result.content.as_text(), "one two");
    }

    #[tokio::test]
    async fn test_first_step_sees_seed_input() {
        let workflow = Workflow::builder()
            .step(FnStep::new("echo", |input: StepOutput, _state| async move {
                Ok(input)
            }))
            .build()
            .unwrap();

        let result = workflow.run("the query").await;
        assert_eq!(result.content.as_text(), "the query");
    }

    #[tokio::test]
    async fn test_fatal_step_error_aborts_run() {
        let workflow = Workflow::builder()
            .step(FnStep::new("explode", |_input, _state| async move {
                Err(WorkflowError::StepError {
                    step_name: StepName::new("explode"),
                    details: "fatal".to_string(),
                })
            }))
            .step(FnStep::new("unreached", |_input, state: SharedState| async move {
                state.set("reached", true).await;
                Ok(StepOutput::ok("x"))
            }))
            .build()
            .unwrap();

        let result = workflow.run("seed").await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or("").contains("fatal"));
        assert!(!result.state.contains_key("reached"));
    }

    #[tokio::test]
    async fn test_captured_failure_flows_as_data() {
        let workflow = Workflow::builder()
            .step(FnStep::new("soft_fail", |_input, _state| async move {
                Ok(StepOutput::failure("degraded"))
            }))
            .step(FnStep::new("inspect", |input: StepOutput, state: SharedState| async move {
                state.set("saw_failure", !input.success).await;
                Ok(input)
            }))
            .build()
            .unwrap();

        let result = workflow.run("seed").await;
        assert!(!result.success);
        assert_eq!(result.state.get_bool("saw_failure"), Some(true));
    }

    #[test]
    fn test_builder_rejects_empty_workflow() {
        let result = Workflow::builder().build();
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    }

    #[test]
    fn test_builder_rejects_empty_composites() {
        let result = Workflow::builder()
            .parallel(ParallelGroup::new("empty"))
            .build();
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));

        let result = Workflow::builder()
            .repeat(Loop::new("empty", |_s: &SessionState| true, 2))
            .build();
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));

        let result = Workflow::builder()
            .repeat(
                Loop::new("capless", |_s: &SessionState| true, 0)
                    .child(FnStep::new("noop", |input: StepOutput, _state| async move {
                        Ok(input)
                    })),
            )
            .build();
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_default_state_schema_is_seeded() {
        let workflow = Workflow::builder()
            .step(FnStep::new("noop", |input: StepOutput, _state| async move {
                Ok(input)
            }))
            .build()
            .unwrap();

        let result = workflow.run("seed").await;
        assert_eq!(result.state.get_int(keys::REVISION_ITERATION), Some(0));
        assert_eq!(result.state.get_bool(keys::IS_APPROVED), Some(false));
    }

    #[tokio::test]
    async fn test_state_seeding_overlays_defaults() {
        let workflow = Workflow::builder()
            .state("budget", "medium")
            .step(FnStep::new("noop", |input: StepOutput, _state| async move {
                Ok(input)
            }))
            .build()
            .unwrap();

        let result = workflow.run("seed").await;
        assert_eq!(result.state.get_text("budget"), Some("medium"));
        assert_eq!(result.state.get_int(keys::REVISION_ITERATION), Some(0));
    }
}
