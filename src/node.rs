//! Composite workflow nodes: parallel groups and bounded loops.

use crate::error::WorkflowError;
use crate::middleware::{invoke, StepMiddleware};
use crate::output::{Content, StepOutput};
use crate::state::{keys, SessionState, SharedState};
use crate::step::{Step, StepName};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// How a parallel group combines its children's outputs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Join successful child contents with blank lines, in child
    /// declaration order.
    #[default]
    Concat,
    /// Discard child contents and emit a fixed marker. Use when the next
    /// step consumes the children's state writes rather than their text.
    Marker(String),
}

/// A composite step that runs a fixed set of children concurrently.
///
/// Every child receives the same previous output and the shared state
/// handle. The group joins on all children before returning, so child
/// state writes are visible to whatever runs next. Children must write
/// disjoint keys; the engine does not detect conflicts.
///
/// A failing child is recorded in the aggregate output's `error` field and
/// logged, but does not cancel its siblings or abort the run.
pub struct ParallelGroup {
    name: StepName,
    children: Vec<Arc<dyn Step>>,
    merge: MergePolicy,
}

impl ParallelGroup {
    /// Creates an empty group.
    pub fn new(name: impl Into<StepName>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            merge: MergePolicy::default(),
        }
    }

    /// Adds a child step.
    pub fn child(mut self, step: impl Step + 'static) -> Self {
        self.children.push(Arc::new(step));
        self
    }

    /// Sets the merge policy.
    pub fn merge(mut self, policy: MergePolicy) -> Self {
        self.merge = policy;
        self
    }

    /// Returns the group name.
    pub fn name(&self) -> &StepName {
        &self.name
    }

    /// Returns the number of children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` if the group has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) async fn run(
        &self,
        input: &StepOutput,
        state: &SharedState,
        middlewares: &[Arc<dyn StepMiddleware>],
    ) -> Result<StepOutput, WorkflowError> {
        info!(group = %self.name, children = self.children.len(), "fan-out");

        let results = join_all(
            self.children
                .iter()
                .map(|child| invoke(child, input, state, middlewares)),
        )
        .await;

        let mut contents = Vec::new();
        let mut failures = Vec::new();
        for (child, result) in self.children.iter().zip(results) {
            match result {
                Ok(output) if output.success => contents.push(output.content.as_text()),
                Ok(output) => failures.push(format!(
                    "{}: {}",
                    child.name(),
                    output.error.unwrap_or_else(|| "unspecified failure".to_string())
                )),
                Err(e) => failures.push(format!("{}: {}", child.name(), e)),
            }
        }

        if !failures.is_empty() {
            warn!(
                group = %self.name,
                failed = failures.len(),
                "children failed, siblings kept their results"
            );
        }

        let content = match &self.merge {
            MergePolicy::Concat => Content::Text(contents.join("\n\n")),
            MergePolicy::Marker(marker) => Content::Text(marker.clone()),
        };

        Ok(StepOutput {
            content,
            success: true,
            error: if failures.is_empty() {
                None
            } else {
                Some(failures.join("; "))
            },
        })
    }
}

impl fmt::Debug for ParallelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelGroup")
            .field("name", &self.name)
            .field("children", &self.children.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("merge", &self.merge)
            .finish()
    }
}

/// End condition for a [`Loop`]: a pure read over session state, evaluated
/// once per pass after the children complete.
pub type EndCondition = Arc<dyn Fn(&SessionState) -> bool + Send + Sync>;

/// A composite step that re-executes a child sequence until its end
/// condition holds or an iteration cap is reached.
///
/// Per pass: children run strictly in order, each seeing the previous
/// child's output; then the engine increments the pass counter key in
/// state and evaluates the end condition against the post-increment
/// snapshot. The cap is enforced even if the condition never holds, so the
/// loop always terminates; the last child output is used as-is when the
/// cap forces the exit.
///
/// A child failing inside a pass is captured as a failed output that flows
/// to the next child; it does not abort the loop.
pub struct Loop {
    name: StepName,
    children: Vec<Arc<dyn Step>>,
    end_condition: EndCondition,
    max_iterations: u32,
    counter_key: String,
}

impl Loop {
    /// Creates a loop with an end condition and an iteration cap.
    pub fn new(
        name: impl Into<StepName>,
        end_condition: impl Fn(&SessionState) -> bool + Send + Sync + 'static,
        max_iterations: u32,
    ) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            end_condition: Arc::new(end_condition),
            max_iterations,
            counter_key: keys::REVISION_ITERATION.to_string(),
        }
    }

    /// Adds a child step to the per-pass sequence.
    pub fn child(mut self, step: impl Step + 'static) -> Self {
        self.children.push(Arc::new(step));
        self
    }

    /// Overrides the state key used as the pass counter.
    pub fn counter_key(mut self, key: impl Into<String>) -> Self {
        self.counter_key = key.into();
        self
    }

    /// Returns the loop name.
    pub fn name(&self) -> &StepName {
        &self.name
    }

    /// Returns the iteration cap.
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Returns the number of children per pass.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` if the loop has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) async fn run(
        &self,
        input: &StepOutput,
        state: &SharedState,
        middlewares: &[Arc<dyn StepMiddleware>],
    ) -> Result<StepOutput, WorkflowError> {
        let mut last = input.clone();

        for pass in 1..=self.max_iterations {
            info!(name = %self.name, pass, max = self.max_iterations, "loop pass");

            for child in &self.children {
                match invoke(child, &last, state, middlewares).await {
                    Ok(output) => last = output,
                    Err(e) => {
                        warn!(
                            name = %self.name,
                            step = %child.name(),
                            error = %e,
                            "loop child failed, capturing and continuing pass"
                        );
                        last = StepOutput::failure(e.to_string());
                    }
                }
            }

            // Counter increment and condition check happen against the
            // post-increment state, under one write lock for the increment.
            let counter_key = self.counter_key.clone();
            state
                .update(move |s| {
                    let n = s.get_int(&counter_key).unwrap_or(0);
                    s.set(counter_key, n + 1);
                })
                .await;

            let snapshot = state.snapshot().await;
            if (self.end_condition)(&snapshot) {
                info!(name = %self.name, pass, "end condition met");
                return Ok(last);
            }

            if pass == self.max_iterations {
                info!(name = %self.name, pass, "iteration cap reached, accepting last output");
            }
        }

        Ok(last)
    }
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("name", &self.name)
            .field("children", &self.children.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("max_iterations", &self.max_iterations)
            .field("counter_key", &self.counter_key)
            .finish()
    }
}

/// A top-level workflow node.
#[derive(Debug)]
pub enum Node {
    /// A single step.
    Step(Arc<dyn Step>),
    /// A concurrent fan-out/fan-in group.
    Parallel(ParallelGroup),
    /// A bounded revision loop.
    Loop(Loop),
}

impl Node {
    /// Returns the node's name.
    pub fn name(&self) -> StepName {
        match self {
            Node::Step(step) => step.name(),
            Node::Parallel(group) => group.name().clone(),
            Node::Loop(l) => l.name().clone(),
        }
    }

    pub(crate) async fn run(
        &self,
        input: &StepOutput,
        state: &SharedState,
        middlewares: &[Arc<dyn StepMiddleware>],
    ) -> Result<StepOutput, WorkflowError> {
        match self {
            Node::Step(step) => invoke(step, input, state, middlewares).await,
            Node::Parallel(group) => group.run(input, state, middlewares).await,
            Node::Loop(l) => l.run(input, state, middlewares).await,
        }
    }
}

impl fmt::Debug for dyn Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step({})", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::FnStep;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn writer(name: &'static str, key: &'static str, delay_ms: u64) -> impl Step {
        FnStep::new(name, move |_input: StepOutput, state: SharedState| {
            let fut: futures::future::BoxFuture<'static, Result<StepOutput, WorkflowError>> =
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    state.set(key, name).await;
                    Ok(StepOutput::ok(format!("{name} done")))
                });
            fut
        })
    }

    #[tokio::test]
    async fn test_parallel_disjoint_writes_all_land() {
        // Completion order is scrambled by the delays; the union of writes
        // must not depend on it.
        let group = ParallelGroup::new("research")
            .child(writer("a", "key_a", 30))
            .child(writer("b", "key_b", 1))
            .child(writer("c", "key_c", 10));

        let state = SharedState::new(SessionState::new());
        let out = group
            .run(&StepOutput::seed("go"), &state, &[])
            .await
            .unwrap();

        assert!(out.success);
        assert_eq!(out.error, None);
        assert_eq!(state.get_text("key_a").await, Some("a".to_string()));
        assert_eq!(state.get_text("key_b").await, Some("b".to_string()));
        assert_eq!(state.get_text("key_c").await, Some("c".to_string()));
        // Concat merge preserves declaration order regardless of timing.
        assert_eq!(out.content.as_text(), "a done\n\nb done\n\nc done");
    }

    #[tokio::test]
    async fn test_parallel_child_failure_does_not_abort_siblings() {
        let group = ParallelGroup::new("research")
            .child(writer("a", "key_a", 5))
            .child(FnStep::new("b", |_input, _state| async move {
                Err(WorkflowError::StepError {
                    step_name: StepName::new("b"),
                    details: "search backend down".to_string(),
                })
            }))
            .child(writer("c", "key_c", 5));

        let state = SharedState::new(SessionState::new());
        let out = group
            .run(&StepOutput::seed("go"), &state, &[])
            .await
            .unwrap();

        assert!(out.success);
        assert!(out.error.as_deref().unwrap_or("").contains("search backend down"));
        assert_eq!(state.get_text("key_a").await, Some("a".to_string()));
        assert_eq!(state.get_text("key_c").await, Some("c".to_string()));
    }

    #[tokio::test]
    async fn test_marker_merge_discards_contents() {
        let group = ParallelGroup::new("research")
            .child(writer("a", "key_a", 1))
            .merge(MergePolicy::Marker("research complete".to_string()));

        let state = SharedState::new(SessionState::new());
        let out = group
            .run(&StepOutput::seed("go"), &state, &[])
            .await
            .unwrap();
        assert_eq!(out.content.as_text(), "research complete");
    }

    #[tokio::test]
    async fn test_loop_stops_when_condition_met() {
        let executions = Arc::new(AtomicU32::new(0));
        let counter = executions.clone();

        let l = Loop::new("revise", |s: &SessionState| s.get_bool("done").unwrap_or(false), 5)
            .child(FnStep::new("work", move |_input, state| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 2 {
                        state.set("done", true).await;
                    }
                    Ok(StepOutput::ok(format!("pass {n}")))
                }
            }));

        let state = SharedState::new(SessionState::new());
        let out = l.run(&StepOutput::seed("go"), &state, &[]).await.unwrap();

        // Condition became true during pass 2; pass 3 must not run.
        assert_eq!(executions.load(Ordering::SeqCst), 2);
        assert_eq!(out.content.as_text(), "pass 2");
        assert_eq!(state.get_int(keys::REVISION_ITERATION).await, Some(2));
    }

    #[tokio::test]
    async fn test_loop_cap_forces_termination() {
        let executions = Arc::new(AtomicU32::new(0));
        let counter = executions.clone();

        let l = Loop::new("revise", |_s: &SessionState| false, 3).child(FnStep::new(
            "work",
            move |_input, _state| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(StepOutput::ok("draft"))
                }
            },
        ));

        let state = SharedState::new(SessionState::new());
        let out = l.run(&StepOutput::seed("go"), &state, &[]).await.unwrap();

        assert!(out.success);
        assert_eq!(executions.load(Ordering::SeqCst), 3);
        assert_eq!(state.get_int(keys::REVISION_ITERATION).await, Some(3));
    }

    #[tokio::test]
    async fn test_loop_children_see_previous_child_output() {
        let l = Loop::new("chain", |s: &SessionState| s.get_int(keys::REVISION_ITERATION).unwrap_or(0) >= 1, 2)
            .child(FnStep::new("first", |_input, _state| async move {
                Ok(StepOutput::ok("from first"))
            }))
            .child(FnStep::new("second", |input: StepOutput, state: SharedState| async move {
                state.set("seen", input.content.as_text()).await;
                Ok(StepOutput::ok("from second"))
            }));

        let state = SharedState::new(SessionState::new());
        let out = l.run(&StepOutput::seed("go"), &state, &[]).await.unwrap();

        assert_eq!(state.get_text("seen").await, Some("from first".to_string()));
        assert_eq!(out.content.as_text(), "from second");
    }

    #[tokio::test]
    async fn test_loop_child_error_is_captured_not_fatal() {
        let l = Loop::new("revise", |_s: &SessionState| false, 2)
            .child(FnStep::new("broken", |_input, _state| async move {
                Err(WorkflowError::StepError {
                    step_name: StepName::new("broken"),
                    details: "bad pass".to_string(),
                })
            }))
            .child(FnStep::new("observer", |input: StepOutput, state: SharedState| async move {
                state.set("saw_failure", !input.success).await;
                Ok(input)
            }));

        let state = SharedState::new(SessionState::new());
        let out = l.run(&StepOutput::seed("go"), &state, &[]).await.unwrap();

        assert!(!out.success);
        assert_eq!(state.get_bool("saw_failure").await, Some(true));
        assert_eq!(state.get_int(keys::REVISION_ITERATION).await, Some(2));
    }
}
