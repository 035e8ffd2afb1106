//! End-to-end demo: parallel research, a bounded draft/review loop, and a
//! final presentation step, with deterministic stub agents standing in for
//! model-backed ones.
//!
//! Run with: `cargo run --example revision_pipeline`

use async_trait::async_trait;
use kumihimo::prelude::*;
use std::sync::Arc;

/// Stub researcher: in a real deployment this would call a model plus a
/// web search tool.
struct Researcher {
    name: &'static str,
    findings: &'static str,
}

#[async_trait]
impl Agent for Researcher {
    fn name(&self) -> &str {
        self.name
    }

    async fn call(&self, prompt: &str, _state: &SessionState) -> Result<AgentReply, WorkflowError> {
        Ok(AgentReply::raw(format!(
            "[{}] for '{}': {}",
            self.name, prompt, self.findings
        )))
    }
}

/// Stub planner: drafts from research notes in state, folding in reviewer
/// feedback on later passes.
struct Planner;

#[async_trait]
impl Agent for Planner {
    fn name(&self) -> &str {
        "planner"
    }

    async fn call(&self, _prompt: &str, state: &SessionState) -> Result<AgentReply, WorkflowError> {
        let pass = state.get_int(keys::REVISION_ITERATION).unwrap_or(0) + 1;
        let feedback = state.get_text(keys::MANAGER_FEEDBACK).unwrap_or_default();
        let destination = state.get_text("destination_notes").unwrap_or("(none)");
        let hotels = state.get_text("hotel_notes").unwrap_or("(none)");
        Ok(AgentReply::raw(format!(
            "Draft #{pass}\n  research: {destination} / {hotels}\n  feedback addressed: {feedback}"
        )))
    }
}

/// Stub reviewer: asks for one revision, then approves.
struct Manager;

#[async_trait]
impl Agent for Manager {
    fn name(&self) -> &str {
        "manager"
    }

    async fn call(&self, _draft: &str, state: &SessionState) -> Result<AgentReply, WorkflowError> {
        let pass = state.get_int(keys::REVISION_ITERATION).unwrap_or(0) + 1;
        Ok(AgentReply::structured(serde_json::json!({
            "is_approved": pass >= 2,
            "overall_assessment": if pass >= 2 { "approved" } else { "needs one revision" },
            "specific_feedback": "tighten the day-by-day plan",
        })))
    }
}

/// Research step: runs the researcher and writes its findings to a
/// dedicated state key for the planner.
fn research(name: &'static str, key: &'static str, findings: &'static str) -> impl Step {
    let agent: Arc<dyn Agent> = Arc::new(Researcher { name, findings });
    FnStep::new(name, move |input: StepOutput, state: SharedState| {
        let agent = agent.clone();
        async move {
            let snapshot = state.snapshot().await;
            let reply = agent.call(&input.content.as_text(), &snapshot).await?;
            state.set(key, reply.as_text()).await;
            Ok(StepOutput::ok(reply.as_text()))
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), WorkflowError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let planner: Arc<dyn Agent> = Arc::new(Planner);

    let workflow = Workflow::builder()
        .name("travel planning")
        .parallel(
            ParallelGroup::new("research")
                .child(research(
                    "destination",
                    "destination_notes",
                    "mild weather, old town worth two days",
                ))
                .child(research(
                    "hotels",
                    "hotel_notes",
                    "three mid-range options near the center",
                ))
                .child(research(
                    "activities",
                    "activity_notes",
                    "food market tour, coastal day trip",
                ))
                .merge(MergePolicy::Marker("research complete".to_string())),
        )
        .repeat(
            Loop::new("revision", approval_granted, 2)
                .child(AgentStep::new("draft", planner.clone()))
                .child(ReviewStep::new("review", Arc::new(Manager))),
        )
        .step(AgentStep::new("present", planner))
        .middleware(LogMiddleware)
        .build()?;

    let result = workflow.run("3 days in Lisbon on a budget").await;

    println!("\n=== final result (success: {}) ===", result.success);
    println!("{}", result.content);
    println!(
        "\npasses: {}, approved: {}",
        result.state.get_int(keys::REVISION_ITERATION).unwrap_or(0),
        result.state.get_bool(keys::IS_APPROVED).unwrap_or(false),
    );

    Ok(())
}
