//! Reviewer-step support: verdict parsing and the sanctioned state writes.

use crate::agent::{Agent, AgentReply};
use crate::error::WorkflowError;
use crate::output::StepOutput;
use crate::state::{keys, SessionState, SharedState};
use crate::step::{Step, StepName};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// A reviewer's decision about a draft.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewVerdict {
    /// Whether the draft is approved as-is.
    pub approved: bool,
    /// Feedback for the producer to act on.
    pub feedback: String,
}

impl ReviewVerdict {
    /// Classifies an agent reply into a verdict.
    ///
    /// Tries the structured shape first; if the reply is raw text or the
    /// structured fields are missing, falls back to the text heuristic.
    pub fn from_reply(reply: &AgentReply) -> Self {
        match reply {
            AgentReply::Structured(value) => {
                Self::from_structured(value).unwrap_or_else(|| Self::from_text(&reply.as_text()))
            }
            AgentReply::Raw(text) => Self::from_text(text),
        }
    }

    /// Reads the expected structured shape: a boolean `is_approved` (or
    /// `approved`) plus whatever feedback fields are present.
    fn from_structured(value: &serde_json::Value) -> Option<Self> {
        let approved = value
            .get("is_approved")
            .or_else(|| value.get("approved"))
            .and_then(serde_json::Value::as_bool)?;

        let mut parts = Vec::new();
        for field in ["overall_assessment", "specific_feedback", "improvement_suggestions", "feedback"] {
            if let Some(text) = value.get(field).and_then(serde_json::Value::as_str) {
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
        }
        let feedback = if parts.is_empty() {
            value.to_string()
        } else {
            parts.join("\n\n")
        };

        Some(Self { approved, feedback })
    }

    /// Text heuristic: approval language present and not negated.
    fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        let approved = (lower.contains("approved") || lower.contains("good"))
            && !lower.contains("not approved");
        Self {
            approved,
            feedback: text.to_string(),
        }
    }
}

/// Returns `true` when the reviewing step has granted approval.
///
/// The standard end condition for a revision [`Loop`](crate::Loop): a pure
/// read of the flag the reviewer wrote during the pass that just finished.
pub fn approval_granted(state: &SessionState) -> bool {
    state.get_bool(keys::IS_APPROVED).unwrap_or(false)
}

/// The reviewing step of a producer/reviewer loop.
///
/// This is the one sanctioned direct-state-mutation path: the step stores
/// the incoming draft under `previous_draft`, calls the reviewer agent,
/// classifies the reply into a [`ReviewVerdict`], and writes `is_approved`
/// and `manager_feedback` back into state for the producer's next pass and
/// the loop end condition. The pass counter itself belongs to the loop.
///
/// A reviewer failure never fails the step: the verdict defaults to
/// not-approved with the error as feedback, and the loop's iteration cap
/// bounds how long that can go on.
pub struct ReviewStep {
    name: StepName,
    agent: Arc<dyn Agent>,
}

impl ReviewStep {
    /// Wraps a reviewer agent as a workflow step.
    pub fn new(name: impl Into<StepName>, agent: Arc<dyn Agent>) -> Self {
        Self {
            name: name.into(),
            agent,
        }
    }
}

impl fmt::Debug for ReviewStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewStep")
            .field("name", &self.name)
            .field("agent", &self.agent.name())
            .finish()
    }
}

#[async_trait]
impl Step for ReviewStep {
    async fn execute(
        &self,
        input: &StepOutput,
        state: &SharedState,
    ) -> Result<StepOutput, WorkflowError> {
        let draft = input.content.as_text();
        state.set(keys::PREVIOUS_DRAFT, draft.clone()).await;

        let snapshot = state.snapshot().await;
        let verdict = match self.agent.call(&draft, &snapshot).await {
            Ok(reply) => ReviewVerdict::from_reply(&reply),
            Err(e) => {
                warn!(step = %self.name, error = %e, "reviewer call failed, treating as not approved");
                ReviewVerdict {
                    approved: false,
                    feedback: e.to_string(),
                }
            }
        };

        info!(
            step = %self.name,
            approved = verdict.approved,
            "review decision"
        );

        state.update(|s| {
            s.set(keys::IS_APPROVED, verdict.approved);
            s.set(keys::MANAGER_FEEDBACK, verdict.feedback.clone());
        })
        .await;

        Ok(StepOutput::ok(verdict.feedback))
    }

    fn name(&self) -> StepName {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_verdict() {
        let reply = AgentReply::structured(serde_json::json!({
            "is_approved": true,
            "overall_assessment": "solid plan",
            "specific_feedback": "day 2 is tight",
        }));
        let verdict = ReviewVerdict::from_reply(&reply);
        assert!(verdict.approved);
        assert_eq!(verdict.feedback, "solid plan\n\nday 2 is tight");
    }

    #[test]
    fn test_structured_missing_flag_falls_back_to_text() {
        let reply = AgentReply::structured(serde_json::json!({
            "comment": "this looks good to me"
        }));
        let verdict = ReviewVerdict::from_reply(&reply);
        assert!(verdict.approved);
    }

    #[test]
    fn test_text_heuristic() {
        let verdict = ReviewVerdict::from_reply(&AgentReply::raw("Approved, ship it."));
        assert!(verdict.approved);

        let verdict = ReviewVerdict::from_reply(&AgentReply::raw("Not approved: missing budget."));
        assert!(!verdict.approved);

        let verdict = ReviewVerdict::from_reply(&AgentReply::raw("Needs more detail."));
        assert!(!verdict.approved);
        assert_eq!(verdict.feedback, "Needs more detail.");
    }

    #[test]
    fn test_approval_granted_reads_flag() {
        let mut state = SessionState::new();
        assert!(!approval_granted(&state));
        state.set(keys::IS_APPROVED, true);
        assert!(approval_granted(&state));
    }

    struct ApproveAgent;

    #[async_trait]
    impl Agent for ApproveAgent {
        fn name(&self) -> &str {
            "approver"
        }

        async fn call(
            &self,
            _prompt: &str,
            _state: &SessionState,
        ) -> Result<AgentReply, WorkflowError> {
            Ok(AgentReply::structured(serde_json::json!({
                "is_approved": true,
                "feedback": "fine",
            })))
        }
    }

    struct FailingReviewer;

    #[async_trait]
    impl Agent for FailingReviewer {
        fn name(&self) -> &str {
            "failing"
        }

        async fn call(
            &self,
            _prompt: &str,
            _state: &SessionState,
        ) -> Result<AgentReply, WorkflowError> {
            Err(WorkflowError::AgentError {
                agent: "failing".to_string(),
                details: "offline".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_review_step_writes_sanctioned_keys() {
        let step = ReviewStep::new("review", Arc::new(ApproveAgent));
        let state = SharedState::new(SessionState::with_revision_defaults());

        let out = step
            .execute(&StepOutput::seed("draft v1"), &state)
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.content.as_text(), "fine");

        assert_eq!(state.get_bool(keys::IS_APPROVED).await, Some(true));
        assert_eq!(
            state.get_text(keys::PREVIOUS_DRAFT).await,
            Some("draft v1".to_string())
        );
        assert_eq!(
            state.get_text(keys::MANAGER_FEEDBACK).await,
            Some("fine".to_string())
        );
    }

    #[tokio::test]
    async fn test_reviewer_failure_never_fails_the_step() {
        let step = ReviewStep::new("review", Arc::new(FailingReviewer));
        let state = SharedState::new(SessionState::with_revision_defaults());

        let out = step
            .execute(&StepOutput::seed("draft"), &state)
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(state.get_bool(keys::IS_APPROVED).await, Some(false));
        assert!(state
            .get_text(keys::MANAGER_FEEDBACK)
            .await
            .unwrap_or_default()
            .contains("offline"));
    }
}
