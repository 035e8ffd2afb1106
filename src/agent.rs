//! The external agent contract.
//!
//! An agent is an opaque unit that accepts a prompt plus a read-only state
//! snapshot and returns text or a structured payload. How it talks to a
//! model or search API is not the engine's business; the engine only
//! routes what comes back.

use crate::error::WorkflowError;
use crate::state::SessionState;
use async_trait::async_trait;

/// What an agent call returned: a structured value or raw text.
///
/// Tagging the result at the boundary lets consumers try the structured
/// shape first and fall back to text classification explicitly, instead of
/// scattering ad hoc string matching through step logic.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    /// The agent produced a typed result the caller asked for.
    Structured(serde_json::Value),
    /// The agent produced free text.
    Raw(String),
}

impl AgentReply {
    /// Creates a raw text reply.
    pub fn raw(text: impl Into<String>) -> Self {
        AgentReply::Raw(text.into())
    }

    /// Creates a structured reply.
    pub fn structured(value: serde_json::Value) -> Self {
        AgentReply::Structured(value)
    }

    /// Renders the reply as text (structured values as compact JSON).
    pub fn as_text(&self) -> String {
        match self {
            AgentReply::Raw(s) => s.clone(),
            AgentReply::Structured(v) => v.to_string(),
        }
    }

    /// Returns the structured value, or `None` for raw replies.
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            AgentReply::Structured(v) => Some(v),
            AgentReply::Raw(_) => None,
        }
    }
}

/// An autonomous agent the workflow can call.
///
/// The snapshot argument is a point-in-time copy of session state: agents
/// read it for cross-iteration context (previous drafts, reviewer
/// feedback) but cannot mutate the live state. State writes happen in the
/// step wrappers, which is what keeps the one sanctioned mutation path —
/// the reviewing step — explicit and auditable.
///
/// # Examples
///
/// ```
/// use kumihimo::{Agent, AgentReply, SessionState, WorkflowError};
/// use async_trait::async_trait;
///
/// struct EchoAgent;
///
/// #[async_trait]
/// impl Agent for EchoAgent {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     async fn call(
///         &self,
///         prompt: &str,
///         _state: &SessionState,
///     ) -> Result<AgentReply, WorkflowError> {
///         Ok(AgentReply::raw(prompt.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait Agent: Send + Sync {
    /// Returns the agent's name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Runs the agent against a prompt and a state snapshot.
    async fn call(
        &self,
        prompt: &str,
        state: &SessionState,
    ) -> Result<AgentReply, WorkflowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_as_text() {
        let reply = AgentReply::raw("hello");
        assert_eq!(reply.as_text(), "hello");
        assert_eq!(reply.as_structured(), None);

        let reply = AgentReply::structured(serde_json::json!({"ok": true}));
        assert_eq!(reply.as_text(), r#"{"ok":true}"#);
        assert!(reply.as_structured().is_some());
    }
}
