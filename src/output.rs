//! Step output payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload carried between steps: free text or a structured value.
///
/// Structured payloads come from agents that return a typed result; the
/// engine routes them without inspecting their shape.
///
/// # Examples
///
/// ```
/// use kumihimo::Content;
///
/// let c = Content::text("a draft");
/// assert_eq!(c.as_text(), "a draft");
///
/// let c = Content::from(serde_json::json!({"ok": true}));
/// assert!(c.as_text().contains("ok"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Content {
    /// Free-text payload.
    Text(String),
    /// Structured payload, passed through opaquely.
    Structured(serde_json::Value),
}

impl Content {
    /// Creates a text payload.
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }

    /// Renders the payload as text.
    ///
    /// Structured values are rendered as compact JSON; this is what the
    /// next step receives as its prompt when it wraps an agent call.
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Structured(v) => v.to_string(),
        }
    }

    /// Returns the structured value, or `None` for text payloads.
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Content::Structured(v) => Some(v),
            Content::Text(_) => None,
        }
    }

    /// Returns `true` for an empty text payload.
    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Text(s) if s.is_empty())
    }
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Text(s) => write!(f, "{s}"),
            Content::Structured(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<serde_json::Value> for Content {
    fn from(v: serde_json::Value) -> Self {
        Content::Structured(v)
    }
}

/// Result of one step execution.
///
/// Produced fresh per execution and read-only to consumers; the output of
/// step *i* becomes the input of step *i+1*.
///
/// A failed output (`success == false`) is data, not control flow: it keeps
/// moving through the workflow so later steps and the final result can see
/// what went wrong. Hard aborts travel as
/// [`WorkflowError`](crate::WorkflowError) instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    /// The payload produced by the step.
    pub content: Content,
    /// Whether the step completed as intended.
    pub success: bool,
    /// Failure details, or non-fatal failures recorded by a parallel group.
    pub error: Option<String>,
}

impl StepOutput {
    /// Creates a successful output.
    pub fn ok(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            success: true,
            error: None,
        }
    }

    /// Creates a failed output with empty content.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            content: Content::default(),
            success: false,
            error: Some(error.into()),
        }
    }

    /// The seed output a run starts from: the caller's initial input.
    pub fn seed(input: impl Into<Content>) -> Self {
        Self::ok(input)
    }
}

impl Default for StepOutput {
    fn default() -> Self {
        Self::ok(Content::default())
    }
}
