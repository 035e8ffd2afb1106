//! Workflow error types.

use crate::step::StepName;
use thiserror::Error;

/// Errors that can abort workflow execution.
///
/// These are the hard failures of the engine. Soft failures — an agent call
/// that errored under the default capture policy, or a parallel child that
/// failed while its siblings completed — travel as failed
/// [`StepOutput`](crate::StepOutput)s instead and never take this form.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WorkflowError {
    /// A step failed during execution.
    #[error("Step failed: {step_name}, details: {details}")]
    StepError {
        /// The name of the step that failed.
        step_name: StepName,
        /// Details about the failure.
        details: String,
    },

    /// An agent call failed and the wrapping step opted into strict
    /// propagation.
    #[error("Agent '{agent}' call failed: {details}")]
    AgentError {
        /// The name of the agent whose call failed.
        agent: String,
        /// Details about the failure.
        details: String,
    },

    /// The workflow configuration is invalid.
    ///
    /// Returned by the builder when required configuration is missing or
    /// inconsistent (empty workflow, empty composite, zero iteration cap).
    #[error("Invalid workflow configuration: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = WorkflowError::StepError {
            step_name: StepName::new("draft"),
            details: "model unavailable".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Step failed: draft, details: model unavailable"
        );

        let error = WorkflowError::AgentError {
            agent: "reviewer".to_string(),
            details: "timeout".to_string(),
        };
        assert_eq!(error.to_string(), "Agent 'reviewer' call failed: timeout");

        let error = WorkflowError::Configuration("no nodes".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid workflow configuration: no nodes"
        );
    }
}
