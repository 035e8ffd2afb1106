//! Step invocation middleware.
//!
//! Every step invocation — top-level, parallel child, loop child — passes
//! through the middleware chain attached to the workflow at construction
//! time. This replaces runtime method-wrapping: instrumentation is a
//! composition chosen when the workflow is built, not a mutation of an
//! existing object's methods.

use crate::error::WorkflowError;
use crate::output::StepOutput;
use crate::state::SharedState;
use crate::step::{Step, StepName};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Hooks invoked around every step execution.
///
/// Both hooks have no-op defaults; implement whichever side you need.
/// Middleware observes but does not alter inputs or outputs.
///
/// # Examples
///
/// ```rust,ignore
/// struct Stopwatch;
///
/// #[async_trait]
/// impl StepMiddleware for Stopwatch {
///     async fn after_step(
///         &self,
///         name: &StepName,
///         _result: &Result<StepOutput, WorkflowError>,
///         elapsed: Duration,
///     ) {
///         println!("{name} took {elapsed:?}");
///     }
/// }
/// ```
#[async_trait]
pub trait StepMiddleware: Send + Sync {
    /// Called immediately before a step executes.
    async fn before_step(&self, _name: &StepName, _input: &StepOutput, _state: &SharedState) {}

    /// Called immediately after a step executes, with its result and
    /// wall-clock duration.
    async fn after_step(
        &self,
        _name: &StepName,
        _result: &Result<StepOutput, WorkflowError>,
        _elapsed: Duration,
    ) {
    }
}

/// Middleware that emits `tracing` events for each step.
#[derive(Debug, Default)]
pub struct LogMiddleware;

#[async_trait]
impl StepMiddleware for LogMiddleware {
    async fn before_step(&self, name: &StepName, _input: &StepOutput, _state: &SharedState) {
        info!(step = %name, "step starting");
    }

    async fn after_step(
        &self,
        name: &StepName,
        result: &Result<StepOutput, WorkflowError>,
        elapsed: Duration,
    ) {
        match result {
            Ok(output) if output.success => {
                info!(step = %name, ?elapsed, "step completed");
            }
            Ok(output) => {
                warn!(
                    step = %name,
                    ?elapsed,
                    error = output.error.as_deref().unwrap_or("unknown"),
                    "step completed with captured failure"
                );
            }
            Err(e) => {
                warn!(step = %name, ?elapsed, error = %e, "step failed");
            }
        }
    }
}

/// Runs one step through the middleware chain.
///
/// This is the single choke point every step invocation goes through.
pub(crate) async fn invoke(
    step: &Arc<dyn Step>,
    input: &StepOutput,
    state: &SharedState,
    middlewares: &[Arc<dyn StepMiddleware>],
) -> Result<StepOutput, WorkflowError> {
    let name = step.name();

    for mw in middlewares {
        mw.before_step(&name, input, state).await;
    }

    let started = Instant::now();
    let result = step.execute(input, state).await;
    let elapsed = started.elapsed();

    for mw in middlewares {
        mw.after_step(&name, &result, elapsed).await;
    }

    result
}
