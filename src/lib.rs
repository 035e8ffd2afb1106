//! # Kumihimo (組紐)
//!
//! A lightweight multi-agent workflow orchestration engine for Rust.
//!
//! The name "Kumihimo" (組紐) is the Japanese art of braiding cords:
//! independent strands are worked in parallel and pulled together into a
//! single braid, which is what this engine does with agent tasks.
//!
//! The engine coordinates opaque agents through a fixed multi-phase
//! pipeline: fan work out concurrently, run a bounded producer/reviewer
//! revision loop, and finish with a presentation step — while threading
//! one shared session state through everything. What the agents actually
//! say, and how they call a model or search API, is their business; the
//! engine only sequences them and routes their payloads.
//!
//! ## Features
//!
//! - **Composable nodes**: single [`Step`]s, concurrent [`ParallelGroup`]s,
//!   bounded [`Loop`]s with caller-supplied end conditions
//! - **Shared session state**: one [`SessionState`] per run, passed by
//!   handle through every node
//! - **Explicit failure routing**: agent failures become failed
//!   [`StepOutput`]s by default, strict propagation on request
//! - **Middleware**: construction-time decoration of every step invocation
//! - **Async first**: `tokio` + `async-trait`, fan-out joined with
//!   `futures`
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use kumihimo::prelude::*;
//!
//! let workflow = Workflow::builder()
//!     .name("travel planning")
//!     .parallel(
//!         ParallelGroup::new("research")
//!             .child(AgentStep::new("destination", destination_agent))
//!             .child(AgentStep::new("hotels", hotel_agent))
//!             .child(AgentStep::new("activities", activities_agent))
//!             .merge(MergePolicy::Marker("research complete".into())),
//!     )
//!     .repeat(
//!         Loop::new("revision", approval_granted, 2)
//!             .child(AgentStep::new("draft", planner_agent))
//!             .child(ReviewStep::new("review", manager_agent)),
//!     )
//!     .step(AgentStep::new("present", planner_agent))
//!     .middleware(LogMiddleware)
//!     .build()?;
//!
//! let result = workflow.run("3 days in Lisbon on a budget").await;
//! println!("{}", result.content);
//! ```
//!
//! ## Failure model
//!
//! Three distinct paths, kept deliberately separate:
//!
//! - an agent error under the default policy becomes
//!   `StepOutput { success: false, .. }` and keeps flowing as data;
//! - a parallel child failure is recorded in the group's aggregate output
//!   without cancelling siblings;
//! - a hard [`WorkflowError`] from a top-level node aborts the run and
//!   surfaces in the final [`RunResult`].
//!
//! A loop whose end condition never holds is not an error: the iteration
//! cap forces termination and the last output is accepted as-is.

mod agent;
mod error;
mod middleware;
mod node;
mod output;
mod review;
mod state;
mod step;
mod workflow;

pub mod prelude;

pub use agent::{Agent, AgentReply};
pub use error::WorkflowError;
pub use middleware::{LogMiddleware, StepMiddleware};
pub use node::{EndCondition, Loop, MergePolicy, Node, ParallelGroup};
pub use output::{Content, StepOutput};
pub use review::{approval_granted, ReviewStep, ReviewVerdict};
pub use state::{keys, SessionState, SharedState, Value};
pub use step::{AgentStep, ErrorPolicy, FnStep, Step, StepName};
pub use workflow::{RunResult, Workflow, WorkflowBuilder};
