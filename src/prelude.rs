//! Commonly used types and traits.

pub use crate::{
    approval_granted, keys, Agent, AgentReply, AgentStep, Content, ErrorPolicy, FnStep,
    LogMiddleware, Loop, MergePolicy, ParallelGroup, ReviewStep, ReviewVerdict, RunResult,
    SessionState, SharedState, Step, StepMiddleware, StepName, StepOutput, Value, Workflow,
    WorkflowBuilder, WorkflowError,
};
