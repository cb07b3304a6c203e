//! Orchestration layer: intent handling and long-running operation tracking.
//!
//! The orchestrator turns a classified intent into a routed backend tool
//! call, and hands long-running operations (deployments) to the tracker,
//! which polls them on an interval and reports progress until a terminal
//! state. Both sides talk to their dependencies through traits so tests run
//! on recorded fakes.

pub mod orchestrator;
pub mod tracker;

pub use orchestrator::{Orchestrator, Outcome, ToolInvoker};
pub use tracker::{
    CheckPolicy, CheckVerdict, OperationReport, OperationStatus, OperationSubject,
    OperationTracker, ReportSink, SimulatedCheckPolicy, TrackedOperation,
};
