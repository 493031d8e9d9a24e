//! nim-bench-core: adaptive concurrency search for locally served models
//!
//! This crate holds everything with decision logic in nim-bench:
//!
//! - Session orchestration (port check, cleanup, launch, readiness)
//! - The adaptive concurrency controller and its transition policy
//! - The data model shared with executors and runtimes
//! - Traits for the external collaborators (executor, container runtime, operator)
//! - Ctrl+C routing, configuration and error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod error;
pub mod interrupt;
pub mod request;
pub mod response;
pub mod session;
pub mod traits;

pub use config::*;
pub use controller::{
    next_concurrency, AdaptiveController, ControllerBuilder, ControllerReport, ControllerState,
    Decision, IterationRecord, Mode, StopReason,
};
pub use error::*;
pub use interrupt::{ActiveRun, InterruptAction, Interrupts};
pub use request::*;
pub use response::*;
pub use session::{ReadinessDetector, ReadySession, SessionBuilder, SessionOrchestrator};
pub use traits::*;
