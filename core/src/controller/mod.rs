//! Adaptive concurrency controller
//!
//! The controller is the feedback loop at the heart of nim-bench:
//! - Run one benchmark iteration at the current load
//! - Extract the average tokens-per-second signal
//! - Classify it against the threshold
//! - Raise concurrency (x2, +50% or +20%) or stop
//!
//! Manual runs share the same executor contract and error handling but make
//! exactly one call.
//!
//! # Example
//!
//! ```ignore
//! use nim_bench_core::{ControllerBuilder, ControllerConfig};
//!
//! let controller = ControllerBuilder::new()
//!     .config(ControllerConfig::default())
//!     .executor(executor)
//!     .target(target)
//!     .build()?;
//!
//! let mut shutdown = interrupts.subscribe();
//! let report = controller.run_auto(&mut shutdown).await;
//! println!("best: {:?}", report.best());
//! ```

mod builder;
mod executor;
mod policy;
mod report;

pub use builder::ControllerBuilder;
pub use executor::AdaptiveController;
pub use policy::{next_concurrency, ControllerState, Decision, Mode, StopReason};
pub use report::{ControllerReport, IterationRecord};
