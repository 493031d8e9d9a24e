//! Session orchestration
//!
//! One-time setup that has to succeed before the controller sends a request:
//! - Verify the serving port is free, or reclaim it with operator consent
//! - Start the model container (GPU selection is mandatory)
//! - Wait, with a deadline, for the server's readiness marker
//!
//! # Example
//!
//! ```ignore
//! use nim_bench_core::SessionBuilder;
//!
//! let session = SessionBuilder::new()
//!     .config(config.session.clone())
//!     .runtime(runtime)
//!     .operator(operator)
//!     .api_key(api_key.clone())
//!     .shutdown(interrupts.sender())
//!     .build()?;
//!
//! let ready = session.prepare(&image, "all").await?;
//! let target = ready.target(model, api_key);
//! ```

mod builder;
mod executor;
mod readiness;

pub use builder::SessionBuilder;
pub use executor::{ReadySession, SessionOrchestrator};
pub use readiness::ReadinessDetector;
