//! File stores for nim-bench
//!
//! - [`NimRegistry`]: the list of NIM images available for benchmarking,
//!   persisted as `display_name|image_reference` lines

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod registry;

pub use error::{StoreError, StoreResult};
pub use registry::{derive_model_id, AddOutcome, NimEntry, NimRegistry, DEFAULT_REGISTRY_PATH};
