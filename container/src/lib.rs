//! Container runtime for nim-bench
//!
//! [`DockerRuntime`] implements the core `ContainerRuntime` trait by driving
//! the `docker` CLI. Containers it starts carry the [`MANAGED_LABEL`] so that
//! cleanup can be limited to them.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod docker;
mod output;

pub use docker::{ps_args, run_args, DockerContainer, DockerRuntime, MANAGED_LABEL};
pub use output::OutputLines;
