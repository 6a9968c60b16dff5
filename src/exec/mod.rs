// src/exec/mod.rs

//! Child process plumbing for the render pipeline.
//!
//! - [`pipeline_command`] builds the `tokio::process::Command` that runs a
//!   render in a separate process.
//! - [`multiplexer`] drains the child's image and log streams concurrently and
//!   enforces the wait / terminate / kill escalation.

pub mod multiplexer;
pub mod pipeline_command;

pub use multiplexer::{ChildExit, StreamLimits, multiplex};
pub use pipeline_command::PipelineCommand;
