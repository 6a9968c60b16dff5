// src/service/mod.rs

//! On-demand generation over HTTP.
//!
//! A `run` request gets a token immediately; the render pipeline runs as a
//! child process on a bounded worker pool while its log lines and image bytes
//! accumulate in the session. Clients stream the log and then fetch the image.

pub mod http;
pub mod jobs;
pub mod session;

pub use http::{AppError, router, serve};
pub use jobs::{ImageSnapshot, JobService, JobSettings};
pub use session::{ImageWriter, JobSession, JobStatus, LogRecord, SessionStore};
