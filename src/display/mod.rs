// src/display/mod.rs

//! Scheduled refresh of the physical display over a remote shell.

pub mod driver;
pub mod reconcile;
pub mod remote;

pub use driver::{DisplayDriver, DisplaySettings, NOTIFY_THRESHOLD};
pub use reconcile::{DisplayCycleResult, DisplayExitStatus, Verdict, parse_remote_code, reconcile};
pub use remote::{BoxFuture, OpenSshShell, RemoteOutcome, RemoteShell, ViewerSession, viewer_command};
