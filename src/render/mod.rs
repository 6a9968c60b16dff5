// src/render/mod.rs

//! Panel rendering.
//!
//! - [`panel`] defines the renderer contract and the per-panel data types.
//! - [`retry`] wraps one render in bounded retry with a placeholder fallback.
//! - [`coordinator`] runs the whole panel set concurrently.
//! - [`builtin`] holds the renderers the binary ships with.
//! - [`placeholder`] and [`text`] draw error banners and bitmap text.
//! - [`geometry`] remembers size corrections for external renderers.

pub mod builtin;
pub mod coordinator;
pub mod geometry;
pub mod panel;
pub mod placeholder;
pub mod retry;
pub mod text;

pub use builtin::build_panels;
pub use coordinator::{RenderCoordinator, RenderReport};
pub use geometry::{Geometry, GeometryCache};
pub use panel::{PanelRenderer, PanelSpec, Placement, RenderContext, RenderOutcome};
pub use retry::{RetryPolicy, render_patiently};
