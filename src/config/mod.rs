// src/config/mod.rs

//! Configuration loading and validation for inkpanel.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like unique panel names (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    CacheSection, ComposeSection, ConfigFile, DeviceSection, LivenessSection, MetricsSection,
    NotifySection, PanelConfig, PipelineSection, RawConfigFile, RemoteSection, RendererKind,
    RetrySection, ServerSection, SlackSection, UpdateSection, WallConfig,
};
