// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Render error in panel '{panel}': {message}")]
    RenderError { panel: String, message: String },

    #[error("Remote display error: {0}")]
    RemoteError(String),

    #[error("Unknown session token: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PanelError>;
