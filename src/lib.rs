pub mod compositor;
pub mod config;
pub mod gst_utils;
pub mod manager;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod stream;
pub mod window;

// Re-export commonly used types
pub use config::Config;
pub use manager::ViewerManager;

use std::time::Duration;

// Common error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Failed to create element: {0}")]
    ElementCreationFailed(String),

    #[error("Graph build failed: {0}")]
    GraphBuild(String),

    #[error("Failed to start playback: {0}")]
    Start(String),

    #[error("Surface attachment failed: {0}")]
    Attachment(String),

    #[error("Pipeline did not reach idle within {0:?}")]
    StopTimeout(Duration),

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GStreamer error: {0}")]
    Glib(#[from] gst::glib::Error),

    #[error("GStreamer boolean error: {0}")]
    GstBool(#[from] gst::glib::BoolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ViewerError>;
