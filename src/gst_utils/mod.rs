use gst::prelude::*;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::{Result, ViewerError};

/// Required GStreamer elements that must be present
const REQUIRED_ELEMENTS: &[&str] = &[
    // Core video elements
    "videoconvert",
    "videoscale",
    "capsfilter",
    "compositor",
    // Capture
    "v4l2src",
];

/// Optional elements that enhance functionality
const OPTIONAL_ELEMENTS: &[&str] = &[
    // Metrics overlay
    "textoverlay",
    // X11 display sinks (one of the two is needed for actual output)
    "xvimagesink",
    "ximagesink",
];

/// Represents the capabilities detected in the GStreamer installation
#[derive(Debug, Clone)]
pub struct GstCapabilities {
    pub has_xvideo: bool,
    pub has_x11: bool,
    pub has_text_overlay: bool,
    pub available_elements: HashMap<String, bool>,
}

impl GstCapabilities {
    /// Check if a specific element is available
    pub fn has_element(&self, element: &str) -> bool {
        self.available_elements.get(element).copied().unwrap_or(false)
    }
}

/// Initialize GStreamer with error handling and logging
pub fn initialize() -> Result<GstCapabilities> {
    info!("Initializing GStreamer");

    gst::init().map_err(|e| {
        error!("Failed to initialize GStreamer: {}", e);
        ViewerError::Config(format!("GStreamer initialization failed: {}", e))
    })?;

    let (major, minor, micro, nano) = gst::version();
    info!("GStreamer version: {}.{}.{}.{}", major, minor, micro, nano);

    if let Ok(debug_str) = std::env::var("GST_DEBUG") {
        debug!("GST_DEBUG set to: {}", debug_str);
    }

    let capabilities = discover_plugins()?;

    info!("GStreamer capabilities detected:");
    info!("  XVideo sink: {}", capabilities.has_xvideo);
    info!("  X11 sink: {}", capabilities.has_x11);
    info!("  Text overlay: {}", capabilities.has_text_overlay);

    if !capabilities.has_xvideo && !capabilities.has_x11 {
        warn!("No X11 video sink available, display output will not work");
    }
    if !capabilities.has_text_overlay {
        warn!("textoverlay not available, metrics overlay will be disabled");
    }

    Ok(capabilities)
}

/// Discover available GStreamer plugins and build capability map
pub fn discover_plugins() -> Result<GstCapabilities> {
    let mut available_elements = HashMap::new();

    info!("Checking required GStreamer elements...");
    let mut missing_required = Vec::new();

    for element in REQUIRED_ELEMENTS {
        if let Some(factory) = gst::ElementFactory::find(element) {
            debug!("Found required element: {} (rank: {:?})", element, factory.rank());
            available_elements.insert(element.to_string(), true);
        } else {
            error!("Missing required element: {}", element);
            missing_required.push(*element);
            available_elements.insert(element.to_string(), false);
        }
    }

    if !missing_required.is_empty() {
        return Err(ViewerError::Config(format!(
            "Missing required GStreamer elements: {:?}",
            missing_required
        )));
    }

    info!("All required elements found");

    for element in OPTIONAL_ELEMENTS {
        if let Some(factory) = gst::ElementFactory::find(element) {
            debug!("Found optional element: {} (rank: {:?})", element, factory.rank());
            available_elements.insert(element.to_string(), true);
        } else {
            debug!("Optional element not found: {}", element);
            available_elements.insert(element.to_string(), false);
        }
    }

    let has_xvideo = available_elements.get("xvimagesink").copied().unwrap_or(false);
    let has_x11 = available_elements.get("ximagesink").copied().unwrap_or(false);
    let has_text_overlay = available_elements.get("textoverlay").copied().unwrap_or(false);

    Ok(GstCapabilities {
        has_xvideo,
        has_x11,
        has_text_overlay,
        available_elements,
    })
}

/// Print detailed plugin information (for --check-plugins flag)
pub fn print_plugin_info(capabilities: &GstCapabilities) {
    println!("\nGStreamer Plugin Discovery Report");
    println!("==================================");

    let (major, minor, micro, nano) = gst::version();
    println!("\nGStreamer Version: {}.{}.{}.{}", major, minor, micro, nano);

    if let Ok(plugin_path) = std::env::var("GST_PLUGIN_PATH") {
        println!("Custom Plugin Path: {}", plugin_path);
    }

    println!("\nRequired Elements:");
    for element in REQUIRED_ELEMENTS {
        let status = if capabilities.has_element(element) { "✓" } else { "✗" };
        println!("  {} {}", status, element);
    }

    println!("\nOptional Elements:");
    for element in OPTIONAL_ELEMENTS {
        let status = if capabilities.has_element(element) { "✓" } else { "✗" };
        println!("  {} {}", status, element);
    }

    println!("\nCapabilities Summary:");
    println!("  XVideo Sink: {}", if capabilities.has_xvideo { "Yes" } else { "No" });
    println!("  X11 Sink: {}", if capabilities.has_x11 { "Yes" } else { "No" });
    println!(
        "  Metrics Overlay: {}",
        if capabilities.has_text_overlay { "Yes" } else { "No" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_discovery() {
        if gst::init().is_err() {
            return;
        }

        // Discovery may fail when capture/compositor plugins are not
        // installed, but the capability map must be consistent either way.
        match discover_plugins() {
            Ok(capabilities) => {
                assert!(!capabilities.available_elements.is_empty());
                assert_eq!(capabilities.has_xvideo, capabilities.has_element("xvimagesink"));
                assert_eq!(capabilities.has_text_overlay, capabilities.has_element("textoverlay"));
            }
            Err(e) => {
                assert!(e.to_string().contains("Missing required"));
            }
        }
    }
}
