use gst::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::compositor::CompositorStage;
use crate::config::{OverlayConfig, VideoConfig};
use crate::{Result, ViewerError};

/// One capture-to-tile processing chain for a single video source.
///
/// Chain: v4l2src -> videoconvert -> videoscale -> capsfilter ->
/// textoverlay -> compositor tile pad. The overlay is optional; when it
/// cannot be created the branch degrades to a chain without metrics
/// instead of failing the build.
pub struct SourceBranch {
    index: usize,
    device_path: String,
    capture: gst::Element,
    convert: gst::Element,
    scale: gst::Element,
    caps_filter: gst::Element,
    overlay: Option<gst::Element>,
    tile_pad: gst::Pad,
    output_pad: gst::Pad,
}

impl std::fmt::Debug for SourceBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBranch")
            .field("index", &self.index)
            .field("device_path", &self.device_path)
            .field("capture", &self.capture.name())
            .field("convert", &self.convert.name())
            .field("scale", &self.scale.name())
            .field("caps_filter", &self.caps_filter.name())
            .field("has_overlay", &self.overlay.is_some())
            .finish()
    }
}

impl SourceBranch {
    pub fn build(
        pipeline: &gst::Pipeline,
        compositor: &mut CompositorStage,
        index: usize,
        device: &str,
        video: &VideoConfig,
        overlay_cfg: &OverlayConfig,
    ) -> Result<Self> {
        if !Path::new(device).exists() {
            return Err(ViewerError::DeviceUnavailable(device.to_string()));
        }

        debug!("Building source branch {} for device {}", index, device);

        // Timestamp frames at capture time so downstream queuing does not
        // count twice into the measured latency.
        let capture = make_element("v4l2src", &format!("src-{}", index))?;
        capture.set_property("device", device);
        capture.set_property("do-timestamp", true);

        let convert = make_element("videoconvert", &format!("convert-{}", index))?;
        let scale = make_element("videoscale", &format!("scale-{}", index))?;

        let caps_filter = make_element("capsfilter", &format!("caps-{}", index))?;
        caps_filter.set_property(
            "caps",
            gst::Caps::builder("video/x-raw")
                .field("width", video.source_width)
                .field("height", video.source_height)
                .field("framerate", gst::Fraction::new(video.framerate, 1))
                .build(),
        );

        let overlay = match make_element("textoverlay", &format!("overlay-{}", index)) {
            Ok(overlay) => {
                overlay.set_property("text", "");
                overlay.set_property("font-desc", overlay_cfg.font_desc.as_str());
                overlay.set_property_from_str("valignment", "top");
                overlay.set_property_from_str("halignment", "left");
                Some(overlay)
            }
            Err(e) => {
                warn!(
                    "Branch {}: overlay element unavailable ({}), metrics disabled for this branch",
                    index, e
                );
                None
            }
        };

        let mut chain = vec![
            capture.clone(),
            convert.clone(),
            scale.clone(),
            caps_filter.clone(),
        ];
        if let Some(overlay) = &overlay {
            chain.push(overlay.clone());
        }

        pipeline.add_many(&chain)?;

        match Self::wire(&chain, compositor, index) {
            Ok((tile_pad, output_pad)) => {
                info!("Created source branch {} for device {}", index, device);
                Ok(Self {
                    index,
                    device_path: device.to_string(),
                    capture,
                    convert,
                    scale,
                    caps_filter,
                    overlay,
                    tile_pad,
                    output_pad,
                })
            }
            Err(e) => {
                // Leave no orphaned elements behind for a skipped branch
                let _ = pipeline.remove_many(&chain);
                Err(e)
            }
        }
    }

    fn wire(
        chain: &[gst::Element],
        compositor: &mut CompositorStage,
        index: usize,
    ) -> Result<(gst::Pad, gst::Pad)> {
        gst::Element::link_many(chain)?;

        let last = chain.last().ok_or_else(|| {
            ViewerError::ElementCreationFailed(format!("branch {} chain is empty", index))
        })?;
        let output_pad = last.static_pad("src").ok_or_else(|| {
            ViewerError::ElementCreationFailed(format!(
                "branch {} tail element has no src pad",
                index
            ))
        })?;

        let tile_pad = compositor.connect_branch(index)?;
        output_pad.link(&tile_pad).map_err(|e| {
            ViewerError::ElementCreationFailed(format!(
                "branch {} could not link into compositor: {:?}",
                index, e
            ))
        })?;

        Ok((tile_pad, output_pad))
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Pad observed by the metrics probe (the branch output into its tile).
    pub fn output_pad(&self) -> &gst::Pad {
        &self.output_pad
    }

    pub fn tile_pad(&self) -> &gst::Pad {
        &self.tile_pad
    }

    /// Text overlay element, absent when the branch degraded at build time.
    pub fn overlay(&self) -> Option<&gst::Element> {
        self.overlay.as_ref()
    }
}

fn make_element(factory: &str, name: &str) -> Result<gst::Element> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|e| ViewerError::ElementCreationFailed(format!("{}: {}", factory, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::CompositorStage;
    use crate::config::{Config, OverlayConfig};

    #[tokio::test]
    async fn test_missing_device_is_reported_unavailable() {
        if gst::init().is_err() {
            return;
        }
        if gst::ElementFactory::find("compositor").is_none() {
            return;
        }

        let pipeline = gst::Pipeline::builder().name("branch-test").build();
        let config = Config::default();
        let mut stage = CompositorStage::new(&pipeline, &config.video).unwrap();

        let result = SourceBranch::build(
            &pipeline,
            &mut stage,
            0,
            "/nonexistent/video-device",
            &config.video,
            &OverlayConfig::default(),
        );

        match result {
            Err(ViewerError::DeviceUnavailable(device)) => {
                assert_eq!(device, "/nonexistent/video-device");
            }
            other => panic!("expected DeviceUnavailable, got {:?}", other.map(|_| ())),
        }
        // A skipped branch must not leave a compositor pad behind
        assert_eq!(stage.connected_count(), 0);
    }
}
