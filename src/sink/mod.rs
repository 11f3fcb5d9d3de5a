use gst::prelude::*;
use gst_video::prelude::*;
use tracing::{debug, info, warn};

use crate::window::SurfaceHandle;
use crate::{Result, ViewerError};

/// Property names historically used by X11 sinks for window embedding,
/// probed in order when the overlay interface is unavailable.
const SURFACE_PROPERTIES: &[&str] = &["window-id", "xid", "xwindow-id", "window"];

/// Mechanism that succeeded in attaching the display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachVia {
    OverlayInterface,
    Property(&'static str),
}

impl std::fmt::Display for AttachVia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachVia::OverlayInterface => write!(f, "VideoOverlay interface"),
            AttachVia::Property(name) => write!(f, "{} property", name),
        }
    }
}

/// Final conversion and output to the native display surface.
///
/// The sink runs unsynchronized: frames render as they arrive instead of
/// being paced against the pipeline clock, and late frames are dropped
/// rather than queued.
pub struct DisplaySink {
    convert: gst::Element,
    sink: gst::Element,
}

impl DisplaySink {
    pub fn build(pipeline: &gst::Pipeline) -> Result<Self> {
        let convert = gst::ElementFactory::make("videoconvert")
            .name("display-convert")
            .build()
            .map_err(|e| {
                ViewerError::ElementCreationFailed(format!("display videoconvert: {}", e))
            })?;

        let sink = match gst::ElementFactory::make("xvimagesink")
            .name("display-sink")
            .build()
        {
            Ok(sink) => {
                info!("Created xvimagesink for window embedding");
                sink
            }
            Err(_) => {
                let sink = gst::ElementFactory::make("ximagesink")
                    .name("display-sink")
                    .build()
                    .map_err(|e| {
                        ViewerError::ElementCreationFailed(format!(
                            "no X11 video sink available: {}",
                            e
                        ))
                    })?;
                info!("Created ximagesink for window embedding");
                sink
            }
        };

        sink.set_property("sync", false);

        pipeline.add_many([&convert, &sink])?;
        convert.link(&sink)?;

        Ok(Self { convert, sink })
    }

    /// Element the compositor output links into.
    pub fn sink_element(&self) -> &gst::Element {
        &self.convert
    }

    /// Embed the video output into the given native surface.
    ///
    /// Must be called after the graph reached PLAYING; earlier attachment
    /// may be silently ignored by the display backend. Strategies are tried
    /// in order and the one that succeeded is logged. Failure is non-fatal
    /// to playback.
    pub fn attach_surface(&self, handle: SurfaceHandle) -> Result<AttachVia> {
        if let Some(overlay) = self.sink.dynamic_cast_ref::<gst_video::VideoOverlay>() {
            // Safety: the handle is an X11 window id supplied by the window
            // host and stays valid for the lifetime of the graph.
            unsafe {
                overlay.set_window_handle(handle.0 as usize);
            }
            info!("Attached surface {:#x} via {}", handle.0, AttachVia::OverlayInterface);
            return Ok(AttachVia::OverlayInterface);
        }

        for &name in SURFACE_PROPERTIES {
            let Some(pspec) = self.sink.find_property(name) else {
                debug!("Sink has no {} property", name);
                continue;
            };

            let via = AttachVia::Property(name);
            match pspec.value_type() {
                t if t == gst::glib::Type::U64 => self.sink.set_property(name, handle.0),
                t if t == gst::glib::Type::I64 => self.sink.set_property(name, handle.0 as i64),
                t if t == gst::glib::Type::U32 => self.sink.set_property(name, handle.0 as u32),
                t if t == gst::glib::Type::I32 => self.sink.set_property(name, handle.0 as i32),
                other => {
                    debug!("Sink {} property has unsupported type {}", name, other);
                    continue;
                }
            }
            info!("Attached surface {:#x} via {}", handle.0, via);
            return Ok(via);
        }

        warn!("Could not attach display surface, playback continues unembedded");
        Err(ViewerError::Attachment(format!(
            "sink {} exposes no supported embedding mechanism",
            self.sink.name()
        )))
    }
}
