use gst::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::compositor::{CompositorStage, ViewMode};
use crate::config::{Config, MAX_SOURCES};
use crate::metrics::{MetricsHub, OverlayGate};
use crate::pipeline::{Pipeline, PipelineState};
use crate::sink::DisplaySink;
use crate::stream::SourceBranch;
use crate::window::{self, Action, SurfaceHandle, WindowEvent};
use crate::{Result, ViewerError};

/// Lifecycle of the media graph as driven by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Unbuilt,
    Ready,
    Playing,
    Stopped,
}

impl std::fmt::Display for GraphState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GraphState::Unbuilt => "UNBUILT",
            GraphState::Ready => "READY",
            GraphState::Playing => "PLAYING",
            GraphState::Stopped => "STOPPED",
        };
        write!(f, "{}", name)
    }
}

/// Poll-based status snapshot.
#[derive(Debug, Clone)]
pub struct Status {
    pub pipeline_state: PipelineState,
    pub view_mode: ViewMode,
    pub branch_fps: Vec<f64>,
    pub branch_latency_ms: Vec<f64>,
}

/// Everything owned by one built graph; torn down as a unit.
struct Graph {
    pipeline: Pipeline,
    compositor: CompositorStage,
    sink: DisplaySink,
    branches: Vec<Option<SourceBranch>>,
    hub: Arc<MetricsHub>,
    surface: Option<SurfaceHandle>,
}

struct Inner {
    state: GraphState,
    view_mode: ViewMode,
    graph: Option<Graph>,
}

/// Orchestrates graph construction, state transitions, view switching and
/// input handling.
pub struct ViewerManager {
    config: Arc<Config>,
    inner: Mutex<Inner>,
    shutdown: Notify,
}

impl ViewerManager {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: GraphState::Unbuilt,
                view_mode: ViewMode::Tiled,
                graph: None,
            }),
            shutdown: Notify::new(),
        }
    }

    /// Build the media graph: compositor, display sink and one branch per
    /// configured capture device.
    ///
    /// Compositor or sink failures abort the build with no partial graph
    /// left behind. Unavailable devices are skipped; the graph still
    /// becomes READY with fewer sources.
    pub fn build(&self, surface: Option<SurfaceHandle>) -> Result<()> {
        let mut inner = self.inner.lock();

        if inner.graph.is_some() {
            warn!("Graph already exists, destroying it first");
            self.teardown(&mut inner);
        }

        info!("Building media graph");
        let pipeline = Pipeline::new("multicam-viewer")?;

        let mut compositor = CompositorStage::new(pipeline.gst_pipeline(), &self.config.video)
            .map_err(|e| ViewerError::GraphBuild(format!("compositor stage: {}", e)))?;
        let sink = DisplaySink::build(pipeline.gst_pipeline())
            .map_err(|e| ViewerError::GraphBuild(format!("display sink: {}", e)))?;
        compositor
            .src_element()
            .link(sink.sink_element())
            .map_err(|e| ViewerError::GraphBuild(format!("compositor to sink link: {}", e)))?;

        let gate = OverlayGate::new(
            Duration::from_secs_f64(self.config.overlay.idle_timeout_seconds),
            Handle::current(),
        );
        let hub = Arc::new(MetricsHub::new(gate));

        let devices = self.config.effective_devices();
        let mut branches = Vec::with_capacity(devices.len());
        for (index, device) in devices.iter().enumerate() {
            match SourceBranch::build(
                pipeline.gst_pipeline(),
                &mut compositor,
                index,
                device,
                &self.config.video,
                &self.config.overlay,
            ) {
                Ok(branch) => {
                    if let Some(overlay) = branch.overlay() {
                        hub.attach_probe(
                            branch.output_pad(),
                            index,
                            pipeline.gst_pipeline(),
                            overlay,
                        );
                    }
                    branches.push(Some(branch));
                }
                Err(e) => {
                    warn!("Skipping source {} ({}): {}", index, device, e);
                    branches.push(None);
                }
            }
        }

        let active = branches.iter().flatten().count();
        if active == 0 {
            warn!("No capture devices available, graph has no sources");
        }

        compositor.set_layout(ViewMode::Tiled);

        // Dropping the locals on error tears the partial graph down
        pipeline.ready()?;

        inner.graph = Some(Graph {
            pipeline,
            compositor,
            sink,
            branches,
            hub,
            surface,
        });
        inner.state = GraphState::Ready;
        inner.view_mode = ViewMode::Tiled;

        info!(
            "Media graph READY with {}/{} sources",
            active,
            devices.len()
        );
        Ok(())
    }

    /// Start playback and embed into the display surface.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        let graph = inner
            .graph
            .as_ref()
            .ok_or(ViewerError::InvalidState("start requires a built graph"))?;

        if inner.state == GraphState::Playing {
            debug!("start() ignored, already playing");
            return Ok(());
        }

        graph.pipeline.play()?;

        // The surface can only be attached once the sink is PLAYING;
        // earlier attempts may be silently ignored by the backend.
        match graph.surface {
            Some(surface) => {
                if let Err(e) = graph.sink.attach_surface(surface) {
                    warn!("Continuing without window embedding: {}", e);
                }
            }
            None => debug!("No display surface supplied, running unembedded"),
        }

        inner.state = GraphState::Playing;
        info!("Media graph PLAYING");
        Ok(())
    }

    /// Stop playback. Idempotent when already stopped; bounded by the
    /// configured shutdown timeout.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        match inner.state {
            GraphState::Unbuilt | GraphState::Stopped => {
                debug!("stop() ignored, nothing is running");
                return Ok(());
            }
            GraphState::Ready | GraphState::Playing => {}
        }

        let timeout = Duration::from_secs(self.config.app.shutdown_timeout_seconds);
        let result = match &inner.graph {
            Some(graph) => graph.pipeline.stop(timeout),
            None => Ok(()),
        };

        // Even a StopTimeout leaves the controller stopped; resources are
        // force-released on destroy()
        inner.state = GraphState::Stopped;
        info!("Media graph STOPPED");
        result
    }

    /// Release the graph and all owned elements. Safe to call repeatedly.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        self.teardown(&mut inner);
    }

    fn teardown(&self, inner: &mut Inner) {
        if let Some(graph) = inner.graph.take() {
            let timeout = Duration::from_secs(self.config.app.shutdown_timeout_seconds);
            if let Err(e) = graph.pipeline.stop(timeout) {
                warn!("Forcing graph teardown: {}", e);
            }
            drop(graph);
            info!("Media graph destroyed");
        }
        inner.state = GraphState::Unbuilt;
        inner.view_mode = ViewMode::Tiled;
    }

    /// Switch the composited view. Valid while READY or PLAYING; a pure
    /// tile property mutation, the pipeline keeps running.
    pub fn switch_view(&self, mode: ViewMode) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::switch_view_locked(&mut inner, mode)
    }

    /// Advance to the next view along the cycling order.
    pub fn cycle_view(&self) -> Result<ViewMode> {
        let mut inner = self.inner.lock();
        let next = inner.view_mode.next();
        Self::switch_view_locked(&mut inner, next)?;
        Ok(next)
    }

    fn switch_view_locked(inner: &mut Inner, mode: ViewMode) -> Result<()> {
        if let ViewMode::Camera(k) = mode {
            if k >= MAX_SOURCES {
                return Err(ViewerError::InvalidState("camera index out of range"));
            }
        }

        match inner.state {
            GraphState::Unbuilt | GraphState::Stopped => {
                Err(ViewerError::InvalidState("view switching requires a running graph"))
            }
            GraphState::Ready | GraphState::Playing => {
                let graph = inner
                    .graph
                    .as_mut()
                    .ok_or(ViewerError::InvalidState("graph is gone"))?;
                graph.compositor.set_layout(mode);
                inner.view_mode = mode;
                Ok(())
            }
        }
    }

    pub fn state(&self) -> GraphState {
        self.inner.lock().state
    }

    pub fn view_mode(&self) -> ViewMode {
        self.inner.lock().view_mode
    }

    /// Poll-based status for external reporters.
    pub fn get_status(&self) -> Status {
        let inner = self.inner.lock();
        match &inner.graph {
            Some(graph) => {
                let (fps, latency) = graph.hub.snapshot();
                let count = graph.branches.len();
                Status {
                    pipeline_state: graph.pipeline.current_state(),
                    view_mode: inner.view_mode,
                    branch_fps: fps[..count].to_vec(),
                    branch_latency_ms: latency[..count].to_vec(),
                }
            }
            None => Status {
                pipeline_state: PipelineState::Null,
                view_mode: inner.view_mode,
                branch_fps: Vec::new(),
                branch_latency_ms: Vec::new(),
            },
        }
    }

    /// Fire-and-forget input handling; called from the window host's event
    /// dispatch path.
    pub fn handle_event(&self, event: WindowEvent) {
        if window::is_activity(&event) {
            let hub = self.inner.lock().graph.as_ref().map(|g| Arc::clone(&g.hub));
            if let Some(hub) = hub {
                hub.on_activity();
            }
        }

        match window::action_for(&event) {
            Some(Action::SwitchView(mode)) => {
                if let Err(e) = self.switch_view(mode) {
                    warn!("Ignoring view switch: {}", e);
                }
            }
            Some(Action::CycleView) => match self.cycle_view() {
                Ok(mode) => debug!("Cycled to {}", mode),
                Err(e) => warn!("Ignoring view cycle: {}", e),
            },
            Some(Action::Shutdown) => {
                info!("Shutdown requested");
                self.shutdown.notify_one();
            }
            None => {}
        }
    }

    /// Resolves once a shutdown was requested through the input path.
    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await;
    }
}

impl Drop for ViewerManager {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if inner.graph.is_some() {
            self.teardown(&mut inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::Key;

    fn manager() -> ViewerManager {
        ViewerManager::new(Arc::new(Config::default()))
    }

    #[test]
    fn test_new_manager_is_unbuilt() {
        let manager = manager();
        assert_eq!(manager.state(), GraphState::Unbuilt);
        assert_eq!(manager.view_mode(), ViewMode::Tiled);
    }

    #[test]
    fn test_switch_view_while_unbuilt_errors() {
        let manager = manager();
        let result = manager.switch_view(ViewMode::Camera(2));
        assert!(matches!(result, Err(ViewerError::InvalidState(_))));
        assert_eq!(manager.state(), GraphState::Unbuilt);
        assert_eq!(manager.view_mode(), ViewMode::Tiled);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let manager = manager();
        assert!(manager.stop().is_ok());
        assert!(manager.stop().is_ok());
        assert_eq!(manager.state(), GraphState::Unbuilt);
    }

    #[test]
    fn test_destroy_without_graph_is_a_noop() {
        let manager = manager();
        manager.destroy();
        manager.destroy();
        assert_eq!(manager.state(), GraphState::Unbuilt);
    }

    #[test]
    fn test_status_without_graph() {
        let manager = manager();
        let status = manager.get_status();
        assert_eq!(status.pipeline_state, PipelineState::Null);
        assert_eq!(status.view_mode, ViewMode::Tiled);
        assert!(status.branch_fps.is_empty());
        assert!(status.branch_latency_ms.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_event_resolves_waiter() {
        let manager = Arc::new(manager());

        manager.handle_event(WindowEvent::KeyPress(Key::Escape));
        tokio::time::timeout(Duration::from_secs(1), manager.shutdown_requested())
            .await
            .expect("shutdown was signalled");
    }

    #[tokio::test]
    async fn test_build_with_unavailable_devices() {
        if gst::init().is_err() {
            return;
        }
        for element in ["compositor", "videoconvert", "capsfilter"] {
            if gst::ElementFactory::find(element).is_none() {
                return;
            }
        }
        if gst::ElementFactory::find("xvimagesink").is_none()
            && gst::ElementFactory::find("ximagesink").is_none()
        {
            return;
        }

        let mut config = Config::default();
        config.video.devices = vec![
            "/nonexistent/video0".to_string(),
            "/nonexistent/video1".to_string(),
        ];
        let manager = ViewerManager::new(Arc::new(config));

        match manager.build(None) {
            Ok(()) => {
                // All devices were skipped, yet the graph is READY
                assert_eq!(manager.state(), GraphState::Ready);

                let status = manager.get_status();
                assert_eq!(status.branch_fps.len(), 2);

                assert!(manager.switch_view(ViewMode::Camera(1)).is_ok());
                assert_eq!(manager.view_mode(), ViewMode::Camera(1));

                manager.destroy();
                assert_eq!(manager.state(), GraphState::Unbuilt);
            }
            Err(ViewerError::GraphBuild(_)) => {
                // Headless environment: the X11 sink cannot reach READY.
                assert_eq!(manager.state(), GraphState::Unbuilt);
            }
            Err(e) => panic!("unexpected build error: {}", e),
        }
    }
}
