use futures::stream::StreamExt;
use gst::prelude::*;
use gst::MessageView;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{Result, ViewerError};

/// Pipeline state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl From<gst::State> for PipelineState {
    fn from(state: gst::State) -> Self {
        match state {
            gst::State::Null => PipelineState::Null,
            gst::State::Ready => PipelineState::Ready,
            gst::State::Paused => PipelineState::Paused,
            gst::State::Playing => PipelineState::Playing,
            gst::State::VoidPending => PipelineState::Null,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Null => "NULL",
            PipelineState::Ready => "READY",
            PipelineState::Paused => "PAUSED",
            PipelineState::Playing => "PLAYING",
        };
        write!(f, "{}", name)
    }
}

/// Pipeline wrapper with state tracking and bus monitoring
pub struct Pipeline {
    id: Uuid,
    name: String,
    pipeline: gst::Pipeline,
    state: Arc<Mutex<PipelineState>>,
    bus_task: Option<tokio::task::AbortHandle>,
}

impl Pipeline {
    /// Create a new pipeline and start monitoring its message bus.
    ///
    /// Bus messages are consumed on a tokio task; running a GLib main loop
    /// is not required.
    pub fn new(name: &str) -> Result<Self> {
        let pipeline = gst::Pipeline::builder().name(name).build();
        let id = Uuid::new_v4();
        let state = Arc::new(Mutex::new(PipelineState::Null));

        let bus = pipeline
            .bus()
            .ok_or_else(|| ViewerError::GraphBuild("Failed to get pipeline bus".to_string()))?;

        let state_clone = state.clone();
        let pipeline_name = name.to_string();
        let task = tokio::spawn(async move {
            let mut messages = bus.stream();
            while let Some(msg) = messages.next().await {
                match msg.view() {
                    MessageView::Error(err) => {
                        error!(
                            "Error from {}: {} (debug: {:?})",
                            err.src().map(|s| s.path_string()).unwrap_or_default(),
                            err.error(),
                            err.debug()
                        );
                    }
                    MessageView::Warning(w) => {
                        warn!(
                            "Warning from {}: {} (debug: {:?})",
                            w.src().map(|s| s.path_string()).unwrap_or_default(),
                            w.error(),
                            w.debug()
                        );
                    }
                    MessageView::Eos(_) => {
                        info!("Pipeline {} received EOS", pipeline_name);
                    }
                    MessageView::StateChanged(state_changed) => {
                        // Only the top-level pipeline state is tracked
                        if state_changed.src().map(|s| s.type_().name()) == Some("GstPipeline") {
                            let new_state = PipelineState::from(state_changed.current());
                            *state_clone.lock() = new_state;
                            debug!(
                                "Pipeline {} state changed {:?} -> {:?}",
                                pipeline_name,
                                state_changed.old(),
                                state_changed.current()
                            );
                        }
                    }
                    _ => {}
                }
            }
        });

        Ok(Self {
            id,
            name: name.to_string(),
            pipeline,
            state,
            bus_task: Some(task.abort_handle()),
        })
    }

    /// Drive the pipeline to READY.
    pub fn ready(&self) -> Result<()> {
        debug!("Setting pipeline {} to READY", self.name);
        self.pipeline.set_state(gst::State::Ready).map_err(|e| {
            ViewerError::GraphBuild(format!("Failed to set pipeline to READY: {:?}", e))
        })?;
        *self.state.lock() = PipelineState::Ready;
        Ok(())
    }

    /// Start the pipeline (set to Playing state)
    pub fn play(&self) -> Result<()> {
        info!("Starting pipeline: {}", self.name);
        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            error!("Failed to start pipeline {}: {:?}", self.name, e);
            ViewerError::Start(format!("state change to PLAYING failed: {:?}", e))
        })?;
        *self.state.lock() = PipelineState::Playing;
        Ok(())
    }

    /// Stop the pipeline and wait (bounded) for it to reach NULL.
    pub fn stop(&self, timeout: Duration) -> Result<()> {
        info!("Stopping pipeline: {}", self.name);
        self.pipeline.set_state(gst::State::Null).map_err(|e| {
            ViewerError::GraphBuild(format!("Failed to set pipeline to NULL: {:?}", e))
        })?;

        let gst_timeout = gst::ClockTime::from_nseconds(timeout.as_nanos() as u64);
        let (result, current, _pending) = self.pipeline.state(gst_timeout);
        match result {
            Ok(_) if current == gst::State::Null => {
                *self.state.lock() = PipelineState::Null;
                Ok(())
            }
            _ => {
                warn!(
                    "Pipeline {} did not reach NULL within {:?} (current: {:?})",
                    self.name, timeout, current
                );
                *self.state.lock() = PipelineState::from(current);
                Err(ViewerError::StopTimeout(timeout))
            }
        }
    }

    /// Get the current pipeline state
    pub fn current_state(&self) -> PipelineState {
        *self.state.lock()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the underlying GStreamer pipeline
    pub fn gst_pipeline(&self) -> &gst::Pipeline {
        &self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        info!("Dropping pipeline: {} ({})", self.name, self.id);

        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Error stopping pipeline during drop: {:?}", e);
        }

        if let Some(task) = self.bus_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pipeline_creation() {
        if gst::init().is_err() {
            return;
        }

        let pipeline = Pipeline::new("test-pipeline").unwrap();
        assert_eq!(pipeline.name(), "test-pipeline");
        assert_eq!(pipeline.current_state(), PipelineState::Null);
    }

    #[tokio::test]
    async fn test_pipeline_state_transitions() {
        if gst::init().is_err() {
            return;
        }

        let pipeline = Pipeline::new("test-state-pipeline").unwrap();

        // An empty pipeline can reach READY and back to NULL
        pipeline.ready().unwrap();
        assert_eq!(pipeline.current_state(), PipelineState::Ready);

        pipeline.stop(Duration::from_secs(5)).unwrap();
        assert_eq!(pipeline.current_state(), PipelineState::Null);
    }

    #[tokio::test]
    async fn test_pipeline_stop_is_idempotent() {
        if gst::init().is_err() {
            return;
        }

        let pipeline = Pipeline::new("test-stop-pipeline").unwrap();
        pipeline.stop(Duration::from_secs(5)).unwrap();
        pipeline.stop(Duration::from_secs(5)).unwrap();
        assert_eq!(pipeline.current_state(), PipelineState::Null);
    }

    #[test]
    fn test_state_conversion() {
        assert_eq!(PipelineState::from(gst::State::Null), PipelineState::Null);
        assert_eq!(PipelineState::from(gst::State::Playing), PipelineState::Playing);
        assert_eq!(PipelineState::from(gst::State::VoidPending), PipelineState::Null);
    }
}
