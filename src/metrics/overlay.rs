use gst::prelude::*;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::config::MAX_SOURCES;

struct GateState {
    visible: bool,
    epoch: u64,
    timer: Option<tokio::task::AbortHandle>,
}

/// Process-wide overlay visibility with an auto-hide idle timer.
///
/// A single timer slot with cancel-and-replace semantics: rearming aborts
/// any pending timer, so hide and show can never cross. The epoch counter
/// makes an already-fired but stale timer a no-op.
pub struct OverlayGate {
    overlays: Mutex<[Option<gst::Element>; MAX_SOURCES]>,
    state: Mutex<GateState>,
    idle_timeout: Duration,
    runtime: Handle,
    weak: Weak<OverlayGate>,
}

impl OverlayGate {
    pub fn new(idle_timeout: Duration, runtime: Handle) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            overlays: Mutex::new(Default::default()),
            state: Mutex::new(GateState {
                visible: false,
                epoch: 0,
                timer: None,
            }),
            idle_timeout,
            runtime,
            weak: weak.clone(),
        })
    }

    /// Register the text overlay element for a branch slot.
    pub fn register(&self, index: usize, overlay: gst::Element) {
        self.overlays.lock()[index] = Some(overlay);
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    /// Activity: make the overlays visible with the given texts and rearm
    /// the idle timer.
    pub fn show(&self, texts: [String; MAX_SOURCES]) {
        {
            let mut state = self.state.lock();
            state.visible = true;
            state.epoch += 1;

            if let Some(timer) = state.timer.take() {
                timer.abort();
            }

            if let Some(gate) = self.weak.upgrade() {
                let epoch = state.epoch;
                let timeout = self.idle_timeout;
                let task = self.runtime.spawn(async move {
                    tokio::time::sleep(timeout).await;
                    gate.hide(epoch);
                });
                state.timer = Some(task.abort_handle());
            }
        }
        trace!("Overlay shown, idle timer rearmed");

        for (index, text) in texts.iter().enumerate() {
            self.set_text(index, text);
        }
    }

    /// Idle expiry for the given epoch; stale epochs are ignored.
    fn hide(&self, epoch: u64) {
        {
            let mut state = self.state.lock();
            if state.epoch != epoch || !state.visible {
                return;
            }
            state.visible = false;
            state.timer = None;
        }
        debug!("Overlay hidden after idle timeout");

        for index in 0..MAX_SOURCES {
            self.set_text(index, "");
        }
    }

    /// Write the overlay text for one branch. No lock is held across the
    /// element property write.
    pub fn set_text(&self, index: usize, text: &str) {
        let overlay = self.overlays.lock()[index].clone();
        if let Some(overlay) = overlay {
            overlay.set_property("text", text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_gate(timeout: Duration) -> Arc<OverlayGate> {
        OverlayGate::new(timeout, Handle::current())
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_hides_after_idle_timeout() {
        let gate = new_gate(Duration::from_secs(3));
        assert!(!gate.is_visible());

        gate.show(Default::default());
        assert!(gate.is_visible());

        // Not hidden just before the deadline
        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert!(gate.is_visible());

        // Hidden just after it
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!gate.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_debounces_idle_timer() {
        let gate = new_gate(Duration::from_secs(3));

        gate.show(Default::default());
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Rearm replaces the pending timer instead of stacking another
        gate.show(Default::default());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(gate.is_visible());

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(!gate.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_show_after_hide_shows_again() {
        let gate = new_gate(Duration::from_millis(100));

        gate.show(Default::default());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!gate.is_visible());

        gate.show(Default::default());
        assert!(gate.is_visible());
    }
}
