use gst::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::MAX_SOURCES;

pub mod overlay;
pub use overlay::OverlayGate;


/// Bounded latency sample window length.
const LATENCY_WINDOW_LEN: usize = 10;

/// Minimum elapsed time between FPS recomputations.
const FPS_INTERVAL: Duration = Duration::from_secs(1);

/// How a latency sample was obtained.
///
/// Clock-relative PTS measurement is authoritative; the frame-interval
/// estimate is degraded-mode only and the two are never averaged together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    Measured,
    Estimated,
}

/// FIFO window of latency samples, bounded to LATENCY_WINDOW_LEN entries.
#[derive(Debug, Default)]
pub struct LatencyWindow {
    samples: std::collections::VecDeque<f64>,
    mode: Option<SampleMode>,
}

impl LatencyWindow {
    pub fn push(&mut self, value_ms: f64, mode: SampleMode) {
        match (self.mode, mode) {
            // Estimates are discarded while measured samples are present
            (Some(SampleMode::Measured), SampleMode::Estimated) => return,
            // A measured sample flushes an estimate-filled window
            (Some(SampleMode::Estimated), SampleMode::Measured) => self.samples.clear(),
            _ => {}
        }

        self.mode = Some(mode);
        self.samples.push_back(value_ms);
        while self.samples.len() > LATENCY_WINDOW_LEN {
            self.samples.pop_front();
        }
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Frame timing state for one branch slot.
#[derive(Debug, Default)]
pub struct BranchMetrics {
    frame_count: u64,
    last_update: Option<Instant>,
    fps: f64,
    window: LatencyWindow,
    latency_ms: f64,
}

impl BranchMetrics {
    /// Account one observed frame.
    ///
    /// Returns true when the FPS value was recomputed, which is the signal
    /// to refresh the overlay text for this branch.
    pub fn record_frame(&mut self, now: Instant, measured_ms: Option<f64>) -> bool {
        self.frame_count += 1;

        match measured_ms {
            Some(ms) if ms > 0.0 => self.window.push(ms, SampleMode::Measured),
            _ => {
                let estimate = 1000.0 / self.fps.max(1.0);
                self.window.push(estimate, SampleMode::Estimated);
            }
        }
        self.latency_ms = self.window.mean();

        match self.last_update {
            None => {
                // First frame opens the measurement window
                self.last_update = Some(now);
                self.frame_count = 0;
                false
            }
            Some(since) => {
                let elapsed = now.duration_since(since).as_secs_f64();
                if elapsed >= FPS_INTERVAL.as_secs_f64() {
                    self.fps = self.frame_count as f64 / elapsed;
                    self.frame_count = 0;
                    self.last_update = Some(now);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ms
    }

    pub fn overlay_text(&self) -> String {
        format!("{:.1} FPS | {:.1}ms", self.fps, self.latency_ms)
    }
}

type BranchTable = Mutex<[BranchMetrics; MAX_SOURCES]>;

/// Per-branch frame instrumentation shared between the streaming threads
/// and the control thread.
///
/// All metrics state is a fixed array behind a single mutex; the lock is
/// held only for the O(1) update and released before any overlay property
/// write.
pub struct MetricsHub {
    branches: Arc<BranchTable>,
    gate: Arc<OverlayGate>,
}

impl MetricsHub {
    pub fn new(gate: Arc<OverlayGate>) -> Self {
        Self {
            branches: Arc::new(Mutex::new(Default::default())),
            gate,
        }
    }

    pub fn gate(&self) -> &Arc<OverlayGate> {
        &self.gate
    }

    /// Install a BUFFER probe on a branch output pad.
    ///
    /// The probe computes the clock-relative latency of every frame and
    /// never blocks the streaming thread.
    pub fn attach_probe(
        &self,
        pad: &gst::Pad,
        index: usize,
        pipeline: &gst::Pipeline,
        overlay: &gst::Element,
    ) {
        self.gate.register(index, overlay.clone());

        let branches = Arc::clone(&self.branches);
        let gate = Arc::clone(&self.gate);
        let weak = pipeline.downgrade();
        pad.add_probe(gst::PadProbeType::BUFFER, move |_pad, info| {
            if let Some(gst::PadProbeData::Buffer(buffer)) = &info.data {
                let measured_ms = buffer.pts().and_then(|pts| {
                    let pipeline = weak.upgrade()?;
                    let clock = pipeline.clock()?;
                    let now = clock.time()?;
                    let base = pipeline.base_time()?;
                    let latency = now.checked_sub(base)?.checked_sub(pts)?;
                    Some(latency.nseconds() as f64 / 1_000_000.0)
                });
                handle_frame(&branches, &gate, index, Instant::now(), measured_ms);
            }
            gst::PadProbeReturn::Ok
        });
    }

    pub fn on_frame(&self, index: usize, measured_ms: Option<f64>) {
        handle_frame(&self.branches, &self.gate, index, Instant::now(), measured_ms);
    }

    #[cfg(test)]
    pub(crate) fn on_frame_at(&self, index: usize, now: Instant, measured_ms: Option<f64>) {
        handle_frame(&self.branches, &self.gate, index, now, measured_ms);
    }

    /// User activity: show the overlays with current values and rearm the
    /// idle timer.
    pub fn on_activity(&self) {
        let texts = {
            let branches = self.branches.lock();
            std::array::from_fn(|i| branches[i].overlay_text())
        };
        self.gate.show(texts);
    }

    /// Current per-branch FPS and mean latency, for status queries.
    pub fn snapshot(&self) -> ([f64; MAX_SOURCES], [f64; MAX_SOURCES]) {
        let branches = self.branches.lock();
        (
            std::array::from_fn(|i| branches[i].fps()),
            std::array::from_fn(|i| branches[i].latency_ms()),
        )
    }
}

/// Frame accounting shared by the probe callback and the test hooks.
fn handle_frame(
    branches: &BranchTable,
    gate: &OverlayGate,
    index: usize,
    now: Instant,
    measured_ms: Option<f64>,
) {
    let refreshed_text = {
        let mut branches = branches.lock();
        if branches[index].record_frame(now, measured_ms) {
            Some(branches[index].overlay_text())
        } else {
            None
        }
    };

    if let Some(text) = refreshed_text {
        if gate.is_visible() {
            gate.set_text(index, &text);
        } else {
            gate.set_text(index, "");
        }
    }
}
