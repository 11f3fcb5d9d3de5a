use gst::prelude::*;
use tracing::{debug, info};

use crate::config::{VideoConfig, MAX_SOURCES};
use crate::{Result, ViewerError};

/// Active view of the composited canvas.
///
/// Cycling order: Tiled -> Camera(0) -> ... -> Camera(3) -> Tiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// 2x2 grid showing all sources
    Tiled,
    /// One source scaled to the full canvas
    Camera(usize),
}

impl ViewMode {
    pub fn next(self) -> ViewMode {
        match self {
            ViewMode::Tiled => ViewMode::Camera(0),
            ViewMode::Camera(k) if k + 1 < MAX_SOURCES => ViewMode::Camera(k + 1),
            ViewMode::Camera(_) => ViewMode::Tiled,
        }
    }
}

impl std::fmt::Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewMode::Tiled => write!(f, "tiled"),
            ViewMode::Camera(k) => write!(f, "camera-{}", k),
        }
    }
}

/// Placement of one branch on the composited canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub index: usize,
    pub xpos: i32,
    pub ypos: i32,
    pub width: i32,
    pub height: i32,
    pub alpha: f64,
}

/// Compute tile placement for every slot under the given view mode.
///
/// The canvas is always 2*source_width x 2*source_height. Hidden tiles keep
/// their grid-cell geometry so a mode switch always converges to the same
/// tile state regardless of the modes visited in between.
pub fn tile_layout(mode: ViewMode, source_width: i32, source_height: i32) -> [Tile; MAX_SOURCES] {
    let mut tiles = [Tile {
        index: 0,
        xpos: 0,
        ypos: 0,
        width: source_width,
        height: source_height,
        alpha: 1.0,
    }; MAX_SOURCES];

    for (i, tile) in tiles.iter_mut().enumerate() {
        tile.index = i;
        tile.xpos = (i as i32 % 2) * source_width;
        tile.ypos = (i as i32 / 2) * source_height;
    }

    if let ViewMode::Camera(k) = mode {
        for tile in tiles.iter_mut() {
            tile.alpha = 0.0;
        }
        tiles[k] = Tile {
            index: k,
            xpos: 0,
            ypos: 0,
            width: source_width * 2,
            height: source_height * 2,
            alpha: 1.0,
        };
    }

    tiles
}

/// Merges the source branches into one frame via per-tile placement.
///
/// Layout changes are property writes on the live request pads; elements are
/// never rebuilt or relinked for a view switch.
pub struct CompositorStage {
    compositor: gst::Element,
    out_caps: gst::Element,
    pads: [Option<gst::Pad>; MAX_SOURCES],
    tiles: [Tile; MAX_SOURCES],
    source_width: i32,
    source_height: i32,
}

impl CompositorStage {
    pub fn new(pipeline: &gst::Pipeline, video: &VideoConfig) -> Result<Self> {
        let compositor = gst::ElementFactory::make("compositor")
            .name("comp")
            .build()
            .map_err(|e| {
                ViewerError::ElementCreationFailed(format!("compositor: {}", e))
            })?;
        compositor.set_property_from_str("background", "black");

        // Pin the canvas so it does not shrink when fewer than four
        // branches are wired in.
        let out_caps = gst::ElementFactory::make("capsfilter")
            .name("output-caps")
            .property(
                "caps",
                gst::Caps::builder("video/x-raw")
                    .field("width", video.output_width)
                    .field("height", video.output_height)
                    .build(),
            )
            .build()
            .map_err(|e| {
                ViewerError::ElementCreationFailed(format!("output capsfilter: {}", e))
            })?;

        pipeline.add_many([&compositor, &out_caps])?;
        compositor.link(&out_caps)?;

        Ok(Self {
            compositor,
            out_caps,
            pads: Default::default(),
            tiles: tile_layout(ViewMode::Tiled, video.source_width, video.source_height),
            source_width: video.source_width,
            source_height: video.source_height,
        })
    }

    /// Request the sink pad for a branch slot and place it on the canvas.
    ///
    /// Slot index equals branch index equals device list position.
    pub fn connect_branch(&mut self, index: usize) -> Result<gst::Pad> {
        let pad_name = format!("sink_{}", index);
        let pad = self.compositor.request_pad_simple(&pad_name).ok_or_else(|| {
            ViewerError::ElementCreationFailed(format!(
                "compositor pad {} unavailable",
                pad_name
            ))
        })?;

        apply_tile(&pad, &self.tiles[index]);
        self.pads[index] = Some(pad.clone());
        debug!("Connected branch {} to compositor pad {}", index, pad_name);
        Ok(pad)
    }

    /// Re-place all connected tiles for the given view mode.
    pub fn set_layout(&mut self, mode: ViewMode) {
        self.tiles = tile_layout(mode, self.source_width, self.source_height);
        for (index, pad) in self.pads.iter().enumerate() {
            if let Some(pad) = pad {
                apply_tile(pad, &self.tiles[index]);
            }
        }
        info!("Compositor layout set to {}", mode);
    }

    /// Element the display sink chain links from.
    pub fn src_element(&self) -> &gst::Element {
        &self.out_caps
    }

    /// Current tile placement (connected or not).
    pub fn tiles(&self) -> &[Tile; MAX_SOURCES] {
        &self.tiles
    }

    pub fn connected_count(&self) -> usize {
        self.pads.iter().filter(|p| p.is_some()).count()
    }
}

fn apply_tile(pad: &gst::Pad, tile: &Tile) {
    pad.set_properties(&[
        ("xpos", &tile.xpos.to_value()),
        ("ypos", &tile.ypos.to_value()),
        ("width", &tile.width.to_value()),
        ("height", &tile.height.to_value()),
        ("alpha", &tile.alpha.to_value()),
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: i32 = 1920;
    const H: i32 = 1080;

    fn overlaps(a: &Tile, b: &Tile) -> bool {
        a.xpos < b.xpos + b.width
            && b.xpos < a.xpos + a.width
            && a.ypos < b.ypos + b.height
            && b.ypos < a.ypos + a.height
    }

    #[test]
    fn test_tiled_layout_is_a_nonoverlapping_grid() {
        let tiles = tile_layout(ViewMode::Tiled, W, H);

        let expected = [(0, 0), (W, 0), (0, H), (W, H)];
        for (i, tile) in tiles.iter().enumerate() {
            assert_eq!((tile.xpos, tile.ypos), expected[i]);
            assert_eq!((tile.width, tile.height), (W, H));
            assert_eq!(tile.alpha, 1.0);
        }

        for i in 0..tiles.len() {
            for j in (i + 1)..tiles.len() {
                assert!(!overlaps(&tiles[i], &tiles[j]), "tiles {} and {} overlap", i, j);
            }
        }

        // Exact coverage of the 2x2 canvas
        let area: i64 = tiles.iter().map(|t| t.width as i64 * t.height as i64).sum();
        assert_eq!(area, (2 * W) as i64 * (2 * H) as i64);
    }

    #[test]
    fn test_camera_layout_shows_exactly_one_tile() {
        for k in 0..MAX_SOURCES {
            let tiles = tile_layout(ViewMode::Camera(k), W, H);

            let visible: Vec<_> = tiles.iter().filter(|t| t.alpha == 1.0).collect();
            assert_eq!(visible.len(), 1);
            assert_eq!(visible[0].index, k);
            assert_eq!(
                (visible[0].xpos, visible[0].ypos, visible[0].width, visible[0].height),
                (0, 0, 2 * W, 2 * H)
            );

            for tile in tiles.iter().filter(|t| t.index != k) {
                assert_eq!(tile.alpha, 0.0);
            }
        }
    }

    #[test]
    fn test_mode_switch_sequences_converge() {
        // CAMERA_2 -> CAMERA_1 -> TILED -> CAMERA_2 must equal a direct
        // CAMERA_2 switch.
        let direct = tile_layout(ViewMode::Camera(2), W, H);

        let via = [
            ViewMode::Camera(2),
            ViewMode::Camera(1),
            ViewMode::Tiled,
            ViewMode::Camera(2),
        ]
        .into_iter()
        .fold(tile_layout(ViewMode::Tiled, W, H), |_, mode| {
            tile_layout(mode, W, H)
        });
        assert_eq!(direct, via);
    }

    #[test]
    fn test_view_mode_cycling_order() {
        let mut mode = ViewMode::Tiled;
        let mut seen = vec![mode];
        for _ in 0..MAX_SOURCES {
            mode = mode.next();
            seen.push(mode);
        }
        assert_eq!(
            seen,
            vec![
                ViewMode::Tiled,
                ViewMode::Camera(0),
                ViewMode::Camera(1),
                ViewMode::Camera(2),
                ViewMode::Camera(3),
            ]
        );
        assert_eq!(mode.next(), ViewMode::Tiled);
    }

    #[tokio::test]
    async fn test_stage_applies_layout_to_live_pads() {
        if gst::init().is_err() {
            return;
        }
        if gst::ElementFactory::find("compositor").is_none() {
            return;
        }

        let pipeline = gst::Pipeline::builder().name("layout-test").build();
        let video = crate::config::VideoConfig::default();
        let mut stage = CompositorStage::new(&pipeline, &video).unwrap();

        let pad = stage.connect_branch(1).unwrap();
        assert_eq!(stage.connected_count(), 1);

        stage.set_layout(ViewMode::Camera(1));
        assert_eq!(pad.property::<i32>("xpos"), 0);
        assert_eq!(pad.property::<i32>("width"), video.output_width);
        assert_eq!(pad.property::<f64>("alpha"), 1.0);

        stage.set_layout(ViewMode::Tiled);
        assert_eq!(pad.property::<i32>("xpos"), video.source_width);
        assert_eq!(pad.property::<i32>("width"), video.source_width);
    }
}
