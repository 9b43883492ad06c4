use std::time::Duration;

use scanout_shared::{CrossRowMarking, Rgb, TileGrid, SOURCE_HEIGHT, SOURCE_WIDTH};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanoutError};

/// Static configuration of the scanout pipeline.
///
/// Every field has a default matching the production panel, so a JSON file only needs to name
/// the values it overrides. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanoutConfig {
    /// Tile width in source pixels. Must divide the source width and be a multiple of 8.
    pub tile_width: usize,
    /// Tile height in source rows. Must divide the source height.
    pub tile_height: usize,
    /// A cycle with more than this percentage of tiles dirty redraws the whole frame.
    pub full_update_percent: u32,
    /// Wakes arriving sooner than this after the previous render are discarded.
    pub min_frame_interval_ms: u64,
    /// Upper bound on how long the render task sleeps without a wake signal.
    pub wake_timeout_ms: u64,
    /// Interval between performance summaries.
    pub perf_report_interval_ms: u64,
    /// Delay before the render task's first cycle, letting the producer settle.
    pub startup_delay_ms: u64,
    /// How long `stop` waits for the render task to exit before detaching it.
    pub stop_grace_ms: u64,
    /// Start with write-time dirty tracking enabled. When disabled the scheduler diffs whole
    /// frames instead.
    pub write_tracking: bool,
    /// Mark stores spanning several rows precisely instead of across the full width.
    pub exact_cross_row_marking: bool,
    /// Initial value of every framebuffer byte.
    pub framebuffer_fill: u8,
    /// Panel color pushed once before the first frame.
    pub background: [u8; 3],
    /// Name of the render thread.
    pub thread_name: String,
}

impl Default for ScanoutConfig {
    fn default() -> Self {
        Self {
            tile_width: TileGrid::PANEL.tile_width,
            tile_height: TileGrid::PANEL.tile_height,
            full_update_percent: 80,
            min_frame_interval_ms: 67,
            wake_timeout_ms: 67,
            perf_report_interval_ms: 5_000,
            startup_delay_ms: 100,
            stop_grace_ms: 100,
            write_tracking: true,
            exact_cross_row_marking: false,
            framebuffer_fill: 0x80,
            background: [64, 64, 64],
            thread_name: "scanout-render".to_string(),
        }
    }
}

impl ScanoutConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(ScanoutError::InvalidConfig("tile dimensions must be non-zero"));
        }
        if self.tile_width % 8 != 0 {
            return Err(ScanoutError::InvalidConfig(
                "tile width must be a multiple of 8 pixels",
            ));
        }
        if SOURCE_WIDTH % self.tile_width != 0 || SOURCE_HEIGHT % self.tile_height != 0 {
            return Err(ScanoutError::InvalidConfig(
                "tiles must evenly cover the source frame",
            ));
        }
        if self.full_update_percent > 100 {
            return Err(ScanoutError::InvalidConfig(
                "full update percentage must be at most 100",
            ));
        }
        if self.wake_timeout_ms == 0 {
            return Err(ScanoutError::InvalidConfig("wake timeout must be non-zero"));
        }
        Ok(())
    }

    pub fn grid(&self) -> TileGrid {
        TileGrid::new(
            self.tile_width,
            self.tile_height,
            SOURCE_WIDTH / self.tile_width.max(1),
            SOURCE_HEIGHT / self.tile_height.max(1),
        )
    }

    /// Dirty tile count above which a cycle renders the full frame.
    pub fn full_update_threshold(&self) -> usize {
        self.grid().tile_count() * self.full_update_percent as usize / 100
    }

    pub fn cross_row_marking(&self) -> CrossRowMarking {
        if self.exact_cross_row_marking {
            CrossRowMarking::Exact
        } else {
            CrossRowMarking::FullWidth
        }
    }

    pub fn background(&self) -> Rgb {
        Rgb::from(self.background)
    }

    pub fn min_frame_interval(&self) -> Duration {
        Duration::from_millis(self.min_frame_interval_ms)
    }

    pub fn wake_timeout(&self) -> Duration {
        Duration::from_millis(self.wake_timeout_ms)
    }

    pub fn perf_report_interval(&self) -> Duration {
        Duration::from_millis(self.perf_report_interval_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}
