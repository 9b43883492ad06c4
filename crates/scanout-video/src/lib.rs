//! Render pipeline turning the emulated indexed-color framebuffer into panel pixels.
//!
//! - [`ScanoutShared`]: producer-side handle (stores, dirty marking, wake, palette and mode).
//! - [`RenderScheduler`] / [`RenderTask`]: the per-cycle full/partial/skip decision, run on a
//!   dedicated thread.
//! - [`DisplayDriver`]: the outbound push interface, with [`MemoryPanel`] as a software panel.

pub mod config;
pub mod control;
pub mod decode;
pub mod display;
pub mod error;
pub mod expand;
pub mod frame;
pub mod palette;
pub mod scheduler;
pub mod stats;
pub mod tile;

pub use config::ScanoutConfig;
pub use control::{ScanoutShared, FRAMEBUFFER_LEN};
pub use display::{DisplayDriver, MemoryPanel};
pub use error::{DisplayError, ScanoutError};
pub use frame::FrameRenderer;
pub use scheduler::{CycleOutcome, RenderScheduler, RenderTask, RenderTaskHandle, SchedulerState};
pub use stats::{RenderStats, RenderStatsSnapshot};
pub use tile::{render_tile_from_snapshot, snapshot_tile, TileScratch};

pub use scanout_shared;

#[cfg(test)]
mod tests;
