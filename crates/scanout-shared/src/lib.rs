//! State shared between the emulation thread and the render thread: the source framebuffer,
//! the dirty tile accumulator, the current mode and the palette.
//!
//! Everything here is lock-free on the producer side. The render pipeline built on top of it
//! lives in `scanout-video`.

pub mod color;
pub mod dirty_tiles;
pub mod framebuffer;
pub mod geometry;
pub mod mode;
pub mod palette_store;

pub use color::{native_to_rgb, rgb_to_native, Rgb};
pub use dirty_tiles::{compare_frames, CrossRowMarking, DirtyTileSet, DirtyTracker};
pub use framebuffer::SourceFramebuffer;
pub use geometry::{
    Rect, TileGrid, PANEL_HEIGHT, PANEL_WIDTH, PIXEL_SCALE, SOURCE_HEIGHT, SOURCE_WIDTH,
};
pub use mode::{ColorDepth, ModeLayout, SharedMode, VideoMode};
pub use palette_store::{NativePalette, PaletteStore, PaletteWriter, PALETTE_LEN};
