use scanout_shared::{ModeLayout, NativePalette, Rect, SourceFramebuffer, TileGrid, PIXEL_SCALE};

use crate::decode::decode_row;
use crate::error::{try_alloc, Result};
use crate::expand::expand_row_2x;

/// Renders the whole visible frame into a panel-sized buffer.
///
/// Used after a mode or palette change and whenever too many tiles are dirty for per-tile pushes
/// to pay off.
#[derive(Debug)]
pub struct FrameRenderer {
    grid: TileGrid,
    row_bytes: Vec<u8>,
    row_indices: Vec<u8>,
    pixels: Vec<u16>,
}

impl FrameRenderer {
    pub fn new(grid: TileGrid) -> Result<Self> {
        let panel = grid.panel_frame(PIXEL_SCALE);
        Ok(Self {
            grid,
            row_bytes: try_alloc(grid.width(), 0u8, "frame row buffer")?,
            row_indices: try_alloc(grid.width(), 0u8, "frame index buffer")?,
            pixels: try_alloc(panel.area(), 0u16, "panel frame buffer")?,
        })
    }

    /// Destination rectangle of [`FrameRenderer::pixels`] on the panel.
    pub fn panel_rect(&self) -> Rect {
        self.grid.panel_frame(PIXEL_SCALE)
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    /// Fills the panel buffer with one native color.
    pub fn clear(&mut self, color: u16) {
        self.pixels.fill(color);
    }

    /// Decodes and expands every visible source row, writing two panel rows per source row.
    pub fn render(&mut self, fb: &SourceFramebuffer, layout: ModeLayout, palette: &NativePalette) {
        let width = self.grid.width();
        let dst_width = width * PIXEL_SCALE;
        let row_len = layout.depth.bytes_per_row(width);

        for (y, out) in self
            .pixels
            .chunks_exact_mut(dst_width * PIXEL_SCALE)
            .enumerate()
        {
            let offset = y * layout.bytes_per_row;
            if layout.depth.is_packed() {
                let bytes = &mut self.row_bytes[..row_len];
                fb.read_into(offset, bytes);
                decode_row(bytes, 0, &mut self.row_indices, layout.depth);
            } else {
                fb.read_into(offset, &mut self.row_indices);
            }

            let (upper, lower) = out.split_at_mut(dst_width);
            expand_row_2x(&self.row_indices, palette, upper);
            lower.copy_from_slice(upper);
        }
    }
}
