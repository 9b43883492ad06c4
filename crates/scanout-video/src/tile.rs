//! Per-tile snapshot and render.
//!
//! The producer may store into the framebuffer while a tile is being read. Copying one small
//! tile at a time into a private buffer bounds what a torn read can affect to that tile for one
//! frame; the next cycle redraws it since the store also marked it dirty.

use scanout_shared::{ModeLayout, NativePalette, SourceFramebuffer, TileGrid, PIXEL_SCALE};

use crate::decode::decode_row;
use crate::error::{try_alloc, Result};
use crate::expand::expand_block_2x;

/// Reusable buffers for one tile, owned by the scheduler.
#[derive(Debug)]
pub struct TileScratch {
    tile_width: usize,
    row_bytes: Vec<u8>,
    indices: Vec<u8>,
    pixels: Vec<u16>,
}

impl TileScratch {
    pub fn new(grid: TileGrid) -> Result<Self> {
        let tile_pixels = grid.tile_pixels();
        Ok(Self {
            tile_width: grid.tile_width,
            row_bytes: try_alloc(grid.tile_width, 0u8, "tile row buffer")?,
            indices: try_alloc(tile_pixels, 0u8, "tile index buffer")?,
            pixels: try_alloc(
                tile_pixels * PIXEL_SCALE * PIXEL_SCALE,
                0u16,
                "tile pixel buffer",
            )?,
        })
    }

    /// Palette indices captured by the last [`snapshot_tile`].
    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    /// Panel pixels produced by the last [`TileScratch::render`].
    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    /// Expands the captured indices through `palette` into the pixel buffer.
    pub fn render(&mut self, palette: &NativePalette) -> &[u16] {
        render_tile_from_snapshot(&self.indices, palette, self.tile_width, &mut self.pixels);
        &self.pixels
    }
}

/// Copies tile `(tx, ty)` out of the live framebuffer into `scratch` as one palette index per
/// pixel. Bytes past the end of the framebuffer read as 0.
pub fn snapshot_tile(
    fb: &SourceFramebuffer,
    layout: ModeLayout,
    grid: TileGrid,
    tx: usize,
    ty: usize,
    scratch: &mut TileScratch,
) {
    let tw = grid.tile_width;
    let tile_bytes = tw.div_ceil(layout.pixels_per_byte());
    let x0 = tx * tw;

    for (row, dst) in scratch.indices.chunks_exact_mut(tw).enumerate() {
        let offset = layout.byte_offset(x0, ty * grid.tile_height + row);
        if layout.depth.is_packed() {
            let bytes = &mut scratch.row_bytes[..tile_bytes];
            fb.read_into(offset, bytes);
            decode_row(bytes, 0, dst, layout.depth);
        } else {
            fb.read_into(offset, dst);
        }
    }
}

/// Expands a tile's palette indices into panel pixels with 2x2 replication.
///
/// `out` receives `(2 * tile_width) x (2 * tile_height)` pixels in row-major order.
pub fn render_tile_from_snapshot(
    indices: &[u8],
    palette: &NativePalette,
    tile_width: usize,
    out: &mut [u16],
) {
    expand_block_2x(indices, tile_width, palette, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanout_shared::{ColorDepth, SOURCE_WIDTH};

    fn small_grid() -> TileGrid {
        TileGrid::new(8, 2, 4, 3)
    }

    #[test]
    fn snapshot_reads_exactly_one_tile_at_8bpp() {
        let grid = small_grid();
        let layout = ModeLayout::for_width(ColorDepth::Bpp8, grid.width());
        let fb = SourceFramebuffer::try_new(layout.bytes_per_row * grid.height(), 0).unwrap();
        for offset in 0..fb.len() {
            fb.store(offset, offset as u8);
        }

        let mut scratch = TileScratch::new(grid).unwrap();
        snapshot_tile(&fb, layout, grid, 2, 1, &mut scratch);
        // Tile (2, 1) covers columns 16..24 of rows 2 and 3 (32 bytes per row).
        let expected: Vec<u8> = (80u8..88).chain(112..120).collect();
        assert_eq!(scratch.indices(), &expected[..]);
    }

    #[test]
    fn snapshot_decodes_packed_tile() {
        let grid = small_grid();
        let layout = ModeLayout::for_width(ColorDepth::Bpp1, grid.width());
        let fb = SourceFramebuffer::try_new(layout.bytes_per_row * grid.height(), 0).unwrap();
        // Tile column 1 is byte 1 of each row; rows 4 and 5 make tile row 2.
        fb.store(layout.byte_offset(8, 4), 0b1000_0001);
        fb.store(layout.byte_offset(8, 5), 0b0111_1110);

        let mut scratch = TileScratch::new(grid).unwrap();
        snapshot_tile(&fb, layout, grid, 1, 2, &mut scratch);
        assert_eq!(
            scratch.indices(),
            &[1, 0, 0, 0, 0, 0, 0, 1, 0, 1, 1, 1, 1, 1, 1, 0]
        );
    }

    #[test]
    fn snapshot_past_end_of_framebuffer_reads_zero() {
        let grid = TileGrid::PANEL;
        let layout = ModeLayout::for_width(ColorDepth::Bpp8, SOURCE_WIDTH);
        let fb = SourceFramebuffer::try_new(16, 0xAA).unwrap();
        let mut scratch = TileScratch::new(grid).unwrap();
        snapshot_tile(&fb, layout, grid, 15, 8, &mut scratch);
        assert!(scratch.indices().iter().all(|&i| i == 0));
    }

    #[test]
    fn render_produces_double_size_tile() {
        let grid = small_grid();
        let layout = ModeLayout::for_width(ColorDepth::Bpp2, grid.width());
        let fb = SourceFramebuffer::try_new(layout.bytes_per_row * grid.height(), 0).unwrap();
        fb.store(0, 0b0001_1011);

        let mut palette = [0u16; 256];
        palette[..4].copy_from_slice(&[10, 11, 12, 13]);

        let mut scratch = TileScratch::new(grid).unwrap();
        snapshot_tile(&fb, layout, grid, 0, 0, &mut scratch);
        let pixels = scratch.render(&palette);
        assert_eq!(pixels.len(), 16 * 4);
        assert_eq!(&pixels[..8], &[10, 10, 11, 11, 12, 12, 13, 13]);
        assert_eq!(&pixels[16..24], &[10, 10, 11, 11, 12, 12, 13, 13]);
        assert!(pixels[32..].iter().all(|&p| p == 10));
    }
}
