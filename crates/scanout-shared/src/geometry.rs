//! Fixed panel geometry and the tile grid laid over the emulated framebuffer.
//!
//! The emulated display is 640x360 indexed pixels, shown on a 1280x720 panel with every source
//! pixel doubled in both directions. Dirty tracking partitions the source frame into a grid of
//! equally sized tiles (40x40 by default, 16 columns by 9 rows).

/// Width of the emulated display in source pixels.
pub const SOURCE_WIDTH: usize = 640;
/// Height of the emulated display in source pixels.
pub const SOURCE_HEIGHT: usize = 360;

/// Horizontal and vertical replication factor from source pixels to panel pixels.
pub const PIXEL_SCALE: usize = 2;

/// Physical panel width in pixels.
pub const PANEL_WIDTH: usize = SOURCE_WIDTH * PIXEL_SCALE;
/// Physical panel height in pixels.
pub const PANEL_HEIGHT: usize = SOURCE_HEIGHT * PIXEL_SCALE;

/// Rectangle in panel pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns whether `self` lies entirely inside a `width x height` surface.
    pub fn fits_within(self, width: u32, height: u32) -> bool {
        self.x
            .checked_add(self.width)
            .is_some_and(|right| right <= width)
            && self
                .y
                .checked_add(self.height)
                .is_some_and(|bottom| bottom <= height)
    }
}

/// Partition of the visible source frame into `columns x rows` tiles.
///
/// Tile `(col, row)` has the stable index `row * columns + col`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    /// Tile width in source pixels. Must be a multiple of 8 so a tile row starts on a byte
    /// boundary at every packed depth.
    pub tile_width: usize,
    /// Tile height in source rows.
    pub tile_height: usize,
    pub columns: usize,
    pub rows: usize,
}

impl TileGrid {
    /// 16x9 grid of 40x40 tiles covering the 640x360 source frame exactly.
    pub const PANEL: TileGrid = TileGrid {
        tile_width: 40,
        tile_height: 40,
        columns: 16,
        rows: 9,
    };

    pub const fn new(tile_width: usize, tile_height: usize, columns: usize, rows: usize) -> Self {
        Self {
            tile_width,
            tile_height,
            columns,
            rows,
        }
    }

    /// Visible source width covered by the grid.
    #[inline]
    pub const fn width(&self) -> usize {
        self.tile_width * self.columns
    }

    /// Visible source height covered by the grid.
    #[inline]
    pub const fn height(&self) -> usize {
        self.tile_height * self.rows
    }

    #[inline]
    pub const fn tile_count(&self) -> usize {
        self.columns * self.rows
    }

    /// Number of `u32` words needed for a one-bit-per-tile bitmap.
    #[inline]
    pub const fn bitmap_words(&self) -> usize {
        self.tile_count().div_ceil(32)
    }

    #[inline]
    pub const fn index(&self, col: usize, row: usize) -> usize {
        row * self.columns + col
    }

    #[inline]
    pub const fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.columns, index / self.columns)
    }

    /// Number of source pixels in one tile.
    #[inline]
    pub const fn tile_pixels(&self) -> usize {
        self.tile_width * self.tile_height
    }

    /// Destination rectangle of a tile on the panel after `scale`x replication.
    pub fn panel_rect(&self, index: usize, scale: usize) -> Rect {
        let (col, row) = self.coords(index);
        let w = self.tile_width * scale;
        let h = self.tile_height * scale;
        Rect::new((col * w) as u32, (row * h) as u32, w as u32, h as u32)
    }

    /// Whole visible frame on the panel after `scale`x replication.
    pub fn panel_frame(&self, scale: usize) -> Rect {
        Rect::new(
            0,
            0,
            (self.width() * scale) as u32,
            (self.height() * scale) as u32,
        )
    }
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::PANEL
    }
}
