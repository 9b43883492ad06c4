//! Write-time dirty tile tracking.
//!
//! The emulation thread calls [`DirtyTracker::mark_offset`] / [`DirtyTracker::mark_range`] for
//! every store that lands in the framebuffer. Marking is a handful of integer ops plus an atomic
//! `fetch_or`, so the producer never blocks. Once per render cycle the render thread drains the
//! accumulated bits with [`DirtyTracker::take_and_clear`] into a [`DirtyTileSet`] it owns.
//!
//! Over-marking is allowed; losing a mark is not. A bit set after the drain simply lands in the
//! next cycle.
//!
//! [`compare_frames`] is the fallback used while write-time tracking is disabled: it diffs two
//! whole-frame copies tile by tile.

#[cfg(all(feature = "loom", test))]
use loom::sync::atomic::{AtomicBool, AtomicU32};
#[cfg(not(all(feature = "loom", test)))]
use std::sync::atomic::{AtomicBool, AtomicU32};

use std::sync::atomic::Ordering;

use crate::geometry::TileGrid;
use crate::mode::ModeLayout;

/// How a store that spans more than one source row is mapped onto tile columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CrossRowMarking {
    /// Mark every tile column of every touched tile row. Cheap; cross-row stores are rare.
    #[default]
    FullWidth,
    /// Mark the first row from the start column rightwards, the last row up to the end column,
    /// and full width only for the rows in between.
    Exact,
}

/// Producer-side accumulator of dirty tiles.
#[derive(Debug)]
pub struct DirtyTracker {
    grid: TileGrid,
    frame_len: usize,
    cross_row: CrossRowMarking,
    enabled: AtomicBool,
    words: Box<[AtomicU32]>,
}

impl DirtyTracker {
    /// `frame_len` is the size of the source framebuffer in bytes; offsets at or past it are
    /// ignored.
    pub fn new(grid: TileGrid, frame_len: usize, cross_row: CrossRowMarking) -> Self {
        let words = (0..grid.bitmap_words())
            .map(|_| AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            grid,
            frame_len,
            cross_row,
            enabled: AtomicBool::new(true),
            words,
        }
    }

    #[inline]
    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    #[inline]
    pub fn cross_row_marking(&self) -> CrossRowMarking {
        self.cross_row
    }

    /// Enables or disables write-time marking. While disabled every `mark_*` call is a no-op and
    /// the renderer is expected to fall back to [`compare_frames`].
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_bit(&self, index: usize) {
        if index >= self.grid.tile_count() {
            return;
        }
        // Release pairs with the Acquire in `take_and_clear`: a renderer that observes the bit
        // also observes the framebuffer store that preceded the mark.
        self.words[index / 32].fetch_or(1u32 << (index % 32), Ordering::Release);
    }

    fn mark_columns(&self, tile_row: usize, first_col: usize, last_col: usize) {
        if tile_row >= self.grid.rows {
            return;
        }
        let last_col = last_col.min(self.grid.columns - 1);
        for col in first_col..=last_col {
            self.set_bit(self.grid.index(col, tile_row));
        }
    }

    fn mark_full_rows(&self, first_tile_row: usize, last_tile_row: usize) {
        let last_tile_row = last_tile_row.min(self.grid.rows.saturating_sub(1));
        for tile_row in first_tile_row..=last_tile_row {
            self.mark_columns(tile_row, 0, self.grid.columns - 1);
        }
    }

    /// Marks the tile(s) covering the pixels stored in byte `offset` of the framebuffer.
    ///
    /// At packed depths one byte holds several pixels, so a single byte may straddle two tiles
    /// when the tile width is not a multiple of the pixels per byte.
    pub fn mark_offset(&self, layout: ModeLayout, offset: usize) {
        if !self.is_enabled() || offset >= self.frame_len || layout.bytes_per_row == 0 {
            return;
        }

        let y = offset / layout.bytes_per_row;
        if y >= self.grid.height() {
            return;
        }

        let ppb = layout.pixels_per_byte();
        let width = self.grid.width();
        let pixel_start = (offset % layout.bytes_per_row) * ppb;
        if pixel_start >= width {
            // Row padding past the visible width.
            return;
        }
        let pixel_end = (pixel_start + ppb - 1).min(width - 1);

        self.mark_columns(
            y / self.grid.tile_height,
            pixel_start / self.grid.tile_width,
            pixel_end / self.grid.tile_width,
        );
    }

    /// Marks every tile touched by a `len`-byte store starting at `offset`.
    pub fn mark_range(&self, layout: ModeLayout, offset: usize, len: usize) {
        if !self.is_enabled() || offset >= self.frame_len || len == 0 {
            return;
        }
        let bpr = layout.bytes_per_row;
        if bpr == 0 {
            return;
        }

        let len = len.min(self.frame_len - offset);
        let last = offset + len - 1;
        let start_y = offset / bpr;
        let end_y = last / bpr;
        let height = self.grid.height();
        if start_y >= height {
            return;
        }

        let ppb = layout.pixels_per_byte();
        let width = self.grid.width();
        let tw = self.grid.tile_width;
        let th = self.grid.tile_height;
        let start_px = (offset % bpr) * ppb;
        let end_px = ((last % bpr) + 1) * ppb - 1;

        if start_y == end_y {
            // Covers the "first and last byte" of small stores as well as longer spans: the
            // column walk touches at most the tiles between the two end bytes.
            if start_px < width {
                self.mark_columns(start_y / th, start_px / tw, end_px.min(width - 1) / tw);
            }
            return;
        }

        match self.cross_row {
            CrossRowMarking::FullWidth => {
                self.mark_full_rows(start_y / th, end_y / th);
            }
            CrossRowMarking::Exact => {
                if start_px < width {
                    self.mark_columns(start_y / th, start_px / tw, self.grid.columns - 1);
                }
                if end_y > start_y + 1 {
                    let middle_first = start_y + 1;
                    let middle_last = (end_y - 1).min(height - 1);
                    if middle_first <= middle_last {
                        self.mark_full_rows(middle_first / th, middle_last / th);
                    }
                }
                if end_y < height {
                    self.mark_columns(end_y / th, 0, end_px.min(width - 1) / tw);
                }
            }
        }
    }

    /// Marks a single tile by index. Out-of-range indices are ignored.
    pub fn mark_tile(&self, index: usize) {
        if self.is_enabled() {
            self.set_bit(index);
        }
    }

    /// Marks every tile.
    pub fn mark_all(&self) {
        for index in 0..self.grid.tile_count() {
            self.set_bit(index);
        }
    }

    /// Atomically drains the accumulator into `out` and returns the number of dirty tiles.
    ///
    /// Must only be called from the render thread, once per cycle.
    pub fn take_and_clear(&self, out: &mut DirtyTileSet) -> usize {
        debug_assert_eq!(out.tile_count, self.grid.tile_count());
        let mut count = 0usize;
        for (dst, word) in out.words.iter_mut().zip(self.words.iter()) {
            let bits = word.swap(0, Ordering::Acquire);
            *dst = bits;
            count += bits.count_ones() as usize;
        }
        count
    }

    /// Number of tiles currently marked, without draining.
    pub fn pending(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }
}

/// Render-side snapshot of dirty tiles for the current cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirtyTileSet {
    tile_count: usize,
    words: Vec<u32>,
}

impl DirtyTileSet {
    pub fn new(grid: TileGrid) -> Self {
        Self {
            tile_count: grid.tile_count(),
            words: vec![0; grid.bitmap_words()],
        }
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    #[inline]
    pub fn is_dirty(&self, index: usize) -> bool {
        index < self.tile_count && self.words[index / 32] & (1u32 << (index % 32)) != 0
    }

    pub fn set(&mut self, index: usize) {
        if index < self.tile_count {
            self.words[index / 32] |= 1u32 << (index % 32);
        }
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Adds every tile of `other` to `self`.
    pub fn merge(&mut self, other: &DirtyTileSet) {
        for (dst, &src) in self.words.iter_mut().zip(&other.words) {
            *dst |= src;
        }
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Dirty tile indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let bit = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some(word_index * 32 + bit)
                })
            })
            .filter(move |&index| index < self.tile_count)
    }
}

/// Compares two whole-frame copies tile by tile, filling `out` with the tiles that differ.
///
/// Each tile row is compared four bytes at a time with a byte-wise tail, and a tile stops being
/// compared at its first mismatch. At packed depths a tile row covers `tile_width / ppb` bytes;
/// at least four bytes are compared per row, which can only over-report.
pub fn compare_frames(
    grid: TileGrid,
    layout: ModeLayout,
    current: &[u8],
    previous: &[u8],
    out: &mut DirtyTileSet,
) -> usize {
    out.clear();

    let ppb = layout.pixels_per_byte();
    let bpr = layout.bytes_per_row;
    let bytes_per_tile_row = (grid.tile_width / ppb).max(4);
    let mut count = 0usize;

    for ty in 0..grid.rows {
        for tx in 0..grid.columns {
            let tile_byte_x = tx * grid.tile_width / ppb;
            let dirty = (0..grid.tile_height).any(|row| {
                let y = ty * grid.tile_height + row;
                tile_row_differs(current, previous, y * bpr + tile_byte_x, bytes_per_tile_row)
            });
            if dirty {
                out.set(grid.index(tx, ty));
                count += 1;
            }
        }
    }

    count
}

fn tile_row_differs(current: &[u8], previous: &[u8], start: usize, len: usize) -> bool {
    let end = start
        .saturating_add(len)
        .min(current.len())
        .min(previous.len());
    if start >= end {
        return false;
    }

    let mut cur = current[start..end].chunks_exact(4);
    let mut prev = previous[start..end].chunks_exact(4);
    for (a, b) in (&mut cur).zip(&mut prev) {
        let a = u32::from_ne_bytes([a[0], a[1], a[2], a[3]]);
        let b = u32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
        if a != b {
            return true;
        }
    }
    cur.remainder() != prev.remainder()
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::geometry::SOURCE_WIDTH;
    use crate::mode::ColorDepth;

    const FRAME_LEN: usize = 640 * 360;

    fn tracker(cross_row: CrossRowMarking) -> DirtyTracker {
        DirtyTracker::new(TileGrid::PANEL, FRAME_LEN, cross_row)
    }

    fn drain(tracker: &DirtyTracker) -> Vec<usize> {
        let mut set = DirtyTileSet::new(tracker.grid());
        tracker.take_and_clear(&mut set);
        set.iter().collect()
    }

    fn layout8() -> ModeLayout {
        ModeLayout::for_width(ColorDepth::Bpp8, SOURCE_WIDTH)
    }

    #[test]
    fn four_byte_store_inside_one_tile_marks_one_tile() {
        let t = tracker(CrossRowMarking::FullWidth);
        // Row 50, column 85: tile (2, 1).
        t.mark_range(layout8(), 50 * 640 + 85, 4);
        assert_eq!(drain(&t), vec![TileGrid::PANEL.index(2, 1)]);
    }

    #[test]
    fn store_spanning_tile_rows_marks_both_tile_rows() {
        let grid = TileGrid::PANEL;
        // Last two pixels of row 39 and first two of row 40.
        let offset = 39 * 640 + 638;

        let t = tracker(CrossRowMarking::FullWidth);
        t.mark_range(layout8(), offset, 4);
        let expected: Vec<usize> = (0..2 * grid.columns).collect();
        assert_eq!(drain(&t), expected);

        let t = tracker(CrossRowMarking::Exact);
        t.mark_range(layout8(), offset, 4);
        assert_eq!(drain(&t), vec![grid.index(15, 0), grid.index(0, 1)]);
    }

    #[test]
    fn store_spanning_rows_inside_one_tile_row_exact_marks_only_touched_columns() {
        let grid = TileGrid::PANEL;
        let t = tracker(CrossRowMarking::Exact);
        // Row 10 column 600 through row 11 column 3.
        t.mark_range(layout8(), 10 * 640 + 600, 44);
        assert_eq!(drain(&t), vec![grid.index(0, 0), grid.index(15, 0)]);

        // Three rows: the middle row is fully covered.
        t.mark_range(layout8(), 10 * 640 + 600, 640 + 44);
        assert_eq!(drain(&t), (0..grid.columns).collect::<Vec<_>>());
    }

    #[test]
    fn long_single_row_store_marks_column_span() {
        let t = tracker(CrossRowMarking::FullWidth);
        t.mark_range(layout8(), 5 * 640 + 30, 100);
        assert_eq!(drain(&t), vec![0, 1, 2, 3]);
    }

    #[test]
    fn packed_depth_byte_maps_to_pixel_range() {
        let t = tracker(CrossRowMarking::FullWidth);
        let layout = ModeLayout::for_width(ColorDepth::Bpp1, SOURCE_WIDTH);
        // Byte 4 holds pixels 32..=39 (tile 0); byte 5 holds pixels 40..=47 (tile 1).
        t.mark_offset(layout, 4);
        assert_eq!(drain(&t), vec![0]);
        t.mark_offset(layout, 5);
        assert_eq!(drain(&t), vec![1]);

        // 4bpp: byte 20 holds pixels 40 and 41.
        let layout = ModeLayout::for_width(ColorDepth::Bpp4, SOURCE_WIDTH);
        t.mark_offset(layout, 319 * 320 + 20);
        assert_eq!(drain(&t), vec![TileGrid::PANEL.index(1, 7)]);
    }

    #[test]
    fn byte_straddling_tile_boundary_marks_both_tiles() {
        // 12-pixel tiles at 1bpp: byte 1 holds pixels 8..=15, crossing into tile 1.
        let grid = TileGrid::new(12, 4, 4, 2);
        let t = DirtyTracker::new(grid, 6 * 8, CrossRowMarking::FullWidth);
        t.mark_offset(ModeLayout::new(ColorDepth::Bpp1, 6), 1);
        assert_eq!(drain(&t), vec![0, 1]);
    }

    #[test]
    fn invalid_geometry_is_ignored() {
        let t = tracker(CrossRowMarking::FullWidth);
        t.mark_offset(layout8(), FRAME_LEN);
        t.mark_range(layout8(), FRAME_LEN + 10, 4);
        t.mark_range(layout8(), 0, 0);
        t.mark_offset(ModeLayout::new(ColorDepth::Bpp8, 0), 0);
        // Padding bytes past the visible width of a wide stride.
        t.mark_offset(ModeLayout::new(ColorDepth::Bpp8, 700), 650);
        t.mark_tile(10_000);
        assert!(drain(&t).is_empty());
    }

    #[test]
    fn range_past_end_is_clamped() {
        let t = tracker(CrossRowMarking::FullWidth);
        t.mark_range(layout8(), FRAME_LEN - 2, 100);
        assert_eq!(drain(&t), vec![TileGrid::PANEL.tile_count() - 1]);
    }

    #[test]
    fn disabled_tracker_ignores_marks() {
        let t = tracker(CrossRowMarking::FullWidth);
        t.set_enabled(false);
        t.mark_offset(layout8(), 0);
        t.mark_range(layout8(), 0, 1000);
        t.mark_tile(3);
        assert!(drain(&t).is_empty());

        t.set_enabled(true);
        t.mark_tile(3);
        assert_eq!(drain(&t), vec![3]);
    }

    #[test]
    fn take_and_clear_is_an_idempotent_drain() {
        let t = tracker(CrossRowMarking::FullWidth);
        t.mark_offset(layout8(), 0);
        t.mark_offset(layout8(), FRAME_LEN - 1);
        assert_eq!(t.pending(), 2);

        let mut set = DirtyTileSet::new(TileGrid::PANEL);
        assert_eq!(t.take_and_clear(&mut set), 2);
        assert_eq!(t.take_and_clear(&mut set), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn mark_all_sets_every_tile() {
        let t = tracker(CrossRowMarking::FullWidth);
        t.mark_all();
        let mut set = DirtyTileSet::new(TileGrid::PANEL);
        assert_eq!(t.take_and_clear(&mut set), 144);
        assert_eq!(set.iter().count(), 144);
    }

    #[test]
    fn compare_frames_finds_single_changed_tile() {
        let grid = TileGrid::PANEL;
        let previous = vec![0x80u8; FRAME_LEN];
        let mut current = previous.clone();
        // One pixel inside tile (7, 4).
        current[(4 * 40 + 13) * 640 + 7 * 40 + 39] = 0x01;

        let mut set = DirtyTileSet::new(grid);
        assert_eq!(compare_frames(grid, layout8(), &current, &previous, &mut set), 1);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![grid.index(7, 4)]);

        assert_eq!(compare_frames(grid, layout8(), &previous, &previous, &mut set), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn compare_frames_handles_packed_depth_remainder_bytes() {
        let grid = TileGrid::PANEL;
        let layout = ModeLayout::for_width(ColorDepth::Bpp1, SOURCE_WIDTH);
        let previous = vec![0u8; layout.bytes_per_row * 360];
        let mut current = previous.clone();
        // Tile rows are 5 bytes wide at 1bpp; touch the fifth byte of tile (3, 8).
        current[layout.byte_offset(3 * 40 + 32, 8 * 40 + 2)] = 0x80;

        let mut set = DirtyTileSet::new(grid);
        assert_eq!(compare_frames(grid, layout, &current, &previous, &mut set), 1);
        assert!(set.is_dirty(grid.index(3, 8)));
    }

    #[test]
    fn tile_set_iterates_in_index_order() {
        let mut set = DirtyTileSet::new(TileGrid::PANEL);
        for index in [143, 0, 31, 32, 64] {
            set.set(index);
        }
        set.set(144);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 31, 32, 64, 143]);
        assert_eq!(set.count(), 5);
        assert!(!set.is_dirty(144));

        let mut other = DirtyTileSet::new(TileGrid::PANEL);
        other.set(7);
        other.set(31);
        set.merge(&other);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 7, 31, 32, 64, 143]);
    }
}
