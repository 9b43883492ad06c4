//! Palette lookup with 2x2 pixel replication.

use scanout_shared::NativePalette;

/// Converts one row of palette indices into `2 * indices.len()` native pixels, each source pixel
/// written twice side by side.
///
/// Four source pixels are handled per iteration through a single little-endian word read.
pub fn expand_row_2x(indices: &[u8], palette: &NativePalette, dst: &mut [u16]) {
    let dst = &mut dst[..indices.len() * 2];

    let mut src_words = indices.chunks_exact(4);
    let mut dst_words = dst.chunks_exact_mut(8);
    for (src, out) in (&mut src_words).zip(&mut dst_words) {
        let quad = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        let c0 = palette[(quad & 0xFF) as usize];
        let c1 = palette[((quad >> 8) & 0xFF) as usize];
        let c2 = palette[((quad >> 16) & 0xFF) as usize];
        let c3 = palette[(quad >> 24) as usize];
        out.copy_from_slice(&[c0, c0, c1, c1, c2, c2, c3, c3]);
    }

    let tail = src_words.remainder();
    let tail_dst = dst_words.into_remainder();
    for (&index, out) in tail.iter().zip(tail_dst.chunks_exact_mut(2)) {
        let color = palette[index as usize];
        out[0] = color;
        out[1] = color;
    }
}

/// Expands a `width`-wide block of indices into `out`, doubling every row as well as every
/// column. `out` must hold at least `4 * indices.len()` pixels.
pub fn expand_block_2x(indices: &[u8], width: usize, palette: &NativePalette, out: &mut [u16]) {
    if width == 0 {
        return;
    }
    let dst_width = width * 2;
    for (row, src) in indices.chunks_exact(width).enumerate() {
        let top = row * 2 * dst_width;
        let (upper, lower) = out[top..top + 2 * dst_width].split_at_mut(dst_width);
        expand_row_2x(src, palette, upper);
        lower.copy_from_slice(upper);
    }
}
