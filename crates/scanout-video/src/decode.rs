//! Packed pixel decoding: 1/2/4/8 bpp source bytes to one palette index per pixel.
//!
//! Packed depths store the leftmost pixel in the most significant bits. The only branch is on the
//! depth; the per-pixel loops are monomorphized per bit width.

use scanout_shared::ColorDepth;

/// Decodes `dst.len()` pixels starting at pixel `first_pixel` of `src`.
///
/// Pixels whose byte lies past the end of `src` decode as index 0.
pub fn decode_row(src: &[u8], first_pixel: usize, dst: &mut [u8], depth: ColorDepth) {
    match depth {
        ColorDepth::Bpp1 => decode_packed::<1>(src, first_pixel, dst),
        ColorDepth::Bpp2 => decode_packed::<2>(src, first_pixel, dst),
        ColorDepth::Bpp4 => decode_packed::<4>(src, first_pixel, dst),
        ColorDepth::Bpp8 => {
            let start = first_pixel.min(src.len());
            let n = dst.len().min(src.len() - start);
            dst[..n].copy_from_slice(&src[start..start + n]);
            dst[n..].fill(0);
        }
    }
}

/// Palette index of pixel `x` in a packed row.
pub fn packed_pixel(row: &[u8], x: usize, depth: ColorDepth) -> u8 {
    let ppb = depth.pixels_per_byte();
    let Some(&byte) = row.get(x / ppb) else {
        return 0;
    };
    let shift = depth.bit_shift() - (x % ppb) as u32 * depth.bits();
    (byte >> shift) & depth.pixel_mask()
}

fn decode_packed<const BITS: u32>(src: &[u8], first_pixel: usize, dst: &mut [u8]) {
    let ppb = (8 / BITS) as usize;
    let mask = ((1u16 << BITS) - 1) as u8;
    let top = 8 - BITS;

    if first_pixel % ppb == 0 {
        let bytes = src.get(first_pixel / ppb..).unwrap_or(&[]);
        let mut chunks = dst.chunks_mut(ppb);
        // Bytes drive the zip so an exhausted source leaves the remaining chunks untouched.
        for (&byte, chunk) in bytes.iter().zip(&mut chunks) {
            let mut shift = top;
            for slot in chunk.iter_mut() {
                *slot = (byte >> shift) & mask;
                shift = shift.wrapping_sub(BITS);
            }
        }
        for chunk in chunks {
            chunk.fill(0);
        }
        return;
    }

    for (i, slot) in dst.iter_mut().enumerate() {
        let x = first_pixel + i;
        *slot = match src.get(x / ppb) {
            Some(&byte) => (byte >> (top - (x % ppb) as u32 * BITS)) & mask,
            None => 0,
        };
    }
}
