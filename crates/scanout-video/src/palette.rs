//! Default palettes installed on a mode switch.

use scanout_shared::{ColorDepth, NativePalette, PaletteStore, Rgb, PALETTE_LEN};

/// Classic 16-color desktop table used at 4 bpp.
const PALETTE_16: [Rgb; 16] = [
    Rgb::new(255, 255, 255),
    Rgb::new(255, 255, 0),
    Rgb::new(255, 102, 0),
    Rgb::new(221, 0, 0),
    Rgb::new(255, 0, 153),
    Rgb::new(51, 0, 153),
    Rgb::new(0, 0, 204),
    Rgb::new(0, 153, 255),
    Rgb::new(0, 170, 0),
    Rgb::new(0, 102, 0),
    Rgb::new(102, 51, 0),
    Rgb::new(153, 102, 51),
    Rgb::new(187, 187, 187),
    Rgb::new(136, 136, 136),
    Rgb::new(68, 68, 68),
    Rgb::new(0, 0, 0),
];

const GRAY_RAMP_LEN: usize = 40;
const CUBE_LEN: usize = 216;

/// Default color of `index` at `depth`.
///
/// Index 0 is white and the highest index is black at 1, 2 and 4 bpp. At 8 bpp the first 216
/// entries are a 6x6x6 color cube (`index = r*36 + g*6 + b`) followed by a 40-step gray ramp.
/// Indices past the depth's palette read as black.
pub fn default_color(depth: ColorDepth, index: usize) -> Rgb {
    if index >= depth.palette_len() {
        return Rgb::BLACK;
    }
    match depth {
        ColorDepth::Bpp1 => [Rgb::WHITE, Rgb::BLACK][index],
        ColorDepth::Bpp2 => Rgb::gray([255, 170, 85, 0][index]),
        ColorDepth::Bpp4 => PALETTE_16[index],
        ColorDepth::Bpp8 if index < CUBE_LEN => {
            let level = |v: usize| (v * 51) as u8;
            Rgb::new(level(index / 36), level(index / 6 % 6), level(index % 6))
        }
        ColorDepth::Bpp8 => {
            let step = index - CUBE_LEN;
            Rgb::gray((step * 255 / (GRAY_RAMP_LEN - 1)) as u8)
        }
    }
}

/// Default colors for `depth`, one entry per addressable index.
pub fn default_palette(depth: ColorDepth) -> Vec<Rgb> {
    (0..depth.palette_len())
        .map(|index| default_color(depth, index))
        .collect()
}

/// Replaces the leading entries of `store` with the default palette for `depth`.
///
/// Runs on the producer thread during a mode switch; the table is built on the stack.
pub fn install_default_palette(store: &PaletteStore, depth: ColorDepth) -> u32 {
    let len = depth.palette_len().min(PALETTE_LEN);
    let mut native: NativePalette = [0; PALETTE_LEN];
    for (index, slot) in native[..len].iter_mut().enumerate() {
        *slot = default_color(depth, index).to_native();
    }
    store.store_entries(&native[..len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_depth_fills_its_index_space() {
        for depth in ColorDepth::ALL {
            assert_eq!(default_palette(depth).len(), depth.palette_len(), "{depth:?}");
        }
    }

    #[test]
    fn low_depths_run_white_to_black() {
        for depth in [ColorDepth::Bpp1, ColorDepth::Bpp2, ColorDepth::Bpp4] {
            let colors = default_palette(depth);
            assert_eq!(colors[0], Rgb::WHITE);
            assert_eq!(*colors.last().unwrap(), Rgb::BLACK);
        }
        assert_eq!(default_palette(ColorDepth::Bpp2)[1], Rgb::gray(170));
    }

    #[test]
    fn eight_bit_palette_is_cube_then_gray_ramp() {
        let colors = default_palette(ColorDepth::Bpp8);
        assert_eq!(colors[0], Rgb::BLACK);
        assert_eq!(colors[2 * 36 + 3 * 6 + 5], Rgb::new(102, 153, 255));
        assert_eq!(colors[215], Rgb::WHITE);
        assert_eq!(colors[216], Rgb::BLACK);
        assert_eq!(colors[216 + 13], Rgb::gray(85));
        assert_eq!(colors[255], Rgb::WHITE);
    }

    #[test]
    fn indices_past_the_depth_read_black() {
        assert_eq!(default_color(ColorDepth::Bpp1, 2), Rgb::BLACK);
        assert_eq!(default_color(ColorDepth::Bpp4, 16), Rgb::BLACK);
        assert_eq!(default_color(ColorDepth::Bpp4, 6), Rgb::new(0, 0, 204));
    }

    #[test]
    fn install_covers_the_whole_depth() {
        let store = PaletteStore::new();
        install_default_palette(&store, ColorDepth::Bpp8);
        assert_eq!(store.get(215), Rgb::WHITE.to_native());
        assert_eq!(store.get(216 + 13), Rgb::gray(85).to_native());
        assert_eq!(store.get(255), Rgb::WHITE.to_native());
    }

    #[test]
    fn install_writes_native_colors() {
        let store = PaletteStore::new();
        install_default_palette(&store, ColorDepth::Bpp1);
        assert_eq!(store.get(0), 0xFFFF);
        assert_eq!(store.get(1), 0x0000);
    }
}
