//! Conversion between 8-bit RGB and the panel's native pixel format.
//!
//! The panel consumes RGB565 with the two bytes swapped (it is fed big-endian over the bus while
//! the render buffers are little-endian `u16`s).

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn gray(level: u8) -> Self {
        Self::new(level, level, level)
    }

    #[inline]
    pub const fn to_native(self) -> u16 {
        rgb_to_native(self.r, self.g, self.b)
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

/// Packs 8-bit channels into byte-swapped RGB565.
#[inline]
pub const fn rgb_to_native(r: u8, g: u8, b: u8) -> u16 {
    let rgb565 = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
    rgb565.swap_bytes()
}

/// Inverse of [`rgb_to_native`], widening each channel by bit replication.
#[inline]
pub const fn native_to_rgb(native: u16) -> Rgb {
    let rgb565 = native.swap_bytes();
    let r5 = ((rgb565 >> 11) & 0x1F) as u8;
    let g6 = ((rgb565 >> 5) & 0x3F) as u8;
    let b5 = (rgb565 & 0x1F) as u8;
    Rgb::new((r5 << 3) | (r5 >> 2), (g6 << 2) | (g6 >> 4), (b5 << 3) | (b5 >> 2))
}
