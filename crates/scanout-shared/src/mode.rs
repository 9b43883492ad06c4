//! Current video mode shared between the emulation thread and the render thread.

#[cfg(all(feature = "loom", test))]
use loom::sync::atomic::AtomicU64;
#[cfg(not(all(feature = "loom", test)))]
use std::sync::atomic::AtomicU64;

use std::sync::atomic::Ordering;

/// Indexed color depth of the emulated framebuffer.
///
/// Packed depths store several pixels per byte, most significant bits first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorDepth {
    Bpp1,
    Bpp2,
    Bpp4,
    Bpp8,
}

impl ColorDepth {
    pub const ALL: [ColorDepth; 4] = [
        ColorDepth::Bpp1,
        ColorDepth::Bpp2,
        ColorDepth::Bpp4,
        ColorDepth::Bpp8,
    ];

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(Self::Bpp1),
            2 => Some(Self::Bpp2),
            4 => Some(Self::Bpp4),
            8 => Some(Self::Bpp8),
            _ => None,
        }
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bpp1 => 1,
            Self::Bpp2 => 2,
            Self::Bpp4 => 4,
            Self::Bpp8 => 8,
        }
    }

    #[inline]
    pub const fn pixels_per_byte(self) -> usize {
        match self {
            Self::Bpp1 => 8,
            Self::Bpp2 => 4,
            Self::Bpp4 => 2,
            Self::Bpp8 => 1,
        }
    }

    /// Right shift that brings the leftmost pixel of a byte down to bit 0.
    #[inline]
    pub const fn bit_shift(self) -> u32 {
        match self {
            Self::Bpp1 => 7,
            Self::Bpp2 => 6,
            Self::Bpp4 => 4,
            Self::Bpp8 => 0,
        }
    }

    #[inline]
    pub const fn pixel_mask(self) -> u8 {
        match self {
            Self::Bpp1 => 0x01,
            Self::Bpp2 => 0x03,
            Self::Bpp4 => 0x0F,
            Self::Bpp8 => 0xFF,
        }
    }

    /// Number of palette entries addressable at this depth.
    #[inline]
    pub const fn palette_len(self) -> usize {
        1 << self.bits()
    }

    #[inline]
    pub const fn is_packed(self) -> bool {
        !matches!(self, Self::Bpp8)
    }

    /// Minimal bytes per row for `width` pixels.
    pub const fn bytes_per_row(self, width: usize) -> usize {
        (width * self.bits() as usize).div_ceil(8)
    }
}

/// Video mode descriptor as delivered by the emulated machine on a mode switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    pub depth: ColorDepth,
    pub bytes_per_row: u32,
}

impl VideoMode {
    /// Mode with the tightest possible row stride for `width` pixels.
    pub const fn packed(width: u32, height: u32, depth: ColorDepth) -> Self {
        Self {
            width,
            height,
            depth,
            bytes_per_row: depth.bytes_per_row(width as usize) as u32,
        }
    }

    pub fn layout(&self) -> ModeLayout {
        ModeLayout::new(self.depth, self.bytes_per_row as usize)
    }
}

/// Depth and row stride as consumed by the hot paths, plus the decode parameters derived from
/// them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeLayout {
    pub depth: ColorDepth,
    pub bytes_per_row: usize,
}

impl ModeLayout {
    pub const fn new(depth: ColorDepth, bytes_per_row: usize) -> Self {
        Self {
            depth,
            bytes_per_row,
        }
    }

    pub const fn for_width(depth: ColorDepth, width: usize) -> Self {
        Self::new(depth, depth.bytes_per_row(width))
    }

    #[inline]
    pub const fn pixels_per_byte(&self) -> usize {
        self.depth.pixels_per_byte()
    }

    #[inline]
    pub const fn bit_shift(&self) -> u32 {
        self.depth.bit_shift()
    }

    #[inline]
    pub const fn pixel_mask(&self) -> u8 {
        self.depth.pixel_mask()
    }

    /// Byte offset of pixel `x` in row `y`.
    #[inline]
    pub const fn byte_offset(&self, x: usize, y: usize) -> usize {
        y * self.bytes_per_row + x / self.depth.pixels_per_byte()
    }

    fn pack(self) -> u64 {
        (self.bytes_per_row as u64) << 8 | u64::from(self.depth.bits())
    }

    fn unpack(word: u64) -> Self {
        // Only `pack` ever produces the stored word, so the depth bits are always valid.
        let depth = ColorDepth::from_bits((word & 0xFF) as u32).unwrap_or(ColorDepth::Bpp8);
        Self::new(depth, (word >> 8) as usize)
    }
}

/// Lock-free cell holding the current [`ModeLayout`].
///
/// Depth and stride are packed into one 64-bit word so a reader can never observe the depth of
/// one mode together with the stride of another.
#[derive(Debug)]
pub struct SharedMode {
    word: AtomicU64,
}

impl SharedMode {
    pub fn new(layout: ModeLayout) -> Self {
        Self {
            word: AtomicU64::new(layout.pack()),
        }
    }

    #[inline]
    pub fn load(&self) -> ModeLayout {
        ModeLayout::unpack(self.word.load(Ordering::Acquire))
    }

    pub fn store(&self, layout: ModeLayout) {
        self.word.store(layout.pack(), Ordering::Release);
    }
}
