//! Emulated display memory shared between the emulation thread and the render thread.
//!
//! The producer stores into the framebuffer while the renderer reads it, with no lock between
//! them. Every byte is an `AtomicU8` accessed with `Relaxed` ordering: this avoids Rust data-race
//! UB while compiling down to plain byte loads/stores on the targets we care about. Visibility of
//! a store to the renderer is driven by the dirty bitmap, not by this type.

use std::collections::TryReserveError;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

pub struct SourceFramebuffer {
    bytes: Box<[AtomicU8]>,
}

impl fmt::Debug for SourceFramebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFramebuffer")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

impl SourceFramebuffer {
    /// Allocates `len` bytes initialised to `fill`, reporting allocation failure instead of
    /// aborting.
    pub fn try_new(len: usize, fill: u8) -> Result<Self, TryReserveError> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(len)?;
        bytes.extend((0..len).map(|_| AtomicU8::new(fill)));
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reads one byte; offsets past the end read as 0.
    #[inline]
    pub fn load(&self, offset: usize) -> u8 {
        self.bytes
            .get(offset)
            .map_or(0, |b| b.load(Ordering::Relaxed))
    }

    /// Stores one byte; offsets past the end are ignored.
    #[inline]
    pub fn store(&self, offset: usize, value: u8) {
        if let Some(b) = self.bytes.get(offset) {
            b.store(value, Ordering::Relaxed);
        }
    }

    /// Copies `dst.len()` bytes starting at `offset`. Bytes past the end of the framebuffer
    /// read as 0.
    pub fn read_into(&self, offset: usize, dst: &mut [u8]) {
        let start = offset.min(self.bytes.len());
        let end = offset.saturating_add(dst.len()).min(self.bytes.len());
        let available = end - start;
        for (slot, byte) in dst[..available].iter_mut().zip(&self.bytes[start..end]) {
            *slot = byte.load(Ordering::Relaxed);
        }
        dst[available..].fill(0);
    }

    /// Stores `src` starting at `offset`, dropping whatever does not fit. Returns the number of
    /// bytes written.
    pub fn write_from(&self, offset: usize, src: &[u8]) -> usize {
        let start = offset.min(self.bytes.len());
        let end = offset.saturating_add(src.len()).min(self.bytes.len());
        for (byte, &value) in self.bytes[start..end].iter().zip(src) {
            byte.store(value, Ordering::Relaxed);
        }
        end - start
    }

    /// Copies the whole framebuffer into `dst` (which is truncated or zero-extended to match).
    pub fn copy_to(&self, dst: &mut [u8]) {
        self.read_into(0, dst);
    }

    pub fn fill(&self, value: u8) {
        for byte in self.bytes.iter() {
            byte.store(value, Ordering::Relaxed);
        }
    }
}
