//! Palette shared between the emulation thread (writer) and the render thread (reader).
//!
//! Writers take a short busy-bit critical section on the generation word and store the entries;
//! readers copy the whole table out and retry if the generation moved underneath them. The render
//! thread never holds anything across a render pass: it works from its own copy.

#[cfg(all(feature = "loom", test))]
use loom::sync::atomic::{AtomicU16, AtomicU32};
#[cfg(not(all(feature = "loom", test)))]
use std::sync::atomic::{AtomicU16, AtomicU32};

use std::sync::atomic::Ordering;

/// Number of palette entries (8 bpp is the deepest indexed mode).
pub const PALETTE_LEN: usize = 256;

/// Marks the generation word as "update in progress". Published generations never carry it.
pub const PALETTE_GENERATION_BUSY_BIT: u32 = 1 << 31;

/// 256 native (panel-format) colors.
pub type NativePalette = [u16; PALETTE_LEN];

#[derive(Debug)]
pub struct PaletteStore {
    generation: AtomicU32,
    entries: Box<[AtomicU16]>,
}

impl PaletteStore {
    pub fn new() -> Self {
        Self {
            generation: AtomicU32::new(0),
            entries: (0..PALETTE_LEN)
                .map(|_| AtomicU16::new(0))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    /// Runs `f` with the write side held, then publishes a new generation.
    ///
    /// `f` receives a writer that stores entries by index; indices `>= 256` are dropped. Returns
    /// the published generation.
    pub fn update(&self, f: impl FnOnce(&mut PaletteWriter<'_>)) -> u32 {
        let start = self.lock();

        let mut writer = PaletteWriter { store: self };
        f(&mut writer);

        let published = start.wrapping_add(1) & !PALETTE_GENERATION_BUSY_BIT;
        self.generation.store(published, Ordering::SeqCst);
        published
    }

    /// Replaces entries `0..colors.len()` (at most 256) and leaves the rest untouched.
    pub fn store_entries(&self, colors: &[u16]) -> u32 {
        self.update(|w| {
            for (index, &color) in colors.iter().take(PALETTE_LEN).enumerate() {
                w.set(index, color);
            }
        })
    }

    /// Copies a coherent view of the whole table into `out`, returning its generation.
    pub fn copy_into(&self, out: &mut NativePalette) -> u32 {
        loop {
            let gen0 = self.generation.load(Ordering::SeqCst);
            if gen0 & PALETTE_GENERATION_BUSY_BIT != 0 {
                std::hint::spin_loop();
                continue;
            }

            for (slot, entry) in out.iter_mut().zip(self.entries.iter()) {
                *slot = entry.load(Ordering::SeqCst);
            }

            let gen1 = self.generation.load(Ordering::SeqCst);
            if gen0 == gen1 {
                return gen0;
            }
        }
    }

    /// Single entry, read without generation checking. Out-of-range reads return 0.
    pub fn get(&self, index: usize) -> u16 {
        self.entries
            .get(index)
            .map_or(0, |e| e.load(Ordering::SeqCst))
    }

    /// Last published generation (busy bit stripped).
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::SeqCst) & !PALETTE_GENERATION_BUSY_BIT
    }

    fn lock(&self) -> u32 {
        let mut start = self.generation.load(Ordering::SeqCst);
        loop {
            if start & PALETTE_GENERATION_BUSY_BIT != 0 {
                std::hint::spin_loop();
                start = self.generation.load(Ordering::SeqCst);
                continue;
            }

            match self.generation.compare_exchange_weak(
                start,
                start | PALETTE_GENERATION_BUSY_BIT,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return start,
                Err(actual) => start = actual,
            }
        }
    }
}

impl Default for PaletteStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Write access handed out by [`PaletteStore::update`].
pub struct PaletteWriter<'a> {
    store: &'a PaletteStore,
}

impl PaletteWriter<'_> {
    pub fn set(&mut self, index: usize, color: u16) {
        if let Some(entry) = self.store.entries.get(index) {
            entry.store(color, Ordering::SeqCst);
        }
    }
}
