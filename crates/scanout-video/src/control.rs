//! Producer-facing handle: framebuffer stores, dirty marking, wake signal, palette and mode
//! control.
//!
//! Every method here is called from the emulation thread and never blocks it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scanout_shared::{
    ColorDepth, DirtyTracker, ModeLayout, NativePalette, PaletteStore, Rgb, SharedMode,
    SourceFramebuffer, TileGrid, VideoMode, PALETTE_LEN, SOURCE_HEIGHT, SOURCE_WIDTH,
};
use tracing::{debug, trace, warn};

use crate::config::ScanoutConfig;
use crate::error::{Result, ScanoutError};
use crate::palette::install_default_palette;
use crate::stats::RenderStats;

/// Largest framebuffer any supported mode needs (8 bpp at the source resolution).
pub const FRAMEBUFFER_LEN: usize = SOURCE_WIDTH * SOURCE_HEIGHT;

/// Cloneable handle to the state shared with the render task.
#[derive(Clone, Debug)]
pub struct ScanoutShared {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ScanoutConfig,
    grid: TileGrid,
    framebuffer: SourceFramebuffer,
    tracker: DirtyTracker,
    mode: SharedMode,
    palette: PaletteStore,
    force_full: AtomicBool,
    stats: RenderStats,
    wake_tx: SyncSender<()>,
    wake_rx: Mutex<Option<Receiver<()>>>,
}

impl ScanoutShared {
    /// Allocates the framebuffer and tracking state and installs the 8 bpp mode.
    ///
    /// On failure nothing is started; the caller can keep emulating without display output.
    pub fn new(config: ScanoutConfig) -> Result<Self> {
        config.validate()?;

        let framebuffer = SourceFramebuffer::try_new(FRAMEBUFFER_LEN, config.framebuffer_fill)
            .map_err(|_| ScanoutError::Allocation {
                what: "source framebuffer",
                bytes: FRAMEBUFFER_LEN,
            })?;

        let grid = config.grid();
        let tracker = DirtyTracker::new(grid, FRAMEBUFFER_LEN, config.cross_row_marking());
        tracker.set_enabled(config.write_tracking);

        let layout = ModeLayout::for_width(ColorDepth::Bpp8, SOURCE_WIDTH);
        let palette = PaletteStore::new();
        install_default_palette(&palette, layout.depth);

        let (wake_tx, wake_rx) = mpsc::sync_channel(1);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                grid,
                framebuffer,
                tracker,
                mode: SharedMode::new(layout),
                palette,
                force_full: AtomicBool::new(true),
                stats: RenderStats::new(),
                wake_tx,
                wake_rx: Mutex::new(Some(wake_rx)),
            }),
        })
    }

    pub fn config(&self) -> &ScanoutConfig {
        &self.inner.config
    }

    pub fn grid(&self) -> TileGrid {
        self.inner.grid
    }

    pub fn framebuffer(&self) -> &SourceFramebuffer {
        &self.inner.framebuffer
    }

    pub fn tracker(&self) -> &DirtyTracker {
        &self.inner.tracker
    }

    pub fn palette(&self) -> &PaletteStore {
        &self.inner.palette
    }

    pub fn stats(&self) -> &RenderStats {
        &self.inner.stats
    }

    /// Current depth and row stride.
    pub fn mode(&self) -> ModeLayout {
        self.inner.mode.load()
    }

    /// Whether the next render cycle is forced to redraw the whole frame.
    pub fn force_full_pending(&self) -> bool {
        self.inner.force_full.load(Ordering::Acquire)
    }

    pub fn request_full_update(&self) {
        self.inner.force_full.store(true, Ordering::Release);
    }

    /// Consumes the force-full request. Render task only.
    pub(crate) fn take_force_full(&self) -> bool {
        self.inner.force_full.swap(false, Ordering::AcqRel)
    }

    /// Claims the consumer end of the wake channel. `None` while a render task holds it.
    pub(crate) fn take_wake_receiver(&self) -> Option<Receiver<()>> {
        self.wake_slot().take()
    }

    /// Hands the consumer end back once its render task is gone, so another can be spawned.
    pub(crate) fn return_wake_receiver(&self, rx: Receiver<()>) {
        // Wakes sent to the finished task must not look pending to the next one.
        while rx.try_recv().is_ok() {}
        *self.wake_slot() = Some(rx);
    }

    fn wake_slot(&self) -> MutexGuard<'_, Option<Receiver<()>>> {
        // The slot is a plain hand-off; a panic while holding it leaves nothing half-written.
        self.inner
            .wake_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wake_sender(&self) -> SyncSender<()> {
        self.inner.wake_tx.clone()
    }

    pub fn mark_offset(&self, offset: usize) {
        self.inner.tracker.mark_offset(self.mode(), offset);
    }

    pub fn mark_range(&self, offset: usize, len: usize) {
        self.inner.tracker.mark_range(self.mode(), offset, len);
    }

    pub fn write_u8(&self, offset: usize, value: u8) {
        self.inner.framebuffer.store(offset, value);
        self.mark_offset(offset);
    }

    pub fn write_u16_be(&self, offset: usize, value: u16) {
        self.write_bytes(offset, &value.to_be_bytes());
    }

    pub fn write_u32_be(&self, offset: usize, value: u32) {
        self.write_bytes(offset, &value.to_be_bytes());
    }

    /// Stores `bytes` at `offset` and marks them dirty. Bytes past the framebuffer are dropped.
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) {
        let written = self.inner.framebuffer.write_from(offset, bytes);
        self.mark_range(offset, written);
    }

    /// Wakes the render task. A wake already pending absorbs this one.
    pub fn signal_frame_ready(&self) {
        match self.inner.wake_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                trace!("frame ready signalled with no render task attached");
            }
        }
    }

    /// Enables or disables write-time tracking. Either way the next frame is a full redraw,
    /// since marks made while disabled were dropped.
    pub fn set_write_tracking(&self, enabled: bool) {
        self.inner.tracker.set_enabled(enabled);
        self.request_full_update();
        debug!(enabled, "write-time dirty tracking toggled");
    }

    /// Replaces the leading palette entries with `colors` (at most 256) and forces a full
    /// redraw.
    pub fn set_palette(&self, colors: &[Rgb]) {
        self.store_palette(colors.iter().copied());
    }

    /// Palette update in the packed `r, g, b` byte form written by the emulated OS. At most
    /// `count` complete triples are used.
    pub fn set_palette_bytes(&self, bytes: &[u8], count: usize) {
        self.store_palette(
            bytes
                .chunks_exact(3)
                .take(count)
                .map(|c| Rgb::new(c[0], c[1], c[2])),
        );
    }

    /// Converts on the stack; the producer's palette path never allocates.
    fn store_palette(&self, colors: impl Iterator<Item = Rgb>) {
        let mut native: NativePalette = [0; PALETTE_LEN];
        let mut len = 0;
        for (slot, color) in native.iter_mut().zip(colors) {
            *slot = color.to_native();
            len += 1;
        }
        self.inner.palette.store_entries(&native[..len]);
        self.request_full_update();
        debug!(entries = len, "palette updated");
    }

    /// Gamma tables are accepted for compatibility but have no effect beyond the palette.
    pub fn set_gamma(&self, entries: &[u8], count: usize) {
        trace!(count, len = entries.len(), "gamma table ignored");
    }

    /// Installs a new mode: depth and stride, the depth's default palette, and a forced full
    /// redraw.
    ///
    /// A resolution other than the panel's is accepted with a warning; rendering continues at the
    /// panel geometry.
    pub fn switch_mode(&self, mode: VideoMode) {
        if mode.width as usize != SOURCE_WIDTH || mode.height as usize != SOURCE_HEIGHT {
            warn!(
                width = mode.width,
                height = mode.height,
                panel_width = SOURCE_WIDTH,
                panel_height = SOURCE_HEIGHT,
                "video mode does not match panel geometry"
            );
        }

        let mut layout = mode.layout();
        let min_stride = mode.depth.bytes_per_row(SOURCE_WIDTH);
        if layout.bytes_per_row == 0 {
            warn!(depth = mode.depth.bits(), "zero row stride, using packed stride");
            layout.bytes_per_row = min_stride;
        }
        if layout.bytes_per_row < min_stride {
            warn!(
                bytes_per_row = layout.bytes_per_row,
                min_stride, "row stride narrower than the panel width"
            );
        }

        self.inner.mode.store(layout);
        install_default_palette(&self.inner.palette, mode.depth);
        self.request_full_update();
        debug!(
            depth = mode.depth.bits(),
            bytes_per_row = layout.bytes_per_row,
            "video mode switched"
        );
    }
}
