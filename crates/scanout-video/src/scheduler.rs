//! Render scheduler and the render task that drives it.
//!
//! Each cycle decides between a full redraw, a per-tile partial redraw and doing nothing:
//!
//! - a pending force-full request (mode switch, palette change, failed full push) always wins;
//! - otherwise the dirty tiles are drained from the write-time tracker, or found by diffing whole
//!   frames while tracking is disabled;
//! - more than `full_update_percent` of the tiles dirty is redrawn as one full frame, since one
//!   bulk transfer beats that many windowed ones.
//!
//! [`RenderScheduler::run_cycle`] is one cycle and can be driven directly; [`RenderTask`] runs it
//! on a dedicated thread, woken by [`ScanoutShared::signal_frame_ready`] or a timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use scanout_shared::{
    compare_frames, DirtyTileSet, ModeLayout, NativePalette, TileGrid, PALETTE_LEN, PIXEL_SCALE,
};
use tracing::{debug, info, trace, warn};

use crate::control::ScanoutShared;
use crate::display::DisplayDriver;
use crate::error::{try_alloc, Result, ScanoutError};
use crate::frame::FrameRenderer;
use crate::stats::RenderStatsSnapshot;
use crate::tile::{snapshot_tile, TileScratch};

/// Where the scheduler is within a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Waiting,
    Deciding,
    RenderingFull,
    RenderingPartial,
    Skipping,
}

/// Result of one [`RenderScheduler::run_cycle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Too soon after the previous render; nothing was read or drained.
    RateLimited,
    Full,
    Partial { tiles: usize },
    Skipped,
}

impl CycleOutcome {
    /// State the scheduler ended the cycle in.
    pub fn state(self) -> SchedulerState {
        match self {
            CycleOutcome::RateLimited => SchedulerState::Waiting,
            CycleOutcome::Full => SchedulerState::RenderingFull,
            CycleOutcome::Partial { .. } => SchedulerState::RenderingPartial,
            CycleOutcome::Skipped => SchedulerState::Skipping,
        }
    }
}

pub struct RenderScheduler<D> {
    shared: ScanoutShared,
    driver: D,
    grid: TileGrid,
    threshold: usize,
    min_frame_interval: Duration,
    report_interval: Duration,
    state: SchedulerState,

    palette: NativePalette,
    dirty: DirtyTileSet,
    /// Tiles whose push failed, merged into the next cycle.
    retry: DirtyTileSet,
    scratch: TileScratch,
    frame: FrameRenderer,
    snapshot_frame: Vec<u8>,
    compare_frame: Vec<u8>,

    last_render: Option<Instant>,
    report_started: Option<Instant>,
    report_baseline: RenderStatsSnapshot,
}

impl<D: DisplayDriver> RenderScheduler<D> {
    /// Allocates every buffer the render path needs up front.
    pub fn new(shared: ScanoutShared, driver: D) -> Result<Self> {
        let config = shared.config();
        let grid = shared.grid();

        let frame = grid.panel_frame(PIXEL_SCALE);
        let panel = driver.panel_size();
        if panel != (frame.width, frame.height) {
            warn!(
                panel_width = panel.0,
                panel_height = panel.1,
                frame_width = frame.width,
                frame_height = frame.height,
                "display panel size differs from the rendered frame"
            );
        }

        let fb_len = shared.framebuffer().len();
        let mut compare_frame = try_alloc(fb_len, 0u8, "compare frame")?;
        shared.framebuffer().copy_to(&mut compare_frame);

        Ok(Self {
            grid,
            threshold: config.full_update_threshold(),
            min_frame_interval: config.min_frame_interval(),
            report_interval: config.perf_report_interval(),
            state: SchedulerState::Waiting,
            palette: [0; PALETTE_LEN],
            dirty: DirtyTileSet::new(grid),
            retry: DirtyTileSet::new(grid),
            scratch: TileScratch::new(grid)?,
            frame: FrameRenderer::new(grid)?,
            snapshot_frame: try_alloc(fb_len, 0u8, "snapshot frame")?,
            compare_frame,
            last_render: None,
            report_started: None,
            report_baseline: shared.stats().snapshot(),
            shared,
            driver,
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Fills the whole panel with the configured background color.
    pub fn present_background(&mut self) {
        let color = self.shared.config().background().to_native();
        self.frame.clear(color);
        self.driver.begin_batch();
        let result = self.driver.push(self.frame.panel_rect(), self.frame.pixels());
        self.driver.end_batch();
        if let Err(err) = result {
            warn!(%err, "initial panel fill failed");
            self.shared.stats().inc_push_failures();
        }
        // The panel no longer shows the framebuffer; a respawned task must redraw it all.
        self.shared.request_full_update();
    }

    /// Runs one decide-and-render cycle as of `now`.
    pub fn run_cycle(&mut self, now: Instant) -> CycleOutcome {
        if let Some(last) = self.last_render {
            if now.saturating_duration_since(last) < self.min_frame_interval {
                self.shared.stats().inc_rate_limited();
                return CycleOutcome::RateLimited;
            }
        }

        self.state = SchedulerState::Deciding;
        self.shared.stats().inc_cycles();

        // The force flag is taken before the palette and mode are read, so a switch landing
        // after this point re-arms it for the next cycle instead of being lost.
        let force = self.shared.take_force_full();
        self.shared.palette().copy_into(&mut self.palette);
        let layout = self.shared.mode();
        let tracking = self.shared.tracker().is_enabled();

        let outcome = if force {
            self.discard_pending(tracking);
            self.render_full(layout, now)
        } else {
            let count = self.detect_dirty(layout, tracking);
            if count > self.threshold {
                debug!(count, threshold = self.threshold, "dirty tiles above threshold");
                self.render_full(layout, now)
            } else if count > 0 {
                self.render_partial(layout, now)
            } else {
                self.state = SchedulerState::Skipping;
                self.shared.stats().inc_skipped();
                CycleOutcome::Skipped
            }
        };

        trace!(?outcome, force, "render cycle");
        self.report(now);
        self.state = SchedulerState::Waiting;
        outcome
    }

    /// Fills `self.dirty` for this cycle and returns the number of dirty tiles.
    fn detect_dirty(&mut self, layout: ModeLayout, tracking: bool) -> usize {
        let mut start = Instant::now();

        let mut count = if tracking {
            self.shared.tracker().take_and_clear(&mut self.dirty)
        } else {
            self.shared.framebuffer().copy_to(&mut self.snapshot_frame);
            let copied = Instant::now();
            self.shared.stats().add_snapshot_time(copied - start);
            start = copied;

            let count = compare_frames(
                self.grid,
                layout,
                &self.snapshot_frame,
                &self.compare_frame,
                &mut self.dirty,
            );
            std::mem::swap(&mut self.snapshot_frame, &mut self.compare_frame);
            count
        };

        if !self.retry.is_empty() {
            self.dirty.merge(&self.retry);
            self.retry.clear();
            count = self.dirty.count();
        }

        self.shared.stats().add_detect_time(start.elapsed());
        count
    }

    /// Drops pending dirty state that a full render is about to cover.
    fn discard_pending(&mut self, tracking: bool) {
        if tracking {
            self.shared.tracker().take_and_clear(&mut self.dirty);
        } else {
            self.shared.framebuffer().copy_to(&mut self.compare_frame);
        }
        self.retry.clear();
    }

    fn render_full(&mut self, layout: ModeLayout, now: Instant) -> CycleOutcome {
        self.state = SchedulerState::RenderingFull;
        let stats = self.shared.stats();

        let start = Instant::now();
        self.frame.render(self.shared.framebuffer(), layout, &self.palette);
        stats.add_render_time(start.elapsed());

        let start = Instant::now();
        self.driver.begin_batch();
        let result = self.driver.push(self.frame.panel_rect(), self.frame.pixels());
        self.driver.end_batch();
        stats.add_push_time(start.elapsed());

        stats.inc_full_renders();
        if let Err(err) = result {
            warn!(%err, "full frame push failed, retrying next cycle");
            stats.inc_push_failures();
            self.shared.request_full_update();
        }

        self.last_render = Some(now);
        CycleOutcome::Full
    }

    fn render_partial(&mut self, layout: ModeLayout, now: Instant) -> CycleOutcome {
        self.state = SchedulerState::RenderingPartial;
        let stats = self.shared.stats();
        let fb = self.shared.framebuffer();
        let grid = self.grid;

        let mut snapshot_time = Duration::ZERO;
        let mut render_time = Duration::ZERO;
        let mut push_time = Duration::ZERO;
        let mut pushed = 0usize;

        self.driver.begin_batch();
        for index in self.dirty.iter() {
            let (tx, ty) = grid.coords(index);

            let t0 = Instant::now();
            snapshot_tile(fb, layout, grid, tx, ty, &mut self.scratch);
            let t1 = Instant::now();
            let pixels = self.scratch.render(&self.palette);
            let t2 = Instant::now();
            let result = self.driver.push(grid.panel_rect(index, PIXEL_SCALE), pixels);
            let t3 = Instant::now();

            snapshot_time += t1 - t0;
            render_time += t2 - t1;
            push_time += t3 - t2;

            match result {
                Ok(()) => pushed += 1,
                Err(err) => {
                    warn!(tile = index, %err, "tile push failed, retrying next cycle");
                    stats.inc_push_failures();
                    self.retry.set(index);
                }
            }
        }
        self.driver.end_batch();

        stats.add_snapshot_time(snapshot_time);
        stats.add_render_time(render_time);
        stats.add_push_time(push_time);
        stats.add_tiles_rendered(pushed as u64);
        stats.inc_partial_renders();

        self.last_render = Some(now);
        CycleOutcome::Partial { tiles: pushed }
    }

    fn report(&mut self, now: Instant) {
        let started = *self.report_started.get_or_insert(now);
        if now.saturating_duration_since(started) < self.report_interval {
            return;
        }

        let current = self.shared.stats().snapshot();
        let d = current.since(self.report_baseline);
        let frames = d.frames().max(1);
        let cycles = d.cycles.max(1);
        info!(
            target: "scanout::perf",
            frames = d.frames(),
            full = d.full_renders,
            partial = d.partial_renders,
            skipped = d.skipped,
            rate_limited = d.rate_limited,
            tiles = d.tiles_rendered,
            push_failures = d.push_failures,
            avg_detect_us = d.detect_us / cycles,
            avg_snapshot_us = d.snapshot_us / frames,
            avg_render_us = d.render_us / frames,
            avg_push_us = d.push_us / frames,
            "render summary"
        );

        self.report_started = Some(now);
        self.report_baseline = current;
    }
}

/// Spawns the render loop on its own thread.
pub struct RenderTask;

impl RenderTask {
    /// Starts rendering `shared` to `driver`.
    ///
    /// Fails if a task is already attached to `shared`, if the render buffers cannot be allocated
    /// or if the thread cannot be spawned. In every case no task is left running.
    pub fn spawn<D>(shared: ScanoutShared, driver: D) -> Result<RenderTaskHandle<D>>
    where
        D: DisplayDriver + Send + 'static,
    {
        let scheduler = RenderScheduler::new(shared.clone(), driver)?;
        let wake = WakeLease::claim(&shared).ok_or(ScanoutError::AlreadyRunning)?;

        let config = shared.config();
        let startup_delay = config.startup_delay();
        let wake_timeout = config.wake_timeout();
        let grace = config.stop_grace();

        let running = Arc::new(AtomicBool::new(true));
        let (exit_tx, exit_rx) = mpsc::sync_channel(1);

        let thread = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn({
                let running = running.clone();
                move || {
                    let driver =
                        render_loop(scheduler, &wake, &running, startup_delay, wake_timeout);
                    // Released before the exit notice so a stopped task can be respawned at once.
                    drop(wake);
                    let _ = exit_tx.send(());
                    driver
                }
            })
            // A closure that never ran is dropped here, lease included.
            .map_err(ScanoutError::TaskSpawn)?;

        info!(thread = %config.thread_name, "render task spawned");

        Ok(RenderTaskHandle {
            running,
            wake: shared.wake_sender(),
            exited: exit_rx,
            thread: Some(thread),
            grace,
        })
    }
}

/// The render task's claim on the wake channel's consumer end.
///
/// Dropping it hands the receiver back to [`ScanoutShared`], whether the task stopped, panicked
/// or never started.
pub(crate) struct WakeLease {
    shared: ScanoutShared,
    rx: Option<Receiver<()>>,
}

impl WakeLease {
    /// `None` while another task holds the receiver.
    pub(crate) fn claim(shared: &ScanoutShared) -> Option<Self> {
        let rx = shared.take_wake_receiver()?;
        Some(Self {
            shared: shared.clone(),
            rx: Some(rx),
        })
    }

    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<(), RecvTimeoutError> {
        match &self.rx {
            Some(rx) => rx.recv_timeout(timeout),
            None => Err(RecvTimeoutError::Disconnected),
        }
    }
}

impl Drop for WakeLease {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            self.shared.return_wake_receiver(rx);
        }
    }
}

fn render_loop<D: DisplayDriver>(
    mut scheduler: RenderScheduler<D>,
    wake: &WakeLease,
    running: &AtomicBool,
    startup_delay: Duration,
    wake_timeout: Duration,
) -> D {
    // Any wake (including a stop request) ends the startup delay early.
    let _ = wake.recv_timeout(startup_delay);
    if running.load(Ordering::Acquire) {
        scheduler.present_background();
    }

    while running.load(Ordering::Acquire) {
        match wake.recv_timeout(wake_timeout) {
            Ok(()) => scheduler.shared.stats().inc_wakes(),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if !running.load(Ordering::Acquire) {
            break;
        }
        scheduler.run_cycle(Instant::now());
    }

    info!("render task exiting");
    scheduler.into_driver()
}

/// Owner of a running [`RenderTask`].
///
/// Dropping the handle asks the task to stop without waiting for it.
pub struct RenderTaskHandle<D> {
    running: Arc<AtomicBool>,
    wake: SyncSender<()>,
    exited: Receiver<()>,
    thread: Option<JoinHandle<D>>,
    grace: Duration,
}

impl<D> RenderTaskHandle<D> {
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.wake.try_send(());
    }

    /// Stops the task, waiting up to the configured grace period.
    ///
    /// Returns the display driver if the task exited in time. A task that overruns the grace
    /// period is detached and finishes its current cycle on its own.
    pub fn stop(mut self) -> Option<D> {
        self.request_stop();
        let thread = self.thread.take()?;

        match self.exited.recv_timeout(self.grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match thread.join() {
                Ok(driver) => Some(driver),
                Err(_) => {
                    warn!("render task panicked");
                    None
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "render task did not stop within grace period, detaching"
                );
                None
            }
        }
    }
}

impl<D> Drop for RenderTaskHandle<D> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.request_stop();
        }
    }
}
