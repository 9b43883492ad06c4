use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cumulative render counters.
///
/// Updated by the render task and readable from any thread.
#[derive(Debug, Default)]
pub struct RenderStats {
    cycles: AtomicU64,
    full_renders: AtomicU64,
    partial_renders: AtomicU64,
    skipped: AtomicU64,
    rate_limited: AtomicU64,
    tiles_rendered: AtomicU64,
    push_failures: AtomicU64,
    wakes: AtomicU64,

    snapshot_us: AtomicU64,
    detect_us: AtomicU64,
    render_us: AtomicU64,
    push_us: AtomicU64,
}

impl RenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_cycles(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_full_renders(&self) {
        self.full_renders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_partial_renders(&self) {
        self.partial_renders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tiles_rendered(&self, n: u64) {
        self.tiles_rendered.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_push_failures(&self) {
        self.push_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_wakes(&self) {
        self.wakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_snapshot_time(&self, d: Duration) {
        self.snapshot_us.fetch_add(micros(d), Ordering::Relaxed);
    }

    pub fn add_detect_time(&self, d: Duration) {
        self.detect_us.fetch_add(micros(d), Ordering::Relaxed);
    }

    pub fn add_render_time(&self, d: Duration) {
        self.render_us.fetch_add(micros(d), Ordering::Relaxed);
    }

    pub fn add_push_time(&self, d: Duration) {
        self.push_us.fetch_add(micros(d), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RenderStatsSnapshot {
        RenderStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            full_renders: self.full_renders.load(Ordering::Relaxed),
            partial_renders: self.partial_renders.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            tiles_rendered: self.tiles_rendered.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            wakes: self.wakes.load(Ordering::Relaxed),
            snapshot_us: self.snapshot_us.load(Ordering::Relaxed),
            detect_us: self.detect_us.load(Ordering::Relaxed),
            render_us: self.render_us.load(Ordering::Relaxed),
            push_us: self.push_us.load(Ordering::Relaxed),
        }
    }

    /// Returns a JSON object as a string.
    pub fn to_json(&self) -> String {
        self.snapshot().to_json()
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStatsSnapshot {
    pub cycles: u64,
    pub full_renders: u64,
    pub partial_renders: u64,
    pub skipped: u64,
    pub rate_limited: u64,
    pub tiles_rendered: u64,
    pub push_failures: u64,
    pub wakes: u64,

    pub snapshot_us: u64,
    pub detect_us: u64,
    pub render_us: u64,
    pub push_us: u64,
}

impl RenderStatsSnapshot {
    /// Counter deltas since `earlier`.
    pub fn since(self, earlier: RenderStatsSnapshot) -> RenderStatsSnapshot {
        RenderStatsSnapshot {
            cycles: self.cycles.saturating_sub(earlier.cycles),
            full_renders: self.full_renders.saturating_sub(earlier.full_renders),
            partial_renders: self.partial_renders.saturating_sub(earlier.partial_renders),
            skipped: self.skipped.saturating_sub(earlier.skipped),
            rate_limited: self.rate_limited.saturating_sub(earlier.rate_limited),
            tiles_rendered: self.tiles_rendered.saturating_sub(earlier.tiles_rendered),
            push_failures: self.push_failures.saturating_sub(earlier.push_failures),
            wakes: self.wakes.saturating_sub(earlier.wakes),
            snapshot_us: self.snapshot_us.saturating_sub(earlier.snapshot_us),
            detect_us: self.detect_us.saturating_sub(earlier.detect_us),
            render_us: self.render_us.saturating_sub(earlier.render_us),
            push_us: self.push_us.saturating_sub(earlier.push_us),
        }
    }

    /// Cycles that actually drew something.
    pub fn frames(self) -> u64 {
        self.full_renders + self.partial_renders
    }

    pub fn to_json(self) -> String {
        // Hand-built to keep the render thread free of serializer allocations.
        format!(
            "{{\"cycles\":{},\"full_renders\":{},\"partial_renders\":{},\"skipped\":{},\"rate_limited\":{},\"tiles_rendered\":{},\"push_failures\":{},\"wakes\":{},\"timing_us\":{{\"snapshot\":{},\"detect\":{},\"render\":{},\"push\":{}}}}}",
            self.cycles,
            self.full_renders,
            self.partial_renders,
            self.skipped,
            self.rate_limited,
            self.tiles_rendered,
            self.push_failures,
            self.wakes,
            self.snapshot_us,
            self.detect_us,
            self.render_us,
            self.push_us,
        )
    }
}
