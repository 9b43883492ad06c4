
use std::time::{Duration, Instant};

use crate::{
    DisplayDriver, DisplayError, MemoryPanel, RenderScheduler, ScanoutConfig, ScanoutShared,
};
use scanout_shared::{Rect, PANEL_HEIGHT, PANEL_WIDTH};

/// Panel that fails a configurable number of pushes before behaving like a [`MemoryPanel`].
pub(crate) struct FlakyPanel {
    pub(crate) inner: MemoryPanel,
    pub(crate) failures_left: usize,
    pub(crate) batches_open: i32,
}

impl FlakyPanel {
    pub(crate) fn new(failures: usize) -> Self {
        Self {
            inner: MemoryPanel::new(PANEL_WIDTH as u32, PANEL_HEIGHT as u32),
            failures_left: failures,
            batches_open: 0,
        }
    }
}

impl DisplayDriver for FlakyPanel {
    fn panel_size(&self) -> (u32, u32) {
        self.inner.panel_size()
    }

    fn push(&mut self, rect: Rect, pixels: &[u16]) -> Result<(), DisplayError> {
        assert_eq!(self.batches_open, 1, "push outside a batch");
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(DisplayError::Transfer("injected failure".into()));
        }
        self.inner.push(rect, pixels)
    }

    fn begin_batch(&mut self) {
        self.batches_open += 1;
    }

    fn end_batch(&mut self) {
        self.batches_open -= 1;
    }
}

pub(crate) fn panel() -> MemoryPanel {
    MemoryPanel::new(PANEL_WIDTH as u32, PANEL_HEIGHT as u32)
}

pub(crate) fn scheduler_with<D: DisplayDriver>(
    config: ScanoutConfig,
    driver: D,
) -> (ScanoutShared, RenderScheduler<D>) {
    let shared = ScanoutShared::new(config).unwrap();
    let scheduler = RenderScheduler::new(shared.clone(), driver).unwrap();
    (shared, scheduler)
}

/// Monotonic test clock that steps past the minimum frame interval on every tick.
pub(crate) struct Clock {
    now: Instant,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Self {
            now: Instant::now(),
        }
    }

    pub(crate) fn tick(&mut self) -> Instant {
        self.now += Duration::from_millis(100);
        self.now
    }

    pub(crate) fn advance(&mut self, d: Duration) -> Instant {
        self.now += d;
        self.now
    }
}

/// Deterministic PRNG for randomized tests.
#[derive(Clone)]
pub(crate) struct Rng(u64);

impl Rng {
    pub(crate) const fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    pub(crate) fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}
