#![forbid(unsafe_code)]

// Native-only tool; the wasm32 stub keeps `--workspace` builds for wasm targets compiling.
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::thread;
    use std::time::{Duration, Instant};

    use anyhow::{anyhow, bail, Context, Result};
    use clap::Parser;
    use scanout_video::scanout_shared::{
        ColorDepth, Rgb, VideoMode, PALETTE_LEN, PANEL_HEIGHT, PANEL_WIDTH, SOURCE_HEIGHT,
        SOURCE_WIDTH,
    };
    use scanout_video::{MemoryPanel, RenderTask, ScanoutConfig, ScanoutShared};
    use tracing::info;

    /// Producer frame period (about 60 Hz).
    const PRODUCER_FRAME: Duration = Duration::from_millis(16);

    #[derive(Debug, Parser)]
    #[command(about = "Drives the scanout pipeline with a synthetic producer into a memory panel")]
    pub struct Args {
        /// How long the producer runs, in milliseconds.
        #[arg(long, default_value_t = 2_000)]
        duration_ms: u64,

        /// Color depth in bits per pixel (1, 2, 4 or 8).
        #[arg(long, default_value_t = 8)]
        depth: u32,

        /// Disable write-time dirty tracking and diff whole frames instead.
        #[arg(long)]
        no_write_tracking: bool,

        /// Mark multi-row stores exactly instead of across the full width.
        #[arg(long)]
        exact_marking: bool,

        /// JSON file with `ScanoutConfig` overrides.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Recolor the whole palette every N milliseconds (0 disables).
        #[arg(long, default_value_t = 1_000)]
        palette_every_ms: u64,

        /// Step to the next color depth every N milliseconds (0 disables).
        #[arg(long, default_value_t = 0)]
        mode_every_ms: u64,

        /// Write the final panel contents to a PNG file.
        #[arg(long)]
        png: Option<PathBuf>,
    }

    pub fn main() -> Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();

        let args = Args::parse();
        let depth = ColorDepth::from_bits(args.depth)
            .ok_or_else(|| anyhow!("unsupported color depth: {} bpp", args.depth))?;

        let mut config = match &args.config {
            Some(path) => load_config(path)?,
            None => ScanoutConfig::default(),
        };
        if args.no_write_tracking {
            config.write_tracking = false;
        }
        if args.exact_marking {
            config.exact_cross_row_marking = true;
        }

        let shared = ScanoutShared::new(config).context("failed to set up scanout state")?;
        shared.switch_mode(VideoMode::packed(
            SOURCE_WIDTH as u32,
            SOURCE_HEIGHT as u32,
            depth,
        ));

        let panel = MemoryPanel::new(PANEL_WIDTH as u32, PANEL_HEIGHT as u32);
        let task =
            RenderTask::spawn(shared.clone(), panel).context("failed to start render task")?;

        let producer = Producer::new(shared.clone(), depth);
        let frames = producer.run(
            Duration::from_millis(args.duration_ms),
            Duration::from_millis(args.palette_every_ms),
            Duration::from_millis(args.mode_every_ms),
        );
        info!(frames, "producer finished");

        // One last wake so the final producer frame is on the panel before stopping.
        thread::sleep(shared.config().min_frame_interval());
        shared.signal_frame_ready();
        thread::sleep(shared.config().wake_timeout());

        let Some(panel) = task.stop() else {
            bail!("render task did not stop within the grace period");
        };

        let stats: serde_json::Value = serde_json::from_str(&shared.stats().to_json())
            .context("render stats are not valid JSON")?;
        println!("{}", serde_json::to_string_pretty(&stats)?);

        if let Some(path) = &args.png {
            write_png(&panel, path)?;
            info!(path = %path.display(), "panel written");
        }
        Ok(())
    }

    fn load_config(path: &Path) -> Result<ScanoutConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    fn write_png(panel: &MemoryPanel, path: &Path) -> Result<()> {
        let (w, h) = (PANEL_WIDTH as u32, PANEL_HEIGHT as u32);
        let img = image::RgbImage::from_raw(w, h, panel.to_rgb8())
            .ok_or_else(|| anyhow!("invalid image data"))?;
        img.save(path)
            .with_context(|| format!("failed to write PNG: {}", path.display()))?;
        Ok(())
    }

    /// Synthetic producer: a bouncing block over scrolling stripes, with periodic palette
    /// rotation and depth changes. Works in framebuffer bytes so every depth gets the same
    /// traffic shape.
    struct Producer {
        shared: ScanoutShared,
        depth: ColorDepth,
        bytes_per_row: usize,
        block_x: usize,
        block_y: usize,
        dx: isize,
        dy: isize,
        stripe_row: usize,
        tick: u8,
    }

    const BLOCK_ROWS: usize = 48;

    impl Producer {
        fn new(shared: ScanoutShared, depth: ColorDepth) -> Self {
            Self {
                shared,
                depth,
                bytes_per_row: depth.bytes_per_row(SOURCE_WIDTH),
                block_x: 0,
                block_y: 0,
                dx: 1,
                dy: 3,
                stripe_row: 0,
                tick: 0,
            }
        }

        fn block_bytes(&self) -> usize {
            (self.bytes_per_row / 10).max(1)
        }

        fn run(
            mut self,
            duration: Duration,
            palette_every: Duration,
            mode_every: Duration,
        ) -> u64 {
            let start = Instant::now();
            let mut last_palette = start;
            let mut last_mode = start;
            let mut frames = 0u64;

            while start.elapsed() < duration {
                if !mode_every.is_zero() && last_mode.elapsed() >= mode_every {
                    self.next_depth();
                    last_mode = Instant::now();
                }
                self.step();
                if !palette_every.is_zero() && last_palette.elapsed() >= palette_every {
                    self.rotate_palette(frames);
                    last_palette = Instant::now();
                }
                self.shared.signal_frame_ready();
                frames += 1;
                thread::sleep(PRODUCER_FRAME);
            }
            frames
        }

        fn next_depth(&mut self) {
            let all = ColorDepth::ALL;
            let current = all.iter().position(|&d| d == self.depth).unwrap_or(0);
            self.depth = all[(current + 1) % all.len()];
            self.bytes_per_row = self.depth.bytes_per_row(SOURCE_WIDTH);
            self.block_x = self.block_x.min(self.bytes_per_row - self.block_bytes());

            self.shared.framebuffer().fill(0);
            self.shared.switch_mode(VideoMode::packed(
                SOURCE_WIDTH as u32,
                SOURCE_HEIGHT as u32,
                self.depth,
            ));
            info!(depth = self.depth.bits(), "producer switched depth");
        }

        fn step(&mut self) {
            self.tick = self.tick.wrapping_add(1);

            // Erase the block, move it, redraw it.
            self.fill_block(0);
            let max_x = self.bytes_per_row - self.block_bytes();
            let max_y = SOURCE_HEIGHT - BLOCK_ROWS;
            self.block_x = bounce(self.block_x, &mut self.dx, max_x);
            self.block_y = bounce(self.block_y, &mut self.dy, max_y);
            self.fill_block(0xFF);

            // One scrolling stripe row across the full width.
            let row = vec![self.tick; self.bytes_per_row];
            self.shared
                .write_bytes(self.stripe_row * self.bytes_per_row, &row);
            self.stripe_row = (self.stripe_row + 1) % SOURCE_HEIGHT;
        }

        fn fill_block(&self, value: u8) {
            let run = vec![value; self.block_bytes()];
            for y in self.block_y..self.block_y + BLOCK_ROWS {
                self.shared
                    .write_bytes(y * self.bytes_per_row + self.block_x, &run);
            }
        }

        fn rotate_palette(&self, phase: u64) {
            let len = self.depth.palette_len().min(PALETTE_LEN);
            let colors: Vec<Rgb> = (0..len)
                .map(|i| {
                    let h = (i as u64 * 37 + phase * 11) as u8;
                    Rgb::new(h, h.wrapping_mul(3), h.wrapping_add(128))
                })
                .collect();
            self.shared.set_palette(&colors);
        }
    }

    fn bounce(pos: usize, velocity: &mut isize, max: usize) -> usize {
        let next = pos as isize + *velocity;
        if next < 0 || next > max as isize {
            *velocity = -*velocity;
            (pos as isize + *velocity).clamp(0, max as isize) as usize
        } else {
            next as usize
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    native::main()
}
