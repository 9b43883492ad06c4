use std::time::{Duration, Instant};

use scanout_video::scanout_shared::{Rgb, PANEL_HEIGHT, PANEL_WIDTH};
use scanout_video::{MemoryPanel, RenderTask, ScanoutConfig, ScanoutError, ScanoutShared};

fn fast_config() -> ScanoutConfig {
    ScanoutConfig {
        min_frame_interval_ms: 5,
        wake_timeout_ms: 10,
        startup_delay_ms: 5,
        stop_grace_ms: 2_000,
        thread_name: "scanout-render-test".to_string(),
        ..ScanoutConfig::default()
    }
}

fn panel() -> MemoryPanel {
    MemoryPanel::new(PANEL_WIDTH as u32, PANEL_HEIGHT as u32)
}

fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn render_task_draws_signalled_writes() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let shared = ScanoutShared::new(fast_config()).unwrap();
    let handle = RenderTask::spawn(shared.clone(), panel()).unwrap();
    assert!(handle.is_running());

    wait_for("first full frame", || {
        shared.stats().snapshot().full_renders >= 1
    });

    // Index 0xBA in the default 8 bpp palette is cube entry (5, 1, 0).
    shared.write_bytes(640 * 200 + 300, &[0xBA; 16]);
    shared.signal_frame_ready();
    wait_for("partial render", || {
        shared.stats().snapshot().tiles_rendered >= 1
    });

    let panel = handle.stop().expect("render task exits within the grace period");
    let red = Rgb::new(255, 51, 0).to_native();
    assert_eq!(panel.pixel(600, 400), Some(red));
    assert_eq!(panel.pixel(631, 401), Some(red));
    assert_ne!(panel.pixel(632, 400), Some(red));
    // Background push plus at least one frame, each bracketed by a batch.
    assert!(panel.batch_count() >= 2);
}

#[test]
fn second_task_on_the_same_state_is_rejected() {
    let shared = ScanoutShared::new(fast_config()).unwrap();
    let handle = RenderTask::spawn(shared.clone(), panel()).unwrap();

    let second = RenderTask::spawn(shared.clone(), panel());
    assert!(matches!(second, Err(ScanoutError::AlreadyRunning)));

    assert!(handle.stop().is_some());
}

#[test]
fn stopped_task_can_be_respawned_on_the_same_state() {
    let shared = ScanoutShared::new(fast_config()).unwrap();
    let first = RenderTask::spawn(shared.clone(), panel()).unwrap();
    wait_for("first task's full frame", || {
        shared.stats().snapshot().full_renders >= 1
    });
    assert!(first.stop().is_some());

    let second = RenderTask::spawn(shared.clone(), panel()).expect("respawn after stop");
    wait_for("second task's full frame", || {
        shared.stats().snapshot().full_renders >= 2
    });

    // Index 0xBA in the default 8 bpp palette is cube entry (5, 1, 0).
    shared.write_bytes(640 * 200 + 300, &[0xBA; 16]);
    shared.signal_frame_ready();
    wait_for("partial render", || {
        shared.stats().snapshot().tiles_rendered >= 1
    });

    let drawn = second.stop().expect("render task exits within the grace period");
    assert_eq!(drawn.pixel(600, 400), Some(Rgb::new(255, 51, 0).to_native()));

    // A handle dropped without stopping still releases the state once the thread exits.
    drop(RenderTask::spawn(shared.clone(), panel()).unwrap());
    let mut third = None;
    wait_for("respawn after drop", || {
        third = RenderTask::spawn(shared.clone(), panel()).ok();
        third.is_some()
    });
    assert!(third.and_then(|handle| handle.stop()).is_some());
}

#[test]
fn stop_interrupts_startup_delay() {
    let config = ScanoutConfig {
        startup_delay_ms: 60_000,
        ..fast_config()
    };
    let shared = ScanoutShared::new(config).unwrap();
    let handle = RenderTask::spawn(shared.clone(), panel()).unwrap();

    let started = Instant::now();
    let panel = handle.stop().expect("render task exits within the grace period");
    assert!(started.elapsed() < Duration::from_secs(2));
    // Stopped before the background fill or any frame.
    assert_eq!(panel.push_count(), 0);
    assert_eq!(shared.stats().snapshot().cycles, 0);
}

#[test]
fn invalid_config_is_rejected_before_allocation() {
    let config = ScanoutConfig {
        tile_width: 36,
        ..ScanoutConfig::default()
    };
    assert!(matches!(
        ScanoutShared::new(config),
        Err(ScanoutError::InvalidConfig(_))
    ));
}
