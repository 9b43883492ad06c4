use scanout_shared::Rect;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanoutError>;

/// Errors raised while bringing the scanout subsystem up.
///
/// Once running, nothing in the render path returns these: driver failures are logged and the
/// affected tiles are retried on a later cycle.
#[derive(Debug, Error)]
pub enum ScanoutError {
    #[error("failed to allocate {what} ({bytes} bytes)")]
    Allocation { what: &'static str, bytes: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("failed to spawn render task: {0}")]
    TaskSpawn(#[source] std::io::Error),

    #[error("a render task is already attached to this scanout")]
    AlreadyRunning,
}

/// Errors reported by a [`crate::DisplayDriver`] push.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("rect {rect:?} does not fit the {}x{} panel", panel.0, panel.1)]
    OutOfBounds { rect: Rect, panel: (u32, u32) },

    #[error("pixel buffer too short: expected {expected} pixels, got {got}")]
    ShortBuffer { expected: usize, got: usize },

    #[error("panel transfer failed: {0}")]
    Transfer(String),
}

/// Allocates a `len`-element buffer filled with `fill`, reporting failure as
/// [`ScanoutError::Allocation`] instead of aborting.
pub(crate) fn try_alloc<T: Clone>(len: usize, fill: T, what: &'static str) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| ScanoutError::Allocation {
            what,
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    buf.resize(len, fill);
    Ok(buf)
}
