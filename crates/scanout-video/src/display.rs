use scanout_shared::{native_to_rgb, Rect};

use crate::error::DisplayError;

/// Physical panel the render task pushes pixels to.
///
/// Pixels are native (byte-swapped RGB565) and laid out row-major, `rect.width` per row.
pub trait DisplayDriver {
    /// Panel resolution in pixels.
    fn panel_size(&self) -> (u32, u32);

    /// Transfers `rect.width * rect.height` pixels into `rect` on the panel.
    fn push(&mut self, rect: Rect, pixels: &[u16]) -> Result<(), DisplayError>;

    /// Called before the first push of a render cycle.
    fn begin_batch(&mut self) {}

    /// Called after the last push of a render cycle.
    fn end_batch(&mut self) {}
}

/// Validates a push against the panel bounds and returns the pixel count it covers.
pub fn check_push(panel: (u32, u32), rect: Rect, pixels: &[u16]) -> Result<usize, DisplayError> {
    if !rect.fits_within(panel.0, panel.1) {
        return Err(DisplayError::OutOfBounds { rect, panel });
    }
    let expected = rect.area();
    if pixels.len() < expected {
        return Err(DisplayError::ShortBuffer {
            expected,
            got: pixels.len(),
        });
    }
    Ok(expected)
}

/// Software panel holding its contents in memory.
#[derive(Debug, Clone)]
pub struct MemoryPanel {
    width: u32,
    height: u32,
    pixels: Vec<u16>,
    pushes: u64,
    pushed_pixels: u64,
    batches: u64,
}

impl MemoryPanel {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
            pushes: 0,
            pushed_pixels: 0,
            batches: 0,
        }
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Number of successful pushes so far.
    pub fn push_count(&self) -> u64 {
        self.pushes
    }

    pub fn pushed_pixels(&self) -> u64 {
        self.pushed_pixels
    }

    pub fn batch_count(&self) -> u64 {
        self.batches
    }

    /// Panel contents as packed 8-bit RGB, row-major.
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 3);
        for &p in &self.pixels {
            let rgb = native_to_rgb(p);
            out.extend_from_slice(&[rgb.r, rgb.g, rgb.b]);
        }
        out
    }
}

impl DisplayDriver for MemoryPanel {
    fn panel_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn push(&mut self, rect: Rect, pixels: &[u16]) -> Result<(), DisplayError> {
        let count = check_push(self.panel_size(), rect, pixels)?;

        let panel_width = self.width as usize;
        let w = rect.width as usize;
        if w > 0 {
            for (row, src) in pixels[..count].chunks_exact(w).enumerate() {
                let start = (rect.y as usize + row) * panel_width + rect.x as usize;
                self.pixels[start..start + w].copy_from_slice(src);
            }
        }

        self.pushes += 1;
        self.pushed_pixels += count as u64;
        Ok(())
    }

    fn begin_batch(&mut self) {
        self.batches += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_writes_rect_rows() {
        let mut panel = MemoryPanel::new(4, 3);
        panel
            .push(Rect::new(1, 1, 2, 2), &[1, 2, 3, 4])
            .unwrap();
        assert_eq!(
            panel.pixels(),
            &[0, 0, 0, 0, 0, 1, 2, 0, 0, 3, 4, 0]
        );
        assert_eq!(panel.pixel(2, 2), Some(4));
        assert_eq!(panel.pixel(4, 0), None);
        assert_eq!(panel.push_count(), 1);
        assert_eq!(panel.pushed_pixels(), 4);
    }

    #[test]
    fn invalid_pushes_are_rejected_without_side_effects() {
        let mut panel = MemoryPanel::new(4, 3);
        assert!(matches!(
            panel.push(Rect::new(3, 0, 2, 1), &[1, 2]),
            Err(DisplayError::OutOfBounds { .. })
        ));
        assert!(matches!(
            panel.push(Rect::new(0, 0, 2, 2), &[1, 2, 3]),
            Err(DisplayError::ShortBuffer {
                expected: 4,
                got: 3
            })
        ));
        assert_eq!(panel.push_count(), 0);
        assert!(panel.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn rgb_export_decodes_native_pixels() {
        let mut panel = MemoryPanel::new(1, 1);
        panel.push(Rect::new(0, 0, 1, 1), &[0x00F8]).unwrap();
        assert_eq!(panel.to_rgb8(), vec![255, 0, 0]);
    }
}
