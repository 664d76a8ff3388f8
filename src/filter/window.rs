// SPDX-License-Identifier: GPL-3.0-only

//! Square regression windows clamped to the image

/// Inclusive pixel rectangle `[x0, x1] × [y0, y1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl Window {
    /// `[max(x-hw, 0), min(x+hw, w-1)] × [max(y-hw, 0), min(y+hw, h-1)]`
    pub fn around(x: usize, y: usize, half_window: usize, width: usize, height: usize) -> Self {
        debug_assert!(x < width && y < height);
        Self {
            x0: x.saturating_sub(half_window),
            y0: y.saturating_sub(half_window),
            x1: (x + half_window).min(width - 1),
            y1: (y + half_window).min(height - 1),
        }
    }

    pub fn width(&self) -> usize {
        self.x1 - self.x0 + 1
    }

    pub fn height(&self) -> usize {
        self.y1 - self.y0 + 1
    }

    pub fn len(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All pixels of the window, row by row
    pub fn pixels(self) -> impl Iterator<Item = (usize, usize)> {
        (self.y0..=self.y1).flat_map(move |y| (self.x0..=self.x1).map(move |x| (x, y)))
    }
}
