use std::fmt;

use jit::Complex;

use crate::error::{RenderError, RenderResult};

/// A rectangle of the complex plane sampled on a `width` x `height` pixel
/// grid. Pixel `(x, y)` samples the lower-left corner of its cell, so the
/// upper bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub re_min: f64,
    pub re_max: f64,
    pub im_min: f64,
    pub im_max: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 900,
            re_min: -1.6,
            re_max: 1.6,
            im_min: -0.9,
            im_max: 0.9,
        }
    }
}

impl Viewport {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_bounds(mut self, re_min: f64, re_max: f64, im_min: f64, im_max: f64) -> Self {
        self.re_min = re_min;
        self.re_max = re_max;
        self.im_min = im_min;
        self.im_max = im_max;
        self
    }

    pub fn validate(&self) -> RenderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidViewport(format!(
                "size {}x{} has no pixels",
                self.width, self.height
            )));
        }
        let bounds = [self.re_min, self.re_max, self.im_min, self.im_max];
        if bounds.iter().any(|value| !value.is_finite()) {
            return Err(RenderError::InvalidViewport(format!(
                "bounds must be finite, got {self}"
            )));
        }
        if self.re_min >= self.re_max || self.im_min >= self.im_max {
            return Err(RenderError::InvalidViewport(format!(
                "bounds must be increasing, got {self}"
            )));
        }
        Ok(())
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn point_at(&self, x: u32, y: u32) -> Complex {
        let re = self.re_min + (self.re_max - self.re_min) * f64::from(x) / f64::from(self.width);
        let im = self.im_min + (self.im_max - self.im_min) * f64::from(y) / f64::from(self.height);
        Complex::new(re, im)
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} re=[{}, {}) im=[{}, {})",
            self.width, self.height, self.re_min, self.re_max, self.im_min, self.im_max
        )
    }
}
