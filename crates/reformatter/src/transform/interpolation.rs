//! Resampling a 2-D field onto a grid of a different size.

use serde::{Deserialize, Serialize};

/// Resampling method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMethod {
    /// Nearest neighbor (preserves exact values, suits categorical fields).
    Nearest,
    /// Bilinear interpolation.
    #[default]
    Bilinear,
}

/// Row-major view over one 2-D field.
#[derive(Debug, Clone, Copy)]
pub struct GridView<'a> {
    data: &'a [f32],
    width: usize,
    height: usize,
}

impl<'a> GridView<'a> {
    /// Wrap `data`, which must hold `width * height` values.
    pub fn new(data: &'a [f32], width: usize, height: usize) -> Option<Self> {
        (width > 0 && height > 0 && data.len() == width * height).then_some(Self {
            data,
            width,
            height,
        })
    }

    fn at(&self, col: usize, row: usize) -> f32 {
        self.data[row * self.width + col]
    }

    /// Value of the nearest grid point, NaN outside the grid.
    pub fn nearest(&self, x: f64, y: f64) -> f32 {
        if x < -0.5 || y < -0.5 {
            return f32::NAN;
        }
        let col = x.round() as usize;
        let row = y.round() as usize;
        if col >= self.width || row >= self.height {
            return f32::NAN;
        }
        self.at(col, row)
    }

    /// Bilinear blend of the four surrounding points.
    ///
    /// A NaN corner makes the result NaN.
    pub fn bilinear(&self, x: f64, y: f64) -> f32 {
        if x < 0.0 || y < 0.0 {
            return f32::NAN;
        }
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        if x0 >= self.width || y0 >= self.height {
            return f32::NAN;
        }
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let xf = (x - x0 as f64) as f32;
        let yf = (y - y0 as f64) as f32;

        let v00 = self.at(x0, y0);
        let v10 = self.at(x1, y0);
        let v01 = self.at(x0, y1);
        let v11 = self.at(x1, y1);
        if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
            return f32::NAN;
        }

        let top = v00 * (1.0 - xf) + v10 * xf;
        let bottom = v01 * (1.0 - xf) + v11 * xf;
        top * (1.0 - yf) + bottom * yf
    }

    /// Resample to `dst_width` x `dst_height`, aligning the corner points.
    pub fn resample(&self, dst_width: usize, dst_height: usize, method: ResampleMethod) -> Vec<f32> {
        if dst_width == self.width && dst_height == self.height {
            return self.data.to_vec();
        }

        let scale_x = (self.width - 1) as f64 / (dst_width.max(2) - 1) as f64;
        let scale_y = (self.height - 1) as f64 / (dst_height.max(2) - 1) as f64;

        let mut output = Vec::with_capacity(dst_width * dst_height);
        for dy in 0..dst_height {
            let sy = dy as f64 * scale_y;
            for dx in 0..dst_width {
                let sx = dx as f64 * scale_x;
                output.push(match method {
                    ResampleMethod::Nearest => self.nearest(sx, sy),
                    ResampleMethod::Bilinear => self.bilinear(sx, sy),
                });
            }
        }
        output
    }
}
