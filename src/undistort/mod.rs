//! Lens distortion removal.
//!
//! An [`UndistortMap`] stores, for every pixel of the undistorted output, the
//! position in the distorted input it is sampled from. The same intrinsic matrix
//! is used for both images, so the output keeps the input size and is not
//! cropped. [`remap`] applies a map with bilinear interpolation; samples that
//! fall outside the input are black.

use crate::camera::{CameraModel, Intrinsics, RadTanModel, Resolution};
use image::{Rgb, RgbImage};
use nalgebra::Vector2;

/// Per-pixel source coordinates for one output resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct UndistortMap {
    resolution: Resolution,
    /// Row-major `(x, y)` source positions in input pixel coordinates.
    sources: Vec<[f32; 2]>,
}

impl UndistortMap {
    /// Builds the map of `model` for images of `resolution`.
    pub fn new(model: &RadTanModel, resolution: Resolution) -> Self {
        let Intrinsics { fx, fy, cx, cy } = model.get_intrinsics();

        let mut sources = Vec::with_capacity(resolution.width as usize * resolution.height as usize);
        for v in 0..resolution.height {
            let y = (v as f64 - cy) / fy;
            for u in 0..resolution.width {
                let x = (u as f64 - cx) / fx;
                let source = model.project_normalized(&Vector2::new(x, y));
                sources.push([source.x as f32, source.y as f32]);
            }
        }

        UndistortMap {
            resolution,
            sources,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Source position sampled for output pixel `(u, v)`.
    pub fn source(&self, u: u32, v: u32) -> Option<[f32; 2]> {
        if u >= self.resolution.width || v >= self.resolution.height {
            return None;
        }
        self.sources
            .get(v as usize * self.resolution.width as usize + u as usize)
            .copied()
    }
}

#[inline]
fn get_rgb(src: &RgbImage, x: i32, y: i32) -> [f32; 3] {
    if x < 0 || y < 0 || x >= src.width() as i32 || y >= src.height() as i32 {
        return [0.0; 3];
    }
    let Rgb(p) = *src.get_pixel(x as u32, y as u32);
    [p[0] as f32, p[1] as f32, p[2] as f32]
}

#[inline]
fn sample_bilinear(src: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_rgb(src, x0, y0);
    let p10 = get_rgb(src, x0 + 1, y0);
    let p01 = get_rgb(src, x0, y0 + 1);
    let p11 = get_rgb(src, x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let a = p00[c] + fx * (p10[c] - p00[c]);
        let b = p01[c] + fx * (p11[c] - p01[c]);
        out[c] = (a + fy * (b - a)).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Resamples `image` through `map`. The output has the map's resolution.
pub fn remap(image: &RgbImage, map: &UndistortMap) -> RgbImage {
    let Resolution { width, height } = map.resolution;
    let mut out = RgbImage::new(width, height);
    for (u, v, pixel) in out.enumerate_pixels_mut() {
        if let Some([x, y]) = map.source(u, v) {
            *pixel = sample_bilinear(image, x, y);
        }
    }
    out
}
