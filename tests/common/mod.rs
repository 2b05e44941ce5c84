//! Synthetic chessboard scenes shared by the integration tests.

#![allow(dead_code)]

use chessboard_calib::camera::{Intrinsics, RadTanModel, Resolution};
use chessboard_calib::detection::{DetectionError, PatternDetector};
use chessboard_calib::geometry::{rotate_axis_angle, ViewPose};
use chessboard_calib::pattern::PatternSize;
use image::{GrayImage, Rgb, RgbImage};
use nalgebra::{Vector2, Vector3};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn reference_camera() -> RadTanModel {
    RadTanModel {
        intrinsics: Intrinsics {
            fx: 520.0,
            fy: 515.0,
            cx: 322.0,
            cy: 238.0,
        },
        resolution: Resolution {
            width: 640,
            height: 480,
        },
        distortions: [-0.12, 0.03, 0.0008, -0.0005, 0.0],
    }
}

/// Looks up the answer for an image by the view index painted into pixel (0, 0).
pub struct ScriptedDetector {
    pub views: Vec<Option<Vec<Vector2<f64>>>>,
}

impl PatternDetector for ScriptedDetector {
    fn find_corners(
        &self,
        image: &GrayImage,
        _pattern: PatternSize,
    ) -> Result<Option<Vec<Vector2<f64>>>, DetectionError> {
        let index = (image.get_pixel(0, 0).0[0] as f64 / 10.0).round() as usize;
        self.views
            .get(index)
            .cloned()
            .ok_or_else(|| DetectionError::Failed(format!("no script for view {index}")))
    }
}

/// Flat gray images with their index `k` painted into pixel (0, 0) as `10 * k`.
pub fn tagged_images(count: usize, width: u32, height: u32) -> Vec<RgbImage> {
    (0..count)
        .map(|k| {
            let tag = (k * 10) as u8;
            let mut image = RgbImage::from_pixel(width, height, Rgb([90, 90, 90]));
            image.put_pixel(0, 0, Rgb([tag, tag, tag]));
            image
        })
        .collect()
}

/// Board poses looking at the centre of a `pattern` board from a spread of angles.
pub fn board_poses(pattern: PatternSize, views: usize, distance: f64) -> Vec<ViewPose> {
    let center = Vector3::new(
        (pattern.hcount - 1) as f64 / 2.0,
        (pattern.vcount - 1) as f64 / 2.0,
        0.0,
    );
    (0..views)
        .map(|k| {
            let kf = k as f64;
            let rotation = Vector3::new(
                0.3 * (0.9 * kf + 0.4).sin(),
                0.3 * (1.7 * kf).cos(),
                0.2 * (0.5 * kf).sin(),
            );
            let offset = Vector3::new(
                0.6 * (1.3 * kf).sin(),
                0.4 * (0.6 * kf).cos(),
                distance * (1.0 + 0.1 * (0.37 * kf).sin()),
            );
            ViewPose::new(rotation, offset - rotate_axis_angle(&rotation, &center))
        })
        .collect()
}

/// Exact pixel positions of the pattern's inner corners, row-major.
pub fn project_corners(model: &RadTanModel, pattern: PatternSize, pose: &ViewPose) -> Vec<Vector2<f64>> {
    (0..pattern.point_count())
        .map(|k| {
            let board = Vector3::new((k % pattern.hcount) as f64, (k / pattern.hcount) as f64, 0.0);
            let pc = pose.transform(&board);
            model.project_normalized(&Vector2::new(pc.x / pc.z, pc.y / pc.z))
        })
        .collect()
}

/// Renders chessboards as seen through a distorted camera.
///
/// The viewing ray of every sub-pixel sample is computed once, then each view
/// only intersects those rays with its board plane.
pub struct SceneRenderer {
    pattern: PatternSize,
    resolution: Resolution,
    /// Normalized ray directions, `SAMPLES^2` per pixel, row-major.
    rays: Vec<Vector2<f64>>,
}

const SAMPLES: u32 = 2;

impl SceneRenderer {
    pub fn new(model: &RadTanModel, pattern: PatternSize) -> Self {
        let resolution = model.resolution;
        let fx = model.intrinsics.fx;
        let fy = model.intrinsics.fy;
        let cx = model.intrinsics.cx;
        let cy = model.intrinsics.cy;

        let step = 1.0 / SAMPLES as f64;
        let mut rays = Vec::with_capacity((resolution.width * resolution.height * SAMPLES * SAMPLES) as usize);
        for v in 0..resolution.height {
            for u in 0..resolution.width {
                for sy in 0..SAMPLES {
                    for sx in 0..SAMPLES {
                        let px = u as f64 - 0.5 + (sx as f64 + 0.5) * step;
                        let py = v as f64 - 0.5 + (sy as f64 + 0.5) * step;
                        let distorted = Vector2::new((px - cx) / fx, (py - cy) / fy);
                        let ray = model
                            .undistort_normalized(&distorted)
                            .unwrap_or(Vector2::new(f64::NAN, f64::NAN));
                        rays.push(ray);
                    }
                }
            }
        }

        SceneRenderer {
            pattern,
            resolution,
            rays,
        }
    }

    /// Intensity of the board plane at board coordinates `(x, y)`.
    fn shade(&self, x: f64, y: f64) -> f64 {
        let cols = self.pattern.hcount as f64;
        let rows = self.pattern.vcount as f64;
        // Squares span [-1, hcount] x [-1, vcount], surrounded by a one square white margin
        if x >= -1.0 && x < cols && y >= -1.0 && y < rows {
            let parity = (x.floor() as i64 + y.floor() as i64).rem_euclid(2);
            if parity == 0 {
                25.0
            } else {
                230.0
            }
        } else if x >= -2.0 && x < cols + 1.0 && y >= -2.0 && y < rows + 1.0 {
            240.0
        } else {
            110.0
        }
    }

    pub fn render(&self, pose: &ViewPose) -> RgbImage {
        let rotation = pose.isometry().rotation;
        let inverse = rotation.inverse();
        // Camera centre and rays expressed in the board frame
        let origin = inverse * (-pose.translation);

        let per_pixel = (SAMPLES * SAMPLES) as usize;
        RgbImage::from_fn(self.resolution.width, self.resolution.height, |u, v| {
            let base = (v as usize * self.resolution.width as usize + u as usize) * per_pixel;
            let mut sum = 0.0;
            for ray in &self.rays[base..base + per_pixel] {
                let direction = inverse * Vector3::new(ray.x, ray.y, 1.0);
                let s = -origin.z / direction.z;
                sum += if s.is_finite() && s > 0.0 {
                    self.shade(origin.x + s * direction.x, origin.y + s * direction.y)
                } else {
                    110.0
                };
            }
            let value = (sum / per_pixel as f64).round() as u8;
            Rgb([value, value, value])
        })
    }
}
