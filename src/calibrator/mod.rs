//! Camera calibration from a batch of chessboard images.
//!
//! A [`Calibrator`] only exists once calibration succeeded: construction runs the
//! detector over every image, skips images where the board is not fully visible,
//! and hands the collected correspondences to a [`CameraSolver`]. The resulting
//! model is then used to [`Calibrator::undistort`] further images from the same
//! camera.
//!
//! ```no_run
//! use chessboard_calib::Calibrator;
//!
//! # fn run(images: Vec<image::RgbImage>) -> Result<(), chessboard_calib::CalibrationError> {
//! let calibrator = Calibrator::new(&images, 9, 6)?;
//! println!("K = {}", calibrator.intrinsic_matrix());
//! let rectified = calibrator.undistort(&images[0]);
//! # Ok(())
//! # }
//! ```

use crate::camera::{CameraModel, RadTanModel, Resolution};
use crate::detection::{ChessboardDetector, DetectionError, PatternDetector};
use crate::geometry::{ProjectionError, ViewPose};
use crate::optimization::{CameraSolver, PlanarSolver, SolvedCamera, SolverError};
use crate::pattern::{CalibrationSet, PatternError, PatternSize};
use crate::undistort::{remap, UndistortMap};
use image::{imageops, RgbImage};
use log::{debug, info, warn};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("No images were provided")]
    EmptyImageSet,
    #[error("Image {index} is {found}, expected {expected} like the first image")]
    ImageSizeMismatch {
        index: usize,
        expected: Resolution,
        found: Resolution,
    },
    #[error("The chessboard was not found in any of the {images} images")]
    NoPatternFound { images: usize },
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Which images contributed to a calibration, and how well the model fits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Indices of images where the full pattern was found.
    pub used: Vec<usize>,
    /// Indices of images skipped because the pattern was not fully visible.
    pub skipped: Vec<usize>,
    /// Board pose of every used image, in the order of `used`.
    pub poses: Vec<ViewPose>,
    pub projection_error: ProjectionError,
}

/// A calibrated camera: intrinsics, distortion and the resolution they apply to.
#[derive(Debug, Clone)]
pub struct Calibrator {
    pattern: PatternSize,
    model: RadTanModel,
    report: CalibrationReport,
    undistort_map: OnceLock<UndistortMap>,
}

impl Calibrator {
    /// Calibrates from `images` showing a chessboard with `hcount x vcount` inner
    /// corners, using the [`ChessboardDetector`] and the [`PlanarSolver`].
    ///
    /// # Errors
    ///
    /// * [`CalibrationError::Pattern`] if either count is below 2.
    /// * [`CalibrationError::EmptyImageSet`] if `images` is empty.
    /// * [`CalibrationError::ImageSizeMismatch`] if the images differ in size.
    /// * [`CalibrationError::NoPatternFound`] if no image shows the full board.
    /// * [`CalibrationError::Solver`] if the camera cannot be estimated.
    pub fn new(images: &[RgbImage], hcount: usize, vcount: usize) -> Result<Self, CalibrationError> {
        Self::builder(PatternSize::new(hcount, vcount)?).calibrate(images)
    }

    /// Starts a calibration with custom collaborators.
    pub fn builder(pattern: PatternSize) -> CalibratorBuilder {
        CalibratorBuilder::new(pattern)
    }

    pub fn camera(&self) -> &RadTanModel {
        &self.model
    }

    /// The 3x3 intrinsic matrix `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    pub fn intrinsic_matrix(&self) -> Matrix3<f64> {
        self.model.intrinsic_matrix()
    }

    /// `[k1, k2, p1, p2, k3]`.
    pub fn distortion_coefficients(&self) -> [f64; 5] {
        self.model.distortions
    }

    pub fn resolution(&self) -> Resolution {
        self.model.get_resolution()
    }

    pub fn pattern(&self) -> PatternSize {
        self.pattern
    }

    pub fn report(&self) -> &CalibrationReport {
        &self.report
    }

    /// Removes lens distortion from `image`.
    ///
    /// The output has the same size as the input and uses the calibrated intrinsic
    /// matrix; regions with no source pixel are black. The remap table for the
    /// calibrated resolution is built on first use and reused afterwards.
    pub fn undistort(&self, image: &RgbImage) -> RgbImage {
        let resolution = Resolution {
            width: image.width(),
            height: image.height(),
        };
        if resolution == self.model.resolution {
            let map = self
                .undistort_map
                .get_or_init(|| UndistortMap::new(&self.model, resolution));
            remap(image, map)
        } else {
            debug!(
                "Building a one-off undistortion map for {} (calibrated at {})",
                resolution, self.model.resolution
            );
            remap(image, &UndistortMap::new(&self.model, resolution))
        }
    }
}

/// Configures the collaborators of a calibration run.
pub struct CalibratorBuilder {
    pattern: PatternSize,
    detector: Box<dyn PatternDetector>,
    solver: Box<dyn CameraSolver>,
}

impl CalibratorBuilder {
    pub fn new(pattern: PatternSize) -> Self {
        CalibratorBuilder {
            pattern,
            detector: Box::new(ChessboardDetector::new()),
            solver: Box::new(PlanarSolver::new()),
        }
    }

    pub fn detector(mut self, detector: impl PatternDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn solver(mut self, solver: impl CameraSolver + 'static) -> Self {
        self.solver = Box::new(solver);
        self
    }

    /// Detects the pattern in every image and solves for the camera.
    pub fn calibrate(self, images: &[RgbImage]) -> Result<Calibrator, CalibrationError> {
        let first = images.first().ok_or(CalibrationError::EmptyImageSet)?;
        let expected = Resolution {
            width: first.width(),
            height: first.height(),
        };

        let point_count = self.pattern.point_count();
        let mut set = CalibrationSet::new(self.pattern);
        let mut skipped = Vec::new();

        for (index, image) in images.iter().enumerate() {
            let gray = imageops::grayscale(image);
            let found = Resolution {
                width: gray.width(),
                height: gray.height(),
            };
            if found != expected {
                return Err(CalibrationError::ImageSizeMismatch {
                    index,
                    expected,
                    found,
                });
            }

            match self.detector.find_corners(&gray, self.pattern)? {
                Some(points) => {
                    if points.len() != point_count {
                        return Err(DetectionError::WrongPointCount {
                            expected: point_count,
                            found: points.len(),
                        }
                        .into());
                    }
                    debug!("[Calibrator] image {index}: pattern found");
                    set.push(index, points)?;
                }
                None => {
                    warn!("[Calibrator] image {index} skipped during calibration: chessboard is not fully visible");
                    skipped.push(index);
                }
            }
        }

        if set.is_empty() {
            return Err(CalibrationError::NoPatternFound {
                images: images.len(),
            });
        }

        info!(
            "[Calibrator] solving {} pattern with {} of {} images",
            self.pattern,
            set.len(),
            images.len()
        );
        let SolvedCamera {
            model,
            poses,
            projection_error,
        } = self.solver.solve(&set, expected)?;
        info!("[Calibrator] {:?}", projection_error);

        Ok(Calibrator {
            pattern: self.pattern,
            model,
            report: CalibrationReport {
                used: set.image_indices(),
                skipped,
                poses,
                projection_error,
            },
            undistort_map: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Intrinsics;
    use crate::optimization::SolverError;
    use image::{GrayImage, Rgb};
    use nalgebra::{Vector2, Vector3};

    /// A solver that returns a fixed model without looking at the data.
    struct FixedSolver;

    impl CameraSolver for FixedSolver {
        fn solve(
            &self,
            set: &CalibrationSet,
            resolution: Resolution,
        ) -> Result<SolvedCamera, SolverError> {
            Ok(SolvedCamera {
                model: RadTanModel {
                    intrinsics: Intrinsics {
                        fx: 100.0,
                        fy: 100.0,
                        cx: resolution.width as f64 / 2.0,
                        cy: resolution.height as f64 / 2.0,
                    },
                    resolution,
                    distortions: [0.0; 5],
                },
                poses: vec![ViewPose::new(Vector3::zeros(), Vector3::zeros()); set.len()],
                projection_error: ProjectionError::from_errors(&[0.0])?,
            })
        }
    }

    fn grid(pattern: PatternSize) -> Vec<Vector2<f64>> {
        (0..pattern.point_count())
            .map(|k| Vector2::new((k % pattern.hcount) as f64, (k / pattern.hcount) as f64))
            .collect()
    }

    /// Images whose red channel at (0, 0) is non-zero "contain" the board.
    fn marked_images(marks: &[u8]) -> Vec<RgbImage> {
        marks
            .iter()
            .map(|&m| {
                let mut image = RgbImage::new(32, 24);
                image.put_pixel(0, 0, Rgb([m, 0, 0]));
                image
            })
            .collect()
    }

    fn scripted(gray: &GrayImage, pattern: PatternSize) -> Result<Option<Vec<Vector2<f64>>>, DetectionError> {
        if gray.get_pixel(0, 0).0[0] > 0 {
            Ok(Some(grid(pattern)))
        } else {
            Ok(None)
        }
    }

    fn truncated(_: &GrayImage, _: PatternSize) -> Result<Option<Vec<Vector2<f64>>>, DetectionError> {
        Ok(Some(vec![Vector2::zeros(); 5]))
    }

    fn failing(_: &GrayImage, _: PatternSize) -> Result<Option<Vec<Vector2<f64>>>, DetectionError> {
        Err(DetectionError::Failed("boom".to_string()))
    }

    fn builder() -> CalibratorBuilder {
        Calibrator::builder(PatternSize::new(4, 3).unwrap())
            .detector(scripted)
            .solver(FixedSolver)
    }

    #[test]
    fn test_skips_images_without_pattern() {
        let images = marked_images(&[255, 0, 255, 255, 0]);
        let calibrator = builder().calibrate(&images).unwrap();

        assert_eq!(calibrator.report().used, vec![0, 2, 3]);
        assert_eq!(calibrator.report().skipped, vec![1, 4]);
        assert_eq!(calibrator.report().poses.len(), 3);
        assert_eq!(
            calibrator.resolution(),
            Resolution {
                width: 32,
                height: 24
            }
        );
        assert_eq!(calibrator.pattern(), PatternSize::new(4, 3).unwrap());
        assert_eq!(calibrator.intrinsic_matrix()[(0, 2)], 16.0);
        assert_eq!(calibrator.distortion_coefficients(), [0.0; 5]);
    }

    #[test]
    fn test_no_pattern_found() {
        let images = marked_images(&[0, 0, 0]);
        assert!(matches!(
            builder().calibrate(&images),
            Err(CalibrationError::NoPatternFound { images: 3 })
        ));
    }

    #[test]
    fn test_empty_image_set() {
        assert!(matches!(
            builder().calibrate(&[]),
            Err(CalibrationError::EmptyImageSet)
        ));
    }

    #[test]
    fn test_invalid_pattern_size() {
        let images = marked_images(&[255]);
        assert!(matches!(
            Calibrator::new(&images, 1, 5),
            Err(CalibrationError::Pattern(PatternError::InvalidSize { .. }))
        ));
    }

    #[test]
    fn test_image_size_mismatch() {
        let mut images = marked_images(&[255, 255]);
        images.push(RgbImage::new(16, 24));
        match builder().calibrate(&images) {
            Err(CalibrationError::ImageSizeMismatch {
                index,
                expected,
                found,
            }) => {
                assert_eq!(index, 2);
                assert_eq!(expected.width, 32);
                assert_eq!(found.width, 16);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_wrong_point_count_is_a_detector_failure() {
        let images = marked_images(&[255]);
        let result = Calibrator::builder(PatternSize::new(4, 3).unwrap())
            .detector(truncated)
            .solver(FixedSolver)
            .calibrate(&images);
        assert!(matches!(
            result,
            Err(CalibrationError::Detection(DetectionError::WrongPointCount {
                expected: 12,
                found: 5
            }))
        ));
    }

    #[test]
    fn test_detector_errors_propagate() {
        let images = marked_images(&[255]);
        let result = Calibrator::builder(PatternSize::new(4, 3).unwrap())
            .detector(failing)
            .solver(FixedSolver)
            .calibrate(&images);
        assert!(matches!(
            result,
            Err(CalibrationError::Detection(DetectionError::Failed(_)))
        ));
    }

    #[test]
    fn test_undistort_keeps_dimensions() {
        let images = marked_images(&[255]);
        let calibrator = builder().calibrate(&images).unwrap();

        let out = calibrator.undistort(&images[0]);
        assert_eq!(out.dimensions(), (32, 24));
        assert_eq!(out, images[0]);

        let other = RgbImage::from_pixel(10, 8, Rgb([9, 9, 9]));
        assert_eq!(calibrator.undistort(&other).dimensions(), (10, 8));
    }

    #[test]
    fn test_calibrator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Calibrator>();
    }
}
