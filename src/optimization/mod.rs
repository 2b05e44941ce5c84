//! The `optimization` module turns a [`CalibrationSet`] into a camera model.
//!
//! It defines the [`CameraSolver`] trait, the seam through which a calibration
//! run obtains its model, and the default [`PlanarSolver`]:
//!
//! 1. A normalized DLT homography per view ([`homography`]).
//! 2. A closed-form, distortion-free intrinsic estimate ([`initial`]).
//! 3. A board pose per view recovered from its homography ([`pose`]).
//! 4. Joint Levenberg-Marquardt refinement of the RadTan camera and all poses
//!    with `tiny_solver` ([`rad_tan`]).
//!
//! The [`Optimizer`] trait describes the refinement stage itself.

use crate::camera::{CameraModelError, RadTanModel, Resolution};
use crate::geometry::{compute_reprojection_error, GeometryError, ProjectionError, ViewPose};
use crate::pattern::CalibrationSet;
use log::{debug, info};

pub mod homography;
pub mod initial;
pub mod pose;
pub mod rad_tan;

pub use rad_tan::RadTanOptimizationCost;

#[derive(thiserror::Error, Debug)]
pub enum SolverError {
    #[error("Need at least {required} views, got {found}")]
    NotEnoughViews { required: usize, found: usize },
    #[error("Need at least {required} point correspondences, got {found}")]
    NotEnoughPoints { required: usize, found: usize },
    #[error("Expected {expected} view poses, got {found}")]
    PoseCountMismatch { expected: usize, found: usize },
    #[error("Degenerate configuration: {0}")]
    DegenerateConfiguration(String),
    #[error("Optimization failed: {0}")]
    OptimizationFailed(String),
    #[error(transparent)]
    Camera(#[from] CameraModelError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// The outcome of a successful solve.
#[derive(Debug, Clone)]
pub struct SolvedCamera {
    pub model: RadTanModel,
    /// One pose per detection, in the order of the calibration set.
    pub poses: Vec<ViewPose>,
    pub projection_error: ProjectionError,
}

/// Fits a camera model to the correspondences collected from a batch of images.
///
/// Implementations receive at least one detection and the resolution shared by
/// every image of the batch.
pub trait CameraSolver {
    fn solve(
        &self,
        set: &CalibrationSet,
        resolution: Resolution,
    ) -> Result<SolvedCamera, SolverError>;
}

/// A trait for camera model optimization tasks.
///
/// Types implementing `Optimizer` refine the parameters of a camera model by
/// minimizing the reprojection error of known correspondences.
pub trait Optimizer {
    /// Performs non-linear optimization to refine the camera model parameters.
    ///
    /// # Arguments
    ///
    /// * `verbose` - If `true`, progress is logged at `info` level.
    fn optimize(&mut self, verbose: bool) -> Result<(), SolverError>;

    /// Performs a linear estimation of some camera model parameters.
    ///
    /// Provides an initial guess for a subset of the parameters by solving a
    /// linear system, before non-linear optimization.
    fn linear_estimation(&mut self) -> Result<(), SolverError>
    where
        Self: Sized;
}

/// Zhang-style planar calibration with `tiny_solver` refinement.
#[derive(Debug, Clone)]
pub struct PlanarSolver {
    /// Log the progress of the refinement at `info` level.
    pub verbose: bool,
    /// Seed `k1, k2` by linear least squares before the non-linear refinement.
    pub linear_distortion_init: bool,
}

impl PlanarSolver {
    pub fn new() -> Self {
        PlanarSolver {
            verbose: false,
            linear_distortion_init: true,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn linear_distortion_init(mut self, enabled: bool) -> Self {
        self.linear_distortion_init = enabled;
        self
    }
}

impl Default for PlanarSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraSolver for PlanarSolver {
    fn solve(
        &self,
        set: &CalibrationSet,
        resolution: Resolution,
    ) -> Result<SolvedCamera, SolverError> {
        if set.is_empty() {
            return Err(SolverError::NotEnoughViews {
                required: 1,
                found: 0,
            });
        }

        let homographies = set
            .detections()
            .iter()
            .map(|d| homography::estimate_homography(d.object_points(), d.image_points()))
            .collect::<Result<Vec<_>, _>>()?;

        let pinhole = initial::estimate_pinhole(&homographies, resolution)?;
        let poses = homographies
            .iter()
            .map(|h| pose::pose_from_homography(&pinhole.intrinsics, h))
            .collect::<Result<Vec<_>, _>>()?;

        let initial_model = RadTanModel::from_pinhole(&pinhole);
        if self.verbose {
            info!("Closed-form initial model: {:?}", initial_model);
        }

        let mut cost = RadTanOptimizationCost::new(initial_model, set, poses)?;
        if self.linear_distortion_init {
            if let Err(e) = cost.linear_estimation() {
                debug!("Linear distortion estimate skipped: {}", e);
            }
        }
        cost.optimize(self.verbose)?;

        let (model, poses) = cost.into_parts();
        let projection_error = compute_reprojection_error(&model, set, &poses)?;
        if self.verbose {
            info!("Final {:?}", projection_error);
        }

        Ok(SolvedCamera {
            model,
            poses,
            projection_error,
        })
    }
}
