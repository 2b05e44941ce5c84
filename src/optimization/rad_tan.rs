//! This module provides the cost function and optimization routines
//! for jointly refining a Radial-Tangential (RadTan) camera and the board
//! pose of every calibration view.
//!
//! It uses the `tiny_solver` crate for non-linear optimization. The camera is a
//! single 9-parameter block `[fx, fy, cx, cy, k1, k2, p1, p2, k3]` and each view
//! adds a 6-parameter block `[rx, ry, rz, tx, ty, tz]`.

use crate::camera::{CameraModel, Intrinsics, RadTanModel};
use crate::geometry::{rotate_axis_angle, ViewPose};
use crate::optimization::{Optimizer, SolverError};
use crate::pattern::CalibrationSet;

use log::info;
use nalgebra::{DMatrix, DVector, RealField, Vector2, Vector3};
use std::collections::HashMap;
use std::fmt;
use tiny_solver::factors::Factor;
use tiny_solver::{LevenbergMarquardtOptimizer, Optimizer as TinySolverOptimizer};

const INTRINSICS_KEY: &str = "intrinsics";

fn pose_key(view: usize) -> String {
    format!("pose{}", view)
}

/// Joint camera and pose refinement over every detection of a calibration run.
#[derive(Clone)]
pub struct RadTanOptimizationCost {
    /// The RadTan camera model to be optimized.
    model: RadTanModel,
    /// Board-to-camera pose of every view, in detection order.
    poses: Vec<ViewPose>,
    /// `(board point, observed pixel)` pairs, one vector per view.
    observations: Vec<Vec<(Vector3<f64>, Vector2<f64>)>>,
}

/// Reprojection residual of a single board corner for `tiny_solver`.
///
/// Parameter blocks are `[intrinsics, pose]`.
#[derive(Debug, Clone)]
struct RadTanReprojectionFactor {
    object: Vector3<f64>,
    observed: Vector2<f64>,
}

impl<T: RealField> Factor<T> for RadTanReprojectionFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let cam = &params[0];
        let pose = &params[1];

        let fx = cam[0].clone();
        let fy = cam[1].clone();
        let cx = cam[2].clone();
        let cy = cam[3].clone();
        let k1 = cam[4].clone();
        let k2 = cam[5].clone();
        let p1 = cam[6].clone();
        let p2 = cam[7].clone();
        let k3 = cam[8].clone();

        let omega = Vector3::new(pose[0].clone(), pose[1].clone(), pose[2].clone());
        let translation = Vector3::new(pose[3].clone(), pose[4].clone(), pose[5].clone());

        let object: Vector3<T> = self.object.map(nalgebra::convert);
        let pc = rotate_axis_angle(&omega, &object) + translation;

        let x = pc.x.clone() / pc.z.clone();
        let y = pc.y.clone() / pc.z.clone();

        let one = T::one();
        let two: T = nalgebra::convert(2.0);

        let r2 = x.clone() * x.clone() + y.clone() * y.clone();
        let r4 = r2.clone() * r2.clone();
        let r6 = r4.clone() * r2.clone();
        let radial = one + k1 * r2.clone() + k2 * r4 + k3 * r6;

        let xy = x.clone() * y.clone();
        let x_distorted = x.clone() * radial.clone()
            + two.clone() * p1.clone() * xy.clone()
            + p2.clone() * (r2.clone() + two.clone() * x.clone() * x);
        let y_distorted = y.clone() * radial
            + p1 * (r2 + two.clone() * y.clone() * y)
            + two * p2 * xy;

        let u = fx * x_distorted + cx;
        let v = fy * y_distorted + cy;

        let observed_u: T = nalgebra::convert(self.observed.x);
        let observed_v: T = nalgebra::convert(self.observed.y);

        DVector::from_vec(vec![u - observed_u, v - observed_v])
    }
}

impl RadTanOptimizationCost {
    /// Creates a new optimization problem from an initial model and one pose per detection.
    ///
    /// # Errors
    ///
    /// [`SolverError::PoseCountMismatch`] when `poses` and `set` differ in length.
    pub fn new(
        model: RadTanModel,
        set: &CalibrationSet,
        poses: Vec<ViewPose>,
    ) -> Result<Self, SolverError> {
        if poses.len() != set.len() {
            return Err(SolverError::PoseCountMismatch {
                expected: set.len(),
                found: poses.len(),
            });
        }
        let observations = set
            .detections()
            .iter()
            .map(|d| d.correspondences().map(|(o, i)| (*o, *i)).collect())
            .collect();
        Ok(Self {
            model,
            poses,
            observations,
        })
    }

    /// Returns a reference to the camera model (optimized once `optimize` succeeded).
    pub fn get_model(&self) -> &RadTanModel {
        &self.model
    }

    pub fn get_poses(&self) -> &[ViewPose] {
        &self.poses
    }

    pub fn into_parts(self) -> (RadTanModel, Vec<ViewPose>) {
        (self.model, self.poses)
    }

    fn num_points(&self) -> usize {
        self.observations.iter().map(Vec::len).sum()
    }
}

impl fmt::Debug for RadTanOptimizationCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RadTanOptimizationCost Summary:\n model: {:?}\n views: {}, points: {} ",
            self.model,
            self.poses.len(),
            self.num_points(),
        )
    }
}

impl Optimizer for RadTanOptimizationCost {
    /// Refines all camera parameters and view poses with Levenberg-Marquardt.
    ///
    /// # Errors
    ///
    /// * [`SolverError::NotEnoughViews`] without observations.
    /// * [`SolverError::OptimizationFailed`] if `tiny_solver` gives up or a
    ///   parameter block is missing from its result.
    /// * [`SolverError::Camera`] if the refined parameters are invalid.
    fn optimize(&mut self, verbose: bool) -> Result<(), SolverError> {
        if self.observations.is_empty() || self.num_points() == 0 {
            return Err(SolverError::NotEnoughViews {
                required: 1,
                found: 0,
            });
        }

        if verbose {
            info!("Starting RadTan bundle adjustment...");
            info!("Initial model: {:?}", self.model);
            info!(
                "Views: {}, point correspondences: {}",
                self.poses.len(),
                self.num_points()
            );
        }

        let mut problem = tiny_solver::Problem::new();
        let mut initial_values = HashMap::new();
        initial_values.insert(INTRINSICS_KEY.to_string(), self.model.parameters());

        for (view, (pose, observations)) in self.poses.iter().zip(&self.observations).enumerate() {
            let key = pose_key(view);
            initial_values.insert(key.clone(), DVector::from_vec(pose.to_vec()));

            for (object, observed) in observations {
                let factor = RadTanReprojectionFactor {
                    object: *object,
                    observed: *observed,
                };
                problem.add_residual_block(2, &[INTRINSICS_KEY, key.as_str()], Box::new(factor), None);
            }
        }

        let optimizer = LevenbergMarquardtOptimizer::default();

        let result = optimizer
            .optimize(&problem, &initial_values, None)
            .ok_or_else(|| SolverError::OptimizationFailed("Optimization failed".to_string()))?;

        if verbose {
            info!("RadTan bundle adjustment finished");
        }

        let optimized_params = result.get(INTRINSICS_KEY).ok_or_else(|| {
            SolverError::OptimizationFailed("missing camera parameters in solution".to_string())
        })?;
        let model = RadTanModel::new(optimized_params, self.model.resolution)?;

        let mut poses = Vec::with_capacity(self.poses.len());
        for view in 0..self.poses.len() {
            let pose = result
                .get(&pose_key(view))
                .and_then(|values| ViewPose::from_slice(values.as_slice()))
                .ok_or_else(|| {
                    SolverError::OptimizationFailed(format!("missing pose {} in solution", view))
                })?;
            poses.push(pose);
        }

        self.model = model;
        self.poses = poses;

        if verbose {
            info!("Optimized RadTan model: {:?}", self.model);
        }

        Ok(())
    }

    /// Estimates `k1` and `k2` by linear least squares with the intrinsics and
    /// poses held fixed; the remaining coefficients are reset to zero.
    fn linear_estimation(&mut self) -> Result<(), SolverError> {
        let n_points = self.num_points();
        if n_points == 0 {
            return Err(SolverError::NotEnoughPoints {
                required: 2,
                found: 0,
            });
        }

        let Intrinsics { fx, fy, cx, cy } = self.model.intrinsics.clone();
        let mut a = DMatrix::zeros(n_points * 2, 2);
        let mut b = DVector::zeros(n_points * 2);

        let mut row = 0;
        for (pose, observations) in self.poses.iter().zip(&self.observations) {
            for (object, observed) in observations {
                let pc = pose.transform(object);
                let x = pc.x / pc.z;
                let y = pc.y / pc.z;
                let r2 = x * x + y * y;

                let du = fx * x;
                let dv = fy * y;

                a[(row, 0)] = du * r2;
                a[(row, 1)] = du * r2 * r2;
                b[row] = observed.x - (du + cx);
                a[(row + 1, 0)] = dv * r2;
                a[(row + 1, 1)] = dv * r2 * r2;
                b[row + 1] = observed.y - (dv + cy);
                row += 2;
            }
        }

        let svd = a.svd(true, true);
        let coeffs = svd
            .solve(&b, 1e-10)
            .map_err(|e| SolverError::DegenerateConfiguration(e.to_string()))?;

        self.model.distortions = [coeffs[0], coeffs[1], 0.0, 0.0, 0.0];
        self.model.validate_params()?;
        Ok(())
    }
}
