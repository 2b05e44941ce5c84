//! Chessboard Camera Calibration Library
//!
//! Estimates the intrinsic matrix and the radial-tangential distortion of a
//! camera from images of a planar chessboard, and removes that distortion from
//! further images taken with the same camera.
//!
//! The pipeline is split into:
//! - corner detection with the ChESS X-corner detector and lattice ordering
//! - closed-form initialisation (homographies, Zhang's method, board poses)
//! - joint refinement of the camera and all board poses with the tiny-solver
//!   Levenberg-Marquardt optimizer
//! - undistortion by bilinear remapping
//!
//! [`Calibrator`] ties these together.

pub mod calibrator;
pub mod camera;
pub mod detection;
pub mod geometry;
pub mod optimization;
pub mod pattern;
pub mod undistort;

// Re-export commonly used types
pub use calibrator::{CalibrationError, CalibrationReport, Calibrator, CalibratorBuilder};

pub use camera::{CameraModel, CameraModelError, Intrinsics, PinholeModel, RadTanModel, Resolution};

pub use detection::{ChessboardDetector, DetectionError, PatternDetector};

pub use geometry::{ProjectionError, ViewPose};

pub use optimization::{
    CameraSolver, Optimizer, PlanarSolver, RadTanOptimizationCost, SolvedCamera, SolverError,
};

pub use pattern::{CalibrationSet, PatternError, PatternSize};

pub use undistort::UndistortMap;
