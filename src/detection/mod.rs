//! Chessboard corner detection.
//!
//! A [`PatternDetector`] locates the inner corners of a chessboard in a grayscale
//! image and returns them in the row-major order of [`PatternSize`]: row `j`,
//! column `i` maps to index `j * hcount + i`. The default implementation is
//! [`ChessboardDetector`], which runs the ChESS X-corner response from
//! `chess_corners` and orders the responses with [`lattice::order_corners`].

use crate::pattern::PatternSize;
use image::GrayImage;
use nalgebra::Vector2;

pub mod chessboard;
pub mod lattice;

pub use chessboard::ChessboardDetector;
pub use lattice::{LatticeCorner, LatticeParams};

#[derive(thiserror::Error, Debug)]
pub enum DetectionError {
    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("Detector returned {found} corners for a pattern of {expected}")]
    WrongPointCount { expected: usize, found: usize },
    #[error("Corner detection failed: {0}")]
    Failed(String),
}

/// Finds the inner corners of a chessboard pattern.
///
/// `Ok(None)` means the full pattern is not visible in the image. `Ok(Some(points))`
/// must hold exactly `pattern.point_count()` pixel positions in row-major order.
pub trait PatternDetector {
    fn find_corners(
        &self,
        image: &GrayImage,
        pattern: PatternSize,
    ) -> Result<Option<Vec<Vector2<f64>>>, DetectionError>;
}

impl<F> PatternDetector for F
where
    F: Fn(&GrayImage, PatternSize) -> Result<Option<Vec<Vector2<f64>>>, DetectionError>,
{
    fn find_corners(
        &self,
        image: &GrayImage,
        pattern: PatternSize,
    ) -> Result<Option<Vec<Vector2<f64>>>, DetectionError> {
        self(image, pattern)
    }
}
