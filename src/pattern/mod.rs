//! Planar chessboard geometry and the correspondences gathered from images.
//!
//! A [`PatternTemplate`] holds the board's inner corners on the `z = 0` plane in
//! units of one square. Every successful image contributes a [`Detection`] that
//! pairs the shared template with the pixel coordinates found in that image, and
//! the detections of one run are collected into a [`CalibrationSet`].

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PatternError {
    #[error("Pattern must have at least 2x2 inner corners, got {hcount}x{vcount}")]
    InvalidSize { hcount: usize, vcount: usize },
    #[error("Expected {expected} image points, got {found}")]
    PointCountMismatch { expected: usize, found: usize },
}

/// Number of inner corners along each axis of the chessboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternSize {
    /// Inner corners per row (along the board's x axis).
    pub hcount: usize,
    /// Inner corners per column (along the board's y axis).
    pub vcount: usize,
}

impl PatternSize {
    /// Creates a pattern size, rejecting boards with fewer than two corners on either axis.
    pub fn new(hcount: usize, vcount: usize) -> Result<Self, PatternError> {
        if hcount < 2 || vcount < 2 {
            return Err(PatternError::InvalidSize { hcount, vcount });
        }
        Ok(PatternSize { hcount, vcount })
    }

    pub fn point_count(&self) -> usize {
        self.hcount * self.vcount
    }

    /// Row-major index of the corner in column `i`, row `j`.
    pub fn index(&self, i: usize, j: usize) -> usize {
        j * self.hcount + i
    }
}

impl fmt::Display for PatternSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.hcount, self.vcount)
    }
}

/// Reference positions of the inner corners, row-major, on the `z = 0` plane.
///
/// Point `i` sits at `(i mod hcount, i div hcount, 0)`.
///
/// ```rust
/// use chessboard_calib::pattern::{PatternSize, PatternTemplate};
///
/// let template = PatternTemplate::new(PatternSize::new(3, 2).unwrap());
/// assert_eq!(template.len(), 6);
/// assert_eq!(template.points()[4].x, 1.0);
/// assert_eq!(template.points()[4].y, 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PatternTemplate {
    size: PatternSize,
    points: Vec<Vector3<f64>>,
}

impl PatternTemplate {
    pub fn new(size: PatternSize) -> Self {
        let points = (0..size.point_count())
            .map(|i| Vector3::new((i % size.hcount) as f64, (i / size.hcount) as f64, 0.0))
            .collect();
        PatternTemplate { size, points }
    }

    pub fn size(&self) -> PatternSize {
        self.size
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// The template paired with the pixel coordinates found in one image.
#[derive(Debug, Clone)]
pub struct Detection {
    image_index: usize,
    template: Arc<PatternTemplate>,
    image_points: Vec<Vector2<f64>>,
}

impl Detection {
    /// Pairs `image_points` with `template` by index.
    ///
    /// # Errors
    ///
    /// [`PatternError::PointCountMismatch`] when the two sequences differ in length.
    pub fn new(
        image_index: usize,
        template: Arc<PatternTemplate>,
        image_points: Vec<Vector2<f64>>,
    ) -> Result<Self, PatternError> {
        if image_points.len() != template.len() {
            return Err(PatternError::PointCountMismatch {
                expected: template.len(),
                found: image_points.len(),
            });
        }
        Ok(Detection {
            image_index,
            template,
            image_points,
        })
    }

    /// Index of the source image within the calibration batch.
    pub fn image_index(&self) -> usize {
        self.image_index
    }

    pub fn object_points(&self) -> &[Vector3<f64>] {
        self.template.points()
    }

    pub fn image_points(&self) -> &[Vector2<f64>] {
        &self.image_points
    }

    /// Iterates over `(object point, image point)` pairs.
    pub fn correspondences(&self) -> impl Iterator<Item = (&Vector3<f64>, &Vector2<f64>)> {
        self.template.points().iter().zip(self.image_points.iter())
    }

    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }
}

/// All detections collected during one calibration run.
///
/// Every detection shares the same [`PatternTemplate`].
#[derive(Debug, Clone)]
pub struct CalibrationSet {
    template: Arc<PatternTemplate>,
    detections: Vec<Detection>,
}

impl CalibrationSet {
    pub fn new(size: PatternSize) -> Self {
        CalibrationSet {
            template: Arc::new(PatternTemplate::new(size)),
            detections: Vec::new(),
        }
    }

    /// Adds the corners found in image `image_index`.
    pub fn push(
        &mut self,
        image_index: usize,
        image_points: Vec<Vector2<f64>>,
    ) -> Result<(), PatternError> {
        let detection = Detection::new(image_index, Arc::clone(&self.template), image_points)?;
        self.detections.push(detection);
        Ok(())
    }

    pub fn template(&self) -> &PatternTemplate {
        &self.template
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    /// Indices of the images that produced a detection, in insertion order.
    pub fn image_indices(&self) -> Vec<usize> {
        self.detections.iter().map(Detection::image_index).collect()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_size_validation() {
        assert!(PatternSize::new(9, 6).is_ok());
        assert_eq!(
            PatternSize::new(1, 6),
            Err(PatternError::InvalidSize {
                hcount: 1,
                vcount: 6
            })
        );
        assert!(PatternSize::new(9, 0).is_err());
    }

    #[test]
    fn test_template_layout() {
        let size = PatternSize::new(9, 6).unwrap();
        let template = PatternTemplate::new(size);

        assert_eq!(template.len(), 54);
        for (i, point) in template.points().iter().enumerate() {
            assert_eq!(point.x, (i % 9) as f64);
            assert_eq!(point.y, (i / 9) as f64);
            assert_eq!(point.z, 0.0);
        }
        assert_eq!(size.index(3, 2), 21);
        assert_eq!(template.points()[size.index(3, 2)], Vector3::new(3.0, 2.0, 0.0));
    }

    #[test]
    fn test_template_non_square() {
        let template = PatternTemplate::new(PatternSize::new(2, 5).unwrap());
        assert_eq!(template.len(), 10);
        assert_eq!(template.points()[9], Vector3::new(1.0, 4.0, 0.0));
    }

    #[test]
    fn test_set_shares_template() {
        let size = PatternSize::new(3, 2).unwrap();
        let mut set = CalibrationSet::new(size);
        let points: Vec<_> = (0..6).map(|i| Vector2::new(i as f64, 0.0)).collect();

        set.push(0, points.clone()).unwrap();
        set.push(4, points).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.image_indices(), vec![0, 4]);
        assert!(std::ptr::eq(
            set.detections()[0].object_points().as_ptr(),
            set.detections()[1].object_points().as_ptr()
        ));

        let (object, image) = set.detections()[1].correspondences().nth(5).unwrap();
        assert_eq!(*object, Vector3::new(2.0, 1.0, 0.0));
        assert_eq!(*image, Vector2::new(5.0, 0.0));
    }

    #[test]
    fn test_detection_rejects_wrong_count() {
        let mut set = CalibrationSet::new(PatternSize::new(3, 3).unwrap());
        let result = set.push(0, vec![Vector2::zeros(); 8]);
        assert_eq!(
            result,
            Err(PatternError::PointCountMismatch {
                expected: 9,
                found: 8
            })
        );
        assert!(set.is_empty());
    }
}
