use crate::detection::lattice::{order_corners, LatticeCorner, LatticeParams};
use crate::detection::{DetectionError, PatternDetector};
use crate::pattern::PatternSize;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use image::GrayImage;
use log::debug;
use nalgebra::Vector2;

/// Single-scale ChESS settings tuned for printed chessboards.
pub fn default_chess_config() -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = 0.2;
    cfg.params.nms_radius = 2;
    cfg
}

/// ChESS X-corner detection followed by lattice ordering.
pub struct ChessboardDetector {
    chess: ChessConfig,
    lattice: LatticeParams,
}

impl ChessboardDetector {
    pub fn new() -> Self {
        Self::with_config(default_chess_config())
    }

    pub fn with_config(chess: ChessConfig) -> Self {
        ChessboardDetector {
            chess,
            lattice: LatticeParams::default(),
        }
    }

    pub fn with_lattice_params(mut self, lattice: LatticeParams) -> Self {
        self.lattice = lattice;
        self
    }

    /// Raw X-corner candidates, unordered.
    pub fn detect_corners(&self, image: &GrayImage) -> Vec<LatticeCorner> {
        find_chess_corners_image(image, &self.chess)
            .iter()
            .map(adapt_chess_corner)
            .collect()
    }
}

impl Default for ChessboardDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn adapt_chess_corner(c: &CornerDescriptor) -> LatticeCorner {
    LatticeCorner::new(f64::from(c.x), f64::from(c.y), f64::from(c.response))
}

impl PatternDetector for ChessboardDetector {
    fn find_corners(
        &self,
        image: &GrayImage,
        pattern: PatternSize,
    ) -> Result<Option<Vec<Vector2<f64>>>, DetectionError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectionError::EmptyImage { width, height });
        }

        let corners = self.detect_corners(image);
        debug!("ChESS found {} corner candidates", corners.len());
        Ok(order_corners(&corners, pattern, &self.lattice))
    }
}
