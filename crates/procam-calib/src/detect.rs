use nalgebra::Point2;
use procam_chessboard::{refine_corners_subpix, ChessboardDetector, ChessboardParams};
use procam_core::{GrayImageView, GridSize, TermCriteria, WindowSize};

use crate::intake::PatternDetector;

/// Chessboard detection followed by gradient sub-pixel refinement.
#[derive(Clone, Debug)]
pub struct ChessboardPatternDetector {
    pub detector: ChessboardDetector,
    /// Stop rule for sub-pixel refinement.
    pub criteria: TermCriteria,
}

impl ChessboardPatternDetector {
    pub fn new(params: ChessboardParams, criteria: TermCriteria) -> Self {
        Self {
            detector: ChessboardDetector::new(params),
            criteria,
        }
    }
}

impl Default for ChessboardPatternDetector {
    fn default() -> Self {
        Self::new(ChessboardParams::default(), TermCriteria::default())
    }
}

impl PatternDetector for ChessboardPatternDetector {
    fn detect(
        &mut self,
        image: &GrayImageView<'_>,
        size: GridSize,
        window: WindowSize,
    ) -> Option<Vec<Point2<f64>>> {
        let mut corners = self.detector.detect(image, size)?;
        refine_corners_subpix(image, &mut corners, window, self.criteria);
        Some(corners)
    }
}
