use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Canonical 2D corner produced by the ChESS detector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Corner {
    /// Corner position in pixel coordinates.
    pub position: Point2<f32>,

    /// Direction of the bright diagonal at the corner, in radians.
    ///
    /// Defined modulo π because chessboard diagonals are undirected. Two
    /// corners adjacent along a row or column have orthogonal orientations.
    pub orientation: f32,

    /// ChESS response at the corner.
    pub strength: f32,
}

/// Integer grid coordinates (i, j) in board space: `i` along a row, `j` down a column.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GridCoords {
    pub i: i32,
    pub j: i32,
}
