//! Reference coordinates for the camera and projector calibration targets.

use std::fmt;

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Calibration target family, encoded as `0`, `1` or `2` in settings files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum PatternKind {
    #[default]
    Chessboard,
    CirclesGrid,
    AsymmetricCirclesGrid,
}

impl TryFrom<i64> for PatternKind {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Chessboard),
            1 => Ok(Self::CirclesGrid),
            2 => Ok(Self::AsymmetricCirclesGrid),
            other => Err(format!("unknown pattern type {other}")),
        }
    }
}

impl From<PatternKind> for i64 {
    fn from(kind: PatternKind) -> Self {
        match kind {
            PatternKind::Chessboard => 0,
            PatternKind::CirclesGrid => 1,
            PatternKind::AsymmetricCirclesGrid => 2,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chessboard => "chessboard",
            Self::CirclesGrid => "circles grid",
            Self::AsymmetricCirclesGrid => "asymmetric circles grid",
        };
        f.write_str(name)
    }
}

/// Inner-corner counts: `width` corners per row, `height` rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub width: usize,
    pub height: usize,
}

impl GridSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.width * self.height
    }
}

impl fmt::Display for GridSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn has_point_layout(kind: PatternKind) -> bool {
    matches!(kind, PatternKind::Chessboard | PatternKind::CirclesGrid)
}

/// Camera-side board coordinates: `(i*S, j*S, 0)` for row `i` and column `j`,
/// both zero-based, rows outer.
///
/// The asymmetric circles grid has no layout and yields an empty list.
pub fn object_points(kind: PatternKind, size: GridSize, square: f64) -> Vec<Point3<f64>> {
    if !has_point_layout(kind) {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(size.count());
    for i in 0..size.height {
        for j in 0..size.width {
            out.push(Point3::new(i as f64 * square, j as f64 * square, 0.0));
        }
    }
    out
}

/// Projector-side pattern pixels: `(j*S, i*S)` for row `i` in `1..=H` and
/// column `j` in `1..=W`, rows outer.
///
/// Indices are one-based and the axes swapped relative to [`object_points`];
/// projector calibration results depend on this layout.
pub fn projector_points(kind: PatternKind, size: GridSize, square: f64) -> Vec<Point2<f64>> {
    if !has_point_layout(kind) {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(size.count());
    for i in 1..=size.height {
        for j in 1..=size.width {
            out.push(Point2::new(j as f64 * square, i as f64 * square));
        }
    }
    out
}
