use serde::{Deserialize, Serialize};

/// Neighbour search settings for the corner grid graph.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    pub k_neighbors: usize,
    pub orientation_tolerance_deg: f32,
    /// Candidates farther than this multiple of the closest accepted
    /// candidate are dropped. Keeps edges from jumping across gaps.
    pub max_distance_ratio: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 5.0,
            max_spacing_pix: 150.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
            max_distance_ratio: 1.5,
        }
    }
}

/// Parameters specific to the chessboard detector.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// ChESS candidates with a lower response are ignored.
    pub min_corner_strength: f32,

    pub graph: GridGraphParams,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            min_corner_strength: 0.0,
            graph: GridGraphParams::default(),
        }
    }
}
