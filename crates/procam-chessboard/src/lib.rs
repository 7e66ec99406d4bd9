//! Chessboard detection for planar calibration targets.
//!
//! Pipeline:
//! 1. ChESS corners and their orientations from `chess-corners`.
//! 2. Weak candidates dropped by `min_corner_strength`.
//! 3. Neighbour graph: orthogonal orientations, edges at 45° to both corners,
//!    nearest candidate per image direction, mutual edges only.
//! 4. BFS each connected component into integer `(i, j)` coordinates.
//! 5. Keep the complete component whose extents match the requested grid.
//!
//! [`refine_corners_subpix`] then polishes the detected points with the
//! gradient-orthogonality method.

mod detector;
mod geom;
mod gridgraph;
mod params;
mod subpix;

pub use detector::{default_chess_config, ChessboardDetector};
pub use gridgraph::{
    assign_grid_coordinates, connected_components, GridGraph, NeighborDirection, NodeNeighbor,
};
pub use params::{ChessboardParams, GridGraphParams};
pub use subpix::{refine_corner_subpix, refine_corners_subpix};
