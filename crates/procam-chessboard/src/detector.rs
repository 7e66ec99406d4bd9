use crate::gridgraph::{assign_grid_coordinates, connected_components, GridGraph};
use crate::params::ChessboardParams;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use log::debug;
use nalgebra::Point2;
use procam_core::{Corner, GrayImageView, GridCoords, GridSize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Chessboard detector: ChESS corners, neighbour graph, grid fitting.
#[derive(Clone, Debug, Default)]
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

/// Ordered grid for one matched component.
struct GridMatch {
    points: Vec<Point2<f64>>,
    strength: f32,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    /// ChESS corner candidates in `img`, weaker than
    /// `params.min_corner_strength` dropped.
    pub fn find_corners(&self, img: &GrayImageView<'_>) -> Vec<Corner> {
        let Some(buf) =
            image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data.to_vec())
        else {
            debug!("image buffer does not match {}x{}", img.width, img.height);
            return Vec::new();
        };
        let corners: Vec<Corner> = find_chess_corners_image(&buf, &default_chess_config())
            .iter()
            .map(adapt_chess_corner)
            .filter(|c| c.strength >= self.params.min_corner_strength)
            .collect();
        debug!("{} ChESS corners", corners.len());
        corners
    }

    /// Locate a `size` inner-corner chessboard in `img`.
    ///
    /// Returns `size.height` rows of `size.width` points, or `None` when no
    /// complete grid of that size is found.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, img), fields(width = img.width, height = img.height))
    )]
    pub fn detect(&self, img: &GrayImageView<'_>, size: GridSize) -> Option<Vec<Point2<f64>>> {
        let corners = self.find_corners(img);
        self.detect_from_corners(&corners, size)
    }

    /// Grid fitting over precomputed corners.
    pub fn detect_from_corners(
        &self,
        corners: &[Corner],
        size: GridSize,
    ) -> Option<Vec<Point2<f64>>> {
        if size.width == 0 || size.height == 0 || corners.len() < size.count() {
            debug!(
                "{} corners, need at least {} for a {} grid",
                corners.len(),
                size.count(),
                size
            );
            return None;
        }

        let graph = GridGraph::new(corners, &self.params.graph);
        let components = connected_components(&graph);

        let mut best: Option<GridMatch> = None;
        for component in components.iter().filter(|c| c.len() == size.count()) {
            let Some(coords) = assign_grid_coordinates(&graph, component) else {
                debug!("component of {} corners has inconsistent coordinates", component.len());
                continue;
            };
            let Some(found) = order_component(corners, &coords, size) else {
                continue;
            };
            if best.as_ref().is_none_or(|b| found.strength > b.strength) {
                best = Some(found);
            }
        }

        match best {
            Some(m) => {
                debug!("matched {} grid", size);
                Some(m.points)
            }
            None => {
                debug!(
                    "no {} grid among {} components (largest {})",
                    size,
                    components.len(),
                    components.iter().map(Vec::len).max().unwrap_or(0)
                );
                None
            }
        }
    }
}

/// ChESS settings used for every frame.
pub fn default_chess_config() -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = 0.2;
    cfg.params.nms_radius = 2;
    cfg
}

fn adapt_chess_corner(c: &CornerDescriptor) -> Corner {
    Corner {
        position: Point2::new(c.x, c.y),
        orientation: c.orientation,
        strength: c.response,
    }
}

/// Lay out a complete component row-major. A component whose extents are
/// swapped relative to `size` is read with `i` as the row index.
fn order_component(
    corners: &[Corner],
    coords: &[(usize, GridCoords)],
    size: GridSize,
) -> Option<GridMatch> {
    let cols = coords.iter().map(|(_, g)| g.i).max()? as usize + 1;
    let rows = coords.iter().map(|(_, g)| g.j).max()? as usize + 1;

    let transposed = if (cols, rows) == (size.width, size.height) {
        false
    } else if (rows, cols) == (size.width, size.height) {
        true
    } else {
        return None;
    };

    let mut slots: Vec<Option<Point2<f64>>> = vec![None; size.count()];
    let mut strength = 0.0;
    for &(node, g) in coords {
        let (col, row) = if transposed {
            (g.j as usize, g.i as usize)
        } else {
            (g.i as usize, g.j as usize)
        };
        let c = &corners[node];
        slots[row * size.width + col] = Some(Point2::new(c.position.x as f64, c.position.y as f64));
        strength += c.strength;
    }

    let points = slots.into_iter().collect::<Option<Vec<_>>>()?;
    Some(GridMatch { points, strength })
}
