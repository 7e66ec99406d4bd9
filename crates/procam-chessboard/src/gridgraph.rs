use std::collections::{HashMap, HashSet, VecDeque};

use crate::geom::{angle_diff_abs, axis_vec_diff, is_orthogonal};
use crate::params::GridGraphParams;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use procam_core::{Corner, GridCoords};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    fn slot(self) -> usize {
        match self {
            Self::Right => 0,
            Self::Left => 1,
            Self::Up => 2,
            Self::Down => 3,
        }
    }

    /// Grid step `(di, dj)` taken when following this edge.
    pub fn step(self) -> (i32, i32) {
        match self {
            Self::Right => (1, 0),
            Self::Left => (-1, 0),
            Self::Up => (0, -1),
            Self::Down => (0, 1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

fn direction_quadrant(vec_to_neighbor: &Vector2<f32>) -> NeighborDirection {
    if vec_to_neighbor.x.abs() > vec_to_neighbor.y.abs() {
        if vec_to_neighbor.x >= 0.0 {
            NeighborDirection::Right
        } else {
            NeighborDirection::Left
        }
    } else if vec_to_neighbor.y >= 0.0 {
        NeighborDirection::Down
    } else {
        NeighborDirection::Up
    }
}

fn is_good_neighbor(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
) -> Option<NodeNeighbor> {
    let tol = params.orientation_tolerance_deg.to_radians();

    // Adjacent chessboard corners have orthogonal bright diagonals.
    if !is_orthogonal(corner.orientation, neighbor.orientation, tol) {
        return None;
    }

    let vec_to_neighbor = neighbor.position - corner.position;
    let distance = vec_to_neighbor.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    // The edge runs along a grid axis, i.e. at 45° to both diagonals.
    let edge_angle = vec_to_neighbor.y.atan2(vec_to_neighbor.x);
    let expected = std::f32::consts::FRAC_PI_4;
    let score_corner = (axis_vec_diff(corner.orientation, edge_angle) - expected).abs();
    let score_neighbor = (axis_vec_diff(neighbor.orientation, edge_angle) - expected).abs();
    if score_corner > tol || score_neighbor > tol {
        return None;
    }

    let score_orientation = (std::f32::consts::FRAC_PI_2
        - angle_diff_abs(corner.orientation, neighbor.orientation))
    .abs();

    Some(NodeNeighbor {
        direction: direction_quadrant(&vec_to_neighbor),
        index: neighbor_index,
        distance,
        score: score_corner + score_neighbor + score_orientation,
    })
}

/// Drop far candidates, then keep the closest one per direction.
fn select_neighbors(mut candidates: Vec<NodeNeighbor>, max_ratio: f32) -> Vec<NodeNeighbor> {
    let Some(nearest) = candidates
        .iter()
        .map(|c| c.distance)
        .min_by(|a, b| a.total_cmp(b))
    else {
        return Vec::new();
    };
    candidates.retain(|c| c.distance <= max_ratio * nearest);

    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];
    for candidate in candidates {
        let slot = &mut best[candidate.direction.slot()];
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.distance < current.distance
                    || (candidate.distance == current.distance && candidate.score < current.score)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

/// 4-connected neighbour graph over detected corners.
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams) -> Self {
        let mut tree: KdTree<f32, 2> = KdTree::with_capacity(corners.len().max(1));
        for (i, c) in corners.iter().enumerate() {
            tree.add(&[c.position.x, c.position.y], i as u64);
        }
        let radius_sq = params.max_spacing_pix * params.max_spacing_pix;

        let mut neighbors = Vec::with_capacity(corners.len());
        for (i, corner) in corners.iter().enumerate() {
            let query = [corner.position.x, corner.position.y];
            let mut found = tree.within_unsorted::<SquaredEuclidean>(&query, radius_sq);
            found.sort_by(|a, b| a.distance.total_cmp(&b.distance));

            let candidates = found
                .into_iter()
                .map(|nn| nn.item as usize)
                .filter(|&j| j != i)
                .take(params.k_neighbors)
                .filter_map(|j| is_good_neighbor(corner, &corners[j], j, params))
                .collect();

            neighbors.push(select_neighbors(candidates, params.max_distance_ratio));
        }

        // Keep mutual edges only.
        let edges: HashSet<(usize, usize)> = neighbors
            .iter()
            .enumerate()
            .flat_map(|(i, ns)| ns.iter().map(move |n| (i, n.index)))
            .collect();
        for (i, ns) in neighbors.iter_mut().enumerate() {
            ns.retain(|n| edges.contains(&(n.index, i)));
        }

        Self { neighbors }
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// BFS integer coordinates for a component, normalised so the minimum is
/// `(0, 0)`. Returns `None` when two corners land on the same cell or an
/// edge contradicts the assignment.
pub fn assign_grid_coordinates(
    graph: &GridGraph,
    component: &[usize],
) -> Option<Vec<(usize, GridCoords)>> {
    let start = *component.first()?;
    let mut coords: HashMap<usize, (i32, i32)> = HashMap::with_capacity(component.len());
    let mut queue = VecDeque::new();
    coords.insert(start, (0, 0));
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        let (i, j) = coords[&node];
        for neighbor in &graph.neighbors[node] {
            let (di, dj) = neighbor.direction.step();
            let expected = (i + di, j + dj);
            match coords.get(&neighbor.index) {
                Some(&seen) if seen != expected => return None,
                Some(_) => {}
                None => {
                    coords.insert(neighbor.index, expected);
                    queue.push_back(neighbor.index);
                }
            }
        }
    }

    let min_i = coords.values().map(|c| c.0).min()?;
    let min_j = coords.values().map(|c| c.1).min()?;
    let mut cells = HashSet::with_capacity(coords.len());
    let mut out = Vec::with_capacity(coords.len());
    for &node in component {
        let (i, j) = *coords.get(&node)?;
        let g = GridCoords {
            i: i - min_i,
            j: j - min_j,
        };
        if !cells.insert(g) {
            return None;
        }
        out.push((node, g));
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use std::f32::consts::FRAC_PI_4;

    fn make_corner(x: f32, y: f32, orientation: f32) -> Corner {
        Corner {
            position: Point2::new(x, y),
            orientation,
            strength: 1.0,
        }
    }

    fn lattice(cols: usize, rows: usize, spacing: f32, x0: f32) -> Vec<Corner> {
        let mut corners = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                let orientation = if (i + j) % 2 == 0 {
                    FRAC_PI_4
                } else {
                    3.0 * FRAC_PI_4
                };
                corners.push(make_corner(
                    x0 + i as f32 * spacing,
                    j as f32 * spacing,
                    orientation,
                ));
            }
        }
        corners
    }

    fn neighbor_map(neighbors: &[NodeNeighbor]) -> HashMap<NeighborDirection, &NodeNeighbor> {
        neighbors.iter().map(|n| (n.direction, n)).collect()
    }

    fn params() -> GridGraphParams {
        GridGraphParams {
            min_spacing_pix: 5.0,
            max_spacing_pix: 15.0,
            ..Default::default()
        }
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let spacing = 10.0;
        let cols = 3;
        let corners = lattice(cols, 3, spacing, 0.0);
        let graph = GridGraph::new(&corners, &params());

        let idx = |i: usize, j: usize| j * cols + i;

        let center = neighbor_map(&graph.neighbors[idx(1, 1)]);
        assert_eq!(4, center.len());
        assert_eq!(idx(0, 1), center[&NeighborDirection::Left].index);
        assert_eq!(idx(2, 1), center[&NeighborDirection::Right].index);
        assert_eq!(idx(1, 0), center[&NeighborDirection::Up].index);
        assert_eq!(idx(1, 2), center[&NeighborDirection::Down].index);
        for n in center.values() {
            assert!((n.distance - spacing).abs() < 1e-4);
        }

        let top_left = neighbor_map(&graph.neighbors[idx(0, 0)]);
        assert_eq!(2, top_left.len());
        assert!(top_left.contains_key(&NeighborDirection::Right));
        assert!(top_left.contains_key(&NeighborDirection::Down));
    }

    #[test]
    fn rejects_neighbors_when_orientation_relation_invalid() {
        let corners = vec![
            make_corner(0.0, 0.0, FRAC_PI_4),
            make_corner(10.0, 0.0, FRAC_PI_4),
        ];
        let graph = GridGraph::new(&corners, &params());
        assert!(graph.neighbors[0].is_empty());
        assert!(graph.neighbors[1].is_empty());
    }

    #[test]
    fn rejects_neighbors_outside_distance_window() {
        let corners = vec![
            make_corner(0.0, 0.0, FRAC_PI_4),
            make_corner(30.0, 0.0, 3.0 * FRAC_PI_4),
        ];
        let graph = GridGraph::new(&corners, &params());
        assert!(graph.neighbors[0].is_empty());
        assert!(graph.neighbors[1].is_empty());
    }

    #[test]
    fn keeps_nearest_candidate_per_direction() {
        let corners = vec![
            make_corner(0.0, 0.0, FRAC_PI_4),
            make_corner(10.0, 0.0, 3.0 * FRAC_PI_4),
            make_corner(12.0, 1.0, 3.0 * FRAC_PI_4),
            make_corner(-10.0, 0.0, 3.0 * FRAC_PI_4),
        ];
        let graph = GridGraph::new(&corners, &params());

        let map = neighbor_map(&graph.neighbors[0]);
        assert_eq!(2, map.len());
        assert_eq!(1, map[&NeighborDirection::Right].index);
        assert_eq!(3, map[&NeighborDirection::Left].index);
    }

    #[test]
    fn far_candidates_do_not_bridge_gaps() {
        // Two 2x2 lattices separated by four spacings.
        let mut corners = lattice(2, 2, 10.0, 0.0);
        corners.extend(lattice(2, 2, 10.0, 50.0));
        let graph = GridGraph::new(
            &corners,
            &GridGraphParams {
                max_spacing_pix: 60.0,
                ..params()
            },
        );
        let components = connected_components(&graph);
        assert_eq!(components.len(), 2);
        assert!(components.iter().all(|c| c.len() == 4));
    }

    #[test]
    fn coordinates_are_row_major_from_top_left() {
        let cols = 4;
        let corners = lattice(cols, 3, 10.0, 0.0);
        let graph = GridGraph::new(&corners, &params());
        let components = connected_components(&graph);
        assert_eq!(components.len(), 1);

        let coords = assign_grid_coordinates(&graph, &components[0]).expect("consistent");
        assert_eq!(coords.len(), 12);
        for (node, g) in coords {
            assert_eq!(node, g.j as usize * cols + g.i as usize);
        }
    }
}
