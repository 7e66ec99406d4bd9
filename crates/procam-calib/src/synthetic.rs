//! Synthetic planar scenes for tests and benchmarks.
//!
//! Boards are posed in front of a known camera, optionally observed through a
//! projector rigidly mounted next to it. Pixel noise is deterministic so
//! datasets are identical across runs and platforms.

use nalgebra::{Point2, Point3, Rotation3, Vector2, Vector3};
use procam_core::{object_points, projector_points, GridSize, ImageSize, PatternKind};

use crate::backproject::back_project_to_plane;
use crate::camera::{CameraModel, Distortion, Intrinsics, Pose};
use crate::correspondence::{CorrespondenceSet, FrameCorrespondence};
use crate::pipeline::PipelineError;

/// `n` board poses looking at the board centre from `distance` to
/// `distance + depth_range`, tilted by up to `tilt` radians.
pub fn board_poses(
    n: usize,
    board_centre: Point3<f64>,
    distance: f64,
    depth_range: f64,
    tilt: f64,
) -> Vec<Pose> {
    (0..n)
        .map(|k| {
            let kf = k as f64;
            let rvec = Vector3::new(
                tilt * (0.9 * kf + 0.3).sin(),
                tilt * (1.3 * kf + 0.7).cos(),
                0.3 * tilt * (0.5 * kf).sin(),
            );
            let rotation = Rotation3::from_scaled_axis(rvec);
            let z = if n > 1 {
                distance + depth_range * kf / (n - 1) as f64
            } else {
                distance
            };
            let tvec = Vector3::new(0.0, 0.0, z) - rotation * board_centre.coords;
            Pose::new(rvec, tvec)
        })
        .collect()
}

/// Project `points` under every pose.
pub fn project_views(
    camera: &CameraModel,
    poses: &[Pose],
    points: &[Point3<f64>],
) -> Vec<Vec<Point2<f64>>> {
    poses
        .iter()
        .map(|pose| points.iter().map(|p| camera.project(pose, p)).collect())
        .collect()
}

#[inline]
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[inline]
fn unit(x: u64) -> f64 {
    (x >> 11) as f64 / (1u64 << 53) as f64
}

/// Uniform pixel noise in `[-amplitude, amplitude]` per axis, keyed by
/// `(seed, view, point)`.
pub fn add_pixel_noise(views: &mut [Vec<Point2<f64>>], amplitude: f64, seed: u64) {
    for (v, points) in views.iter_mut().enumerate() {
        for (i, p) in points.iter_mut().enumerate() {
            let key = seed
                ^ (v as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
                ^ (i as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            let du = unit(splitmix64(key)) - 0.5;
            let dv = unit(splitmix64(key ^ 0x94D0_49BB_1331_11EB)) - 0.5;
            *p += Vector2::new(du, dv) * (2.0 * amplitude);
        }
    }
}

/// A camera/projector pair observing a moving chessboard.
#[derive(Clone, Debug)]
pub struct ProCamScene {
    pub camera: CameraModel,
    pub camera_size: ImageSize,
    pub camera_pattern: GridSize,
    pub camera_square: f64,
    pub projector: CameraModel,
    pub projector_size: ImageSize,
    pub projector_pattern: GridSize,
    pub projector_square: f64,
    /// Camera frame to projector frame.
    pub projector_from_camera: Pose,
}

impl Default for ProCamScene {
    fn default() -> Self {
        Self {
            camera: CameraModel::new(
                Intrinsics::new(800.0, 800.0, 320.0, 240.0),
                Distortion::default(),
            ),
            camera_size: ImageSize::new(640, 480),
            camera_pattern: GridSize::new(13, 9),
            camera_square: 50.0,
            projector: CameraModel::new(
                Intrinsics::new(1400.0, 1400.0, 512.0, 384.0),
                Distortion::default(),
            ),
            projector_size: ImageSize::new(1024, 768),
            projector_pattern: GridSize::new(9, 6),
            projector_square: 80.0,
            projector_from_camera: Pose::new(
                Vector3::new(0.0, 0.1, 0.0),
                Vector3::new(-150.0, 0.0, 0.0),
            ),
        }
    }
}

impl ProCamScene {
    /// Board corners, as generated for calibration.
    pub fn board_points(&self) -> Vec<Point3<f64>> {
        object_points(PatternKind::Chessboard, self.camera_pattern, self.camera_square)
    }

    pub fn pattern_points(&self) -> Vec<Point2<f64>> {
        projector_points(
            PatternKind::Chessboard,
            self.projector_pattern,
            self.projector_square,
        )
    }

    /// Board poses in front of the camera.
    pub fn camera_poses(&self, n: usize) -> Vec<Pose> {
        let pts = self.board_points();
        let centre = pts
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords)
            / pts.len().max(1) as f64;
        board_poses(n, Point3::from(centre), 1300.0, 500.0, 0.35)
    }

    /// Board to projector, given board to camera.
    pub fn projector_pose(&self, camera_pose: &Pose) -> Pose {
        let r_pc = self.projector_from_camera.rotation();
        let rotation = r_pc * camera_pose.rotation();
        let tvec = r_pc * camera_pose.tvec + self.projector_from_camera.tvec;
        Pose::from_rotation(&rotation, tvec)
    }

    /// Correspondences for `poses`: board corners and the projected pattern
    /// as the camera sees them, plus where the pattern lands on the board.
    pub fn correspondences(
        &self,
        poses: &[Pose],
    ) -> Result<(CorrespondenceSet, Vec<Vec<Point3<f64>>>), PipelineError> {
        let board = self.board_points();
        let pattern = self.pattern_points();
        let projector_poses: Vec<Pose> = poses.iter().map(|p| self.projector_pose(p)).collect();
        let on_board = back_project_to_plane(
            &self.projector.intrinsics,
            &projector_poses,
            &vec![pattern.clone(); poses.len()],
        )?;

        let mut set = CorrespondenceSet::new();
        for (pose, lit) in poses.iter().zip(&on_board) {
            let frame = FrameCorrespondence {
                camera_object: board.clone(),
                camera_image: board.iter().map(|p| self.camera.project(pose, p)).collect(),
                projector_pattern: pattern.clone(),
                projector_image: lit.iter().map(|p| self.camera.project(pose, p)).collect(),
            };
            set.push(frame).map_err(PipelineError::Camera)?;
        }
        Ok((set, on_board))
    }
}
