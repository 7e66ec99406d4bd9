//! Lift image points onto the `z = 0` board plane of each view.

use nalgebra::{Point2, Point3, Vector3};

use crate::camera::{Intrinsics, Pose};

/// Rays closer than this to parallel with the board plane are rejected.
const MIN_RAY_Z: f64 = 1e-12;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BackprojectError {
    #[error("{poses} poses but {frames} point lists")]
    FrameCountMismatch { poses: usize, frames: usize },
    #[error("frame {frame}, point {point}: viewing ray is parallel to the board plane")]
    DegenerateGeometry { frame: usize, point: usize },
    #[error("camera matrix is not invertible")]
    SingularIntrinsics,
}

/// Intersect the viewing ray of every pixel with the board plane of its view.
///
/// Uses the pinhole part of the model only; observations are taken to be
/// undistorted. Output is aligned one-to-one with `image_points` and every
/// point has `z == 0.0` exactly.
pub fn back_project_to_plane(
    intrinsics: &Intrinsics,
    poses: &[Pose],
    image_points: &[Vec<Point2<f64>>],
) -> Result<Vec<Vec<Point3<f64>>>, BackprojectError> {
    if poses.len() != image_points.len() {
        return Err(BackprojectError::FrameCountMismatch {
            poses: poses.len(),
            frames: image_points.len(),
        });
    }
    let k_inv = intrinsics
        .inverse_matrix()
        .ok_or(BackprojectError::SingularIntrinsics)?;

    poses
        .iter()
        .zip(image_points)
        .enumerate()
        .map(|(frame, (pose, points))| {
            let r_inv = pose.rotation().inverse();
            // Camera centre, negated, in board coordinates.
            let plane_to_cam = r_inv * pose.tvec;
            points
                .iter()
                .enumerate()
                .map(|(point, p)| {
                    let ray = r_inv * (k_inv * Vector3::new(p.x, p.y, 1.0));
                    if ray.z.abs() < MIN_RAY_Z {
                        return Err(BackprojectError::DegenerateGeometry { frame, point });
                    }
                    let s = plane_to_cam.z / ray.z;
                    let w = ray * s - plane_to_cam;
                    Ok(Point3::new(w.x, w.y, 0.0))
                })
                .collect()
        })
        .collect()
}
