use levenberg_marquardt::LeastSquaresProblem;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn, Point2, Point3, Vector3};
use procam_core::{estimate_homography, ImageSize, TermCriteria};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::camera::{CameraModel, Distortion, Intrinsics, Pose};
use crate::init::{initial_intrinsics, pose_from_homography};
use crate::lm::{minimize, LmError};

/// `fx, fy, cx, cy, k1, k2, p1, p2, k3`
const INTRINSIC_PARAMS: usize = 9;
/// `rvec, tvec`
const POSE_PARAMS: usize = 6;
const BLOCK: usize = INTRINSIC_PARAMS + POSE_PARAMS;
const MIN_POINTS_PER_VIEW: usize = 4;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("no frames to calibrate from")]
    NoFrames,
    #[error("{object} object point lists but {image} image point lists")]
    MismatchedFrames { object: usize, image: usize },
    #[error("frame {frame}: object and image point counts differ")]
    MismatchedPointCounts { frame: usize },
    #[error("frame {frame}: at least 4 points are required")]
    NotEnoughPoints { frame: usize },
    #[error("frame {frame}: object points do not lie on the z = 0 plane")]
    NonPlanarTarget { frame: usize },
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: usize, height: usize },
    #[error("{residuals} residuals cannot constrain {parameters} parameters")]
    InsufficientData { residuals: usize, parameters: usize },
    #[error("degenerate views: intrinsics cannot be initialised")]
    DegenerateInitialisation,
    #[error("calibration failed: {reason}")]
    CalibrationFailed { reason: String },
}

impl From<LmError> for CalibrationError {
    fn from(err: LmError) -> Self {
        CalibrationError::CalibrationFailed {
            reason: err.to_string(),
        }
    }
}

/// Fitted model, one pose per view, and reprojection statistics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub camera: CameraModel,
    pub poses: Vec<Pose>,
    /// `sqrt(sum |r|^2 / total points)`, in pixels.
    pub rms: f64,
    pub per_view_rms: Vec<f64>,
    pub image_size: ImageSize,
    /// Residual evaluations spent by the solver.
    pub evaluations: usize,
    pub converged: bool,
}

struct CalibrationProblem<'a> {
    object_points: &'a [Vec<Point3<f64>>],
    image_points: &'a [Vec<Point2<f64>>],
    params: DVector<f64>,
}

fn unpack_camera(intr: &[f64]) -> CameraModel {
    CameraModel::new(
        Intrinsics::new(intr[0], intr[1], intr[2], intr[3]),
        Distortion::from_array([intr[4], intr[5], intr[6], intr[7], intr[8]]),
    )
}

fn unpack_pose(p: &[f64]) -> Pose {
    Pose::new(
        Vector3::new(p[0], p[1], p[2]),
        Vector3::new(p[3], p[4], p[5]),
    )
}

fn pack(camera: &CameraModel, poses: &[Pose]) -> DVector<f64> {
    let mut x = DVector::zeros(INTRINSIC_PARAMS + POSE_PARAMS * poses.len());
    let k = &camera.intrinsics;
    let d = camera.distortion.to_array();
    x.as_mut_slice()[..INTRINSIC_PARAMS]
        .copy_from_slice(&[k.fx, k.fy, k.cx, k.cy, d[0], d[1], d[2], d[3], d[4]]);
    for (v, pose) in poses.iter().enumerate() {
        let off = INTRINSIC_PARAMS + POSE_PARAMS * v;
        x.as_mut_slice()[off..off + POSE_PARAMS].copy_from_slice(&[
            pose.rvec.x,
            pose.rvec.y,
            pose.rvec.z,
            pose.tvec.x,
            pose.tvec.y,
            pose.tvec.z,
        ]);
    }
    x
}

fn unpack(x: &DVector<f64>, views: usize) -> (CameraModel, Vec<Pose>) {
    let s = x.as_slice();
    let camera = unpack_camera(&s[..INTRINSIC_PARAMS]);
    let poses = (0..views)
        .map(|v| {
            let off = INTRINSIC_PARAMS + POSE_PARAMS * v;
            unpack_pose(&s[off..off + POSE_PARAMS])
        })
        .collect();
    (camera, poses)
}

/// Residuals `(projected - observed)` for one view, packed `[dx0, dy0, dx1, ...]`.
fn view_residuals(block: &[f64; BLOCK], object: &[Point3<f64>], image: &[Point2<f64>]) -> Vec<f64> {
    let camera = unpack_camera(&block[..INTRINSIC_PARAMS]);
    let pose = unpack_pose(&block[INTRINSIC_PARAMS..]);
    let rotation = pose.rotation();
    let mut out = Vec::with_capacity(2 * object.len());
    for (p, obs) in object.iter().zip(image) {
        let pc = rotation * p + pose.tvec;
        let proj = camera.project_camera_point(&pc);
        out.push(proj.x - obs.x);
        out.push(proj.y - obs.y);
    }
    out
}

impl CalibrationProblem<'_> {
    fn view_block(&self, x: &DVector<f64>, view: usize) -> [f64; BLOCK] {
        let s = x.as_slice();
        let off = INTRINSIC_PARAMS + POSE_PARAMS * view;
        let mut block = [0.0; BLOCK];
        block[..INTRINSIC_PARAMS].copy_from_slice(&s[..INTRINSIC_PARAMS]);
        block[INTRINSIC_PARAMS..].copy_from_slice(&s[off..off + POSE_PARAMS]);
        block
    }

    fn view_cost(&self, x: &DVector<f64>, view: usize) -> f64 {
        let block = self.view_block(x, view);
        view_residuals(&block, &self.object_points[view], &self.image_points[view])
            .iter()
            .map(|r| r * r)
            .sum()
    }

    fn residual_count(&self) -> usize {
        2 * self.object_points.iter().map(Vec::len).sum::<usize>()
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for CalibrationProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let mut out = Vec::with_capacity(self.residual_count());
        for view in 0..self.object_points.len() {
            let block = self.view_block(&self.params, view);
            out.extend(view_residuals(
                &block,
                &self.object_points[view],
                &self.image_points[view],
            ));
        }
        Some(DVector::from_vec(out))
    }

    /// Central differences per view. A view's rows touch only the shared
    /// intrinsics and its own pose columns; everything else stays zero.
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let mut jac = DMatrix::zeros(self.residual_count(), self.params.len());
        let mut row0 = 0;
        for view in 0..self.object_points.len() {
            let object = &self.object_points[view];
            let image = &self.image_points[view];
            let block = self.view_block(&self.params, view);
            let off = INTRINSIC_PARAMS + POSE_PARAMS * view;
            let rows = 2 * object.len();

            for k in 0..BLOCK {
                let h = 1e-6 * block[k].abs().max(1.0);
                let mut plus = block;
                let mut minus = block;
                plus[k] += h;
                minus[k] -= h;
                let rp = view_residuals(&plus, object, image);
                let rm = view_residuals(&minus, object, image);
                let col = if k < INTRINSIC_PARAMS {
                    k
                } else {
                    off + (k - INTRINSIC_PARAMS)
                };
                for row in 0..rows {
                    jac[(row0 + row, col)] = (rp[row] - rm[row]) / (2.0 * h);
                }
            }
            row0 += rows;
        }
        Some(jac)
    }
}

fn validate(
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Vec<Point2<f64>>],
    image_size: ImageSize,
) -> Result<usize, CalibrationError> {
    if object_points.is_empty() {
        return Err(CalibrationError::NoFrames);
    }
    if object_points.len() != image_points.len() {
        return Err(CalibrationError::MismatchedFrames {
            object: object_points.len(),
            image: image_points.len(),
        });
    }
    if image_size.is_empty() {
        return Err(CalibrationError::InvalidImageSize {
            width: image_size.width,
            height: image_size.height,
        });
    }

    let mut total = 0;
    for (frame, (obj, img)) in object_points.iter().zip(image_points).enumerate() {
        if obj.len() != img.len() {
            return Err(CalibrationError::MismatchedPointCounts { frame });
        }
        if obj.len() < MIN_POINTS_PER_VIEW {
            return Err(CalibrationError::NotEnoughPoints { frame });
        }
        let scale = obj
            .iter()
            .map(|p| p.x.abs().max(p.y.abs()))
            .fold(1.0f64, f64::max);
        if obj.iter().any(|p| p.z.abs() > 1e-9 * scale) {
            return Err(CalibrationError::NonPlanarTarget { frame });
        }
        total += obj.len();
    }

    let residuals = 2 * total;
    let parameters = INTRINSIC_PARAMS + POSE_PARAMS * object_points.len();
    if residuals < parameters {
        return Err(CalibrationError::InsufficientData {
            residuals,
            parameters,
        });
    }
    Ok(total)
}

/// Fit a pinhole + Brown–Conrady model to planar views.
///
/// `object_points[v]` are board coordinates with `z == 0`, `image_points[v]`
/// their observations in view `v`. Intrinsics are initialised from the view
/// homographies (principal point at the image centre, zero distortion) and
/// then refined jointly with every pose by Levenberg–Marquardt.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(views = object_points.len()))
)]
pub fn calibrate_camera(
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Vec<Point2<f64>>],
    image_size: ImageSize,
    criteria: TermCriteria,
) -> Result<CalibrationResult, CalibrationError> {
    let total_points = validate(object_points, image_points, image_size)?;

    let homographies = object_points
        .iter()
        .zip(image_points)
        .map(|(obj, img)| {
            let plane: Vec<Point2<f64>> = obj.iter().map(|p| Point2::new(p.x, p.y)).collect();
            estimate_homography(&plane, img).ok_or(CalibrationError::DegenerateInitialisation)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let intrinsics = initial_intrinsics(&homographies, image_size)?;
    let poses = homographies
        .iter()
        .map(|h| pose_from_homography(&intrinsics, h))
        .collect::<Result<Vec<_>, _>>()?;
    let initial = CameraModel::new(intrinsics, Distortion::default());

    let problem = CalibrationProblem {
        object_points,
        image_points,
        params: pack(&initial, &poses),
    };
    let (problem, summary) = minimize(problem, criteria)?;
    let params = problem.params();
    let cost: f64 = (0..object_points.len())
        .map(|v| problem.view_cost(&params, v))
        .sum();

    if params.iter().any(|v| !v.is_finite()) || !cost.is_finite() {
        return Err(CalibrationError::CalibrationFailed {
            reason: "solution is not finite".into(),
        });
    }
    let (camera, poses) = unpack(&params, object_points.len());
    if camera.intrinsics.fx <= 0.0 || camera.intrinsics.fy <= 0.0 {
        return Err(CalibrationError::CalibrationFailed {
            reason: format!(
                "non-positive focal length ({:.3}, {:.3})",
                camera.intrinsics.fx, camera.intrinsics.fy
            ),
        });
    }

    let rms = (cost / total_points as f64).sqrt();
    let per_view_rms = (0..object_points.len())
        .map(|v| (problem.view_cost(&params, v) / object_points[v].len() as f64).sqrt())
        .collect();

    let k = &camera.intrinsics;
    log::info!(
        "calibrated {} views in {} evaluations ({}): rms {:.4} px, fx {:.2} fy {:.2} cx {:.2} cy {:.2}",
        object_points.len(),
        summary.evaluations,
        summary.termination,
        rms,
        k.fx,
        k.fy,
        k.cx,
        k.cy
    );

    Ok(CalibrationResult {
        camera,
        poses,
        rms,
        per_view_rms,
        image_size,
        evaluations: summary.evaluations,
        converged: summary.converged,
    })
}
