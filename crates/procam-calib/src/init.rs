//! Closed-form starting point for planar calibration.
//!
//! Focal lengths come from the orthogonality of the board axes seen through
//! each view homography, with the principal point held at the image centre.
//! Poses come from decomposing `K^-1 H` into a rotation and translation.

use nalgebra::{DMatrix, DVector, Matrix3, Rotation3, Vector3};
use procam_core::{Homography, ImageSize};

use crate::calibrate::CalibrationError;
use crate::camera::{Intrinsics, Pose};

/// Focal lengths from per-view homographies (board plane to image).
///
/// For each view, with `H' = H` shifted so the principal point is the
/// origin, the first two columns `h` and `v` and their half-sum and
/// half-difference are orthogonal rays. That gives two linear equations in
/// `(1/fx^2, 1/fy^2)` per view, solved jointly in the least-squares sense.
pub fn initial_intrinsics(
    homographies: &[Homography],
    image_size: ImageSize,
) -> Result<Intrinsics, CalibrationError> {
    let cx = (image_size.width as f64 - 1.0) * 0.5;
    let cy = (image_size.height as f64 - 1.0) * 0.5;

    let n = homographies.len();
    if n == 0 {
        return Err(CalibrationError::NoFrames);
    }
    let mut a = DMatrix::<f64>::zeros(2 * n, 2);
    let mut b = DVector::<f64>::zeros(2 * n);

    for (k, hom) in homographies.iter().enumerate() {
        let mut h = hom.h;
        for c in 0..3 {
            h[(0, c)] -= h[(2, c)] * cx;
            h[(1, c)] -= h[(2, c)] * cy;
        }

        let hcol: Vector3<f64> = h.column(0).into_owned();
        let vcol: Vector3<f64> = h.column(1).into_owned();
        let d1 = (hcol + vcol) * 0.5;
        let d2 = (hcol - vcol) * 0.5;

        let (Some(hn), Some(vn), Some(d1n), Some(d2n)) = (
            hcol.try_normalize(1e-300),
            vcol.try_normalize(1e-300),
            d1.try_normalize(1e-300),
            d2.try_normalize(1e-300),
        ) else {
            return Err(CalibrationError::DegenerateInitialisation);
        };

        a[(2 * k, 0)] = hn.x * vn.x;
        a[(2 * k, 1)] = hn.y * vn.y;
        b[2 * k] = -hn.z * vn.z;
        a[(2 * k + 1, 0)] = d1n.x * d2n.x;
        a[(2 * k + 1, 1)] = d1n.y * d2n.y;
        b[2 * k + 1] = -d1n.z * d2n.z;
    }

    let svd = a.svd(true, true);
    let f = svd
        .solve(&b, 1e-14)
        .map_err(|_| CalibrationError::DegenerateInitialisation)?;

    let fx = (1.0 / f[0]).abs().sqrt();
    let fy = (1.0 / f[1]).abs().sqrt();
    if !(fx.is_finite() && fy.is_finite()) || fx <= 0.0 || fy <= 0.0 {
        return Err(CalibrationError::DegenerateInitialisation);
    }

    log::debug!("initial intrinsics fx={fx:.2} fy={fy:.2} cx={cx:.2} cy={cy:.2}");
    Ok(Intrinsics::new(fx, fy, cx, cy))
}

/// Board pose from a homography and intrinsics.
///
/// The first two rotation columns are `K^-1 h1` and `K^-1 h2` scaled by the
/// mean of their norms; the result is projected onto SO(3) and flipped so the
/// board lies in front of the camera.
pub fn pose_from_homography(
    intrinsics: &Intrinsics,
    homography: &Homography,
) -> Result<Pose, CalibrationError> {
    let k_inv = intrinsics
        .inverse_matrix()
        .ok_or(CalibrationError::DegenerateInitialisation)?;

    let h = &homography.h;
    let r1 = k_inv * h.column(0);
    let r2 = k_inv * h.column(1);
    let t = k_inv * h.column(2);

    let denom = 0.5 * (r1.norm() + r2.norm());
    if denom <= 1e-12 {
        return Err(CalibrationError::DegenerateInitialisation);
    }
    let lambda = if t.z < 0.0 { -1.0 / denom } else { 1.0 / denom };

    let r1 = r1 * lambda;
    let r2 = r2 * lambda;
    let t = t * lambda;
    let r3 = r1.cross(&r2);

    let r = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = r.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(CalibrationError::DegenerateInitialisation);
    };
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let rotation = Rotation3::from_matrix_unchecked(r_orth);
    Ok(Pose::from_rotation(&rotation, t))
}
