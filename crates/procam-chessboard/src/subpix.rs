//! Gradient-based sub-pixel corner refinement.
//!
//! At the true corner `q`, every image gradient `g(p)` in the surrounding
//! window is orthogonal to `p - q`. Solving the weighted normal equations
//! `sum(g g^T) q = sum(g g^T p)` and iterating gives the refined position.

use nalgebra::Point2;
use procam_core::{sample_bilinear, GrayImageView, TermCriteria, WindowSize};

/// Gaussian weights over the `(2w+1) x (2h+1)` window.
fn window_mask(win: WindowSize) -> Vec<f64> {
    let (ww, wh) = (win.width as i64, win.height as i64);
    let mut mask = Vec::with_capacity(((2 * ww + 1) * (2 * wh + 1)) as usize);
    for i in -wh..=wh {
        let y = i as f64 / wh as f64;
        let vy = (-y * y).exp();
        for j in -ww..=ww {
            let x = j as f64 / ww as f64;
            mask.push(vy * (-x * x).exp());
        }
    }
    mask
}

/// Refine one corner; returns `start` when the iteration wanders out of the window.
pub fn refine_corner_subpix(
    img: &GrayImageView<'_>,
    start: Point2<f64>,
    win: WindowSize,
    criteria: TermCriteria,
) -> Point2<f64> {
    if win.width == 0 || win.height == 0 {
        return start;
    }
    let mask = window_mask(win);
    refine_with_mask(img, start, win, criteria, &mask)
}

fn refine_with_mask(
    img: &GrayImageView<'_>,
    start: Point2<f64>,
    win: WindowSize,
    criteria: TermCriteria,
    mask: &[f64],
) -> Point2<f64> {
    let (ww, wh) = (win.width as i64, win.height as i64);
    let eps_sq = criteria.epsilon.max(0.0).powi(2);
    let max_iters = criteria.max_iterations.max(1);

    let mut ci = start;
    for _ in 0..max_iters {
        let (mut a, mut b, mut c, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);

        let mut k = 0;
        for i in -wh..=wh {
            let py = i as f64;
            let sy = ci.y + py;
            for j in -ww..=ww {
                let px = j as f64;
                let sx = ci.x + px;
                let m = mask[k];
                k += 1;

                let tgx = sample_bilinear(img, sx + 1.0, sy) - sample_bilinear(img, sx - 1.0, sy);
                let tgy = sample_bilinear(img, sx, sy + 1.0) - sample_bilinear(img, sx, sy - 1.0);
                let gxx = tgx * tgx * m;
                let gxy = tgx * tgy * m;
                let gyy = tgy * tgy * m;

                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON * f64::EPSILON {
            break;
        }
        let scale = 1.0 / det;
        let next = Point2::new(
            ci.x + c * scale * bb1 - b * scale * bb2,
            ci.y - b * scale * bb1 + a * scale * bb2,
        );
        let err = (next - ci).norm_squared();
        ci = next;

        let inside = ci.x >= 0.0
            && ci.y >= 0.0
            && ci.x < img.width as f64
            && ci.y < img.height as f64;
        if !inside || err <= eps_sq {
            break;
        }
    }

    if (ci.x - start.x).abs() > win.width as f64 || (ci.y - start.y).abs() > win.height as f64 {
        return start;
    }
    ci
}

/// Refine every corner in place.
pub fn refine_corners_subpix(
    img: &GrayImageView<'_>,
    corners: &mut [Point2<f64>],
    win: WindowSize,
    criteria: TermCriteria,
) {
    if win.width == 0 || win.height == 0 {
        return;
    }
    let mask = window_mask(win);
    for p in corners.iter_mut() {
        *p = refine_with_mask(img, *p, win, criteria, &mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procam_core::GrayImage;

    /// Area-averaged X-junction at `(cx, cy)`.
    fn junction(w: usize, h: usize, cx: f64, cy: f64) -> GrayImage {
        const SS: usize = 4;
        GrayImage::from_fn(w, h, |x, y| {
            let mut acc = 0.0;
            for sy in 0..SS {
                for sx in 0..SS {
                    let u = x as f64 - 0.5 + (sx as f64 + 0.5) / SS as f64;
                    let v = y as f64 - 0.5 + (sy as f64 + 0.5) / SS as f64;
                    acc += if (u < cx) == (v < cy) { 220.0 } else { 30.0 };
                }
            }
            (acc / (SS * SS) as f64).round() as u8
        })
    }

    #[test]
    fn converges_to_true_corner() {
        let truth = Point2::new(30.3, 28.7);
        let img = junction(60, 60, truth.x, truth.y);
        let start = Point2::new(31.0, 28.0);

        let refined = refine_corner_subpix(
            &img.view(),
            start,
            WindowSize::new(5, 5),
            TermCriteria::new(30, 0.001),
        );
        assert!((refined - truth).norm() < 0.05, "refined = {refined:?}");
    }

    #[test]
    fn default_criteria_improve_on_start() {
        let truth = Point2::new(25.5, 25.5);
        let img = junction(50, 50, truth.x, truth.y);
        let mut corners = [Point2::new(26.1, 24.9), Point2::new(25.0, 26.0)];

        refine_corners_subpix(
            &img.view(),
            &mut corners,
            WindowSize::new(5, 5),
            TermCriteria::default(),
        );
        for p in corners {
            assert!((p - truth).norm() < 0.15, "p = {p:?}");
        }
    }

    #[test]
    fn flat_image_leaves_corner_unchanged() {
        let img = GrayImage::from_fn(30, 30, |_, _| 100);
        let start = Point2::new(15.2, 14.8);
        let refined = refine_corner_subpix(
            &img.view(),
            start,
            WindowSize::new(4, 4),
            TermCriteria::default(),
        );
        assert_eq!(refined, start);
    }
}
