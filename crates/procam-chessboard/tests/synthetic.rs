use nalgebra::Point2;
use procam_chessboard::{refine_corners_subpix, ChessboardDetector, ChessboardParams};
use procam_core::{GrayImage, GridSize, TermCriteria, WindowSize};

const DARK: f64 = 30.0;
const LIGHT: f64 = 220.0;

/// Board with `size` inner corners; inner corner `(i, j)` lands at
/// `origin + R(angle) * (i, j) * square`. Pixels are area-averaged.
fn render_board(
    img: &mut [f64],
    width: usize,
    size: GridSize,
    square: f64,
    origin: Point2<f64>,
    angle: f64,
) {
    const SS: usize = 4;
    let height = img.len() / width;
    let (s, c) = angle.sin_cos();
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            let mut inside = 0;
            for sy in 0..SS {
                for sx in 0..SS {
                    let px = x as f64 - 0.5 + (sx as f64 + 0.5) / SS as f64 - origin.x;
                    let py = y as f64 - 0.5 + (sy as f64 + 0.5) / SS as f64 - origin.y;
                    let u = (c * px + s * py) / square;
                    let v = (-s * px + c * py) / square;
                    if u < -1.0 || v < -1.0 || u >= size.width as f64 || v >= size.height as f64 {
                        acc += LIGHT;
                        continue;
                    }
                    inside += 1;
                    let parity = (u.floor() as i64 + v.floor() as i64).rem_euclid(2);
                    acc += if parity == 0 { DARK } else { LIGHT };
                }
            }
            if inside > 0 {
                img[y * width + x] = acc / (SS * SS) as f64;
            }
        }
    }
}

fn to_gray(width: usize, data: &[f64]) -> GrayImage {
    let bytes = data.iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect();
    GrayImage::from_raw(width, data.len() / width, bytes).expect("buffer")
}

fn expected_corners(
    size: GridSize,
    square: f64,
    origin: Point2<f64>,
    angle: f64,
) -> Vec<Point2<f64>> {
    let (s, c) = angle.sin_cos();
    let mut out = Vec::new();
    for j in 0..size.height {
        for i in 0..size.width {
            let (u, v) = (i as f64 * square, j as f64 * square);
            out.push(Point2::new(origin.x + c * u - s * v, origin.y + s * u + c * v));
        }
    }
    out
}

fn max_error(found: &[Point2<f64>], expected: &[Point2<f64>]) -> f64 {
    found
        .iter()
        .zip(expected)
        .map(|(a, b)| (a - b).norm())
        .fold(0.0, f64::max)
}

#[test]
fn detects_axis_aligned_board_in_row_major_order() {
    let (w, h) = (240, 200);
    let size = GridSize::new(5, 4);
    let origin = Point2::new(60.3, 55.8);
    let mut buf = vec![LIGHT; w * h];
    render_board(&mut buf, w, size, 24.0, origin, 0.0);
    let img = to_gray(w, &buf);

    let det = ChessboardDetector::default();
    let found = det.detect(&img.view(), size).expect("board");
    let expected = expected_corners(size, 24.0, origin, 0.0);

    assert_eq!(found.len(), 20);
    let err = max_error(&found, &expected);
    assert!(err < 1.0, "max detection error {err}");
}

#[test]
fn subpixel_refinement_tightens_detection() {
    let (w, h) = (260, 220);
    let size = GridSize::new(6, 4);
    let origin = Point2::new(50.6, 60.2);
    let angle = 8f64.to_radians();
    let mut buf = vec![LIGHT; w * h];
    render_board(&mut buf, w, size, 26.0, origin, angle);
    let img = to_gray(w, &buf);

    let det = ChessboardDetector::default();
    let mut found = det.detect(&img.view(), size).expect("board");
    let expected = expected_corners(size, 26.0, origin, angle);
    assert!(max_error(&found, &expected) < 1.5);

    refine_corners_subpix(
        &img.view(),
        &mut found,
        WindowSize::new(5, 5),
        TermCriteria::new(30, 0.01),
    );
    let err = max_error(&found, &expected);
    assert!(err < 0.1, "max refined error {err}");
}

#[test]
fn two_boards_are_told_apart_by_size() {
    let (w, h) = (420, 220);
    let camera = GridSize::new(5, 4);
    let projector = GridSize::new(4, 3);
    let cam_origin = Point2::new(50.5, 60.5);
    let proj_origin = Point2::new(280.5, 70.5);

    let mut buf = vec![LIGHT; w * h];
    render_board(&mut buf, w, camera, 24.0, cam_origin, 0.0);
    render_board(&mut buf, w, projector, 28.0, proj_origin, 0.0);
    let img = to_gray(w, &buf);

    let det = ChessboardDetector::default();
    let corners = det.find_corners(&img.view());

    let cam = det.detect_from_corners(&corners, camera).expect("camera board");
    assert!(max_error(&cam, &expected_corners(camera, 24.0, cam_origin, 0.0)) < 1.0);

    let proj = det
        .detect_from_corners(&corners, projector)
        .expect("projector board");
    assert!(max_error(&proj, &expected_corners(projector, 28.0, proj_origin, 0.0)) < 1.0);

    assert!(det.detect_from_corners(&corners, GridSize::new(7, 7)).is_none());
}

#[test]
fn chess_corners_cover_every_inner_corner() {
    let (w, h) = (240, 200);
    let size = GridSize::new(5, 4);
    let origin = Point2::new(60.5, 55.5);
    let mut buf = vec![LIGHT; w * h];
    render_board(&mut buf, w, size, 24.0, origin, 0.0);
    let img = to_gray(w, &buf);

    let det = ChessboardDetector::default();
    let corners = det.find_corners(&img.view());
    for expected in expected_corners(size, 24.0, origin, 0.0) {
        let nearest = corners
            .iter()
            .map(|c| {
                let p = Point2::new(c.position.x as f64, c.position.y as f64);
                ((p - expected).norm(), c.strength)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .expect("corners");
        assert!(nearest.0 < 1.0, "no corner near {expected}");
        assert!(nearest.1 > 0.0);
    }

    let strict = ChessboardDetector::new(ChessboardParams {
        min_corner_strength: f32::MAX,
        ..ChessboardParams::default()
    });
    assert!(strict.find_corners(&img.view()).is_empty());
}

#[test]
fn blank_image_has_no_board() {
    let img = GrayImage::from_fn(120, 100, |_, _| 128);
    let det = ChessboardDetector::default();
    assert!(det.detect(&img.view(), GridSize::new(5, 4)).is_none());
}
