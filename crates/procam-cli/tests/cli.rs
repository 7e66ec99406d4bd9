use std::fs;
use std::path::Path;

use assert_cmd::Command;
use nalgebra::{Matrix3, Rotation3, Vector3};
use predicates::prelude::*;
use procam_calib::{CalibrationReport, CaptureSink, PngCaptureSink};
use procam_core::{GrayImage, ImageSize};

const DARK: u8 = 30;
const LIGHT: u8 = 220;

fn cli() -> Command {
    Command::cargo_bin("procam-calibrate").expect("binary")
}

fn write_settings(path: &Path, width: usize, height: usize, square: f64, frames: usize, kind: u8) {
    let text = format!(
        "%YAML:1.0\n---\nPatternWidth: {width}\nPatternHeight: {height}\n\
         SubPixelWidth: 5\nSubPixelHeight: 5\nSquareSize: {square}\n\
         NbrOfFrames: {frames}\nPatternType: {kind}\n"
    );
    fs::write(path, text).expect("settings");
}

/// Paints an axis-aligned board whose first inner corner sits at `(ox, oy)`.
fn paint_board(img: &mut GrayImage, cols: usize, rows: usize, square: usize, ox: usize, oy: usize) {
    for y in 0..img.height {
        for x in 0..img.width {
            let (u, v) = (x as i64 - ox as i64, y as i64 - oy as i64);
            let s = square as i64;
            if u < -s || v < -s || u >= cols as i64 * s || v >= rows as i64 * s {
                continue;
            }
            let parity = (u.div_euclid(s) + v.div_euclid(s)).rem_euclid(2);
            img.data[y * img.width + x] = if parity == 0 { DARK } else { LIGHT };
        }
    }
}

const CAM_F: f64 = 600.0;
const CAM_C: (f64, f64) = (319.5, 239.5);
const CAM_SQUARE: f64 = 30.0;
const PROJ_F: f64 = 1000.0;
const PROJ_C: (f64, f64) = (199.5, 149.5);
const PROJ_SQUARE: f64 = 60.0;
/// Projector sits this far along the camera x axis, looking the same way.
const PROJ_BASELINE: f64 = 200.0;

/// Checker shade at `(u, v)` for a board of `(cols + 1) x (rows + 1)`
/// squares covering `[0, (cols + 1) * square) x [0, (rows + 1) * square)`.
fn checker(u: f64, v: f64, cols: usize, rows: usize, square: f64) -> Option<f64> {
    if u < 0.0 || v < 0.0 || u >= (cols + 1) as f64 * square || v >= (rows + 1) as f64 * square {
        return None;
    }
    let parity = ((u / square).floor() as i64 + (v / square).floor() as i64).rem_euclid(2);
    Some(if parity == 0 { DARK as f64 } else { LIGHT as f64 })
}

/// Board plane seen by the camera: printed 5x4 board around the board
/// origin, projected 4x3 pattern landing to its right.
struct PlaneView {
    rotation: Rotation3<f64>,
    inverse: Rotation3<f64>,
    translation: Vector3<f64>,
    normal: Vector3<f64>,
}

impl PlaneView {
    /// Board rows run down the image and columns to the right; the plane is
    /// tilted about a pivot 700 mm in front of the camera.
    fn tilted(about_x: f64, about_y: f64) -> Self {
        let facing = Rotation3::from_matrix_unchecked(Matrix3::new(
            0.0, 1.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 0.0, -1.0,
        ));
        let tilt = Rotation3::from_euler_angles(about_x, about_y, 0.0);
        let pivot = Vector3::new(0.0, 0.0, 700.0);
        let rotation = tilt * facing;
        let translation = tilt * (Vector3::new(-200.0, -45.0, 700.0) - pivot) + pivot;
        Self {
            rotation,
            inverse: rotation.inverse(),
            translation,
            normal: rotation * Vector3::z(),
        }
    }

    fn shade(&self, x: f64, y: f64) -> f64 {
        let ray = Vector3::new((x - CAM_C.0) / CAM_F, (y - CAM_C.1) / CAM_F, 1.0);
        let depth = self.normal.dot(&self.translation) / self.normal.dot(&ray);
        if depth <= 0.0 {
            return LIGHT as f64;
        }
        let hit = ray * depth;

        let board = self.inverse * (hit - self.translation);
        if let Some(v) = checker(board.y + CAM_SQUARE, board.x + CAM_SQUARE, 5, 4, CAM_SQUARE) {
            return v;
        }

        let p = hit - Vector3::new(PROJ_BASELINE, 0.0, 0.0);
        let u = PROJ_F * p.x / p.z + PROJ_C.0;
        let v = PROJ_F * p.y / p.z + PROJ_C.1;
        checker(u, v, 4, 3, PROJ_SQUARE).unwrap_or(LIGHT as f64)
    }

    /// 640x480 camera frame, 3x3 supersampled.
    fn render(&self) -> GrayImage {
        const SS: usize = 3;
        GrayImage::from_fn(640, 480, |x, y| {
            let mut acc = 0.0;
            for sy in 0..SS {
                for sx in 0..SS {
                    let px = x as f64 - 0.5 + (sx as f64 + 0.5) / SS as f64;
                    let py = y as f64 - 0.5 + (sy as f64 + 0.5) / SS as f64;
                    acc += self.shade(px, py);
                }
            }
            (acc / (SS * SS) as f64).round().clamp(0.0, 255.0) as u8
        })
    }
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new(frame_count: usize) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write_settings(&root.join("camera.yml"), 5, 4, 24.0, frame_count, 0);
        write_settings(&root.join("projector.yml"), 4, 3, 28.0, frame_count, 0);

        let pattern = GrayImage::from_fn(320, 240, |_, _| LIGHT);
        let mut sink = PngCaptureSink::new(root.join("pattern")).expect("pattern dir");
        sink.save(0, &pattern).expect("pattern");
        Self { dir }
    }

    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).display().to_string()
    }

    fn write_frames(&self, count: usize, with_boards: bool) {
        let mut sink = PngCaptureSink::new(self.dir.path().join("frames")).expect("frames dir");
        for k in 0..count {
            let mut img = GrayImage::from_fn(420, 220, |_, _| LIGHT);
            if with_boards {
                paint_board(&mut img, 5, 4, 24, 50 + 3 * k, 60);
                paint_board(&mut img, 4, 3, 28, 280, 70 + 3 * k);
            }
            sink.save(k, &img).expect("frame");
        }
    }

    /// Settings, projector pattern and rendered frames for a physically
    /// consistent rig.
    fn write_rig(&self, tilts: &[(f64, f64)]) {
        let root = self.dir.path();
        write_settings(&root.join("camera.yml"), 5, 4, CAM_SQUARE, tilts.len(), 0);
        write_settings(&root.join("projector.yml"), 4, 3, PROJ_SQUARE, tilts.len(), 0);

        let pattern = GrayImage::from_fn(400, 300, |x, y| {
            checker(x as f64, y as f64, 4, 3, PROJ_SQUARE).unwrap_or(LIGHT as f64) as u8
        });
        let mut sink = PngCaptureSink::new(root.join("pattern")).expect("pattern dir");
        sink.save(0, &pattern).expect("pattern");

        let mut frames = PngCaptureSink::new(root.join("frames")).expect("frames dir");
        for (k, &(about_x, about_y)) in tilts.iter().enumerate() {
            let frame = PlaneView::tilted(about_x, about_y).render();
            frames.save(k, &frame).expect("frame");
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            self.path("camera.yml"),
            self.path("projector.yml"),
            self.path("pattern/capture0.png"),
            self.path("rig"),
            "--frames".into(),
            self.path("frames"),
        ]
    }
}

#[test]
fn missing_arguments_exit_with_setup_error() {
    cli()
        .assert()
        .code(255)
        .stderr(predicate::str::contains("error: missing required argument"));
}

#[test]
fn nonexistent_settings_file_is_rejected() {
    let fixture = Fixture::new(2);
    let mut args = fixture.args();
    args[0] = fixture.path("nope.yml");
    cli()
        .args(&args)
        .assert()
        .code(255)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn non_chessboard_pattern_is_rejected() {
    let fixture = Fixture::new(2);
    write_settings(&fixture.dir.path().join("projector.yml"), 4, 3, 28.0, 2, 1);
    fixture.write_frames(1, true);
    cli()
        .args(fixture.args())
        .assert()
        .code(255)
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn abort_from_stdin_exits_cleanly_without_report() {
    let fixture = Fixture::new(2);
    fixture.write_frames(2, true);
    cli()
        .args(fixture.args())
        .write_stdin("q\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("aborted after 0 accepted frames"));
    assert!(!fixture.dir.path().join("rig.json").exists());
}

#[test]
fn running_out_of_frames_is_a_runtime_error() {
    let fixture = Fixture::new(3);
    fixture.write_frames(2, false);
    cli()
        .args(fixture.args())
        .arg("--auto-accept")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ran out after 0 of 3"));
}

#[test]
fn tilted_rig_frames_calibrate_and_write_report() {
    let fixture = Fixture::new(6);
    fixture.write_rig(&[
        (0.3, 0.0),
        (-0.3, 0.05),
        (0.05, 0.3),
        (0.0, -0.3),
        (0.25, 0.25),
        (-0.2, -0.25),
    ]);

    cli()
        .args(fixture.args())
        .arg("--auto-accept")
        .assert()
        .success()
        .stdout(predicate::str::contains("camera matrix ="))
        .stdout(predicate::str::contains("projector dist coeffs ="));

    let report =
        CalibrationReport::load_json(fixture.dir.path().join("rig.json")).expect("report");
    assert_eq!(report.frames, 6);
    assert_eq!(report.camera.image_size, ImageSize::new(640, 480));
    assert_eq!(report.projector.image_size, ImageSize::new(400, 300));
    assert_eq!(report.camera.rvecs.len(), 6);
    assert!(report.camera.converged && report.projector.converged);
    assert!(report.camera.rms < 0.5, "camera rms {}", report.camera.rms);
    assert!(report.projector.rms < 1.0, "projector rms {}", report.projector.rms);

    let camera_fx = report.camera.camera_matrix[0][0];
    let projector_fx = report.projector.camera_matrix[0][0];
    assert!((camera_fx / CAM_F - 1.0).abs() < 0.1, "camera fx {camera_fx}");
    assert!((projector_fx / PROJ_F - 1.0).abs() < 0.2, "projector fx {projector_fx}");
}
