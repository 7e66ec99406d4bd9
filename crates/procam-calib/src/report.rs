//! JSON report for a finished camera/projector calibration.

use std::{fs, path::Path};

use procam_core::ImageSize;
use serde::{Deserialize, Serialize};

use crate::calibrate::CalibrationResult;
use crate::pipeline::{PipelineError, ProCamCalibration};

/// Calibration of one device in OpenCV conventions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub image_size: ImageSize,
    /// Row-major 3x3 `K`.
    pub camera_matrix: [[f64; 3]; 3],
    /// `k1, k2, p1, p2, k3`
    pub distortion: [f64; 5],
    pub rms: f64,
    pub per_view_rms: Vec<f64>,
    pub evaluations: usize,
    pub converged: bool,
    pub rvecs: Vec<[f64; 3]>,
    pub tvecs: Vec<[f64; 3]>,
}

impl From<&CalibrationResult> for DeviceReport {
    fn from(result: &CalibrationResult) -> Self {
        let k = result.camera.intrinsics.matrix();
        let camera_matrix = [
            [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
            [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
            [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
        ];
        Self {
            image_size: result.image_size,
            camera_matrix,
            distortion: result.camera.distortion.to_array(),
            rms: result.rms,
            per_view_rms: result.per_view_rms.clone(),
            evaluations: result.evaluations,
            converged: result.converged,
            rvecs: result.poses.iter().map(|p| p.rvec.into()).collect(),
            tvecs: result.poses.iter().map(|p| p.tvec.into()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub name: String,
    pub frames: usize,
    pub camera: DeviceReport,
    pub projector: DeviceReport,
}

impl CalibrationReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl ProCamCalibration {
    pub fn to_report(&self, name: impl Into<String>) -> CalibrationReport {
        CalibrationReport {
            name: name.into(),
            frames: self.world_points.len(),
            camera: DeviceReport::from(&self.camera),
            projector: DeviceReport::from(&self.projector),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraModel, Distortion, Intrinsics, Pose};
    use nalgebra::{Point3, Vector3};

    fn result(fx: f64) -> CalibrationResult {
        CalibrationResult {
            camera: CameraModel::new(
                Intrinsics::new(fx, fx, 320.0, 240.0),
                Distortion::from_array([0.1, -0.01, 0.0, 0.0, 0.001]),
            ),
            poses: vec![Pose::new(
                Vector3::new(0.1, 0.2, 0.3),
                Vector3::new(1.0, 2.0, 300.0),
            )],
            rms: 0.25,
            per_view_rms: vec![0.25],
            image_size: ImageSize::new(640, 480),
            evaluations: 4,
            converged: true,
        }
    }

    #[test]
    fn report_round_trips_through_json() {
        let calib = ProCamCalibration {
            camera: result(800.0),
            projector: result(1400.0),
            world_points: vec![vec![Point3::origin()]],
        };
        let report = calib.to_report("rig");
        assert_eq!(report.frames, 1);
        assert_eq!(report.camera.camera_matrix[0], [800.0, 0.0, 320.0]);
        assert_eq!(report.projector.camera_matrix[2], [0.0, 0.0, 1.0]);
        assert_eq!(report.camera.tvecs[0], [1.0, 2.0, 300.0]);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rig.json");
        report.write_json(&path).expect("write");
        let back = CalibrationReport::load_json(&path).expect("load");
        assert_eq!(back, report);
    }
}
