use nalgebra::Point3;
use procam_core::{ImageSize, TermCriteria};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::backproject::{back_project_to_plane, BackprojectError};
use crate::calibrate::{calibrate_camera, CalibrationError, CalibrationResult};
use crate::correspondence::CorrespondenceSet;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("camera calibration: {0}")]
    Camera(CalibrationError),
    #[error("projector calibration: {0}")]
    Projector(CalibrationError),
    #[error("back-projection: {0}")]
    Backproject(#[from] BackprojectError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Both devices calibrated, and the board-plane points the projector was
/// calibrated against.
#[derive(Clone, Debug)]
pub struct ProCamCalibration {
    pub camera: CalibrationResult,
    pub projector: CalibrationResult,
    /// Projector corners lifted onto the board plane, one list per frame.
    pub world_points: Vec<Vec<Point3<f64>>>,
}

/// Calibrate the camera, lift the projector corners onto the board and
/// calibrate the projector as an inverse camera.
///
/// The projector is fitted with the lifted points as object points and the
/// pattern pixel coordinates as image points.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(correspondences), fields(frames = correspondences.len()))
)]
pub fn calibrate_projector(
    correspondences: &CorrespondenceSet,
    camera_image_size: ImageSize,
    projector_image_size: ImageSize,
    criteria: TermCriteria,
) -> Result<ProCamCalibration, PipelineError> {
    let camera = calibrate_camera(
        &correspondences.camera_object_points(),
        &correspondences.camera_image_points(),
        camera_image_size,
        criteria,
    )
    .map_err(PipelineError::Camera)?;
    log::info!("camera rms {:.4} px", camera.rms);

    let world_points = back_project_to_plane(
        &camera.camera.intrinsics,
        &camera.poses,
        &correspondences.projector_image_points(),
    )?;

    let projector = calibrate_camera(
        &world_points,
        &correspondences.projector_pattern_points(),
        projector_image_size,
        criteria,
    )
    .map_err(PipelineError::Projector)?;
    log::info!("projector rms {:.4} px", projector.rms);

    Ok(ProCamCalibration {
        camera,
        projector,
        world_points,
    })
}
