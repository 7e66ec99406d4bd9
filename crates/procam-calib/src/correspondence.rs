use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::calibrate::CalibrationError;

/// Everything one accepted frame contributes to calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameCorrespondence {
    /// Board corners in board coordinates (`z == 0`).
    pub camera_object: Vec<Point3<f64>>,
    /// The same corners as detected in the camera image.
    pub camera_image: Vec<Point2<f64>>,
    /// Projector pattern corners in projector pixels.
    pub projector_pattern: Vec<Point2<f64>>,
    /// The projected corners as detected in the camera image.
    pub projector_image: Vec<Point2<f64>>,
}

/// Accumulated correspondences, one entry per accepted frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceSet {
    frames: Vec<FrameCorrespondence>,
}

impl CorrespondenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame. Each known/observed pair must have equal counts.
    pub fn push(&mut self, frame: FrameCorrespondence) -> Result<(), CalibrationError> {
        if frame.camera_object.len() != frame.camera_image.len()
            || frame.projector_pattern.len() != frame.projector_image.len()
        {
            return Err(CalibrationError::MismatchedPointCounts {
                frame: self.frames.len(),
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[FrameCorrespondence] {
        &self.frames
    }

    pub fn camera_object_points(&self) -> Vec<Vec<Point3<f64>>> {
        self.frames.iter().map(|f| f.camera_object.clone()).collect()
    }

    pub fn camera_image_points(&self) -> Vec<Vec<Point2<f64>>> {
        self.frames.iter().map(|f| f.camera_image.clone()).collect()
    }

    pub fn projector_pattern_points(&self) -> Vec<Vec<Point2<f64>>> {
        self.frames
            .iter()
            .map(|f| f.projector_pattern.clone())
            .collect()
    }

    pub fn projector_image_points(&self) -> Vec<Vec<Point2<f64>>> {
        self.frames
            .iter()
            .map(|f| f.projector_image.clone())
            .collect()
    }
}
