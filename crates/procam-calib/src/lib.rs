//! Camera and projector calibration from planar chessboard observations.
//!
//! A physical board and a projected pattern are seen together by one camera.
//! The camera is calibrated from the board; the projected corners are lifted
//! onto the board plane with the recovered poses; the projector is then
//! calibrated as an inverse camera from those plane points and the known
//! pattern pixels.
//!
//! ```no_run
//! use procam_calib::{calibrate_projector, IntakeOutcome};
//! # fn run(outcome: IntakeOutcome) -> Result<(), Box<dyn std::error::Error>> {
//! use procam_core::{ImageSize, TermCriteria};
//!
//! if let IntakeOutcome::Completed { correspondences, camera_image_size } = outcome {
//!     let calib = calibrate_projector(
//!         &correspondences,
//!         camera_image_size,
//!         ImageSize::new(1024, 768),
//!         TermCriteria::default(),
//!     )?;
//!     calib.to_report("rig").write_json("rig.json")?;
//! }
//! # Ok(())
//! # }
//! ```

mod backproject;
mod calibrate;
mod camera;
mod correspondence;
mod detect;
mod init;
mod intake;
mod io;
mod lm;
mod pipeline;
mod report;
pub mod synthetic;

pub use backproject::{back_project_to_plane, BackprojectError};
pub use calibrate::{calibrate_camera, CalibrationError, CalibrationResult};
pub use camera::{CameraModel, Distortion, Intrinsics, Pose};
pub use correspondence::{CorrespondenceSet, FrameCorrespondence};
pub use detect::ChessboardPatternDetector;
pub use init::{initial_intrinsics, pose_from_homography};
pub use intake::{
    AutoAccept, CaptureSink, Decision, DecisionSource, FrameReview, FrameSource, IntakeError,
    IntakeOutcome, IntakeSession, IntakeState, PatternDetector, ScriptedDecisions,
};
pub use io::{image_size, load_gray, DirectoryFrameSource, PngCaptureSink, ReaderDecisions};
pub use lm::{minimize, LmError, LmSummary};
pub use pipeline::{calibrate_projector, PipelineError, ProCamCalibration};
pub use report::{CalibrationReport, DeviceReport};
