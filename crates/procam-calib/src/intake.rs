//! Frame intake: turn a stream of camera frames into accepted correspondences.
//!
//! The session is an explicit state machine. Frames, detection, decisions and
//! capture persistence are all behind traits so a session can be driven by a
//! directory of images and scripted decisions as easily as by a live rig.
//!
//! ```text
//! WaitingForFrame -> DetectingFeatures -> AwaitingDecision -> WaitingForFrame
//!                                      \-> NoPatternFound -> WaitingForFrame
//! WaitingForFrame -> Done      (accepted == target)
//! AwaitingDecision -> Aborted  (Decision::Abort)
//! ```

use std::collections::VecDeque;
use std::fmt;

use nalgebra::{Point2, Point3};
use procam_core::{
    object_points, projector_points, CalibrationSettings, GrayImage, GrayImageView, GridSize,
    ImageSize, PatternKind, WindowSize,
};

use crate::calibrate::CalibrationError;
use crate::correspondence::{CorrespondenceSet, FrameCorrespondence};

#[derive(thiserror::Error, Debug)]
pub enum IntakeError {
    #[error("only chessboard patterns can be detected (camera: {camera}, projector: {projector})")]
    UnsupportedPattern {
        camera: PatternKind,
        projector: PatternKind,
    },
    #[error("frame source ran out after {accepted} of {target} accepted frames")]
    FramesExhausted { accepted: usize, target: usize },
    #[error("intake finished before any frame fixed the camera image size")]
    UnknownImageSize,
    #[error(transparent)]
    Correspondence(#[from] CalibrationError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// A source of grayscale frames; `Ok(None)` when there are no more.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, IntakeError>;
}

/// Finds `size` inner corners in a frame, refined with a `window` half-size
/// search. Corners are returned row-major, `size.height` rows of
/// `size.width` points.
pub trait PatternDetector {
    fn detect(
        &mut self,
        image: &GrayImageView<'_>,
        size: GridSize,
        window: WindowSize,
    ) -> Option<Vec<Point2<f64>>>;
}

/// What to do with a frame where both patterns were found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Discard,
    Abort,
}

/// Everything a decision source may show before deciding.
#[derive(Clone, Copy, Debug)]
pub struct FrameReview<'a> {
    /// Index of the frame in the source, counting every frame read.
    pub frame_index: usize,
    pub accepted: usize,
    pub target: usize,
    pub image: &'a GrayImage,
    pub camera_corners: &'a [Point2<f64>],
    pub projector_corners: &'a [Point2<f64>],
}

pub trait DecisionSource {
    fn decide(&mut self, review: &FrameReview<'_>) -> Result<Decision, IntakeError>;
}

/// Persists accepted frames; `index` counts accepted frames from zero.
pub trait CaptureSink {
    fn save(&mut self, index: usize, image: &GrayImage) -> Result<(), IntakeError>;
}

/// Accepts every frame with both patterns in view.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoAccept;

impl DecisionSource for AutoAccept {
    fn decide(&mut self, _review: &FrameReview<'_>) -> Result<Decision, IntakeError> {
        Ok(Decision::Accept)
    }
}

/// Replays a fixed list of decisions; aborts once the list is used up.
#[derive(Clone, Debug, Default)]
pub struct ScriptedDecisions {
    script: VecDeque<Decision>,
}

impl ScriptedDecisions {
    pub fn new(script: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl DecisionSource for ScriptedDecisions {
    fn decide(&mut self, _review: &FrameReview<'_>) -> Result<Decision, IntakeError> {
        Ok(self.script.pop_front().unwrap_or(Decision::Abort))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntakeState {
    WaitingForFrame,
    DetectingFeatures,
    AwaitingDecision,
    NoPatternFound,
    Done,
    Aborted,
}

impl IntakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntakeState::Done | IntakeState::Aborted)
    }
}

impl fmt::Display for IntakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntakeState::WaitingForFrame => "waiting for frame",
            IntakeState::DetectingFeatures => "detecting features",
            IntakeState::AwaitingDecision => "awaiting decision",
            IntakeState::NoPatternFound => "no pattern found",
            IntakeState::Done => "done",
            IntakeState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum IntakeOutcome {
    /// The target number of frames was accepted.
    Completed {
        correspondences: CorrespondenceSet,
        camera_image_size: ImageSize,
    },
    /// The session was aborted; nothing should be calibrated.
    Aborted { accepted: usize },
}

struct PendingFrame {
    image: GrayImage,
    camera: Vec<Point2<f64>>,
    projector: Vec<Point2<f64>>,
}

/// One capture session for a camera/projector pair.
pub struct IntakeSession<'a> {
    camera: &'a CalibrationSettings,
    projector: &'a CalibrationSettings,
    frames: &'a mut dyn FrameSource,
    detector: &'a mut dyn PatternDetector,
    decisions: &'a mut dyn DecisionSource,
    sink: Option<&'a mut dyn CaptureSink>,

    state: IntakeState,
    camera_object: Vec<Point3<f64>>,
    projector_pattern: Vec<Point2<f64>>,
    image_size: Option<ImageSize>,
    correspondences: CorrespondenceSet,
    pending: Option<PendingFrame>,
    frames_read: usize,
}

impl<'a> IntakeSession<'a> {
    /// Start a session; both devices must use chessboard patterns.
    pub fn new(
        camera: &'a CalibrationSettings,
        projector: &'a CalibrationSettings,
        frames: &'a mut dyn FrameSource,
        detector: &'a mut dyn PatternDetector,
        decisions: &'a mut dyn DecisionSource,
    ) -> Result<Self, IntakeError> {
        if camera.pattern_kind != PatternKind::Chessboard
            || projector.pattern_kind != PatternKind::Chessboard
        {
            return Err(IntakeError::UnsupportedPattern {
                camera: camera.pattern_kind,
                projector: projector.pattern_kind,
            });
        }

        Ok(Self {
            camera,
            projector,
            frames,
            detector,
            decisions,
            sink: None,
            state: IntakeState::WaitingForFrame,
            camera_object: object_points(
                camera.pattern_kind,
                camera.pattern_size,
                camera.square_size,
            ),
            projector_pattern: projector_points(
                projector.pattern_kind,
                projector.pattern_size,
                projector.square_size,
            ),
            image_size: camera.image_size.filter(|s| !s.is_empty()),
            correspondences: CorrespondenceSet::new(),
            pending: None,
            frames_read: 0,
        })
    }

    pub fn with_capture_sink(mut self, sink: &'a mut dyn CaptureSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn state(&self) -> IntakeState {
        self.state
    }

    pub fn accepted(&self) -> usize {
        self.correspondences.len()
    }

    pub fn target(&self) -> usize {
        self.camera.frame_count
    }

    /// Camera image size, once known.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    /// Advance by one transition and return the new state.
    pub fn step(&mut self) -> Result<IntakeState, IntakeError> {
        let next = match self.state {
            IntakeState::WaitingForFrame => self.wait_for_frame()?,
            IntakeState::DetectingFeatures => self.detect_features(),
            IntakeState::NoPatternFound => {
                self.pending = None;
                IntakeState::WaitingForFrame
            }
            IntakeState::AwaitingDecision => self.await_decision()?,
            terminal @ (IntakeState::Done | IntakeState::Aborted) => terminal,
        };
        if next != self.state {
            log::debug!("intake: {} -> {}", self.state, next);
        }
        self.state = next;
        Ok(next)
    }

    /// Step until the session is done or aborted.
    pub fn run(mut self) -> Result<IntakeOutcome, IntakeError> {
        while !self.state.is_terminal() {
            self.step()?;
        }
        self.into_outcome()
    }

    fn into_outcome(self) -> Result<IntakeOutcome, IntakeError> {
        if self.state != IntakeState::Done {
            return Ok(IntakeOutcome::Aborted {
                accepted: self.correspondences.len(),
            });
        }
        let camera_image_size = self.image_size.ok_or(IntakeError::UnknownImageSize)?;
        Ok(IntakeOutcome::Completed {
            correspondences: self.correspondences,
            camera_image_size,
        })
    }

    fn wait_for_frame(&mut self) -> Result<IntakeState, IntakeError> {
        if self.correspondences.len() >= self.target() {
            return Ok(IntakeState::Done);
        }
        let Some(image) = self.frames.next_frame()? else {
            return Err(IntakeError::FramesExhausted {
                accepted: self.correspondences.len(),
                target: self.target(),
            });
        };
        self.frames_read += 1;

        let size = ImageSize::new(image.width, image.height);
        match self.image_size {
            None => {
                log::debug!("camera image size {}x{} from first frame", size.width, size.height);
                self.image_size = Some(size);
            }
            Some(expected) if expected != size => {
                log::warn!(
                    "frame {}: size {}x{} differs from {}x{}, skipped",
                    self.frames_read - 1,
                    size.width,
                    size.height,
                    expected.width,
                    expected.height
                );
                return Ok(IntakeState::WaitingForFrame);
            }
            Some(_) => {}
        }

        self.pending = Some(PendingFrame {
            image,
            camera: Vec::new(),
            projector: Vec::new(),
        });
        Ok(IntakeState::DetectingFeatures)
    }

    fn detect_features(&mut self) -> IntakeState {
        let Some(pending) = self.pending.as_mut() else {
            return IntakeState::WaitingForFrame;
        };
        let view = pending.image.view();
        let camera = self.detector.detect(
            &view,
            self.camera.pattern_size,
            self.camera.sub_pixel_window,
        );
        let projector = self.detector.detect(
            &view,
            self.projector.pattern_size,
            self.projector.sub_pixel_window,
        );
        match (camera, projector) {
            (Some(camera), Some(projector)) => {
                log::debug!("frame {}: both patterns found", self.frames_read - 1);
                pending.camera = camera;
                pending.projector = projector;
                IntakeState::AwaitingDecision
            }
            (camera, projector) => {
                log::debug!(
                    "frame {}: no pattern (camera {}, projector {})",
                    self.frames_read - 1,
                    if camera.is_some() { "found" } else { "missing" },
                    if projector.is_some() { "found" } else { "missing" }
                );
                IntakeState::NoPatternFound
            }
        }
    }

    fn await_decision(&mut self) -> Result<IntakeState, IntakeError> {
        let Some(pending) = self.pending.take() else {
            return Ok(IntakeState::WaitingForFrame);
        };
        let accepted = self.correspondences.len();
        let frame_index = self.frames_read - 1;
        let review = FrameReview {
            frame_index,
            accepted,
            target: self.target(),
            image: &pending.image,
            camera_corners: &pending.camera,
            projector_corners: &pending.projector,
        };

        match self.decisions.decide(&review)? {
            Decision::Accept => {
                if let Some(sink) = self.sink.as_mut() {
                    sink.save(accepted, &pending.image)?;
                }
                self.correspondences.push(FrameCorrespondence {
                    camera_object: self.camera_object.clone(),
                    camera_image: pending.camera,
                    projector_pattern: self.projector_pattern.clone(),
                    projector_image: pending.projector,
                })?;
                log::info!("accepted frame {} of {}", accepted + 1, self.target());
                Ok(IntakeState::WaitingForFrame)
            }
            Decision::Discard => {
                log::info!("frame {frame_index} discarded");
                Ok(IntakeState::WaitingForFrame)
            }
            Decision::Abort => {
                log::info!("intake aborted after {accepted} accepted frames");
                Ok(IntakeState::Aborted)
            }
        }
    }
}
