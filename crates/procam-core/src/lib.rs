//! Core types and utilities for camera/projector calibration.
//!
//! This crate is intentionally small and purely geometric. It holds the
//! calibration settings, the synthetic pattern point generators, a lightweight
//! grayscale image view, the homography DLT used to initialise calibration and
//! the stderr logger. It does *not* depend on any concrete image decoder.

mod corner;
mod criteria;
mod homography;
mod image;
mod logger;
mod pattern;
mod settings;

pub use corner::{Corner, GridCoords};
pub use criteria::TermCriteria;
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, GrayImage, GrayImageView};
pub use pattern::{object_points, projector_points, GridSize, PatternKind};
pub use settings::{CalibrationSettings, ImageSize, SettingsError, WindowSize};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
