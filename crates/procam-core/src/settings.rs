//! Calibration settings for one device (camera or projector).
//!
//! Settings files are flat key/value maps. Two encodings are accepted: a JSON
//! object (files ending in `.json`) or the YAML written by OpenCV
//! `FileStorage`. Missing keys keep their defaults; unknown keys are ignored.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{GridSize, PatternKind};

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Half-size of the sub-pixel search window, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: usize,
    pub height: usize,
}

impl WindowSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

/// Image dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

impl ImageSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Immutable calibration configuration loaded once per device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSettings {
    pub pattern_kind: PatternKind,
    pub pattern_size: GridSize,
    pub sub_pixel_window: WindowSize,
    /// Image size, when the settings file names one.
    pub image_size: Option<ImageSize>,
    pub square_size: f64,
    pub frame_count: usize,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            pattern_kind: PatternKind::Chessboard,
            pattern_size: GridSize::new(13, 9),
            sub_pixel_window: WindowSize::new(11, 11),
            image_size: None,
            square_size: 50.0,
            frame_count: 25,
        }
    }
}

/// On-disk key layout.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct SettingsFile {
    pattern_width: usize,
    pattern_height: usize,
    sub_pixel_width: usize,
    sub_pixel_height: usize,
    square_size: f64,
    nbr_of_frames: usize,
    pattern_type: PatternKind,
    image_width: usize,
    image_height: usize,
}

impl Default for SettingsFile {
    fn default() -> Self {
        let d = CalibrationSettings::default();
        Self {
            pattern_width: d.pattern_size.width,
            pattern_height: d.pattern_size.height,
            sub_pixel_width: d.sub_pixel_window.width,
            sub_pixel_height: d.sub_pixel_window.height,
            square_size: d.square_size,
            nbr_of_frames: d.frame_count,
            pattern_type: d.pattern_kind,
            image_width: 0,
            image_height: 0,
        }
    }
}

impl From<SettingsFile> for CalibrationSettings {
    fn from(f: SettingsFile) -> Self {
        let image_size = ImageSize::new(f.image_width, f.image_height);
        Self {
            pattern_kind: f.pattern_type,
            pattern_size: GridSize::new(f.pattern_width, f.pattern_height),
            sub_pixel_window: WindowSize::new(f.sub_pixel_width, f.sub_pixel_height),
            image_size: (!image_size.is_empty()).then_some(image_size),
            square_size: f.square_size,
            frame_count: f.nbr_of_frames,
        }
    }
}

impl CalibrationSettings {
    /// Load and validate settings from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let settings = if is_json {
            Self::from_json_str(&raw)?
        } else {
            Self::from_yaml_str(&raw)?
        };
        log::debug!("loaded settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, SettingsError> {
        let file: SettingsFile = serde_json::from_str(raw)?;
        Self::from(file).validated()
    }

    /// Parse OpenCV `FileStorage` YAML. The `%YAML:1.0` directive line is
    /// not valid YAML 1.2 and is dropped before parsing.
    pub fn from_yaml_str(raw: &str) -> Result<Self, SettingsError> {
        let body: String = raw
            .lines()
            .filter(|line| !line.trim_start().starts_with('%'))
            .map(|line| format!("{line}\n"))
            .collect();
        let has_content = body.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#') && line != "---"
        });
        let file = if has_content {
            serde_yaml::from_str::<SettingsFile>(&body)?
        } else {
            SettingsFile::default()
        };
        Self::from(file).validated()
    }

    fn validated(self) -> Result<Self, SettingsError> {
        if self.pattern_size.width == 0 || self.pattern_size.height == 0 {
            return Err(SettingsError::Invalid(format!(
                "pattern size must be positive, got {}",
                self.pattern_size
            )));
        }
        if self.sub_pixel_window.width == 0 || self.sub_pixel_window.height == 0 {
            return Err(SettingsError::Invalid(
                "sub-pixel window must be positive".into(),
            ));
        }
        if !(self.square_size.is_finite() && self.square_size > 0.0) {
            return Err(SettingsError::Invalid(format!(
                "square size must be positive, got {}",
                self.square_size
            )));
        }
        if self.frame_count == 0 {
            return Err(SettingsError::Invalid("frame count must be at least 1".into()));
        }
        Ok(self)
    }
}
