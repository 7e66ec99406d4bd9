//! File-backed intake collaborators: image directories, PNG captures and
//! line-oriented decisions.

use std::collections::VecDeque;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use image::ImageReader;
use procam_core::{GrayImage, ImageSize};

use crate::intake::{
    CaptureSink, Decision, DecisionSource, FrameReview, FrameSource, IntakeError,
};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "pgm"];

/// Decode any supported image file as 8-bit grayscale.
pub fn load_gray(path: impl AsRef<Path>) -> Result<GrayImage, IntakeError> {
    let img = ImageReader::open(path.as_ref())?.decode()?.to_luma8();
    let (width, height) = (img.width() as usize, img.height() as usize);
    GrayImage::from_raw(width, height, img.into_raw()).ok_or_else(|| {
        IntakeError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("decoded buffer does not match {width}x{height}"),
        ))
    })
}

/// Pixel dimensions of an image file, read from its header.
pub fn image_size(path: impl AsRef<Path>) -> Result<ImageSize, IntakeError> {
    let (w, h) = image::image_dimensions(path.as_ref())?;
    Ok(ImageSize::new(w as usize, h as usize))
}

/// Frames read from the image files of one directory, in file-name order.
#[derive(Clone, Debug)]
pub struct DirectoryFrameSource {
    paths: VecDeque<PathBuf>,
}

impl DirectoryFrameSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_frame && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        log::info!("{} frames in {}", paths.len(), dir.as_ref().display());
        Ok(Self {
            paths: paths.into(),
        })
    }

    /// Frames not yet read.
    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, IntakeError> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        log::debug!("reading frame {}", path.display());
        load_gray(&path).map(Some)
    }
}

/// Writes accepted frames to `dir/capture{index}.png`.
#[derive(Clone, Debug)]
pub struct PngCaptureSink {
    dir: PathBuf,
}

impl PngCaptureSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, IntakeError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("capture{index}.png"))
    }
}

impl CaptureSink for PngCaptureSink {
    fn save(&mut self, index: usize, image: &GrayImage) -> Result<(), IntakeError> {
        let path = self.path_for(index);
        image::save_buffer(
            &path,
            &image.data,
            image.width as u32,
            image.height as u32,
            image::ColorType::L8,
        )?;
        log::info!("wrote {}", path.display());
        Ok(())
    }
}

/// Reads one decision per line: empty accepts, `d` or a space discards,
/// `q` or `esc` aborts. End of input aborts; anything else discards.
pub struct ReaderDecisions<R, W> {
    input: R,
    prompt: W,
}

impl<R: BufRead, W: Write> ReaderDecisions<R, W> {
    pub fn new(input: R, prompt: W) -> Self {
        Self { input, prompt }
    }
}

fn parse_decision(line: &str) -> Option<Decision> {
    let line = line.trim_end_matches(['\r', '\n']);
    match line {
        "" => return Some(Decision::Accept),
        " " => return Some(Decision::Discard),
        _ => {}
    }
    match line.trim().to_ascii_lowercase().as_str() {
        "d" => Some(Decision::Discard),
        "q" | "esc" | "\u{1b}" => Some(Decision::Abort),
        _ => None,
    }
}

impl<R: BufRead, W: Write> DecisionSource for ReaderDecisions<R, W> {
    fn decide(&mut self, review: &FrameReview<'_>) -> Result<Decision, IntakeError> {
        write!(
            self.prompt,
            "frame {}: pattern found ({}/{} accepted). [enter] accept, [d] discard, [q] abort: ",
            review.frame_index, review.accepted, review.target
        )?;
        self.prompt.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(Decision::Abort);
        }
        Ok(parse_decision(&line).unwrap_or_else(|| {
            log::warn!("unrecognised answer {:?}, frame discarded", line.trim());
            Decision::Discard
        }))
    }
}
