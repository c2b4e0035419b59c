use std::path::{Path, PathBuf};
use std::time::Instant;

use image::imageops::FilterType;

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Replays a directory of still images as a camera feed.
///
/// Files are played in name order and resized to the configured camera
/// resolution. Undecodable files are skipped with a warning.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    position: usize,
    looping: bool,
    width: u32,
    height: u32,
    sequence: u64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, width: u32, height: u32, looping: bool) -> Result<Self, CaptureError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CaptureError::Failed(format!("{}: {e}", dir.display())))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(CaptureError::Failed(format!(
                "no images found in {}",
                dir.display()
            )));
        }
        log::info!("Replaying {} images from {}", paths.len(), dir.display());

        Ok(Self {
            paths,
            position: 0,
            looping,
            width,
            height,
            sequence: 0,
        })
    }

    fn decode(&self, path: &Path) -> Result<Vec<u8>, image::ImageError> {
        let rgb = image::open(path)?.to_rgb8();
        let resized = if rgb.dimensions() == (self.width, self.height) {
            rgb
        } else {
            image::imageops::resize(&rgb, self.width, self.height, FilterType::Triangle)
        };
        Ok(resized.into_raw())
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        for _ in 0..self.paths.len() {
            if self.position >= self.paths.len() {
                if !self.looping {
                    return Err(CaptureError::Ended);
                }
                self.position = 0;
            }
            let path = &self.paths[self.position];
            self.position += 1;

            match self.decode(path) {
                Ok(pixels) => {
                    let frame = Frame::captured(
                        pixels,
                        self.width,
                        self.height,
                        3,
                        self.sequence,
                        Instant::now(),
                    );
                    self.sequence += 1;
                    return Ok(frame);
                }
                Err(e) => log::warn!("Skipping {}: {e}", path.display()),
            }
        }
        if self.position >= self.paths.len() && !self.looping {
            return Err(CaptureError::Ended);
        }
        Err(CaptureError::Failed("no decodable images".into()))
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
