use std::path::{Path, PathBuf};
use std::time::Instant;

use ffmpeg_next::format::context::Input;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::shared::frame::Frame;

/// Replays a recorded video file as a camera feed via ffmpeg-next.
///
/// Frames are decoded lazily, one per `next_frame` call, and scaled to the
/// configured camera resolution in RGB24.
pub struct FfmpegFrameSource {
    path: PathBuf,
    decoding: Decoding,
    width: u32,
    height: u32,
    looping: bool,
    sequence: u64,
}

struct Decoding {
    input_ctx: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    video_stream_index: usize,
    flushing: bool,
}

// Safety: the source is owned by the frame pump thread and never shared.
// The raw pointers inside ffmpeg types are not accessed concurrently.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    pub fn open(path: &Path, width: u32, height: u32, looping: bool) -> Result<Self, CaptureError> {
        ffmpeg_next::init().map_err(failed)?;
        let decoding = Decoding::open(path, width, height).map_err(failed)?;
        log::info!(
            "Replaying {} at {width}x{height}{}",
            path.display(),
            if looping { " (looping)" } else { "" }
        );
        Ok(Self {
            path: path.to_path_buf(),
            decoding,
            width,
            height,
            looping,
            sequence: 0,
        })
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, CaptureError> {
        let mut decoded = Video::empty();
        if self.decoding.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = Video::empty();
        self.decoding
            .scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(failed)?;

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let frame = Frame::captured(
            pixels,
            self.width,
            self.height,
            3,
            self.sequence,
            Instant::now(),
        );
        self.sequence += 1;
        Ok(Some(frame))
    }
}

impl Decoding {
    fn open(path: &Path, width: u32, height: u32) -> Result<Self, ffmpeg_next::Error> {
        let input_ctx = ffmpeg_next::format::input(path)?;
        let stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or(ffmpeg_next::Error::StreamNotFound)?;
        let video_stream_index = stream.index();

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            input_ctx,
            decoder,
            scaler,
            video_stream_index,
            flushing: false,
        })
    }
}

impl FrameSource for FfmpegFrameSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        loop {
            if let Some(frame) = self.try_receive()? {
                return Ok(frame);
            }

            if self.decoding.flushing {
                if !self.looping {
                    return Err(CaptureError::Ended);
                }
                self.decoding =
                    Decoding::open(&self.path, self.width, self.height).map_err(failed)?;
                continue;
            }

            let decoding = &mut self.decoding;
            match decoding.input_ctx.packets().next() {
                None => {
                    let _ = decoding.decoder.send_eof();
                    decoding.flushing = true;
                }
                Some((stream, packet)) => {
                    if stream.index() != decoding.video_stream_index {
                        continue;
                    }
                    if let Err(e) = decoding.decoder.send_packet(&packet) {
                        log::debug!("Skipping undecodable packet: {e}");
                    }
                }
            }
        }
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// stripping per-row stride padding.
fn extract_rgb_pixels(rgb_frame: &Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

fn failed(e: ffmpeg_next::Error) -> CaptureError {
    CaptureError::Failed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_fails() {
        let result = FfmpegFrameSource::open(Path::new("/nonexistent/clip.mp4"), 64, 48, false);
        assert!(matches!(result, Err(CaptureError::Failed(_))));
    }

    #[test]
    fn test_open_non_video_fails() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"definitely not a video container").unwrap();

        let result = FfmpegFrameSource::open(tmp.path(), 64, 48, false);

        assert!(result.is_err());
    }
}
