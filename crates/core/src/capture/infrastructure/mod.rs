pub mod ffmpeg_frame_source;
pub mod frame_pump;
pub mod image_sequence_source;
