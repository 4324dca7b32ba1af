use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};
use serde::Serialize;

use crate::error::{SessionError, SessionResult};
use crate::renderer::PixelBuffer;

/// File name of a frame: plain decimal, or zero-padded to `digits`.
pub fn frame_file_name(index: u32, digits: usize) -> String {
    if digits == 0 {
        format!("{index}.png")
    } else {
        format!("{index:0digits$}.png")
    }
}

/// printf-style input pattern matching [`frame_file_name`], for ffmpeg
pub fn frame_pattern(digits: usize) -> String {
    if digits == 0 {
        "%d.png".to_string()
    } else {
        format!("%0{digits}d.png")
    }
}

/// Still-image encoder service for exported frames
pub trait FrameEncoder {
    /// Get the output location ready; called once before the first frame.
    fn prepare(&mut self) -> SessionResult<()>;

    /// Encode one frame, returning where it was written.
    fn encode(&mut self, index: u32, pixels: &PixelBuffer) -> SessionResult<PathBuf>;

    /// Directory the frames land in.
    fn output_dir(&self) -> &Path;

    /// printf-style pattern the muxer should read frames with.
    fn pattern(&self) -> String;
}

/// Writes lossless PNG frames named by frame index
pub struct PngSequenceEncoder {
    dir: PathBuf,
    digits: usize,
}

impl PngSequenceEncoder {
    pub fn new(dir: impl Into<PathBuf>, digits: usize) -> Self {
        Self {
            dir: dir.into(),
            digits,
        }
    }

    /// Path a given frame is written to
    pub fn frame_path(&self, index: u32) -> PathBuf {
        self.dir.join(frame_file_name(index, self.digits))
    }
}

impl FrameEncoder for PngSequenceEncoder {
    fn prepare(&mut self) -> SessionResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| SessionError::io(&self.dir, e))
    }

    fn encode(&mut self, index: u32, pixels: &PixelBuffer) -> SessionResult<PathBuf> {
        let path = self.frame_path(index);
        let (width, height) = pixels.dimensions();

        image::save_buffer(
            &path,
            pixels.as_bytes(),
            width,
            height,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| match e {
            image::ImageError::IoError(source) => SessionError::io(&path, source),
            other => SessionError::Encode {
                index,
                message: other.to_string(),
            },
        })?;

        debug!("wrote frame {} to {}", index, path.display());
        Ok(path)
    }

    fn output_dir(&self) -> &Path {
        &self.dir
    }

    fn pattern(&self) -> String {
        frame_pattern(self.digits)
    }
}

/// A mux request: every frame of the session, in index order.
#[derive(Debug, Clone)]
pub struct MuxJob<'a> {
    /// Full printf-style input pattern, e.g. `exportedFrames/%d.png`
    pub input_pattern: PathBuf,
    pub output: &'a Path,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
}

/// What happened in the post-loop mux step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum MuxOutcome {
    Written(PathBuf),
    Skipped(String),
    Failed(String),
}

/// External video muxing service
pub trait VideoMuxer {
    /// Whether the service can run at all
    fn is_available(&self) -> bool;

    /// Mux the frame sequence into a single video
    fn mux(&self, job: &MuxJob<'_>) -> SessionResult<()>;
}

/// Handles video muxing using external FFmpeg process
pub struct FfmpegMuxer {
    program: PathBuf,
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegMuxer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for a job; frame numbering starts at 0.
    pub fn args(job: &MuxJob<'_>) -> Vec<String> {
        vec![
            "-y".into(), // Overwrite output
            "-f".into(),
            "image2".into(),
            "-framerate".into(),
            job.fps.to_string(),
            "-start_number".into(),
            "0".into(),
            "-i".into(),
            job.input_pattern.display().to_string(),
            "-frames:v".into(),
            job.frame_count.to_string(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-s".into(),
            format!("{}x{}", job.width, job.height),
            job.output.display().to_string(),
        ]
    }
}

impl VideoMuxer for FfmpegMuxer {
    fn is_available(&self) -> bool {
        Command::new(&self.program).arg("-version").output().is_ok()
    }

    fn mux(&self, job: &MuxJob<'_>) -> SessionResult<()> {
        info!("🎥 Encoding video to {}...", job.output.display());

        let output = Command::new(&self.program)
            .args(Self::args(job))
            .output()
            .map_err(|e| SessionError::Mux(format!("failed to execute ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last = stderr.lines().last().unwrap_or_default();
            return Err(SessionError::Mux(format!(
                "ffmpeg exited with {}: {}",
                output.status, last
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_names() {
        assert_eq!(frame_file_name(0, 0), "0.png");
        assert_eq!(frame_file_name(599, 0), "599.png");
        assert_eq!(frame_file_name(7, 5), "00007.png");
        assert_eq!(frame_pattern(0), "%d.png");
        assert_eq!(frame_pattern(5), "%05d.png");
    }

    #[test]
    fn test_png_encoder_writes_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = PngSequenceEncoder::new(dir.path().join("frames"), 0);
        encoder.prepare().unwrap();

        let mut pixels = PixelBuffer::new(4, 2);
        pixels.set_pixel(3, 0, [255, 0, 0]);
        let path = encoder.encode(12, &pixels).unwrap();

        assert_eq!(path.file_name().unwrap(), "12.png");
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (4, 2));
        assert_eq!(img.get_pixel(3, 0).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(0, 1).0, [0, 0, 0]);
    }

    #[test]
    fn test_encode_into_missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = PngSequenceEncoder::new(dir.path().join("never-created"), 0);
        let err = encoder.encode(0, &PixelBuffer::new(2, 2)).unwrap_err();
        assert!(matches!(err, SessionError::Io { .. }));
    }

    #[test]
    fn test_ffmpeg_args_start_at_zero() {
        let out = PathBuf::from("capture.mp4");
        let job = MuxJob {
            input_pattern: PathBuf::from("exportedFrames").join("%d.png"),
            output: &out,
            fps: 60,
            width: 1280,
            height: 720,
            frame_count: 600,
        };
        let args = FfmpegMuxer::args(&job);
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();

        assert_eq!(args[pos("-framerate") + 1], "60");
        assert_eq!(args[pos("-start_number") + 1], "0");
        assert_eq!(args[pos("-frames:v") + 1], "600");
        assert_eq!(args[pos("-s") + 1], "1280x720");
        assert_eq!(args.last().unwrap(), "capture.mp4");
    }

    #[test]
    fn test_missing_ffmpeg_is_unavailable() {
        let muxer = FfmpegMuxer::new("/nonexistent/ffmpeg-binary");
        assert!(!muxer.is_available());
    }
}
