//! Frame Capture & Export Loop.
//!
//! A session walks `Init -> Running -> Draining -> Done`: it renders exactly
//! `fps * duration_seconds` frames, each driven only by video time, hands every
//! readback to the still-image encoder, releases the backend and finally asks
//! the muxer for a video. Mux failures end up in the report, not in the result.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::camera::CameraRig;
use crate::error::{SessionError, SessionResult};
use crate::renderer::backend::RaytraceBackend;
use crate::renderer::encoder::{FrameEncoder, MuxJob, MuxOutcome, VideoMuxer};
use crate::renderer::timeline::{FpsCounter, VideoClock};
use crate::renderer::uploader::SceneUploader;
use crate::renderer::PixelBuffer;
use crate::scene::{ObjectSet, SceneState};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePhase {
    Init,
    Running,
    Draining,
    Done,
}

/// What to do when the window collaborator reports a new size mid-session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizePolicy {
    /// Keep every frame at the configured size
    #[default]
    Lock,
    /// Resize viewport and readback buffer at the next iteration boundary
    Follow,
}

/// Fixed-at-start session parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_seconds: u32,
    pub camera: CameraRig,
    pub resize: ResizePolicy,
    pub video_path: PathBuf,
    pub manifest: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 60,
            duration_seconds: 10,
            camera: CameraRig::default(),
            resize: ResizePolicy::Lock,
            video_path: PathBuf::from("capture.mp4"),
            manifest: true,
        }
    }
}

impl CaptureSettings {
    pub fn max_frames(&self) -> u32 {
        self.fps.saturating_mul(self.duration_seconds)
    }

    /// Reject anything that would fail mid-session.
    ///
    /// The camera is checked at every frame's eye position, so a moving eye
    /// that lines up with `up` is caught here rather than at that frame.
    pub fn validate(&self) -> SessionResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SessionError::config(format!(
                "output size {}x{} has no area",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(SessionError::config("fps must be positive"));
        }
        if self.duration_seconds == 0 {
            return Err(SessionError::config("duration must be at least one second"));
        }
        if self.fps.checked_mul(self.duration_seconds).is_none() {
            return Err(SessionError::config("frame count overflows"));
        }

        let clock = VideoClock::new(self.fps, self.duration_seconds);
        for frame in 0..clock.total_frames() {
            self.camera
                .rays_at(clock.frame_to_time(frame), self.width, self.height)
                .map_err(|e| match e {
                    SessionError::Configuration(msg) => {
                        SessionError::Configuration(format!("camera at frame {frame}: {msg}"))
                    }
                    other => other,
                })?;
        }
        Ok(())
    }
}

/// Owns the backend for the lifetime of a session and releases it exactly
/// once, either explicitly when draining or on drop after an early abort.
pub struct BackendHandles<B: RaytraceBackend> {
    backend: B,
    released: bool,
}

impl<B: RaytraceBackend> BackendHandles<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            released: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn release(&mut self) {
        if !self.released {
            self.backend.release();
            self.released = true;
            debug!("released {} backend", self.backend.name());
        }
    }
}

impl<B: RaytraceBackend> Drop for BackendHandles<B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Everything the loop body mutates, passed around explicitly.
pub struct SessionState<B: RaytraceBackend> {
    pub clock: VideoClock,
    pub scene: SceneState,
    pub backend: BackendHandles<B>,
}

/// One exported frame in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub index: u32,
    pub file: String,
    pub width: u32,
    pub height: u32,
    pub sha256: String,
}

/// Written next to the frames; digests make reruns comparable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameManifest {
    pub fps: u32,
    pub frame_count: u32,
    pub frames: Vec<FrameRecord>,
}

/// Outcome of a completed session
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub backend: String,
    pub frames: u32,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub frames_dir: PathBuf,
    pub manifest: Option<PathBuf>,
    pub mux: MuxOutcome,
    pub elapsed_seconds: f64,
}

/// Drives a backend through one frame-exact capture.
pub struct CaptureSession<B: RaytraceBackend> {
    settings: CaptureSettings,
    state: SessionState<B>,
    uploader: SceneUploader,
    pixels: PixelBuffer,
    size: (u32, u32),
    phase: CapturePhase,
    records: Vec<FrameRecord>,
}

impl<B: RaytraceBackend> CaptureSession<B> {
    /// Validate everything up front; nothing touches the backend here.
    pub fn new(settings: CaptureSettings, objects: ObjectSet, backend: B) -> SessionResult<Self> {
        settings.validate()?;
        let uploader = SceneUploader::new(&objects)?;
        let scene = SceneState::new(objects)?;
        let clock = VideoClock::new(settings.fps, settings.duration_seconds);
        let size = (settings.width, settings.height);

        Ok(Self {
            state: SessionState {
                clock,
                scene,
                backend: BackendHandles::new(backend),
            },
            uploader,
            pixels: PixelBuffer::new(0, 0),
            size,
            phase: CapturePhase::Init,
            records: Vec::new(),
            settings,
        })
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    /// Current readback buffer; empty outside `Running`.
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// Run the session to completion.
    pub fn run(
        &mut self,
        encoder: &mut dyn FrameEncoder,
        muxer: Option<&dyn VideoMuxer>,
    ) -> SessionResult<CaptureReport> {
        let started = Instant::now();
        self.init(encoder)?;

        self.phase = CapturePhase::Running;
        let mut fps = FpsCounter::new();
        let max_frames = self.state.clock.total_frames();
        info!(
            "🎬 Capturing {} frames at {} fps ({}x{}) with the {} backend",
            max_frames,
            self.settings.fps,
            self.size.0,
            self.size.1,
            self.state.backend.backend().name()
        );

        while !self.state.clock.is_finished() {
            self.render_frame(encoder)?;
            if let Some(rate) = fps.tick() {
                info!(
                    "FPS: {} Frame: {} / {}",
                    rate,
                    self.state.clock.frame() + 1,
                    max_frames
                );
            }
            self.state.clock.advance();
        }

        self.phase = CapturePhase::Draining;
        self.state.backend.release();
        self.pixels = PixelBuffer::new(0, 0);

        self.phase = CapturePhase::Done;
        let manifest = if self.settings.manifest {
            Some(self.write_manifest(encoder.output_dir())?)
        } else {
            None
        };
        let mux = self.mux(encoder, muxer);

        Ok(CaptureReport {
            backend: self.state.backend.backend().name().to_string(),
            frames: self.records.len() as u32,
            fps: self.settings.fps,
            width: self.size.0,
            height: self.size.1,
            frames_dir: encoder.output_dir().to_path_buf(),
            manifest,
            mux,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        })
    }

    fn init(&mut self, encoder: &mut dyn FrameEncoder) -> SessionResult<()> {
        let (width, height) = self.size;
        self.pixels = PixelBuffer::new(width, height);
        encoder.prepare()?;

        let backend = self.state.backend.backend_mut();
        backend.resize(width, height)?;
        self.uploader.upload_static(backend)
    }

    fn render_frame(&mut self, encoder: &mut dyn FrameEncoder) -> SessionResult<()> {
        self.apply_pending_resize()?;

        let index = self.state.clock.frame();
        let video_time = self.state.clock.video_time();
        let (width, height) = self.size;

        let frame = *self.state.scene.advance(video_time);
        let rays = self.settings.camera.rays_at(video_time, width, height)?;

        let backend = self.state.backend.backend_mut();
        self.uploader.upload_frame(backend, &frame, &rays)?;
        self.uploader.dispatch(backend)?;
        backend.read_pixels(&mut self.pixels)?;

        let path = encoder.encode(index, &self.pixels)?;
        self.records.push(FrameRecord {
            index,
            file: file_name(&path),
            width,
            height,
            sha256: self.pixels.digest(),
        });
        debug!("frame {} at t={:.4}s -> {}", index, video_time, path.display());
        Ok(())
    }

    /// Only ever runs between frames, so no frame sees a half-resized backend.
    fn apply_pending_resize(&mut self) -> SessionResult<()> {
        let backend = self.state.backend.backend_mut();
        let Some((width, height)) = backend.pending_resize() else {
            return Ok(());
        };
        if (width, height) == self.size {
            return Ok(());
        }
        if width == 0 || height == 0 {
            debug!("ignoring {}x{} window size", width, height);
            return Ok(());
        }

        match self.settings.resize {
            ResizePolicy::Lock => {
                warn!(
                    "window resized to {}x{}; frames stay at {}x{}",
                    width, height, self.size.0, self.size.1
                );
            }
            ResizePolicy::Follow => {
                info!("resizing capture to {}x{}", width, height);
                backend.resize(width, height)?;
                self.pixels.resize(width, height);
                self.size = (width, height);
            }
        }
        Ok(())
    }

    fn write_manifest(&self, dir: &Path) -> SessionResult<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        let manifest = FrameManifest {
            fps: self.settings.fps,
            frame_count: self.records.len() as u32,
            frames: self.records.clone(),
        };

        let file = File::create(&path).map_err(|e| SessionError::io(&path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &manifest).map_err(|e| {
            SessionError::io(&path, std::io::Error::other(e))
        })?;
        debug!("manifest written to {}", path.display());
        Ok(path)
    }

    fn mux(&self, encoder: &dyn FrameEncoder, muxer: Option<&dyn VideoMuxer>) -> MuxOutcome {
        let Some(muxer) = muxer else {
            return MuxOutcome::Skipped("muxing disabled".into());
        };
        if !muxer.is_available() {
            warn!("⚠️  FFmpeg not found, skipping video encoding");
            return MuxOutcome::Skipped("muxer not available".into());
        }

        let job = MuxJob {
            input_pattern: encoder.output_dir().join(encoder.pattern()),
            output: &self.settings.video_path,
            fps: self.settings.fps,
            width: self.size.0,
            height: self.size.1,
            frame_count: self.records.len() as u32,
        };
        match muxer.mux(&job) {
            Ok(()) => MuxOutcome::Written(self.settings.video_path.clone()),
            Err(e) => {
                warn!("⚠️  {}", e);
                MuxOutcome::Failed(e.to_string())
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
