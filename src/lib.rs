pub mod camera;
pub mod config;
pub mod error;
pub mod renderer;
pub mod scene;

pub use camera::{CameraRays, CameraRig, EyePath};
pub use config::{BackendKind, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use renderer::{
    CaptureReport, CaptureSession, CaptureSettings, CpuBackend, FfmpegMuxer, GpuBackend,
    PixelBuffer, PngSequenceEncoder, RaytraceBackend, ResizePolicy,
};
pub use scene::{animate, ObjectSet, SceneFrame};
