pub mod backend;
pub mod cpu_backend;
pub mod encoder;
pub mod gpu_backend;
pub mod gpu_context;
pub mod pixel_buffer;
pub mod session;
pub mod timeline;
pub mod uploader;

pub use backend::{BindingSlot, RaytraceBackend, CAMERA_BINDING, TRANSFORM_WORKGROUPS};
pub use cpu_backend::CpuBackend;
pub use encoder::{FfmpegMuxer, FrameEncoder, MuxJob, MuxOutcome, PngSequenceEncoder, VideoMuxer};
pub use gpu_backend::GpuBackend;
pub use gpu_context::GpuContext;
pub use pixel_buffer::PixelBuffer;
pub use session::{
    BackendHandles, CaptureReport, CaptureSession, CaptureSettings, CapturePhase, FrameManifest,
    FrameRecord, ResizePolicy, SessionState,
};
pub use timeline::{FpsCounter, VideoClock};
pub use uploader::{PackedFrame, SceneUploader};
