use std::path::{Path, PathBuf};

use clap::ValueEnum;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::camera::{CameraRig, EyePath};
use crate::error::{SessionError, SessionResult};
use crate::renderer::{CaptureSettings, ResizePolicy};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_NAME: &str = "raytrace-capture";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionConfig {
    pub video: VideoConfig,
    pub camera: CameraConfig,
    pub output: OutputConfig,
    pub renderer: RendererConfig,
    pub session: LifecycleConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Whole seconds, so the frame count is always exact
    pub duration_seconds: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CameraConfig {
    pub eye: [f32; 3],
    pub target: [f32; 3],
    pub up: [f32; 3],
    pub fov_degrees: f32,
    /// Replaces the fixed eye when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orbit: Option<OrbitConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct OrbitConfig {
    pub radius: f32,
    pub height: f32,
    pub speed: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    pub frames_dir: PathBuf,
    /// 0 means plain decimal names
    pub frame_digits: usize,
    pub video_path: PathBuf,
    pub mux: bool,
    pub ffmpeg: PathBuf,
    pub manifest: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RendererConfig {
    pub backend: BackendKind,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LifecycleConfig {
    pub resize: ResizePolicy,
}

/// Which ray-tracing backend a session runs on
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU when an adapter exists, CPU otherwise
    #[default]
    Auto,
    Gpu,
    Cpu,
}

/// Values given on the command line; they win over every other layer.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub duration_seconds: Option<u32>,
    pub frames_dir: Option<PathBuf>,
    pub video_path: Option<PathBuf>,
    pub backend: Option<BackendKind>,
    pub frame_digits: Option<usize>,
    pub no_mux: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            video: VideoConfig {
                width: 1280,
                height: 720,
                fps: 60,
                duration_seconds: 10,
            },
            camera: CameraConfig {
                eye: [0.0, 8.0, 8.0],
                target: [0.0, 0.5, 0.0],
                up: [0.0, 1.0, 0.0],
                fov_degrees: 45.0,
                orbit: None,
            },
            output: OutputConfig {
                frames_dir: PathBuf::from("exportedFrames"),
                frame_digits: 0,
                video_path: PathBuf::from("capture.mp4"),
                mux: true,
                ffmpeg: PathBuf::from("ffmpeg"),
                manifest: true,
            },
            renderer: RendererConfig {
                backend: BackendKind::Auto,
            },
            session: LifecycleConfig {
                resize: ResizePolicy::Lock,
            },
        }
    }
}

fn path_value(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.display().to_string())
}

impl SessionConfig {
    /// Defaults, then the config file, then `RAYCAPTURE_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::load_with(path, &ConfigOverrides::default())
    }

    /// Like [`SessionConfig::load`], with command-line values layered on top.
    pub fn load_with(
        path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let builder = config::Config::builder()
            .set_default("video.width", defaults.video.width)?
            .set_default("video.height", defaults.video.height)?
            .set_default("video.fps", defaults.video.fps)?
            .set_default("video.duration_seconds", defaults.video.duration_seconds)?
            .set_default("camera.eye", defaults.camera.eye.map(f64::from).to_vec())?
            .set_default("camera.target", defaults.camera.target.map(f64::from).to_vec())?
            .set_default("camera.up", defaults.camera.up.map(f64::from).to_vec())?
            .set_default("camera.fov_degrees", f64::from(defaults.camera.fov_degrees))?
            .set_default("output.frames_dir", "exportedFrames")?
            .set_default("output.frame_digits", 0)?
            .set_default("output.video_path", "capture.mp4")?
            .set_default("output.mux", true)?
            .set_default("output.ffmpeg", "ffmpeg")?
            .set_default("output.manifest", true)?
            .set_default("renderer.backend", "auto")?
            .set_default("session.resize", "lock")?
            .add_source(file)
            // e.g. RAYCAPTURE_VIDEO__FPS=30
            .add_source(
                config::Environment::with_prefix("RAYCAPTURE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("video.width", overrides.width)?
            .set_override_option("video.height", overrides.height)?
            .set_override_option("video.fps", overrides.fps)?
            .set_override_option("video.duration_seconds", overrides.duration_seconds)?
            .set_override_option("output.frames_dir", path_value(&overrides.frames_dir))?
            .set_override_option("output.video_path", path_value(&overrides.video_path))?
            .set_override_option(
                "output.frame_digits",
                overrides.frame_digits.map(|d| d as u64),
            )?
            .set_override_option(
                "renderer.backend",
                overrides.backend.map(|b| b.as_str().to_string()),
            )?
            .set_override_option("output.mux", overrides.no_mux.then_some(false))?;

        builder.build()?.try_deserialize()
    }

    /// Camera description the session renders with.
    pub fn camera_rig(&self) -> CameraRig {
        let path = match self.camera.orbit {
            Some(orbit) => EyePath::Orbit {
                radius: orbit.radius,
                height: orbit.height,
                speed: orbit.speed,
            },
            None => EyePath::Fixed {
                position: self.camera.eye,
            },
        };
        CameraRig {
            path,
            target: Vec3::from_array(self.camera.target),
            up: Vec3::from_array(self.camera.up),
            fov_degrees: self.camera.fov_degrees,
        }
    }

    /// Session parameters, without validation.
    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            width: self.video.width,
            height: self.video.height,
            fps: self.video.fps,
            duration_seconds: self.video.duration_seconds,
            camera: self.camera_rig(),
            resize: self.session.resize,
            video_path: self.output.video_path.clone(),
            manifest: self.output.manifest,
        }
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.output.frames_dir.as_os_str().is_empty() {
            return Err(SessionError::config("output.frames_dir is empty"));
        }
        if self.output.frame_digits > 10 {
            return Err(SessionError::config(format!(
                "output.frame_digits must be at most 10, got {}",
                self.output.frame_digits
            )));
        }
        self.capture_settings().validate()
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> SessionResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SessionError::config(format!("cannot serialize config: {e}")))
    }
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Gpu => "gpu",
            Self::Cpu => "cpu",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_round_trip_through_loader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.toml");
        fs::write(&path, "").unwrap();

        let loaded = SessionConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, SessionConfig::default());
        loaded.validate().unwrap();
    }

    #[test]
    fn test_file_layer_and_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.toml");
        fs::write(
            &path,
            "[video]\nfps = 30\nwidth = 640\n\n[renderer]\nbackend = \"cpu\"\n\n[camera.orbit]\nradius = 8.0\nheight = 8.0\nspeed = 0.5\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            width: Some(320),
            no_mux: true,
            ..ConfigOverrides::default()
        };
        let cfg = SessionConfig::load_with(Some(&path), &overrides).unwrap();
        assert_eq!(cfg.video.fps, 30);
        assert_eq!(cfg.video.width, 320);
        assert_eq!(cfg.video.height, 720);
        assert_eq!(cfg.renderer.backend, BackendKind::Cpu);
        assert!(!cfg.output.mux);
        assert!(matches!(cfg.camera_rig().path, EyePath::Orbit { .. }));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(SessionConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = SessionConfig::default();
        cfg.video.duration_seconds = 0;
        assert!(matches!(
            cfg.validate(),
            Err(SessionError::Configuration(_))
        ));

        let mut cfg = SessionConfig::default();
        cfg.camera.up = [0.0, -7.5, -8.0];
        assert!(cfg.validate().is_err());

        let mut cfg = SessionConfig::default();
        cfg.output.frames_dir = PathBuf::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_to_toml_lists_sections() {
        let text = SessionConfig::default().to_toml().unwrap();
        assert!(text.contains("[video]"));
        assert!(text.contains("fps = 60"));
        assert!(text.contains("backend = \"auto\""));
        assert!(text.contains("resize = \"lock\""));
        assert!(!text.contains("orbit"));
    }
}
