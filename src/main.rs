use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glam::Vec3;
use log::warn;
use raytrace_capture::config::{BackendKind, ConfigOverrides, SessionConfig};
use raytrace_capture::renderer::{
    CaptureSession, CpuBackend, FfmpegMuxer, GpuBackend, MuxOutcome, PngSequenceEncoder,
    RaytraceBackend, VideoMuxer,
};
use raytrace_capture::ObjectSet;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "raytrace-capture")]
#[command(about = "Frame-exact ray-traced scene capture", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// Configuration file (defaults to ./raytrace-capture.toml if present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture the animation to a PNG sequence and a video
    Render {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Output height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// Frames per second of video time
        #[arg(long)]
        fps: Option<u32>,

        /// Duration in whole seconds
        #[arg(long)]
        duration: Option<u32>,

        /// Directory for the exported frames
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Path of the muxed video
        #[arg(long)]
        video: Option<PathBuf>,

        /// Ray-tracing backend
        #[arg(long, value_enum)]
        backend: Option<BackendKind>,

        /// Skip the ffmpeg step
        #[arg(long)]
        no_mux: bool,

        /// Zero-pad frame names to this many digits (0 = plain)
        #[arg(long)]
        frame_digits: Option<usize>,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the camera corner rays at a video time
    Rays {
        #[command(flatten)]
        config: ConfigArgs,

        /// Video time in seconds
        #[arg(short, long, default_value_t = 0.0)]
        time: f32,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            config,
            width,
            height,
            fps,
            duration,
            output,
            video,
            backend,
            no_mux,
            frame_digits,
        } => {
            let overrides = ConfigOverrides {
                width,
                height,
                fps,
                duration_seconds: duration,
                frames_dir: output,
                video_path: video,
                backend,
                frame_digits,
                no_mux,
            };
            let cfg = SessionConfig::load_with(config.config.as_deref(), &overrides)
                .context("Failed to load configuration")?;
            render(&cfg)
        }
        Commands::Config { config } => {
            let cfg = SessionConfig::load(config.config.as_deref())
                .context("Failed to load configuration")?;
            print!("{}", cfg.to_toml()?);
            Ok(())
        }
        Commands::Rays { config, time } => {
            let cfg = SessionConfig::load(config.config.as_deref())
                .context("Failed to load configuration")?;
            let rays = cfg
                .camera_rig()
                .rays_at(time, cfg.video.width, cfg.video.height)?;

            println!("t = {time}s ({}x{})", cfg.video.width, cfg.video.height);
            println!("eye   {}", fmt_vec(rays.eye));
            println!("ray00 {}", fmt_vec(rays.ray00));
            println!("ray01 {}", fmt_vec(rays.ray01));
            println!("ray10 {}", fmt_vec(rays.ray10));
            println!("ray11 {}", fmt_vec(rays.ray11));
            Ok(())
        }
    }
}

fn fmt_vec(v: Vec3) -> String {
    format!("{:>9.4} {:>9.4} {:>9.4}", v.x, v.y, v.z)
}

fn render(cfg: &SessionConfig) -> Result<()> {
    println!("🎬 Raytrace Capture\n");
    cfg.validate().context("Invalid configuration")?;

    let objects = ObjectSet::standard()?;
    let backend = select_backend(cfg.renderer.backend, cfg.video.width, cfg.video.height)?;
    let mut session = CaptureSession::new(cfg.capture_settings(), objects, backend)?;

    let mut encoder = PngSequenceEncoder::new(&cfg.output.frames_dir, cfg.output.frame_digits);
    let muxer = FfmpegMuxer::new(&cfg.output.ffmpeg);
    let muxer: Option<&dyn VideoMuxer> = cfg.output.mux.then_some(&muxer as &dyn VideoMuxer);

    let report = session
        .run(&mut encoder, muxer)
        .context("Capture session aborted")?;

    println!("\n📊 Capture Summary:");
    println!("  Backend: {}", report.backend);
    println!(
        "  Frames:  {} at {} fps ({}x{})",
        report.frames, report.fps, report.width, report.height
    );
    println!("  Output:  {}", report.frames_dir.display());
    if let Some(manifest) = &report.manifest {
        println!("  Manifest: {}", manifest.display());
    }
    println!("  Time:    {:.2}s", report.elapsed_seconds);

    match &report.mux {
        MuxOutcome::Written(path) => println!("\n✅ Video created successfully: {}", path.display()),
        MuxOutcome::Skipped(reason) => println!("\nℹ️  Video not muxed: {reason}"),
        MuxOutcome::Failed(reason) => println!("\n⚠️  Video mux failed: {reason}"),
    }
    Ok(())
}

fn select_backend(kind: BackendKind, width: u32, height: u32) -> Result<Box<dyn RaytraceBackend>> {
    match kind {
        BackendKind::Cpu => Ok(Box::new(CpuBackend::new(width, height))),
        BackendKind::Gpu => {
            let gpu = pollster::block_on(GpuBackend::new(width, height))
                .context("GPU backend setup failed")?;
            println!("✨ GPU backend initialized ({})", gpu.adapter_name());
            Ok(Box::new(gpu))
        }
        BackendKind::Auto => match pollster::block_on(GpuBackend::new(width, height)) {
            Ok(gpu) => {
                println!("✨ GPU backend initialized ({})", gpu.adapter_name());
                Ok(Box::new(gpu))
            }
            // shader and pipeline failures stay fatal
            Err(e) if e.is_adapter_unavailable() => {
                warn!("{}", e);
                println!("ℹ️  Using CPU rendering (GPU unavailable)");
                Ok(Box::new(CpuBackend::new(width, height)))
            }
            Err(e) => Err(e.into()),
        },
    }
}
