//! Command line front end for swing analysis of stored pose tracks.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use swing_analyzer::config::{Config, EXAMPLE_CONFIG};
use swing_analyzer::constants::{DEFAULT_MATCH_TOLERANCE_FRAMES, DEFAULT_PEAK_MIN_DISTANCE};
use swing_analyzer::form_analyzer::evaluation::{evaluate_phase, Annotation};
use swing_analyzer::form_analyzer::peak_detector::find_peaks;
use swing_analyzer::form_analyzer::{create_analyzer, SwingPhase};
use swing_analyzer::pipeline::{ChannelFrames, FrameEvent, Pipeline, PipelineEvent, SkeletonPassthrough};
use swing_analyzer::pose_cache::PoseCache;
use swing_analyzer::pose_track::PoseTrackFile;
use swing_analyzer::skeleton::Side;
use swing_analyzer::source::SkeletonEvent;
use swing_analyzer::utils::content_hash::quick_video_hash_file;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a pose track through the analyzer and report every rep
    Analyze {
        /// Pose track JSON file
        track: PathBuf,

        /// Annotated positions to score detections against
        #[arg(short, long)]
        annotations: Option<PathBuf>,

        /// Frame tolerance when matching detections to annotations
        #[arg(long, default_value_t = DEFAULT_MATCH_TOLERANCE_FRAMES)]
        tolerance: u32,
    },

    /// Print the quick content hash of a video file
    Hash {
        video: PathBuf,
    },

    /// Summarize a pose track
    Inspect {
        track: PathBuf,

        /// Look up the cached skeleton nearest to this time (seconds)
        #[arg(long)]
        at: Option<f64>,
    },

    /// Print an example configuration file
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }
    debug!(
        "swing-analyzer {} ({}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_VERSION"),
        env!("BUILD_TARGET")
    );

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            let config = Config::from_file(path).with_context(|| format!("loading {}", path.display()))?;
            config.validate().context("validating configuration")?;
            config
        }
        None => Config::default(),
    };

    match args.command {
        Command::Analyze {
            track,
            annotations,
            tolerance,
        } => analyze(&config, &track, annotations.as_deref(), tolerance).await,
        Command::Hash { video } => {
            let hash = quick_video_hash_file(&video)
                .await
                .with_context(|| format!("hashing {}", video.display()))?;
            println!("{hash}");
            Ok(())
        }
        Command::Inspect { track, at } => inspect(&config, &track, at).await,
        Command::Config => {
            print!("{EXAMPLE_CONFIG}");
            Ok(())
        }
    }
}

async fn analyze(
    config: &Config,
    path: &std::path::Path,
    annotations: Option<&std::path::Path>,
    tolerance: u32,
) -> Result<()> {
    let track = PoseTrackFile::load(path)
        .await
        .with_context(|| format!("loading pose track {}", path.display()))?;
    let fps = track.metadata.fps;
    info!(
        "Analyzing {} frames of {}",
        track.frames.len(),
        track.metadata.source_video_name.as_deref().unwrap_or("unnamed video")
    );

    let (tx, rx) = mpsc::channel(config.extraction.channel_capacity.max(1));
    let analyzer = create_analyzer("kettlebell-swing", config)?;
    let mut pipeline = Pipeline::new(
        Box::new(ChannelFrames::new(rx)),
        Arc::new(SkeletonPassthrough),
        analyzer,
        config.extraction.channel_capacity,
    );
    pipeline.initialize().await?;
    let mut checkpoints = pipeline.checkpoints();
    let mut events = pipeline.start()?;

    let feeder = tokio::spawn(async move {
        for frame in track.detected_frames() {
            let event = SkeletonEvent {
                skeleton: frame.skeleton(),
                timestamp_ms: frame.timestamp,
                video_time: Some(frame.video_time),
                frame_index: Some(frame.frame_index),
            };
            if tx.send(FrameEvent::Skeleton(event)).await.is_err() {
                break;
            }
        }
    });

    loop {
        match events.recv().await {
            Ok(PipelineEvent::Frame(result)) => {
                if let Some(quality) = &result.form.quality {
                    println!(
                        "Rep {:>3} at {:>7.2}s  score {:>3}  hinge {:>5.1}°  lockout {:>5.1}°  knee {:>5.1}°",
                        result.form.rep_count,
                        result.video_time.unwrap_or(result.timestamp_ms / 1000.0),
                        quality.score,
                        quality.metrics.hinge_depth,
                        quality.metrics.lockout_angle,
                        quality.metrics.knee_flexion
                    );
                    for line in &quality.feedback {
                        println!("        - {line}");
                    }
                }
            }
            Ok(PipelineEvent::Error(failure)) => {
                anyhow::bail!("{:?} stage failed: {}", failure.stage, failure.message);
            }
            Ok(PipelineEvent::Completed) => break,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Report fell behind, skipped {skipped} frame events");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
    feeder.await.context("frame feeder task")?;
    pipeline.stop().await;
    println!("Total reps: {}", pipeline.rep_count());

    let Some(annotations) = annotations else {
        return Ok(());
    };
    let json = tokio::fs::read_to_string(annotations)
        .await
        .with_context(|| format!("reading {}", annotations.display()))?;
    let annotations: Vec<Annotation> = serde_json::from_str(&json).context("parsing annotations")?;

    let mut detections = Vec::new();
    while let Ok(checkpoint) = checkpoints.try_recv() {
        if let Some(time) = checkpoint.video_time {
            let frame = swing_analyzer::utils::safe_cast::f64_to_u32_clamp((time * fps).round(), 0, u32::MAX);
            detections.push((frame, checkpoint.position));
        }
    }
    for phase in SwingPhase::ALL {
        let metrics = evaluate_phase(&detections, &annotations, phase, tolerance);
        println!(
            "{phase:<8} precision {:.2}  recall {:.2}  f1 {:.2}",
            metrics.precision(),
            metrics.recall(),
            metrics.f1()
        );
    }
    Ok(())
}

async fn inspect(config: &Config, path: &std::path::Path, at: Option<f64>) -> Result<()> {
    let track = PoseTrackFile::load(path)
        .await
        .with_context(|| format!("loading pose track {}", path.display()))?;
    let meta = &track.metadata;
    println!("Video:      {}", meta.source_video_name.as_deref().unwrap_or("-"));
    println!("Hash:       {}", meta.source_video_hash);
    println!("Model:      {} {} ({})", meta.model, meta.model_version, meta.keypoint_format.tag());
    println!("Extracted:  {}", meta.extracted_at.to_rfc3339());
    println!(
        "Frames:     {} at {:.2} fps, {}x{}, {:.2}s",
        meta.frame_count, meta.fps, meta.video_width, meta.video_height, meta.source_video_duration
    );
    println!("Detected:   {} frames with a pose", track.detected_frames().count());

    // Top candidates by wrist height over frames with a pose
    let heights: Vec<(u32, f64)> = track
        .detected_frames()
        .filter_map(|f| f.skeleton().wrist_height(Side::Right).map(|h| (f.frame_index, h)))
        .collect();
    let values: Vec<f64> = heights.iter().map(|(_, h)| *h).collect();
    let peaks = find_peaks(&values, DEFAULT_PEAK_MIN_DISTANCE, None);
    println!("Top candidates: {}", peaks.len());
    for index in peaks {
        let (frame, height) = heights[index];
        println!("  frame {frame:>6}  wrist height {height:>7.1}px");
    }

    if let Some(time) = at {
        let cache = PoseCache::new(config.cache.lookup_tolerance_frames);
        cache.load_track(track);
        match cache.get_frame(time) {
            Some(frame) if frame.has_pose() => {
                let skeleton = frame.skeleton();
                println!("At {time:.3}s: frame {} ({:.3}s)", frame.frame_index, frame.video_time);
                if let Some(angles) = skeleton.angles() {
                    println!(
                        "  spine {:.1}°  hip {:.1}°  knee {:.1}°  arm {:.1}°",
                        angles.spine, angles.hip, angles.knee, angles.arm_to_vertical
                    );
                }
            }
            Some(frame) => println!("At {time:.3}s: frame {} has no pose", frame.frame_index),
            None => println!("At {time:.3}s: no frame within tolerance"),
        }
    }
    Ok(())
}
