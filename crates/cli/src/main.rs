use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use narrator_core::capture::domain::frame_source::FrameSource;
use narrator_core::capture::infrastructure::ffmpeg_frame_source::FfmpegFrameSource;
use narrator_core::capture::infrastructure::frame_pump::FramePump;
use narrator_core::capture::infrastructure::image_sequence_source::ImageSequenceSource;
use narrator_core::detection::domain::face_analyzer::FaceAnalyzer;
use narrator_core::detection::infrastructure::onnx_face_analyzer::{
    OnnxFaceAnalyzer, DEFAULT_CONFIDENCE as FACE_CONFIDENCE,
};
use narrator_core::detection::infrastructure::onnx_yolo_object_detector::{
    OnnxYoloObjectDetector, DEFAULT_CONFIDENCE as OBJECT_FLOOR,
};
use narrator_core::feedback::dispatcher::FeedbackDispatcher;
use narrator_core::feedback::domain::feedback_sink::FeedbackSink;
use narrator_core::feedback::infrastructure::command_speech_sink::CommandSpeechSink;
use narrator_core::feedback::infrastructure::log_feedback_sink::LogFeedbackSink;
use narrator_core::feedback::infrastructure::threaded_feedback_sink::ThreadedFeedbackSink;
use narrator_core::inference::engine::InferenceEngine;
use narrator_core::pipeline::coordinator::PipelineCoordinator;
use narrator_core::pipeline::pipeline_logger::LogPipelineLogger;
use narrator_core::recognition::domain::gallery::{FaceGallery, UpsertOutcome};
use narrator_core::recognition::domain::gallery_store::GalleryStore;
use narrator_core::recognition::infrastructure::gallery_persister::{GalleryPersister, RetryPolicy};
use narrator_core::recognition::infrastructure::json_gallery_store::JsonGalleryStore;
use narrator_core::recognition::infrastructure::linear_scan_matcher::LinearScanMatcher;
use narrator_core::shared::config::PipelineConfig;
use narrator_core::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, FACE_MODEL_NAME, FACE_MODEL_URL, OBJECT_MODEL_NAME,
};
use narrator_core::shared::error::PipelineError;
use narrator_core::shared::frame::Frame;
use narrator_core::shared::latest_slot::LatestSlot;
use narrator_core::shared::model_resolver;

/// Live scene narration for blind and low-vision users.
#[derive(Parser)]
#[command(name = "narrator")]
struct Cli {
    /// Familiar-faces gallery file (default: user data dir).
    #[arg(long, global = true)]
    gallery: Option<PathBuf>,

    /// Directory searched for ONNX models before the download cache.
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Narrate a replayed camera feed.
    Run(RunArgs),
    /// Manage familiar faces.
    #[command(subcommand)]
    Gallery(GalleryCommand),
}

#[derive(Args)]
struct RunArgs {
    /// Directory of still images or a video file standing in for the camera.
    #[arg(long)]
    source: PathBuf,

    /// JSON pipeline configuration (default: user config dir, if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Face recognition similarity threshold.
    #[arg(long)]
    similarity: Option<f64>,

    /// Seconds before the same announcement may repeat.
    #[arg(long)]
    debounce_secs: Option<f64>,

    /// Inference budget per frame in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Announcements kept per cycle.
    #[arg(long)]
    max_events: Option<usize>,

    /// Restart the source when it ends.
    #[arg(long)]
    loop_source: bool,

    /// Text-to-speech command, e.g. "espeak -s 170". Without it
    /// announcements are only logged.
    #[arg(long)]
    speech_command: Option<String>,

    /// Skip face detection and recognition.
    #[arg(long)]
    no_faces: bool,
}

#[derive(Subcommand)]
enum GalleryCommand {
    /// Enrol the most prominent face in an image.
    Add { person: String, image: PathBuf },
    /// Forget a person.
    Remove { person: String },
    /// List enrolled people.
    List,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("{}", error_message(&*e));
        process::exit(1);
    }
}

/// A model that never loaded means no detection at all, which is worth
/// saying plainly.
fn error_message(e: &(dyn std::error::Error + 'static)) -> String {
    match e.downcast_ref::<PipelineError>() {
        Some(err) if err.is_fatal() => format!("Detection unavailable: {err}"),
        _ => format!("Error: {e}"),
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let gallery_path = match cli.gallery {
        Some(path) => path,
        None => JsonGalleryStore::default_path().ok_or("Could not determine data directory")?,
    };
    let models_dir = cli.models_dir.as_deref();

    match cli.command {
        Command::Run(args) => run_pipeline(args, &gallery_path, models_dir),
        Command::Gallery(GalleryCommand::Add { person, image }) => {
            add_person(&person, &image, &gallery_path, models_dir)
        }
        Command::Gallery(GalleryCommand::Remove { person }) => remove_person(&person, &gallery_path),
        Command::Gallery(GalleryCommand::List) => list_people(&gallery_path),
    }
}

fn run_pipeline(
    args: RunArgs,
    gallery_path: &Path,
    models_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args, PipelineConfig::default_path())?;
    if !args.source.exists() {
        return Err(format!("Source not found: {}", args.source.display()).into());
    }

    let engine = build_engine(&config, models_dir, !args.no_faces)?;
    let gallery = Arc::new(load_gallery(gallery_path)?);
    log::info!("{} familiar face(s) loaded", gallery.len());

    let sink: Box<dyn FeedbackSink> = match &args.speech_command {
        Some(command) => Box::new(
            CommandSpeechSink::from_command_line(command).ok_or("--speech-command is empty")?,
        ),
        None => Box::new(ThreadedFeedbackSink::spawn(Box::new(LogFeedbackSink))?),
    };
    let dispatcher = FeedbackDispatcher::new(sink, config.debounce_window());

    let frames = Arc::new(LatestSlot::new());
    let source = open_source(&args.source, &config, args.loop_source)?;
    let pump = FramePump::spawn(source, frames.clone(), config.target_fps);

    let mut coordinator = PipelineCoordinator::new(
        &config,
        frames,
        engine,
        gallery,
        Box::new(LinearScanMatcher::new(
            config.recognition_similarity_threshold,
            config.tie_epsilon,
        )),
        dispatcher,
        Box::new(LogPipelineLogger::default()),
    );

    let cancelled = AtomicBool::new(false);
    let stats = coordinator.run(&cancelled);
    pump.stop();
    coordinator.shutdown();

    log::info!(
        "{} frames, {} cycles: {} announced, {} aborted ({} timeouts, {} stalls), {} frames superseded",
        stats.frames,
        stats.cycles,
        stats.dispatched,
        stats.aborted,
        stats.timeouts,
        stats.stalls,
        stats.superseded
    );
    Ok(())
}

/// `--config` first, then `default_path` if it exists, then command-line
/// overrides.
fn build_config(
    args: &RunArgs,
    default_path: Option<PathBuf>,
) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => match default_path.filter(|p| p.exists()) {
            Some(path) => {
                log::info!("Using config {}", path.display());
                PipelineConfig::load(&path)?
            }
            None => PipelineConfig::default(),
        },
    };

    if let Some(fps) = args.fps {
        config.target_fps = fps;
    }
    if let Some(confidence) = args.confidence {
        config.detection_confidence_threshold = confidence;
    }
    if let Some(similarity) = args.similarity {
        config.recognition_similarity_threshold = similarity;
    }
    if let Some(secs) = args.debounce_secs {
        config.debounce_window_seconds = secs;
    }
    if let Some(ms) = args.timeout_ms {
        config.inference_timeout_ms = ms;
    }
    if let Some(n) = args.max_events {
        config.max_feedback_events_per_cycle = n;
    }
    config.validate()?;
    Ok(config)
}

fn build_engine(
    config: &PipelineConfig,
    models_dir: Option<&Path>,
    with_faces: bool,
) -> Result<InferenceEngine, Box<dyn std::error::Error>> {
    let models_loaded = if with_faces { 3 } else { 1 };
    let object_model = resolve_model(OBJECT_MODEL_NAME, None, models_dir)?;
    let detector = OnnxYoloObjectDetector::new(&object_model, OBJECT_FLOOR, models_loaded)
        .map_err(|e| load_failed(OBJECT_MODEL_NAME, e))?;

    let faces: Option<Box<dyn FaceAnalyzer>> = if with_faces {
        Some(Box::new(build_face_analyzer(models_dir, models_loaded)?))
    } else {
        None
    };

    Ok(InferenceEngine::start(
        Box::new(detector),
        faces,
        config.detection_confidence_threshold,
    )?)
}

fn build_face_analyzer(
    models_dir: Option<&Path>,
    models_loaded: usize,
) -> Result<OnnxFaceAnalyzer, Box<dyn std::error::Error>> {
    let face_model = resolve_model(FACE_MODEL_NAME, Some(FACE_MODEL_URL), models_dir)?;
    let embedding_model =
        resolve_model(EMBEDDING_MODEL_NAME, Some(EMBEDDING_MODEL_URL), models_dir)?;
    OnnxFaceAnalyzer::new(&face_model, &embedding_model, FACE_CONFIDENCE, models_loaded)
        .map_err(|e| load_failed(FACE_MODEL_NAME, e).into())
}

fn resolve_model(
    name: &str,
    url: Option<&str>,
    models_dir: Option<&Path>,
) -> Result<PathBuf, PipelineError> {
    log::info!("Resolving model: {name}");
    let path = model_resolver::resolve(name, url, models_dir, Some(Box::new(download_progress)))
        .map_err(|e| load_failed(name, e.into()))?;
    Ok(path)
}

fn load_failed(model: &str, e: Box<dyn std::error::Error>) -> PipelineError {
    PipelineError::ModelLoad {
        model: model.to_string(),
        message: e.to_string(),
    }
}

fn open_source(
    path: &Path,
    config: &PipelineConfig,
    looping: bool,
) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
    let (w, h) = (config.frame_width, config.frame_height);
    if path.is_dir() {
        Ok(Box::new(ImageSequenceSource::open(path, w, h, looping)?))
    } else {
        Ok(Box::new(FfmpegFrameSource::open(path, w, h, looping)?))
    }
}

fn load_gallery(path: &Path) -> Result<FaceGallery, Box<dyn std::error::Error>> {
    let entries = JsonGalleryStore::new(path).load()?;
    let (gallery, skipped) = FaceGallery::with_entries(entries);
    if skipped > 0 {
        log::warn!("Skipped {skipped} unreadable gallery entries in {}", path.display());
    }
    Ok(gallery)
}

/// Opens the gallery with write-behind persistence. Stopping the returned
/// persister flushes the last change.
fn open_gallery_for_edit(
    path: &Path,
) -> Result<(FaceGallery, GalleryPersister), Box<dyn std::error::Error>> {
    let mut gallery = load_gallery(path)?;
    let slot = Arc::new(LatestSlot::new());
    gallery.attach_persistence(slot.clone());
    let persister = GalleryPersister::spawn(
        Box::new(JsonGalleryStore::new(path)),
        slot,
        RetryPolicy::default(),
    );
    Ok((gallery, persister))
}

fn add_person(
    person: &str,
    image_path: &Path,
    gallery_path: &Path,
    models_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let img = image::open(image_path)
        .map_err(|e| format!("Failed to open {}: {e}", image_path.display()))?
        .to_rgb8();
    let (w, h) = img.dimensions();
    let frame = Frame::new(img.into_raw(), w, h, 3, 0);

    let mut analyzer = build_face_analyzer(models_dir, 1)?;
    let faces = analyzer.detect_faces(&frame)?;
    let face = faces
        .into_iter()
        .max_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()))
        .ok_or_else(|| format!("No face found in {}", image_path.display()))?;

    let (gallery, persister) = open_gallery_for_edit(gallery_path)?;
    let outcome = gallery.upsert(person, face.embedding)?;
    persister.stop();

    match outcome {
        UpsertOutcome::Created => log::info!("Enrolled {person}"),
        UpsertOutcome::Extended => log::info!("Added another reference for {person}"),
        UpsertOutcome::Unchanged => log::info!("{person} already has this reference"),
    }
    Ok(())
}

fn remove_person(person: &str, gallery_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (gallery, persister) = open_gallery_for_edit(gallery_path)?;
    let removed = gallery.remove(person);
    persister.stop();

    if !removed {
        return Err(format!("{person} is not in the gallery").into());
    }
    log::info!("Removed {person}");
    Ok(())
}

fn list_people(gallery_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let gallery = load_gallery(gallery_path)?;
    let snapshot = gallery.snapshot();
    if snapshot.is_empty() {
        println!("No familiar faces enrolled ({})", gallery_path.display());
        return Ok(());
    }
    for entry in snapshot.entries() {
        println!("{}\t{} reference(s)", entry.person_id, entry.embeddings.len());
    }
    Ok(())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
