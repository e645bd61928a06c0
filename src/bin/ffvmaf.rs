use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use ffvmaf::{
    CompletionStatus, FrameSource, MediaSource, ModelConfig, PipelineConfig, PipelineReport,
    PoolMethod, PreviewBuffers, PreviewConfig, ProgressCallback, ProgressChannel, ProgressInfo,
    ProgressLayout, ScoringSession, VmafError, VmafPipeline,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  ffvmaf score reference.mp4 distorted.mp4\n  ffvmaf score reference.mp4 distorted.mp4 --lag 5 --pool harmonic-mean --json\n  ffvmaf score reference.mp4 distorted.mp4 --preview-dir previews --progress\n  ffvmaf probe input.mp4 --json\n  ffvmaf completions zsh > _ffvmaf";

/// Exit code for failures outside the scoring pipeline (bad arguments,
/// unreadable model file, unwritable previews).
const USAGE_EXIT_CODE: u8 = 64;

#[derive(Debug, Parser)]
#[command(
    name = "ffvmaf",
    version,
    about = "Score the perceptual quality of a video against a reference",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output (per-frame scores, selected streams).
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar while scoring.
    #[arg(long)]
    progress: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Score a test video against a reference video.
    #[command(
        about = "Score a test video against a reference",
        after_help = "Examples:\n  ffvmaf score reference.mp4 distorted.mp4\n  ffvmaf score reference.mp4 distorted.mp4 --model model.json --phone-model\n  ffvmaf score reference.mp4 distorted.mp4 --width 1280 --height 720 --max-frames 300"
    )]
    Score {
        /// Reference (pristine) video.
        reference: PathBuf,
        /// Test (distorted) video.
        test: PathBuf,
        /// Model or model-collection JSON file. Defaults to the bundled model.
        #[arg(long)]
        model: Option<PathBuf>,
        /// Scoring lag in frames (raised to the model's lookahead if smaller).
        #[arg(long)]
        lag: Option<u32>,
        /// Maximum number of frame pairs to score.
        #[arg(long)]
        max_frames: Option<u32>,
        /// Pooling method: mean | harmonic-mean | min | max.
        #[arg(long, default_value = "mean")]
        pool: String,
        /// Apply the model's score transform for small-screen viewing.
        #[arg(long)]
        phone_model: bool,
        /// Canonical comparison width.
        #[arg(long, default_value_t = ffvmaf::config::CANONICAL_WIDTH)]
        width: u32,
        /// Canonical comparison height.
        #[arg(long, default_value_t = ffvmaf::config::CANONICAL_HEIGHT)]
        height: u32,
        /// Save best/worst frame previews as PNG into this directory.
        #[arg(long)]
        preview_dir: Option<PathBuf>,
        /// Read both inputs into memory before decoding.
        #[arg(long)]
        in_memory: bool,
        /// Output results as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print stream information for a media file.
    #[command(
        about = "Print video stream information",
        visible_alias = "info",
        after_help = "Examples:\n  ffvmaf probe input.mp4\n  ffvmaf probe input.mp4 --json"
    )]
    Probe {
        /// Input media path.
        input: PathBuf,

        /// Output stream information as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(Debug)]
enum CliError {
    Pipeline(VmafError),
    Usage(String),
}

impl From<VmafError> for CliError {
    fn from(error: VmafError) -> Self {
        CliError::Pipeline(error)
    }
}

impl From<String> for CliError {
    fn from(message: String) -> Self {
        CliError::Usage(message)
    }
}

impl From<&str> for CliError {
    fn from(message: &str) -> Self {
        CliError::Usage(message.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        CliError::Usage(error.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        CliError::Usage(error.to_string())
    }
}

impl From<indicatif::style::TemplateError> for CliError {
    fn from(error: indicatif::style::TemplateError) -> Self {
        CliError::Usage(error.to_string())
    }
}

fn parse_pool_method(value: &str) -> Option<PoolMethod> {
    PoolMethod::from_name(value)
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), CliError> {
    if let Some(level) = &global.log_level {
        let parsed = ffvmaf::parse_ffmpeg_log_level(level)
            .ok_or(format!("unsupported --log-level: {level}"))?;
        ffvmaf::set_ffmpeg_log_level(parsed);
    } else {
        ffvmaf::set_ffmpeg_log_level(log::LevelFilter::Error);
    }
    Ok(())
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, CliError> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
        )?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_length(info.frames_to_process as u64);
        self.bar.set_position(info.frames_processed as u64);
        let message = match info.latest_score {
            Some(record) => format!("{:.1} fps, last score {:.2}", info.frames_per_second, record.score),
            None => format!("{:.1} fps", info.frames_per_second),
        };
        self.bar.set_message(message);
    }
}

fn open_source(path: &Path, in_memory: bool) -> Result<MediaSource, VmafError> {
    if in_memory {
        let data = fs::read(path).map_err(|error| VmafError::FileOpen {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
        MediaSource::from_bytes(data)
    } else {
        MediaSource::open(path)
    }
}

fn save_previews(directory: &Path, previews: &PreviewBuffers) -> Result<(), CliError> {
    fs::create_dir_all(directory)?;
    let frames = [
        ("max_reference", &previews.max_reference),
        ("max_test", &previews.max_test),
        ("min_reference", &previews.min_reference),
        ("min_test", &previews.min_test),
    ];
    for (name, frame) in frames {
        let path = directory.join(format!("{name}.png"));
        frame
            .to_image()?
            .save(&path)
            .map_err(|error| CliError::Usage(format!("{}: {error}", path.display())))?;
        println!("{} {}", "saved".green().bold(), path.display());
    }
    Ok(())
}

fn print_report(report: &PipelineReport, model: &str, verbose: bool) {
    if verbose {
        for (index, score) in report.scores.iter().enumerate() {
            println!("frame {index:>6}: {score:.4}");
        }
    }
    println!("Model: {model}");
    println!(
        "Frames: {}/{} ({}), lag {}",
        report.frames_processed, report.frames_to_process, report.termination, report.lag
    );
    if let Some(side) = report.limiting_stream {
        println!("Limited by: {side:?} stream");
    }
    if let Some(max) = report.extrema.max {
        println!("Best frame: {} ({:.4})", max.index, max.score);
    }
    if let Some(min) = report.extrema.min {
        println!("Worst frame: {} ({:.4})", min.index, min.score);
    }
    println!(
        "{} {}",
        "score:".green().bold(),
        format!("{:.4} ({:?})", report.pooled_score, report.pool_method).green()
    );
}

fn report_json(report: &PipelineReport, model: &str) -> serde_json::Value {
    json!({
        "status": report.status().code(),
        "model": model,
        "frames_to_process": report.frames_to_process,
        "frames_processed": report.frames_processed,
        "termination": report.termination,
        "limiting_stream": report.limiting_stream,
        "lag": report.lag,
        "pool_method": report.pool_method,
        "pooled_score": report.pooled_score,
        "max": report.extrema.max,
        "min": report.extrema.min,
        "elapsed_seconds": report.elapsed.as_secs_f64(),
        "fps": report.frames_per_second,
        "scores": report.scores,
    })
}

fn run(cli: Cli) -> Result<(), CliError> {
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Score {
            reference,
            test,
            model,
            lag,
            max_frames,
            pool,
            phone_model,
            width,
            height,
            preview_dir,
            in_memory,
            json,
        } => {
            let pool_method =
                parse_pool_method(&pool).ok_or(format!("unsupported --pool method: {pool}"))?;
            let model_bytes = match &model {
                Some(path) => fs::read(path)
                    .map_err(|error| format!("cannot read model {}: {error}", path.display()))?,
                None => ffvmaf::DEFAULT_MODEL.as_bytes().to_vec(),
            };

            // Bind the model before touching the inputs.
            let model_config = ModelConfig::new().with_transform(phone_model);
            let mut session = ScoringSession::from_model_bytes(&model_bytes, &model_config)?;
            let model_label = session.model().label.clone();

            let mut config = PipelineConfig::new()
                .with_canonical_resolution(width, height)
                .with_preview(PreviewConfig::default())
                .with_pool_method(pool_method);
            if let Some(lag) = lag {
                config = config.with_score_lag(lag);
            }
            if let Some(max_frames) = max_frames {
                config = config.with_max_frames(max_frames);
            }
            let progress = if cli.global.progress {
                let progress = Arc::new(TerminalProgress::new()?);
                config = config.with_progress(progress.clone());
                Some(progress)
            } else {
                None
            };

            let reference_source = open_source(&reference, in_memory)?;
            let test_source = open_source(&test, in_memory)?;
            if cli.global.verbose {
                for (side, info) in [
                    ("reference", reference_source.info()),
                    ("test", test_source.info()),
                ] {
                    eprintln!(
                        "{} {side}: {}x{} {:?} @ {:.3} fps, ~{} frames [{}]",
                        "stream".cyan().bold(),
                        info.width,
                        info.height,
                        info.pixel_format,
                        info.frames_per_second,
                        info.frame_count,
                        info.codec,
                    );
                }
            }

            let frames = reference_source
                .info()
                .frame_count
                .min(test_source.info().frame_count)
                .min(config.max_frames() as u64) as u32;
            let channel = ProgressChannel::for_frames(frames, ProgressLayout::default());
            let mut previews = preview_dir
                .as_ref()
                .map(|_| PreviewBuffers::new(&config.preview()));

            let report = VmafPipeline::new(config).run(
                &mut session,
                reference_source,
                test_source,
                &channel,
                previews.as_mut(),
            );
            if let Some(progress) = &progress {
                progress.bar.finish_and_clear();
            }
            let report = report?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report_json(&report, &model_label))?
                );
            } else {
                print_report(&report, &model_label, cli.global.verbose);
            }

            if let (Some(directory), Some(previews)) = (&preview_dir, &previews) {
                save_previews(directory, previews)?;
            }
        }
        Commands::Probe { input, json } => {
            let source = MediaSource::open(&input)?;
            let info = source.info();
            if json {
                let payload = json!({
                    "path": input.display().to_string(),
                    "stream_index": info.stream_index,
                    "codec": info.codec,
                    "width": info.width,
                    "height": info.height,
                    "pixel_format": format!("{:?}", info.pixel_format),
                    "fps": info.frames_per_second,
                    "duration_seconds": info.duration.as_secs_f64(),
                    "frame_count": info.frame_count,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Stream: #{} [{}]", info.stream_index, info.codec);
                println!(
                    "Video: {}x{} {:?} @ {:.3} fps",
                    info.width, info.height, info.pixel_format, info.frames_per_second
                );
                println!("Duration: {:?}", info.duration);
                println!("Frames: ~{}", info.frame_count);
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "ffvmaf", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn exit_code(status: CompletionStatus) -> ExitCode {
    ExitCode::from(status.code() as u8)
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => exit_code(CompletionStatus::Success),
        Err(CliError::Pipeline(error)) => {
            let status = error.status();
            eprintln!("{} {error} [{status}]", "error:".red().bold());
            exit_code(status)
        }
        Err(CliError::Usage(message)) => {
            eprintln!("{} {message}", "error:".red().bold());
            ExitCode::from(USAGE_EXIT_CODE)
        }
    }
}
