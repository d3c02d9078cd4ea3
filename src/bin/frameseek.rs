use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use env_logger::Env;
use frameseek::{FfmpegLogLevel, OpenOptions, ProxySize, StreamHandle, TimecodeKind};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  frameseek info input.mp4 --json\n  frameseek fetch input.mp4 1200 --out frame.png\n  frameseek scrub input.mp4 --out frames --frames 0,10-20,500 --progress\n  frameseek scrub camera.ts --out frames --every 25 --timecode record-run-no-gaps\n  frameseek completions zsh > _frameseek";

#[derive(Debug, Parser)]
#[command(
    name = "frameseek",
    version,
    about = "Fetch exact frames from video files",
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
    /// Log seek and decode decisions (overridden by RUST_LOG).
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    /// Video stream ordinal (0 = first video stream).
    #[arg(long, default_value_t = 0)]
    stream: usize,

    /// Blend interlaced fields.
    #[arg(long)]
    deinterlace: bool,

    /// Decoder thread count (0 = automatic).
    #[arg(long)]
    threads: Option<usize>,

    /// Timecode index to build and use (none, record-run, record-run-no-gaps).
    #[arg(long, default_value = "none")]
    timecode: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print stream facts.
    #[command(
        about = "Print video stream information",
        visible_alias = "probe",
        after_help = "Examples:\n  frameseek info input.mp4\n  frameseek info input.mp4 --json"
    )]
    Info {
        /// Input video path.
        input: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Fetch one frame to an image file.
    #[command(
        about = "Fetch a single frame",
        after_help = "Examples:\n  frameseek fetch input.mp4 0 --out first.png\n  frameseek fetch input.mp4 1200 --out frame.jpg"
    )]
    Fetch {
        /// Input video path.
        input: PathBuf,
        /// Frame index.
        frame: i64,
        /// Output image path.
        #[arg(long)]
        out: PathBuf,
    },

    /// Fetch many frames to an output directory.
    #[command(
        about = "Fetch a list or range of frames",
        after_help = "Examples:\n  frameseek scrub input.mp4 --out frames --frames 0,5,6,100-110\n  frameseek scrub input.mp4 --out frames --every 30 --ext jpg"
    )]
    Scrub {
        /// Input video path.
        input: PathBuf,
        /// Output directory.
        #[arg(long)]
        out: PathBuf,
        /// Comma-separated frame indices and inclusive ranges, fetched in the
        /// given order (e.g. `0,10-20,5`).
        #[arg(long, conflicts_with = "every")]
        frames: Option<String>,
        /// Fetch every Nth frame of the stream.
        #[arg(long)]
        every: Option<u64>,
        /// Output image extension (png, jpg, jpeg, bmp, tiff).
        #[arg(long, default_value = "png")]
        ext: String,
    },

    /// Save a representative frame.
    #[command(
        about = "Save the preview frame (middle of the stream)",
        after_help = "Examples:\n  frameseek preview input.mp4 --out thumb.png --json"
    )]
    Preview {
        /// Input video path.
        input: PathBuf,
        /// Output image path.
        #[arg(long)]
        out: PathBuf,
        /// Print thumbnail facts as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_log_level(value: &str) -> Option<FfmpegLogLevel> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(FfmpegLogLevel::Quiet),
        "panic" => Some(FfmpegLogLevel::Panic),
        "fatal" => Some(FfmpegLogLevel::Fatal),
        "error" => Some(FfmpegLogLevel::Error),
        "warning" | "warn" => Some(FfmpegLogLevel::Warning),
        "info" => Some(FfmpegLogLevel::Info),
        "verbose" => Some(FfmpegLogLevel::Verbose),
        "debug" => Some(FfmpegLogLevel::Debug),
        "trace" => Some(FfmpegLogLevel::Trace),
        _ => None,
    }
}

fn parse_timecode_kind(value: &str) -> Option<TimecodeKind> {
    match value.to_ascii_lowercase().replace('_', "-").as_str() {
        "none" => Some(TimecodeKind::None),
        "record-run" | "rr" => Some(TimecodeKind::RecordRun),
        "record-run-no-gaps" | "rrng" => Some(TimecodeKind::RecordRunNoGaps),
        _ => None,
    }
}

/// Parse `0,10-20,5` into indices, keeping the given order.
fn parse_frame_list(value: &str) -> Result<Vec<i64>, Box<dyn Error>> {
    let mut frames = Vec::new();
    for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (start.trim().parse::<i64>()?, end.trim().parse::<i64>()?);
                if start > end {
                    return Err(format!("invalid frame range: {part}").into());
                }
                frames.extend(start..=end);
            }
            None => frames.push(part.parse::<i64>()?),
        }
    }
    if frames.is_empty() {
        return Err("frame list cannot be empty".into());
    }
    Ok(frames)
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn init_logging(global: &GlobalOptions) -> Result<(), Box<dyn Error>> {
    let default_filter = if global.verbose { "frameseek=debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let ffmpeg_level = match &global.log_level {
        Some(level) => parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?,
        None => FfmpegLogLevel::for_filter(log::max_level()),
    };
    frameseek::set_ffmpeg_log_level(ffmpeg_level);
    Ok(())
}

fn open_options(global: &GlobalOptions) -> OpenOptions {
    let mut options = OpenOptions::new()
        .with_stream_index(global.stream)
        .with_deinterlace(global.deinterlace);
    if let Some(threads) = global.threads {
        options = options.with_decoder_threads(threads);
    }
    options
}

/// Open the input and build the requested timecode index.
fn open_handle(input: &Path, global: &GlobalOptions) -> Result<(StreamHandle, TimecodeKind), Box<dyn Error>> {
    let timecode = parse_timecode_kind(&global.timecode)
        .ok_or(format!("unsupported --timecode: {}", global.timecode))?;
    let mut handle = StreamHandle::open(input, open_options(global))?;
    if timecode != TimecodeKind::None {
        let index = handle.build_index(timecode)?;
        if global.verbose {
            eprintln!("built {timecode:?} index with {} entries", index.entries().len());
        }
    }
    Ok((handle, timecode))
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global)?;

    match cli.command {
        Commands::Info { input, json } => {
            let handle = StreamHandle::open(&input, open_options(&cli.global))?;
            let metadata = handle.metadata();
            let (rate_numerator, rate_denominator) = handle.frame_rate();
            let info = handle.stream_info();
            if json {
                let payload = json!({
                    "format": metadata.format,
                    "codec": metadata.codec,
                    "width": metadata.width,
                    "height": metadata.height,
                    "fps": metadata.frames_per_second,
                    "frame_rate": {
                        "numerator": rate_numerator,
                        "denominator_seconds": rate_denominator,
                    },
                    "frame_count": metadata.duration_in_frames,
                    "duration_seconds": metadata.duration_seconds(),
                    "start_offset_seconds": metadata.start_offset,
                    "has_alpha": metadata.has_alpha,
                    "time_base": format!("{}/{}", info.time_base.numerator(), info.time_base.denominator()),
                    "byte_seek": info.byte_seek,
                    "native_seek": info.native_seek,
                    "tags": metadata.tags,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Format: {}", metadata.format);
                println!(
                    "Video: {}x{} @ {:.3} fps [{}]",
                    metadata.width, metadata.height, metadata.frames_per_second, metadata.codec
                );
                println!(
                    "Frames: {} ({:.2}s, starts at {:.3}s)",
                    metadata.duration_in_frames,
                    metadata.duration_seconds(),
                    metadata.start_offset
                );
                println!(
                    "Time base: {}/{}",
                    info.time_base.numerator(),
                    info.time_base.denominator()
                );
                println!(
                    "Seeking: {}{}",
                    if info.native_seek { "native" } else { "key frame search" },
                    if info.byte_seek { ", byte offsets with index" } else { "" }
                );
                for (key, value) in &metadata.tags {
                    println!("  {key}: {value}");
                }
            }
        }
        Commands::Fetch { input, frame, out } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let (mut handle, timecode) = open_handle(&input, &cli.global)?;
            let fetched = handle.fetch_frame(frame, timecode, ProxySize::None)?;
            fetched.image.save(&out)?;
            if !fetched.exact {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("no picture covers frame {frame}, saved nearest (pts {})", fetched.pts).yellow()
                );
            }
            println!("{} {}", "saved".green().bold(), out.display());
        }
        Commands::Scrub {
            input,
            out,
            frames,
            every,
            ext,
        } => {
            if out.exists() {
                if !cli.global.overwrite {
                    return Err(format!(
                        "output directory already exists: {} (use --overwrite)",
                        out.display()
                    )
                    .into());
                }
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("writing into existing directory {}", out.display()).yellow()
                );
            }

            let (mut handle, timecode) = open_handle(&input, &cli.global)?;
            let frame_indices = match (frames, every) {
                (Some(list), _) => parse_frame_list(&list)?,
                (None, Some(0)) => return Err("--every must be greater than 0".into()),
                (None, Some(step)) => (0..handle.duration(timecode)).step_by(step as usize).collect(),
                (None, None) => (0..handle.duration(timecode)).collect(),
            };
            fs::create_dir_all(&out)?;

            let ext_clean = ext.trim_start_matches('.').to_ascii_lowercase();
            let progress_bar = if cli.global.progress {
                let pb = ProgressBar::new(frame_indices.len() as u64);
                let style = ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
                pb.set_style(style.progress_chars("##-"));
                Some(pb)
            } else {
                None
            };

            let (mut saved, mut seeks) = (0_u64, 0_u64);
            for frame_index in frame_indices {
                let output_path = out.join(format!("frame_{frame_index:06}.{ext_clean}"));
                if output_path.exists() && !cli.global.overwrite {
                    return Err(format!(
                        "output file already exists: {} (use --overwrite)",
                        output_path.display()
                    )
                    .into());
                }

                let fetched = handle.fetch_frame(frame_index, timecode, ProxySize::None)?;
                fetched.image.save(&output_path)?;
                saved += 1;
                if handle.position().must_seek_before_decode {
                    seeks += 1;
                }

                if let Some(pb) = &progress_bar {
                    pb.inc(1);
                }
                if cli.global.verbose {
                    eprintln!("saved frame {} -> {}", frame_index, output_path.display());
                }
            }

            if let Some(pb) = progress_bar {
                pb.finish_with_message("done");
            }
            handle.close();

            println!(
                "{} {}",
                "success:".green().bold(),
                format!("Saved {saved} frame(s) to {} ({seeks} seek(s))", out.display()).green()
            );
        }
        Commands::Preview { input, out, json } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let mut handle = StreamHandle::open(&input, open_options(&cli.global))?;
            let preview = handle.preview_frame()?;
            preview.frame.image.save(&out)?;
            if json {
                let payload = json!({
                    "path": out.display().to_string(),
                    "frame_index": preview.frame.frame_index,
                    "width": preview.width,
                    "height": preview.height,
                    "frame_count": preview.frame_count,
                    "fps": preview.frames_per_second,
                    "duration_seconds": preview.duration_seconds,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{} {}", "saved".green().bold(), out.display());
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "frameseek", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
