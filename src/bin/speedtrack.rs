//! speedtrack - Track vehicles in a video source, estimate their speed and
//! notify owners of over-speeding vehicles.
//!
//! Annotated frames are written as an MJPEG multipart stream (to a file or
//! stdout); the violation table is written as JSON when the stream ends.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use speedtrack::{
    mjpeg, Collaborators, CommandTextReader, Config, DetectionLog, Detector, Engine, LogNotifier,
    MediaSource, NoTextReader, OwnerRegistry, StaticDetector, TextReader,
};

#[derive(Parser, Debug)]
#[command(
    name = "speedtrack",
    about = "Vehicle speed tracking and over-speed notification"
)]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "PATH", env = "SPEEDTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// Frame directory, video file, http(s)/rtsp URL or stub://WxH[/N]
    #[arg(long, value_name = "SOURCE")]
    source: String,

    /// Precomputed detections, one `<frame>: [..]` line per frame
    #[arg(long, value_name = "PATH")]
    detections: Option<PathBuf>,

    /// Owner registry: `.csv` with plate_number,name,contact,email columns,
    /// otherwise TOML [[owner]] tables
    #[arg(long, value_name = "PATH")]
    owners: Option<PathBuf>,

    /// OCR program fed each plate crop as PNG on stdin,
    /// e.g. "tesseract stdin stdout --psm 7"
    #[arg(long, value_name = "CMD", env = "SPEEDTRACK_OCR_COMMAND")]
    ocr_command: Option<String>,

    /// Where to write the MJPEG stream, `-` for stdout
    #[arg(long, default_value = "-", value_name = "PATH")]
    output: String,

    /// Where to write the violation report (JSON)
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Stop after this many emitted frames
    #[arg(long, value_name = "N")]
    max_frames: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = Config::load_from(args.config.as_deref())?;

    let detector: Arc<dyn Detector> = match &args.detections {
        Some(path) => Arc::new(
            DetectionLog::from_path(path)
                .with_context(|| format!("failed to load detections {}", path.display()))?,
        ),
        None => {
            log::warn!("no detections given, frames pass through unannotated");
            Arc::new(StaticDetector::default())
        }
    };

    let owners = match &args.owners {
        Some(path) => OwnerRegistry::load(path)
            .with_context(|| format!("failed to load owners {}", path.display()))?,
        None => OwnerRegistry::new(),
    };
    log::info!("{} registered owners", owners.len());

    let reader: Arc<dyn TextReader> = match &args.ocr_command {
        Some(cmdline) => Arc::new(CommandTextReader::parse(cmdline)?),
        None => {
            log::warn!("no OCR command given, plates stay unresolved");
            Arc::new(NoTextReader)
        }
    };

    let engine = Engine::new(
        config,
        Collaborators {
            detector,
            reader,
            owners: Arc::new(owners),
            notifier: Arc::new(LogNotifier),
        },
    )?;

    engine.select_source(MediaSource::parse(&args.source)?);
    let frames = engine.stream()?;

    let mut out: Box<dyn Write> = if args.output == "-" {
        Box::new(std::io::stdout().lock())
    } else {
        let file = std::fs::File::create(&args.output)
            .map_err(|e| anyhow!("failed to create {}: {}", args.output, e))?;
        Box::new(std::io::BufWriter::new(file))
    };

    let limit = args.max_frames.unwrap_or(usize::MAX);
    let mut emitted = 0;
    for part in frames.take(limit) {
        out.write_all(&part)?;
        emitted += 1;
    }
    out.flush()?;

    let report = engine.report();
    log::info!(
        "{} frames emitted ({}), {} vehicles, {} notified",
        emitted,
        mjpeg::CONTENT_TYPE,
        report.len(),
        engine.notified().len()
    );

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }

    Ok(())
}
