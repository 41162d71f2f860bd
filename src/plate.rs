use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use regex::Regex;
use std::fmt;
use std::io::{Cursor, ErrorKind, Write};
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::config::PlateConfig;
use crate::error::{BoxError, Error};
use crate::track::Track;

/// Shown wherever a plate could not be resolved (yet).
pub const PLATE_NOT_DETECTED: &str = "Not Detected";

/// Two letters, two digits, up to two letters, four digits.
pub const PLATE_PATTERN: &str = r"^[A-Z]{2}[0-9]{2}[A-Z]{0,2}[0-9]{4}$";

/// Best-effort text recognition over an image region.
pub trait TextReader: Send + Sync {
    /// `Ok(None)` when nothing readable was found.
    fn read(&self, region: &RgbImage) -> Result<Option<String>, BoxError>;
}

/// Reader that never finds anything, for setups without OCR.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTextReader;

impl TextReader for NoTextReader {
    fn read(&self, _region: &RgbImage) -> Result<Option<String>, BoxError> {
        Ok(None)
    }
}

/// Runs an external OCR program per crop, e.g. `tesseract stdin stdout --psm 7`.
///
/// The crop is written to the program's stdin as PNG and whatever it prints
/// on stdout is the candidate text. Blank output means nothing was read; a
/// non-zero exit status is an error.
#[derive(Debug, Clone)]
pub struct CommandTextReader {
    program: String,
    args: Vec<String>,
}

impl CommandTextReader {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits `cmdline` on whitespace. No quoting.
    pub fn parse(cmdline: &str) -> Result<Self, Error> {
        let mut words = cmdline.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| Error::Config("empty OCR command".into()))?;

        Ok(Self::new(program, words.collect()))
    }
}

impl TextReader for CommandTextReader {
    fn read(&self, region: &RgbImage) -> Result<Option<String>, BoxError> {
        let mut png = Cursor::new(Vec::new());
        region.write_to(&mut png, ImageFormat::Png)?;
        let png = png.into_inner();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", self.program, e))?;

        // stdin is fed from its own thread while stdout is drained here
        let stdin = child.stdin.take();
        let writer = std::thread::spawn(move || match stdin {
            Some(mut stdin) => match stdin.write_all(&png) {
                Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            },
            None => Ok(()),
        });

        let output = child.wait_with_output()?;
        match writer.join() {
            Ok(written) => written?,
            Err(_) => return Err("OCR input writer panicked".into()),
        }

        if !output.status.success() {
            return Err(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )
            .into());
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!text.is_empty()).then_some(text))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plate {
    Resolved(String),
    NotDetected,
}

impl Plate {
    #[inline]
    pub fn as_resolved(&self) -> Option<&str> {
        match self {
            Plate::Resolved(plate) => Some(plate),
            Plate::NotDetected => None,
        }
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plate::Resolved(plate) => f.write_str(plate),
            Plate::NotDetected => f.write_str(PLATE_NOT_DETECTED),
        }
    }
}

/// Strips every whitespace character and uppercases the rest.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Resolves a plate once per track and keeps it on the track afterwards.
///
/// Unresolved tracks are retried on every call; there is no attempt limit.
pub struct PlateCache {
    reader: Arc<dyn TextReader>,
    grammar: Regex,
    crop_width: Option<u32>,
}

impl PlateCache {
    pub fn new(reader: Arc<dyn TextReader>, config: &PlateConfig) -> Result<Self, Error> {
        let grammar =
            Regex::new(PLATE_PATTERN).map_err(|e| Error::Config(format!("plate pattern: {}", e)))?;

        Ok(Self {
            reader,
            grammar,
            crop_width: config.crop_width,
        })
    }

    /// Checks an already normalized string against the plate grammar.
    #[inline]
    pub fn is_valid(&self, plate: &str) -> bool {
        self.grammar.is_match(plate)
    }

    /// Returns the track's plate, reading it from `frame` if the track has none.
    pub fn resolve(&self, track: &mut Track, frame: &RgbImage) -> Plate {
        if let Some(plate) = track.plate() {
            return Plate::Resolved(plate.to_string());
        }

        let Some(region) = self.crop(track, frame) else {
            return Plate::NotDetected;
        };

        let text = match self.reader.read(&region) {
            Ok(Some(text)) => normalize(&text),
            Ok(None) => return Plate::NotDetected,
            Err(err) => {
                log::warn!("text reader failed for track {}: {}", track.track_id, err);
                return Plate::NotDetected;
            }
        };

        if !self.is_valid(&text) {
            log::debug!("track {}: rejected plate candidate {:?}", track.track_id, text);
            return Plate::NotDetected;
        }

        log::info!("track {}: plate {}", track.track_id, text);
        track.resolve_plate(text.clone());

        Plate::Resolved(text)
    }

    fn crop(&self, track: &Track, frame: &RgbImage) -> Option<RgbImage> {
        let (x, y, w, h) = track.bbox.clamped_region(frame.width(), frame.height())?;
        let region = imageops::crop_imm(frame, x, y, w, h).to_image();

        match self.crop_width {
            Some(width) if width != w => {
                let height = ((h as u64 * width as u64) / w as u64).max(1) as u32;
                Some(imageops::resize(&region, width, height, FilterType::Triangle))
            }
            _ => Some(region),
        }
    }
}
