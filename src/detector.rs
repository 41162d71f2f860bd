use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::detection::Detection;
use crate::error::{BoxError, Error};
use crate::frame::Frame;

/// Object detector port. Returns every box found in `frame`; class filtering
/// happens in the tracker.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, BoxError>;
}

/// Detections computed offline, one line per frame: `<index>: [<detection>, ..]`.
///
/// Frames missing from the log have no detections.
#[derive(Debug, Default, Clone)]
pub struct DetectionLog {
    frames: HashMap<u64, Vec<Detection>>,
}

impl DetectionLog {
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut frames = HashMap::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some((index, vector)) = line.split_once(':') else {
                return Err(Error::Config(format!(
                    "detection log line {}: missing frame index",
                    lineno + 1
                )));
            };

            let index = index.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("detection log line {}: {}", lineno + 1, e))
            })?;

            let dets: Vec<Detection> = serde_json::from_str(vector)?;
            frames.insert(index, dets);
        }

        log::debug!("detection log with {} frames", frames.len());

        Ok(Self { frames })
    }

    pub fn insert(&mut self, index: u64, dets: Vec<Detection>) {
        self.frames.insert(index, dets);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Detector for DetectionLog {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, BoxError> {
        Ok(self.frames.get(&frame.index).cloned().unwrap_or_default())
    }
}

/// Reports the same detections for every frame.
#[derive(Debug, Default, Clone)]
pub struct StaticDetector {
    dets: Vec<Detection>,
}

impl StaticDetector {
    pub fn new(dets: Vec<Detection>) -> Self {
        Self { dets }
    }
}

impl Detector for StaticDetector {
    fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, BoxError> {
        Ok(self.dets.clone())
    }
}
