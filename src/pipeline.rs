//! Per-frame processing and the pull-based loop that drives it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::annotate::{Annotator, Overlay};
use crate::config::Config;
use crate::detector::Detector;
use crate::error::Error;
use crate::frame::Frame;
use crate::mjpeg;
use crate::notify::{NotificationDispatcher, Offence};
use crate::plate::PlateCache;
use crate::record::ViolationRecord;
use crate::session::{Collaborators, Session};
use crate::source::FrameSource;
use crate::speed::SpeedEstimator;
use crate::violation::ViolationClassifier;

/// Runs detection, tracking, measurement, notification and rendering for one
/// frame. Holds no per-session state.
pub struct FrameProcessor {
    detector: Arc<dyn Detector>,
    speed: SpeedEstimator,
    classifier: ViolationClassifier,
    plates: PlateCache,
    dispatcher: NotificationDispatcher,
    annotator: Annotator,
    jpeg_quality: u8,
}

impl FrameProcessor {
    pub fn new(config: &Config, collaborators: Collaborators) -> Result<Self, Error> {
        Ok(Self {
            detector: collaborators.detector,
            speed: SpeedEstimator::new(&config.speed),
            classifier: ViolationClassifier::new(&config.violation),
            plates: PlateCache::new(collaborators.reader, &config.plate)?,
            dispatcher: NotificationDispatcher::new(collaborators.owners, collaborators.notifier),
            annotator: Annotator::new(&config.annotate)?,
            jpeg_quality: config.pipeline.jpeg_quality,
        })
    }

    /// Processes `frame` against `session` and returns the multipart part to
    /// emit.
    ///
    /// `is_live` is asked before each notification; `Ok(None)` means the
    /// session was superseded midway and nothing more was sent.
    pub fn process<F>(
        &self,
        session: &Session,
        frame: &Frame,
        is_live: F,
    ) -> Result<Option<Vec<u8>>, Error>
    where
        F: Fn() -> bool,
    {
        let dets = self.detector.detect(frame).map_err(Error::Detector)?;

        let mut overlays = Vec::new();
        {
            let mut tracker = session.tracker();
            tracker.update_at(&dets, frame.timestamp)?;

            for track in tracker.tracks_mut().iter_mut().filter(|t| t.is_observed()) {
                track.speed = self.speed.estimate_track(track);
                track.violation = self.classifier.classify(track.speed);

                let plate = self.plates.resolve(track, &frame.image);

                session.records().upsert(ViolationRecord {
                    id: track.track_id,
                    plate: plate.to_string(),
                    speed: track.speed,
                    unit: self.speed.unit().to_string(),
                    violation: track.violation,
                });

                if track.violation.is_violation() && !track.notified {
                    if !is_live() {
                        return Ok(None);
                    }

                    let offence = Offence {
                        track_id: track.track_id,
                        plate: plate.as_resolved(),
                        speed: track.speed,
                        unit: self.speed.unit(),
                        violation: track.violation,
                    };
                    let outcome = self.dispatcher.dispatch(&offence, session.notified());
                    log::debug!("track {}: {:?}", track.track_id, outcome);

                    track.notified = session.notified().contains(track.track_id);
                }

                overlays.push(Overlay {
                    track_id: track.track_id,
                    bbox: track.bbox,
                    plate,
                    speed: track.speed,
                    unit: self.speed.unit().to_string(),
                    violation: track.violation,
                });
            }
        }

        let annotated = self.annotator.annotate(&frame.image, &overlays);
        let jpeg = mjpeg::encode_jpeg(&annotated, self.jpeg_quality)?;

        Ok(Some(mjpeg::multipart_part(&jpeg)))
    }
}

/// Iterator over the annotated output of one session.
///
/// Every `stride`-th frame read from the source is processed (counting from
/// 1), the rest are dropped unseen. Nothing is read until `next` is called.
/// A frame that fails to decode or process is logged and skipped. The loop
/// ends when the source ends, fails to read, or its session is no longer
/// current.
pub struct FrameLoop {
    session: Arc<Session>,
    source: Box<dyn FrameSource>,
    processor: Arc<FrameProcessor>,
    generation: Arc<AtomicU64>,
    stride: u64,
    count: u64,
    done: bool,
}

impl FrameLoop {
    pub(crate) fn new(
        session: Arc<Session>,
        source: Box<dyn FrameSource>,
        processor: Arc<FrameProcessor>,
        generation: Arc<AtomicU64>,
        stride: u32,
    ) -> Self {
        Self {
            session,
            source,
            processor,
            generation,
            stride: stride.max(1) as u64,
            count: 0,
            done: false,
        }
    }

    #[inline]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Frames read from the source so far, processed or not.
    #[inline]
    pub fn frames_read(&self) -> u64 {
        self.count
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.session.id()
    }

    fn stop(&mut self, why: &str) -> Option<Vec<u8>> {
        log::info!(
            "session {}: frame loop stopped after {} frames ({})",
            self.session.id(),
            self.count,
            why
        );
        self.done = true;
        None
    }
}

impl Iterator for FrameLoop {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if !self.is_live() {
                return self.stop("session replaced");
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return self.stop("end of source"),
                Err(err @ Error::FrameDecode { .. }) => {
                    log::warn!("session {}: {}", self.session.id(), err);
                    self.count += 1;
                    continue;
                }
                Err(err) => {
                    log::warn!("session {}: {}", self.session.id(), err);
                    return self.stop("read error");
                }
            };

            self.count += 1;
            if self.count % self.stride != 0 {
                continue;
            }

            if !self.is_live() {
                return self.stop("session replaced");
            }

            let generation = self.generation.clone();
            let session_id = self.session.id();
            let live = move || generation.load(Ordering::SeqCst) == session_id;

            match self.processor.process(&self.session, &frame, live) {
                Ok(Some(part)) => {
                    if !self.is_live() {
                        return self.stop("session replaced");
                    }
                    return Some(part);
                }
                Ok(None) => return self.stop("session replaced"),
                Err(err) => {
                    log::warn!(
                        "session {}: frame {} skipped: {}",
                        self.session.id(),
                        frame.index,
                        err
                    );
                }
            }
        }
    }
}
