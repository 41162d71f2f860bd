use crate::bbox::{BBox, Ltrb};
use crate::history::SampleHistory;
use crate::violation::Violation;
use crate::Detection;

pub use crate::history::Sample;

#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: u32,
    pub bbox: BBox<Ltrb>,
    pub class: i32,
    pub confidence: f32,
    /// Consecutive updates without a matching detection
    pub misses: u32,

    // px/s scaled by the calibration factor
    pub speed: f64,
    pub violation: Violation,
    pub notified: bool,

    history: SampleHistory,
    plate: Option<String>,
}

impl Track {
    pub fn new(track_id: u32, det: &Detection, ts: f64, history_len: usize) -> Self {
        let bbox = det.ltrb();
        let mut history = SampleHistory::new(history_len);
        history.record(Sample {
            center: bbox.center(),
            ts,
        });

        Self {
            track_id,
            bbox,
            class: det.class,
            confidence: det.confidence,
            misses: 0,
            speed: 0.0,
            violation: Violation::None,
            notified: false,
            history,
            plate: None,
        }
    }

    /// Takes over the matched detection's box and appends its center to the history.
    pub fn observe(&mut self, det: &Detection, ts: f64) {
        self.bbox = det.ltrb();
        self.class = det.class;
        self.confidence = det.confidence;
        self.misses = 0;
        self.history.record(Sample {
            center: self.bbox.center(),
            ts,
        });
    }

    /// True when the last tracker update matched a detection to this track.
    #[inline]
    pub fn is_observed(&self) -> bool {
        self.misses == 0
    }

    #[inline]
    pub fn last_sample(&self) -> Option<&Sample> {
        self.history.latest()
    }

    #[inline]
    pub fn previous_sample(&self) -> Option<&Sample> {
        self.history.previous()
    }

    /// Oldest to newest.
    #[inline]
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.history.iter()
    }

    #[inline]
    pub fn plate(&self) -> Option<&str> {
        self.plate.as_deref()
    }

    /// Stores the first resolved plate. A resolved plate is never replaced;
    /// returns false when one was already set.
    pub(crate) fn resolve_plate(&mut self, plate: String) -> bool {
        if self.plate.is_some() {
            return false;
        }

        self.plate = Some(plate);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_plate_sticks() {
        let det = Detection::from_ltrb(0.0, 0.0, 10.0, 10.0, 0.9, 2);
        let mut track = Track::new(1, &det, 0.0, 4);
        assert!(track.plate().is_none());

        assert!(track.resolve_plate("MH12AB1234".into()));
        assert!(!track.resolve_plate("KA01CD5678".into()));
        assert_eq!(track.plate(), Some("MH12AB1234"));
    }

    #[test]
    fn observe_resets_misses_and_records() {
        let det = Detection::from_ltrb(0.0, 0.0, 10.0, 10.0, 0.9, 2);
        let mut track = Track::new(1, &det, 0.0, 4);
        track.misses = 1;
        assert!(!track.is_observed());

        track.observe(&Detection::from_ltrb(4.0, 0.0, 14.0, 10.0, 0.8, 2), 0.5);

        assert!(track.is_observed());
        assert_eq!(track.previous_sample().map(|s| s.center.x), Some(5.0));
        assert_eq!(track.last_sample().map(|s| (s.center.x, s.ts)), Some((9.0, 0.5)));
        assert_eq!(track.samples().count(), 2);
    }
}
