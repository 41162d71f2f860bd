use munkres::{solve_assignment, WeightMatrix};

use crate::bbox::{BBox, Ltrb};
use crate::config::TrackerConfig;
use crate::error::Error;
use crate::predictor::Predictor;
use crate::{Detection, Track};

const MAX_ASSIGNMENT_SIZE: usize = 256;

// Assignment costs are exact integers ordered lexicographically: IoU first
// (quantized to 1e-6), then detection rank, then track rank. Each scale is
// larger than the sum of the lower terms over any assignment of up to
// MAX_ASSIGNMENT_SIZE rows, so a rank can only decide between equal IoUs.
const IOU_STEPS: u64 = 1_000_000;
const DETECTION_RANK_SCALE: u64 = 1 << 16;
const IOU_SCALE: u64 = 1 << 32;

// Cost of leaving a row or column unmatched, the same as a pair with zero IoU.
const UNMATCHED_COST: u64 = IOU_STEPS * IOU_SCALE;

/// Keeps the set of active tracks and binds each frame's detections to them.
#[derive(Debug)]
pub struct TrackManager {
    config: TrackerConfig,
    predictor: Predictor,
    tracks: Vec<Track>,
    next_id: u32,
    clock: f64,
    last_timestamp: Option<f64>,
}

struct Association {
    matched: Vec<(usize, usize)>,
    unmatched_detections: Vec<usize>,
}

impl TrackManager {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            predictor: Predictor::new(config.motion_model),
            config,
            tracks: Vec::with_capacity(64),
            next_id: 1,
            clock: 0.0,
            last_timestamp: None,
        }
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[inline]
    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    /// Seconds accumulated over all updates.
    #[inline]
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Class filter and detection line check. Detections failing either are
    /// never associated and never start a track.
    pub fn admits(&self, det: &Detection) -> bool {
        self.config.vehicle_classes.contains(&det.class) && det.y >= self.config.detection_line_y
    }

    /// Runs one predict/associate/update cycle. `dt` is the time elapsed since
    /// the previous call, in seconds.
    ///
    /// On error the tracks are left untouched.
    pub fn update(&mut self, detections: &[Detection], dt: f64) -> Result<&[Track], Error> {
        let now = self.clock + dt.max(0.0);

        let admitted: Vec<&Detection> = detections.iter().filter(|d| self.admits(d)).collect();
        let association = self.associate(&admitted, now)?;

        self.clock = now;

        let mut matched_tracks = vec![false; self.tracks.len()];
        for &(track_idx, det_idx) in &association.matched {
            self.tracks[track_idx].observe(admitted[det_idx], now);
            matched_tracks[track_idx] = true;
        }

        let max_misses = self.config.max_misses;
        let mut idx = 0;
        self.tracks.retain_mut(|track| {
            let matched = matched_tracks[idx];
            idx += 1;

            if matched {
                return true;
            }

            track.misses += 1;
            if track.misses > max_misses {
                log::debug!("track {} evicted after {} misses", track.track_id, track.misses);
                false
            } else {
                true
            }
        });

        for det_idx in association.unmatched_detections {
            let id = self.next_id;
            self.next_id += 1;

            log::debug!("track {} started", id);
            self.tracks
                .push(Track::new(id, admitted[det_idx], now, self.config.history_len));
        }

        Ok(&self.tracks)
    }

    /// Like [`update`](Self::update) with `dt` taken from the timestamp of the
    /// last successful call. A failed call does not move that timestamp, so
    /// the next one spans the whole gap.
    pub fn update_at(&mut self, detections: &[Detection], timestamp: f64) -> Result<&[Track], Error> {
        let dt = self
            .last_timestamp
            .map(|last| (timestamp - last).max(0.0))
            .unwrap_or(0.0);

        self.update(detections, dt)?;
        self.last_timestamp = Some(timestamp);

        Ok(&self.tracks)
    }

    /// Drops every track. Identities keep counting up from where they were.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    fn associate(&self, dets: &[&Detection], now: f64) -> Result<Association, Error> {
        let mut det_order: Vec<usize> = (0..dets.len()).collect();
        det_order.sort_by(|&a, &b| dets[b].confidence.total_cmp(&dets[a].confidence));

        if self.tracks.is_empty() || dets.is_empty() {
            return Ok(Association {
                matched: Vec::new(),
                unmatched_detections: det_order,
            });
        }

        let mut track_order: Vec<usize> = (0..self.tracks.len()).collect();
        track_order.sort_by_key(|&i| self.tracks[i].track_id);

        let n = track_order.len().max(det_order.len());
        if n > MAX_ASSIGNMENT_SIZE {
            return Err(Error::Assignment(format!(
                "{} tracks x {} detections exceeds {}",
                track_order.len(),
                det_order.len(),
                MAX_ASSIGNMENT_SIZE
            )));
        }

        let predicted: Vec<BBox<Ltrb>> = track_order
            .iter()
            .map(|&i| self.predictor.predict(&self.tracks[i], now))
            .collect();

        let mut iou = vec![0.0f32; n * n];
        let mut costs = vec![UNMATCHED_COST; n * n];
        for (r, pred) in predicted.iter().enumerate() {
            for (c, &det_idx) in det_order.iter().enumerate() {
                let score = pred.iou(&dets[det_idx].ltrb());
                iou[r * n + c] = score;

                if score >= self.config.iou_threshold {
                    costs[r * n + c] = pair_cost(score, r, c);
                }
            }
        }

        let mut weights = WeightMatrix::from_row_vec(n, costs);
        let positions = solve_assignment(&mut weights)
            .map_err(|e| Error::Assignment(format!("{:?}", e)))?;

        let mut matched = Vec::new();
        let mut det_taken = vec![false; det_order.len()];
        for pos in positions {
            if pos.row >= track_order.len() || pos.column >= det_order.len() {
                continue;
            }

            if iou[pos.row * n + pos.column] >= self.config.iou_threshold {
                matched.push((track_order[pos.row], det_order[pos.column]));
                det_taken[pos.column] = true;
            }
        }

        let unmatched_detections = det_order
            .iter()
            .zip(det_taken)
            .filter_map(|(&det_idx, taken)| if taken { None } else { Some(det_idx) })
            .collect();

        Ok(Association {
            matched,
            unmatched_detections,
        })
    }
}

/// `r` is the track rank (by identity), `c` the detection rank (by confidence).
fn pair_cost(iou: f32, r: usize, c: usize) -> u64 {
    let steps = ((iou as f64).clamp(0.0, 1.0) * IOU_STEPS as f64).round() as u64;

    (IOU_STEPS - steps) * IOU_SCALE + c as u64 * DETECTION_RANK_SCALE + r as u64
}
