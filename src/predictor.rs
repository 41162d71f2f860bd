use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::math::linear_ls;
use crate::track::Track;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MotionModel {
    /// The track stays where it was last seen.
    ConstantPosition,
    /// The track keeps moving with the velocity fitted over its history.
    #[default]
    ConstantVelocity,
}

#[derive(Debug, Clone, Copy)]
pub struct Predictor {
    model: MotionModel,
}

impl Predictor {
    pub fn new(model: MotionModel) -> Self {
        Self { model }
    }

    /// Velocity in px/s, least squares over the whole history.
    pub fn velocity(track: &Track) -> Option<na::Vector2<f32>> {
        let samples: Vec<_> = track.samples().collect();
        if samples.len() < 2 {
            return None;
        }

        // centered on the newest timestamp to keep the normal equations well conditioned
        let t0 = samples[samples.len() - 1].ts;
        let t = na::DVector::from_iterator(samples.len(), samples.iter().map(|s| s.ts - t0));
        let x = na::DVector::from_iterator(
            samples.len(),
            samples.iter().map(|s| s.center.x as f64),
        );
        let y = na::DVector::from_iterator(
            samples.len(),
            samples.iter().map(|s| s.center.y as f64),
        );

        let vx = linear_ls(&t, &x)?[0];
        let vy = linear_ls(&t, &y)?[0];

        Some(na::Vector2::new(vx as f32, vy as f32))
    }

    /// Box where `track` is expected to be at tracker time `now`.
    pub fn predict(&self, track: &Track, now: f64) -> BBox<Ltrb> {
        match self.model {
            MotionModel::ConstantPosition => track.bbox,
            MotionModel::ConstantVelocity => {
                let (Some(vel), Some(last)) = (Self::velocity(track), track.last_sample()) else {
                    return track.bbox;
                };

                let dt = (now - last.ts).max(0.0) as f32;
                track.bbox.translated(vel * dt)
            }
        }
    }
}
