use nalgebra as na;
use std::collections::VecDeque;

/// One observed center position and the tracker clock at that moment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub center: na::Point2<f32>,
    pub ts: f64, // in seconds
}

/// Last `limit` samples of a track in observation order.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    samples: VecDeque<Sample>,
    limit: usize,
}

impl SampleHistory {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);

        Self {
            samples: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn record(&mut self, sample: Sample) {
        while self.samples.len() >= self.limit {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    #[inline]
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// The sample recorded right before [`latest`](Self::latest).
    #[inline]
    pub fn previous(&self) -> Option<&Sample> {
        self.samples.len().checked_sub(2).and_then(|i| self.samples.get(i))
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}
