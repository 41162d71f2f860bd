use serde_derive::{Deserialize, Serialize};
use std::fmt;

use crate::config::ViolationConfig;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Violation {
    #[default]
    None,
    OverSpeed,
}

impl Violation {
    #[inline]
    pub fn is_violation(&self) -> bool {
        !matches!(self, Violation::None)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::None => f.write_str("None"),
            Violation::OverSpeed => f.write_str("Over Speed"),
        }
    }
}

/// Thresholds a speed into a [`Violation`]. No memory between calls, so a track
/// hovering around the limit may flip every frame.
#[derive(Debug, Clone, Copy)]
pub struct ViolationClassifier {
    speed_limit: f64,
}

impl ViolationClassifier {
    pub fn new(config: &ViolationConfig) -> Self {
        Self {
            speed_limit: config.speed_limit,
        }
    }

    #[inline]
    pub fn classify(&self, speed: f64) -> Violation {
        if speed > self.speed_limit {
            Violation::OverSpeed
        } else {
            Violation::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_itself_is_not_a_violation() {
        let classifier = ViolationClassifier::new(&ViolationConfig { speed_limit: 80.0 });
        assert_eq!(classifier.classify(80.0), Violation::None);
        assert_eq!(classifier.classify(80.01), Violation::OverSpeed);
        assert_eq!(classifier.classify(0.0), Violation::None);
    }

    #[test]
    fn labels() {
        assert_eq!(Violation::OverSpeed.to_string(), "Over Speed");
        assert_eq!(Violation::None.to_string(), "None");
    }
}
