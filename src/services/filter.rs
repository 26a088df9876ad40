use crate::messaging::EventDetail;
use std::collections::HashMap;

/// Outcome of checking a detection against the noise rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    /// The object has not moved
    Stationary,
    /// The camera requires more entered zones than the object has reached
    TooFewZones { entered: usize, required: usize },
}

impl FilterVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterVerdict::Accept)
    }
}

/// Decide whether a detection is worth tracking
pub fn evaluate(detail: &EventDetail, zone_thresholds: &HashMap<String, usize>) -> FilterVerdict {
    if detail.stationary {
        return FilterVerdict::Stationary;
    }

    if let Some(&required) = zone_thresholds.get(&detail.camera) {
        let entered = detail.entered_zones.len();
        if entered < required {
            return FilterVerdict::TooFewZones { entered, required };
        }
    }

    FilterVerdict::Accept
}

pub fn should_notify(detail: &EventDetail, zone_thresholds: &HashMap<String, usize>) -> bool {
    evaluate(detail, zone_thresholds).is_accepted()
}
