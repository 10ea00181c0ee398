//! Sample filter: rejects low-quality or redundant positioning samples.

use serde::{Deserialize, Serialize};

use crate::geo_utils::haversine_m;
use crate::GpsPoint;

/// A raw positioning sample as delivered by the positioning subscription.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters
    pub accuracy: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub altitude_accuracy: Option<f64>,
    /// Capture time, Unix milliseconds
    pub timestamp: i64,
}

impl RawSample {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            altitude: None,
            altitude_accuracy: None,
            timestamp,
        }
    }

    pub fn with_altitude(mut self, altitude: f64, altitude_accuracy: Option<f64>) -> Self {
        self.altitude = Some(altitude);
        self.altitude_accuracy = altitude_accuracy;
        self
    }

    pub fn coords(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }

    /// Device altitude, if present and a real number.
    pub fn usable_altitude(&self) -> Option<f64> {
        self.altitude.filter(|a| a.is_finite())
    }
}

/// Why a sample was dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    /// Coordinates outside the valid lat/lng range or not finite
    InvalidCoordinates,
    /// Accuracy radius above the configured limit
    LowAccuracy { accuracy: f64, limit: f64 },
    /// Too close to the last accepted coordinate
    Jitter { moved_m: f64, limit: f64 },
    /// Sample arrived while not actively tracking
    NotTracking,
}

/// Outcome of running a sample through the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDecision {
    /// Accepted. `moved_m` is the distance from the previous accepted
    /// coordinate, `None` when there is none.
    Accept { moved_m: Option<f64> },
    Reject(Rejection),
}

/// Fixed-threshold noise gate.
#[derive(Debug, Clone, Copy)]
pub struct SampleFilter {
    pub max_accuracy_m: f64,
    pub min_movement_m: f64,
}

impl SampleFilter {
    pub fn new(max_accuracy_m: f64, min_movement_m: f64) -> Self {
        Self {
            max_accuracy_m,
            min_movement_m,
        }
    }

    /// Evaluate a sample against the last accepted coordinate.
    ///
    /// With `bypass_jitter` set the movement gate is skipped; the recorder
    /// uses it for the first sample after tracking starts.
    pub fn evaluate(
        &self,
        sample: &RawSample,
        last_accepted: Option<GpsPoint>,
        bypass_jitter: bool,
    ) -> FilterDecision {
        let coords = sample.coords();
        if !coords.is_valid() {
            return FilterDecision::Reject(Rejection::InvalidCoordinates);
        }

        if !sample.accuracy.is_finite() || sample.accuracy > self.max_accuracy_m {
            return FilterDecision::Reject(Rejection::LowAccuracy {
                accuracy: sample.accuracy,
                limit: self.max_accuracy_m,
            });
        }

        let moved_m = last_accepted.map(|prev| haversine_m(&prev, &coords));

        if let Some(moved) = moved_m {
            if !bypass_jitter && moved < self.min_movement_m {
                return FilterDecision::Reject(Rejection::Jitter {
                    moved_m: moved,
                    limit: self.min_movement_m,
                });
            }
        }

        FilterDecision::Accept { moved_m }
    }
}

impl Default for SampleFilter {
    fn default() -> Self {
        Self::new(100.0, 3.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::meters_to_lat_degrees;

    fn sample_at(lat: f64, accuracy: f64) -> RawSample {
        RawSample::new(lat, 8.0, accuracy, 0)
    }

    #[test]
    fn test_rejects_low_accuracy() {
        let filter = SampleFilter::default();
        let decision = filter.evaluate(&sample_at(46.0, 150.0), None, false);
        assert!(matches!(
            decision,
            FilterDecision::Reject(Rejection::LowAccuracy { .. })
        ));

        // Exactly at the limit is still accepted
        let decision = filter.evaluate(&sample_at(46.0, 100.0), None, false);
        assert_eq!(decision, FilterDecision::Accept { moved_m: None });
    }

    #[test]
    fn test_first_sample_never_jitter() {
        let filter = SampleFilter::default();
        let decision = filter.evaluate(&sample_at(46.0, 5.0), None, false);
        assert_eq!(decision, FilterDecision::Accept { moved_m: None });
    }

    #[test]
    fn test_rejects_jitter() {
        let filter = SampleFilter::default();
        let last = GpsPoint::new(46.0, 8.0);
        let near = sample_at(46.0 + meters_to_lat_degrees(1.5), 5.0);

        let decision = filter.evaluate(&near, Some(last), false);
        assert!(matches!(
            decision,
            FilterDecision::Reject(Rejection::Jitter { .. })
        ));

        // Bypass lets it through and still reports the movement
        match filter.evaluate(&near, Some(last), true) {
            FilterDecision::Accept { moved_m: Some(m) } => assert!((m - 1.5).abs() < 1e-6),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_invalid_coordinates() {
        let filter = SampleFilter::default();
        let decision = filter.evaluate(&RawSample::new(f64::NAN, 0.0, 5.0, 0), None, false);
        assert_eq!(decision, FilterDecision::Reject(Rejection::InvalidCoordinates));
    }

    #[test]
    fn test_nan_altitude_is_not_usable() {
        let sample = RawSample::new(1.0, 1.0, 5.0, 0).with_altitude(f64::NAN, None);
        assert_eq!(sample.usable_altitude(), None);
    }
}
