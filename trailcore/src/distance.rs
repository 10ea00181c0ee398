//! Running total of great-circle distance across accepted samples.

use crate::geo_utils::haversine_km;
use crate::GpsPoint;

/// Accumulates haversine distance between consecutive accepted coordinates.
///
/// The total only ever grows; it is reset with the whole buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceAccumulator {
    total_km: f64,
}

impl DistanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a restored total.
    pub fn with_total(total_km: f64) -> Self {
        Self {
            total_km: if total_km.is_finite() && total_km > 0.0 {
                total_km
            } else {
                0.0
            },
        }
    }

    /// Add the leg from `prev` to `next` and return its length in km.
    pub fn add_leg(&mut self, prev: &GpsPoint, next: &GpsPoint) -> f64 {
        let leg = haversine_km(prev, next);
        if leg.is_finite() {
            self.total_km += leg;
            leg
        } else {
            0.0
        }
    }

    pub fn total_km(&self) -> f64 {
        self.total_km
    }

    pub fn reset(&mut self) {
        self.total_km = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::meters_to_lat_degrees;

    #[test]
    fn test_accumulates_legs() {
        let step = meters_to_lat_degrees(250.0);
        let points: Vec<GpsPoint> = (0..5)
            .map(|i| GpsPoint::new(40.0 + step * i as f64, -3.7))
            .collect();

        let mut acc = DistanceAccumulator::new();
        let mut last_total = 0.0;
        for w in points.windows(2) {
            acc.add_leg(&w[0], &w[1]);
            assert!(acc.total_km() >= last_total);
            last_total = acc.total_km();
        }
        assert!((acc.total_km() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_with_total_sanitizes() {
        assert_eq!(DistanceAccumulator::with_total(f64::NAN).total_km(), 0.0);
        assert_eq!(DistanceAccumulator::with_total(-2.0).total_km(), 0.0);
        assert_eq!(DistanceAccumulator::with_total(3.5).total_km(), 3.5);
    }
}
