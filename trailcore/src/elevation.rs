//! Elevation enrichment decisions.
//!
//! The throttle decides, per accepted sample, whether the elevation comes
//! from the device, from the cached external value, or requires a fresh
//! external lookup. It never performs the lookup itself.

use crate::entry::{Elevation, ElevationSource};

/// What to do about elevation for one accepted sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElevationPlan {
    /// Device altitude is usable; attach it immediately.
    Device(Elevation),
    /// Issue an external lookup now. The entry stays without elevation
    /// until the reply is applied.
    Lookup,
    /// Throttled; reuse the last external value.
    Cached(Elevation),
    /// Throttled and nothing cached yet.
    Unavailable,
}

/// Rate limiter for the external elevation lookup (one call per interval).
#[derive(Debug, Clone)]
pub struct ElevationThrottle {
    interval_ms: u64,
    last_lookup_ms: Option<u64>,
    cached_meters: Option<f64>,
}

impl ElevationThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_lookup_ms: None,
            cached_meters: None,
        }
    }

    /// Decide for a sample captured at monotonic time `now_ms`.
    pub fn plan(
        &mut self,
        device_altitude: Option<f64>,
        device_accuracy: Option<f64>,
        now_ms: u64,
    ) -> ElevationPlan {
        if let Some(meters) = device_altitude.filter(|a| a.is_finite()) {
            self.cached_meters = None;
            return ElevationPlan::Device(Elevation {
                meters,
                source: ElevationSource::Device,
                accuracy: device_accuracy.filter(|a| a.is_finite()),
            });
        }

        let due = match self.last_lookup_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
        };

        if due {
            self.last_lookup_ms = Some(now_ms);
            return ElevationPlan::Lookup;
        }

        match self.cached_meters {
            Some(meters) => ElevationPlan::Cached(Elevation {
                meters,
                source: ElevationSource::ApiCached,
                accuracy: None,
            }),
            None => ElevationPlan::Unavailable,
        }
    }

    /// Record a fresh external value and return it tagged `api`.
    pub fn record_lookup(&mut self, meters: f64) -> Option<Elevation> {
        if !meters.is_finite() {
            return None;
        }
        self.cached_meters = Some(meters);
        Some(Elevation {
            meters,
            source: ElevationSource::Api,
            accuracy: None,
        })
    }

    pub fn cached_meters(&self) -> Option<f64> {
        self.cached_meters
    }

    pub fn reset(&mut self) {
        self.last_lookup_ms = None;
        self.cached_meters = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_altitude_bypasses_lookup() {
        let mut throttle = ElevationThrottle::new(10_000);
        throttle.record_lookup(300.0);

        let plan = throttle.plan(Some(512.0), Some(3.0), 0);
        match plan {
            ElevationPlan::Device(e) => {
                assert_eq!(e.meters, 512.0);
                assert_eq!(e.source, ElevationSource::Device);
                assert_eq!(e.accuracy, Some(3.0));
            }
            other => panic!("unexpected {:?}", other),
        }
        // Cached external value is cleared by a device reading
        assert_eq!(throttle.cached_meters(), None);
    }

    #[test]
    fn test_lookup_throttled_to_interval() {
        let mut throttle = ElevationThrottle::new(10_000);

        assert_eq!(throttle.plan(None, None, 0), ElevationPlan::Lookup);
        assert_eq!(throttle.plan(None, None, 4_000), ElevationPlan::Unavailable);

        throttle.record_lookup(88.0);
        match throttle.plan(None, None, 9_999) {
            ElevationPlan::Cached(e) => {
                assert_eq!(e.meters, 88.0);
                assert_eq!(e.source, ElevationSource::ApiCached);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(throttle.plan(None, None, 10_000), ElevationPlan::Lookup);
    }

    #[test]
    fn test_nan_device_altitude_falls_back() {
        let mut throttle = ElevationThrottle::new(10_000);
        assert_eq!(throttle.plan(Some(f64::NAN), None, 0), ElevationPlan::Lookup);
    }
}
