//! External elevation lookup over HTTP.
//!
//! The client speaks the Open-Elevation style API:
//! `GET {url}?locations=lat,lng` returning
//! `{"results":[{"latitude":..,"longitude":..,"elevation":..}]}`.

use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use trailcore::GpsPoint;

use crate::error::ElevationError;

const MAX_RETRIES: u32 = 2;

/// Elevation lookup collaborator. `Ok(None)` means the service had no value.
pub trait ElevationLookup: Send + Sync {
    fn lookup(&self, point: GpsPoint) -> BoxFuture<'static, Result<Option<f64>, ElevationError>>;
}

/// Lookup that never has a value (no service configured).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoElevation;

impl ElevationLookup for NoElevation {
    fn lookup(&self, _point: GpsPoint) -> BoxFuture<'static, Result<Option<f64>, ElevationError>> {
        future::ready(Ok(None)).boxed()
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    elevation: Option<f64>,
}

/// HTTP client for an Open-Elevation compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenElevationClient {
    client: Client,
    url: String,
}

impl OpenElevationClient {
    pub fn new(url: impl Into<String>) -> Result<Self, ElevationError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Fetch the elevation at `point`, retrying 429s with backoff.
    pub async fn fetch(&self, point: GpsPoint) -> Result<Option<f64>, ElevationError> {
        let locations = format!("{},{}", point.latitude, point.longitude);
        let mut retries = 0;

        loop {
            let resp = self
                .client
                .get(&self.url)
                .query(&[("locations", locations.as_str())])
                .send()
                .await?;

            let status = resp.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RETRIES {
                    return Err(ElevationError::RateLimited);
                }
                let backoff = Duration::from_millis(500 * (1 << retries));
                warn!(
                    "[OpenElevationClient] 429 for {}, retry {} after {:?}",
                    locations, retries, backoff
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            if !status.is_success() {
                return Err(ElevationError::Status(status.as_u16()));
            }

            let body: LookupResponse = resp.json().await?;
            let elevation = body
                .results
                .first()
                .and_then(|r| r.elevation)
                .filter(|e| e.is_finite());
            debug!("[OpenElevationClient] {} -> {:?}", locations, elevation);
            return Ok(elevation);
        }
    }
}

impl ElevationLookup for OpenElevationClient {
    fn lookup(&self, point: GpsPoint) -> BoxFuture<'static, Result<Option<f64>, ElevationError>> {
        let client = self.clone();
        async move { client.fetch(point).await }.boxed()
    }
}
