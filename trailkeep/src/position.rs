//! Positioning subscription seam.

use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;
use trailcore::RawSample;

use crate::config::PositionOptions;

/// Sensor failure delivered by the positioning subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location request timed out")]
    Timeout,
    #[error("location unavailable")]
    Unavailable,
}

pub type SampleReceiver = mpsc::UnboundedReceiver<Result<RawSample, PositionError>>;

/// An active positioning subscription. Samples arrive in capture order.
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub samples: SampleReceiver,
}

/// Source of positioning samples.
pub trait PositionSource: Send + Sync {
    fn subscribe(&self, options: &PositionOptions) -> Result<Subscription, PositionError>;
    fn unsubscribe(&self, id: u64);
}

/// Position source fed by hand (tests, replay).
///
/// Samples pushed while nobody is subscribed are dropped.
#[derive(Debug, Default)]
pub struct ChannelPositionSource {
    inner: Mutex<ChannelInner>,
}

#[derive(Debug, Default)]
struct ChannelInner {
    next_id: u64,
    active: Option<(u64, mpsc::UnboundedSender<Result<RawSample, PositionError>>)>,
    deny: bool,
    subscribe_count: usize,
}

impl ChannelPositionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `subscribe` calls fail with `PermissionDenied`.
    pub fn deny_permission(&self, deny: bool) {
        self.lock().deny = deny;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, item: Result<RawSample, PositionError>) -> bool {
        match &self.lock().active {
            Some((_, tx)) => tx.send(item).is_ok(),
            None => false,
        }
    }

    /// Deliver a sample. Returns `false` if there is no subscriber.
    pub fn push(&self, sample: RawSample) -> bool {
        self.send(Ok(sample))
    }

    /// Deliver a sensor error. Returns `false` if there is no subscriber.
    pub fn push_error(&self, error: PositionError) -> bool {
        self.send(Err(error))
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().active.is_some()
    }

    /// Number of successful `subscribe` calls so far.
    pub fn subscribe_count(&self) -> usize {
        self.lock().subscribe_count
    }
}

impl PositionSource for ChannelPositionSource {
    fn subscribe(&self, options: &PositionOptions) -> Result<Subscription, PositionError> {
        let mut inner = self.lock();
        if inner.deny {
            return Err(PositionError::PermissionDenied);
        }
        inner.next_id += 1;
        inner.subscribe_count += 1;
        let id = inner.next_id;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.active = Some((id, tx));
        log::debug!(
            "[ChannelPositionSource] Subscription {} (high_accuracy={})",
            id,
            options.high_accuracy
        );
        Ok(Subscription { id, samples: rx })
    }

    fn unsubscribe(&self, id: u64) {
        let mut inner = self.lock();
        if inner.active.as_ref().is_some_and(|(active, _)| *active == id) {
            inner.active = None;
        }
    }
}
