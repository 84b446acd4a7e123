//! Live traffic: segment weight updates and a background refresher.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::engine::RouteEngine;
use crate::error::{Result, RouteError};
use crate::models::RoadId;
use crate::utils::road_network::RoadSegment;

/// New conditions on one road. Fields left out keep their current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficUpdate {
    pub road_id: RoadId,
    /// Observed speed, replaces the current speed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_kph: Option<f64>,
    /// Congestion multiplier on travel time, 1.0 = free flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed: Option<bool>,
}

impl TrafficUpdate {
    pub fn congestion(road_id: RoadId, factor: f64) -> Self {
        Self {
            road_id,
            speed_kph: None,
            factor: Some(factor),
            closed: None,
        }
    }

    pub fn closure(road_id: RoadId) -> Self {
        Self {
            road_id,
            speed_kph: None,
            factor: None,
            closed: Some(true),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| RouteError::InvalidTraffic {
            road_id: self.road_id,
            reason,
        };
        if let Some(speed) = self.speed_kph {
            if !(speed.is_finite() && speed > 0.0) {
                return Err(invalid(format!("speed must be positive, got {}", speed)));
            }
        }
        if let Some(factor) = self.factor {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(invalid(format!("factor must be positive, got {}", factor)));
            }
        }
        Ok(())
    }

    pub(crate) fn apply_to(&self, segment: &mut RoadSegment) {
        if let Some(speed) = self.speed_kph {
            segment.speed_kph = speed;
        }
        if let Some(factor) = self.factor {
            segment.traffic_factor = factor;
        }
        if let Some(closed) = self.closed {
            segment.closed = closed;
        }
    }
}

/// Outcome of applying one batch of updates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficReport {
    /// Updates naming a known road
    pub applied: usize,
    /// Road segments whose conditions actually changed
    #[serde(default)]
    pub changed: usize,
    /// Roads named by the batch that the network does not know
    pub unknown_roads: Vec<RoadId>,
    /// Traffic version after the batch
    pub version: u64,
}

/// Reads a JSON array of updates
pub fn load_updates<P: AsRef<Path>>(path: P) -> Result<Vec<TrafficUpdate>> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Source of traffic updates
pub trait TrafficFeed: Send {
    fn fetch(&mut self) -> Result<Vec<TrafficUpdate>>;

    fn name(&self) -> String {
        "traffic feed".to_string()
    }
}

/// Feed re-reading a JSON file on every poll
pub struct FileTrafficFeed {
    path: PathBuf,
}

impl FileTrafficFeed {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl TrafficFeed for FileTrafficFeed {
    fn fetch(&mut self) -> Result<Vec<TrafficUpdate>> {
        load_updates(&self.path)
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Polls a feed on a background thread and applies the updates to an engine.
/// At most one report waits in the queue; newer ones are dropped until it is read.
pub struct TrafficRefresher {
    stop: Arc<AtomicBool>,
    wake: Sender<()>,
    reports: Receiver<TrafficReport>,
    handle: Option<JoinHandle<()>>,
}

impl TrafficRefresher {
    /// The first poll happens immediately, then once per `interval`
    pub fn spawn(engine: Arc<RouteEngine>, mut feed: Box<dyn TrafficFeed>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = mpsc::channel::<()>();
        let (report_tx, report_rx) = mpsc::sync_channel(1);
        let stop_clone = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            info!("Traffic refresher started for {}", feed.name());
            loop {
                if stop_clone.load(Relaxed) {
                    break;
                }

                match feed.fetch().and_then(|updates| engine.apply_traffic(&updates)) {
                    Ok(report) => {
                        debug!(
                            "Applied {} traffic updates ({} segments changed), version {}",
                            report.applied, report.changed, report.version
                        );
                        match report_tx.try_send(report) {
                            Ok(()) => {}
                            Err(TrySendError::Full(report)) => {
                                debug!("Report queue full, dropping report for version {}", report.version)
                            }
                            Err(TrySendError::Disconnected(_)) => break,
                        }
                    }
                    // A bad poll must not stop later ones
                    Err(e) => warn!("Traffic refresh from {} failed: {}", feed.name(), e),
                }

                match wake_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
            info!("Traffic refresher stopped");
        });

        Self {
            stop,
            wake: wake_tx,
            reports: report_rx,
            handle: Some(handle),
        }
    }

    pub fn try_recv_report(&self) -> Option<TrafficReport> {
        self.reports.try_recv().ok()
    }

    pub fn recv_report_timeout(&self, timeout: Duration) -> Option<TrafficReport> {
        self.reports.recv_timeout(timeout).ok()
    }

    /// Stops polling and waits for the thread to finish
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Relaxed);
        let _ = self.wake.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Traffic refresher thread panicked");
            }
        }
    }
}

impl Drop for TrafficRefresher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
