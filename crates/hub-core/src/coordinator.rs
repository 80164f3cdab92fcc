//! Facet coordinator set.
//!
//! One timer task per facet, each with its own interval and failure
//! handling. A failing facet keeps its stale data and an error annotation
//! and is retried on its own next tick; there is no shared backoff. Every
//! job runs once immediately on startup. Only the current-conditions job
//! follows a successful fetch with decode + notify.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::client::WeatherClient;
use crate::config::ScheduleConfig;
use crate::store::Facet;

/// Per-job health record for diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobHealth {
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Shared per-facet health map, readable by status frontends.
#[derive(Clone, Default)]
pub struct HealthBoard {
    jobs: Arc<RwLock<BTreeMap<String, JobHealth>>>,
}

impl HealthBoard {
    fn mark_attempt(&self, facet: Facet) {
        let mut jobs = self.jobs.write().expect("health lock");
        let job = jobs.entry(facet.key().to_string()).or_default();
        job.last_attempt = Some(Utc::now());
    }

    fn mark_success(&self, facet: Facet) {
        let mut jobs = self.jobs.write().expect("health lock");
        let job = jobs.entry(facet.key().to_string()).or_default();
        job.last_success = Some(Utc::now());
        job.consecutive_failures = 0;
        job.last_error = None;
    }

    fn mark_failure(&self, facet: Facet, error: String) {
        let mut jobs = self.jobs.write().expect("health lock");
        let job = jobs.entry(facet.key().to_string()).or_default();
        job.consecutive_failures += 1;
        job.last_error = Some(error);
    }

    pub fn snapshot(&self) -> BTreeMap<String, JobHealth> {
        self.jobs.read().expect("health lock").clone()
    }
}

/// The spawned coordinator jobs for one client.
pub struct CoordinatorSet {
    health: HealthBoard,
    handles: Vec<JoinHandle<()>>,
    shutdown: broadcast::Sender<()>,
}

impl CoordinatorSet {
    /// Spawn one job per facet. The summary job owns both `current` and
    /// `indices` (they share a page), so no separate indices job exists.
    pub fn spawn(client: Arc<WeatherClient>, schedule: &ScheduleConfig) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        let health = HealthBoard::default();

        let jobs = [
            (Facet::Current, schedule.current_secs),
            (Facet::Alarms, schedule.alarms_secs),
            (Facet::Daily, schedule.daily_secs),
            (Facet::Hourly, schedule.hourly_secs),
            (Facet::Minutely, schedule.minutely_secs),
            (Facet::ObservationHistory, schedule.observation_secs),
        ];

        let handles = jobs
            .iter()
            .map(|&(facet, secs)| {
                tokio::spawn(run_job(
                    client.clone(),
                    facet,
                    Duration::from_secs(secs.max(1)),
                    health.clone(),
                    shutdown.subscribe(),
                ))
            })
            .collect();

        Self {
            health,
            handles,
            shutdown,
        }
    }

    pub fn health(&self) -> HealthBoard {
        self.health.clone()
    }

    /// Stop all jobs. In-flight requests are abandoned, not drained.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    pub async fn join(self) {
        let _ = futures::future::join_all(self.handles).await;
    }
}

async fn run_job(
    client: Arc<WeatherClient>,
    facet: Facet,
    every: Duration,
    health: HealthBoard,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(facet = %facet, interval_secs = every.as_secs(), "Facet job started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!(facet = %facet, "Facet job stopped");
                break;
            }
            _ = ticker.tick() => {}
        }

        health.mark_attempt(facet);
        match client.refresh(facet).await {
            Ok(()) => {
                health.mark_success(facet);
                if facet == Facet::Current {
                    let payload = client.decode_and_notify();
                    debug!(attrs = payload.len(), "Decode pass complete");
                }
            }
            Err(e) => {
                // Contained: this facet keeps stale data and retries on its
                // own next tick.
                error!(facet = %facet, error = %e, "Facet refresh failed");
                health.mark_failure(facet, e.to_string());
            }
        }
    }
}
