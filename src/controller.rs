//! Poll scheduling and publishing.
//!
//! All state changes happen on the task running [`BridgeController::run`].
//! Broker callbacks only raise [`BridgeSignal`]s; a signal raised while a
//! poll is in flight stays pending and only moves the schedule once that
//! poll has finished. Polls start on ticks only.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, Topics};
use crate::error::{FetchError, PollError, TemplateError};
use crate::fetch::DeviceFetcher;
use crate::session::SessionManager;
use crate::signal::Signals;
use crate::template::{discover_templates, render};
use crate::transform;
use crate::types::{Availability, BridgeSignal, Metadata, NormalizedRecord};

/// When the next poll is due.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    next_due: Instant,
}

impl PollSchedule {
    pub fn immediately() -> Self {
        PollSchedule { next_due: Instant::now() }
    }

    pub fn is_due(&self) -> bool {
        Instant::now() >= self.next_due
    }

    #[cfg(test)]
    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    fn request_immediate(&mut self) {
        self.next_due = Instant::now();
    }

    fn advance(&mut self, interval: Duration) {
        self.next_due = Instant::now() + interval;
    }
}

pub struct BridgeController {
    sessions: SessionManager,
    fetcher: DeviceFetcher,
    broker: Arc<dyn Broker>,
    topics: Topics,
    template_dir: PathBuf,
    poll_interval: Duration,
    schedule: PollSchedule,
    known_serial: Option<String>,
}

impl BridgeController {
    pub fn new(
        sessions: SessionManager,
        fetcher: DeviceFetcher,
        broker: Arc<dyn Broker>,
        topics: Topics,
        template_dir: PathBuf,
        poll_interval: Duration,
    ) -> Self {
        BridgeController {
            sessions,
            fetcher,
            broker,
            topics,
            template_dir,
            poll_interval,
            schedule: PollSchedule::immediately(),
            known_serial: None,
        }
    }

    #[cfg(test)]
    pub fn schedule(&self) -> PollSchedule {
        self.schedule
    }

    #[cfg(test)]
    pub fn known_serial(&self) -> Option<&str> {
        self.known_serial.as_deref()
    }

    pub fn request_immediate_poll(&mut self) {
        self.schedule.request_immediate();
    }

    pub async fn run(mut self, signals: Arc<Signals>, tick: Duration) {
        let mut ticker = time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let ticked = tokio::select! {
                _ = ticker.tick() => true,
                _ = signals.notified() => false,
            };
            for signal in signals.take() {
                self.handle_signal(signal).await;
            }
            if ticked {
                self.poll_if_due().await;
            }
        }
    }

    pub async fn handle_signal(&mut self, signal: BridgeSignal) {
        match signal {
            BridgeSignal::Connected => {
                let filter = self.topics.poll_filter();
                if let Err(e) = self.broker.subscribe(&filter).await {
                    error!(filter = %filter, error = %e, "Failed to subscribe to poll commands");
                }
                self.publish_bridge_online().await;
            }
            BridgeSignal::PollNow => info!("Poll requested"),
            BridgeSignal::ForceReauth => {
                warn!("Re-authentication requested");
                self.sessions.invalidate();
            }
        }
        self.request_immediate_poll();
    }

    /// Runs one poll cycle if the schedule says so. Returns whether it polled.
    pub async fn poll_if_due(&mut self) -> bool {
        if !self.schedule.is_due() {
            return false;
        }
        self.poll().await;
        true
    }

    /// One full cycle. A failure before anything is published leaves the
    /// schedule due, so the next tick retries.
    pub async fn poll(&mut self) {
        info!("Polling device state");
        match self.acquire().await {
            Ok((record, metadata)) => {
                self.publish_snapshot(&record, &metadata).await;
                self.schedule.advance(self.poll_interval);
                info!(next_in_secs = self.poll_interval.as_secs(), "Poll complete");
            }
            Err(e) => {
                warn!(error = %e, "Poll failed");
                self.mark_offline().await;
            }
        }
    }

    async fn acquire(&mut self) -> Result<(NormalizedRecord, Metadata), PollError> {
        let session = self.sessions.ensure_valid().await?;

        let raw = match self.fetcher.fetch_snapshot(&session).await {
            Ok(raw) => raw,
            Err(e @ FetchError::NotAuthorized(_)) => {
                self.sessions.invalidate();
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let (record, metadata) = transform::transform(&raw).map_err(|e| {
            debug!(body = %String::from_utf8_lossy(&raw), "Unusable device snapshot");
            e
        })?;
        self.known_serial = Some(metadata["SERIAL"].clone());
        Ok((record, metadata))
    }

    async fn publish_snapshot(&self, record: &NormalizedRecord, metadata: &Metadata) {
        let serial = &metadata["SERIAL"];
        self.publish_autoconfig(serial, metadata).await;
        self.publish_bridge_online().await;
        self.publish_logged(&self.topics.availability(serial), Availability::Online.as_str(), false)
            .await;
        let payload = record.to_json();
        debug!(%payload, "Device state");
        self.publish_logged(&self.topics.device(serial), &payload, true).await;
    }

    async fn publish_autoconfig(&self, serial: &str, metadata: &Metadata) {
        let files = match discover_templates(&self.template_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(dir = %self.template_dir.display(), error = %e, "Cannot list autoconfig templates");
                return;
            }
        };

        for file in files {
            let published = async {
                let template = file.load()?;
                let topic = self.topics.autoconfig(template.kind, serial, &template.name);
                let body = render(&template.body, metadata);
                self.broker
                    .publish(&topic, &body, true)
                    .await
                    .map_err(|source| TemplateError::Publish { topic, source })
            };
            if let Err(e) = published.await {
                warn!(template = %file.path.display(), error = %e, "Skipping autoconfig entry");
            }
        }
    }

    async fn publish_bridge_online(&self) {
        self.publish_logged(&self.topics.bridge_state(), Availability::Online.as_str(), true)
            .await;
    }

    async fn mark_offline(&self) {
        if let Some(serial) = &self.known_serial {
            self.publish_logged(&self.topics.availability(serial), Availability::Offline.as_str(), false)
                .await;
        }
    }

    async fn publish_logged(&self, topic: &str, payload: &str, retain: bool) {
        if let Err(e) = self.broker.publish(topic, payload, retain).await {
            error!(topic, error = %e, "Publish failed");
        }
    }
}
