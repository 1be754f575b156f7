#![allow(dead_code)]

use async_trait::async_trait;
use pacekeeper::{
    ManualClock, Outbox, Scheduler, SchedulerConfig, TrackingSleeper, Transport, TransportError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Transport that records every delivered payload and can be told to fail upcoming sends.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    failures: Mutex<VecDeque<TransportError>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, err: TransportError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, text)| text).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, target: &str, payload: &str) -> Result<(), TransportError> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.sent.lock().unwrap().push((target.to_string(), payload.to_string()));
        Ok(())
    }
}

pub fn config(max_requests: u32, window_ms: u64, delay_ms: u64) -> SchedulerConfig {
    SchedulerConfig::new(
        max_requests,
        Duration::from_millis(window_ms),
        Duration::from_millis(delay_ms),
        Duration::from_millis(delay_ms),
    )
    .unwrap()
}

/// Scheduler on virtual time: every sleep advances the returned clock.
pub fn virtual_scheduler(config: SchedulerConfig) -> (Scheduler, ManualClock, TrackingSleeper) {
    let clock = ManualClock::new();
    let sleeper = TrackingSleeper::advancing(clock.clone());
    let scheduler = Scheduler::builder(config).clock(clock.clone()).sleeper(sleeper.clone()).build();
    (scheduler, clock, sleeper)
}

pub fn virtual_outbox(transport: Arc<RecordingTransport>) -> Outbox {
    let (scheduler, _, _) = virtual_scheduler(config(100, 60_000, 10));
    Outbox::new(scheduler, transport)
}
