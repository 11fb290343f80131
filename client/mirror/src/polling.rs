//! # Polling Fallback
//!
//! Two fixed-interval loops, one for the full snapshot and one for the
//! appointment list, that only hit the backend while the socket is not open.
//! The first request of each loop fires one interval after [`Poller::start`].
use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior, interval_at},
};
use tracing::{debug, info};

use crate::{
    api::QueueApi, config::Config, context::ContextGuard, error::SyncError, shared::SharedQueue,
    transport::ConnectionState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub queue: Duration,
    pub appointments: Duration,
}

impl From<&Config> for PollIntervals {
    fn from(config: &Config) -> Self {
        Self {
            queue: config.poll_interval,
            appointments: config.appointment_poll_interval,
        }
    }
}

pub struct Poller {
    queue: Arc<SharedQueue>,
    api: Arc<dyn QueueApi>,
    connection: watch::Receiver<ConnectionState>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Clone)]
struct PollTask {
    queue: Arc<SharedQueue>,
    api: Arc<dyn QueueApi>,
    connection: watch::Receiver<ConnectionState>,
    guard: ContextGuard,
}

impl Poller {
    pub fn new(
        queue: Arc<SharedQueue>,
        api: Arc<dyn QueueApi>,
        connection: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self {
            queue,
            api,
            connection,
            tasks: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn start(&mut self, guard: ContextGuard, intervals: PollIntervals) {
        if self.is_running() {
            debug!("Polling already running for {}", guard.shop_id());
            return;
        }

        info!(
            "Polling shop {} every {:?}, appointments every {:?}",
            guard.shop_id(),
            intervals.queue,
            intervals.appointments
        );

        let task = PollTask {
            queue: self.queue.clone(),
            api: self.api.clone(),
            connection: self.connection.clone(),
            guard,
        };

        self.tasks
            .push(tokio::spawn(task.clone().poll_queue(intervals.queue)));
        self.tasks
            .push(tokio::spawn(task.poll_appointments(intervals.appointments)));
    }

    pub fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }

        debug!("Stopping polling");
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PollTask {
    fn socket_open(&self) -> bool {
        *self.connection.borrow() == ConnectionState::Open
    }

    async fn poll_queue(self, period: Duration) {
        let mut ticker = ticker(period);

        loop {
            ticker.tick().await;
            if self.socket_open() {
                continue;
            }

            debug!("Polling queue for shop {}", self.guard.shop_id());
            let result = match self.api.fetch_snapshot(self.guard.shop_id()).await {
                Ok(snapshot) => self.queue.apply_snapshot(&self.guard, snapshot).await,
                Err(err) => Err(err),
            };

            if !self.settle("Queue poll", result) {
                return;
            }
        }
    }

    async fn poll_appointments(self, period: Duration) {
        let mut ticker = ticker(period);

        loop {
            ticker.tick().await;
            if self.socket_open() {
                continue;
            }

            debug!("Polling appointments for shop {}", self.guard.shop_id());
            let result = match self.api.fetch_appointments(self.guard.shop_id()).await {
                Ok(list) => self.queue.apply_appointments(&self.guard, list).await,
                Err(err) => Err(err),
            };

            if !self.settle("Appointment poll", result) {
                return;
            }
        }
    }

    /// Returns whether the loop should keep going.
    fn settle(&self, action: &str, result: Result<(), SyncError>) -> bool {
        match result {
            Ok(()) => true,
            Err(SyncError::StaleContext) => {
                debug!("{action} stopped, shop {} is gone", self.guard.shop_id());
                false
            }
            Err(err) => {
                self.queue.notifier().report(action, &err);
                true
            }
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
