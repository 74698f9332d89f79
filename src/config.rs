/*
 *  Copyright 2026 Pgsentinel Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Runtime configuration for the scheduling subsystem.
//!
//! [`SchedulerConfig`] carries the cadences and budgets the scheduler,
//! queue and workers run with. Defaults match production behavior; tests
//! shrink the intervals to milliseconds through the builder.

use std::cmp;
use std::time::Duration;

/// Configuration for [`SchedulerManager`](crate::manager::SchedulerManager)
/// and the loops it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    scheduler_poll_interval: Duration,
    scheduler_error_backoff: Duration,
    worker_count: usize,
    queue_pop_timeout: Duration,
    queue_poll_interval: Duration,
    retry_backoff_base: Duration,
    retry_backoff_cap: Duration,
    worker_error_pause: Duration,
    status_sample_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_poll_interval: Duration::from_secs(30),
            scheduler_error_backoff: Duration::from_secs(60),
            worker_count: 2,
            queue_pop_timeout: Duration::from_secs(10),
            queue_poll_interval: Duration::from_millis(250),
            retry_backoff_base: Duration::from_secs(60),
            retry_backoff_cap: Duration::from_secs(300),
            worker_error_pause: Duration::from_secs(5),
            status_sample_size: 10,
        }
    }
}

impl SchedulerConfig {
    /// Starts building a configuration from the defaults.
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Builds a configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable. Reads `.env` if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut builder = Self::builder();
        if let Some(secs) = env_u64("SCHEDULER_POLL_INTERVAL_SECS") {
            builder = builder.scheduler_poll_interval(Duration::from_secs(secs));
        }
        if let Some(count) = env_u64("SCHEDULER_WORKERS_COUNT") {
            builder = builder.worker_count(count as usize);
        }
        if let Some(secs) = env_u64("SCHEDULER_POP_TIMEOUT_SECS") {
            builder = builder.queue_pop_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// How long the scheduler sleeps between successful cycles.
    pub fn scheduler_poll_interval(&self) -> Duration {
        self.scheduler_poll_interval
    }

    /// How long the scheduler sleeps after a failed cycle.
    pub fn scheduler_error_backoff(&self) -> Duration {
        self.scheduler_error_backoff
    }

    /// Number of worker loops the manager spawns.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Upper bound on one blocking queue pop.
    pub fn queue_pop_timeout(&self) -> Duration {
        self.queue_pop_timeout
    }

    /// Interval between queue polls inside a blocking pop.
    pub fn queue_poll_interval(&self) -> Duration {
        self.queue_poll_interval
    }

    /// How long a worker pauses after a loop-level (non-item) error.
    pub fn worker_error_pause(&self) -> Duration {
        self.worker_error_pause
    }

    /// How many pending queue items a status report samples.
    pub fn status_sample_size(&self) -> i64 {
        self.status_sample_size
    }

    /// First-retry backoff delay.
    pub fn retry_backoff_base(&self) -> Duration {
        self.retry_backoff_base
    }

    /// Upper bound on any retry backoff delay.
    pub fn retry_backoff_cap(&self) -> Duration {
        self.retry_backoff_cap
    }

    /// Delay before re-queueing an item on its Nth retry (1-based),
    /// growing linearly with the retry count up to the cap.
    pub fn retry_backoff(&self, retry_count: u32) -> Duration {
        cmp::min(
            self.retry_backoff_base.saturating_mul(retry_count),
            self.retry_backoff_cap,
        )
    }
}

/// Builder for [`SchedulerConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    pub fn scheduler_poll_interval(mut self, interval: Duration) -> Self {
        self.config.scheduler_poll_interval = interval;
        self
    }

    pub fn scheduler_error_backoff(mut self, backoff: Duration) -> Self {
        self.config.scheduler_error_backoff = backoff;
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn queue_pop_timeout(mut self, timeout: Duration) -> Self {
        self.config.queue_pop_timeout = timeout;
        self
    }

    pub fn queue_poll_interval(mut self, interval: Duration) -> Self {
        self.config.queue_poll_interval = interval;
        self
    }

    pub fn retry_backoff_base(mut self, base: Duration) -> Self {
        self.config.retry_backoff_base = base;
        self
    }

    pub fn retry_backoff_cap(mut self, cap: Duration) -> Self {
        self.config.retry_backoff_cap = cap;
        self
    }

    pub fn worker_error_pause(mut self, pause: Duration) -> Self {
        self.config.worker_error_pause = pause;
        self
    }

    pub fn status_sample_size(mut self, size: i64) -> Self {
        self.config.status_sample_size = size;
        self
    }

    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
