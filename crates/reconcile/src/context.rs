//! Run context and progress callbacks
//!
//! These let the engine be driven by a CLI, a test, or anything else without
//! depending on a terminal.

use crate::error::SessionError;
use crate::policy::FirmwarePolicy;
use crate::record::DeviceRecord;
use crate::retry::{AttemptContext, RetryConfig};
use crate::session::Timeouts;
use std::time::Duration;

/// Progress callback for fleet runs
///
/// Called concurrently from every worker, so implementations take `&self`
/// and must be `Sync`.
pub trait ProgressCallback: Sync {
    /// Called once before any device is dequeued
    fn on_run_start(&self, devices: usize, workers: usize);

    /// Called when a worker picks up a device
    fn on_device_start(&self, hostname: &str, address: &str);

    /// Called when a connection attempt failed and will be retried
    fn on_retry(&self, hostname: &str, attempt: AttemptContext, error: &SessionError, delay: Duration);

    /// Called when a device is fully processed
    fn on_device_complete(&self, record: &DeviceRecord);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&self, _devices: usize, _workers: usize) {}
    fn on_device_start(&self, _hostname: &str, _address: &str) {}
    fn on_retry(&self, _: &str, _: AttemptContext, _: &SessionError, _: Duration) {}
    fn on_device_complete(&self, _record: &DeviceRecord) {}
}

/// Options chosen per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Concurrent sessions
    pub workers: usize,
    /// Execute plans; without it the run only collects facts and plans
    pub commit: bool,
    /// Transfer images even when SFP vendors are not approved
    pub force_copy: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 8,
            commit: false,
            force_copy: false,
        }
    }
}

/// Everything a worker needs besides the connector and the record
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub options: RunOptions,
    pub retry: RetryConfig,
    pub timeouts: Timeouts,
    pub policy: FirmwarePolicy,
}

impl RunContext {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn with_policy(mut self, policy: FirmwarePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}
