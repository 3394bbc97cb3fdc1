//! Scheduler - bounded worker pool over a shared device queue
//!
//! Each worker moves one record out of the queue, owns it while it connects,
//! collects facts, plans and (when committing) executes, then hands it to the
//! result set. The pool scope is the join: it returns once the queue is empty
//! and every in-flight device has finished.

use crate::context::{ProgressCallback, RunContext};
use crate::error::{RunError, SessionError};
use crate::executor::{ExecuteOptions, execute_plan};
use crate::facts::collect_facts;
use crate::plan::build_plan;
use crate::record::DeviceRecord;
use crate::retry::{AttemptContext, RetryCallback, with_retry};
use crate::session::{Connector, Session};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Process every device and return the records in inventory order
pub fn run_fleet<C: Connector>(
    connector: &C,
    devices: Vec<DeviceRecord>,
    ctx: &RunContext,
    progress: &dyn ProgressCallback,
) -> Result<Vec<DeviceRecord>, RunError> {
    ctx.policy.validate()?;
    ctx.timeouts.validate()?;

    let total = devices.len();
    let workers = ctx.options.workers.clamp(1, total.max(1));
    log::info!(
        "reconciling {} device(s) with {} worker(s), policy {}, {}",
        total,
        workers,
        ctx.policy.revision,
        if ctx.options.commit { "commit" } else { "dry run" }
    );
    progress.on_run_start(total, workers);

    let queue: Mutex<VecDeque<(usize, DeviceRecord)>> =
        Mutex::new(devices.into_iter().enumerate().collect());
    let results: Mutex<Vec<(usize, DeviceRecord)>> = Mutex::new(Vec::with_capacity(total));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("firmsync-worker-{i}"))
        .build()?;

    pool.scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|_| {
                while let Some((index, mut record)) = next_device(&queue) {
                    process_device(connector, &mut record, ctx, progress);
                    progress.on_device_complete(&record);
                    push_result(&results, index, record);
                }
            });
        }
    });

    let mut finished = results.into_inner().unwrap_or_else(PoisonError::into_inner);
    finished.sort_by_key(|(index, _)| *index);
    Ok(finished.into_iter().map(|(_, record)| record).collect())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn next_device(queue: &Mutex<VecDeque<(usize, DeviceRecord)>>) -> Option<(usize, DeviceRecord)> {
    lock(queue).pop_front()
}

fn push_result(results: &Mutex<Vec<(usize, DeviceRecord)>>, index: usize, record: DeviceRecord) {
    lock(results).push((index, record));
}

/// Run one device from connect to disconnect
///
/// Only connection exhaustion ends a device early; everything else is
/// recorded on the record.
pub fn process_device<C: Connector>(
    connector: &C,
    record: &mut DeviceRecord,
    ctx: &RunContext,
    progress: &dyn ProgressCallback,
) {
    let started = Instant::now();
    progress.on_device_start(&record.hostname, &record.address);

    let notifier = RetryNotifier {
        hostname: &record.hostname,
        progress,
    };
    let connected = with_retry(&ctx.retry, Some(&notifier), |attempt| {
        log::debug!(
            "{}: connecting to {} (attempt {}/{})",
            record.hostname,
            record.address,
            attempt.attempt,
            attempt.max_attempts
        );
        connector.connect(&record.hostname, &record.address, ctx.timeouts.connect)
    });

    let mut session = match connected {
        Ok(session) => session,
        Err(e) => {
            log::warn!("{} ({}): {}", record.hostname, record.address, e);
            record.mark_unreachable(e.to_string());
            record.elapsed = Some(started.elapsed());
            return;
        }
    };
    record.mark_connected();

    collect_facts(&mut session, record, &ctx.policy, &ctx.timeouts);
    let plan = build_plan(&record.facts, &ctx.policy);
    log::info!("{}: plan: {}", record.hostname, plan.describe());

    if ctx.options.commit {
        let options = ExecuteOptions {
            force_copy: ctx.options.force_copy,
        };
        execute_plan(
            &mut session,
            record,
            &plan,
            &ctx.policy,
            &ctx.timeouts,
            options,
        );
    }
    record.plan = Some(plan);

    if let Err(e) = session.disconnect() {
        log::debug!("{}: disconnect failed: {}", record.hostname, e);
    }
    record.elapsed = Some(started.elapsed());
}

/// Forwards connect retries to the progress callback
struct RetryNotifier<'a> {
    hostname: &'a str,
    progress: &'a dyn ProgressCallback,
}

impl RetryCallback for RetryNotifier<'_> {
    fn on_retry(&self, attempt: AttemptContext, error: &SessionError, delay: Duration) {
        log::info!(
            "{}: attempt {}/{} failed: {}, retrying in {}s",
            self.hostname,
            attempt.attempt,
            attempt.max_attempts,
            error,
            delay.as_secs()
        );
        self.progress.on_retry(self.hostname, attempt, error, delay);
    }
}
