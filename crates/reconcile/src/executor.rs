//! Transaction executor - applies a plan over a live session
//!
//! Steps run in a fixed order and each one is skipped when its plan field or
//! precondition is not met. A failed step is recorded on the device and the
//! next independent step still runs. Nothing here is retried.

use crate::error::{Result, SessionError};
use crate::parse;
use crate::plan::ReconcilePlan;
use crate::policy::FirmwarePolicy;
use crate::record::{CheckStatus, DeviceRecord, ExecutionOutcome, IssueKind};
use crate::session::{Expect, Session, Timeouts};
use crate::summary::format_elapsed;
use std::fmt;
use std::time::{Duration, Instant};

/// Reply to `delete flash:<file>`
const DELETE_FILENAME_PROMPT: &str = r"Delete filename";
/// Yes/no confirmation shared by delete and squeeze
const CONFIRM_PROMPT: &str = r"confirm";
/// Reply to `copy <url> flash:`
const DESTINATION_PROMPT: &str = r"Destination filename";
const SQUEEZE_COMPLETE: &str = "Squeeze of flash complete";
const DEVICE_ERROR: &str = "%Error";
const FREE_SPACE_COMMAND: &str = "dir flash: | include free";

/// Marker in the captured output of a save that raised but did succeed
pub const PERSIST_BENIGN_MARKER: &str = "[OK]";

/// Executor steps in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    DeleteObsolete,
    DeleteStray,
    Squeeze,
    Copy,
    Verify,
    ReconfigureBoot,
    Persist,
}

impl Step {
    pub const ORDER: [Step; 7] = [
        Step::DeleteObsolete,
        Step::DeleteStray,
        Step::Squeeze,
        Step::Copy,
        Step::Verify,
        Step::ReconfigureBoot,
        Step::Persist,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Step::DeleteObsolete => "delete-legacy",
            Step::DeleteStray => "delete-stray",
            Step::Squeeze => "squeeze",
            Step::Copy => "copy",
            Step::Verify => "verify",
            Step::ReconfigureBoot => "reconfigure-boot",
            Step::Persist => "persist",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a configuration save ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Saved,
    /// The session raised, but the captured output shows the save completed
    SavedBenign,
    Failed(String),
}

impl PersistOutcome {
    pub fn is_saved(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Interpret the result of [`Session::persist`]
///
/// This device family may report a completed save as an error. An error whose
/// output carries [`PERSIST_BENIGN_MARKER`] counts as saved; every other error
/// is a failure.
pub fn interpret_persist(result: &Result<String>) -> PersistOutcome {
    match result {
        Ok(_) => PersistOutcome::Saved,
        Err(e) if e.output().is_some_and(|o| o.contains(PERSIST_BENIGN_MARKER)) => {
            PersistOutcome::SavedBenign
        }
        Err(e) => PersistOutcome::Failed(e.to_string()),
    }
}

/// Executor switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Transfer even when SFP vendors are not approved
    pub force_copy: bool,
}

/// Apply `plan` to the device behind `session`
///
/// Fills `record.outcome`, appends every exchange to the transcript and
/// records every failure on the record.
pub fn execute_plan<S: Session + ?Sized>(
    session: &mut S,
    record: &mut DeviceRecord,
    plan: &ReconcilePlan,
    policy: &FirmwarePolicy,
    timeouts: &Timeouts,
    options: ExecuteOptions,
) {
    let mut tx = Transaction {
        session,
        record,
        timeouts,
        started: Instant::now(),
        lost: false,
        expired: false,
    };
    let mut outcome = ExecutionOutcome::default();

    for (step, files) in [
        (Step::DeleteObsolete, &plan.obsolete_images),
        (Step::DeleteStray, &plan.stray_files),
    ] {
        for file in files {
            if tx.halted() {
                break;
            }
            if tx.delete(step, file) {
                outcome.deleted.push(file.clone());
            }
        }
    }

    if !outcome.deleted.is_empty() && !tx.halted() {
        let started = Instant::now();
        outcome.squeeze = tx.squeeze();
        let took = started.elapsed();
        log::info!(
            "{}: squeeze {:?}, duration {}",
            tx.record.hostname,
            outcome.squeeze,
            format_elapsed(took.as_secs())
        );
        outcome.squeeze_duration = Some(took);
    }

    let mut transfer_started = None;
    if let Some(image) = &plan.fetch
        && !tx.halted()
    {
        outcome.free_bytes_at_copy = tx.free_bytes();
        if tx.copy_allowed(outcome.free_bytes_at_copy, policy, options) {
            transfer_started = Some(Instant::now());
            tx.copy(image, policy);
            outcome.transferred = true;
        }
    }

    if outcome.transferred
        && let Some(image) = &plan.fetch
        && !tx.halted()
    {
        outcome.checksum = tx.verify(image, plan.expected_checksum.as_deref());
    }
    outcome.transfer_duration = transfer_started.map(|t| t.elapsed());

    if outcome.checksum.is_passed()
        && let Some(target) = &plan.target_boot
        && !tx.halted()
    {
        outcome.boot_reconfigured = tx.reconfigure_boot(target);
    }

    if outcome.boot_reconfigured && !tx.halted() {
        outcome.persisted = tx.persist();
    }

    log::info!(
        "{}: deleted {}, transferred {}, checksum {:?}, boot {}, saved {}",
        tx.record.hostname,
        outcome.deleted.len(),
        outcome.transferred,
        outcome.checksum,
        outcome.boot_reconfigured,
        outcome.persisted
    );
    tx.record.outcome = outcome;
}

/// One device's run of the state machine
struct Transaction<'a, S: Session + ?Sized> {
    session: &'a mut S,
    record: &'a mut DeviceRecord,
    timeouts: &'a Timeouts,
    started: Instant,
    /// Session closed; every later step is skipped
    lost: bool,
    /// Transaction budget used up; every later step is skipped
    expired: bool,
}

impl<S: Session + ?Sized> Transaction<'_, S> {
    /// Whether the remaining steps must be skipped
    ///
    /// Checked between steps; a step already running is never cut short.
    fn halted(&mut self) -> bool {
        if self.lost || self.expired {
            return true;
        }
        if self.started.elapsed() >= self.timeouts.transaction {
            self.expired = true;
            self.record.add_issue(
                IssueKind::Transaction,
                format!(
                    "transaction budget of {} used up, remaining steps skipped",
                    format_elapsed(self.timeouts.transaction.as_secs())
                ),
            );
            return true;
        }
        false
    }

    /// Send one command and append the exchange to the transcript
    fn exchange(&mut self, command: &str, expect: Expect<'_>, timeout: Duration) -> Result<String> {
        log::debug!("{} > {:?}", self.record.hostname, command);
        let result = self.session.send(command, expect, timeout);
        self.log(command, &result);
        result
    }

    fn log(&mut self, command: &str, result: &Result<String>) {
        let response = match result {
            Ok(output) => output.clone(),
            Err(e) => e.output().map_or_else(|| e.to_string(), str::to_string),
        };
        self.record.log_exchange(command, response);

        if let Err(e) = result
            && e.is_closed()
            && !self.lost
        {
            self.lost = true;
            self.record
                .add_issue(IssueKind::Session, format!("session lost: {e}"));
        }
    }

    /// Record a failed step unless the session is gone
    fn fail(&mut self, step: Step, message: impl fmt::Display) {
        if !self.lost {
            self.record
                .add_issue(IssueKind::Transaction, format!("{step}: {message}"));
        }
    }

    /// Three-step delete exchange; returns whether the file was deleted
    fn delete(&mut self, step: Step, file: &str) -> bool {
        let interactive = self.timeouts.interactive;
        let legs = [
            (format!("delete flash:{file}"), Expect::Pattern(DELETE_FILENAME_PROMPT)),
            (String::new(), Expect::Pattern(CONFIRM_PROMPT)),
            (String::new(), Expect::Prompt),
        ];

        for (command, expect) in legs {
            match self.exchange(&command, expect, interactive) {
                Ok(output) if output.contains(DEVICE_ERROR) => {
                    self.fail(step, format!("{file}: {}", output.trim()));
                    return false;
                }
                Ok(_) => {}
                Err(e) => {
                    self.fail(step, format!("{file}: {e}"));
                    return false;
                }
            }
        }

        log::info!("{}: deleted {}", self.record.hostname, file);
        true
    }

    fn squeeze(&mut self) -> CheckStatus {
        let command = "squeeze flash:";
        if let Err(e) = self.exchange(command, Expect::Pattern(CONFIRM_PROMPT), self.timeouts.interactive)
        {
            self.fail(Step::Squeeze, e);
            return CheckStatus::Failed;
        }

        match self.exchange("", Expect::Prompt, self.timeouts.squeeze) {
            Ok(output) if output.contains(SQUEEZE_COMPLETE) => CheckStatus::Passed,
            Ok(_) => {
                self.fail(Step::Squeeze, "completion message not seen");
                CheckStatus::Failed
            }
            Err(e) => {
                self.fail(Step::Squeeze, e);
                CheckStatus::Failed
            }
        }
    }

    fn free_bytes(&mut self) -> Option<u64> {
        match self.exchange(FREE_SPACE_COMMAND, Expect::Prompt, self.timeouts.inspect) {
            Ok(output) => parse::free_bytes(&output),
            Err(e) => {
                self.fail(Step::Copy, format!("free space check failed: {e}"));
                None
            }
        }
    }

    fn copy_allowed(
        &mut self,
        free_bytes: Option<u64>,
        policy: &FirmwarePolicy,
        options: ExecuteOptions,
    ) -> bool {
        if self.lost {
            return false;
        }

        let mut allowed = true;
        match free_bytes {
            Some(free) if free > policy.min_free_bytes => {}
            Some(free) => {
                self.record.add_issue(
                    IssueKind::Precondition,
                    format!(
                        "copy skipped: insufficient space ({free} bytes free, {} required)",
                        policy.min_free_bytes
                    ),
                );
                allowed = false;
            }
            None => {
                self.record.add_issue(
                    IssueKind::Precondition,
                    "copy skipped: free space unknown",
                );
                allowed = false;
            }
        }

        if !self.record.facts.vendors_approved() {
            if options.force_copy {
                log::warn!(
                    "{}: SFP vendors not approved, copying anyway",
                    self.record.hostname
                );
            } else {
                let vendors: Vec<&str> = self
                    .record
                    .facts
                    .sfp_vendors
                    .iter()
                    .map(|o| o.vendor.as_str())
                    .collect();
                let message = format!("copy skipped: SFP vendor mismatch {vendors:?}");
                self.record.add_issue(IssueKind::Precondition, message);
                allowed = false;
            }
        }

        allowed
    }

    fn copy(&mut self, image: &str, policy: &FirmwarePolicy) {
        let command = format!("copy {} flash:", policy.transfer_url(image));
        if let Err(e) = self.exchange(
            &command,
            Expect::Pattern(DESTINATION_PROMPT),
            self.timeouts.interactive,
        ) {
            self.fail(Step::Copy, e);
            return;
        }

        match self.exchange("", Expect::Prompt, self.timeouts.transfer) {
            Ok(output) if output.contains(DEVICE_ERROR) => {
                let line = output
                    .lines()
                    .find(|l| l.contains(DEVICE_ERROR))
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                self.fail(Step::Copy, line);
            }
            Ok(_) => log::info!("{}: transferred {}", self.record.hostname, image),
            Err(e) => self.fail(Step::Copy, e),
        }
    }

    fn verify(&mut self, image: &str, expected: Option<&str>) -> CheckStatus {
        let command = format!("verify /md5 flash:{image}");
        let result = self.exchange(&command, Expect::Prompt, self.timeouts.verify);

        let Some(expected) = expected else {
            self.fail(Step::Verify, format!("no expected checksum for {image}"));
            return CheckStatus::Failed;
        };

        match result {
            Ok(output) if parse::contains_checksum(&output, expected) => CheckStatus::Passed,
            Ok(_) => {
                self.fail(Step::Verify, format!("{image}: checksum mismatch, expected {expected}"));
                CheckStatus::Failed
            }
            Err(e) => {
                self.fail(Step::Verify, e);
                CheckStatus::Failed
            }
        }
    }

    fn reconfigure_boot(&mut self, target: &str) -> bool {
        let lines = vec![
            "no boot system".to_string(),
            format!("boot system flash {target}"),
        ];
        let result = self.session.send_config_lines(&lines, self.timeouts.config);
        self.log(&lines.join("\n"), &result);

        match result {
            Ok(output) if output.contains("% Invalid") || output.contains(DEVICE_ERROR) => {
                self.fail(Step::ReconfigureBoot, output.trim());
                false
            }
            Ok(_) => true,
            Err(e) => {
                self.fail(Step::ReconfigureBoot, e);
                false
            }
        }
    }

    fn persist(&mut self) -> bool {
        let result = self.session.persist(self.timeouts.persist);
        let outcome = interpret_persist(&result);

        // A benign raise is logged but must not mark the session lost
        let response = match &result {
            Ok(output) => output.clone(),
            Err(e) => e.output().map_or_else(|| e.to_string(), str::to_string),
        };
        self.record.log_exchange("write memory", response);

        match outcome {
            PersistOutcome::Saved => true,
            PersistOutcome::SavedBenign => {
                log::debug!("{}: save raised with a benign marker", self.record.hostname);
                true
            }
            PersistOutcome::Failed(message) => {
                if matches!(result, Err(SessionError::Closed { .. })) {
                    self.lost = true;
                    self.record
                        .add_issue(IssueKind::Session, format!("session lost: {message}"));
                } else {
                    self.fail(Step::Persist, message);
                }
                false
            }
        }
    }
}
