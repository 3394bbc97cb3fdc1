//! [`Session`] over an interactive ssh channel.

use crate::channel::{Channel, ReadOutcome};
use reconcile::{Expect, Result, Session, SessionError};
use regex::Regex;
use std::time::Duration;

/// Configuration mode prompt right after `configure terminal`
const CONFIG_PROMPT: &str = r"\(config\)#\s*$";
/// Any configuration sub-mode prompt
const CONFIG_ANY_PROMPT: &str = r"\(config[^)]*\)#\s*$";

/// Sent after a timeout to abort whatever the device is still doing
const INTERRUPT: &str = "\u{3}";
/// How long a timed-out device gets to show its prompt again
const RESYNC_WINDOW: Duration = Duration::from_secs(30);
/// Quiet period that ends draining once the prompt is back
const RESYNC_SETTLE: Duration = Duration::from_millis(300);

/// Interactive session to one device
pub struct SshSession {
    hostname: String,
    channel: Channel,
    prompt: Regex,
    resync_window: Duration,
}

impl SshSession {
    pub(crate) fn new(hostname: &str, channel: Channel, prompt: Regex) -> Self {
        Self {
            hostname: hostname.to_string(),
            channel,
            prompt,
            resync_window: RESYNC_WINDOW,
        }
    }

    /// Write a line and wait for `pattern`
    pub(crate) fn exchange(
        &mut self,
        command: &str,
        pattern: &Regex,
        timeout: Duration,
    ) -> Result<String> {
        self.channel.write_line(command)?;

        match self.channel.read_until(pattern, timeout) {
            ReadOutcome::Matched(output) => Ok(output),
            ReadOutcome::TimedOut(output) => {
                let timeout_error = SessionError::Timeout {
                    command: command.to_string(),
                    expected: pattern.as_str().to_string(),
                    waited: timeout,
                    output,
                };
                self.resync()?;
                Err(timeout_error)
            }
            ReadOutcome::Closed(output) => Err(SessionError::Closed { output }),
        }
    }

    /// Bring the device back to its prompt after a timed-out exchange
    ///
    /// A late reply would otherwise be read as the answer to the next
    /// command. Drains until the prompt shows and output goes quiet. A device
    /// that never shows its prompt again is treated as closed.
    fn resync(&mut self) -> Result<()> {
        log::debug!("{}: resyncing after timeout", self.hostname);
        self.channel.write_line(INTERRUPT)?;

        let mut drained = match self.channel.read_until(&self.prompt, self.resync_window) {
            ReadOutcome::Matched(text) => text,
            ReadOutcome::TimedOut(output) | ReadOutcome::Closed(output) => {
                log::warn!(
                    "{}: no prompt within {}s after timeout",
                    self.hostname,
                    self.resync_window.as_secs()
                );
                return Err(SessionError::Closed { output });
            }
        };

        loop {
            match self.channel.read_until(&self.prompt, RESYNC_SETTLE) {
                ReadOutcome::Matched(text) => drained.push_str(&text),
                ReadOutcome::TimedOut(rest) => {
                    drained.push_str(&rest);
                    break;
                }
                ReadOutcome::Closed(output) => return Err(SessionError::Closed { output }),
            }
        }

        log::trace!("{}: discarded {:?}", self.hostname, drained);
        Ok(())
    }
}

/// Compile an expect pattern, multi-line so `$` anchors at line ends
fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?m){pattern}")).map_err(|e| SessionError::Protocol {
        message: format!("invalid expect pattern '{pattern}': {e}"),
    })
}

impl Session for SshSession {
    fn send(&mut self, command: &str, expect: Expect<'_>, timeout: Duration) -> Result<String> {
        log::trace!("{} > {:?} (expect {})", self.hostname, command, expect);
        match expect {
            Expect::Prompt => {
                let prompt = self.prompt.clone();
                self.exchange(command, &prompt, timeout)
            }
            Expect::Pattern(pattern) => {
                let pattern = compile(pattern)?;
                self.exchange(command, &pattern, timeout)
            }
        }
    }

    fn send_config_lines(&mut self, lines: &[String], timeout: Duration) -> Result<String> {
        let enter = compile(CONFIG_PROMPT)?;
        let within = compile(CONFIG_ANY_PROMPT)?;

        let mut output = self.exchange("configure terminal", &enter, timeout)?;
        for line in lines {
            output.push_str(&self.exchange(line, &within, timeout)?);
        }
        let prompt = self.prompt.clone();
        output.push_str(&self.exchange("end", &prompt, timeout)?);
        Ok(output)
    }

    fn persist(&mut self, timeout: Duration) -> Result<String> {
        let prompt = self.prompt.clone();
        self.exchange("write memory", &prompt, timeout)
    }

    fn disconnect(&mut self) -> Result<()> {
        // The device may already have hung up
        let _ = self.channel.write_line("exit");
        self.channel.shutdown(Duration::from_secs(2));
        log::debug!("{}: disconnected", self.hostname);
        Ok(())
    }
}
