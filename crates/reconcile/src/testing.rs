//! Scripted session and connector used by the unit tests

use crate::error::{Result, SessionError};
use crate::session::{Connector, Expect, Session};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned reaction to one command
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Deadline passed with this much output captured
    Timeout(String),
    /// Remote side hung up; every later command also fails
    Closed(String),
}

impl Reply {
    pub fn text(output: &str) -> Self {
        Self::Text(output.to_string())
    }

    pub fn timeout(output: &str) -> Self {
        Self::Timeout(output.to_string())
    }

    pub fn closed(output: &str) -> Self {
        Self::Closed(output.to_string())
    }
}

/// In-memory session answering from a script
///
/// Replies are keyed by command. An empty command (a bare newline) is keyed
/// by the last non-empty command followed by `\n`, so interactive confirms
/// can be scripted per command with [`ScriptedSession::confirm`]. Each key
/// holds a queue; the last reply repeats. Unscripted commands answer with
/// empty output.
#[derive(Debug, Default)]
pub struct ScriptedSession {
    replies: HashMap<String, VecDeque<Reply>>,
    last: String,
    closed: bool,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `reply`, replacing any earlier script
    pub fn on(mut self, command: &str, reply: Reply) -> Self {
        self.replies
            .insert(command.to_string(), VecDeque::from([reply]));
        self
    }

    /// Answer the bare newlines sent after `command`, in order
    pub fn confirm(mut self, command: &str, replies: &[Reply]) -> Self {
        self.replies
            .insert(format!("{command}\n"), replies.iter().cloned().collect());
        self
    }

    /// Share the sent-command log with another session
    pub fn with_log(mut self, sent: Arc<Mutex<Vec<String>>>) -> Self {
        self.sent = sent;
        self
    }

    /// Commands sent so far, bare newlines as `""`
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn answer(&mut self, command: &str, expect: Expect<'_>, timeout: Duration) -> Result<String> {
        self.sent.lock().unwrap().push(command.to_string());

        if self.closed {
            return Err(SessionError::Closed {
                output: String::new(),
            });
        }

        let key = if command.is_empty() {
            format!("{}\n", self.last)
        } else {
            self.last = command.to_string();
            command.to_string()
        };

        let reply = match self.replies.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match reply {
            None => Ok(String::new()),
            Some(Reply::Text(output)) => Ok(output),
            Some(Reply::Timeout(output)) => Err(SessionError::Timeout {
                command: command.to_string(),
                expected: expect.to_string(),
                waited: timeout,
                output,
            }),
            Some(Reply::Closed(output)) => {
                self.closed = true;
                Err(SessionError::Closed { output })
            }
        }
    }
}

impl Session for ScriptedSession {
    fn send(&mut self, command: &str, expect: Expect<'_>, timeout: Duration) -> Result<String> {
        self.answer(command, expect, timeout)
    }

    fn send_config_lines(&mut self, lines: &[String], timeout: Duration) -> Result<String> {
        let mut output = String::new();
        for line in lines {
            output.push_str(&self.answer(line, Expect::Prompt, timeout)?);
        }
        Ok(output)
    }

    fn persist(&mut self, timeout: Duration) -> Result<String> {
        self.answer("write memory", Expect::Prompt, timeout)
    }

    fn disconnect(&mut self) -> Result<()> {
        self.sent.lock().unwrap().push("exit".to_string());
        Ok(())
    }
}

/// Kinds of scripted connection failure
#[derive(Debug, Clone, Copy)]
pub enum ConnectFailure {
    Refused,
    Denied,
    TimedOut,
}

impl ConnectFailure {
    fn to_error(self) -> SessionError {
        match self {
            Self::Refused => SessionError::Connect {
                message: "Connection refused".to_string(),
            },
            Self::Denied => SessionError::Authentication {
                message: "Permission denied (password)".to_string(),
            },
            Self::TimedOut => SessionError::Unreachable {
                message: "Connection timed out".to_string(),
            },
        }
    }
}

/// Connector failing per host from a script, then building sessions
pub struct ScriptedConnector<F> {
    failures: Mutex<HashMap<String, VecDeque<ConnectFailure>>>,
    attempts: Mutex<HashMap<String, u32>>,
    factory: F,
}

impl<F> ScriptedConnector<F>
where
    F: Fn(&str) -> ScriptedSession + Sync,
{
    pub fn new(factory: F) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            factory,
        }
    }

    /// Fail the next connects to `hostname`, one failure per attempt
    pub fn failing(self, hostname: &str, failures: &[ConnectFailure]) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(hostname.to_string(), failures.iter().copied().collect());
        self
    }

    pub fn attempts(&self, hostname: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(hostname)
            .copied()
            .unwrap_or(0)
    }
}

impl<F> Connector for ScriptedConnector<F>
where
    F: Fn(&str) -> ScriptedSession + Sync,
{
    type Session = ScriptedSession;

    fn connect(&self, hostname: &str, _address: &str, _timeout: Duration) -> Result<ScriptedSession> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(hostname.to_string())
            .or_default() += 1;

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(hostname)
            .and_then(VecDeque::pop_front);

        match failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok((self.factory)(hostname)),
        }
    }
}
