//! Session and connector traits
//!
//! The engine never opens sockets itself. A [`Connector`] hands out one
//! [`Session`] per device and the worker that owns the device drives it.

use crate::error::{Result, RunError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What to wait for after sending a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect<'a> {
    /// The device's normal exec prompt
    Prompt,
    /// A regular expression searched in the response
    Pattern(&'a str),
}

impl fmt::Display for Expect<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expect::Prompt => write!(f, "<prompt>"),
            Expect::Pattern(p) => write!(f, "{p}"),
        }
    }
}

/// A live interactive command channel to one device
///
/// Implementations return the raw captured text, command echo included.
pub trait Session: Send {
    /// Send a command (an empty string sends a bare newline) and wait for `expect`
    fn send(&mut self, command: &str, expect: Expect<'_>, timeout: Duration) -> Result<String>;

    /// Enter configuration mode, send each line, leave configuration mode
    fn send_config_lines(&mut self, lines: &[String], timeout: Duration) -> Result<String>;

    /// Save the running configuration
    ///
    /// On this device family a successful save can still surface as an error;
    /// callers inspect [`SessionError::output`](crate::SessionError::output).
    fn persist(&mut self, timeout: Duration) -> Result<String>;

    /// Close the session
    fn disconnect(&mut self) -> Result<()>;
}

/// Factory for sessions
///
/// Shared by all workers, so it must be `Sync`. Credentials live inside the
/// implementation.
pub trait Connector: Sync {
    /// Session type produced by this connector
    type Session: Session;

    /// Open a session to one device
    fn connect(&self, hostname: &str, address: &str, timeout: Duration)
    -> Result<Self::Session>;
}

/// Per-operation timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Establishing the session
    #[serde(with = "secs")]
    pub connect: Duration,
    /// Read-only show commands
    #[serde(with = "secs")]
    pub inspect: Duration,
    /// Each leg of an interactive prompt exchange
    #[serde(with = "secs")]
    pub interactive: Duration,
    /// Flash squeeze completion
    #[serde(with = "secs")]
    pub squeeze: Duration,
    /// Image transfer completion
    #[serde(with = "secs")]
    pub transfer: Duration,
    /// MD5 verification of a transferred image
    #[serde(with = "secs")]
    pub verify: Duration,
    /// Configuration mode changes
    #[serde(with = "secs")]
    pub config: Duration,
    /// Saving the configuration
    #[serde(with = "secs")]
    pub persist: Duration,
    /// Everything one device's transaction may take, checked between steps
    #[serde(with = "secs")]
    pub transaction: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            inspect: Duration::from_secs(30),
            interactive: Duration::from_secs(60),
            squeeze: Duration::from_secs(900),
            transfer: Duration::from_secs(1800),
            verify: Duration::from_secs(900),
            config: Duration::from_secs(60),
            persist: Duration::from_secs(120),
            transaction: Duration::from_secs(4200),
        }
    }
}

impl Timeouts {
    /// Combined worst case of the long-running steps
    pub fn long_steps(&self) -> Duration {
        self.squeeze + self.transfer + self.verify
    }

    /// The transaction budget must cover squeeze, transfer and verify
    pub fn validate(&self) -> std::result::Result<(), RunError> {
        if self.transaction < self.long_steps() {
            return Err(RunError::Timeouts(format!(
                "transaction budget {}s is shorter than squeeze + transfer + verify ({}s)",
                self.transaction.as_secs(),
                self.long_steps().as_secs()
            )));
        }
        Ok(())
    }
}

/// Durations as whole seconds in config files
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
