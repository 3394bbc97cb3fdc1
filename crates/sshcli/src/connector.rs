//! [`Connector`] spawning the system ssh client.

use crate::channel::{Channel, ReadOutcome};
use crate::session::SshSession;
use reconcile::{Connector, Expect, Result, Session, SessionError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

/// Any exec prompt at the end of a line: `CSG-01>` or `CSG-01#`
static BASE_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?P<name>[A-Za-z0-9._\-]+)(?P<mode>[>#])\s*$")
        .expect("base prompt pattern is valid")
});

static PASSWORD_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)password:\s*$").expect("password pattern is valid"));

/// Commands sent after login so output is never paged or wrapped
const SESSION_SETUP: [&str; 2] = ["terminal length 0", "terminal width 511"];

/// Settings for the ssh transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshOptions {
    /// ssh client binary
    pub program: String,
    pub port: u16,
    /// Extra arguments placed before the destination
    pub extra_args: Vec<String>,
    /// Feed the password through `sshpass -e`
    pub use_sshpass: bool,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            port: 22,
            extra_args: vec![
                "-o".to_string(),
                "StrictHostKeyChecking=accept-new".to_string(),
            ],
            use_sshpass: true,
        }
    }
}

/// Login credentials
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opens [`SshSession`]s, one ssh process per device
#[derive(Debug, Clone)]
pub struct SshConnector {
    options: SshOptions,
    credentials: Credentials,
}

impl SshConnector {
    pub fn new(options: SshOptions, credentials: Credentials) -> Self {
        Self {
            options,
            credentials,
        }
    }

    /// The ssh invocation for one device
    pub fn command(&self, address: &str, timeout: Duration) -> Command {
        let ssh_args = ssh_args(&self.options, &self.credentials.username, address, timeout);

        if self.options.use_sshpass {
            let mut command = Command::new("sshpass");
            command
                .arg("-e")
                .arg(&self.options.program)
                .args(ssh_args)
                .env("SSHPASS", &self.credentials.password);
            command
        } else {
            let mut command = Command::new(&self.options.program);
            command.args(ssh_args);
            command
        }
    }

    /// Raise a user-mode session to privileged mode
    fn enable(&self, session: &mut SshSession, timeout: Duration) -> Result<()> {
        session.exchange("enable", &PASSWORD_PROMPT, timeout)?;

        let privileged = &*BASE_PROMPT;
        let output = session.exchange(&self.credentials.password, privileged, timeout)?;
        if output.trim_end().ends_with('#') {
            Ok(())
        } else {
            Err(SessionError::Authentication {
                message: "enable password rejected".to_string(),
            })
        }
    }
}

impl Connector for SshConnector {
    type Session = SshSession;

    fn connect(&self, hostname: &str, address: &str, timeout: Duration) -> Result<SshSession> {
        log::debug!("{hostname}: spawning ssh to {address}");
        let mut channel = Channel::spawn(self.command(address, timeout)).map_err(|e| {
            SessionError::Connect {
                message: format!("failed to start ssh: {e}"),
            }
        })?;

        let banner = match channel.read_until(&BASE_PROMPT, timeout) {
            ReadOutcome::Matched(text) => text,
            ReadOutcome::TimedOut(text) => return Err(classify_failure(&text, Some(timeout))),
            ReadOutcome::Closed(text) => return Err(classify_failure(&text, None)),
        };

        let (name, privileged) = base_prompt(&banner).ok_or_else(|| SessionError::Protocol {
            message: "no prompt in login banner".to_string(),
        })?;
        let prompt = prompt_regex(&name).map_err(|e| SessionError::Protocol {
            message: format!("unusable prompt '{name}': {e}"),
        })?;

        let mut session = SshSession::new(hostname, channel, prompt);
        if !privileged {
            self.enable(&mut session, timeout)?;
        }
        for command in SESSION_SETUP {
            session.send(command, Expect::Prompt, timeout)?;
        }

        log::debug!("{hostname}: logged in as {name}");
        Ok(session)
    }
}

/// Arguments to the ssh binary, destination last
fn ssh_args(options: &SshOptions, username: &str, address: &str, timeout: Duration) -> Vec<String> {
    let mut args = vec![
        "-tt".to_string(),
        "-p".to_string(),
        options.port.to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", timeout.as_secs().max(1)),
    ];
    args.extend(options.extra_args.iter().cloned());
    args.push(format!("{username}@{address}"));
    args
}

/// Hostname and privilege level from the last prompt in `banner`
pub(crate) fn base_prompt(banner: &str) -> Option<(String, bool)> {
    let caps = BASE_PROMPT.captures_iter(banner).last()?;
    Some((caps["name"].to_string(), &caps["mode"] == "#"))
}

/// Prompt of one device in exec or any configuration mode
pub(crate) fn prompt_regex(name: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?m)^{}(\([^)]*\))?[>#]\s*$", regex::escape(name)))
}

/// Turn what ssh printed before giving up into an error
pub(crate) fn classify_failure(output: &str, timed_out: Option<Duration>) -> SessionError {
    let message = output
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .unwrap_or("connection closed")
        .to_string();

    if output.contains("Permission denied") || output.contains("Authentication failed") {
        SessionError::Authentication { message }
    } else if output.contains("timed out")
        || output.contains("No route to host")
        || output.contains("Could not resolve hostname")
    {
        SessionError::Unreachable { message }
    } else if let Some(waited) = timed_out {
        SessionError::Unreachable {
            message: format!("no prompt within {}s", waited.as_secs()),
        }
    } else {
        SessionError::Connect { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::ErrorCategory;

    #[test]
    fn test_base_prompt() {
        let banner = "\nUnauthorized access prohibited\n\nCSG-01>";
        assert_eq!(base_prompt(banner), Some(("CSG-01".to_string(), false)));
        assert_eq!(
            base_prompt("banner\nCSG-01#"),
            Some(("CSG-01".to_string(), true))
        );
        assert_eq!(base_prompt("Password:"), None);
    }

    #[test]
    fn test_prompt_regex_matches_config_modes() {
        let prompt = prompt_regex("CSG-01.lab").unwrap();
        assert!(prompt.is_match("output\nCSG-01.lab#"));
        assert!(prompt.is_match("CSG-01.lab(config-if)#"));
        assert!(!prompt.is_match("CSG-01.lab#show version"));
        assert!(!prompt.is_match("CSG-01xlab#"));
    }

    #[test]
    fn test_classify_failure() {
        let denied = classify_failure("user@10.0.0.1: Permission denied (password).\n", None);
        assert_eq!(denied.category(), ErrorCategory::Authentication);

        let unreachable =
            classify_failure("ssh: connect to host 10.0.0.1 port 22: Connection timed out", None);
        assert_eq!(unreachable.category(), ErrorCategory::Unreachable);

        let refused = classify_failure(
            "ssh: connect to host 10.0.0.1 port 22: Connection refused\n",
            None,
        );
        assert!(refused.is_retryable());
        assert_eq!(
            refused.to_string(),
            "connection failed: ssh: connect to host 10.0.0.1 port 22: Connection refused"
        );

        let silent = classify_failure("", Some(Duration::from_secs(30)));
        assert_eq!(silent.to_string(), "device unreachable: no prompt within 30s");
    }

    #[test]
    fn test_command_uses_sshpass() {
        let connector = SshConnector::new(SshOptions::default(), Credentials::new("ops", "secret"));
        let command = connector.command("10.0.0.1", Duration::from_secs(30));

        assert_eq!(command.get_program(), "sshpass");
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[..2], ["-e", "ssh"]);
        assert!(args.contains(&"ConnectTimeout=30".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("ops@10.0.0.1"));
        assert!(!args.iter().any(|a| a.contains("secret")));
    }

    #[test]
    fn test_command_without_sshpass() {
        let options = SshOptions {
            use_sshpass: false,
            port: 2222,
            ..Default::default()
        };
        let connector = SshConnector::new(options, Credentials::new("ops", "secret"));
        let command = connector.command("10.0.0.1", Duration::from_secs(5));

        assert_eq!(command.get_program(), "ssh");
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[..3], ["-tt", "-p", "2222"]);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let debug = format!("{:?}", Credentials::new("ops", "secret"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_options_from_toml() {
        let options: SshOptions = toml::from_str("port = 830\nuse_sshpass = false").unwrap();
        assert_eq!(options.port, 830);
        assert_eq!(options.program, "ssh");
        assert_eq!(options.extra_args, SshOptions::default().extra_args);
    }
}
