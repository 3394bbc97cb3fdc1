//! # sshcli
//!
//! Interactive device sessions over the system `ssh` client.
//!
//! Each session is one `ssh -tt` child process (optionally wrapped in
//! `sshpass -e` for password logins). Output is read against regular
//! expressions with a deadline, expect-style, so a command can wait for the
//! device prompt, a confirmation prompt, or any other marker.
//!
//! ## Example
//!
//! ```no_run
//! use reconcile::{Connector, Expect, Session};
//! use sshcli::{Credentials, SshConnector, SshOptions};
//! use std::time::Duration;
//!
//! let connector = SshConnector::new(SshOptions::default(), Credentials::new("ops", "secret"));
//! let mut session = connector.connect("csg-01", "10.0.0.1", Duration::from_secs(30))?;
//! let version = session.send("show version", Expect::Prompt, Duration::from_secs(30))?;
//! session.disconnect()?;
//! # Ok::<(), reconcile::SessionError>(())
//! ```
//!
//! ## Requirements
//!
//! - OpenSSH client on `PATH`
//! - `sshpass` on `PATH` when `use_sshpass` is set (the default)

/// Child process channel with deadline-bounded reads.
pub mod channel;
/// Connector spawning one ssh process per device.
pub mod connector;
/// Session implementation.
pub mod session;

pub use connector::{Credentials, SshConnector, SshOptions};
pub use session::SshSession;
