//! Byte channel to a child process with deadline-bounded pattern reads.

use regex::Regex;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

/// What a reader thread saw
enum Chunk {
    Data(String),
    Eof,
}

/// How a pattern read ended. Each variant carries the text consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Pattern found; text up to the end of the match
    Matched(String),
    /// Deadline passed; everything buffered so far
    TimedOut(String),
    /// Both output streams closed; everything buffered so far
    Closed(String),
}

/// Child process with piped stdio
///
/// stdout and stderr are drained by one thread each into a single channel,
/// so reads never block past their deadline.
pub struct Channel {
    child: Child,
    stdin: Option<ChildStdin>,
    rx: Receiver<Chunk>,
    buffer: String,
    open_streams: usize,
}

impl Channel {
    /// Spawn `command` with all three streams piped
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (tx, rx) = mpsc::channel();
        let mut open_streams = 0;
        if let Some(stdout) = child.stdout.take() {
            pump(stdout, tx.clone());
            open_streams += 1;
        }
        if let Some(stderr) = child.stderr.take() {
            pump(stderr, tx);
            open_streams += 1;
        }

        Ok(Self {
            stdin: child.stdin.take(),
            child,
            rx,
            buffer: String::new(),
            open_streams,
        })
    }

    /// Write one line followed by a newline
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"))?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()
    }

    /// Read until `pattern` matches the buffered output or `timeout` passes
    ///
    /// Text after the match stays buffered for the next read.
    pub fn read_until(&mut self, pattern: &Regex, timeout: Duration) -> ReadOutcome {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(end) = pattern.find(&self.buffer).map(|m| m.end()) {
                let rest = self.buffer.split_off(end);
                return ReadOutcome::Matched(std::mem::replace(&mut self.buffer, rest));
            }
            if self.open_streams == 0 {
                return ReadOutcome::Closed(std::mem::take(&mut self.buffer));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ReadOutcome::TimedOut(std::mem::take(&mut self.buffer));
            }

            match self.rx.recv_timeout(remaining) {
                Ok(Chunk::Data(text)) => self.buffer.push_str(&text.replace('\r', "")),
                Ok(Chunk::Eof) => self.open_streams = self.open_streams.saturating_sub(1),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => self.open_streams = 0,
            }
        }
    }

    /// Close stdin, give the child `grace` to exit, then kill it
    pub fn shutdown(&mut self, grace: Duration) {
        drop(self.stdin.take());
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => thread::sleep(Duration::from_millis(20)),
                Err(_) => break,
            }
        }
        self.kill();
    }

    fn kill(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.kill();
    }
}

fn pump<R: Read + Send + 'static>(mut stream: R, tx: Sender<Chunk>) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => {
                    let _ = tx.send(Chunk::Eof);
                    break;
                }
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if tx.send(Chunk::Data(text)).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn regex(pattern: &str) -> Regex {
        Regex::new(pattern).unwrap()
    }

    #[test]
    fn test_read_until_match_keeps_rest() {
        let mut command = Command::new("sh");
        command.args(["-c", "printf 'one\\r\\nPROMPT#two'; sleep 5"]);
        let mut channel = Channel::spawn(command).unwrap();

        let first = channel.read_until(&regex("PROMPT#"), Duration::from_secs(5));
        assert_eq!(first, ReadOutcome::Matched("one\nPROMPT#".to_string()));

        let second = channel.read_until(&regex("two"), Duration::from_secs(5));
        assert_eq!(second, ReadOutcome::Matched("two".to_string()));
    }

    #[test]
    fn test_write_line_round_trip() {
        let mut channel = Channel::spawn(Command::new("cat")).unwrap();
        channel.write_line("show version").unwrap();

        let outcome = channel.read_until(&regex("version\n"), Duration::from_secs(5));
        assert_eq!(outcome, ReadOutcome::Matched("show version\n".to_string()));
        channel.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_read_until_times_out() {
        let mut command = Command::new("sh");
        command.args(["-c", "printf 'partial'; sleep 5"]);
        let mut channel = Channel::spawn(command).unwrap();

        let outcome = channel.read_until(&regex("never"), Duration::from_millis(200));
        assert_eq!(outcome, ReadOutcome::TimedOut("partial".to_string()));
    }

    #[test]
    fn test_read_until_reports_close() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo 'Connection refused' >&2"]);
        let mut channel = Channel::spawn(command).unwrap();

        let outcome = channel.read_until(&regex("#"), Duration::from_secs(5));
        assert_eq!(
            outcome,
            ReadOutcome::Closed("Connection refused\n".to_string())
        );
    }
}
