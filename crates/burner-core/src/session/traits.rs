//! Remote shell abstraction.
//!
//! Defines the `Connector` and `RemoteSession` traits for talking to a device,
//! allowing different implementations (ssh2, mock, etc.).

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Authentication failed for {user}@{host}")]
    Auth { host: Ipv4Addr, user: String },

    /// Nothing accepted the TCP connection in time.
    #[error("Timeout after {timeout_ms}ms connecting to {host}")]
    Timeout { host: Ipv4Addr, timeout_ms: u64 },

    /// The port answered but the SSH handshake or login stalled.
    #[error("SSH login to {host} timed out after {timeout_ms}ms")]
    LoginTimeout { host: Ipv4Addr, timeout_ms: u64 },

    #[error("Failed to connect to {host}: {message}")]
    ConnectFailed { host: Ipv4Addr, message: String },

    #[error("`{command}` exited with status {status}: {output}")]
    CommandFailed {
        command: String,
        status: i32,
        output: String,
    },

    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("Copy to {remote} failed: {message}")]
    TransferFailed { remote: String, message: String },

    #[error("Session is closed")]
    Closed,

    #[error("Remote end disconnected")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// True when the remote end went away underneath us, as opposed to a
    /// command that ran and reported failure.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SessionError::Disconnected)
    }
}

/// Login pair for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            user: user.to_string(),
            password: password.to_string(),
        }
    }
}

/// Combined stdout/stderr of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub output: Vec<u8>,
    pub exit_status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Output as trimmed text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).trim().to_string()
    }
}

/// One authenticated shell connection, owned by a single task.
pub trait RemoteSession: Send {
    /// Address this session is connected to.
    fn host(&self) -> Ipv4Addr;

    /// Run one command to completion and return its combined output.
    ///
    /// A non-zero exit status is not an error at this level; see
    /// [`RemoteSession::run_checked`].
    fn run(&mut self, command: &str) -> Result<CommandOutput, SessionError>;

    /// Run one command and require a zero exit status.
    fn run_checked(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        let out = self.run(command)?;
        if out.success() {
            Ok(out)
        } else {
            Err(SessionError::CommandFailed {
                command: command.to_string(),
                status: out.exit_status,
                output: out.text(),
            })
        }
    }

    /// Copy one local file to `remote` with the given permission bits.
    fn copy(&mut self, local: &Path, remote: &str, mode: i32) -> Result<u64, SessionError>;

    /// Close the connection. Further calls fail with [`SessionError::Closed`].
    fn close(&mut self);
}

/// Opens sessions to hosts.
pub trait Connector: Send + Sync {
    type Session: RemoteSession;

    fn open(
        &self,
        host: Ipv4Addr,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Self::Session, SessionError>;
}
