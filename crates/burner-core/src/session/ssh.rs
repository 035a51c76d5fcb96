//! ssh2-based remote session implementation.

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;

use ssh2::{ErrorCode, ExtendedData, Session};
use tracing::{debug, instrument};

use super::traits::{CommandOutput, Connector, Credentials, RemoteSession, SessionError};

pub const SSH_PORT: u16 = 22;

// libssh2 session error codes we care about.
const LIBSSH2_ERROR_SOCKET_SEND: i32 = -7;
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;
const LIBSSH2_ERROR_CHANNEL_CLOSED: i32 = -26;
const LIBSSH2_ERROR_SOCKET_RECV: i32 = -43;

/// Opens password-authenticated ssh2 sessions. Host keys are not checked;
/// the devices in scope all ship with throwaway keys.
#[derive(Debug, Clone, Copy)]
pub struct SshConnector {
    port: u16,
}

impl SshConnector {
    pub fn new() -> Self {
        Self { port: SSH_PORT }
    }

    pub fn with_port(port: u16) -> Self {
        Self { port }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for SshConnector {
    type Session = SshSession;

    #[instrument(level = "debug", skip(self, credentials), fields(user = %credentials.user))]
    fn open(
        &self,
        host: Ipv4Addr,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<SshSession, SessionError> {
        let timeout_ms = timeout.as_millis() as u64;
        let addr = SocketAddr::from((host, self.port));

        let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                SessionError::Timeout { host, timeout_ms }
            }
            _ => SessionError::ConnectFailed {
                host,
                message: e.to_string(),
            },
        })?;

        let mut session = Session::new().map_err(|e| SessionError::ConnectFailed {
            host,
            message: e.to_string(),
        })?;
        session.set_tcp_stream(tcp);
        // Bounds handshake and authentication only.
        session.set_timeout(timeout_ms.min(u32::MAX as u64) as u32);
        session
            .handshake()
            .map_err(|e| open_error(host, timeout_ms, e))?;

        session
            .userauth_password(&credentials.user, &credentials.password)
            .map_err(|e| match e.code() {
                ErrorCode::Session(LIBSSH2_ERROR_AUTHENTICATION_FAILED) => SessionError::Auth {
                    host,
                    user: credentials.user.clone(),
                },
                _ => open_error(host, timeout_ms, e),
            })?;
        if !session.authenticated() {
            return Err(SessionError::Auth {
                host,
                user: credentials.user.clone(),
            });
        }

        // Remote commands run without a deadline.
        session.set_timeout(0);
        debug!(host = %host, "SSH session authenticated");

        Ok(SshSession {
            host,
            session: Some(session),
        })
    }
}

/// An authenticated ssh2 session.
pub struct SshSession {
    host: Ipv4Addr,
    session: Option<Session>,
}

impl SshSession {
    fn session(&self) -> Result<&Session, SessionError> {
        self.session.as_ref().ok_or(SessionError::Closed)
    }
}

impl RemoteSession for SshSession {
    fn host(&self) -> Ipv4Addr {
        self.host
    }

    #[instrument(level = "debug", skip(self), fields(host = %self.host))]
    fn run(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        let session = self.session()?;
        let fail = |e: ssh2::Error| command_error(command, e);

        let mut channel = session.channel_session().map_err(fail)?;
        channel
            .handle_extended_data(ExtendedData::Merge)
            .map_err(fail)?;
        channel.exec(command).map_err(fail)?;

        let mut output = Vec::new();
        channel
            .read_to_end(&mut output)
            .map_err(|e| command_io_error(command, e))?;
        channel.wait_close().map_err(fail)?;
        let exit_status = channel.exit_status().map_err(fail)?;

        debug!(exit_status, bytes = output.len(), "Command finished");
        Ok(CommandOutput {
            output,
            exit_status,
        })
    }

    #[instrument(level = "debug", skip(self, local), fields(host = %self.host, local = %local.display()))]
    fn copy(&mut self, local: &Path, remote: &str, mode: i32) -> Result<u64, SessionError> {
        let mut file = File::open(local)?;
        let size = file.metadata()?.len();
        let session = self.session()?;
        let fail = |e: ssh2::Error| transfer_error(remote, e);

        let mut channel = session
            .scp_send(Path::new(remote), mode, size, None)
            .map_err(fail)?;
        let written = io::copy(&mut file, &mut channel).map_err(|e| {
            if is_disconnect_io(&e) {
                SessionError::Disconnected
            } else {
                SessionError::TransferFailed {
                    remote: remote.to_string(),
                    message: e.to_string(),
                }
            }
        })?;
        channel.flush()?;
        channel.send_eof().map_err(fail)?;
        channel.wait_eof().map_err(fail)?;
        channel.close().map_err(fail)?;
        channel.wait_close().map_err(fail)?;

        debug!(bytes = written, remote = %remote, "Copy complete");
        Ok(written)
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "closing", None);
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_disconnect_code(err: &ssh2::Error) -> bool {
    matches!(
        err.code(),
        ErrorCode::Session(
            LIBSSH2_ERROR_SOCKET_SEND
                | LIBSSH2_ERROR_SOCKET_DISCONNECT
                | LIBSSH2_ERROR_SOCKET_RECV
                | LIBSSH2_ERROR_CHANNEL_CLOSED
        )
    )
}

fn is_disconnect_io(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    ) {
        return true;
    }
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<ssh2::Error>())
        .is_some_and(is_disconnect_code)
}

fn open_error(host: Ipv4Addr, timeout_ms: u64, err: ssh2::Error) -> SessionError {
    match err.code() {
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) => SessionError::LoginTimeout { host, timeout_ms },
        _ => SessionError::ConnectFailed {
            host,
            message: err.to_string(),
        },
    }
}

fn command_error(command: &str, err: ssh2::Error) -> SessionError {
    if is_disconnect_code(&err) {
        SessionError::Disconnected
    } else {
        SessionError::Command {
            command: command.to_string(),
            message: err.to_string(),
        }
    }
}

fn command_io_error(command: &str, err: io::Error) -> SessionError {
    if is_disconnect_io(&err) {
        SessionError::Disconnected
    } else {
        SessionError::Command {
            command: command.to_string(),
            message: err.to_string(),
        }
    }
}

fn transfer_error(remote: &str, err: ssh2::Error) -> SessionError {
    if is_disconnect_code(&err) {
        SessionError::Disconnected
    } else {
        SessionError::TransferFailed {
            remote: remote.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 30);

    #[test]
    fn test_stalled_login_is_not_a_connect_timeout() {
        let err = ssh2::Error::from_errno(ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT));
        assert!(matches!(
            open_error(HOST, 3000, err),
            SessionError::LoginTimeout { timeout_ms: 3000, .. }
        ));
    }

    #[test]
    fn test_other_handshake_errors() {
        let err = ssh2::Error::from_errno(ErrorCode::Session(LIBSSH2_ERROR_SOCKET_DISCONNECT));
        assert!(matches!(
            open_error(HOST, 3000, err),
            SessionError::ConnectFailed { .. }
        ));
    }

    #[test]
    fn test_disconnect_codes() {
        let err = ssh2::Error::from_errno(ErrorCode::Session(LIBSSH2_ERROR_CHANNEL_CLOSED));
        assert!(command_error("reboot", err).is_disconnect());
        let err = ssh2::Error::from_errno(ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT));
        assert!(!transfer_error("/tmp/oak.tar.gz", err).is_disconnect());
    }
}
