//! Scripted remote hosts for testing the scanner and the flashing sequence.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::traits::{CommandOutput, Connector, Credentials, RemoteSession, SessionError};

/// Exit status returned for commands the host has no script for.
pub const UNKNOWN_COMMAND_STATUS: i32 = 127;

/// One simulated device.
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    accounts: Vec<Credentials>,
    responses: HashMap<String, CommandOutput>,
    drops_on: HashSet<String>,
    refuse_after_drop: usize,
    refuse_remaining: usize,
    fail_copies: bool,
    stalled_users: Vec<String>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept this login pair.
    pub fn account(mut self, user: &str, password: &str) -> Self {
        self.accounts.push(Credentials::new(user, password));
        self
    }

    /// Answer `command` with `output` and exit status 0.
    pub fn respond(mut self, command: &str, output: &str) -> Self {
        self.responses.insert(
            command.to_string(),
            CommandOutput {
                output: output.as_bytes().to_vec(),
                exit_status: 0,
            },
        );
        self
    }

    /// Answer `command` with a non-zero exit status.
    pub fn fail(mut self, command: &str, status: i32) -> Self {
        self.responses.insert(
            command.to_string(),
            CommandOutput {
                output: b"command failed".to_vec(),
                exit_status: status,
            },
        );
        self
    }

    /// Drop the connection while `command` runs, as a rebooting device does.
    pub fn drop_on(mut self, command: &str) -> Self {
        self.drops_on.insert(command.to_string());
        self
    }

    /// After a dropped connection, refuse this many opens before accepting again.
    pub fn refuse_after_drop(mut self, attempts: usize) -> Self {
        self.refuse_after_drop = attempts;
        self
    }

    /// Let logins as `user` stall until they time out.
    pub fn stall_login(mut self, user: &str) -> Self {
        self.stalled_users.push(user.to_string());
        self
    }

    /// Make every file copy fail.
    pub fn fail_copies(mut self) -> Self {
        self.fail_copies = true;
        self
    }
}

/// One thing done on a host, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    Run(String),
    Copy(String),
}

#[derive(Debug, Default)]
struct MockState {
    hosts: HashMap<Ipv4Addr, MockHost>,
    opens: Vec<(Ipv4Addr, String)>,
    commands: Vec<(Ipv4Addr, String)>,
    copies: Vec<(Ipv4Addr, PathBuf, String)>,
    activity: Vec<(Ipv4Addr, Activity)>,
}

/// Connector over a set of [`MockHost`]s. Unknown addresses time out.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_host(&self, addr: Ipv4Addr, host: MockHost) {
        self.lock().hosts.insert(addr, host);
    }

    /// Every open attempt as `(host, user)`, in arrival order.
    pub fn open_attempts(&self) -> Vec<(Ipv4Addr, String)> {
        self.lock().opens.clone()
    }

    /// Commands run against `host`, in order.
    pub fn commands_for(&self, host: Ipv4Addr) -> Vec<String> {
        self.lock()
            .commands
            .iter()
            .filter(|(h, _)| *h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Copies made to `host` as `(local, remote)`.
    pub fn copies_for(&self, host: Ipv4Addr) -> Vec<(PathBuf, String)> {
        self.lock()
            .copies
            .iter()
            .filter(|(h, _, _)| *h == host)
            .map(|(_, l, r)| (l.clone(), r.clone()))
            .collect()
    }

    /// Commands and copies on `host` interleaved as they happened.
    pub fn activity_for(&self, host: Ipv4Addr) -> Vec<Activity> {
        self.lock()
            .activity
            .iter()
            .filter(|(h, _)| *h == host)
            .map(|(_, a)| a.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    fn open(
        &self,
        host: Ipv4Addr,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<MockSession, SessionError> {
        let mut state = self.lock();
        state.opens.push((host, credentials.user.clone()));

        let Some(device) = state.hosts.get_mut(&host) else {
            return Err(SessionError::Timeout {
                host,
                timeout_ms: timeout.as_millis() as u64,
            });
        };
        if device.refuse_remaining > 0 {
            device.refuse_remaining -= 1;
            return Err(SessionError::ConnectFailed {
                host,
                message: "connection refused".into(),
            });
        }
        if device.stalled_users.contains(&credentials.user) {
            return Err(SessionError::LoginTimeout {
                host,
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        if !device.accounts.contains(credentials) {
            return Err(SessionError::Auth {
                host,
                user: credentials.user.clone(),
            });
        }

        Ok(MockSession {
            host,
            state: Arc::clone(&self.state),
            open: true,
        })
    }
}

/// Session handed out by [`MockConnector`].
#[derive(Debug)]
pub struct MockSession {
    host: Ipv4Addr,
    state: Arc<Mutex<MockState>>,
    open: bool,
}

impl RemoteSession for MockSession {
    fn host(&self) -> Ipv4Addr {
        self.host
    }

    fn run(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        if !self.open {
            return Err(SessionError::Closed);
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.commands.push((self.host, command.to_string()));
        state
            .activity
            .push((self.host, Activity::Run(command.to_string())));

        let device = state.hosts.get_mut(&self.host).ok_or(SessionError::Disconnected)?;
        if device.drops_on.contains(command) {
            device.refuse_remaining = device.refuse_after_drop;
            self.open = false;
            return Err(SessionError::Disconnected);
        }
        Ok(device
            .responses
            .get(command)
            .cloned()
            .unwrap_or(CommandOutput {
                output: format!("sh: {command}: not found").into_bytes(),
                exit_status: UNKNOWN_COMMAND_STATUS,
            }))
    }

    fn copy(&mut self, local: &Path, remote: &str, _mode: i32) -> Result<u64, SessionError> {
        if !self.open {
            return Err(SessionError::Closed);
        }
        let size = std::fs::metadata(local)?.len();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.hosts.get(&self.host).is_some_and(|h| h.fail_copies) {
            return Err(SessionError::TransferFailed {
                remote: remote.to_string(),
                message: "no space left on device".into(),
            });
        }
        state
            .copies
            .push((self.host, local.to_path_buf(), remote.to_string()));
        state
            .activity
            .push((self.host, Activity::Copy(remote.to_string())));
        Ok(size)
    }

    fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 7);
    const TIMEOUT: Duration = Duration::from_secs(3);

    #[test]
    fn test_mock_credentials() {
        let mock = MockConnector::new();
        mock.add_host(HOST, MockHost::new().account("root", "oakridge"));

        assert!(mock.open(HOST, &Credentials::new("root", "oakridge"), TIMEOUT).is_ok());
        assert!(matches!(
            mock.open(HOST, &Credentials::new("ubnt", "ubnt"), TIMEOUT),
            Err(SessionError::Auth { .. })
        ));
        assert!(matches!(
            mock.open(Ipv4Addr::new(10, 0, 0, 8), &Credentials::new("root", "oakridge"), TIMEOUT),
            Err(SessionError::Timeout { .. })
        ));
        assert_eq!(mock.open_attempts().len(), 3);
    }

    #[test]
    fn test_mock_scripted_output() {
        let mock = MockConnector::new();
        mock.add_host(
            HOST,
            MockHost::new()
                .account("root", "oakridge")
                .respond("cat /etc/version", "  v4.0.66\n")
                .fail("false", 1),
        );
        let mut s = mock.open(HOST, &Credentials::new("root", "oakridge"), TIMEOUT).unwrap();

        assert_eq!(s.run("cat /etc/version").unwrap().text(), "v4.0.66");
        assert_eq!(s.run("false").unwrap().exit_status, 1);
        assert!(s.run_checked("false").is_err());
        assert_eq!(s.run("uptime").unwrap().exit_status, UNKNOWN_COMMAND_STATUS);
        assert_eq!(mock.commands_for(HOST).len(), 4);
    }

    #[test]
    fn test_mock_drop_then_refuse() {
        let mock = MockConnector::new();
        mock.add_host(
            HOST,
            MockHost::new()
                .account("root", "oakridge")
                .drop_on("reboot")
                .refuse_after_drop(2),
        );
        let creds = Credentials::new("root", "oakridge");
        let mut s = mock.open(HOST, &creds, TIMEOUT).unwrap();
        assert!(s.run("reboot").unwrap_err().is_disconnect());
        assert!(matches!(s.run("uptime"), Err(SessionError::Closed)));

        assert!(mock.open(HOST, &creds, TIMEOUT).is_err());
        assert!(mock.open(HOST, &creds, TIMEOUT).is_err());
        assert!(mock.open(HOST, &creds, TIMEOUT).is_ok());
    }
}
