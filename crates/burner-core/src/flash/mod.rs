//! Firmware lifecycle orchestration.
//!
//! A [`Flasher`] takes one [`Target`] through its [`Plan`]: fetch images,
//! log in, copy, run the command sequence, and for two-stage plans wait for
//! the reboot, log in again and run the second stage. Targets in a batch run
//! on their own threads and share nothing but the image cache.

pub mod plan;
pub mod sequence;
pub mod state;

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{CatalogError, Fetcher, ImageCache};
use crate::events::{Event, FlashPhase, Observer};
use crate::reach::{ReachabilityProber, any_received};
use crate::session::{Connector, Credentials, RemoteSession, SessionError};
use crate::targets::{Operation, Target};

pub use plan::{Plan, Reboot, Requirement, Stage, Step, Transfer};
pub use sequence::{StepFailure, run_sequence};
pub use state::FlashState;

/// Permission bits for copied images.
const IMAGE_MODE: i32 = 0o644;

#[derive(Error, Debug)]
pub enum FlashError {
    #[error(transparent)]
    Image(#[from] CatalogError),

    #[error("Login to {host} failed: {source}")]
    Connect {
        host: Ipv4Addr,
        #[source]
        source: SessionError,
    },

    #[error("Copy of {file} failed: {source}")]
    Transfer {
        file: String,
        #[source]
        source: SessionError,
    },

    #[error("`{command}` failed: {message}")]
    Step { command: String, message: String },

    #[error("{host} did not answer after {rounds} probe rounds")]
    Unreachable { host: Ipv4Addr, rounds: u32 },

    #[error("Gave up reconnecting to {host} after {attempts} attempts")]
    Reconnect { host: Ipv4Addr, attempts: u32 },

    #[error("Worker thread panicked")]
    Panicked,
}

/// Timing knobs for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSettings {
    pub connect_timeout: Duration,
    /// Probe rounds before a rebooting device is declared lost.
    pub max_probe_rounds: u32,
    /// Overrides the plan's delay between login attempts after a reboot.
    pub reconnect_interval: Option<Duration>,
    /// `None` retries forever.
    pub reconnect_max_attempts: Option<u32>,
    /// Overrides the plan's settle delay after a reboot.
    pub settle: Option<Duration>,
}

impl Default for FlashSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            max_probe_rounds: 60,
            reconnect_interval: None,
            reconnect_max_attempts: None,
            settle: None,
        }
    }
}

/// Result of one flashing attempt.
#[derive(Debug)]
pub struct FlashOutcome {
    pub host: Ipv4Addr,
    pub mac: String,
    pub name: String,
    pub operation: Operation,
    /// Furthest phase entered.
    pub reached: FlashPhase,
    pub error: Option<FlashError>,
    pub optional_failures: Vec<StepFailure>,
}

impl FlashOutcome {
    fn new(target: &Target) -> Self {
        Self {
            host: target.host,
            mac: target.mac.clone(),
            name: target.name.clone(),
            operation: target.operation,
            reached: FlashPhase::Idle,
            error: None,
            optional_failures: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for FlashOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "{} {} {}: done", self.host, self.name, self.operation),
            Some(e) => write!(
                f,
                "{} {} {}: failed after {}: {}",
                self.host, self.name, self.operation, self.reached, e
            ),
        }
    }
}

pub struct Flasher<'a, C: Connector, P: ReachabilityProber, F: Fetcher> {
    connector: &'a C,
    prober: &'a P,
    cache: &'a ImageCache<F>,
    observer: &'a dyn Observer,
    settings: FlashSettings,
}

impl<'a, C: Connector, P: ReachabilityProber, F: Fetcher> Flasher<'a, C, P, F> {
    pub fn new(
        connector: &'a C,
        prober: &'a P,
        cache: &'a ImageCache<F>,
        observer: &'a dyn Observer,
    ) -> Self {
        Self {
            connector,
            prober,
            cache,
            observer,
            settings: FlashSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: FlashSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Flash one target.
    #[instrument(skip(self, target), fields(host = %target.host, op = %target.operation))]
    pub fn flash(&self, target: &Target) -> FlashOutcome {
        let mut state = FlashState::new(target.host, self.observer);
        let mut outcome = FlashOutcome::new(target);

        match self.run(target, &mut state, &mut outcome.optional_failures) {
            Ok(()) => state.goto(FlashPhase::Done),
            Err(e) => {
                state.goto(FlashPhase::Failed);
                outcome.error = Some(e);
            }
        }
        outcome.reached = state.reached();

        self.observer.on_event(&Event::TargetFinished {
            host: target.host,
            success: outcome.success(),
            message: outcome.error.as_ref().map(|e| e.to_string()),
        });
        outcome
    }

    /// Flash every target concurrently. Outcomes come back in input order.
    pub fn flash_all(&self, targets: &[Target]) -> Vec<FlashOutcome> {
        thread::scope(|s| {
            let handles: Vec<_> = targets
                .iter()
                .map(|target| s.spawn(move || self.flash(target)))
                .collect();

            handles
                .into_iter()
                .zip(targets)
                .map(|(handle, target)| {
                    handle.join().unwrap_or_else(|_| {
                        let mut outcome = FlashOutcome::new(target);
                        outcome.error = Some(FlashError::Panicked);
                        outcome
                    })
                })
                .collect()
        })
    }

    fn run(
        &self,
        target: &Target,
        state: &mut FlashState<'_>,
        skipped: &mut Vec<StepFailure>,
    ) -> Result<(), FlashError> {
        let plan = Plan::build(target)?;

        let mut local: HashMap<&'static str, PathBuf> = HashMap::new();
        for image in plan.images() {
            let cached = self.cache.ensure(&image)?;
            self.observer.on_event(&Event::ImageReady {
                filename: image.filename.to_string(),
                downloaded: cached.downloaded,
            });
            local.insert(image.filename, cached.path);
        }
        state.goto(FlashPhase::ImageReady);

        let mut session = self
            .connector
            .open(target.host, &plan.first.credentials, self.settings.connect_timeout)
            .map_err(|source| FlashError::Connect {
                host: target.host,
                source,
            })?;
        state.goto(FlashPhase::Connected(1));
        self.run_stage(&mut session, &plan.first, 1, &local, state, skipped)?;

        let Some((reboot, second)) = &plan.second else {
            return Ok(());
        };

        state.goto(FlashPhase::AwaitingReboot);
        let settle = self.settings.settle.unwrap_or(reboot.settle);
        if !settle.is_zero() {
            debug!(host = %target.host, secs = settle.as_secs(), "Waiting for reboot");
            thread::sleep(settle);
        }

        state.goto(FlashPhase::Unreachable);
        if self.wait_reachable(target.host, reboot.probes_per_round)? {
            state.goto(FlashPhase::Reachable);
        }

        state.goto(FlashPhase::Reconnecting(2));
        let interval = self
            .settings
            .reconnect_interval
            .unwrap_or(reboot.reconnect_interval);
        let mut session = self.reconnect(target.host, &second.credentials, interval)?;
        state.goto(FlashPhase::Connected(2));
        self.run_stage(&mut session, second, 2, &local, state, skipped)
    }

    fn run_stage<S: RemoteSession>(
        &self,
        session: &mut S,
        stage: &Stage,
        number: u8,
        local: &HashMap<&'static str, PathBuf>,
        state: &mut FlashState<'_>,
        skipped: &mut Vec<StepFailure>,
    ) -> Result<(), FlashError> {
        let result = self.transfer_and_run(session, stage, number, local, state, skipped);
        session.close();
        result
    }

    fn transfer_and_run<S: RemoteSession>(
        &self,
        session: &mut S,
        stage: &Stage,
        number: u8,
        local: &HashMap<&'static str, PathBuf>,
        state: &mut FlashState<'_>,
        skipped: &mut Vec<StepFailure>,
    ) -> Result<(), FlashError> {
        skipped.extend(run_sequence(session, &stage.prepare, self.observer)?);

        for transfer in &stage.transfers {
            let file = transfer.image.filename;
            let Some(path) = local.get(file) else {
                return Err(FlashError::Transfer {
                    file: file.to_string(),
                    source: SessionError::TransferFailed {
                        remote: transfer.remote.clone(),
                        message: "image not in cache".into(),
                    },
                });
            };
            let bytes = session
                .copy(path, &transfer.remote, IMAGE_MODE)
                .map_err(|source| FlashError::Transfer {
                    file: file.to_string(),
                    source,
                })?;
            info!(host = %session.host(), file = %file, remote = %transfer.remote, bytes, "Copied");
        }
        state.goto(FlashPhase::Transferred(number));

        state.goto(FlashPhase::CommandsRunning(number));
        skipped.extend(run_sequence(session, &stage.steps, self.observer)?);
        Ok(())
    }

    /// Probe in rounds until a reply arrives. Returns false when the prober
    /// cannot be used at all, leaving the login retries to find the device.
    fn wait_reachable(&self, host: Ipv4Addr, probes_per_round: u32) -> Result<bool, FlashError> {
        let rounds = self.settings.max_probe_rounds;
        for round in 1..=rounds {
            match self.prober.probe(host, probes_per_round) {
                Ok(replies) if any_received(&replies) => {
                    info!(host = %host, round, "Device is back");
                    return Ok(true);
                }
                Ok(_) => self.observer.on_event(&Event::ProbeRound { host, round }),
                Err(e) => {
                    warn!(host = %host, error = %e, "Cannot probe, falling back to login retries");
                    return Ok(false);
                }
            }
        }
        Err(FlashError::Unreachable { host, rounds })
    }

    fn reconnect(
        &self,
        host: Ipv4Addr,
        credentials: &Credentials,
        interval: Duration,
    ) -> Result<C::Session, FlashError> {
        let max = self.settings.reconnect_max_attempts;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if !interval.is_zero() {
                thread::sleep(interval);
            }
            match self
                .connector
                .open(host, credentials, self.settings.connect_timeout)
            {
                Ok(session) => {
                    info!(host = %host, attempts, "Reconnected");
                    return Ok(session);
                }
                Err(e) => {
                    debug!(host = %host, attempt = attempts, error = %e, "Reconnect failed");
                    if max.is_some_and(|max| attempts >= max) {
                        return Err(FlashError::Reconnect { host, attempts });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::catalog::{CountingFetcher, erx};
    use crate::events::NullObserver;
    use crate::model::Model;
    use crate::reach::{ProbeError, ProbeReply, ScriptedProber};
    use crate::session::{Activity, MockConnector, MockHost};

    /// Prober without raw-socket permission.
    struct NoIcmp;

    impl ReachabilityProber for NoIcmp {
        fn probe(&self, _host: Ipv4Addr, _count: u32) -> Result<Vec<ProbeReply>, ProbeError> {
            Err(ProbeError::Socket("Operation not permitted".into()))
        }
    }

    #[derive(Default)]
    struct Phases(Mutex<Vec<(Ipv4Addr, FlashPhase)>>);

    impl Observer for Phases {
        fn on_event(&self, event: &Event) {
            if let Event::PhaseChanged { host, to, .. } = event {
                self.0.lock().unwrap().push((*host, *to));
            }
        }
    }

    impl Phases {
        fn for_host(&self, host: Ipv4Addr) -> Vec<FlashPhase> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|(h, _)| *h == host)
                .map(|(_, p)| *p)
                .collect()
        }
    }

    fn fast() -> FlashSettings {
        FlashSettings {
            reconnect_interval: Some(Duration::ZERO),
            settle: Some(Duration::ZERO),
            ..FlashSettings::default()
        }
    }

    fn target(last: u8, model: Model, operation: Operation, user: &str, pass: &str) -> Target {
        Target {
            host: Ipv4Addr::new(10, 2, 0, last),
            mac: format!("00:11:22:33:44:{last:02x}"),
            name: model.display_name().to_string(),
            model,
            operation,
            credentials: Credentials::new(user, pass),
            current_version: "v4.0.0".into(),
            latest_version: "v4.1.0".into(),
        }
    }

    /// Answers every step, failing the ones listed in `failing`.
    fn scripted(mut host: MockHost, steps: &[Step], failing: &[&str]) -> MockHost {
        for step in steps {
            host = if failing.contains(&step.command.as_str()) {
                host.fail(&step.command, 1)
            } else {
                host.respond(&step.command, "")
            };
        }
        host
    }

    #[test]
    fn test_upgrade_with_optional_failures() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), CountingFetcher::new().serve_any(b"img"));
        let mock = MockConnector::new();
        let prober = ScriptedProber::new(0);

        let t = target(1, Model::A820, Operation::Upgrade, "root", "oakridge");
        let plan = Plan::build(&t).unwrap();
        mock.add_host(
            t.host,
            scripted(
                MockHost::new().account("root", "oakridge"),
                &plan.first.steps,
                &["stop", "/etc/init.d/wifidog stop"],
            ),
        );

        let flasher = Flasher::new(&mock, &prober, &cache, &NullObserver).with_settings(fast());
        let outcome = flasher.flash(&t);

        assert!(outcome.success(), "{outcome}");
        assert_eq!(outcome.reached, FlashPhase::Done);
        assert_eq!(outcome.optional_failures.len(), 2);
        assert_eq!(mock.commands_for(t.host).len(), plan.first.steps.len());
        assert_eq!(
            mock.copies_for(t.host),
            vec![(dir.path().join("a820.tar.gz"), "/tmp/oak.tar.gz".to_string())]
        );
        assert_eq!(prober.rounds(), 0);
    }

    #[test]
    fn test_mandatory_failure_fails_target() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), CountingFetcher::new().serve_any(b"img"));
        let mock = MockConnector::new();
        let prober = ScriptedProber::new(0);
        let phases = Phases::default();

        let t = target(2, Model::AcLite, Operation::Restore, "root", "oakridge");
        let plan = Plan::build(&t).unwrap();
        let failing = "mtd write /tmp/firmware.bin firmware";
        mock.add_host(
            t.host,
            scripted(MockHost::new().account("root", "oakridge"), &plan.first.steps, &[failing]),
        );

        let outcome = Flasher::new(&mock, &prober, &cache, &phases)
            .with_settings(fast())
            .flash(&t);

        assert!(matches!(
            outcome.error,
            Some(FlashError::Step { ref command, .. }) if command == failing
        ));
        assert_eq!(outcome.reached, FlashPhase::CommandsRunning(1));
        let commands = mock.commands_for(t.host);
        assert_eq!(commands.last().map(String::as_str), Some(failing));
        assert!(!commands.iter().any(|c| c == "reboot"));
        assert_eq!(phases.for_host(t.host).last(), Some(&FlashPhase::Failed));
    }

    #[test]
    fn test_login_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), CountingFetcher::new().serve_any(b"img"));
        let mock = MockConnector::new();
        let prober = ScriptedProber::new(0);

        let t = target(3, Model::W282, Operation::Convert, "admin", "admin");
        mock.add_host(t.host, MockHost::new().account("admin", "changed"));

        let outcome = Flasher::new(&mock, &prober, &cache, &NullObserver).flash(&t);
        assert!(matches!(outcome.error, Some(FlashError::Connect { .. })));
        assert_eq!(outcome.reached, FlashPhase::ImageReady);
        assert_eq!(mock.open_attempts().len(), 1);
    }

    #[test]
    fn test_download_failure_fails_target_only() {
        let dir = tempfile::tempdir().unwrap();
        let good = crate::catalog::lookup(Operation::Upgrade, Model::A822).unwrap();
        let cache = ImageCache::new(dir.path(), CountingFetcher::new().serve(good.url, b"img"));
        let mock = MockConnector::new();
        let prober = ScriptedProber::new(0);

        let ok = target(4, Model::A822, Operation::Upgrade, "root", "oakridge");
        let bad = target(5, Model::AcPro, Operation::Upgrade, "root", "oakridge");
        let plan = Plan::build(&ok).unwrap();
        mock.add_host(
            ok.host,
            scripted(MockHost::new().account("root", "oakridge"), &plan.first.steps, &[]),
        );

        let outcomes = Flasher::new(&mock, &prober, &cache, &NullObserver)
            .with_settings(fast())
            .flash_all(&[ok.clone(), bad.clone()]);

        assert_eq!(outcomes[0].host, ok.host);
        assert!(outcomes[0].success());
        assert!(matches!(
            outcomes[1].error,
            Some(FlashError::Image(CatalogError::Download { .. }))
        ));
        assert_eq!(outcomes[1].reached, FlashPhase::Idle);
    }

    fn edge_router_host(refusals: usize) -> MockHost {
        MockHost::new()
            .account("ubnt", "ubnt")
            .account("root", "oakridge")
            .respond("tar xzf /tmp/erx_factory.bin.tar.gz -C /tmp", "")
            .respond(
                "/opt/vyatta/bin/vyatta-op-cmd-wrapper add system image /tmp/lede-ramips-mt7621-ubnt-erx-initramfs-factory.tar",
                "Adding image",
            )
            .drop_on("/opt/vyatta/bin/vyatta-op-cmd-wrapper reboot now")
            .refuse_after_drop(refusals)
            .respond("tar xzf /tmp/oakridge_sysupgrade.bin.tar.gz -C /tmp", "")
            .drop_on("sysupgrade -n /tmp/lede-ramips-mt7621-ubnt-erx-squashfs-sysupgrade.bin")
    }

    #[test]
    fn test_two_stage_waits_for_reply() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), CountingFetcher::new().serve_any(b"img"));
        let mock = MockConnector::new();
        let prober = ScriptedProber::new(5);
        let phases = Phases::default();

        let t = target(6, Model::EdgeRouterX, Operation::Convert, "ubnt", "ubnt");
        mock.add_host(t.host, edge_router_host(3));

        let outcome = Flasher::new(&mock, &prober, &cache, &phases)
            .with_settings(fast())
            .flash(&t);

        assert!(outcome.success(), "{outcome}");
        assert_eq!(prober.rounds(), 6);

        let seen = phases.for_host(t.host);
        let unreachable = seen.iter().position(|p| *p == FlashPhase::Unreachable).unwrap();
        let reachable = seen.iter().position(|p| *p == FlashPhase::Reachable).unwrap();
        assert!(unreachable < reachable);
        assert_eq!(
            &seen[reachable..],
            &[
                FlashPhase::Reachable,
                FlashPhase::Reconnecting(2),
                FlashPhase::Connected(2),
                FlashPhase::Transferred(2),
                FlashPhase::CommandsRunning(2),
                FlashPhase::Done,
            ]
        );

        // ubnt for stage 1, then three refused root logins and one that works.
        let users: Vec<String> = mock.open_attempts().into_iter().map(|(_, u)| u).collect();
        assert_eq!(users, vec!["ubnt", "root", "root", "root", "root"]);

        let remotes: Vec<String> = mock.copies_for(t.host).into_iter().map(|(_, r)| r).collect();
        assert_eq!(
            remotes,
            vec![
                format!("/tmp/{}", erx::FACTORY.filename),
                format!("/tmp/{}", erx::SYSUPGRADE.filename),
            ]
        );
    }

    #[test]
    fn test_two_stage_gives_up_when_silent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), CountingFetcher::new().serve_any(b"img"));
        let mock = MockConnector::new();
        let prober = ScriptedProber::silent();

        let t = target(7, Model::EdgeRouterX, Operation::Convert, "ubnt", "ubnt");
        mock.add_host(t.host, edge_router_host(0));

        let settings = FlashSettings {
            max_probe_rounds: 4,
            ..fast()
        };
        let outcome = Flasher::new(&mock, &prober, &cache, &NullObserver)
            .with_settings(settings)
            .flash(&t);

        assert!(matches!(
            outcome.error,
            Some(FlashError::Unreachable { rounds: 4, .. })
        ));
        assert_eq!(outcome.reached, FlashPhase::Unreachable);
        assert_eq!(prober.rounds(), 4);
    }

    #[test]
    fn test_reconnect_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), CountingFetcher::new().serve_any(b"img"));
        let mock = MockConnector::new();
        let prober = ScriptedProber::new(0);

        let t = target(8, Model::EdgeRouterX, Operation::Convert, "ubnt", "ubnt");
        mock.add_host(t.host, edge_router_host(10));

        let settings = FlashSettings {
            reconnect_max_attempts: Some(3),
            ..fast()
        };
        let outcome = Flasher::new(&mock, &prober, &cache, &NullObserver)
            .with_settings(settings)
            .flash(&t);

        assert!(matches!(
            outcome.error,
            Some(FlashError::Reconnect { attempts: 3, .. })
        ));
        assert_eq!(outcome.reached, FlashPhase::Reconnecting(2));
    }

    #[test]
    fn test_batch_shares_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new()
            .serve_any(b"img")
            .with_delay(Duration::from_millis(20));
        let cache = ImageCache::new(dir.path(), fetcher);
        let mock = MockConnector::new();
        let prober = ScriptedProber::new(0);

        let targets: Vec<Target> = [Model::AcLite, Model::AcLr, Model::AcPro]
            .into_iter()
            .enumerate()
            .map(|(i, m)| target(10 + i as u8, m, Operation::Convert, "ubnt", "ubnt"))
            .collect();
        for t in &targets {
            let plan = Plan::build(t).unwrap();
            mock.add_host(
                t.host,
                scripted(MockHost::new().account("ubnt", "ubnt"), &plan.first.steps, &[]),
            );
        }

        let outcomes = Flasher::new(&mock, &prober, &cache, &NullObserver)
            .with_settings(fast())
            .flash_all(&targets);

        assert!(outcomes.iter().all(FlashOutcome::success));
        let url = crate::catalog::lookup(Operation::Convert, Model::AcLite)
            .unwrap()
            .url;
        assert_eq!(cache.fetcher().count(url), 1);
        for (t, o) in targets.iter().zip(&outcomes) {
            assert_eq!(t.host, o.host);
            assert_eq!(t.mac, o.mac);
        }
    }

    #[test]
    fn test_restore_stops_services_before_copy() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), CountingFetcher::new().serve_any(b"img"));
        let mock = MockConnector::new();
        let prober = ScriptedProber::new(0);

        let t = target(20, Model::AcPro, Operation::Restore, "root", "oakridge");
        let plan = Plan::build(&t).unwrap();
        let host = scripted(MockHost::new().account("root", "oakridge"), &plan.first.prepare, &[]);
        mock.add_host(t.host, scripted(host, &plan.first.steps, &[]));

        let outcome = Flasher::new(&mock, &prober, &cache, &NullObserver)
            .with_settings(fast())
            .flash(&t);
        assert!(outcome.success(), "{outcome}");
        assert!(outcome.optional_failures.is_empty());

        let activity = mock.activity_for(t.host);
        let copy = activity
            .iter()
            .position(|a| *a == Activity::Copy("/tmp/oak.tar.gz".into()))
            .unwrap();
        for step in &plan.first.prepare {
            let run = activity
                .iter()
                .position(|a| *a == Activity::Run(step.command.clone()))
                .unwrap();
            assert!(run < copy, "{} ran after the copy", step.command);
        }
        assert_eq!(activity.len(), plan.first.prepare.len() + 1 + plan.first.steps.len());
    }

    #[test]
    fn test_copy_failure_fails_target() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), CountingFetcher::new().serve_any(b"img"));
        let mock = MockConnector::new();
        let prober = ScriptedProber::new(0);
        let phases = Phases::default();

        let t = target(21, Model::A920, Operation::Upgrade, "root", "oakridge");
        let plan = Plan::build(&t).unwrap();
        mock.add_host(
            t.host,
            scripted(MockHost::new().account("root", "oakridge"), &plan.first.steps, &[])
                .fail_copies(),
        );

        let outcome = Flasher::new(&mock, &prober, &cache, &phases)
            .with_settings(fast())
            .flash(&t);

        assert!(matches!(
            outcome.error,
            Some(FlashError::Transfer { ref file, .. }) if file == "a920.tar.gz"
        ));
        assert_eq!(outcome.reached, FlashPhase::Connected(1));
        assert!(mock.commands_for(t.host).is_empty());
        assert_eq!(phases.for_host(t.host).last(), Some(&FlashPhase::Failed));
    }

    #[test]
    fn test_no_icmp_falls_back_to_login_retries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(dir.path(), CountingFetcher::new().serve_any(b"img"));
        let mock = MockConnector::new();
        let phases = Phases::default();

        let t = target(22, Model::EdgeRouterX, Operation::Convert, "ubnt", "ubnt");
        mock.add_host(t.host, edge_router_host(2));

        let outcome = Flasher::new(&mock, &NoIcmp, &cache, &phases)
            .with_settings(fast())
            .flash(&t);

        assert!(outcome.success(), "{outcome}");
        let seen = phases.for_host(t.host);
        assert!(!seen.contains(&FlashPhase::Reachable));
        let unreachable = seen.iter().position(|p| *p == FlashPhase::Unreachable).unwrap();
        assert_eq!(seen[unreachable + 1], FlashPhase::Reconnecting(2));
        assert_eq!(seen.last(), Some(&FlashPhase::Done));

        let users: Vec<String> = mock.open_attempts().into_iter().map(|(_, u)| u).collect();
        assert_eq!(users, vec!["ubnt", "root", "root", "root"]);
    }
}
