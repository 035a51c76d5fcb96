//! Per-operation flashing plans.
//!
//! A plan is pure data: which images go where, which commands run in what
//! order, and whether the device must reboot into a second stage.

use std::time::Duration;

use crate::catalog::{self, CatalogError, ImageSpec, erx};
use crate::model::{FirmwareLine, Model};
use crate::session::Credentials;
use crate::targets::{Operation, Target};

/// How a failing step affects the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Failure ends the attempt.
    Mandatory,
    /// Failure is logged and the sequence continues.
    Optional,
}

/// One remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub command: String,
    pub requirement: Requirement,
    /// A dropped connection counts as success. Set on commands that reboot
    /// or reflash the device underneath the session.
    pub accepts_disconnect: bool,
}

impl Step {
    pub fn mandatory(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            requirement: Requirement::Mandatory,
            accepts_disconnect: false,
        }
    }

    pub fn optional(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            requirement: Requirement::Optional,
            accepts_disconnect: false,
        }
    }

    /// Mandatory command that takes the device down.
    pub fn reboot(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            requirement: Requirement::Mandatory,
            accepts_disconnect: true,
        }
    }

    pub fn is_mandatory(&self) -> bool {
        self.requirement == Requirement::Mandatory
    }
}

/// One image copied to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub image: ImageSpec,
    pub remote: String,
}

impl Transfer {
    fn to(image: ImageSpec, remote: &str) -> Self {
        Self {
            image,
            remote: remote.to_string(),
        }
    }

    /// Copy under the same name into `/tmp`.
    fn to_tmp(image: ImageSpec) -> Self {
        Self {
            remote: format!("/tmp/{}", image.filename),
            image,
        }
    }
}

/// Everything done over one login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub credentials: Credentials,
    /// Run before anything is copied.
    pub prepare: Vec<Step>,
    pub transfers: Vec<Transfer>,
    pub steps: Vec<Step>,
}

/// Waiting for a device to come back between two stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reboot {
    /// Fixed wait before the first probe.
    pub settle: Duration,
    /// Probes per reachability round.
    pub probes_per_round: u32,
    /// Delay between login attempts.
    pub reconnect_interval: Duration,
}

/// The full sequence for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub first: Stage,
    /// Reboot wait and stage run after the device comes back.
    pub second: Option<(Reboot, Stage)>,
}

const UNIFI_SYSUPGRADE_BIN: &str = "/tmp/openwrt-ar71xx-generic-ubnt-unifi-squashfs-sysupgrade.bin";
const AP152_SYSUPGRADE_BIN: &str = "/tmp/openwrt-ar71xx-generic-ap152-16M-squashfs-sysupgrade.bin";
const ERX_INITRAMFS: &str = "/tmp/lede-ramips-mt7621-ubnt-erx-initramfs-factory.tar";
const ERX_SYSUPGRADE_BIN: &str = "/tmp/lede-ramips-mt7621-ubnt-erx-squashfs-sysupgrade.bin";
const VYATTA: &str = "/opt/vyatta/bin/vyatta-op-cmd-wrapper";

fn untar(remote: &str) -> Step {
    Step::mandatory(format!("tar xzf {remote} -C /tmp"))
}

fn remove(remote: &str) -> Step {
    Step::mandatory(format!("rm -rvf {remote}"))
}

fn stop_services(with_supervisor: bool) -> Vec<Step> {
    let mut steps = vec![Step::optional("stop")];
    if with_supervisor {
        steps.push(Step::optional("/etc/init.d/supervisor stop"));
    }
    steps.extend(
        ["capwap", "handle_cloud", "wifidog", "arpwatch"]
            .into_iter()
            .map(|svc| Step::optional(format!("/etc/init.d/{svc} stop"))),
    );
    steps
}

fn root() -> Credentials {
    Credentials::new("root", "oakridge")
}

impl Plan {
    /// Plan for `target`, or [`CatalogError::NoImage`] when the catalog has
    /// no image for its model and operation.
    pub fn build(target: &Target) -> Result<Plan, CatalogError> {
        let creds = target.credentials.clone();
        match (target.operation, target.model) {
            (Operation::Convert, Model::EdgeRouterX) => Ok(Self::convert_edge_router(creds)),
            (Operation::Restore, Model::EdgeRouterX) => Ok(Self::restore_edge_router(creds)),
            (Operation::Convert, model) => {
                let image = catalog::lookup(Operation::Convert, model)?;
                Ok(match model.line() {
                    FirmwareLine::Unifi => Self::convert_unifi(creds, image),
                    _ => Self::convert_ap152(creds, image),
                })
            }
            (Operation::Upgrade, model) => {
                let image = catalog::lookup(Operation::Upgrade, model)?;
                Ok(Self::upgrade(creds, image))
            }
            (Operation::Restore, model) => {
                let image = catalog::lookup(Operation::Restore, model)?;
                Ok(Self::restore_ap(creds, image))
            }
        }
    }

    fn single(stage: Stage) -> Plan {
        Plan {
            first: stage,
            second: None,
        }
    }

    fn convert_unifi(credentials: Credentials, image: ImageSpec) -> Plan {
        let remote = "/tmp/oakridge.tar.gz";
        Self::single(Stage {
            credentials,
            prepare: Vec::new(),
            transfers: vec![Transfer::to(image, remote)],
            steps: vec![
                untar(remote),
                remove(remote),
                Step::mandatory(format!(
                    "dd if={UNIFI_SYSUPGRADE_BIN} of=/tmp/kernel0.bin bs=7929856 count=1"
                )),
                Step::mandatory(format!(
                    "dd if={UNIFI_SYSUPGRADE_BIN} of=/tmp/kernel1.bin bs=7929856 count=1 skip=1"
                )),
                Step::mandatory("mtd write /tmp/kernel0.bin kernel0"),
                Step::mandatory("mtd write /tmp/kernel1.bin kernel1"),
                Step::reboot("reboot"),
            ],
        })
    }

    fn convert_ap152(credentials: Credentials, image: ImageSpec) -> Plan {
        let transfer = Transfer::to_tmp(image);
        let steps = vec![
            untar(&transfer.remote),
            Step::reboot(format!("sysupgrade -n {AP152_SYSUPGRADE_BIN}")),
        ];
        Self::single(Stage {
            credentials,
            prepare: Vec::new(),
            transfers: vec![transfer],
            steps,
        })
    }

    fn convert_edge_router(credentials: Credentials) -> Plan {
        let factory = Transfer::to_tmp(erx::FACTORY);
        let sysupgrade = Transfer::to_tmp(erx::SYSUPGRADE);
        Plan {
            first: Stage {
                credentials,
                prepare: Vec::new(),
                steps: vec![
                    untar(&factory.remote),
                    Step::mandatory(format!("{VYATTA} add system image {ERX_INITRAMFS}")),
                    Step::reboot(format!("{VYATTA} reboot now")),
                ],
                transfers: vec![factory],
            },
            second: Some((
                Reboot {
                    settle: Duration::ZERO,
                    probes_per_round: 5,
                    reconnect_interval: Duration::from_secs(1),
                },
                Stage {
                    credentials: root(),
                    prepare: Vec::new(),
                    steps: vec![
                        untar(&sysupgrade.remote),
                        Step::reboot(format!("sysupgrade -n {ERX_SYSUPGRADE_BIN}")),
                    ],
                    transfers: vec![sysupgrade],
                },
            )),
        }
    }

    fn upgrade(credentials: Credentials, image: ImageSpec) -> Plan {
        let remote = "/tmp/oak.tar.gz";
        let mut steps = vec![Step::optional("echo 'Auto Upgrade Now...'|logger -p2")];
        steps.extend(stop_services(false));
        steps.extend([
            untar(remote),
            remove(remote),
            Step::reboot("sysupgrade -n /tmp/*-squashfs-sysupgrade.bin"),
        ]);
        Self::single(Stage {
            credentials,
            prepare: Vec::new(),
            transfers: vec![Transfer::to(image, remote)],
            steps,
        })
    }

    fn restore_ap(credentials: Credentials, image: ImageSpec) -> Plan {
        let remote = "/tmp/oak.tar.gz";
        Self::single(Stage {
            credentials,
            prepare: stop_services(true),
            transfers: vec![Transfer::to(image, remote)],
            steps: vec![
                untar(remote),
                remove(remote),
                Step::mandatory("mtd write /tmp/firmware.bin firmware"),
                Step::reboot("reboot"),
            ],
        })
    }

    fn restore_edge_router(credentials: Credentials) -> Plan {
        let recover = Transfer::to_tmp(erx::RECOVER);
        let first_steps = vec![
            untar(&recover.remote),
            Step::reboot("sysupgrade -n /tmp/recover-ubnt-erx.tar"),
        ];

        let vmlinux = format!("/tmp/{}", erx::VMLINUX.filename);
        let second_steps = vec![
            Step::mandatory("ubidetach -m 5"),
            Step::mandatory("ubiformat /dev/mtd5"),
            Step::mandatory("ubiattach -p /dev/mtd5"),
            Step::mandatory("ubimkvol /dev/ubi0 --vol_id=0 --lebs=1925 --name=troot"),
            Step::mandatory("mount -o sync -t ubifs ubi0:troot /mnt"),
            Step::mandatory(format!("mtd write {vmlinux} kernel1")),
            Step::mandatory(format!("mtd write {vmlinux} kernel2")),
            Step::mandatory(format!("cp /tmp/{} /mnt/version", erx::VERSION.filename)),
            Step::mandatory(format!("cp /tmp/{} /mnt/squashfs.img", erx::SQUASHFS.filename)),
            Step::mandatory(format!(
                "cp /tmp/{} /mnt/squashfs.img.md5",
                erx::SQUASHFS_MD5.filename
            )),
            Step::reboot("reboot"),
        ];

        Plan {
            first: Stage {
                credentials,
                prepare: stop_services(true),
                transfers: vec![recover],
                steps: first_steps,
            },
            second: Some((
                Reboot {
                    settle: Duration::from_secs(20),
                    probes_per_round: 30,
                    reconnect_interval: Duration::from_secs(2),
                },
                Stage {
                    credentials: root(),
                    prepare: Vec::new(),
                    transfers: [erx::SQUASHFS, erx::SQUASHFS_MD5, erx::VERSION, erx::VMLINUX]
                        .into_iter()
                        .map(Transfer::to_tmp)
                        .collect(),
                    steps: second_steps,
                },
            )),
        }
    }

    /// Stages in execution order.
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        std::iter::once(&self.first).chain(self.second.as_ref().map(|(_, s)| s))
    }

    /// Every distinct image the plan needs.
    pub fn images(&self) -> Vec<ImageSpec> {
        let mut images: Vec<ImageSpec> = Vec::new();
        for transfer in self.stages().flat_map(|s| s.transfers.iter()) {
            if !images.contains(&transfer.image) {
                images.push(transfer.image);
            }
        }
        images
    }
}
