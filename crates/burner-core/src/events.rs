//! Event system for UI decoupling.
//!
//! The scanner and the flasher report progress through an [`Observer`], so a
//! CLI or any other front end can follow along without the core knowing
//! about it.

use std::fmt;
use std::net::Ipv4Addr;

use crate::device::Family;

/// Lifecycle phases of one flashing attempt.
///
/// Stage-carrying phases count from 1; only two-stage plans reach stage 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashPhase {
    /// Nothing done yet.
    Idle,
    /// Every image of the plan is in the local cache.
    ImageReady,
    /// Logged in with the stage credentials.
    Connected(u8),
    /// Stage images copied to the device.
    Transferred(u8),
    /// Running the stage command sequence.
    CommandsRunning(u8),
    /// Stage 1 finished, device is rebooting.
    AwaitingReboot,
    /// Polling until the device answers again.
    Unreachable,
    /// Device answered a probe.
    Reachable,
    /// Retrying login with the next stage's credentials.
    Reconnecting(u8),
    /// Final flash or reboot issued.
    Done,
    /// Attempt abandoned.
    Failed,
}

impl fmt::Display for FlashPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashPhase::Idle => write!(f, "Idle"),
            FlashPhase::ImageReady => write!(f, "Image Ready"),
            FlashPhase::Connected(stage) => write!(f, "Connected (stage {stage})"),
            FlashPhase::Transferred(stage) => write!(f, "Transferred (stage {stage})"),
            FlashPhase::CommandsRunning(stage) => write!(f, "Commands Running (stage {stage})"),
            FlashPhase::AwaitingReboot => write!(f, "Awaiting Reboot"),
            FlashPhase::Unreachable => write!(f, "Unreachable"),
            FlashPhase::Reachable => write!(f, "Reachable"),
            FlashPhase::Reconnecting(stage) => write!(f, "Reconnecting (stage {stage})"),
            FlashPhase::Done => write!(f, "Done"),
            FlashPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Events emitted while scanning and flashing.
#[derive(Debug, Clone)]
pub enum Event {
    /// A subnet scan is starting.
    ScanStarted { cidr: String, hosts: usize },
    /// A host was classified.
    DeviceFound {
        cidr: String,
        host: Ipv4Addr,
        family: Family,
        name: String,
    },
    /// Every host of a subnet has been probed.
    SubnetScanned {
        cidr: String,
        oakridge: usize,
        ubiquiti: usize,
        qts: usize,
    },
    /// An image is available in the local cache.
    ImageReady { filename: String, downloaded: bool },
    /// A flashing attempt changed phase.
    PhaseChanged {
        host: Ipv4Addr,
        from: FlashPhase,
        to: FlashPhase,
    },
    /// A remote command failed. `mandatory` steps end the attempt.
    StepFailed {
        host: Ipv4Addr,
        command: String,
        mandatory: bool,
        message: String,
    },
    /// One probe round finished without a reply.
    ProbeRound { host: Ipv4Addr, round: u32 },
    /// A flashing attempt finished.
    TargetFinished {
        host: Ipv4Addr,
        success: bool,
        message: Option<String>,
    },
}

/// Observer trait for receiving events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait Observer: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &Event);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl Observer for NullObserver {
    fn on_event(&self, _event: &Event) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &Event) {
        match event {
            Event::ScanStarted { cidr, hosts } => {
                tracing::info!(cidr = %cidr, hosts = hosts, "Scanning subnet");
            }
            Event::DeviceFound {
                cidr,
                host,
                family,
                name,
            } => {
                tracing::info!(cidr = %cidr, host = %host, family = %family, name = %name, "Device found");
            }
            Event::SubnetScanned {
                cidr,
                oakridge,
                ubiquiti,
                qts,
            } => {
                tracing::info!(
                    cidr = %cidr,
                    oakridge = oakridge,
                    ubiquiti = ubiquiti,
                    qts = qts,
                    "Subnet scanned"
                );
            }
            Event::ImageReady {
                filename,
                downloaded,
            } => {
                tracing::debug!(file = %filename, downloaded = downloaded, "Image ready");
            }
            Event::PhaseChanged { host, from, to } => {
                tracing::info!(host = %host, from = %from, to = %to, "Phase changed");
            }
            Event::StepFailed {
                host,
                command,
                mandatory,
                message,
            } => {
                if *mandatory {
                    tracing::error!(host = %host, command = %command, "Step failed: {}", message);
                } else {
                    tracing::warn!(host = %host, command = %command, "Optional step failed: {}", message);
                }
            }
            Event::ProbeRound { host, round } => {
                tracing::debug!(host = %host, round = round, "No reply yet");
            }
            Event::TargetFinished {
                host,
                success,
                message,
            } => {
                if *success {
                    tracing::info!(host = %host, "Flashing finished");
                } else {
                    tracing::error!(
                        host = %host,
                        "Flashing failed: {}",
                        message.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(FlashPhase::ImageReady.to_string(), "Image Ready");
        assert_eq!(FlashPhase::Connected(2).to_string(), "Connected (stage 2)");
        assert_eq!(FlashPhase::Reconnecting(2).to_string(), "Reconnecting (stage 2)");
    }
}
