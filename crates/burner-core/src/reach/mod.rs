//! ICMP reachability probing.
//!
//! Used while a device reboots between the two stages of a conversion or a
//! restore: the orchestrator polls until the host answers before trying to
//! log in again.

pub mod mock;

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

pub use mock::ScriptedProber;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to start probe runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("ICMP socket error: {0}")]
    Socket(String),
}

/// Outcome of one echo request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReply {
    pub seq: u16,
    pub received: bool,
    pub rtt: Option<Duration>,
}

/// Sends echo probes to a host.
pub trait ReachabilityProber: Send + Sync {
    /// Send up to `count` probes and report each one. Stops early on the
    /// first reply.
    fn probe(&self, host: Ipv4Addr, count: u32) -> Result<Vec<ProbeReply>, ProbeError>;
}

/// ICMP echo prober backed by surge-ping. Needs raw-socket privileges.
#[derive(Debug, Clone, Copy)]
pub struct IcmpProber {
    /// Delay between two probes of one round.
    pub interval: Duration,
    /// How long to wait for each reply.
    pub reply_timeout: Duration,
}

impl Default for IcmpProber {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            reply_timeout: Duration::from_secs(1),
        }
    }
}

impl ReachabilityProber for IcmpProber {
    fn probe(&self, host: Ipv4Addr, count: u32) -> Result<Vec<ProbeReply>, ProbeError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        runtime.block_on(async {
            let payload = [0u8; 56];
            let mut replies = Vec::with_capacity(count as usize);

            for seq in 0..count {
                let seq = seq as u16;
                let reply = tokio::time::timeout(
                    self.reply_timeout,
                    surge_ping::ping(IpAddr::V4(host), &payload),
                )
                .await;

                match reply {
                    Ok(Ok((_packet, rtt))) => {
                        debug!(host = %host, seq, rtt_ms = rtt.as_millis() as u64, "Echo reply");
                        replies.push(ProbeReply {
                            seq,
                            received: true,
                            rtt: Some(rtt),
                        });
                        break;
                    }
                    Ok(Err(surge_ping::SurgeError::IOError(e))) => {
                        return Err(ProbeError::Socket(e.to_string()));
                    }
                    Ok(Err(e)) => {
                        trace!(host = %host, seq, error = %e, "Echo failed");
                        replies.push(ProbeReply {
                            seq,
                            received: false,
                            rtt: None,
                        });
                    }
                    Err(_) => {
                        trace!(host = %host, seq, "Echo timed out");
                        replies.push(ProbeReply {
                            seq,
                            received: false,
                            rtt: None,
                        });
                    }
                }

                if seq + 1 < count as u16 {
                    tokio::time::sleep(self.interval).await;
                }
            }
            Ok(replies)
        })
    }
}

/// True when any reply in a round came back.
pub fn any_received(replies: &[ProbeReply]) -> bool {
    replies.iter().any(|r| r.received)
}
