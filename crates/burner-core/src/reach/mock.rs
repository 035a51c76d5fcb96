//! Scripted prober for tests.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ProbeError, ProbeReply, ReachabilityProber};

/// Stays silent for a fixed number of rounds, then answers every probe.
#[derive(Debug, Default)]
pub struct ScriptedProber {
    silent_rounds: usize,
    rounds: AtomicUsize,
}

impl ScriptedProber {
    pub fn new(silent_rounds: usize) -> Self {
        Self {
            silent_rounds,
            rounds: AtomicUsize::new(0),
        }
    }

    /// Never answers.
    pub fn silent() -> Self {
        Self::new(usize::MAX)
    }

    /// Rounds probed so far.
    pub fn rounds(&self) -> usize {
        self.rounds.load(Ordering::SeqCst)
    }
}

impl ReachabilityProber for ScriptedProber {
    fn probe(&self, _host: Ipv4Addr, count: u32) -> Result<Vec<ProbeReply>, ProbeError> {
        let round = self.rounds.fetch_add(1, Ordering::SeqCst);
        let received = round >= self.silent_rounds;
        Ok((0..count.max(1) as u16)
            .map(|seq| ProbeReply {
                seq,
                received,
                rtt: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reach::any_received;

    #[test]
    fn test_scripted_rounds() {
        let prober = ScriptedProber::new(2);
        let host = Ipv4Addr::new(192, 168, 1, 1);

        assert!(!any_received(&prober.probe(host, 5).unwrap()));
        assert!(!any_received(&prober.probe(host, 5).unwrap()));
        assert!(any_received(&prober.probe(host, 5).unwrap()));
        assert_eq!(prober.rounds(), 3);
    }
}
