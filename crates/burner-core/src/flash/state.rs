//! Phase tracking for one flashing attempt.

use std::net::Ipv4Addr;

use crate::events::{Event, FlashPhase, Observer};

/// Current and furthest phase of one attempt.
pub struct FlashState<'a> {
    host: Ipv4Addr,
    phase: FlashPhase,
    reached: FlashPhase,
    observer: &'a dyn Observer,
}

impl<'a> FlashState<'a> {
    pub fn new(host: Ipv4Addr, observer: &'a dyn Observer) -> Self {
        Self {
            host,
            phase: FlashPhase::Idle,
            reached: FlashPhase::Idle,
            observer,
        }
    }

    pub fn phase(&self) -> FlashPhase {
        self.phase
    }

    /// Last phase entered before a failure.
    pub fn reached(&self) -> FlashPhase {
        self.reached
    }

    pub fn goto(&mut self, to: FlashPhase) {
        tracing::debug!(host = %self.host, from = %self.phase, to = %to, "State transition");
        self.observer.on_event(&Event::PhaseChanged {
            host: self.host,
            from: self.phase,
            to,
        });
        if to != FlashPhase::Failed {
            self.reached = to;
        }
        self.phase = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;

    #[test]
    fn test_reached_survives_failure() {
        let mut state = FlashState::new(Ipv4Addr::new(10, 0, 0, 1), &NullObserver);
        state.goto(FlashPhase::ImageReady);
        state.goto(FlashPhase::Connected(1));
        state.goto(FlashPhase::Failed);
        assert_eq!(state.phase(), FlashPhase::Failed);
        assert_eq!(state.reached(), FlashPhase::Connected(1));
    }
}
