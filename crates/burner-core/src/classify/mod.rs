//! Host classification.
//!
//! A host is fingerprinted by an ordered chain of vendor probes. Each probe
//! logs in with its own credentials, runs vendor-specific queries and either
//! produces a [`Device`] or reports a mismatch. The first probe that matches
//! decides the family; later probes are not tried.

pub mod parse;
mod probes;

use std::net::Ipv4Addr;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use crate::device::{Device, Family};
use crate::session::{Connector, Credentials, RemoteSession, SessionError};

/// Default login timeout for fingerprinting.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Missing field `{0}`")]
    MissingField(&'static str),

    #[error("Unsupported {what}: {value}")]
    Unsupported { what: &'static str, value: String },
}

/// Vendor-specific queries run on an authenticated session.
pub type QueryFn = fn(&mut dyn RemoteSession) -> Result<Device, ClassifyError>;

/// One step of the classification chain.
#[derive(Clone, Copy)]
pub struct VendorProbe {
    pub family: Family,
    pub user: &'static str,
    pub password: &'static str,
    pub query: QueryFn,
}

impl VendorProbe {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.user, self.password)
    }
}

impl std::fmt::Debug for VendorProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorProbe")
            .field("family", &self.family)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// The fixed probe order.
pub const PROBES: [VendorProbe; 4] = [
    VendorProbe {
        family: Family::Oakridge,
        user: "root",
        password: "oakridge",
        query: probes::query_oakridge,
    },
    VendorProbe {
        family: Family::UbiquitiAp,
        user: "ubnt",
        password: "ubnt",
        query: probes::query_ubiquiti_ap,
    },
    VendorProbe {
        family: Family::UbiquitiEdgeRouter,
        user: "ubnt",
        password: "ubnt",
        query: probes::query_edge_router,
    },
    VendorProbe {
        family: Family::Qts,
        user: "admin",
        password: "admin",
        query: probes::query_qts,
    },
];

/// Runs the probe chain against single hosts.
pub struct Classifier<'a, C: Connector> {
    connector: &'a C,
    probes: &'a [VendorProbe],
    timeout: Duration,
}

impl<'a, C: Connector> Classifier<'a, C> {
    pub fn new(connector: &'a C) -> Self {
        Self {
            connector,
            probes: &PROBES,
            timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_probes(mut self, probes: &'a [VendorProbe]) -> Self {
        self.probes = probes;
        self
    }

    /// Classify `host`, or `None` when no probe matches.
    ///
    /// A connect timeout means nothing answers on the SSH port, so the
    /// remaining probes are skipped. A login that stalls after the port
    /// answered moves on to the next probe like any other failure.
    pub fn classify(&self, host: Ipv4Addr) -> Option<Device> {
        for probe in self.probes {
            match self.try_probe(host, probe) {
                Ok(device) => {
                    debug!(host = %host, family = %probe.family, "Classified");
                    return Some(device);
                }
                Err(ClassifyError::Session(SessionError::Timeout { .. })) => {
                    trace!(host = %host, "No SSH service");
                    return None;
                }
                Err(e) => {
                    debug!(host = %host, family = %probe.family, error = %e, "Probe mismatch");
                }
            }
        }
        None
    }

    fn try_probe(&self, host: Ipv4Addr, probe: &VendorProbe) -> Result<Device, ClassifyError> {
        let mut session = self
            .connector
            .open(host, &probe.credentials(), self.timeout)?;
        let result = (probe.query)(&mut session);
        session.close();
        result
    }
}
