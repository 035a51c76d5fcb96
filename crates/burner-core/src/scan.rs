//! Concurrent subnet scanning.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use tracing::{info, instrument};

use crate::classify::Classifier;
use crate::device::{Device, Family};
use crate::events::{Event, Observer};
use crate::session::Connector;
use crate::subnet::{self, SubnetError};

/// Default number of classification threads per subnet.
pub const DEFAULT_WORKERS: usize = 256;

/// Devices found on one subnet, grouped by family.
///
/// EdgeRouters are listed with the Ubiquiti APs.
#[derive(Debug, Clone, Default)]
pub struct SubnetScan {
    pub cidr: String,
    pub excluded: Vec<Ipv4Addr>,
    pub oakridge: Vec<Device>,
    pub ubiquiti: Vec<Device>,
    pub qts: Vec<Device>,
    /// Set once every candidate host has been probed.
    pub complete: bool,
}

impl SubnetScan {
    fn new(cidr: &str, excluded: &[Ipv4Addr]) -> Self {
        Self {
            cidr: cidr.to_string(),
            excluded: excluded.to_vec(),
            ..Default::default()
        }
    }

    fn insert(&mut self, device: Device) {
        match device.family() {
            Family::Oakridge => self.oakridge.push(device),
            Family::UbiquitiAp | Family::UbiquitiEdgeRouter => self.ubiquiti.push(device),
            Family::Qts => self.qts.push(device),
        }
    }

    /// Every record, Oakridge first.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.oakridge
            .iter()
            .chain(self.ubiquiti.iter())
            .chain(self.qts.iter())
    }

    pub fn total(&self) -> usize {
        self.oakridge.len() + self.ubiquiti.len() + self.qts.len()
    }

    /// `<cidr>: N Oakridge, N UBNT, N QTS devices`
    pub fn one_line_summary(&self) -> String {
        format!(
            "{}: {} Oakridge, {} UBNT, {} QTS devices",
            self.cidr,
            self.oakridge.len(),
            self.ubiquiti.len(),
            self.qts.len()
        )
    }
}

/// Classifies every host of a subnet in parallel.
///
/// Worker threads only classify; the calling thread owns the result and
/// receives records over a channel, so the lists are never shared.
pub struct Scanner<'a, C: Connector> {
    classifier: Classifier<'a, C>,
    observer: &'a dyn Observer,
    workers: usize,
}

impl<'a, C: Connector> Scanner<'a, C> {
    pub fn new(classifier: Classifier<'a, C>, observer: &'a dyn Observer) -> Self {
        Self {
            classifier,
            observer,
            workers: DEFAULT_WORKERS,
        }
    }

    /// Upper bound on concurrent classifications. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Scan one subnet. Returns after every candidate host has been probed.
    #[instrument(skip(self, exclude))]
    pub fn scan(&self, cidr: &str, exclude: &[Ipv4Addr]) -> Result<SubnetScan, SubnetError> {
        let hosts = subnet::hosts(cidr, exclude)?;
        let mut result = SubnetScan::new(cidr, exclude);

        self.observer.on_event(&Event::ScanStarted {
            cidr: cidr.to_string(),
            hosts: hosts.len(),
        });

        let next = AtomicUsize::new(0);
        let workers = self.workers.min(hosts.len());

        thread::scope(|s| {
            let (tx, rx) = mpsc::channel::<Device>();
            let hosts = &hosts;
            let next = &next;
            let classifier = &self.classifier;

            for _ in 0..workers {
                let tx = tx.clone();
                s.spawn(move || {
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(&host) = hosts.get(i) else {
                            break;
                        };
                        if let Some(device) = classifier.classify(host) {
                            if tx.send(device).is_err() {
                                break;
                            }
                        }
                    }
                });
            }
            drop(tx);

            for device in rx {
                self.observer.on_event(&Event::DeviceFound {
                    cidr: cidr.to_string(),
                    host: device.ipv4,
                    family: device.family(),
                    name: device.display_name.clone(),
                });
                result.insert(device);
            }
        });

        result.complete = true;
        info!("{}", result.one_line_summary());
        self.observer.on_event(&Event::SubnetScanned {
            cidr: cidr.to_string(),
            oakridge: result.oakridge.len(),
            ubiquiti: result.ubiquiti.len(),
            qts: result.qts.len(),
        });
        Ok(result)
    }

    /// Scan several subnets one after another. An invalid network aborts the
    /// whole run before anything is probed.
    pub fn scan_all(
        &self,
        networks: &[String],
        exclude: &[Ipv4Addr],
    ) -> Result<Vec<SubnetScan>, SubnetError> {
        for cidr in networks {
            subnet::hosts(cidr, exclude)?;
        }
        networks.iter().map(|cidr| self.scan(cidr, exclude)).collect()
    }
}
