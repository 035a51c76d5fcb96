//! Burner-Core: discovery and firmware lifecycle for access points and
//! routers.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Session**: remote shell abstraction (ssh2, mock)
//! - **Reach**: ICMP reachability probing (surge-ping, scripted)
//! - **Subnet**: IPv4 host enumeration and local network discovery
//! - **Classify**: ordered vendor fingerprinting of single hosts
//! - **Scan**: concurrent classification of whole subnets
//! - **Catalog**: image table, download-once cache and version lookup
//! - **Flash**: plans and the convert/upgrade/restore orchestrator
//! - **Events**: observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use burner_core::{Classifier, Scanner, SshConnector, TracingObserver};
//!
//! let connector = SshConnector::new();
//! let scanner = Scanner::new(Classifier::new(&connector), &TracingObserver);
//! let scan = scanner.scan("192.168.1.0/24", &[]).expect("invalid network");
//! for device in scan.devices() {
//!     println!("{}", device.summary());
//! }
//! ```

pub mod catalog;
pub mod classify;
pub mod config;
pub mod device;
pub mod events;
pub mod flash;
pub mod model;
pub mod reach;
pub mod scan;
pub mod session;
pub mod subnet;
pub mod targets;

// Re-exports for convenience
pub use catalog::{CatalogError, HttpFetcher, ImageCache, VersionSource};
pub use classify::Classifier;
pub use config::BurnerConfig;
pub use device::{Device, DeviceKind, Family};
pub use events::{Event, FlashPhase, NullObserver, Observer, TracingObserver};
pub use flash::{FlashError, FlashOutcome, FlashSettings, Flasher};
pub use model::Model;
pub use reach::{IcmpProber, ReachabilityProber};
pub use scan::{Scanner, SubnetScan};
pub use session::{Connector, Credentials, RemoteSession, SessionError, SshConnector};
pub use subnet::SubnetError;
pub use targets::{Operation, Target, targets_for};
