//! Remote shell layer.

pub mod mock;
pub mod ssh;
pub mod traits;

pub use mock::{Activity, MockConnector, MockHost, MockSession};
pub use ssh::{SshConnector, SshSession};
pub use traits::{CommandOutput, Connector, Credentials, RemoteSession, SessionError};
