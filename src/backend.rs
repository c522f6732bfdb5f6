//! Stand-ins for the backend catalog and outbound connector collaborators
//! (spec §1, §6): both are named interfaces the admission pipeline depends
//! on but never implements itself. `StaticBackendCatalog` round-robins a
//! fixed backend list; `NullBackendConnector` logs the handoff instead of
//! actually proxying bytes to an upstream server.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use gatekeeper_pipeline::{BackendCatalog, BackendConnector, BackendRef, ConnectFailure};
use tokio::net::TcpStream;
use tracing::info;

pub struct StaticBackendCatalog {
    backends: Vec<BackendRef>,
    cursor: AtomicUsize,
}

impl StaticBackendCatalog {
    pub fn new(backends: Vec<(String, String)>) -> Self {
        Self {
            backends: backends
                .into_iter()
                .map(|(name, address)| BackendRef { name, address })
                .collect(),
            cursor: AtomicUsize::new(0),
        }
    }
}

impl BackendCatalog for StaticBackendCatalog {
    fn lookup(&self, name: &str) -> Option<BackendRef> {
        self.backends.iter().find(|b| b.name == name).cloned()
    }

    /// Rotates the starting point on every call so repeated lookups spread
    /// load across the configured backends instead of favoring the first.
    fn attempt_connection_order(&self) -> Vec<String> {
        if self.backends.is_empty() {
            return Vec::new();
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % self.backends.len();
        self.backends
            .iter()
            .cycle()
            .skip(start)
            .take(self.backends.len())
            .map(|b| b.name.clone())
            .collect()
    }

    fn forced_hosts(&self, _virtual_host: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Logs the handoff instead of proxying bytes to a real upstream server.
/// The outbound connector and wire codec are out of scope for this crate
/// (spec §1); this is demonstration wiring so the binary is runnable.
pub struct NullBackendConnector;

#[async_trait]
impl BackendConnector<TcpStream> for NullBackendConnector {
    async fn connect(&self, backend: &BackendRef, conn: TcpStream) -> Result<(), ConnectFailure<TcpStream>> {
        info!(backend = %backend.name, address = %backend.address, "handed off connection (demo connector)");
        drop(conn);
        Ok(())
    }
}
