use async_trait::async_trait;

use crate::PipelineError;

/// A resolved backend server, as handed back by [`BackendCatalog::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRef {
    pub name: String,
    pub address: String,
}

/// The backend-server catalog: an external collaborator, out of scope for
/// this crate beyond this interface (spec §6).
pub trait BackendCatalog: Send + Sync {
    fn lookup(&self, name: &str) -> Option<BackendRef>;
    fn attempt_connection_order(&self) -> Vec<String>;
    fn forced_hosts(&self, virtual_host: &str) -> Vec<String>;
}

/// Returned by [`BackendConnector::connect`] on failure: hands the inbound
/// connection back to the caller so a retry (spec §4.6, §7) doesn't need
/// `Conn: Clone` — most real connection types (a `TcpStream`) aren't.
pub struct ConnectFailure<Conn> {
    pub conn: Conn,
    pub error: PipelineError,
}

/// Initiates the outbound connection to a chosen backend and hands the
/// accepted connection over to it. Generic over the concrete connection
/// type `Conn` the codec collaborator produces, since this crate never
/// inspects it beyond forwarding.
#[async_trait]
pub trait BackendConnector<Conn>: Send + Sync
where
    Conn: Send + 'static,
{
    async fn connect(&self, backend: &BackendRef, conn: Conn) -> Result<(), ConnectFailure<Conn>>;
}
