//! `gatekeeperd`: demonstration wiring that binds the admission pipeline to
//! a real TCP listener. Not a product surface — the wire codec and the
//! backend proxy it hands connections off to are out of scope (spec §1);
//! this binary exists so the workspace is runnable end to end, the way
//! `valence_network::NetworkPlugin` needs a `bevy_app::App` to bind a
//! socket at all.

mod backend;

use std::sync::Arc;
use std::time::Duration;

use gatekeeper_clock::{Clock, Scheduler, SystemClock};
use gatekeeper_config::{ConfigSnapshot, PolicyConfig};
use gatekeeper_events::EventSink;
use gatekeeper_pipeline::{AcceptOutcome, AcceptRequest, AdmissionPipeline, BackendCatalog};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use backend::{NullBackendConnector, StaticBackendCatalog};

const LISTEN_ADDR: &str = "0.0.0.0:25565";
const MAX_INFLIGHT_CONNECTIONS: usize = 512;
const JANITOR_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let clock = SystemClock::new();
    let scheduler = Scheduler::new();
    let config = PolicyConfig::new(ConfigSnapshot::default());
    let (events, _event_stream) = EventSink::new(1024);

    let catalog: Arc<dyn BackendCatalog> = Arc::new(StaticBackendCatalog::new(vec![(
        "survival".to_owned(),
        "127.0.0.1:25566".to_owned(),
    )]));
    let connector = Arc::new(NullBackendConnector);

    let pipeline = AdmissionPipeline::new(clock.clone(), config, events, scheduler, catalog);

    let janitor = tokio::spawn(run_janitor(Arc::clone(&pipeline), clock.clone()));

    let listener = tokio::net::TcpListener::bind(LISTEN_ADDR).await?;
    info!(addr = LISTEN_ADDR, "gatekeeperd listening");

    let sema = Arc::new(Semaphore::new(MAX_INFLIGHT_CONNECTIONS));
    let mut inflight = JoinSet::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested, draining in-flight connections");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, remote_addr)) => {
                        let Ok(permit) = Arc::clone(&sema).try_acquire_owned() else {
                            warn!(peer = %remote_addr, "too many in-flight connections, dropping");
                            continue;
                        };
                        let pipeline = Arc::clone(&pipeline);
                        let connector = Arc::clone(&connector);
                        let clock = clock.clone();
                        inflight.spawn(async move {
                            handle_connection(pipeline, connector, clock, stream, remote_addr).await;
                            drop(permit);
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept incoming connection"),
                }
            }
        }
    }

    janitor.abort();

    let drain = async {
        while inflight.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("shutdown grace period elapsed with connections still in flight");
    }

    Ok(())
}

/// Runs the registry/throttle janitor sweep (spec §4.2, §5) on a fixed
/// cadence for as long as the process is up.
async fn run_janitor<C>(pipeline: Arc<AdmissionPipeline<C>>, clock: C)
where
    C: Clock + Clone + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
    loop {
        ticker.tick().await;
        pipeline.sweep(clock.now());
    }
}

/// Drives a single accepted TCP connection through `on_accept` and, once
/// admitted, straight to handoff. No wire codec is wired in here (spec
/// §1), so there is no `on_packet` loop driving live verification packets
/// for this demonstration binary — the admission decision and handoff path
/// are what is exercised end to end.
async fn handle_connection<C>(
    pipeline: Arc<AdmissionPipeline<C>>,
    connector: Arc<NullBackendConnector>,
    clock: C,
    stream: TcpStream,
    remote_addr: std::net::SocketAddr,
) where
    C: Clock + Clone + Send + Sync + 'static,
{
    if let Err(e) = stream.set_nodelay(true) {
        warn!(peer = %remote_addr, error = %e, "failed to set TCP_NODELAY");
    }

    let req = AcceptRequest {
        ip: remote_addr.ip(),
        username: format!("conn-{}", remote_addr.port()),
        virtual_host: LISTEN_ADDR.to_owned(),
        protocol_version: 0,
        is_direct_ip: true,
    };

    match pipeline.on_accept(req, clock.now()) {
        AcceptOutcome::Bypass { backend } => {
            info!(peer = %remote_addr, backend = ?backend.map(|b| b.name), "connection bypassed admission checks");
        }
        AcceptOutcome::Rejected(reason) => {
            info!(peer = %remote_addr, ?reason, "connection rejected at admission");
        }
        AcceptOutcome::Admitted(admitted) => {
            info!(
                peer = %remote_addr,
                session = %admitted.session_id,
                fast_passed = admitted.fast_passed,
                "connection admitted"
            );
            let result = pipeline
                .handoff(connector.as_ref(), &admitted.backend, stream, admitted.session_id)
                .await;
            if let Err(err) = result {
                warn!(session = %admitted.session_id, %err, "handoff failed");
            }
            pipeline.finish_session(admitted.session_id, admitted.registration, clock.now());
        }
    }
}
