//! End-to-end admission scenarios (spec §8), driven entirely through the
//! public surface of `gatekeeper_pipeline` — no internal module access.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use gatekeeper_clock::{FakeClock, Scheduler};
use gatekeeper_config::{ConfigSnapshot, PolicyConfig};
use gatekeeper_events::EventSink;
use gatekeeper_pipeline::{
    AcceptOutcome, AcceptRequest, AdmissionPipeline, BackendCatalog, BackendRef, DisconnectReason,
    InboundPacket, PacketOutcome,
};
use gatekeeper_verify::Verdict;

struct OneBackendCatalog {
    backend: BackendRef,
}

impl BackendCatalog for OneBackendCatalog {
    fn lookup(&self, name: &str) -> Option<BackendRef> {
        (name == self.backend.name).then(|| self.backend.clone())
    }

    fn attempt_connection_order(&self) -> Vec<String> {
        vec![self.backend.name.clone()]
    }

    fn forced_hosts(&self, _virtual_host: &str) -> Vec<String> {
        Vec::new()
    }
}

fn ip(n: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
}

fn build(cfg: ConfigSnapshot) -> (Arc<AdmissionPipeline<FakeClock>>, FakeClock) {
    let clock = FakeClock::new();
    let scheduler = Scheduler::new();
    let config = PolicyConfig::new(cfg);
    let (events, _stream) = EventSink::new(64);
    let catalog: Arc<dyn BackendCatalog> = Arc::new(OneBackendCatalog {
        backend: BackendRef {
            name: "survival".to_owned(),
            address: "127.0.0.1:25565".to_owned(),
        },
    });
    (
        AdmissionPipeline::new(clock.clone(), config, events, scheduler, catalog),
        clock,
    )
}

fn request(ip: IpAddr, username: &str, virtual_host: &str, is_direct_ip: bool) -> AcceptRequest {
    AcceptRequest {
        ip,
        username: username.to_owned(),
        virtual_host: virtual_host.to_owned(),
        protocol_version: 763,
        is_direct_ip,
    }
}

#[tokio::test(flavor = "current_thread")]
async fn brand_allow_list_accumulates_and_eventually_kicks() {
    let mut cfg = ConfigSnapshot::default();
    cfg.allowed_brands.insert("vanilla".to_owned());
    cfg.kick_threshold = 1;
    let (pipeline, clock) = build(cfg);

    let admitted = match pipeline.on_accept(request(ip(20), "player", "play.example.com", false), clock.now()) {
        AcceptOutcome::Admitted(a) => a,
        other => panic!("expected Admitted, got {other:?}"),
    };

    let outcome = pipeline.on_packet(
        ip(20),
        admitted.session_id,
        InboundPacket::ClientBrand { brand: "sketchy-bot-v2".to_owned() },
        24,
        clock.now(),
    );

    match outcome {
        Ok(PacketOutcome::Verdict(Verdict::FailKick(_))) => {}
        other => panic!("expected the disallowed brand to kick at threshold 1, got {other:?}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn domain_not_in_allow_list_is_rejected_at_admission() {
    let mut cfg = ConfigSnapshot::default();
    cfg.allowed_domains.insert("example.com".to_owned());
    let (pipeline, clock) = build(cfg);

    let outcome = pipeline.on_accept(request(ip(21), "player", "play.evil.net", false), clock.now());
    assert!(matches!(outcome, AcceptOutcome::Rejected(DisconnectReason::DomainNotAllowed)));
}

#[tokio::test(flavor = "current_thread")]
async fn check_only_first_join_skips_world_on_return_visit() {
    let mut cfg = ConfigSnapshot::default();
    cfg.check_only_first_join = true;
    let (pipeline, clock) = build(cfg);

    let first = match pipeline.on_accept(request(ip(22), "regular", "play.example.com", false), clock.now()) {
        AcceptOutcome::Admitted(a) => a,
        other => panic!("expected Admitted, got {other:?}"),
    };
    // Simulate a full human pass: a chat message auto-passes immediately.
    let _ = pipeline.on_packet(
        ip(22),
        first.session_id,
        InboundPacket::Chat { message: "hi".to_owned() },
        8,
        clock.now(),
    );
    pipeline.finish_session(first.session_id, first.registration, clock.now());

    let second = match pipeline.on_accept(request(ip(22), "regular", "play.example.com", false), clock.now()) {
        AcceptOutcome::Admitted(a) => a,
        other => panic!("expected Admitted, got {other:?}"),
    };
    assert!(second.fast_passed, "a previously-passed fingerprint should skip the virtual world");
}

#[tokio::test(flavor = "current_thread")]
async fn direct_ip_connection_rejected_when_disallowed() {
    let mut cfg = ConfigSnapshot::default();
    cfg.allow_direct_ip = false;
    let (pipeline, clock) = build(cfg);

    let outcome = pipeline.on_accept(request(ip(23), "player", "1.2.3.4", true), clock.now());
    assert!(matches!(outcome, AcceptOutcome::Rejected(DisconnectReason::DomainNotAllowed)));
}

#[tokio::test(flavor = "current_thread")]
async fn master_switch_off_bypasses_everything() {
    let mut cfg = ConfigSnapshot::default();
    cfg.enabled = false;
    let (pipeline, clock) = build(cfg);

    // Even a textbook bot username sails through untouched.
    let outcome = pipeline.on_accept(request(ip(24), "asdfghjk", "play.example.com", false), clock.now());
    match outcome {
        AcceptOutcome::Bypass { backend: Some(b) } => assert_eq!(b.name, "survival"),
        other => panic!("expected a bypass with a chosen backend, got {other:?}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn gravity_detector_flags_sustained_ascent() {
    let (pipeline, clock) = build(ConfigSnapshot::default());
    let admitted = match pipeline.on_accept(request(ip(25), "flyer", "play.example.com", false), clock.now()) {
        AcceptOutcome::Admitted(a) => a,
        other => panic!("expected Admitted, got {other:?}"),
    };

    let mut y = 64.0;
    for step in 0..6 {
        y += 5.0;
        let pkt = InboundPacket::Position {
            x: 0.0,
            y,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: false,
        };
        let _ = pipeline.on_packet(ip(25), admitted.session_id, pkt, 32, clock.now());
        clock.advance(Duration::from_millis(400));
        let _ = step;
    }

    let snapshot = pipeline.verify().snapshot(admitted.session_id).expect("session still live");
    assert!(snapshot.score.fail_count > 0, "sustained ascent without ground contact should accrue a fail");
}
