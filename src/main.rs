//! Coordinator process entrypoint: wires storage, the C1-C9 services and
//! the HTTP API together, then serves the axum app.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use yachaq_coordinator::api::{self, AppState};
use yachaq_coordinator::audit::AuditLog;
use yachaq_coordinator::config::Config;
use yachaq_coordinator::escrow::{EscrowOrchestrator, InMemoryEscrowAccount};
use yachaq_coordinator::events::EventBus;
use yachaq_coordinator::lifecycle::LifecycleCoordinator;
use yachaq_coordinator::middleware::{RateLimitConfig, RateLimitLayer};
use yachaq_coordinator::policy::signer::PolicyStampSigner;
use yachaq_coordinator::publication::{NodeRegistry, PublicationService, RegistryPublisher, RendezvousStore};
use yachaq_coordinator::reputation::{RateLimitCaps, ReputationService};
use yachaq_coordinator::storage::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::load();
    info!(bind_addr = %config.bind_addr, data_db_path = %config.data_db_path, "starting coordinator");

    let store = Store::open(&config.data_db_path)?;
    let store_arc = Arc::new(store.clone());
    let audit = AuditLog::new(store.clone());

    let policy_signer = PolicyStampSigner::new(config.policy_stamp_key);
    let integrity_signer = PolicyStampSigner::new(policy_signer.derive_key("integrity-proof"));
    let rendezvous_key = policy_signer.derive_key("rendezvous-session");

    let (per_15m, per_1h, per_24h) = config.rate_limit_caps;
    let reputation = Arc::new(ReputationService::new(
        store_arc.clone(),
        RateLimitCaps { per_15m, per_1h, per_24h },
        config.reputation_decay_rate,
    ));

    let events = Arc::new(EventBus::new(store_arc.clone()));

    let registry = Arc::new(NodeRegistry::new());
    let publisher = Arc::new(RegistryPublisher::new(registry));
    let publication = Arc::new(PublicationService::new(audit.clone(), events.clone(), publisher));

    let escrow_account = Arc::new(InMemoryEscrowAccount::new());
    let escrow = Arc::new(EscrowOrchestrator::new(
        store.clone(),
        audit.clone(),
        events.clone(),
        escrow_account,
        integrity_signer,
    ));

    let lifecycle = Arc::new(LifecycleCoordinator::new(
        store.clone(),
        audit.clone(),
        reputation.clone(),
        publication.clone(),
        events.clone(),
        policy_signer,
        config.policy_version.clone(),
    ));

    let rendezvous = Arc::new(RendezvousStore::new(rendezvous_key));

    spawn_gc_tickers(reputation.clone(), rendezvous.clone());

    let app_state = AppState {
        lifecycle,
        escrow,
        reputation,
        publication,
        events,
        rendezvous,
        audit,
    };

    let ip_limiter = RateLimitLayer::new(RateLimitConfig::default());
    spawn_ip_limiter_cleanup(ip_limiter.clone());

    let app = api::router(app_state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(axum::middleware::from_fn(
            yachaq_coordinator::middleware::logging::request_logging_simple,
        ))
        .layer(axum::middleware::from_fn_with_state(
            ip_limiter,
            yachaq_coordinator::middleware::rate_limit::rate_limit_middleware,
        ));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(bind_addr = %config.bind_addr, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Per-minute cleanup of the IP rate limiter's sliding-window state, this
/// perimeter guard sits ahead of C5's per-requester reputation-scaled
/// limiter: it bounds anonymous/unauthenticated flooding before a
/// requester identity is even established.
fn spawn_ip_limiter_cleanup(limiter: RateLimitLayer) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            limiter.cleanup();
        }
    });
}

/// Hourly reputation GC sweep + per-minute rendezvous expiry sweep
/// (spec §4.5, §4.6), following the teacher's `tokio::spawn` +
/// `tokio::time::interval` background-task idiom.
fn spawn_gc_tickers(reputation: Arc<ReputationService>, rendezvous: Arc<RendezvousStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60 * 60));
        loop {
            ticker.tick().await;
            reputation.gc();
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            rendezvous.sweep_expired();
        }
    });
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("yachaq_coordinator=info"));
    if tracing_subscriber::registry().with(filter).with(fmt::layer()).try_init().is_err() {
        warn!("tracing subscriber already initialised");
    }
}
