//! Huddle server binary.
//!
//! Loads configuration, wires the engine to its adapters and serves the chat
//! WebSocket endpoint until SIGINT/SIGTERM.

use std::sync::Arc;

use http::{HeaderValue, Method};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use huddle::adapters::auth::{JwtSessionValidator, JwtValidatorConfig};
use huddle::adapters::memory::{InMemoryMessageStore, InMemoryReadMarkerStore, StaticAccessChecker};
use huddle::adapters::websocket::{websocket_router, WebSocketState};
use huddle::application::{
    BroadcastRouter, ChannelSequencer, ChatGateway, ConnectionRegistry, GatewayConfig,
    PresencePolicy, PresenceTracker, SequencerConfig, TypingAggregator,
};
use huddle::config::{AppConfig, ServerConfig};
use huddle::ports::{AccessChecker, RoomBroadcaster};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config.server);

    let gateway = Arc::new(build_gateway(&config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.run_maintenance(shutdown_rx).await })
    };

    let app = websocket_router()
        .with_state(WebSocketState::new(gateway))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(config.server.request_timeout()))
                .layer(cors_layer(&config.server)),
        );

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "huddle listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = maintenance.await;
    tracing::info!("huddle stopped");
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if server.is_production() {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

fn build_gateway(config: &AppConfig) -> ChatGateway {
    let realtime = &config.realtime;

    let validator = Arc::new(JwtSessionValidator::new(JwtValidatorConfig {
        secret: config.auth.jwt_secret.clone(),
        issuer: config.auth.jwt_issuer.clone(),
        audience: config.auth.jwt_audience.clone(),
        leeway_secs: config.auth.jwt_leeway_secs,
    }));
    let registry = Arc::new(ConnectionRegistry::new(validator, realtime.outbound_buffer));
    let broadcaster: Arc<dyn RoomBroadcaster> = Arc::new(BroadcastRouter::new(
        registry.clone(),
        realtime.delivery_retry(),
    ));
    let access: Arc<dyn AccessChecker> = Arc::new(StaticAccessChecker::allow_all().authors_only());

    let sequencer = ChannelSequencer::new(
        Arc::new(InMemoryMessageStore::new()),
        access.clone(),
        broadcaster.clone(),
        SequencerConfig {
            queue_capacity: realtime.sequencer_queue,
            idle_timeout: realtime.sequencer_idle(),
            ..SequencerConfig::default()
        },
    );

    ChatGateway::new(
        registry,
        Arc::new(PresenceTracker::new(PresencePolicy {
            heartbeat_timeout: realtime.heartbeat_timeout(),
            grace: realtime.presence_grace(),
        })),
        Arc::new(TypingAggregator::new(realtime.typing_ttl())),
        sequencer,
        broadcaster,
        access,
        Arc::new(InMemoryReadMarkerStore::new()),
        GatewayConfig {
            heartbeat_timeout: realtime.heartbeat_timeout(),
            sweep_interval: realtime.sweep_interval(),
            max_message_length: realtime.max_message_length,
        },
    )
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let layer = CorsLayer::new().allow_methods([Method::GET]);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
