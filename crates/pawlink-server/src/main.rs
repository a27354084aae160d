mod config;
mod weather;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use pawlink_api::state::AppStateInner;
use pawlink_db::Database;
use pawlink_gateway::connection::{self, Gateway};
use pawlink_gateway::registry::Registry;

use crate::config::ServerConfig;
use crate::weather::WeatherMonitor;

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pawlink=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Shared state
    let registry = Registry::new();
    let app_state = AppStateInner::new(db, registry.clone(), config.jwt_secret.clone());
    let gateway = Gateway::new(registry, app_state.chat.clone(), &config.jwt_secret);

    match config.weather.clone() {
        Some(weather) => {
            let monitor = WeatherMonitor::new(weather, app_state.alerts.clone())?;
            tokio::spawn(monitor.run());
        }
        None => warn!("PAWLINK_WEATHER_API_KEY not set, weather monitor disabled"),
    }

    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(gateway);

    let app = Router::new()
        .merge(pawlink_api::router(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("PawLink server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The token may come as `?token=` (browsers cannot set headers on a
/// WebSocket) or as a bearer header. It is checked after the upgrade so a
/// rejection can carry a close code.
async fn ws_upgrade(
    State(gateway): State<Gateway>,
    Query(query): Query<WsQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = query
        .token
        .or_else(|| bearer.map(|TypedHeader(auth)| auth.token().to_string()));
    ws.on_upgrade(move |socket| connection::handle_socket(socket, token, gateway))
}
