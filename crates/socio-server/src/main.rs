use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use socio_api::{AppState, AppStateInner};
use socio_core::{Core, DEFAULT_ACTIVITY_LIMIT};
use socio_gateway::connection;

#[derive(Debug, Clone, PartialEq)]
struct Config {
    host: String,
    port: u16,
    db_path: PathBuf,
    jwt_secret: String,
    activity_limit: usize,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match lookup("SOCIO_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("invalid SOCIO_PORT '{}'", raw))?,
            None => 5000,
        };
        let activity_limit = match lookup("SOCIO_ACTIVITY_LIMIT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid SOCIO_ACTIVITY_LIMIT '{}'", raw))?,
            None => DEFAULT_ACTIVITY_LIMIT,
        };
        if activity_limit < 1 {
            bail!("SOCIO_ACTIVITY_LIMIT must be at least 1");
        }

        Ok(Self {
            host: lookup("SOCIO_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: PathBuf::from(lookup("SOCIO_DB_PATH").unwrap_or_else(|| "socio.db".into())),
            jwt_secret: lookup("SOCIO_JWT_SECRET").unwrap_or_else(|| "dev-secret-change-me".into()),
            activity_limit,
        })
    }
}

#[derive(Clone)]
struct GatewayState {
    core: Core,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "socio=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = socio_db::Database::open(&config.db_path)?;
    info!("Opened database at {}", config.db_path.display());

    // Shared state
    let core = Core::new(Arc::new(db), config.activity_limit);
    let app_state: AppState = Arc::new(AppStateInner {
        core: core.clone(),
        jwt_secret: config.jwt_secret.clone(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(GatewayState {
            core,
            jwt_secret: config.jwt_secret.clone(),
        });

    let app = Router::new()
        .merge(socio_api::router(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Socio server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.core, state.jwt_secret))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.db_path, PathBuf::from("socio.db"));
        assert_eq!(config.activity_limit, 5);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[("SOCIO_PORT", "8080"), ("SOCIO_ACTIVITY_LIMIT", "10")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.activity_limit, 10);
    }

    #[test]
    fn bad_numbers_abort_startup() {
        assert!(config_from(&[("SOCIO_PORT", "http")]).is_err());
        assert!(config_from(&[("SOCIO_ACTIVITY_LIMIT", "0")]).is_err());
        assert!(config_from(&[("SOCIO_ACTIVITY_LIMIT", "-1")]).is_err());
    }
}
