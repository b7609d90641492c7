mod gate;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use axum::ServiceExt;
use axum::extract::Request;
use axum::middleware;
use tower::Layer;

use crate::gate::session::SessionStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let gate_config = gate::GateConfig::from_env().expect("invalid gate configuration");
    let login = services::login::StaticLoginService::from_env();
    let sessions = session_store().await;

    let state = state::AppState::new(sessions, Arc::new(login), gate_config);

    // The gate must wrap the router, not ride on it: `Router::layer`
    // middleware runs after route matching, which would pin a forward's
    // URI rewrite to the originally matched handler.
    let app = middleware::from_fn_with_state(state.clone(), gate::gate).layer(routes::app(state));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "gatehouse listening");
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .await
        .expect("server failed");
}

#[cfg(feature = "postgres-sessions")]
async fn session_store() -> Arc<dyn SessionStore> {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let store = gate::postgres::PostgresSessionStore::connect(&database_url)
        .await
        .expect("database init failed");
    tracing::info!("using postgres session store");
    Arc::new(store)
}

#[cfg(not(feature = "postgres-sessions"))]
async fn session_store() -> Arc<dyn SessionStore> {
    Arc::new(gate::session::MemorySessionStore::new())
}
