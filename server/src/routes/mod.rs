use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{apply_security_headers, create_cors_layer, require_token, Config};
use crate::handlers::{
    create_session, create_template, create_tickets, get_session, health_check, list_templates,
    session_tickets, update_ticket,
};
use crate::state::AppState;

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/templates", get(list_templates).post(create_template))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session))
        .route(
            "/sessions/:id/tickets",
            get(session_tickets).post(create_tickets),
        )
        .route("/tickets/:id", put(update_ticket))
        .route_layer(from_fn_with_state(state, require_token))
}

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        .merge(api_routes(state.clone()))
        .with_state(state);

    apply_security_headers(router, config.production)
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(&config.cors_origins))
}
