//! HTTP surface of the gateway.

pub mod auth;
pub mod error;
pub mod extract;
pub mod messages;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::auth::{AuthCoordinator, LoginCompletion};
use crate::config::GatewayConfig;
use crate::platform::Platform;
use crate::poll::PollDispatcher;
use crate::session::ClientFactory;

pub use error::{ApiError, ApiResult};

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub coordinator: AuthCoordinator,
    pub completion: LoginCompletion,
    pub dispatcher: PollDispatcher,
    pub factory: ClientFactory,
    pub media_timeout: Duration,
    pub cors_allowed_origins: String,
}

impl AppState {
    pub fn new(platform: Arc<dyn Platform>, config: &GatewayConfig) -> Self {
        let factory = ClientFactory::new(platform, config);
        let coordinator = AuthCoordinator::new(factory.clone(), config.auth.clone());
        Self {
            completion: LoginCompletion::new(coordinator.clone()),
            dispatcher: PollDispatcher::new(factory.clone(), config.poll.clone()),
            coordinator,
            factory,
            media_timeout: config.media_timeout,
            cors_allowed_origins: config.cors_allowed_origins.clone(),
        }
    }
}

fn cors_layer(allowed_origins: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty() && *o != "*")
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let allow_origin = if allowed_origins.split(',').any(|o| o.trim() == "*") || origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(extract::PHONE_HEADER),
            HeaderName::from_static(extract::SESSION_HEADER),
        ])
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_allowed_origins);
    Router::new()
        .route("/auth/request-code", post(auth::request_code))
        .route("/auth/login", post(auth::login))
        .route("/auth/password", post(auth::submit_password))
        .route("/api/chats", get(messages::chats))
        .route("/api/messages/{chat_id}", get(messages::messages))
        .route("/api/send", post(messages::send))
        .route("/api/mark-read", post(messages::mark_read))
        .route("/api/poll/{chat_id}", get(messages::poll))
        .route("/api/photo/{chat_id}/{message_id}", get(messages::photo))
        .layer(cors)
        .with_state(state)
}
