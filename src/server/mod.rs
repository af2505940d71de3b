//! HTTP server assembly
//!
//! Builds the application state from [`Settings`](crate::config::Settings),
//! wires the service routers (`/data`, `/jsonstore`, `/users`, `/util`,
//! `/admin`) and serves them with wide-open CORS, request logging and the
//! optional global throttle. Unknown services answer with a 400 envelope.

pub mod handlers;

use crate::auth::{AuthService, ADMIN_HEADER, TOKEN_HEADER};
use crate::config::Settings;
use crate::core::error::ServiceError;
use crate::rules::RuleSet;
use crate::storage::{JsonStore, Storage};
use anyhow::Result;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderName, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub protected: Storage,
    pub jsonstore: JsonStore,
    pub rules: Arc<RuleSet>,
    pub auth: AuthService,
    /// Runtime flags toggled through `/util` (currently just `throttle`)
    pub util: Arc<RwLock<HashMap<String, bool>>>,
}

impl AppState {
    /// Build the state from settings; rule expressions are parsed here
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let storage = Storage::from_seed(&settings.seed_data);
        let protected = Storage::from_seed(&settings.protected_data);
        let rules = Arc::new(RuleSet::new(&settings.rules)?);
        let auth = AuthService::new(protected.clone(), settings.identity());

        Ok(Self {
            storage,
            protected,
            jsonstore: JsonStore::new(),
            rules,
            auth,
            util: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn with_jsonstore(mut self, jsonstore: JsonStore) -> Self {
        self.jsonstore = jsonstore;
        self
    }

    fn throttled(&self) -> bool {
        self.util
            .read()
            .map(|flags| flags.get("throttle").copied().unwrap_or(false))
            .unwrap_or(false)
    }
}

/// Requester identity resolved from the auth headers
///
/// A present but unmatched `X-Authorization` token fails the request with 403
/// before any handler runs.
pub struct Identity {
    pub user: Option<Value>,
    pub is_admin: bool,
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let is_admin = parts.headers.contains_key(ADMIN_HEADER);
        let user = match parts.headers.get(TOKEN_HEADER) {
            Some(token) => {
                let token = token
                    .to_str()
                    .map_err(|_| ServiceError::Credential("Invalid access token".to_string()))?;
                Some(state.auth.resolve_token(token)?)
            }
            None => None,
        };
        Ok(Self { user, is_admin })
    }
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static("x-http-method-override"),
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-authorization"),
            HeaderName::from_static("x-admin"),
        ])
        .max_age(Duration::from_secs(86400));

    Router::new()
        .route("/data", get(handlers::data::list_collections))
        .route(
            "/data/{collection}",
            get(handlers::data::get_collection).post(handlers::data::create),
        )
        .route(
            "/data/{collection}/{id}",
            get(handlers::data::get_record)
                .put(handlers::data::replace)
                .patch(handlers::data::merge)
                .delete(handlers::data::remove),
        )
        .route("/jsonstore", get(empty_store))
        .route(
            "/jsonstore/{*path}",
            get(handlers::jsonstore::get_path)
                .post(handlers::jsonstore::create)
                .put(handlers::jsonstore::replace)
                .patch(handlers::jsonstore::merge)
                .delete(handlers::jsonstore::remove),
        )
        .route("/users/register", post(handlers::users::register))
        .route("/users/login", post(handlers::users::login))
        .route("/users/logout", get(handlers::users::logout))
        .route("/users/me", get(handlers::users::me))
        .route("/util", post(handlers::util::set_flags))
        .route(
            "/util/{flag}",
            get(handlers::util::get_flag).post(handlers::util::set_flags),
        )
        .route("/admin", get(admin_redirect))
        .route("/admin/", get(admin_index))
        .fallback(unsupported_service)
        .layer(middleware::from_fn_with_state(state.clone(), throttle))
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the application with graceful shutdown
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Admin panel located at http://{}/admin", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn log_request(request: Request, next: Next) -> Response {
    tracing::info!("<< {} {}", request.method(), request.uri());
    next.run(request).await
}

/// Random 500-1000 ms delay when the throttle flag is on; OPTIONS is exempt
/// so preflights stay fast
async fn throttle(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.throttled() && request.method() != Method::OPTIONS {
        let delay = rand::thread_rng().gen_range(500..1000);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    next.run(request).await
}

async fn unsupported_service(uri: Uri) -> ServiceError {
    let service = uri
        .path()
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();
    ServiceError::Service(format!("Service \"{service}\" is not supported"))
}

async fn empty_store() -> StatusCode {
    StatusCode::NO_CONTENT
}

// Trailing /admin breaks the panel's relative paths
async fn admin_redirect() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, "/admin/")])
}

async fn admin_index() -> impl IntoResponse {
    Html(
        "<!DOCTYPE html>\
         <html><head><title>Admin Panel</title></head>\
         <body><p>Collections are listed at <a href=\"/data\">/data</a>; \
         throttling is controlled through <a href=\"/util/throttle\">/util</a>.</p>\
         </body></html>",
    )
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
