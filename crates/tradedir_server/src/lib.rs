//! HTTP server wiring for tradedir (API, handlers, background sync, and shared state).

/// Caller identity and admin checks.
pub mod auth;
/// HTTP error mapping for API handlers.
pub mod error;
/// HTTP handlers for entity, user, category, tag, and admin endpoints.
pub mod handlers;
/// Outgoing contact mail.
pub mod mail;
/// Background outbox workers.
pub mod worker;

pub use auth::{Authenticator, UserDirectoryAuthenticator};
pub use mail::{LogMailer, Mailer};
pub use tradedir_core::{
    config, db, index, models, search, sync, work, AppError, Config, Database, DEFAULT_PORT,
};
pub use worker::{spawn_sync_workers, SyncWorkers};

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue},
    routing::{get, post, put},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Notify;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tradedir_core::{
    index::{RedbSearchIndex, SearchIndex},
    sync::IndexSync,
    work::Dispatcher,
    ADMIN_TOKEN_HEADER, USER_ID_HEADER,
};

const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; frame-ancestors 'none'; base-uri 'none'";

/// Shared state passed to HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
    pub index_sync: Arc<IndexSync>,
    pub dispatcher: Arc<Dispatcher>,
    /// Fired after every commit that queued outbox work.
    pub wake: Arc<Notify>,
    pub authenticator: Arc<dyn Authenticator>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Construct shared application state, opening the search index from `config.index_path`.
    ///
    /// # Arguments
    /// - `config`: Loaded configuration.
    /// - `db`: Open database handle.
    ///
    /// # Returns
    /// A new [`AppState`].
    ///
    /// # Errors
    /// Returns an error when the search index cannot be opened.
    pub fn new(config: Config, db: Database) -> Result<Self, AppError> {
        let index = RedbSearchIndex::open(&config.index_path)?;
        Ok(Self::with_index(config, db, Arc::new(index)))
    }

    /// Construct shared application state over an already opened search index.
    ///
    /// Registers an outbox waker so sync workers start as soon as a mutation commits.
    ///
    /// # Arguments
    /// - `config`: Loaded configuration.
    /// - `db`: Open database handle.
    /// - `index`: Search index backend.
    ///
    /// # Returns
    /// A new [`AppState`] with the default authenticator and a logging mailer.
    pub fn with_index(config: Config, db: Database, index: Arc<dyn SearchIndex>) -> Self {
        let db = Arc::new(db);
        let wake = Arc::new(Notify::new());
        let waker = wake.clone();
        db.outbox.set_waker(Arc::new(move || waker.notify_one()));

        let index_sync = Arc::new(IndexSync::new(db.clone(), index));
        let dispatcher = Arc::new(Dispatcher::new(
            db.clone(),
            index_sync.clone(),
            config.category_delete_policy,
            config.sync_max_attempts,
        ));
        Self {
            authenticator: Arc::new(UserDirectoryAuthenticator::new(db.clone())),
            mailer: Arc::new(LogMailer),
            db,
            config: Arc::new(config),
            index_sync,
            dispatcher,
            wake,
        }
    }

    /// Replace the mailer.
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }
}

/// Create the application router with all routes and middleware.
///
/// # Arguments
/// - `state`: Shared application state.
/// - `allow_public_access`: Whether to allow cross-origin requests from any origin.
///
/// # Returns
/// Configured `axum::Router`.
pub fn create_app(state: AppState, allow_public_access: bool) -> Router {
    let cors_port = state.config.port;
    create_app_with_cors_port(state, allow_public_access, cors_port)
}

/// Resolve the listener address from env var overrides and security policy.
///
/// # Arguments
/// - `config`: Server configuration containing the configured `port`.
/// - `allow_public_access`: Whether non-loopback bind targets are permitted.
///
/// # Returns
/// A validated socket address that enforces loopback when public access is disabled.
pub fn resolve_bind_address(config: &Config, allow_public_access: bool) -> SocketAddr {
    let default_bind = SocketAddr::from(([127, 0, 0, 1], config.port));
    let requested = match std::env::var("BIND") {
        Ok(value) => match value.trim().parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(err) => {
                tracing::warn!(
                    "Invalid BIND='{}': {}. Falling back to {}",
                    value,
                    err,
                    default_bind
                );
                default_bind
            }
        },
        Err(_) => default_bind,
    };

    if allow_public_access || requested.ip().is_loopback() {
        return requested;
    }

    tracing::warn!(
        "Non-loopback bind {} requested without ALLOW_PUBLIC_ACCESS; forcing 127.0.0.1",
        requested
    );
    SocketAddr::from(([127, 0, 0, 1], requested.port()))
}

fn local_origins(port: u16) -> Vec<HeaderValue> {
    [
        format!("http://localhost:{}", port),
        format!("http://127.0.0.1:{}", port),
    ]
    .into_iter()
    .filter_map(|origin| HeaderValue::from_str(&origin).ok())
    .collect()
}

fn create_app_with_cors_port(state: AppState, allow_public_access: bool, cors_port: u16) -> Router {
    let methods = [
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::PUT,
        axum::http::Method::DELETE,
    ];
    let cors = if allow_public_access {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        CorsLayer::new()
            .allow_origin(local_origins(cors_port))
            .allow_methods(methods)
            .allow_headers([
                header::CONTENT_TYPE,
                header::ACCEPT,
                HeaderName::from_static(USER_ID_HEADER),
                HeaderName::from_static(ADMIN_TOKEN_HEADER),
            ])
    };

    Router::new()
        .route(
            "/api/entities",
            get(handlers::entity::search_entities).post(handlers::entity::create_entity),
        )
        .route(
            "/api/entities/:id",
            get(handlers::entity::get_entity)
                .put(handlers::entity::update_entity)
                .delete(handlers::entity::delete_entity),
        )
        .route(
            "/api/entities/:id/matched-tags",
            get(handlers::entity::matched_tags),
        )
        .route("/api/favorites", post(handlers::entity::set_favorite))
        .route("/api/contact", post(handlers::entity::contact_entity))
        .route("/api/users", post(handlers::user::create_user))
        .route(
            "/api/users/:id",
            get(handlers::user::get_user)
                .put(handlers::user::update_user)
                .delete(handlers::user::delete_user),
        )
        .route("/api/categories", get(handlers::category::list_categories))
        .route("/api/tags", get(handlers::tag::suggest_tags))
        .route(
            "/api/admin/categories",
            post(handlers::category::create_category),
        )
        .route(
            "/api/admin/categories/:id",
            put(handlers::category::rename_category).delete(handlers::category::delete_category),
        )
        .route(
            "/api/admin/entities/:id/status",
            put(handlers::admin::set_entity_status),
        )
        .route("/api/admin/restore", post(handlers::admin::restore_index))
        .route("/api/admin/outbox", get(handlers::admin::outbox_status))
        .with_state(state.clone())
        .layer(
            tower::ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(state.config.max_body_size))
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors)
                .layer(SetResponseHeaderLayer::overriding(
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static(CONTENT_SECURITY_POLICY),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                )),
        )
}

fn listener_cors_port(listener: &tokio::net::TcpListener, fallback_port: u16) -> u16 {
    listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(fallback_port)
}

/// Run the Axum server with graceful shutdown support.
///
/// # Arguments
/// - `listener`: Bound TCP listener for the server.
/// - `state`: Shared application state.
/// - `allow_public_access`: Whether to allow cross-origin requests from any origin.
/// - `shutdown_signal`: Future that resolves when shutdown should start.
///
/// # Returns
/// `Ok(())` when the server exits cleanly.
///
/// # Errors
/// Returns any I/O error produced by `axum::serve`.
pub async fn serve_router(
    listener: tokio::net::TcpListener,
    state: AppState,
    allow_public_access: bool,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let cors_port = listener_cors_port(&listener, state.config.port);
    let app = create_app_with_cors_port(state, allow_public_access, cors_port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
}

#[cfg(test)]
mod tests {
    use super::listener_cors_port;
    use super::resolve_bind_address;
    use std::net::SocketAddr;
    use tradedir_core::env::{env_lock, EnvGuard};
    use tradedir_core::{Config, DEFAULT_PORT};

    #[tokio::test]
    async fn listener_cors_port_uses_bound_listener_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener");
        let expected = listener.local_addr().expect("listener addr").port();
        let resolved = listener_cors_port(&listener, DEFAULT_PORT);
        assert_eq!(resolved, expected);
    }

    #[test]
    fn resolve_bind_address_enforces_loopback_when_public_access_disabled() {
        let _lock = env_lock().lock().expect("env lock");
        let mut config = Config::for_db_path("/tmp/tradedir-db");
        config.port = 4040;
        let _bind = EnvGuard::set("BIND", "0.0.0.0:4040");
        let resolved = resolve_bind_address(&config, false);
        assert_eq!(resolved.ip().to_string(), "127.0.0.1");
        assert_eq!(resolved.port(), 4040);

        let public = resolve_bind_address(&config, true);
        assert_eq!(public, SocketAddr::from(([0, 0, 0, 0], 4040)));
    }

    #[test]
    fn resolve_bind_address_allows_loopback_and_invalid_fallback() {
        let _lock = env_lock().lock().expect("env lock");
        let mut config = Config::for_db_path("/tmp/tradedir-db");
        config.port = 4041;
        {
            let _bind = EnvGuard::remove("BIND");
            let loopback = resolve_bind_address(&config, false);
            assert_eq!(loopback, SocketAddr::from(([127, 0, 0, 1], 4041)));
        }

        let _bind = EnvGuard::set("BIND", "bad:host");
        let fallback = resolve_bind_address(&config, false);
        assert_eq!(fallback, SocketAddr::from(([127, 0, 0, 1], 4041)));
    }
}
