//! HTTP server implementation

use axum::{extract::FromRef, middleware, routing::get, Router};
use ldapgate_auth::{Authenticator, GroupMappingAuthorization, ServerRegistry};
use ldapgate_core::{config::LdapgateConfig, Result};
use ldapgate_metadata::{AccountStore, MetadataStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use crate::admin;
use crate::metrics::{metrics_handler, metrics_middleware, MetricsRecorder};
use crate::middleware::sso::seamless_sso;
use crate::routes;
use crate::session::SessionStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<LdapgateConfig>,
    pub authenticator: Arc<Authenticator>,
    pub sessions: Arc<SessionStore>,
    pub metrics: Arc<MetricsRecorder>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the authenticator to a store and directory set.
    ///
    /// Creates the site owner if missing and applies any authentication
    /// settings saved through the admin API.
    pub async fn new(
        config: LdapgateConfig,
        store: Arc<dyn AccountStore>,
        registry: ServerRegistry,
        metrics: Arc<MetricsRecorder>,
    ) -> Result<Self> {
        let authenticator = Authenticator::new(config.authentication.clone(), registry, store)
            .with_authorization(Arc::new(GroupMappingAuthorization::new(
                config.authorization.clone(),
            )));

        let owner = authenticator
            .ensure_site_owner(
                &config.site.owner_name,
                config.site.owner_mail.as_deref(),
                config.site.owner_password.as_deref(),
            )
            .await?;
        if owner.pass_hash.is_none() {
            info!(name = %owner.name, "Site owner has no local password; admin API is locked");
        }

        if authenticator.load_persisted_config().await? {
            info!("Using authentication settings saved through the admin API");
        }

        let sessions = SessionStore::new(&config.session.secret, config.session.ttl_seconds);

        Ok(Self {
            config: Arc::new(config),
            authenticator: Arc::new(authenticator),
            sessions: Arc::new(sessions),
            metrics,
            start_time: Instant::now(),
        })
    }
}

impl FromRef<AppState> for Arc<MetricsRecorder> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

/// Build the full application router
pub fn create_router(state: AppState) -> Router {
    let metrics = state.metrics.clone();
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs.max(1));

    Router::new()
        // Metrics endpoint (no auth required)
        .route("/metrics", get(metrics_handler))
        // Login endpoints
        .merge(routes::user_routes())
        // Admin API routes
        .nest("/api/v1", admin::admin_routes(state.clone()))
        .layer(middleware::from_fn_with_state(state.clone(), seamless_sso))
        .layer(middleware::from_fn_with_state(metrics, metrics_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .with_state(state)
}

/// LDAP login server
pub struct LdapgateServer {
    config: LdapgateConfig,
}

impl LdapgateServer {
    pub fn new(config: LdapgateConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        self.config.validate()?;

        let metrics = Arc::new(MetricsRecorder::new().map_err(|e| {
            ldapgate_core::Error::InternalError(format!("metrics recorder: {}", e))
        })?);
        info!("Prometheus metrics initialized");

        let store = MetadataStore::with_max_connections(
            &self.config.database.url,
            self.config.database.max_connections,
        )
        .await?;

        let registry = ServerRegistry::from_definitions(&self.config.servers);
        info!(servers = ?registry.sids(), "Directory servers registered");

        let addr = format!("{}:{}", self.config.server.bind_address, self.config.server.port);
        let state = AppState::new(self.config, Arc::new(store), registry, metrics).await?;
        let app = create_router(state);

        let listener = TcpListener::bind(&addr).await?;

        info!("🚀 ldapgate listening on http://{}", addr);
        info!("🔐 Login form at http://{}/user/login", addr);
        info!("📊 Admin API available at http://{}/api/v1", addr);
        info!("📈 Prometheus metrics at http://{}/metrics", addr);

        axum::serve(listener, app).await?;
        Ok(())
    }
}
