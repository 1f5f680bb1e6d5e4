//! ServerBuilder for fluent API to build HTTP servers

use super::host::DataHost;
use super::router::{health_routes, mount};
use crate::config::{DataConfig, ServerConfig};
use crate::core::error::DataResult;
use crate::core::{AllowAllGuard, AuthProvider, Guard, HeaderAuthProvider, NoAuthProvider, RoleGuard};
use crate::manager::EntityManager;
use crate::storage::Connection;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builder for the data API server
///
/// Without an explicit guard every permission is granted and callers are
/// anonymous.
///
/// # Example
///
/// ```ignore
/// let em = DataConfig::from_yaml_file("data.yaml")?.build(connection)?;
///
/// let app = ServerBuilder::new()
///     .with_entity_manager(em)
///     .with_guard(RoleGuard::default())
///     .with_auth_provider(HeaderAuthProvider::default())
///     .build()?;
/// ```
pub struct ServerBuilder {
    em: Option<Arc<EntityManager>>,
    guard: Arc<dyn Guard>,
    auth: Arc<dyn AuthProvider>,
    config: ServerConfig,
    custom_routes: Vec<Router>,
    cors: bool,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            em: None,
            guard: Arc::new(AllowAllGuard),
            auth: Arc::new(NoAuthProvider),
            config: ServerConfig::default(),
            custom_routes: Vec::new(),
            cors: false,
        }
    }

    /// Build the model declared in `config` on `connection` and serve it
    ///
    /// The basepath is taken from the configuration. When the configuration
    /// declares `permissions`, a [`RoleGuard`] built from them is installed
    /// together with a [`HeaderAuthProvider`].
    pub fn from_data_config(config: &DataConfig, connection: Arc<dyn Connection>) -> DataResult<Self> {
        let em = config.build(connection)?;
        let mut builder = Self::new()
            .with_entity_manager(em)
            .with_config(ServerConfig::from(config));

        if !config.permissions.is_empty() {
            builder = builder
                .with_guard(RoleGuard::from_config(&config.permissions)?)
                .with_auth_provider(HeaderAuthProvider::default());
        }
        Ok(builder)
    }

    /// Set the entity manager (required)
    pub fn with_entity_manager(mut self, em: EntityManager) -> Self {
        self.em = Some(Arc::new(em));
        self
    }

    /// Share an entity manager that is also used outside the server
    pub fn with_shared_entity_manager(mut self, em: Arc<EntityManager>) -> Self {
        self.em = Some(em);
        self
    }

    pub fn with_guard(mut self, guard: impl Guard + 'static) -> Self {
        self.guard = Arc::new(guard);
        self
    }

    pub fn with_auth_provider(mut self, auth: impl AuthProvider + 'static) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add custom routes to the server
    ///
    /// Custom routes are merged at the root, next to the health routes and
    /// outside the data basepath.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use axum::{Router, routing::get};
    ///
    /// let routes = Router::new().route("/version", get(|| async { "1.0" }));
    ///
    /// ServerBuilder::new()
    ///     .with_entity_manager(em)
    ///     .with_custom_routes(routes)
    ///     .build()?;
    /// ```
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Allow cross-origin requests from any origin
    pub fn with_cors(mut self) -> Self {
        self.cors = true;
        self
    }

    /// Build the shared handler state
    pub fn build_host(&self) -> Result<DataHost> {
        let em = self
            .em
            .clone()
            .ok_or_else(|| anyhow::anyhow!("EntityManager is required. Call .with_entity_manager()"))?;

        Ok(DataHost::new(
            em,
            self.guard.clone(),
            self.auth.clone(),
            self.config.clone(),
        ))
    }

    /// Build the final router
    ///
    /// This generates:
    /// - Health check routes
    /// - The data API under the configured basepath
    /// - Custom routes
    pub fn build(mut self) -> Result<Router> {
        let host = self.build_host()?;
        tracing::debug!(
            basepath = host.basepath(),
            debug = host.is_debug(),
            "building data router"
        );

        let mut app = health_routes().merge(mount(host));
        for custom_router in std::mem::take(&mut self.custom_routes) {
            app = app.merge(custom_router);
        }

        let app = app.layer(TraceLayer::new_for_http());
        if self.cors {
            return Ok(app.layer(CorsLayer::permissive()));
        }
        Ok(app)
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    ///
    /// # Example
    ///
    /// ```ignore
    /// ServerBuilder::new()
    ///     .with_entity_manager(em)
    ///     .serve("127.0.0.1:3000").await?;
    /// ```
    pub async fn serve(self, addr: &str) -> Result<()> {
        let basepath = self.config.basepath.clone();
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {} (data API at {})", addr, basepath);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve on Ctrl+C or SIGTERM
///
/// A signal handler that cannot be installed never fires; the server then
/// runs until the other signal arrives.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
