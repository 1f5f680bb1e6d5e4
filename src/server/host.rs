//! Shared state of the HTTP surface
//!
//! A `DataHost` bundles the entity manager with the permission guard and the
//! auth provider consulted on every request. It is cheap to clone and is used
//! directly as the axum router state.

use axum::http::HeaderMap;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::error::{DataResult, RequestError};
use crate::core::{AuthContext, AuthProvider, Guard, Permission};
use crate::manager::EntityManager;

#[derive(Clone)]
pub struct DataHost {
    /// The data model and its storage connection
    pub em: Arc<EntityManager>,

    /// Permission boundary checked before each operation
    pub guard: Arc<dyn Guard>,

    /// Resolves the caller from request headers
    pub auth: Arc<dyn AuthProvider>,

    pub config: Arc<ServerConfig>,
}

impl DataHost {
    pub fn new(
        em: Arc<EntityManager>,
        guard: Arc<dyn Guard>,
        auth: Arc<dyn AuthProvider>,
        config: ServerConfig,
    ) -> Self {
        Self {
            em,
            guard,
            auth,
            config: Arc::new(config),
        }
    }

    /// Resolve the caller and fail unless `permission` is granted to them
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        permission: Permission,
    ) -> DataResult<AuthContext> {
        let context = self
            .auth
            .extract_context(headers)
            .await
            .map_err(|e| RequestError::Unauthorized {
                message: e.to_string(),
            })?;
        self.guard.throw_unless_granted(permission, &context)?;
        Ok(context)
    }

    pub fn is_debug(&self) -> bool {
        self.config.debug
    }

    pub fn basepath(&self) -> &str {
        &self.config.basepath
    }
}
