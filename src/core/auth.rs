//! Permissions and the guard consulted before every data operation
//!
//! The data layer defines the permission catalog ([`Permission`]) and asks a
//! [`Guard`] before each repository or mutator call made from the HTTP
//! surface. Who the caller is comes from an [`AuthProvider`]:
//! - [`NoAuthProvider`]: everyone is anonymous
//! - [`HeaderAuthProvider`]: identity and roles read from request headers

use anyhow::Result;
use async_trait::async_trait;
use axum::http::HeaderMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::{ConfigError, DataResult, RequestError};

/// Operations a guard can grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "data.entity.read")]
    EntityRead,
    #[serde(rename = "data.entity.create")]
    EntityCreate,
    #[serde(rename = "data.entity.update")]
    EntityUpdate,
    #[serde(rename = "data.entity.delete")]
    EntityDelete,
    #[serde(rename = "data.database.sync")]
    DatabaseSync,
}

impl Permission {
    pub const ALL: [Permission; 5] = [
        Permission::EntityRead,
        Permission::EntityCreate,
        Permission::EntityUpdate,
        Permission::EntityDelete,
        Permission::DatabaseSync,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Permission::EntityRead => "data.entity.read",
            Permission::EntityCreate => "data.entity.create",
            Permission::EntityUpdate => "data.entity.update",
            Permission::EntityDelete => "data.entity.delete",
            Permission::DatabaseSync => "data.database.sync",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Who is making a request
#[derive(Debug, Clone, PartialEq)]
pub enum AuthContext {
    /// Authenticated user
    User { user_id: Uuid, roles: Vec<String> },

    /// System administrator
    Admin { admin_id: Uuid },

    /// No authentication (public access)
    Anonymous,
}

impl AuthContext {
    /// Check if context represents an admin
    pub fn is_admin(&self) -> bool {
        matches!(self, AuthContext::Admin { .. })
    }

    /// Get user_id if available
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            AuthContext::User { user_id, .. } => Some(*user_id),
            AuthContext::Admin { admin_id } => Some(*admin_id),
            AuthContext::Anonymous => None,
        }
    }
}

/// Rule deciding whether a context may perform an operation
#[derive(Debug, Clone, PartialEq)]
pub enum AuthPolicy {
    /// Public access (no auth required)
    Public,

    /// Any authenticated user
    Authenticated,

    /// User must have one of these roles
    HasRole(Vec<String>),

    /// Admin only
    AdminOnly,

    /// Nobody but admins, who bypass every policy
    Deny,

    /// Combination of policies (AND)
    And(Vec<AuthPolicy>),

    /// Combination of policies (OR)
    Or(Vec<AuthPolicy>),
}

impl AuthPolicy {
    /// Check if auth context satisfies this policy
    pub fn check(&self, context: &AuthContext) -> bool {
        match self {
            AuthPolicy::Public => true,

            AuthPolicy::Authenticated => !matches!(context, AuthContext::Anonymous),

            AuthPolicy::HasRole(required_roles) => match context {
                AuthContext::User { roles, .. } => required_roles.iter().any(|r| roles.contains(r)),
                _ => false,
            },

            AuthPolicy::AdminOnly => context.is_admin(),

            AuthPolicy::Deny => false,

            AuthPolicy::And(policies) => policies.iter().all(|p| p.check(context)),

            AuthPolicy::Or(policies) => policies.iter().any(|p| p.check(context)),
        }
    }

    /// Parse policy from string (for YAML config)
    ///
    /// `public`, `authenticated`, `admin_only`, `deny`, `role:<name>` and
    /// `any_role:<a>,<b>`.
    pub fn parse_policy(s: &str) -> Option<Self> {
        match s.trim() {
            "public" => Some(AuthPolicy::Public),
            "authenticated" => Some(AuthPolicy::Authenticated),
            "admin_only" => Some(AuthPolicy::AdminOnly),
            "deny" => Some(AuthPolicy::Deny),
            s => {
                if let Some(role) = s.strip_prefix("role:") {
                    Some(AuthPolicy::HasRole(vec![role.trim().to_string()]))
                } else {
                    s.strip_prefix("any_role:").map(|roles| {
                        AuthPolicy::HasRole(
                            roles
                                .split(',')
                                .map(str::trim)
                                .filter(|r| !r.is_empty())
                                .map(str::to_string)
                                .collect(),
                        )
                    })
                }
            }
        }
    }
}

/// Permission check in front of every data operation
pub trait Guard: Send + Sync {
    fn is_granted(&self, permission: Permission, context: &AuthContext) -> bool;

    /// Fail with 403 unless `permission` is granted to `context`
    fn throw_unless_granted(&self, permission: Permission, context: &AuthContext) -> DataResult<()> {
        if self.is_granted(permission, context) {
            return Ok(());
        }
        tracing::warn!(
            permission = permission.name(),
            user_id = ?context.user_id(),
            "permission denied"
        );
        Err(RequestError::Forbidden {
            permission: permission.name().to_string(),
        }
        .into())
    }
}

/// Grants everything (for development)
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllGuard;

impl Guard for AllowAllGuard {
    fn is_granted(&self, _: Permission, _: &AuthContext) -> bool {
        true
    }
}

/// One policy per permission; admins bypass every policy
#[derive(Debug, Clone)]
pub struct RoleGuard {
    policies: IndexMap<Permission, AuthPolicy>,
    fallback: AuthPolicy,
}

impl Default for RoleGuard {
    /// Reads are public, everything else needs the admin
    fn default() -> Self {
        Self::new(AuthPolicy::AdminOnly).with_policy(Permission::EntityRead, AuthPolicy::Public)
    }
}

impl RoleGuard {
    /// Guard applying `fallback` to permissions without their own policy
    pub fn new(fallback: AuthPolicy) -> Self {
        Self {
            policies: IndexMap::new(),
            fallback,
        }
    }

    pub fn with_policy(mut self, permission: Permission, policy: AuthPolicy) -> Self {
        self.policies.insert(permission, policy);
        self
    }

    /// Build from `permission name -> policy string` pairs, on top of the
    /// default policies
    pub fn from_config(policies: &IndexMap<String, String>) -> DataResult<Self> {
        let mut guard = Self::default();
        for (name, policy) in policies {
            let permission = Permission::parse(name).ok_or_else(|| ConfigError::ParseError {
                file: None,
                message: format!("unknown permission \"{}\"", name),
            })?;
            let policy = AuthPolicy::parse_policy(policy).ok_or_else(|| ConfigError::ParseError {
                file: None,
                message: format!("invalid policy \"{}\" for {}", policy, name),
            })?;
            guard = guard.with_policy(permission, policy);
        }
        Ok(guard)
    }

    pub fn policy(&self, permission: Permission) -> &AuthPolicy {
        self.policies.get(&permission).unwrap_or(&self.fallback)
    }
}

impl Guard for RoleGuard {
    fn is_granted(&self, permission: Permission, context: &AuthContext) -> bool {
        context.is_admin() || self.policy(permission).check(context)
    }
}

/// Trait for auth providers
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Extract auth context from request headers
    async fn extract_context(&self, headers: &HeaderMap) -> Result<AuthContext>;
}

/// Default no-auth provider (for development)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthProvider;

#[async_trait]
impl AuthProvider for NoAuthProvider {
    async fn extract_context(&self, _headers: &HeaderMap) -> Result<AuthContext> {
        Ok(AuthContext::Anonymous)
    }
}

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// Trusts identity headers set by an upstream gateway
///
/// `x-user-id` carries the user's UUID and `x-user-roles` a comma separated
/// role list. Users holding the admin role become [`AuthContext::Admin`].
#[derive(Debug, Clone)]
pub struct HeaderAuthProvider {
    admin_role: String,
}

impl Default for HeaderAuthProvider {
    fn default() -> Self {
        Self::new("admin")
    }
}

impl HeaderAuthProvider {
    pub fn new(admin_role: impl Into<String>) -> Self {
        Self {
            admin_role: admin_role.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for HeaderAuthProvider {
    async fn extract_context(&self, headers: &HeaderMap) -> Result<AuthContext> {
        let Some(user_id) = headers.get(USER_ID_HEADER) else {
            return Ok(AuthContext::Anonymous);
        };
        let user_id = Uuid::parse_str(user_id.to_str()?.trim())?;
        let roles: Vec<String> = match headers.get(USER_ROLES_HEADER) {
            Some(value) => value
                .to_str()?
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };

        if roles.contains(&self.admin_role) {
            return Ok(AuthContext::Admin { admin_id: user_id });
        }
        Ok(AuthContext::User { user_id, roles })
    }
}
