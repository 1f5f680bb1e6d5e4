//! Core module containing the error taxonomy, permissions and naming helpers

pub mod auth;
pub mod error;
pub mod naming;

pub use auth::{
    AllowAllGuard, AuthContext, AuthPolicy, AuthProvider, Guard, HeaderAuthProvider,
    NoAuthProvider, Permission, RoleGuard,
};
pub use error::{DataError, DataResult};
