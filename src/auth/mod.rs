//! Authentication for the marketplace gateway
//!
//! Credentials come from email/password login against the account's
//! entry point and are kept fresh by the refresh-token exchange. When
//! that exchange fails the session is over and the user is sent back to
//! the login page matching their role.

mod login;
pub mod refresh;
pub mod tokens;

pub use login::{login, logout, status};
pub use tokens::{Credentials, FileTokenStore, MemoryTokenStore, TokenPair, TokenStore};

use crate::models::Role;

/// Login page a signed-out user is sent back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRoute {
    User,
    Worker,
    Admin,
}

impl LoginRoute {
    /// Route for the role held before sign-out; unknown means the user login.
    pub fn for_role(role: Option<Role>) -> Self {
        match role {
            Some(Role::Admin) => LoginRoute::Admin,
            Some(Role::Worker) => LoginRoute::Worker,
            Some(Role::User) | None => LoginRoute::User,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            LoginRoute::User => "/login",
            LoginRoute::Worker => "/worker/login",
            LoginRoute::Admin => "/admin",
        }
    }

    /// CLI invocation that signs back in through this route.
    pub fn command(&self) -> &'static str {
        match self {
            LoginRoute::User => "workmarket login",
            LoginRoute::Worker => "workmarket login --as worker",
            LoginRoute::Admin => "workmarket login --as admin",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_route_per_role() {
        assert_eq!(LoginRoute::for_role(Some(Role::Admin)).path(), "/admin");
        assert_eq!(LoginRoute::for_role(Some(Role::Worker)).path(), "/worker/login");
        assert_eq!(LoginRoute::for_role(Some(Role::User)).path(), "/login");
        assert_eq!(LoginRoute::for_role(None), LoginRoute::User);
    }
}
