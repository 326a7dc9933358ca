//! Authentication state consumed by the cloud-facing parts of the engine.

use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

impl AuthUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }
}

/// Read-only view of the current authentication session.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;

    fn is_authenticated(&self) -> bool {
        self.current_user().is_some()
    }

    /// The signed-in user, or `Error::AuthRequired`.
    fn require_current_user(&self) -> Result<AuthUser> {
        self.current_user().ok_or(Error::AuthRequired)
    }
}

/// In-process session holder updated by whatever performs sign-in.
#[derive(Default)]
pub struct SessionAuth {
    user: RwLock<Option<AuthUser>>,
}

impl SessionAuth {
    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(user: AuthUser) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    pub fn sign_in(&self, user: AuthUser) {
        tracing::info!("Signed in as {}", user.id);
        *self.write_guard() = Some(user);
    }

    pub fn sign_out(&self) {
        if let Some(user) = self.write_guard().take() {
            tracing::info!("Signed out {}", user.id);
        }
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, Option<AuthUser>> {
        self.user
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl AuthProvider for SessionAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.user
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for SessionAuth {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionAuth")
            .field("user", &self.current_user().map(|user| user.id))
            .finish()
    }
}
