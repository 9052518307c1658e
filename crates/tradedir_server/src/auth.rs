//! Caller identity and admin checks.
//!
//! Credentials are verified by a gateway in front of the server; requests
//! reach us with the user id in [`USER_ID_HEADER`]. Admin endpoints compare
//! [`ADMIN_TOKEN_HEADER`] against the configured token.

use crate::{error::HttpError, AppError, AppState, Database};
use axum::http::HeaderMap;
use std::sync::Arc;
use tradedir_core::{ADMIN_TOKEN_HEADER, USER_ID_HEADER};

/// Resolves a credential to a user id.
pub trait Authenticator: Send + Sync {
    /// Verify `credential`.
    ///
    /// # Returns
    /// The caller's user id, or `None` when the credential is not accepted.
    ///
    /// # Errors
    /// Returns an error when the lookup itself fails.
    fn verify(&self, credential: &str) -> Result<Option<String>, AppError>;
}

/// Accepts any id that names a live user in the record store.
pub struct UserDirectoryAuthenticator {
    db: Arc<Database>,
}

impl UserDirectoryAuthenticator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl Authenticator for UserDirectoryAuthenticator {
    fn verify(&self, credential: &str) -> Result<Option<String>, AppError> {
        let id = credential.trim();
        if id.is_empty() {
            return Ok(None);
        }
        Ok(self
            .db
            .users
            .get(id)?
            .filter(|user| !user.is_deleted())
            .map(|user| user.id))
    }
}

/// Identify the caller, if any.
///
/// A missing header means an anonymous caller. A header that does not verify
/// is rejected rather than downgraded to anonymous.
pub(crate) fn caller(state: &AppState, headers: &HeaderMap) -> Result<Option<String>, HttpError> {
    let Some(value) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let credential = value.to_str().map_err(|_| HttpError::Unauthorized)?;
    match state.authenticator.verify(credential)? {
        Some(user_id) => Ok(Some(user_id)),
        None => Err(HttpError::Unauthorized),
    }
}

pub(crate) fn require_caller(state: &AppState, headers: &HeaderMap) -> Result<String, HttpError> {
    caller(state, headers)?.ok_or(HttpError::Unauthorized)
}

/// Reject the request unless it carries the configured admin token.
pub(crate) fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), HttpError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(HttpError::forbidden("Admin API is disabled"));
    };
    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(HttpError::forbidden("Admin token required"))
    }
}
