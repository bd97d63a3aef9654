use std::fmt::{Debug, Formatter};

use serde::{Deserialize, Serialize};

use crate::ApplicationId;

/// Authenticated call context carried into every remote directory call.
///
/// The token and application scope travel explicitly with the caller
/// instead of living in process-wide session storage, so the reconciliation
/// engine has no ambient state.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    access_token: String,
    application_id: Option<ApplicationId>,
}

impl SessionContext {
    /// Creates a session context from a bearer token and optional scope.
    #[must_use]
    pub fn new(access_token: impl Into<String>, application_id: Option<ApplicationId>) -> Self {
        Self {
            access_token: access_token.into(),
            application_id,
        }
    }

    /// Returns the bearer token attached to outgoing requests.
    #[must_use]
    pub fn bearer_token(&self) -> &str {
        self.access_token.as_str()
    }

    /// Returns the application scope the caller operates in, if any.
    #[must_use]
    pub fn application_id(&self) -> Option<ApplicationId> {
        self.application_id
    }

    /// Returns a copy of this context carrying a replacement token.
    #[must_use]
    pub fn with_access_token(&self, access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            application_id: self.application_id,
        }
    }
}

impl Debug for SessionContext {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SessionContext")
            .field("access_token", &"<redacted>")
            .field("application_id", &self.application_id)
            .finish()
    }
}
