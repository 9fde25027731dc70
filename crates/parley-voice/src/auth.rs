//! Silent re-authentication for consent-gated backend connections.

use crate::error::ConversationResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

/// A scoped credential for one connection resource.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential").field("token", &"<redacted>").finish()
    }
}

/// Acquires a credential for `resource_uri` without user interaction.
///
/// `Ok(None)` means interactive consent is required. `Err` is a genuine failure.
#[async_trait]
pub trait SilentAuthenticator: Send + Sync {
    async fn acquire_silent_credential(
        &self,
        resource_uri: &str,
    ) -> ConversationResult<Option<Credential>>;
}

/// Never resolves silently; every consent card is shown.
#[derive(Debug, Default)]
pub struct NoSilentAuth;

#[async_trait]
impl SilentAuthenticator for NoSilentAuth {
    async fn acquire_silent_credential(
        &self,
        _resource_uri: &str,
    ) -> ConversationResult<Option<Credential>> {
        Ok(None)
    }
}

/// Pre-granted tokens keyed by resource URI.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    tokens: HashMap<String, Credential>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, resource_uri: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(resource_uri.into(), Credential::new(token));
        self
    }
}

#[async_trait]
impl SilentAuthenticator for StaticCredentials {
    async fn acquire_silent_credential(
        &self,
        resource_uri: &str,
    ) -> ConversationResult<Option<Credential>> {
        Ok(self.tokens.get(resource_uri).cloned())
    }
}
